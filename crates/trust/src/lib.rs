//! Trust state and its synchronization across nodes.
//!
//! Each node keeps a store of peers with graded trust levels and a bounded,
//! append-only log of signed trust updates. Updates carry a per-signer
//! sequence number and a hash link to the signer's previous update, so a
//! replica can detect replays, gaps, and tampering without global
//! coordination. Synchronization is pull based: a node asks a peer for
//! updates since a watermark and applies whatever validates.

pub mod error;
pub mod level;
pub mod peer;
pub mod store;
pub mod sync;
pub mod update;

pub use error::{TrustError, TrustResult};
pub use level::TrustLevel;
pub use peer::PeerRecord;
pub use store::TrustStore;
pub use sync::{
    IngestOutcome, SyncReport, SyncRequest, SyncResponse, TrustSync, SYNC_REQUEST_TYPE,
    SYNC_RESPONSE_TYPE,
};
pub use update::{TrustUpdate, UpdateKind};

//! Multi-hop message routing with per-hop signatures.
//!
//! The routing fabric constructs, signs, forwards, and deduplicates routed
//! messages. Every hop a message takes is recorded and signed over the full
//! message state at that point, so a forwarder cannot alter earlier fields
//! without invalidating prior signatures. Loops and duplicates are
//! suppressed by a time-bounded seen cache; each receive step returns a
//! structured action rather than an error, so callers can log every outcome
//! uniformly.

pub mod delivery;
pub mod error;
pub mod fabric;
pub mod message;
pub mod seen;
pub mod table;

pub use delivery::DeliveryTracker;
pub use error::{RoutingError, RoutingResult};
pub use fabric::{ReceiveAction, RoutingFabric};
pub use message::{Hop, HopSignature, MessageType, RoutedMessage, BROADCAST_RECIPIENT};
pub use seen::SeenCache;
pub use table::{RouteEntry, RouteState, RouteUpdate, RoutingTable};

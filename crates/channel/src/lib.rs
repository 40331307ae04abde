//! Secure per-peer channels with epoch-based key rotation.
//!
//! Each channel derives a shared secret with a peer through the identity's
//! X25519 key agreement, then encrypts messages under ChaCha20-Poly1305.
//! Keys are rotated into numbered epochs: the next epoch key is a one-way
//! keyed derivation of the current one, so compromise of a later key never
//! exposes earlier traffic, and the blast radius of a leaked key is bounded
//! to one epoch's messages.
//!
//! # Key Rotation Protocol
//!
//! 1. **Open**: derive the epoch-0 key from the X25519 shared secret
//! 2. **Send**: rekey opportunistically when the message-count threshold or
//!    the inactivity interval is hit, then encrypt under the current epoch
//! 3. **Rekey**: derive the next epoch key, retain the outgoing key for a
//!    bounded transition window so in-flight envelopes still decrypt
//! 4. **Close**: zeroize all key material

pub mod channel;
pub mod envelope;
pub mod error;
pub mod manager;

pub use channel::{ChannelState, CloseReason, SecureChannel};
pub use envelope::ChannelEnvelope;
pub use error::{ChannelError, ChannelResult};
pub use manager::ChannelManager;

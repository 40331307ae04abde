//! Core contracts and shared infrastructure for the Sovra node fabric.
//!
//! This crate defines the boundaries the three fabric components build on:
//!
//! - **Identity**: signing, verification, key agreement, and one-shot
//!   authenticated encryption between two nodes
//! - **Event bus**: publish/subscribe notifications for state transitions
//! - **Configuration**: per-component tunables loaded from TOML
//!
//! Cryptographic primitives are never inlined in the channel, routing, or
//! trust crates; they all go through the [`Identity`] contract defined here.

pub mod config;
pub mod error;
pub mod events;
pub mod identity;
pub mod time;

pub use config::{ChannelConfig, NodeConfig, RoutingConfig, TrustConfig};
pub use error::{CoreError, CoreResult};
pub use events::{EventBus, NodeEvent};
pub use identity::{Identity, KeyDirectory, NodeKeys, SignatureBundle};

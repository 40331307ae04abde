//! Node configuration loaded from TOML with per-section defaults.

use crate::error::CoreResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Secure channel tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Messages under one epoch key before a rekey is forced
    pub rekey_message_threshold: u64,
    /// Wall-clock interval since last activity before a rekey is forced
    pub rekey_interval_ms: u64,
    /// Retired epoch keys retained for the transition window
    pub retired_key_window: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            rekey_message_threshold: 1000,
            rekey_interval_ms: 3_600_000,
            retired_key_window: 2,
        }
    }
}

/// Routing fabric tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Initial hop budget on outgoing messages
    pub default_ttl: u32,
    /// Hard cap on recorded hops regardless of remaining TTL
    pub max_hops: usize,
    /// How long a message id stays in the seen cache
    pub seen_cache_window_ms: u64,
    /// Route entry lifetime from creation
    pub route_lifetime_ms: u64,
    /// Per-attempt acknowledgment timeout
    pub ack_timeout_ms: u64,
    /// Retry attempts before a delivery is reported failed
    pub max_delivery_retries: u32,
    /// Whether this node forwards messages for others
    pub forwarding_enabled: bool,
    /// Whether hop signatures are required on send and receive
    pub require_signatures: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_ttl: 10,
            max_hops: 16,
            seen_cache_window_ms: 60_000,
            route_lifetime_ms: 300_000,
            ack_timeout_ms: 5_000,
            max_delivery_retries: 3,
            forwarding_enabled: true,
            require_signatures: true,
        }
    }
}

/// Trust synchronization tunables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrustConfig {
    /// Reject unsigned trust updates
    pub require_signatures: bool,
    /// Bounded update log size; oldest entries evicted beyond this
    pub max_log_entries: usize,
    /// Maximum updates per sync response page
    pub sync_page_size: usize,
    /// Minimum signer trust level (ordinal) for accepting foreign updates
    pub min_signer_level: u8,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            require_signatures: true,
            max_log_entries: 1000,
            sync_page_size: 100,
            min_signer_level: 2, // medium
        }
    }
}

/// Top-level node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub channel: ChannelConfig,
    pub routing: RoutingConfig,
    pub trust: TrustConfig,
}

impl NodeConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// missing sections and fields.
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

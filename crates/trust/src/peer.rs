//! Trusted peer records.

use crate::level::TrustLevel;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything the node knows about one trusted peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerRecord {
    pub node_id: String,
    /// Ed25519 signing public key
    pub signing_key: [u8; 32],
    /// X25519 exchange public key
    pub exchange_key: [u8; 32],
    pub level: TrustLevel,
    pub added_at: u64,
    pub updated_at: u64,
    /// Id of the trust update that last touched this record
    #[serde(default)]
    pub last_update_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl PeerRecord {
    pub fn new(
        node_id: impl Into<String>,
        signing_key: [u8; 32],
        exchange_key: [u8; 32],
        level: TrustLevel,
        now: u64,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            signing_key,
            exchange_key,
            level,
            added_at: now,
            updated_at: now,
            last_update_id: String::new(),
            metadata: HashMap::new(),
        }
    }

}

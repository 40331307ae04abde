//! Routed message structure and per-hop signing.

use crate::error::{RoutingError, RoutingResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sovra_core::{time::now_ms, Identity};
use std::collections::HashMap;

/// Wildcard recipient accepted by every node.
pub const BROADCAST_RECIPIENT: &str = "*";

/// How a message travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Point-to-point, no forwarding expected
    Direct,
    /// Wildcard recipient, forwarded to all
    Broadcast,
    /// Wildcard recipient, forwarded aggressively until TTL exhaustion
    Flood,
    /// Point-to-point through intermediate hops from the routing table
    Routed,
}

/// One forwarding node recorded on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hop {
    pub node: String,
    pub timestamp: u64,
}

/// Signature over the message state at one hop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HopSignature {
    pub hop_index: usize,
    pub node_id: String,
    /// Ed25519 signature, base64
    pub signature: String,
    pub timestamp: u64,
}

/// Canonical signed payload for one hop.
///
/// Field order is fixed by this struct; serde_json emits fields in
/// declaration order, which makes the serialization deterministic.
#[derive(Serialize)]
struct HopSigningPayload<'a> {
    id: &'a str,
    from: &'a str,
    to: &'a str,
    payload: &'a serde_json::Value,
    ttl: u32,
    hop_index: usize,
    hop_node: &'a str,
}

/// A multi-hop message.
///
/// Invariant: `signatures.len() <= hops.len()`, and each signature covers
/// the full message state (sender, recipient, payload, TTL, hop index, hop
/// node) as it stood when that hop signed. TTL is decremented before a
/// forwarder appends and signs its hop, so the TTL covered by hop `k` is
/// reconstructible as `ttl + (hops.len() - 1 - k)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutedMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub from: String,
    pub to: String,
    pub payload: serde_json::Value,
    /// Remaining hop budget
    pub ttl: u32,
    pub hops: Vec<Hop>,
    pub signatures: Vec<HopSignature>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl RoutedMessage {
    /// Construct a message with the sender recorded as hop zero (unsigned).
    pub fn new(
        kind: MessageType,
        from: impl Into<String>,
        to: impl Into<String>,
        payload: serde_json::Value,
        ttl: u32,
    ) -> Self {
        let now = now_ms();
        let from = from.into();
        Self {
            id: generate_message_id(now),
            kind,
            from: from.clone(),
            to: to.into(),
            payload,
            ttl,
            hops: vec![Hop {
                node: from,
                timestamp: now,
            }],
            signatures: Vec::new(),
            metadata: HashMap::new(),
        }
    }

    /// TTL value as it stood when hop `hop_index` signed.
    pub fn ttl_at_hop(&self, hop_index: usize) -> u32 {
        self.ttl + (self.hops.len() - 1 - hop_index) as u32
    }

    /// Canonical bytes signed for a given hop.
    pub fn signing_bytes(&self, hop_index: usize) -> RoutingResult<Vec<u8>> {
        let hop = self.hops.get(hop_index).ok_or_else(|| {
            RoutingError::InvalidMessage(format!("no hop at index {hop_index}"))
        })?;
        let payload = HopSigningPayload {
            id: &self.id,
            from: &self.from,
            to: &self.to,
            payload: &self.payload,
            ttl: self.ttl_at_hop(hop_index),
            hop_index,
            hop_node: &hop.node,
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Sign the most recently appended hop with the local identity.
    pub fn sign_last_hop<I: Identity>(&mut self, identity: &I) -> RoutingResult<()> {
        let hop_index = self
            .hops
            .len()
            .checked_sub(1)
            .ok_or_else(|| RoutingError::InvalidMessage("message has no hops".to_string()))?;
        let bytes = self.signing_bytes(hop_index)?;
        let bundle = identity.sign(&bytes)?;

        self.signatures.push(HopSignature {
            hop_index,
            node_id: identity.node_id().to_string(),
            signature: BASE64.encode(&bundle.signature),
            timestamp: now_ms(),
        });
        Ok(())
    }

    /// Append a forwarding hop for the local node (unsigned).
    pub fn append_hop(&mut self, node: impl Into<String>) {
        self.hops.push(Hop {
            node: node.into(),
            timestamp: now_ms(),
        });
    }

    /// Verify every recorded hop signature.
    ///
    /// `resolve_key` maps a node id to its known signing key; a hop whose
    /// signer key cannot be resolved fails verification. Structural
    /// invariants (signature/hop parity, index consistency) are checked
    /// first.
    pub fn verify_hops<I, F>(&self, identity: &I, resolve_key: F) -> RoutingResult<()>
    where
        I: Identity,
        F: Fn(&str) -> Option<[u8; 32]>,
    {
        if self.signatures.len() > self.hops.len() {
            return Err(RoutingError::InvalidMessage(format!(
                "{} signatures for {} hops",
                self.signatures.len(),
                self.hops.len()
            )));
        }

        for sig in &self.signatures {
            let hop = self.hops.get(sig.hop_index).ok_or_else(|| {
                RoutingError::InvalidMessage(format!(
                    "signature references missing hop {}",
                    sig.hop_index
                ))
            })?;
            if hop.node != sig.node_id {
                return Err(RoutingError::InvalidMessage(format!(
                    "signature node {} does not match hop node {}",
                    sig.node_id, hop.node
                )));
            }

            let public_key = resolve_key(&sig.node_id).ok_or_else(|| {
                RoutingError::SignatureVerification {
                    node_id: sig.node_id.clone(),
                }
            })?;
            let raw_sig = BASE64.decode(&sig.signature).map_err(|_| {
                RoutingError::SignatureVerification {
                    node_id: sig.node_id.clone(),
                }
            })?;
            let bytes = self.signing_bytes(sig.hop_index)?;

            let valid = identity
                .verify(&bytes, &raw_sig, &public_key)
                .unwrap_or(false);
            if !valid {
                return Err(RoutingError::SignatureVerification {
                    node_id: sig.node_id.clone(),
                });
            }
        }

        Ok(())
    }

    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

/// Time-plus-random message id.
fn generate_message_id(now: u64) -> String {
    let mut random = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut random);
    format!("msg-{}-{}", now, hex::encode(random))
}

//! Signed trust update records.

use crate::error::{TrustError, TrustResult};
use crate::level::TrustLevel;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sovra_core::{time::now_ms, Identity};
use std::collections::HashMap;

/// What a trust update asserts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    /// Introduce a peer with its keys and an initial level
    PeerAdd,
    /// Remove a peer entirely
    PeerRemove,
    /// Replace an existing peer's published keys or metadata
    PeerUpdate,
    /// Change an existing peer's trust level
    TrustLevelChange,
    /// Grant a peer authority noted in the update metadata
    Delegation,
    /// Withdraw a previously issued update by id
    Revocation,
}

/// Canonical signed payload for a trust update.
///
/// Field order is fixed by this struct; serde_json emits fields in
/// declaration order, which makes the serialization deterministic. Keys are
/// hex encoded so the payload is byte-stable across platforms.
#[derive(Serialize)]
struct UpdateSigningPayload<'a> {
    id: &'a str,
    kind: UpdateKind,
    peer_id: &'a str,
    peer_signing_key: Option<String>,
    peer_exchange_key: Option<String>,
    trust_level: Option<TrustLevel>,
    target_update_id: Option<&'a str>,
    metadata: &'a HashMap<String, serde_json::Value>,
    timestamp: u64,
    expires_at: Option<u64>,
    signer_id: &'a str,
    signer_key: String,
    sequence: u64,
    prev_hash: &'a str,
    nonce: &'a str,
}

/// One signed assertion about trust state.
///
/// Updates are chained per signer: `sequence` increments by one for each
/// update a signer issues, and `prev_hash` is the BLAKE3 hash of the
/// signer's previous update payload (all zeroes for the first).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustUpdate {
    pub id: String,
    pub kind: UpdateKind,
    /// Peer this update is about
    pub peer_id: String,
    pub peer_signing_key: Option<[u8; 32]>,
    pub peer_exchange_key: Option<[u8; 32]>,
    pub trust_level: Option<TrustLevel>,
    /// For revocations, the id of the update being withdrawn
    pub target_update_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: u64,
    pub expires_at: Option<u64>,
    pub signer_id: String,
    /// Signer's Ed25519 public key
    pub signer_key: [u8; 32],
    /// Per-signer monotonic counter
    pub sequence: u64,
    /// BLAKE3 of the signer's previous update payload, hex
    pub prev_hash: String,
    /// Random salt making identical assertions distinct
    pub nonce: String,
    /// Ed25519 signature over the canonical payload, base64
    pub signature: String,
}

impl TrustUpdate {
    /// Build an unsigned update stamped with a fresh id and nonce.
    #[allow(clippy::too_many_arguments)]
    pub fn unsigned(
        kind: UpdateKind,
        peer_id: impl Into<String>,
        signer_id: impl Into<String>,
        signer_key: [u8; 32],
        sequence: u64,
        prev_hash: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        let mut nonce = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut nonce);

        Self {
            id: generate_update_id(now),
            kind,
            peer_id: peer_id.into(),
            peer_signing_key: None,
            peer_exchange_key: None,
            trust_level: None,
            target_update_id: None,
            metadata: HashMap::new(),
            timestamp: now,
            expires_at: None,
            signer_id: signer_id.into(),
            signer_key,
            sequence,
            prev_hash: prev_hash.into(),
            nonce: hex::encode(nonce),
            signature: String::new(),
        }
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> TrustResult<Vec<u8>> {
        let payload = UpdateSigningPayload {
            id: &self.id,
            kind: self.kind,
            peer_id: &self.peer_id,
            peer_signing_key: self.peer_signing_key.map(hex::encode),
            peer_exchange_key: self.peer_exchange_key.map(hex::encode),
            trust_level: self.trust_level,
            target_update_id: self.target_update_id.as_deref(),
            metadata: &self.metadata,
            timestamp: self.timestamp,
            expires_at: self.expires_at,
            signer_id: &self.signer_id,
            signer_key: hex::encode(self.signer_key),
            sequence: self.sequence,
            prev_hash: &self.prev_hash,
            nonce: &self.nonce,
        };
        Ok(serde_json::to_vec(&payload)?)
    }

    /// Sign with the local identity, filling in `signature`.
    pub fn sign<I: Identity>(&mut self, identity: &I) -> TrustResult<()> {
        let bundle = identity.sign(&self.signing_bytes()?)?;
        self.signature = BASE64.encode(&bundle.signature);
        Ok(())
    }

    /// Verify the signature against the embedded signer key.
    pub fn verify<I: Identity>(&self, identity: &I) -> TrustResult<bool> {
        let raw = BASE64
            .decode(&self.signature)
            .map_err(|e| TrustError::Malformed(format!("bad signature encoding: {e}")))?;
        Ok(identity
            .verify(&self.signing_bytes()?, &raw, &self.signer_key)
            .unwrap_or(false))
    }

    /// BLAKE3 hash of the canonical payload, hex. Chains the signer's next
    /// update to this one.
    pub fn chain_hash(&self) -> TrustResult<String> {
        Ok(blake3::hash(&self.signing_bytes()?).to_hex().to_string())
    }

    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Hash value chaining a signer's first update.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Time-plus-random update id.
fn generate_update_id(now: u64) -> String {
    let mut random = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut random);
    format!("{}-{}", now, hex::encode(random))
}

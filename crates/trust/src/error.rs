//! Error types for trust operations.

use thiserror::Error;

/// Errors that can occur while validating or applying trust updates.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Update carried an expiry in the past
    #[error("Trust update {id} has expired")]
    Expired { id: String },

    /// Signature did not verify against the signer key
    #[error("Invalid signature on trust update {id} from {signer_id}")]
    InvalidSignature { id: String, signer_id: String },

    /// Signer is not trusted enough to assert trust state
    #[error("Signer {signer_id} below required trust level")]
    UntrustedSigner { signer_id: String },

    /// Sequence number at or below the signer's watermark
    #[error("Stale sequence {sequence} from {signer_id} (watermark {watermark})")]
    StaleSequence {
        signer_id: String,
        sequence: u64,
        watermark: u64,
    },

    /// Update older than the state it would overwrite
    #[error("Update {id} loses last-write-wins conflict for peer {peer_id}")]
    Conflict { id: String, peer_id: String },

    /// Update id has been revoked
    #[error("Trust update {id} is revoked")]
    Revoked { id: String },

    /// Unknown or malformed update content
    #[error("Malformed trust update: {0}")]
    Malformed(String),

    /// Persistent store errors
    #[error("Trust store error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Identity collaborator errors
    #[error("Identity error: {0}")]
    Identity(#[from] sovra_core::CoreError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for trust operations.
pub type TrustResult<T> = Result<T, TrustError>;

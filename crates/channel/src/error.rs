//! Error types for secure channel operations.

use thiserror::Error;

/// Errors that can occur on a secure channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Operation requires an open channel
    #[error("Channel not open: {0}")]
    NotOpen(String),

    /// Envelope epoch is outside the one-epoch grace window
    #[error("Epoch {envelope} expired; channel is at epoch {current}")]
    EpochExpired { envelope: u64, current: u64 },

    /// Envelope epoch is ahead of the channel
    #[error("Epoch {envelope} ahead of channel epoch {current}")]
    EpochAhead { envelope: u64, current: u64 },

    /// AEAD decryption failed (auth tag mismatch)
    #[error("Decryption failed: {0}")]
    DecryptFailed(String),

    /// AEAD encryption failed
    #[error("Encryption failed: {0}")]
    EncryptFailed(String),

    /// Key agreement with the peer failed
    #[error("Key exchange failed: {0}")]
    KeyExchange(String),

    /// Malformed envelope (bad base64, wrong nonce size)
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// Channel in the wrong lifecycle state for the operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Payload serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;

//! Error types for routing fabric operations.

use thiserror::Error;

/// Errors that can occur in routing operations.
#[derive(Debug, Error)]
pub enum RoutingError {
    /// No table entry for the destination
    #[error("No route found to destination: {destination}")]
    NoRoute { destination: String },

    /// Hop signature could not be produced or checked
    #[error("Signature verification failed for hop by {node_id}")]
    SignatureVerification { node_id: String },

    /// Message violates a structural invariant
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Identity collaborator errors
    #[error("Identity error: {0}")]
    Identity(#[from] sovra_core::CoreError),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for routing operations.
pub type RoutingResult<T> = Result<T, RoutingError>;

//! Error types for Mirra

use std::io;
use thiserror::Error;

use crate::behavior::BehaviorMode;
use crate::fingerprint::RequestFingerprint;

/// Result type for Mirra operations
pub type Result<T> = std::result::Result<T, MirraError>;

/// Errors that can occur in Mirra
#[derive(Debug, Error)]
pub enum MirraError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Request cannot be fingerprinted
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Forwarding is disabled and nothing is stored for the request
    #[error("[proxy behavior is set to {mode}] No {id} stored in the proxy cache")]
    NoCachedResponse {
        /// Fingerprint that was looked up
        id: RequestFingerprint,
        /// Mode active at resolution time
        mode: BehaviorMode,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request body too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

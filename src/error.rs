/// Unified error types for identity sync
use thiserror::Error;

/// Main error type for the sync core
#[derive(Error, Debug)]
pub enum SyncError {
    /// Malformed DID, malformed document, oversized payload
    #[error("Validation error: {0}")]
    Validation(String),

    /// KDF or cipher failure, wrong password
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Operation attempted before the engine was keyed
    #[error("Not initialized: {0}")]
    NotInitialized(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded { retry_after: std::time::Duration },

    /// All resolution strategies exhausted
    #[error("DID not resolvable: {0}")]
    NotResolvable(String),

    /// Aggregated per-gateway failures
    #[error("All gateways failed: {}", failures.join("; "))]
    Gateway { failures: Vec<String> },

    /// No local or remote record; a normal, non-exceptional outcome
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Single gateway failure, for call sites that report one reason
    pub fn gateway(reason: impl Into<String>) -> Self {
        SyncError::Gateway {
            failures: vec![reason.into()],
        }
    }

    /// Human-readable message suitable for surfacing to an end user.
    ///
    /// Never includes raw gateway bodies or stack traces.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Validation(_) => "The identity data is invalid".to_string(),
            SyncError::Encryption(_) => "Decryption failed; check the password".to_string(),
            SyncError::NotInitialized(_) => "Set a password before syncing".to_string(),
            SyncError::RateLimitExceeded { .. } => {
                "Too many requests; try again shortly".to_string()
            }
            SyncError::NotResolvable(did) => format!("Could not resolve {}", did),
            SyncError::Gateway { .. } => "The storage network is unreachable".to_string(),
            SyncError::NotFound(_) => "No record found".to_string(),
            _ => "An internal error occurred".to_string(),
        }
    }
}

/// Result type alias for sync operations
pub type SyncResult<T> = Result<T, SyncError>;

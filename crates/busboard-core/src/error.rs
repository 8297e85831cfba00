//! Error types for busboard core operations.
//!
//! The taxonomy mirrors the failure modes of the engine: storage errors abort
//! with no partial commit, `WrongPassword` is the one condition that must
//! interrupt a sync flow and reach the UI layer, and remote errors degrade to
//! offline rather than failing the local operation.

use thiserror::Error;

/// Result type alias for busboard operations.
pub type Result<T> = std::result::Result<T, RosterError>;

/// Core error type for busboard operations.
#[derive(Debug, Error)]
pub enum RosterError {
    /// Durable-store transaction error. The operation aborts; no partial
    /// state change is committed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// AEAD tag verification failed during decrypt. Callers must treat this
    /// as a wrong-password signal and discard any cached key, not as a
    /// generic crypto or I/O error.
    #[error("Wrong password: document authentication failed")]
    WrongPassword,

    /// Network or remote backend failure. Swallowed at the push and
    /// subscribe boundaries; local truth is preserved.
    #[error("Remote unavailable: {0}")]
    RemoteUnavailable(String),

    /// Data validation error. Rejected before any store mutation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Encryption or decryption error other than authentication failure
    #[error("Crypto error: {0}")]
    Crypto(String),
}

impl From<std::io::Error> for RosterError {
    fn from(err: std::io::Error) -> Self {
        RosterError::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for RosterError {
    fn from(err: rusqlite::Error) -> Self {
        RosterError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RosterError {
    fn from(err: serde_json::Error) -> Self {
        RosterError::Validation(err.to_string())
    }
}

impl From<reqwest::Error> for RosterError {
    fn from(err: reqwest::Error) -> Self {
        RosterError::RemoteUnavailable(err.to_string())
    }
}

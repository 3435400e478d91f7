//! Error types for the board BFF gateway

use std::io;

use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure reaching the backend
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Token refresh failed; the session is no longer usable
    #[error("Credential refresh failed: {0}")]
    RefreshFailed(#[from] RefreshError),

    /// The auth endpoint rejected the supplied credentials
    #[error("Authentication rejected: HTTP {0}")]
    AuthRejected(u16),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True when the session is dead and the caller should clear it and
    /// prompt for a fresh login, as opposed to an ordinary request error.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::RefreshFailed(_) | Self::AuthRejected(_))
    }
}

/// Failure of a token refresh operation.
///
/// Cloneable so that every request waiting on a coalesced refresh can
/// receive the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The refresh endpoint answered with a non-2xx status
    #[error("refresh endpoint returned HTTP {0}")]
    Rejected(u16),

    /// The refresh endpoint could not be reached
    #[error("refresh transport failure: {0}")]
    Transport(String),

    /// The session holds no refresh token to send
    #[error("no refresh token in session")]
    MissingToken,

    /// The refresh task was cancelled before completing
    #[error("refresh task aborted")]
    Aborted,
}

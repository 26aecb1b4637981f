//! Transport error types.

use thiserror::Error;

/// Errors that can occur when delivering a session summary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The endpoint rejected the credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The endpoint returned a non-success response.
    #[error("analytics endpoint error (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

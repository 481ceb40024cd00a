//! Error types for registry operations

/// Errors from registry requests and credential loading.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint returned status {0}")]
    TokenRejected(u16),

    #[error("invalid token response: {0}")]
    TokenResponse(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

/// Result type alias for mirror operations
pub type Result<T, E = MirrorError> = std::result::Result<T, E>;

/// Errors that can occur while forwarding to a backend
#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("failed to read response body from {0}: {1}")]
    ResponseBodyError(String, String),

    #[error("request to {0} failed: {1}")]
    BackendRequestFailed(String, String),

    #[error("failed to build outbound request: {0}")]
    RequestBuildError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

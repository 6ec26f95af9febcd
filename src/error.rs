//! Error types for the render service

use serde::Serialize;
use thiserror::Error;

/// Result type alias for engine and pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while starting the engine or rendering a document
#[derive(Error, Debug)]
pub enum Error {
    /// Caller did not present the shared secret
    #[error("Unauthorized")]
    Unauthorized,

    /// Request input was rejected before touching the engine
    #[error("{0}")]
    Validation(String),

    /// The engine process could not be launched
    #[error("Engine start failed: {0}")]
    EngineStart(String),

    /// The manager has been shut down and will not launch again
    #[error("Engine has been shut down")]
    EngineStopped,

    /// Operation timed out
    #[error("Render timed out after {0}ms")]
    Timeout(u64),

    /// Failed to load or print the document
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// Closing a context or the engine failed
    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),
}

impl Error {
    /// Classification reported across the service boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Unauthorized => ErrorKind::Unauthorized,
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::EngineStart(_) | Error::EngineStopped => ErrorKind::EngineStartFailure,
            Error::Timeout(_) => ErrorKind::RenderTimeout,
            Error::RenderError(_) => ErrorKind::RenderFailure,
            Error::Cleanup(_) => ErrorKind::CleanupFailure,
            #[cfg(feature = "cdp")]
            Error::CdpError(_) => ErrorKind::RenderFailure,
        }
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Unauthorized,
    ValidationError,
    EngineStartFailure,
    RenderTimeout,
    RenderFailure,
    CleanupFailure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Unauthorized => "Unauthorized",
            ErrorKind::ValidationError => "ValidationError",
            ErrorKind::EngineStartFailure => "EngineStartFailure",
            ErrorKind::RenderTimeout => "RenderTimeout",
            ErrorKind::RenderFailure => "RenderFailure",
            ErrorKind::CleanupFailure => "CleanupFailure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

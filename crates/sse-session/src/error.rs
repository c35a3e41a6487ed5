//! Error types for SSE sessions

use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while setting up or serving sessions
///
/// Failures inside a running stream end up in `SessionOutcome` instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to deliver a frame to the peer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmissionError {
    /// The peer went away (response body dropped)
    #[error("peer closed the connection")]
    PeerClosed,

    /// The sink was closed locally after the terminal frame
    #[error("sink already closed")]
    SinkClosed,

    /// Any other transport failure
    #[error("write failed: {0}")]
    Failed(String),
}

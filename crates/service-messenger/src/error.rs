//! Error types for the messenger

use std::path::PathBuf;
use thiserror::Error;

/// Messenger error type
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket framing error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// I/O error (bind, connect, socket file handling)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// The peer answered a request with an error
    #[error("Remote error ({code}): {message}")]
    Remote {
        /// Error code reported by the peer
        code: String,
        /// Error message reported by the peer
        message: String,
    },

    /// A request handler failed locally
    #[error("Handler error: {0}")]
    Handler(String),

    /// No handler is registered for the requested action
    #[error("No handler registered for action: {0}")]
    NoHandler(String),

    /// Another live server already owns the channel
    #[error("Messenger channel already in use: {0:?}")]
    ChannelInUse(PathBuf),

    /// The connection was closed before the operation completed
    #[error("Messenger connection closed")]
    Closed,
}

impl Error {
    /// Create a handler error
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Error code used on the wire when this error answers a request
    pub fn code(&self) -> &'static str {
        match self {
            Error::NoHandler(_) => "no_handler",
            Error::Handler(_) | Error::Remote { .. } => "handler_error",
            Error::Json(_) => "invalid_payload",
            _ => "internal_error",
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

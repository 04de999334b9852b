use std::io;
use thiserror::Error;

/// Unified error type for the chat controller
#[derive(Error, Debug)]
pub enum ChatError {
    /// Missing or malformed process configuration (base URL, config file)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The inference server could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// No response (or no further data) within the request timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-2xx status
    #[error("HTTP error {status}: {body}")]
    Http { status: u16, body: String },

    /// Malformed catalog payload or response body
    #[error("Parse error: {0}")]
    Parse(String),

    /// Out-of-range option or unknown model
    #[error("Validation error: {0}")]
    Validation(String),

    /// Error object reported by the server inside the response stream
    #[error("Server error: {0}")]
    Api(String),

    /// Operation not legal in the controller's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Generation aborted by the caller
    #[error("Generation cancelled")]
    Cancelled,

    /// User input errors
    #[error("Input error: {0}")]
    Input(String),

    /// IO-related errors
    #[error("IO error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ChatError {
    /// Whether a bounded retry may recover from this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ChatError::Connection(_) | ChatError::Timeout(_))
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ChatError::Timeout(err.to_string())
        } else if err.is_connect() {
            ChatError::Connection(format!("Connection failed: {}", err))
        } else if let Some(status) = err.status() {
            ChatError::Http {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else if err.is_decode() {
            ChatError::Parse(err.to_string())
        } else {
            ChatError::Connection(format!("Request failed: {}", err))
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<serde_yml::Error> for ChatError {
    fn from(err: serde_yml::Error) -> Self {
        ChatError::Serialization(format!("YAML error: {}", err))
    }
}

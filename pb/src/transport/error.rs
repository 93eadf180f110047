//! Transport error types

use thiserror::Error;

/// Errors that can occur while building or issuing a request
///
/// Errors are `Clone` because one outcome may fan out to several handlers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Server returned status {status}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl TransportError {
    /// HTTP status code, if the server answered at all
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Check if the server was reached and refused the request
    pub fn is_server_error(&self) -> bool {
        matches!(self, TransportError::Status { status, .. } if *status >= 500)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => TransportError::Status {
                status: status.as_u16(),
                body: String::new(),
            },
            None => TransportError::Network(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

//! Transport layer
//!
//! A transport issues one request and reports the outcome. It knows nothing
//! about queueing or contact loss; that is the coordinator's job.

mod error;
mod http;
mod types;

use async_trait::async_trait;

pub use error::TransportError;
pub use http::HttpTransport;
pub use types::{Method, Response, Target};

/// One-shot asynchronous request issuer
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue `target` and wait for the server's answer
    ///
    /// Non-success statuses are returned as `TransportError::Status`.
    async fn issue(&self, target: &Target) -> Result<Response, TransportError>;
}

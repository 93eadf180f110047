//! HTTP transport backed by reqwest

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, REFERER};
use tracing::debug;

use super::Transport;
use super::error::TransportError;
use super::types::{Method, Response, Target};
use crate::config::ServerConfig;

/// Issues targets as real HTTP requests
///
/// No request timeout is set here: contact loss is detected by the coordinator.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    referer: Option<String>,
}

impl HttpTransport {
    /// Create a transport that sends `referer` on every request
    pub fn new(referer: Option<String>) -> Result<Self, TransportError> {
        let http = Client::builder().build()?;
        Ok(Self { http, referer })
    }

    /// Create a transport from the server section of the config
    pub fn from_config(config: &ServerConfig) -> Result<Self, TransportError> {
        debug!(base_url = %config.base_url, "HttpTransport::from_config: called");
        Self::new(config.referer.clone())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn issue(&self, target: &Target) -> Result<Response, TransportError> {
        debug!(%target, "HttpTransport::issue: called");
        let mut request = match target.method() {
            Method::Get => self.http.get(target.url().clone()),
            Method::Post => self.http.post(target.url().clone()),
        };

        if let Some(referer) = &self.referer {
            request = request.header(REFERER, referer);
        }

        if let Some(body) = target.body() {
            request = request.header(CONTENT_TYPE, "application/json").body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;

        if !(200..300).contains(&status) {
            debug!(%status, "HttpTransport::issue: non-success status");
            return Err(TransportError::Status { status, body });
        }

        Ok(Response { status, body })
    }
}

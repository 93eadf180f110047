//! Request and response types

use std::fmt;

use reqwest::Url;
use serde::de::DeserializeOwned;

use super::error::TransportError;

/// HTTP method of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Transport-addressable request description
///
/// The coordinator never looks inside a target; only the transport does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    method: Method,
    url: Url,
    body: Option<String>,
}

impl Target {
    /// GET an absolute URL
    pub fn get(url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            method: Method::Get,
            url: parse_url(url)?,
            body: None,
        })
    }

    /// GET `path` resolved beneath `base`
    ///
    /// A leading `/` on `path` is relative to the base path, so a server
    /// mounted at `http://host:9000/slim` keeps its prefix.
    pub fn resolve(base: &str, path: &str) -> Result<Self, TransportError> {
        let mut root = parse_url(base)?;
        if !root.path().ends_with('/') {
            let dir = format!("{}/", root.path());
            root.set_path(&dir);
        }
        let url = root
            .join(path.trim_start_matches('/'))
            .map_err(|e| TransportError::InvalidTarget(format!("{}{}: {}", base, path, e)))?;
        Ok(Self {
            method: Method::Get,
            url,
            body: None,
        })
    }

    /// POST a JSON document to an absolute URL
    pub fn post_json(url: &str, body: &serde_json::Value) -> Result<Self, TransportError> {
        Ok(Self {
            method: Method::Post,
            url: parse_url(url)?,
            body: Some(body.to_string()),
        })
    }

    /// Append query parameters, keeping any already present
    pub fn with_query<K, V>(mut self, params: &[(K, V)]) -> Self
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        if !params.is_empty() {
            let mut pairs = self.url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key.as_ref(), value.as_ref());
            }
        }
        self
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

fn parse_url(url: &str) -> Result<Url, TransportError> {
    Url::parse(url).map_err(|e| TransportError::InvalidTarget(format!("{}: {}", url, e)))
}

/// Successful response payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Response body as text
    pub fn text(&self) -> &str {
        &self.body
    }

    /// Decode the response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, TransportError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

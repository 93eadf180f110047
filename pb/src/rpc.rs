//! JSON-RPC proxy
//!
//! Calls are POSTed through the coordinator like any other target. Several
//! calls can be batched with [`RpcProxy::queue_call`]; only the reply to the
//! last call in a batch is returned.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::ServerConfig;
use crate::coordinator::{CallError, CallId, CoordinatorHandle, Outcome, handler};
use crate::transport::{Target, TransportError};

/// Errors from a JSON-RPC exchange
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("RPC endpoint not found at {url}; is the server running with the RPC plugin enabled?")]
    EndpointMissing { url: String },

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("RPC fault: {0}")]
    Fault(String),

    #[error("Invalid RPC reply: {0}")]
    Decode(String),

    #[error("No RPC calls to send")]
    Empty,
}

impl From<TransportError> for RpcError {
    fn from(err: TransportError) -> Self {
        RpcError::Call(CallError::Transport(err))
    }
}

/// One method invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcCall {
    pub method: String,
    pub params: Vec<Value>,
}

impl RpcCall {
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Client-side proxy for a JSON-RPC endpoint
#[derive(Debug)]
pub struct RpcProxy {
    url: String,
    queue: Mutex<Vec<RpcCall>>,
}

impl RpcProxy {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            queue: Mutex::new(Vec::new()),
        }
    }

    /// Create a proxy for the configured RPC endpoint
    pub fn from_config(server: &ServerConfig) -> Result<Self, TransportError> {
        Ok(Self::new(server.rpc_url()?))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Add a call to the next batch without sending anything
    pub fn queue_call(&self, method: impl Into<String>, params: Vec<Value>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push(RpcCall::new(method, params));
        }
    }

    /// Number of calls waiting for the next batch
    pub fn pending(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Drain the batch (plus `call`, if any) into a POST target
    ///
    /// A single call is sent as an object, several as an array.
    pub fn build(&self, call: Option<RpcCall>) -> Result<Target, RpcError> {
        let mut batch = match self.queue.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => Vec::new(),
        };
        batch.extend(call);

        let body = match batch.len() {
            0 => return Err(RpcError::Empty),
            1 => serde_json::to_value(&batch[0]),
            _ => serde_json::to_value(&batch),
        }
        .map_err(|e| RpcError::Decode(e.to_string()))?;

        debug!(url = %self.url, calls = batch.len(), "RpcProxy::build: called");
        Ok(Target::post_json(&self.url, &body)?)
    }

    /// Send `method` (after any queued calls) and wait for the reply
    pub async fn call(
        &self,
        coordinator: &CoordinatorHandle,
        method: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<Value, RpcError> {
        let target = self.build(Some(RpcCall::new(method, params)))?;
        let outcome = coordinator.call(target).await;
        decode_reply(&self.url, &outcome)
    }

    /// Send `method` (after any queued calls); `on_reply` receives the decoded reply
    pub fn submit<F>(
        &self,
        coordinator: &CoordinatorHandle,
        method: impl Into<String>,
        params: Vec<Value>,
        on_reply: F,
    ) -> eyre::Result<CallId>
    where
        F: Fn(Result<Value, RpcError>) + Send + Sync + 'static,
    {
        let target = self.build(Some(RpcCall::new(method, params)))?;
        let url = self.url.clone();
        coordinator.submit(target, handler(move |_, outcome| on_reply(decode_reply(&url, outcome))))
    }
}

/// Turn a call outcome into the RPC result
///
/// For a batch reply the last element wins. The `result` member is returned
/// when present, otherwise the whole reply object.
pub fn decode_reply(url: &str, outcome: &Outcome) -> Result<Value, RpcError> {
    let response = match outcome {
        Ok(response) => response,
        Err(CallError::Transport(err)) if err.status() == Some(404) => {
            return Err(RpcError::EndpointMissing { url: url.to_string() });
        }
        Err(err) => return Err(RpcError::Call(err.clone())),
    };

    let mut reply = match response.json::<Value>().map_err(|e| RpcError::Decode(e.to_string()))? {
        Value::Array(items) => items
            .into_iter()
            .last()
            .ok_or_else(|| RpcError::Decode("empty batch reply".to_string()))?,
        single => single,
    };

    if let Some(error) = reply.get("error")
        && !error.is_null()
    {
        let message = match error {
            Value::String(s) => s.clone(),
            Value::Object(obj) => obj
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
            other => other.to_string(),
        };
        return Err(RpcError::Fault(message));
    }

    if let Some(result) = reply.get_mut("result") {
        return Ok(result.take());
    }
    Ok(reply)
}

//! Postback - single-slot request coordinator for media server control panels
//!
//! Control-panel pages poll the server constantly: status refreshes, progress
//! bars, playlist edits. Postback funnels all of those through one coordinator
//! that keeps a single request in flight, drains the backlog in order, skips
//! results that a queued refresh will supersede anyway, and notices when the
//! server stops answering.
//!
//! # Modules
//!
//! - [`coordinator`] - the request coordinator and its handle
//! - [`transport`] - request targets and the reqwest-backed transport
//! - [`backend`] - endpoints that fan responses out to many handlers
//! - [`rpc`] - JSON-RPC proxy with call batching
//! - [`session`] - rebuilds coordinators across forced reloads
//! - [`config`] - configuration types and loading
//! - [`cli`] - command-line interface

pub mod backend;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod rpc;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use backend::Backend;
pub use config::{Config, ServerConfig};
pub use coordinator::{
    CallError, CallId, Coordinator, CoordinatorConfig, CoordinatorHandle, CoordinatorMetrics, CoordinatorState,
    Handler, Outcome, PageLifecycle, ReloadReason, SharedHandler, handler,
};
pub use rpc::{RpcCall, RpcError, RpcProxy};
pub use session::{ConsoleLifecycle, Running, Session};
pub use transport::{HttpTransport, Method, Response, Target, Transport, TransportError};

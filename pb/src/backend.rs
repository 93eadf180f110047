//! Backends: one endpoint, many listeners
//!
//! A backend fans every response out to all of its subscribed handlers. All
//! submissions of one backend share a single handler identity, so the
//! coordinator coalesces a backend's redundant refreshes as a unit.

use std::sync::{Arc, Mutex};

use eyre::Result;
use tracing::debug;

use crate::coordinator::{CallId, CoordinatorHandle, Handler, Outcome, SharedHandler, same_handler};
use crate::transport::{Target, TransportError};

/// Subscriber list shared by every call of a backend
#[derive(Default)]
struct Fanout {
    handlers: Mutex<Vec<SharedHandler>>,
}

impl Fanout {
    fn is_subscribed(&self, handler: &SharedHandler) -> bool {
        self.handlers
            .lock()
            .map(|handlers| handlers.iter().any(|h| same_handler(h, handler)))
            .unwrap_or(false)
    }
}

impl Handler for Fanout {
    fn handle(&self, target: &Target, outcome: &Outcome) {
        // Snapshot so handlers can add or remove subscribers while being called
        let snapshot = match self.handlers.lock() {
            Ok(handlers) => handlers.clone(),
            Err(_) => return,
        };
        for handler in snapshot {
            // Removed by an earlier handler during this fan-out
            if !self.is_subscribed(&handler) {
                continue;
            }
            handler.handle(target, outcome);
        }
    }
}

/// A named server endpoint with subscribed handlers
pub struct Backend {
    coordinator: CoordinatorHandle,
    base_url: String,
    global_arg: Mutex<String>,
    fanout: Arc<Fanout>,
}

impl Backend {
    /// Create a backend for `base_url`, e.g. `http://localhost:9000/status.xml?`
    pub fn new(coordinator: CoordinatorHandle, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        debug!(%base_url, "Backend::new: called");
        Self {
            coordinator,
            base_url,
            global_arg: Mutex::new(String::new()),
            fanout: Arc::new(Fanout::default()),
        }
    }

    /// Subscribe a handler to every response of this backend
    pub fn add_handler(&self, handler: SharedHandler) {
        if let Ok(mut handlers) = self.fanout.handlers.lock() {
            handlers.push(handler);
        }
    }

    /// Unsubscribe a handler by identity
    ///
    /// Returns true if it was subscribed.
    pub fn remove_handler(&self, handler: &SharedHandler) -> bool {
        let Ok(mut handlers) = self.fanout.handlers.lock() else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|h| !same_handler(h, handler));
        handlers.len() != before
    }

    pub fn handler_count(&self) -> usize {
        self.fanout.handlers.lock().map(|h| h.len()).unwrap_or(0)
    }

    /// Set the argument string inserted between the base URL and per-call args
    pub fn set_global_arg(&self, arg: impl Into<String>) {
        if let Ok(mut global) = self.global_arg.lock() {
            *global = arg.into();
        }
    }

    /// Build the target for `args`: base URL, then the global arg, then `args`
    pub fn target(&self, args: &str) -> Result<Target, TransportError> {
        let global = self.global_arg.lock().map(|g| g.clone()).unwrap_or_default();
        Target::get(&format!("{}{}{}", self.base_url, global, args))
    }

    /// Submit a request whose response goes to every subscribed handler
    pub fn submit(&self, args: &str) -> Result<CallId> {
        let target = self.target(args)?;
        debug!(%target, subscribers = self.handler_count(), "Backend::submit: called");
        let handler: SharedHandler = self.fanout.clone();
        self.coordinator.submit(target, handler)
    }
}

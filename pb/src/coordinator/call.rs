//! Calls, handlers, and call outcomes

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::transport::{Response, Target, TransportError};

/// Why a call did not produce a response
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CallError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Lost contact with the server")]
    ContactLost,

    #[error("Coordinator shut down before the call completed")]
    Shutdown,
}

/// What a handler receives for its call
pub type Outcome = Result<Response, CallError>;

/// Receives the outcome of a submitted call
///
/// Handlers run on the coordinator task, so they must not block. Submitting
/// further calls from inside a handler is fine.
pub trait Handler: Send + Sync {
    fn handle(&self, target: &Target, outcome: &Outcome);
}

impl<F> Handler for F
where
    F: Fn(&Target, &Outcome) + Send + Sync,
{
    fn handle(&self, target: &Target, outcome: &Outcome) {
        self(target, outcome)
    }
}

/// Handler shared between call sites; identity is the allocation
pub type SharedHandler = Arc<dyn Handler>;

/// Wrap a closure as a shared handler
pub fn handler<F>(f: F) -> SharedHandler
where
    F: Fn(&Target, &Outcome) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Compare handlers by identity, not by behavior
pub fn same_handler(a: &SharedHandler, b: &SharedHandler) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

/// Identifier assigned to every submitted call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallId(Uuid);

impl CallId {
    pub(crate) fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A target paired with the handler that wants its result
pub(crate) struct Call {
    pub id: CallId,
    pub target: Target,
    pub handler: SharedHandler,
}

impl Call {
    pub fn new(target: Target, handler: SharedHandler) -> Self {
        Self {
            id: CallId::new(),
            target,
            handler,
        }
    }
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

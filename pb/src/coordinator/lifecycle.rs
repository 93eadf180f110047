//! Page lifecycle hook

use std::fmt;

use tracing::warn;

use crate::transport::{Target, TransportError};

/// Why the coordinator gave up and asked for a reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// The server answered again after contact was lost; local state is stale
    ContactRestored,

    /// The diagnostic probe returned an error
    ProbeFailed,

    /// The diagnostic probe got no answer either
    ProbeTimedOut,

    /// Too many consecutive transport errors
    ErrorThreshold,
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadReason::ContactRestored => write!(f, "contact restored"),
            ReloadReason::ProbeFailed => write!(f, "probe failed"),
            ReloadReason::ProbeTimedOut => write!(f, "probe timed out"),
            ReloadReason::ErrorThreshold => write!(f, "error threshold reached"),
        }
    }
}

/// Owner-side hooks the coordinator calls into
pub trait PageLifecycle: Send + Sync {
    /// Throw away everything built on top of this coordinator and start over
    fn force_reload(&self, reason: ReloadReason);

    /// Surface a transport error to the user
    fn report_error(&self, target: &Target, error: &TransportError) {
        warn!(%target, %error, "Transport error");
    }
}

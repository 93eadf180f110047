//! Message types for the Coordinator

use serde::Serialize;
use tokio::sync::oneshot;

use super::call::{Call, CallId};
use super::lifecycle::ReloadReason;
use crate::transport::{Response, TransportError};

/// Internal requests to the Coordinator task
#[derive(Debug)]
pub(crate) enum CoordRequest {
    /// Dispatch or enqueue a call
    Submit { call: Call },

    /// The transport finished a call
    Completed {
        call_id: CallId,
        outcome: Result<Response, TransportError>,
    },

    /// A call's contact timer expired (internal)
    Timeout { call_id: CallId },

    /// The reload delay elapsed (internal)
    Reload { reason: ReloadReason },

    /// Get current metrics
    GetMetrics {
        reply_tx: oneshot::Sender<CoordinatorMetrics>,
    },

    /// Shutdown the coordinator
    Shutdown,
}

/// Coarse coordinator state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoordinatorState {
    #[default]
    Idle,
    InFlight,
    ContactLost,
}

/// Coordinator metrics for observability
#[derive(Debug, Clone, Default, Serialize)]
pub struct CoordinatorMetrics {
    pub state: CoordinatorState,
    #[serde(rename = "queue-depth")]
    pub queue_depth: usize,
    #[serde(rename = "peak-queue-depth")]
    pub peak_queue_depth: usize,
    pub dispatched: u64,
    pub delivered: u64,
    pub coalesced: u64,
    #[serde(rename = "transport-errors")]
    pub transport_errors: u64,
    pub timeouts: u64,
    pub probes: u64,
    #[serde(rename = "stale-discarded")]
    pub stale_discarded: u64,
    pub rejected: u64,
    #[serde(rename = "handler-panics")]
    pub handler_panics: u64,
}

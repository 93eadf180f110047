//! CoordinatorHandle - Client interface for call sites

use std::sync::{Arc, Mutex};

use eyre::{Result, eyre};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::call::{Call, CallError, CallId, Handler, Outcome, SharedHandler};
use super::messages::{CoordRequest, CoordinatorMetrics};
use crate::transport::{Response, Target};

/// Handle for call sites to submit work to the Coordinator
///
/// This handle is cloneable. `submit` never blocks, so it is safe to call from
/// inside a handler running on the coordinator task.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<CoordRequest>,
}

impl CoordinatorHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CoordRequest>) -> Self {
        Self { tx }
    }

    /// Submit a call; `handler` receives the outcome later
    ///
    /// Fails only if the coordinator is gone.
    pub fn submit(&self, target: Target, handler: SharedHandler) -> Result<CallId> {
        let call = Call::new(target, handler);
        let call_id = call.id;
        debug!(%call_id, target = %call.target, "CoordinatorHandle::submit: called");

        self.tx
            .send(CoordRequest::Submit { call })
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        Ok(call_id)
    }

    /// Submit a call and wait for its outcome
    ///
    /// Each call gets its own handler, so these are never coalesced.
    pub async fn call(&self, target: Target) -> Result<Response, CallError> {
        debug!(%target, "CoordinatorHandle::call: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        if self.submit(target, Arc::new(ReplyHandler::new(reply_tx))).is_err() {
            return Err(CallError::Shutdown);
        }

        // A dropped sender means the call was still queued when the coordinator stopped
        reply_rx.await.unwrap_or(Err(CallError::Shutdown))
    }

    /// Get current coordinator metrics
    pub async fn metrics(&self) -> Result<CoordinatorMetrics> {
        debug!("CoordinatorHandle::metrics: called");
        let (reply_tx, reply_rx) = oneshot::channel();

        self.tx
            .send(CoordRequest::GetMetrics { reply_tx })
            .map_err(|_| eyre!("Coordinator channel closed"))?;

        reply_rx.await.map_err(|_| eyre!("Coordinator shutdown before reply"))
    }

    /// Request shutdown of the Coordinator
    pub fn shutdown(&self) -> Result<()> {
        debug!("CoordinatorHandle::shutdown: called");
        self.tx
            .send(CoordRequest::Shutdown)
            .map_err(|_| eyre!("Coordinator channel closed"))
    }

    /// Check whether the coordinator task has stopped
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Forwards one outcome into a oneshot channel
struct ReplyHandler {
    tx: Mutex<Option<oneshot::Sender<Outcome>>>,
}

impl ReplyHandler {
    fn new(tx: oneshot::Sender<Outcome>) -> Self {
        Self { tx: Mutex::new(Some(tx)) }
    }
}

impl Handler for ReplyHandler {
    fn handle(&self, _target: &Target, outcome: &Outcome) {
        if let Ok(mut slot) = self.tx.lock()
            && let Some(tx) = slot.take()
        {
            let _ = tx.send(outcome.clone());
        }
    }
}

//! Main Coordinator task implementation

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::call::{Call, CallError, CallId, Outcome, handler, same_handler};
use super::config::CoordinatorConfig;
use super::handle::CoordinatorHandle;
use super::lifecycle::{PageLifecycle, ReloadReason};
use super::messages::{CoordRequest, CoordinatorMetrics, CoordinatorState};
use crate::transport::{Response, Target, Transport, TransportError};

/// The call currently occupying the single transport slot
struct InFlight {
    call: Call,
    /// The diagnostic probe sent after a timeout
    probe: bool,
    /// Contact timer; exists exactly as long as the call is in flight
    timer: JoinHandle<()>,
}

/// The Coordinator serializes calls to one in-flight request at a time
///
/// All state is owned by the task running [`Coordinator::run`]; call sites talk
/// to it through a [`CoordinatorHandle`].
pub struct Coordinator {
    config: CoordinatorConfig,
    transport: Arc<dyn Transport>,
    lifecycle: Arc<dyn PageLifecycle>,
    /// Lightweight endpoint used to check whether the server is still there
    probe: Target,
    tx: mpsc::UnboundedSender<CoordRequest>,
    rx: mpsc::UnboundedReceiver<CoordRequest>,

    in_flight: Option<InFlight>,
    pending: VecDeque<Call>,
    contact_lost: bool,
    probe_sent: bool,
    reload_scheduled: bool,
    consecutive_errors: u32,
    metrics: CoordinatorMetrics,
}

impl Coordinator {
    /// Create a new Coordinator
    pub fn new(
        config: CoordinatorConfig,
        transport: Arc<dyn Transport>,
        lifecycle: Arc<dyn PageLifecycle>,
        probe: Target,
    ) -> Self {
        debug!(?config, %probe, "Coordinator::new: called");
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            transport,
            lifecycle,
            probe,
            tx,
            rx,
            in_flight: None,
            pending: VecDeque::new(),
            contact_lost: false,
            probe_sent: false,
            reload_scheduled: false,
            consecutive_errors: 0,
            metrics: CoordinatorMetrics::default(),
        }
    }

    /// Create a handle for call sites
    pub fn handle(&self) -> CoordinatorHandle {
        CoordinatorHandle::new(self.tx.clone())
    }

    /// Run the Coordinator task
    ///
    /// This consumes the Coordinator and runs until shutdown is requested or a
    /// reload is forced. Returns the reload reason in the latter case; the owner
    /// is expected to build a fresh coordinator.
    pub async fn run(mut self) -> Option<ReloadReason> {
        info!("Coordinator started");
        let mut reloaded = None;

        while let Some(req) = self.rx.recv().await {
            match req {
                CoordRequest::Submit { call } => self.on_submit(call),

                CoordRequest::Completed { call_id, outcome } => self.on_completed(call_id, outcome),

                CoordRequest::Timeout { call_id } => self.on_timeout(call_id),

                CoordRequest::Reload { reason } => {
                    info!(%reason, dropped = self.pending.len(), "Forcing reload");
                    self.lifecycle.force_reload(reason);
                    reloaded = Some(reason);
                    break;
                }

                CoordRequest::GetMetrics { reply_tx } => {
                    let _ = reply_tx.send(self.snapshot());
                }

                CoordRequest::Shutdown => {
                    info!("Coordinator shutting down");
                    break;
                }
            }
        }

        if let Some(in_flight) = self.in_flight.take() {
            in_flight.timer.abort();
        }

        info!("Coordinator stopped");
        reloaded
    }

    fn on_submit(&mut self, call: Call) {
        debug!(call_id = %call.id, target = %call.target, "Coordinator::on_submit: called");

        if self.contact_lost {
            debug!(call_id = %call.id, "Coordinator::on_submit: contact lost, rejecting");
            self.metrics.rejected += 1;
            self.invoke(&call, &Err(CallError::ContactLost));
            return;
        }

        if self.in_flight.is_none() {
            self.dispatch(call, false);
        } else {
            self.pending.push_back(call);
            self.metrics.peak_queue_depth = self.metrics.peak_queue_depth.max(self.pending.len());
            debug!(depth = self.pending.len(), "Coordinator::on_submit: queued");
        }
    }

    /// Hand a call to the transport and arm its contact timer
    fn dispatch(&mut self, call: Call, probe: bool) {
        debug!(call_id = %call.id, target = %call.target, probe, "Dispatching call");
        let call_id = call.id;

        let transport = Arc::clone(&self.transport);
        let target = call.target.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let outcome = transport.issue(&target).await;
            let _ = tx.send(CoordRequest::Completed { call_id, outcome });
        });

        let timeout = self.config.contact_timeout();
        let tx = self.tx.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(CoordRequest::Timeout { call_id });
        });

        self.metrics.dispatched += 1;
        self.in_flight = Some(InFlight { call, probe, timer });
    }

    fn on_completed(&mut self, call_id: CallId, outcome: Result<Response, TransportError>) {
        let current = self.in_flight.as_ref().is_some_and(|f| f.call.id == call_id);
        if !current {
            // Abandoned by a timeout; never delivered
            self.metrics.stale_discarded += 1;
            if self.contact_lost && outcome.is_ok() {
                debug!(%call_id, "Late response after contact loss");
                self.schedule_reload(ReloadReason::ContactRestored);
            } else {
                debug!(%call_id, "Discarding stale completion");
            }
            return;
        }

        let Some(InFlight { call, probe, timer }) = self.in_flight.take() else {
            return;
        };
        timer.abort();

        if probe {
            match outcome {
                Ok(_) => self.schedule_reload(ReloadReason::ContactRestored),
                Err(err) => {
                    warn!(error = %err, "Probe failed");
                    self.schedule_reload(ReloadReason::ProbeFailed);
                }
            }
            return;
        }

        let outcome: Outcome = match outcome {
            Ok(response) => {
                self.consecutive_errors = 0;
                Ok(response)
            }
            Err(err) => {
                self.consecutive_errors += 1;
                self.metrics.transport_errors += 1;
                warn!(
                    call_id = %call.id,
                    target = %call.target,
                    error = %err,
                    server_error = err.is_server_error(),
                    consecutive = self.consecutive_errors,
                    "Call failed"
                );
                self.lifecycle.report_error(&call.target, &err);
                Err(CallError::Transport(err))
            }
        };

        if self.config.error_threshold_reached(self.consecutive_errors) {
            warn!(consecutive = self.consecutive_errors, "Error threshold reached, contact lost");
            self.contact_lost = true;
            self.schedule_reload(ReloadReason::ErrorThreshold);
            self.deliver(&call, &outcome);
            return;
        }

        // A fresher result for the same handler is already queued
        let superseded = outcome.is_ok()
            && self
                .pending
                .iter()
                .any(|queued| same_handler(&queued.handler, &call.handler));

        // The queue advances after every outcome, errors included
        if let Some(next) = self.pending.pop_front() {
            self.dispatch(next, false);
        }

        if superseded {
            debug!(call_id = %call.id, "Coalescing delivery into queued call");
            self.metrics.coalesced += 1;
        } else {
            self.deliver(&call, &outcome);
        }
    }

    fn on_timeout(&mut self, call_id: CallId) {
        let current = self.in_flight.as_ref().is_some_and(|f| f.call.id == call_id);
        if !current {
            debug!(%call_id, "Ignoring timer for a finished call");
            return;
        }

        let Some(expired) = self.in_flight.take() else {
            return;
        };
        self.metrics.timeouts += 1;

        if expired.probe {
            warn!(target = %expired.call.target, "Probe timed out");
            self.schedule_reload(ReloadReason::ProbeTimedOut);
            return;
        }

        warn!(
            call_id = %call_id,
            target = %expired.call.target,
            timeout_ms = self.config.contact_timeout_ms,
            "No response in time, contact lost"
        );
        self.contact_lost = true;

        // The abandoned call's answer is never trusted, even if it shows up later
        self.invoke(&expired.call, &Err(CallError::ContactLost));
        self.send_probe();
    }

    fn send_probe(&mut self) {
        if self.probe_sent {
            return;
        }
        self.probe_sent = true;
        self.metrics.probes += 1;

        let call = Call::new(self.probe.clone(), handler(|_, _| {}));
        self.dispatch(call, true);
    }

    fn schedule_reload(&mut self, reason: ReloadReason) {
        if self.reload_scheduled {
            debug!(%reason, "Reload already scheduled");
            return;
        }
        self.reload_scheduled = true;
        self.contact_lost = true;

        let delay = self.config.reload_delay();
        info!(%reason, delay_ms = self.config.reload_delay_ms, "Scheduling reload");

        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(CoordRequest::Reload { reason });
        });
    }

    fn deliver(&mut self, call: &Call, outcome: &Outcome) {
        self.metrics.delivered += 1;
        self.invoke(call, outcome);
    }

    /// Run a call's handler; a panic is logged and counted, and the coordinator carries on
    fn invoke(&mut self, call: &Call, outcome: &Outcome) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| call.handler.handle(&call.target, outcome)));
        if let Err(payload) = result {
            self.metrics.handler_panics += 1;
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            warn!(call_id = %call.id, target = %call.target, panic = %message, "Handler panicked");
        }
    }

    fn snapshot(&self) -> CoordinatorMetrics {
        let state = if self.contact_lost {
            CoordinatorState::ContactLost
        } else if self.in_flight.is_some() {
            CoordinatorState::InFlight
        } else {
            CoordinatorState::Idle
        };

        CoordinatorMetrics {
            state,
            queue_depth: self.pending.len(),
            ..self.metrics.clone()
        }
    }
}

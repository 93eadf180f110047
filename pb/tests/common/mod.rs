//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use postback::coordinator::{
    Coordinator, CoordinatorConfig, CoordinatorHandle, Outcome, PageLifecycle, ReloadReason, SharedHandler, handler,
};
use postback::transport::{Response, Target, Transport, TransportError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub const BASE: &str = "http://localhost:9000";

pub type Reply = oneshot::Sender<Result<Response, TransportError>>;

pub fn target(path: &str) -> Target {
    Target::resolve(BASE, path).unwrap()
}

/// Parks every request until the test answers it
pub struct ManualTransport {
    issued: mpsc::UnboundedSender<(Target, Reply)>,
}

#[async_trait]
impl Transport for ManualTransport {
    async fn issue(&self, target: &Target) -> Result<Response, TransportError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self.issued.send((target.clone(), reply_tx));
        reply_rx
            .await
            .unwrap_or_else(|_| Err(TransportError::Network("reply dropped".to_string())))
    }
}

/// Answers immediately with the full request URL, tracking overlap
#[derive(Default)]
pub struct EchoTransport {
    active: AtomicUsize,
    peak: AtomicUsize,
    issued: AtomicUsize,
}

impl EchoTransport {
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for EchoTransport {
    async fn issue(&self, target: &Target) -> Result<Response, TransportError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.issued.fetch_add(1, Ordering::SeqCst);

        // Give anything else that could run a chance to overlap
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(Response::new(200, target.url().as_str()))
    }
}

/// Answers from a closure
pub struct FnTransport<F>(pub F);

#[async_trait]
impl<F> Transport for FnTransport<F>
where
    F: Fn(&Target) -> Result<Response, TransportError> + Send + Sync,
{
    async fn issue(&self, target: &Target) -> Result<Response, TransportError> {
        (self.0)(target)
    }
}

#[derive(Default)]
pub struct RecordingLifecycle {
    pub reloads: Mutex<Vec<ReloadReason>>,
    pub errors: Mutex<Vec<String>>,
}

impl PageLifecycle for RecordingLifecycle {
    fn force_reload(&self, reason: ReloadReason) {
        self.reloads.lock().unwrap().push(reason);
    }

    fn report_error(&self, _target: &Target, error: &TransportError) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

pub struct Harness {
    pub coord: CoordinatorHandle,
    pub lifecycle: Arc<RecordingLifecycle>,
    pub task: JoinHandle<Option<ReloadReason>>,
}

/// Spawn a coordinator over `transport`, probing `/status.txt`
pub fn spawn(config: CoordinatorConfig, transport: Arc<dyn Transport>) -> Harness {
    let lifecycle = Arc::new(RecordingLifecycle::default());
    let coordinator = Coordinator::new(config, transport, lifecycle.clone(), target("/status.txt"));
    let coord = coordinator.handle();
    let task = tokio::spawn(coordinator.run());
    Harness { coord, lifecycle, task }
}

/// Spawn a coordinator whose requests the test answers by hand
pub fn spawn_manual(config: CoordinatorConfig) -> (Harness, mpsc::UnboundedReceiver<(Target, Reply)>) {
    let (issued_tx, issued) = mpsc::unbounded_channel();
    let harness = spawn(config, Arc::new(ManualTransport { issued: issued_tx }));
    (harness, issued)
}

/// Handler that forwards (path, outcome) pairs into a channel
pub fn recorder() -> (SharedHandler, mpsc::UnboundedReceiver<(String, Outcome)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let h = handler(move |target: &Target, outcome: &Outcome| {
        let _ = tx.send((target.url().path().to_string(), outcome.clone()));
    });
    (h, rx)
}

/// Body of a successful outcome
pub fn body(outcome: &Outcome) -> &str {
    match outcome {
        Ok(response) => response.text(),
        Err(err) => panic!("expected a response, got {err}"),
    }
}

//! Session - owner of the coordinator's lifetime
//!
//! A forced reload ends a coordinator for good. The session is what builds
//! the next one, the way a browser reloads the page.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use eyre::{Context, Result};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::coordinator::{Coordinator, CoordinatorHandle, PageLifecycle, ReloadReason};
use crate::transport::{HttpTransport, Target, Transport, TransportError};

/// Lifecycle hook for terminal use: errors go to stderr, reloads to the log
#[derive(Debug, Default)]
pub struct ConsoleLifecycle;

impl PageLifecycle for ConsoleLifecycle {
    fn force_reload(&self, reason: ReloadReason) {
        info!(%reason, "Reload requested");
    }

    fn report_error(&self, target: &Target, error: &TransportError) {
        warn!(%target, %error, "Transport error");
        eprintln!("Error loading {}: {}", target.url(), error);
    }
}

/// Builds coordinators from one config, one per reload generation
pub struct Session {
    config: Config,
    transport: Arc<dyn Transport>,
    lifecycle: Arc<dyn PageLifecycle>,
    generation: AtomicU32,
}

impl Session {
    pub fn new(config: Config, transport: Arc<dyn Transport>, lifecycle: Arc<dyn PageLifecycle>) -> Self {
        Self {
            config,
            transport,
            lifecycle,
            generation: AtomicU32::new(0),
        }
    }

    /// Session talking HTTP to the configured server
    pub fn connect(config: Config) -> Result<Self> {
        let transport = HttpTransport::from_config(&config.server).context("Failed to create HTTP transport")?;
        Ok(Self::new(config, Arc::new(transport), Arc::new(ConsoleLifecycle)))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of coordinators started so far
    pub fn generation(&self) -> u32 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Build and spawn a fresh coordinator
    pub fn start(&self) -> Result<Running> {
        let probe = self.config.server.probe_target().context("Invalid probe target")?;
        let coordinator = Coordinator::new(
            self.config.coordinator.clone(),
            Arc::clone(&self.transport),
            Arc::clone(&self.lifecycle),
            probe,
        );
        let handle = coordinator.handle();
        let task = tokio::spawn(coordinator.run());

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Session::start: coordinator spawned");
        Ok(Running { handle, task })
    }
}

/// A spawned coordinator and its handle
pub struct Running {
    pub handle: CoordinatorHandle,
    task: JoinHandle<Option<ReloadReason>>,
}

impl Running {
    /// Wait for the coordinator to stop on its own
    ///
    /// Returns the reload reason if it stopped because contact was lost.
    pub async fn wait(self) -> Result<Option<ReloadReason>> {
        self.task.await.context("Coordinator task failed")
    }

    /// Shut the coordinator down and wait for it
    pub async fn finish(self) -> Result<Option<ReloadReason>> {
        // Already stopped if this fails; the join below still reports why
        let _ = self.handle.shutdown();
        self.wait().await
    }
}

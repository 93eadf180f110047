//! Request coordinator
//!
//! The Coordinator keeps at most one request in flight:
//! - **Submit:** dispatch immediately when idle, otherwise queue FIFO
//! - **Drain:** each completion dispatches the next queued call
//! - **Coalesce:** a result is skipped when its handler is queued again
//! - **Contact loss:** a timeout sends one probe, then forces a reload

mod call;
mod config;
mod core;
mod handle;
mod lifecycle;
mod messages;

pub use call::{CallError, CallId, Handler, Outcome, SharedHandler, handler, same_handler};
pub use config::CoordinatorConfig;
pub use self::core::Coordinator;
pub use handle::CoordinatorHandle;
pub use lifecycle::{PageLifecycle, ReloadReason};
pub use messages::{CoordinatorMetrics, CoordinatorState};

//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Declare contact lost after waiting this long for a response
    #[serde(rename = "contact-timeout-ms", default = "default_contact_timeout_ms")]
    pub contact_timeout_ms: u64,

    /// Declare contact lost after this many consecutive transport errors (0 disables)
    #[serde(rename = "error-threshold", default = "default_error_threshold")]
    pub error_threshold: u32,

    /// Wait this long between losing contact and forcing the reload
    #[serde(rename = "reload-delay-ms", default = "default_reload_delay_ms")]
    pub reload_delay_ms: u64,
}

fn default_contact_timeout_ms() -> u64 {
    10_000
}

fn default_error_threshold() -> u32 {
    2
}

fn default_reload_delay_ms() -> u64 {
    5_000
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            contact_timeout_ms: 10_000,
            error_threshold: 2,
            reload_delay_ms: 5_000,
        }
    }
}

impl CoordinatorConfig {
    /// Get the contact timeout as a Duration
    pub fn contact_timeout(&self) -> Duration {
        Duration::from_millis(self.contact_timeout_ms)
    }

    /// Get the reload delay as a Duration
    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.reload_delay_ms)
    }

    /// Check whether `consecutive` errors should be treated as lost contact
    pub fn error_threshold_reached(&self, consecutive: u32) -> bool {
        self.error_threshold > 0 && consecutive >= self.error_threshold
    }
}

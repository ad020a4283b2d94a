//! Runtime options

use std::time::Duration;

use crate::automation::sweeper::SweeperOptions;
use crate::logs::LogOptions;
use crate::workers::automation;

/// Runtime lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Upper bound on graceful shutdown before giving up
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(15),
        }
    }
}

/// Top-level application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Spawn the recurring automation worker
    pub enable_automation: bool,

    /// Automation worker cadence
    pub automation_worker: automation::Options,

    /// Sweep pass tuning
    pub sweeper: SweeperOptions,

    /// Lifecycle behavior
    pub lifecycle: LifecycleOptions,

    /// Logging configuration
    pub logs: LogOptions,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            enable_automation: true,
            automation_worker: automation::Options::default(),
            sweeper: SweeperOptions::default(),
            lifecycle: LifecycleOptions::default(),
            logs: LogOptions::default(),
        }
    }
}

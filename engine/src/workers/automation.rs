//! Automation worker for recurring sweeps

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::automation::sweeper::AutomationSweeper;

/// Automation worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,

    /// Initial delay before the first sweep
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            initial_delay: Duration::from_secs(10),
        }
    }
}

/// Run the automation worker
pub async fn run<S, F>(
    options: &Options,
    sweeper: &AutomationSweeper,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Automation worker starting...");

    // Initial delay
    sleep_fn(options.initial_delay).await;

    loop {
        // Check for shutdown
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Automation worker shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {
                // Continue with sweep
            }
        }

        debug!("Running automation sweep...");

        match sweeper.trigger_sweep().await {
            Ok(Some(report)) => {
                debug!(
                    "Sweep done: {} records, {} overdue",
                    report.metrics.total, report.metrics.overdue
                );
            }
            Ok(None) => {
                debug!("Sweep skipped (cooldown)");
            }
            Err(e) => {
                error!("Sweep failed: {}", e);
            }
        }
    }
}

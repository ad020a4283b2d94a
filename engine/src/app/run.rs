//! Main runtime loop

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::clock::Clock;
use crate::errors::EngineError;
use crate::notify::Notifier;
use crate::store::Store;
use crate::workers::automation;

/// Run the engine runtime until the shutdown signal fires.
///
/// Wires the workflow engine and sweeper over the supplied collaborators,
/// spawns the recurring automation worker, and joins it on shutdown within
/// the configured delay.
pub async fn run(
    options: AppOptions,
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), EngineError> {
    info!("Initializing CAPA engine runtime...");

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    let app_state = AppState::init(&options, store, notifier, clock);

    if options.enable_automation {
        init_automation_worker(
            options.automation_worker.clone(),
            app_state.clone(),
            &mut shutdown_manager,
            shutdown_tx.subscribe(),
        )?;
    }

    tokio::select! {
        _ = shutdown_signal => {
            info!("Shutdown signal received, shutting down...");
        }
    }

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

fn init_automation_worker(
    options: automation::Options,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), EngineError> {
    info!("Initializing automation worker...");

    let sweeper = app_state.sweeper.clone();
    let sweep_stop = sweeper.stop_handle();

    let worker_handle = tokio::spawn(async move {
        automation::run(
            &options,
            sweeper.as_ref(),
            |wait| tokio::time::sleep(wait),
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_automation_worker_handle(worker_handle, sweep_stop)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    automation_worker_handle: Option<JoinHandle<()>>,
    sweep_stop: Option<Arc<AtomicBool>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            automation_worker_handle: None,
            sweep_stop: None,
        }
    }

    pub fn with_automation_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
        sweep_stop: Arc<AtomicBool>,
    ) -> Result<(), EngineError> {
        if self.automation_worker_handle.is_some() {
            return Err(EngineError::ShutdownError(
                "automation_handle already set".to_string(),
            ));
        }
        self.automation_worker_handle = Some(handle);
        self.sweep_stop = Some(sweep_stop);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), EngineError> {
        // Cancel any in-flight sweep at the next item boundary
        if let Some(stop) = &self.sweep_stop {
            stop.store(true, Ordering::SeqCst);
        }
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}",
                    self.lifecycle_options.max_shutdown_delay
                );
                Err(EngineError::ShutdownError(format!(
                    "timed out after {:?}",
                    self.lifecycle_options.max_shutdown_delay
                )))
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), EngineError> {
        info!("Shutting down CAPA engine runtime...");

        if let Some(handle) = self.automation_worker_handle.take() {
            handle
                .await
                .map_err(|e| EngineError::ShutdownError(e.to_string()))?;
        }

        info!("Shutdown complete");
        Ok(())
    }
}

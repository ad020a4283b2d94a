//! Engine runtime state

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::automation::sweeper::AutomationSweeper;
use crate::clock::Clock;
use crate::notify::Notifier;
use crate::store::Store;
use crate::workflow::engine::WorkflowEngine;

/// Assembled engine runtime: the workflow engine, its sweeper, and the
/// shared collaborators. Embedders call engine operations through this.
pub struct AppState {
    /// Persistence collaborator
    pub store: Arc<dyn Store>,

    /// Workflow engine
    pub engine: Arc<WorkflowEngine>,

    /// Automation sweeper
    pub sweeper: Arc<AutomationSweeper>,
}

impl AppState {
    /// Wire the engine and sweeper over the supplied collaborators
    pub fn init(
        options: &AppOptions,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        info!("Initializing engine state...");

        let engine = Arc::new(WorkflowEngine::new(
            store.clone(),
            notifier,
            clock.clone(),
        ));
        let sweeper = Arc::new(AutomationSweeper::new(
            store.clone(),
            engine.clone(),
            clock,
            options.sweeper.clone(),
        ));

        Arc::new(Self {
            store,
            engine,
            sweeper,
        })
    }
}

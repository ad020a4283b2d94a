//! Automation sweeps

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::automation::metrics::CapaMetrics;
use crate::clock::Clock;
use crate::errors::EngineError;
use crate::models::capa::{Capa, CapaStatus};
use crate::store::{CapaQuery, Store};
use crate::utils::{calc_exp_backoff, CooldownOptions};
use crate::workflow::engine::WorkflowEngine;
use crate::workflow::transition::{
    decide_deadline_warning, decide_effectiveness_due, decide_escalation, decide_overdue,
    SweepUpdate, EFFECTIVENESS_AGE_DAYS, INACTIVITY_DAYS, WARNING_WINDOW_DAYS,
};

/// Sweeper options
#[derive(Debug, Clone)]
pub struct SweeperOptions {
    /// Upper bound for processing one CAPA
    pub item_timeout: Duration,

    /// Backoff applied after a failed pass
    pub cooldown: CooldownOptions,
}

impl Default for SweeperOptions {
    fn default() -> Self {
        Self {
            item_timeout: Duration::from_secs(10),
            cooldown: CooldownOptions::default(),
        }
    }
}

/// Sweep pass state
#[derive(Debug, Clone)]
pub struct SweepState {
    pub last_attempted_sweep_at: DateTime<Utc>,
    pub last_swept_at: DateTime<Utc>,
    pub cooldown_ends_at: DateTime<Utc>,
    pub err_streak: u32,
}

impl Default for SweepState {
    fn default() -> Self {
        Self {
            last_attempted_sweep_at: DateTime::<Utc>::MIN_UTC,
            last_swept_at: DateTime::<Utc>::MIN_UTC,
            cooldown_ends_at: DateTime::<Utc>::MIN_UTC,
            err_streak: 0,
        }
    }
}

impl SweepState {
    pub fn is_in_cooldown(&self, now: DateTime<Utc>) -> bool {
        now < self.cooldown_ends_at
    }
}

/// Counters for one sweep over one predicate
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// CAPAs matching the predicate
    pub scanned: usize,

    /// CAPAs that produced a state change or a fresh audit entry
    pub applied: usize,

    /// CAPAs skipped after an error or timeout
    pub failed: usize,
}

/// Result of one full automation pass
#[derive(Debug, Clone)]
pub struct SweepReport {
    pub overdue: SweepOutcome,
    pub warnings: SweepOutcome,
    pub effectiveness: SweepOutcome,
    pub escalations: SweepOutcome,
    pub metrics: CapaMetrics,
}

/// Recurring automation pass over all open CAPAs.
///
/// Each sweep is idempotent and re-entrant: a CAPA is processed under its own
/// lock with a fresh read, idempotency is enforced through audit-log windows,
/// and a crash mid-pass leaves already-processed records correctly updated.
/// One CAPA's failure never aborts the pass.
pub struct AutomationSweeper {
    store: Arc<dyn Store>,
    engine: Arc<WorkflowEngine>,
    clock: Arc<dyn Clock>,
    options: SweeperOptions,
    stop: Arc<AtomicBool>,
    state: RwLock<SweepState>,
}

impl AutomationSweeper {
    pub fn new(
        store: Arc<dyn Store>,
        engine: Arc<WorkflowEngine>,
        clock: Arc<dyn Clock>,
        options: SweeperOptions,
    ) -> Self {
        Self {
            store,
            engine,
            clock,
            options,
            stop: Arc::new(AtomicBool::new(false)),
            state: RwLock::new(SweepState::default()),
        }
    }

    /// Flag checked between CAPA-level units of work; setting it cancels the
    /// pass at the next item boundary, never mid-item.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Get sweep state
    pub async fn get_state(&self) -> SweepState {
        self.state.read().await.clone()
    }

    /// Run one full pass unless a previous failure put the sweeper in
    /// cooldown. Returns `None` when the pass was skipped.
    pub async fn trigger_sweep(&self) -> Result<Option<SweepReport>, EngineError> {
        let now = self.clock.now();
        {
            let state = self.state.read().await;
            if state.is_in_cooldown(now) {
                debug!("Sweep in cooldown, skipping...");
                return Ok(None);
            }
        }
        {
            let mut state = self.state.write().await;
            state.last_attempted_sweep_at = now;
        }

        match self.sweep_impl().await {
            Ok(report) => {
                let mut state = self.state.write().await;
                state.last_swept_at = self.clock.now();
                state.err_streak = 0;
                info!(
                    "Sweep complete: {} overdue, {} warned, {} reviews due, {} escalated",
                    report.overdue.applied,
                    report.warnings.applied,
                    report.effectiveness.applied,
                    report.escalations.applied
                );
                Ok(Some(report))
            }
            Err(e) => {
                let mut state = self.state.write().await;
                state.err_streak += 1;

                let cooldown = calc_exp_backoff(&self.options.cooldown, state.err_streak);
                state.cooldown_ends_at = self.clock.now()
                    + chrono::Duration::from_std(cooldown)
                        .unwrap_or_else(|_| chrono::Duration::seconds(60));

                error!(
                    "Sweep failed (attempt {}), cooldown until {}: {}",
                    state.err_streak, state.cooldown_ends_at, e
                );
                Err(e)
            }
        }
    }

    async fn sweep_impl(&self) -> Result<SweepReport, EngineError> {
        debug!("Starting automation sweep...");
        let overdue = self.sweep_overdue().await?;
        let warnings = self.sweep_deadline_warnings().await?;
        let effectiveness = self.sweep_effectiveness_reviews().await?;
        let escalations = self.sweep_escalations().await?;
        let metrics = self.rollup_metrics().await?;
        Ok(SweepReport {
            overdue,
            warnings,
            effectiveness,
            escalations,
            metrics,
        })
    }

    /// Mark past-due open work overdue and emit overdue notifications.
    pub async fn sweep_overdue(&self) -> Result<SweepOutcome, EngineError> {
        let now = self.clock.now();
        let query = CapaQuery {
            statuses: Some(vec![CapaStatus::Open, CapaStatus::InProgress]),
            due_before: Some(now),
            ..Default::default()
        };
        self.process(&query, decide_overdue, "overdue").await
    }

    /// Emit warnings for work coming due within the warning window.
    pub async fn sweep_deadline_warnings(&self) -> Result<SweepOutcome, EngineError> {
        let now = self.clock.now();
        let query = CapaQuery {
            statuses: Some(vec![CapaStatus::Open, CapaStatus::InProgress]),
            due_after: Some(now),
            due_before: Some(now + chrono::Duration::days(WARNING_WINDOW_DAYS)),
            ..Default::default()
        };
        self.process(&query, decide_deadline_warning, "deadline warning")
            .await
    }

    /// Flag closed, unverified CAPAs whose effectiveness review is due.
    pub async fn sweep_effectiveness_reviews(&self) -> Result<SweepOutcome, EngineError> {
        let now = self.clock.now();
        let query = CapaQuery {
            statuses: Some(vec![CapaStatus::Closed]),
            completed_before: Some(now - chrono::Duration::days(EFFECTIVENESS_AGE_DAYS)),
            effectiveness_verified: Some(false),
            ..Default::default()
        };
        self.process(&query, decide_effectiveness_due, "effectiveness review")
            .await
    }

    /// Reassign stalled in-progress CAPAs to the escalation role.
    pub async fn sweep_escalations(&self) -> Result<SweepOutcome, EngineError> {
        let now = self.clock.now();
        let query = CapaQuery {
            statuses: Some(vec![CapaStatus::InProgress]),
            updated_before: Some(now - chrono::Duration::days(INACTIVITY_DAYS)),
            ..Default::default()
        };
        self.process(&query, decide_escalation, "escalation").await
    }

    /// Project aggregate counters over every record. Writes nothing.
    pub async fn rollup_metrics(&self) -> Result<CapaMetrics, EngineError> {
        let capas = self.store.list_capas(&CapaQuery::default()).await?;
        Ok(CapaMetrics::from_capas(&capas))
    }

    async fn process(
        &self,
        query: &CapaQuery,
        decide: fn(&Capa, DateTime<Utc>) -> Option<SweepUpdate>,
        label: &str,
    ) -> Result<SweepOutcome, EngineError> {
        let candidates = self.store.list_capas(query).await?;
        let mut outcome = SweepOutcome {
            scanned: candidates.len(),
            ..Default::default()
        };

        for capa in candidates {
            if self.stop.load(Ordering::SeqCst) {
                info!("{} sweep cancelled after {} item(s)", label, outcome.applied);
                break;
            }

            match tokio::time::timeout(
                self.options.item_timeout,
                self.engine.apply_sweep(&capa.id, decide),
            )
            .await
            {
                Ok(Ok(true)) => outcome.applied += 1,
                Ok(Ok(false)) => {}
                Ok(Err(e)) => {
                    outcome.failed += 1;
                    error!("{} sweep failed for CAPA {}: {}", label, capa.id, e);
                }
                Err(_) => {
                    outcome.failed += 1;
                    warn!(
                        "{} sweep timed out for CAPA {} after {:?}",
                        label, capa.id, self.options.item_timeout
                    );
                }
            }
        }
        Ok(outcome)
    }
}

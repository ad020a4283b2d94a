//! Stateful workflow engine

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::errors::EngineError;
use crate::models::audit::{ActionType, AuditEntry};
use crate::models::capa::{Capa, CapaStatus};
use crate::models::step::{StepAction, WorkflowStep};
use crate::notify::{Notification, Notifier};
use crate::store::Store;
use crate::workflow::config::WorkflowConfig;
use crate::workflow::plan::generate_plan;
use crate::workflow::transition::{
    audit_guard, closure_satisfied, complete_step, project_status, AuditGuard, Effect, SweepUpdate,
};

/// Drives CAPA workflow state.
///
/// All transitions on the same CAPA are serialized through a per-CAPA async
/// mutex; transitions on different CAPAs proceed in parallel. Human-triggered
/// operations and automation sweeps share the same locks, so the two
/// interleave safely.
pub struct WorkflowEngine {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            notifier,
            clock,
            locks: StdMutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, capa_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(capa_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn run_effects(&self, effects: Vec<Effect>) -> Result<(), EngineError> {
        for effect in effects {
            match effect {
                Effect::Audit(entry) => self.store.append_audit(entry).await?,
                Effect::Notify(notification) => self.notifier.notify(notification).await,
            }
        }
        Ok(())
    }

    async fn fetch_capa(&self, capa_id: &str) -> Result<Capa, EngineError> {
        self.store
            .get_capa(capa_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("CAPA {capa_id}")))
    }

    /// Initiate the workflow for an open CAPA.
    ///
    /// Idempotent: a second call fails with `AlreadyInitiated`, guarded by
    /// the `workflow_initiated` audit entry. Returns the generated plan.
    pub async fn initiate(
        &self,
        capa_id: &str,
        performed_by: &str,
    ) -> Result<Vec<WorkflowStep>, EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;
        let now = self.clock.now();

        let mut capa = self.fetch_capa(capa_id).await?;
        let initiated = self
            .store
            .audit_for(capa_id, Some(ActionType::WorkflowInitiated), None)
            .await?;
        if !initiated.is_empty() {
            return Err(EngineError::AlreadyInitiated(capa_id.to_string()));
        }
        if capa.status != CapaStatus::Open {
            return Err(EngineError::InvalidTransition(format!(
                "CAPA {} is {} and cannot be initiated",
                capa_id,
                capa.status.as_str()
            )));
        }

        let config = WorkflowConfig::resolve(capa.priority, &capa.source);
        let plan = generate_plan(&capa, &config, now);
        self.store.insert_steps(plan.clone()).await?;

        self.store
            .append_audit(AuditEntry::new(
                capa_id,
                ActionType::WorkflowInitiated,
                format!(
                    "Workflow initiated with {} steps ({} priority)",
                    plan.len(),
                    capa.priority.as_str()
                ),
                performed_by,
                now,
                json!({
                    "steps": plan.len(),
                    "approvers": config.approvers,
                    "auto_advance": config.auto_advance,
                }),
            ))
            .await?;

        capa.status = CapaStatus::InProgress;
        capa.updated_at = now;
        self.store.update_capa(capa).await?;

        info!("Workflow initiated for CAPA {} ({} steps)", capa_id, plan.len());
        Ok(plan)
    }

    /// Approve or reject one pending step, then re-derive aggregate status.
    pub async fn advance_step(
        &self,
        capa_id: &str,
        step_id: u32,
        action: StepAction,
        comments: Option<String>,
        performed_by: &str,
    ) -> Result<CapaStatus, EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;
        let now = self.clock.now();

        let mut capa = self.fetch_capa(capa_id).await?;
        let steps = self.store.steps_for(capa_id).await?;
        if steps.is_empty() {
            return Err(EngineError::InvalidTransition(format!(
                "CAPA {capa_id} has no workflow plan; initiate it first"
            )));
        }

        let config = WorkflowConfig::resolve(capa.priority, &capa.source);
        let outcome = complete_step(
            &capa,
            &steps,
            step_id,
            action,
            comments,
            config.auto_advance,
            performed_by,
            now,
        )?;

        self.store.update_step(outcome.step).await?;
        self.run_effects(outcome.effects).await?;

        // Overdue is only reverted by an explicit resume, never here
        if capa.status == CapaStatus::InProgress
            && outcome.derived_status == CapaStatus::PendingVerification
        {
            capa.status = CapaStatus::PendingVerification;
        }
        capa.updated_at = now;
        self.store.update_capa(capa.clone()).await?;

        debug!(
            "Step {} of CAPA {} completed; status {}",
            step_id,
            capa_id,
            capa.status.as_str()
        );
        Ok(capa.status)
    }

    /// Project aggregate status from the CAPA's step collection, persisting
    /// an `InProgress` → `PendingVerification` promotion when it applies.
    pub async fn derive_status(&self, capa_id: &str) -> Result<CapaStatus, EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;

        let mut capa = self.fetch_capa(capa_id).await?;
        let steps = self.store.steps_for(capa_id).await?;
        let projected = project_status(&steps);

        if capa.status == CapaStatus::InProgress && projected == CapaStatus::PendingVerification {
            capa.status = CapaStatus::PendingVerification;
            capa.updated_at = self.clock.now();
            self.store.update_capa(capa.clone()).await?;
        }
        Ok(capa.status)
    }

    /// Close a CAPA whose required steps are all satisfied.
    pub async fn close(&self, capa_id: &str, performed_by: &str) -> Result<(), EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;
        let now = self.clock.now();

        let mut capa = self.fetch_capa(capa_id).await?;
        if capa.status == CapaStatus::Closed {
            return Err(EngineError::InvalidTransition(format!(
                "CAPA {capa_id} is already closed"
            )));
        }
        let steps = self.store.steps_for(capa_id).await?;
        if !closure_satisfied(&steps) {
            return Err(EngineError::InvalidTransition(format!(
                "CAPA {capa_id} still has unsatisfied required steps"
            )));
        }

        capa.status = CapaStatus::Closed;
        capa.completion_date = Some(now);
        capa.updated_at = now;
        self.store.update_capa(capa).await?;

        info!("CAPA {} closed by {}", capa_id, performed_by);
        Ok(())
    }

    /// Record that the post-closure effectiveness review confirmed the action.
    pub async fn verify_effectiveness(
        &self,
        capa_id: &str,
        performed_by: &str,
    ) -> Result<(), EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;

        let mut capa = self.fetch_capa(capa_id).await?;
        if capa.status != CapaStatus::Closed || capa.completion_date.is_none() {
            return Err(EngineError::InvalidTransition(format!(
                "CAPA {capa_id} must be closed with a completion date before verification"
            )));
        }

        capa.effectiveness_verified = true;
        capa.updated_at = self.clock.now();
        self.store.update_capa(capa).await?;

        info!("Effectiveness of CAPA {} verified by {}", capa_id, performed_by);
        Ok(())
    }

    /// Schedule an effectiveness review for a closed CAPA.
    pub async fn schedule_effectiveness_review(
        &self,
        capa_id: &str,
        review_at: DateTime<Utc>,
        performed_by: &str,
    ) -> Result<(), EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;
        let now = self.clock.now();

        let capa = self.fetch_capa(capa_id).await?;
        if capa.status != CapaStatus::Closed {
            return Err(EngineError::InvalidTransition(format!(
                "CAPA {capa_id} is not closed; nothing to review"
            )));
        }

        self.store
            .append_audit(AuditEntry::new(
                capa_id,
                ActionType::EffectivenessReviewScheduled,
                format!("Effectiveness review scheduled for {review_at}"),
                performed_by,
                now,
                json!({ "review_at": review_at }),
            ))
            .await?;
        self.notifier
            .notify(Notification {
                capa_id: capa_id.to_string(),
                action: ActionType::EffectivenessReviewScheduled,
                message: format!("Effectiveness review for CAPA {capa_id} scheduled at {review_at}"),
                payload: json!({ "review_at": review_at }),
            })
            .await;
        Ok(())
    }

    /// Explicitly move an overdue CAPA back into progress.
    pub async fn resume(&self, capa_id: &str, performed_by: &str) -> Result<(), EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;

        let mut capa = self.fetch_capa(capa_id).await?;
        if capa.status != CapaStatus::Overdue {
            return Err(EngineError::InvalidTransition(format!(
                "CAPA {} is {}, not overdue",
                capa_id,
                capa.status.as_str()
            )));
        }

        capa.status = CapaStatus::InProgress;
        capa.updated_at = self.clock.now();
        self.store.update_capa(capa).await?;

        info!("CAPA {} resumed by {}", capa_id, performed_by);
        Ok(())
    }

    /// Apply one sweep decision to one CAPA under its lock.
    ///
    /// Re-reads the record under the lock so a decision computed from a stale
    /// listing cannot clobber a concurrent transition, and drops audit
    /// effects (with their paired notifications) whose idempotency window
    /// already holds an entry. Returns whether anything was applied.
    pub async fn apply_sweep(
        &self,
        capa_id: &str,
        decide: fn(&Capa, DateTime<Utc>) -> Option<SweepUpdate>,
    ) -> Result<bool, EngineError> {
        let lock = self.lock_for(capa_id);
        let _guard = lock.lock().await;
        let now = self.clock.now();

        let Some(mut capa) = self.store.get_capa(capa_id).await? else {
            return Ok(false);
        };
        let Some(update) = decide(&capa, now) else {
            return Ok(false);
        };

        let mut allowed = Vec::with_capacity(update.effects.len());
        let mut allowed_actions: HashSet<ActionType> = HashSet::new();
        for effect in &update.effects {
            if let Effect::Audit(entry) = effect {
                let emit = match audit_guard(entry.action, now) {
                    AuditGuard::None => true,
                    AuditGuard::Since(window_start) => self
                        .store
                        .audit_for(capa_id, Some(entry.action), Some(window_start))
                        .await?
                        .is_empty(),
                    AuditGuard::Ever => self
                        .store
                        .audit_for(capa_id, Some(entry.action), None)
                        .await?
                        .is_empty(),
                };
                if emit {
                    allowed_actions.insert(entry.action);
                    allowed.push(effect.clone());
                }
            }
        }
        for effect in &update.effects {
            if let Effect::Notify(notification) = effect {
                if allowed_actions.contains(&notification.action) {
                    allowed.push(effect.clone());
                }
            }
        }

        let status_change = update.set_status.is_some_and(|s| s != capa.status);
        let assignee_change = update
            .reassign_to
            .as_deref()
            .is_some_and(|a| a != capa.assigned_to);
        if !status_change && !assignee_change && allowed.is_empty() {
            return Ok(false);
        }

        if let Some(status) = update.set_status {
            capa.status = status;
        }
        if let Some(assignee) = update.reassign_to {
            capa.assigned_to = assignee;
        }
        if status_change || assignee_change {
            capa.updated_at = now;
            self.store.update_capa(capa).await?;
        }
        self.run_effects(allowed).await?;
        Ok(true)
    }
}

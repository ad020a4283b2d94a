//! Persistence collaborator contract

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::EngineError;
use crate::models::audit::{ActionType, AuditEntry};
use crate::models::capa::{Capa, CapaStatus};
use crate::models::step::WorkflowStep;

/// Predicate for listing CAPAs in sweep queries. Unset fields match all.
#[derive(Debug, Clone, Default)]
pub struct CapaQuery {
    /// Restrict to these statuses
    pub statuses: Option<Vec<CapaStatus>>,

    /// `due_date` strictly before this instant
    pub due_before: Option<DateTime<Utc>>,

    /// `due_date` strictly after this instant
    pub due_after: Option<DateTime<Utc>>,

    /// `updated_at` at or before this instant
    pub updated_before: Option<DateTime<Utc>>,

    /// `completion_date` set and at or before this instant
    pub completed_before: Option<DateTime<Utc>>,

    /// Match on the effectiveness flag
    pub effectiveness_verified: Option<bool>,
}

impl CapaQuery {
    /// Whether a CAPA matches every set field
    pub fn matches(&self, capa: &Capa) -> bool {
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&capa.status) {
                return false;
            }
        }
        if let Some(due_before) = self.due_before {
            if capa.due_date >= due_before {
                return false;
            }
        }
        if let Some(due_after) = self.due_after {
            if capa.due_date <= due_after {
                return false;
            }
        }
        if let Some(updated_before) = self.updated_before {
            if capa.updated_at > updated_before {
                return false;
            }
        }
        if let Some(completed_before) = self.completed_before {
            match capa.completion_date {
                Some(completed) if completed <= completed_before => {}
                _ => return false,
            }
        }
        if let Some(verified) = self.effectiveness_verified {
            if capa.effectiveness_verified != verified {
                return false;
            }
        }
        true
    }
}

/// Persistence contract for CAPA records, their workflow steps, and the
/// append-only audit log.
///
/// Workflow steps are first-class rows keyed by their owning CAPA rather than
/// a metadata blob inside an audit entry, so a single step can be updated
/// without rewriting the plan.
#[async_trait]
pub trait Store: Send + Sync {
    /// Fetch a CAPA by ID
    async fn get_capa(&self, capa_id: &str) -> Result<Option<Capa>, EngineError>;

    /// Insert a new CAPA record
    async fn insert_capa(&self, capa: Capa) -> Result<(), EngineError>;

    /// Replace an existing CAPA record
    async fn update_capa(&self, capa: Capa) -> Result<(), EngineError>;

    /// List CAPAs matching a query predicate
    async fn list_capas(&self, query: &CapaQuery) -> Result<Vec<Capa>, EngineError>;

    /// Persist a generated plan for a CAPA
    async fn insert_steps(&self, steps: Vec<WorkflowStep>) -> Result<(), EngineError>;

    /// Steps owned by a CAPA, in sequence order
    async fn steps_for(&self, capa_id: &str) -> Result<Vec<WorkflowStep>, EngineError>;

    /// Update one step of a CAPA's plan
    async fn update_step(&self, step: WorkflowStep) -> Result<(), EngineError>;

    /// Append one audit entry
    async fn append_audit(&self, entry: AuditEntry) -> Result<(), EngineError>;

    /// Audit entries for a CAPA, in timestamp order, optionally filtered by
    /// action type and lower timestamp bound (inclusive)
    async fn audit_for(
        &self,
        capa_id: &str,
        action: Option<ActionType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, EngineError>;
}

//! Append-only audit log model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Enumerated audit action types.
///
/// This is the closed set the reporting layer understands; idempotency
/// windows for the automation sweeps key off these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    WorkflowInitiated,
    WorkflowStepCompleted,
    DeadlineWarning,
    OverdueNotification,
    AutoEscalation,
    EffectivenessReviewDue,
    EffectivenessReviewScheduled,
    CriticalAlert,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::WorkflowInitiated => "workflow_initiated",
            ActionType::WorkflowStepCompleted => "workflow_step_completed",
            ActionType::DeadlineWarning => "deadline_warning",
            ActionType::OverdueNotification => "overdue_notification",
            ActionType::AutoEscalation => "auto_escalation",
            ActionType::EffectivenessReviewDue => "effectiveness_review_due",
            ActionType::EffectivenessReviewScheduled => "effectiveness_review_scheduled",
            ActionType::CriticalAlert => "critical_alert",
        }
    }
}

/// One append-only audit log record. Never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub id: String,

    /// CAPA the entry belongs to
    pub capa_id: String,

    /// Action type
    pub action: ActionType,

    /// Human-readable description
    pub description: String,

    /// Actor that performed the action ("system" for sweeps)
    pub performed_by: String,

    /// Entry timestamp
    pub timestamp: DateTime<Utc>,

    /// Action-specific payload
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl AuditEntry {
    /// Create a new audit entry with a fresh ID
    pub fn new(
        capa_id: impl Into<String>,
        action: ActionType,
        description: impl Into<String>,
        performed_by: impl Into<String>,
        timestamp: DateTime<Utc>,
        metadata: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            capa_id: capa_id.into(),
            action,
            description: description.into(),
            performed_by: performed_by.into(),
            timestamp,
            metadata,
        }
    }
}

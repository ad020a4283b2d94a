//! Workflow step model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase a workflow step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Investigation,
    Approval,
    Implementation,
    Verification,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Investigation => "investigation",
            StepKind::Approval => "approval",
            StepKind::Implementation => "implementation",
            StepKind::Verification => "verification",
        }
    }
}

/// Workflow step status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

impl StepStatus {
    /// A terminal step can no longer be advanced
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StepStatus::Pending)
    }

    /// Terminal and counting toward closure
    pub fn is_satisfied(&self) -> bool {
        matches!(self, StepStatus::Approved | StepStatus::Skipped)
    }
}

/// Action taken on a pending step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepAction {
    Approve,
    Reject,
}

/// One unit of a CAPA's workflow plan.
///
/// Steps are persisted as first-class rows owned by their CAPA. They are
/// immutable once created except for `status`, `completed_at` and `comments`,
/// and are never reordered: `id` is the sequence position within the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Sequence position, unique within the owning CAPA
    pub id: u32,

    /// Owning CAPA ID
    pub capa_id: String,

    /// Phase this step belongs to
    pub kind: StepKind,

    /// Display name (e.g. "Approval: QualityManager")
    pub name: String,

    /// Step status
    pub status: StepStatus,

    /// Assignee (user or role name)
    pub assigned_to: String,

    /// Absolute due date computed at plan-generation time
    pub due_date: DateTime<Utc>,

    /// Completion timestamp
    pub completed_at: Option<DateTime<Utc>>,

    /// Reviewer comments recorded on completion
    pub comments: Option<String>,

    /// Whether the step gates closure
    pub required: bool,
}

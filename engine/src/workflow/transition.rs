//! Pure transition core.
//!
//! State transitions and sweep decisions are computed here as plain
//! functions returning the new state plus a list of effects to perform.
//! The engine and sweeper execute the effects against the store and the
//! notifier; nothing in this module touches a collaborator.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::errors::EngineError;
use crate::models::audit::{ActionType, AuditEntry};
use crate::models::capa::{Capa, CapaStatus, Priority};
use crate::models::step::{StepAction, StepKind, StepStatus, WorkflowStep};
use crate::notify::Notification;
use crate::utils::{days_remaining, start_of_day};

/// Actor recorded for sweep-originated audit entries
pub const SYSTEM_ACTOR: &str = "system";

/// Days ahead of a due date within which deadline warnings are emitted
pub const WARNING_WINDOW_DAYS: i64 = 3;

/// Days after closure before an effectiveness review comes due
pub const EFFECTIVENESS_AGE_DAYS: i64 = 30;

/// Days without mutation before an in-progress CAPA is escalated
pub const INACTIVITY_DAYS: i64 = 7;

/// Role stalled CAPAs are escalated to
pub const ESCALATION_ASSIGNEE: &str = "QualityManager";

/// A side effect produced by a transition, executed by the caller
#[derive(Debug, Clone)]
pub enum Effect {
    Audit(AuditEntry),
    Notify(Notification),
}

/// Outcome of completing one workflow step
#[derive(Debug, Clone)]
pub struct StepCompletion {
    /// The step with its new terminal status
    pub step: WorkflowStep,

    /// Aggregate status projected over the updated step collection
    pub derived_status: CapaStatus,

    /// Effects to perform
    pub effects: Vec<Effect>,
}

/// What a sweep decided to do with one CAPA
#[derive(Debug, Clone, Default)]
pub struct SweepUpdate {
    /// New aggregate status, if any
    pub set_status: Option<CapaStatus>,

    /// New assignee, if any
    pub reassign_to: Option<String>,

    /// Effects to perform
    pub effects: Vec<Effect>,
}

/// How far back the audit log is consulted before an entry type is emitted
/// again for the same CAPA
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditGuard {
    /// No idempotency guard
    None,
    /// At most one entry since this instant
    Since(DateTime<Utc>),
    /// At most one entry over the CAPA's lifetime
    Ever,
}

/// Idempotency window for an audit action type
pub fn audit_guard(action: ActionType, now: DateTime<Utc>) -> AuditGuard {
    match action {
        ActionType::OverdueNotification
        | ActionType::DeadlineWarning
        | ActionType::CriticalAlert => AuditGuard::Since(start_of_day(now)),
        ActionType::AutoEscalation => {
            AuditGuard::Since(now - chrono::Duration::days(INACTIVITY_DAYS))
        }
        ActionType::EffectivenessReviewDue | ActionType::WorkflowInitiated => AuditGuard::Ever,
        ActionType::WorkflowStepCompleted | ActionType::EffectivenessReviewScheduled => {
            AuditGuard::None
        }
    }
}

/// Project aggregate status from a CAPA's own step collection.
///
/// An explicit fold over step identities rather than a completion count, so
/// re-run or duplicate completions cannot skew the projection. A rejected
/// required step keeps the CAPA in progress.
pub fn project_status(steps: &[WorkflowStep]) -> CapaStatus {
    if closure_satisfied(steps) {
        CapaStatus::PendingVerification
    } else {
        CapaStatus::InProgress
    }
}

/// Whether every required step permits closure
pub fn closure_satisfied(steps: &[WorkflowStep]) -> bool {
    !steps.is_empty()
        && steps
            .iter()
            .filter(|s| s.required)
            .all(|s| s.status.is_satisfied())
}

/// Reason a step may not be advanced yet, if any.
///
/// Approval steps are strictly sequential in generation order. Without
/// auto-advance every earlier required step must be terminal first; with
/// auto-advance only the approval ordering is enforced.
pub fn gating_block(steps: &[WorkflowStep], target: &WorkflowStep, auto_advance: bool) -> Option<String> {
    let earlier = steps.iter().filter(|s| s.id < target.id);
    if auto_advance {
        if target.kind == StepKind::Approval {
            if let Some(blocking) = earlier
                .filter(|s| s.kind == StepKind::Approval)
                .find(|s| !s.status.is_terminal())
            {
                return Some(format!(
                    "approval step {} ({}) must complete first",
                    blocking.id, blocking.assigned_to
                ));
            }
        }
        None
    } else {
        earlier
            .filter(|s| s.required)
            .find(|s| !s.status.is_terminal())
            .map(|blocking| format!("step {} ({}) must complete first", blocking.id, blocking.name))
    }
}

/// Complete one pending step of a CAPA's plan.
///
/// Rejection is recorded and left as a dead-end: the CAPA stays in progress
/// and no reversion is scheduled, a human acts on the emitted event.
pub fn complete_step(
    capa: &Capa,
    steps: &[WorkflowStep],
    step_id: u32,
    action: StepAction,
    comments: Option<String>,
    auto_advance: bool,
    performed_by: &str,
    now: DateTime<Utc>,
) -> Result<StepCompletion, EngineError> {
    let step = steps
        .iter()
        .find(|s| s.id == step_id)
        .ok_or_else(|| EngineError::NotFound(format!("step {} of CAPA {}", step_id, capa.id)))?;

    if step.status.is_terminal() {
        return Err(EngineError::InvalidTransition(format!(
            "step {} of CAPA {} is already {:?}",
            step_id, capa.id, step.status
        )));
    }
    if let Some(reason) = gating_block(steps, step, auto_advance) {
        return Err(EngineError::InvalidTransition(format!(
            "step {} of CAPA {} is gated: {}",
            step_id, capa.id, reason
        )));
    }

    let mut completed = step.clone();
    completed.status = match action {
        StepAction::Approve => StepStatus::Approved,
        StepAction::Reject => StepStatus::Rejected,
    };
    completed.completed_at = Some(now);
    completed.comments = comments.clone();

    let updated: Vec<WorkflowStep> = steps
        .iter()
        .map(|s| if s.id == step_id { completed.clone() } else { s.clone() })
        .collect();
    let derived_status = project_status(&updated);

    let mut effects = vec![Effect::Audit(AuditEntry::new(
        &capa.id,
        ActionType::WorkflowStepCompleted,
        format!("Step '{}' {:?}", completed.name, completed.status),
        performed_by,
        now,
        json!({
            "step_id": completed.id,
            "step_name": completed.name,
            "kind": completed.kind.as_str(),
            "action": action,
            "comments": comments,
        }),
    ))];

    if action == StepAction::Reject {
        effects.push(Effect::Notify(Notification {
            capa_id: capa.id.clone(),
            action: ActionType::WorkflowStepCompleted,
            message: format!(
                "Step '{}' of CAPA {} was rejected by {}",
                completed.name, capa.id, performed_by
            ),
            payload: json!({ "step_id": completed.id, "comments": completed.comments }),
        }));
    }

    Ok(StepCompletion {
        step: completed,
        derived_status,
        effects,
    })
}

/// Overdue detection: past due and still actionable
pub fn decide_overdue(capa: &Capa, now: DateTime<Utc>) -> Option<SweepUpdate> {
    if capa.due_date >= now
        || !matches!(capa.status, CapaStatus::Open | CapaStatus::InProgress)
    {
        return None;
    }

    let days_overdue = -days_remaining(capa.due_date, now);
    let mut effects = vec![
        Effect::Audit(AuditEntry::new(
            &capa.id,
            ActionType::OverdueNotification,
            format!("CAPA overdue by {} day(s)", days_overdue.max(1)),
            SYSTEM_ACTOR,
            now,
            json!({ "due_date": capa.due_date, "assigned_to": capa.assigned_to }),
        )),
        Effect::Notify(Notification {
            capa_id: capa.id.clone(),
            action: ActionType::OverdueNotification,
            message: format!("CAPA {} is overdue (due {})", capa.id, capa.due_date),
            payload: json!({ "assigned_to": capa.assigned_to }),
        }),
    ];

    if capa.priority == Priority::Critical {
        effects.push(Effect::Audit(AuditEntry::new(
            &capa.id,
            ActionType::CriticalAlert,
            "Critical CAPA past due".to_string(),
            SYSTEM_ACTOR,
            now,
            json!({ "due_date": capa.due_date }),
        )));
        effects.push(Effect::Notify(Notification {
            capa_id: capa.id.clone(),
            action: ActionType::CriticalAlert,
            message: format!("Critical CAPA {} is past due", capa.id),
            payload: json!({ "due_date": capa.due_date }),
        }));
    }

    Some(SweepUpdate {
        set_status: Some(CapaStatus::Overdue),
        reassign_to: None,
        effects,
    })
}

/// Deadline warning: due within the warning window, no status change
pub fn decide_deadline_warning(capa: &Capa, now: DateTime<Utc>) -> Option<SweepUpdate> {
    if !matches!(capa.status, CapaStatus::Open | CapaStatus::InProgress) {
        return None;
    }
    if capa.due_date <= now || capa.due_date >= now + chrono::Duration::days(WARNING_WINDOW_DAYS) {
        return None;
    }

    let days = days_remaining(capa.due_date, now);
    Some(SweepUpdate {
        set_status: None,
        reassign_to: None,
        effects: vec![Effect::Audit(AuditEntry::new(
            &capa.id,
            ActionType::DeadlineWarning,
            format!("CAPA due in {} day(s)", days),
            SYSTEM_ACTOR,
            now,
            json!({ "days_remaining": days, "due_date": capa.due_date }),
        ))],
    })
}

/// Effectiveness review trigger: closed long enough, not yet verified
pub fn decide_effectiveness_due(capa: &Capa, now: DateTime<Utc>) -> Option<SweepUpdate> {
    if capa.status != CapaStatus::Closed || capa.effectiveness_verified {
        return None;
    }
    let completed = capa.completion_date?;
    if completed > now - chrono::Duration::days(EFFECTIVENESS_AGE_DAYS) {
        return None;
    }

    Some(SweepUpdate {
        set_status: None,
        reassign_to: None,
        effects: vec![
            Effect::Audit(AuditEntry::new(
                &capa.id,
                ActionType::EffectivenessReviewDue,
                format!(
                    "Effectiveness review due ({} days since completion)",
                    (now - completed).num_days()
                ),
                SYSTEM_ACTOR,
                now,
                json!({ "completion_date": completed }),
            )),
            Effect::Notify(Notification {
                capa_id: capa.id.clone(),
                action: ActionType::EffectivenessReviewDue,
                message: format!("CAPA {} needs an effectiveness review", capa.id),
                payload: json!({ "completion_date": completed }),
            }),
        ],
    })
}

/// Auto-escalation: in progress and untouched past the inactivity threshold.
/// Closed and overdue CAPAs are never escalated.
pub fn decide_escalation(capa: &Capa, now: DateTime<Utc>) -> Option<SweepUpdate> {
    if capa.status != CapaStatus::InProgress {
        return None;
    }
    if capa.updated_at > now - chrono::Duration::days(INACTIVITY_DAYS) {
        return None;
    }

    Some(SweepUpdate {
        set_status: None,
        reassign_to: Some(ESCALATION_ASSIGNEE.to_string()),
        effects: vec![
            Effect::Audit(AuditEntry::new(
                &capa.id,
                ActionType::AutoEscalation,
                format!(
                    "Escalated from {} to {} after {} days of inactivity",
                    capa.assigned_to, ESCALATION_ASSIGNEE, INACTIVITY_DAYS
                ),
                SYSTEM_ACTOR,
                now,
                json!({ "previous_assignee": capa.assigned_to }),
            )),
            Effect::Notify(Notification {
                capa_id: capa.id.clone(),
                action: ActionType::AutoEscalation,
                message: format!(
                    "CAPA {} reassigned from {} to {}",
                    capa.id, capa.assigned_to, ESCALATION_ASSIGNEE
                ),
                payload: json!({ "previous_assignee": capa.assigned_to }),
            }),
        ],
    })
}

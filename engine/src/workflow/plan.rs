//! Workflow plan generation

use chrono::{DateTime, Duration, Utc};

use crate::models::capa::Capa;
use crate::models::step::{StepKind, StepStatus, WorkflowStep};
use crate::workflow::config::WorkflowConfig;

/// Days after the investigation deadline within which approvals are expected.
/// A fixed design constant, not derived from configuration.
pub const APPROVAL_BUFFER_DAYS: i64 = 2;

/// Role that owns every verification step
pub const VERIFICATION_ROLE: &str = "QualityManager";

/// Generate the ordered step plan for a CAPA.
///
/// Emits investigation, one approval per configured approver, implementation,
/// verification. All steps start pending and required; due dates are absolute
/// and non-decreasing along the sequence.
pub fn generate_plan(capa: &Capa, config: &WorkflowConfig, now: DateTime<Utc>) -> Vec<WorkflowStep> {
    let mut steps = Vec::with_capacity(3 + config.approvers.len());
    let mut next_id = 0u32;
    let mut step = |kind: StepKind, name: String, assigned_to: String, due_date: DateTime<Utc>| {
        let id = next_id;
        next_id += 1;
        WorkflowStep {
            id,
            capa_id: capa.id.clone(),
            kind,
            name,
            status: StepStatus::Pending,
            assigned_to,
            due_date,
            completed_at: None,
            comments: None,
            required: true,
        }
    };

    let investigation_due = now + Duration::days(i64::from(config.deadlines.investigation_days));
    steps.push(step(
        StepKind::Investigation,
        "Investigation".to_string(),
        capa.assigned_to.clone(),
        investigation_due,
    ));

    if config.requires_approval {
        let approval_due = investigation_due + Duration::days(APPROVAL_BUFFER_DAYS);
        for approver in &config.approvers {
            steps.push(step(
                StepKind::Approval,
                format!("Approval: {approver}"),
                approver.clone(),
                approval_due,
            ));
        }
    }

    let implementation_due = now + Duration::days(i64::from(config.deadlines.implementation_days));
    steps.push(step(
        StepKind::Implementation,
        "Implementation".to_string(),
        capa.assigned_to.clone(),
        implementation_due,
    ));

    let verification_due =
        implementation_due + Duration::days(i64::from(config.deadlines.verification_days));
    steps.push(step(
        StepKind::Verification,
        "Effectiveness verification".to_string(),
        VERIFICATION_ROLE.to_string(),
        verification_due,
    ));

    steps
}

//! Workflow configuration resolution

use serde::{Deserialize, Serialize};

use crate::models::capa::Priority;
use crate::models::step::StepKind;

/// Per-phase deadline day-counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deadlines {
    pub investigation_days: u32,
    pub implementation_days: u32,
    pub verification_days: u32,
}

impl Deadlines {
    /// Day-count for a phase. Approval steps carry no own deadline tier;
    /// their due dates derive from the investigation phase.
    pub fn for_phase(&self, kind: StepKind) -> u32 {
        match kind {
            StepKind::Investigation | StepKind::Approval => self.investigation_days,
            StepKind::Implementation => self.implementation_days,
            StepKind::Verification => self.verification_days,
        }
    }
}

/// Workflow configuration derived from a CAPA's classification.
///
/// Never persisted: recomputed deterministically from priority each time it
/// is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Whether the plan carries approval steps
    pub requires_approval: bool,

    /// Approver roles, insertion order = approval order
    pub approvers: Vec<String>,

    /// Whether steps may complete without strict sequential gating
    pub auto_advance: bool,

    /// Per-phase deadlines
    pub deadlines: Deadlines,
}

impl WorkflowConfig {
    /// Resolve the configuration for a priority/source pair.
    ///
    /// `source` is accepted for per-category overrides later; the current
    /// rule set does not branch on it.
    pub fn resolve(priority: Priority, _source: &str) -> Self {
        match priority {
            Priority::Critical => Self {
                requires_approval: true,
                approvers: vec![
                    "QualityManager".to_string(),
                    "FoodSafetyDirector".to_string(),
                    "OperationsManager".to_string(),
                ],
                auto_advance: false,
                deadlines: Deadlines {
                    investigation_days: 3,
                    implementation_days: 7,
                    verification_days: 5,
                },
            },
            Priority::High => Self {
                requires_approval: true,
                approvers: vec!["QualityManager".to_string(), "DepartmentHead".to_string()],
                auto_advance: false,
                deadlines: Deadlines {
                    investigation_days: 5,
                    implementation_days: 14,
                    verification_days: 7,
                },
            },
            Priority::Medium => Self {
                requires_approval: true,
                approvers: vec!["QualityManager".to_string()],
                auto_advance: true,
                deadlines: Deadlines {
                    investigation_days: 7,
                    implementation_days: 21,
                    verification_days: 10,
                },
            },
            Priority::Low => Self {
                requires_approval: false,
                approvers: Vec::new(),
                auto_advance: true,
                deadlines: Deadlines {
                    investigation_days: 10,
                    implementation_days: 30,
                    verification_days: 14,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_tiers_have_positive_deadlines() {
        for priority in [
            Priority::Low,
            Priority::Medium,
            Priority::High,
            Priority::Critical,
        ] {
            let config = WorkflowConfig::resolve(priority, "Contamination");
            assert!(config.deadlines.investigation_days > 0);
            assert!(config.deadlines.implementation_days > 0);
            assert!(config.deadlines.verification_days > 0);
        }
    }

    #[test]
    fn test_critical_tier() {
        let config = WorkflowConfig::resolve(Priority::Critical, "Contamination");
        assert!(config.requires_approval);
        assert!(!config.auto_advance);
        assert_eq!(
            config.approvers,
            vec!["QualityManager", "FoodSafetyDirector", "OperationsManager"]
        );
        assert_eq!(config.deadlines.investigation_days, 3);
        assert_eq!(config.deadlines.implementation_days, 7);
        assert_eq!(config.deadlines.verification_days, 5);
    }

    #[test]
    fn test_low_tier_has_no_approvers() {
        let config = WorkflowConfig::resolve(Priority::Low, "Equipment Malfunction");
        assert!(!config.requires_approval);
        assert!(config.approvers.is_empty());
        assert!(config.auto_advance);
    }

    #[test]
    fn test_unknown_priority_string_resolves_like_medium() {
        let fallback = WorkflowConfig::resolve(Priority::parse_or_default("sev0"), "Contamination");
        let medium = WorkflowConfig::resolve(Priority::Medium, "Contamination");
        assert_eq!(fallback, medium);
    }

    #[test]
    fn test_source_does_not_branch() {
        let a = WorkflowConfig::resolve(Priority::High, "Contamination");
        let b = WorkflowConfig::resolve(Priority::High, "Equipment Malfunction");
        assert_eq!(a, b);
    }
}

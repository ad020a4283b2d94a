//! CAPA record model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// CAPA priority tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Parse a priority string, falling back to Medium for unknown values.
    ///
    /// The fallback is the documented default tier, not an error: records
    /// created before a priority rename still resolve to a usable workflow.
    pub fn parse_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "low" => Priority::Low,
            "medium" => Priority::Medium,
            "high" => Priority::High,
            "critical" => Priority::Critical,
            other => {
                warn!("Unknown priority '{}', falling back to medium", other);
                Priority::Medium
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

/// CAPA lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapaStatus {
    Open,
    InProgress,
    PendingVerification,
    Overdue,
    Closed,
}

impl CapaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapaStatus::Open => "open",
            CapaStatus::InProgress => "in_progress",
            CapaStatus::PendingVerification => "pending_verification",
            CapaStatus::Overdue => "overdue",
            CapaStatus::Closed => "closed",
        }
    }
}

/// A corrective/preventive action record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capa {
    /// Unique CAPA ID
    pub id: String,

    /// Short title (owned by the CRUD layer, never mutated here)
    pub title: String,

    /// Free-text description (owned by the CRUD layer, never mutated here)
    pub description: Option<String>,

    /// Priority tier driving the workflow configuration
    pub priority: Priority,

    /// Source classification (e.g. "Contamination", "Equipment Malfunction")
    pub source: String,

    /// Lifecycle status
    pub status: CapaStatus,

    /// Current assignee (user or role name)
    pub assigned_to: String,

    /// Overall due date for the record
    pub due_date: DateTime<Utc>,

    /// Completion timestamp, set on close
    pub completion_date: Option<DateTime<Utc>>,

    /// Whether the post-closure effectiveness review confirmed the action
    pub effectiveness_verified: bool,

    /// Created timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,
}

impl Capa {
    /// Create a new open CAPA record
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        priority: Priority,
        source: impl Into<String>,
        assigned_to: impl Into<String>,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
            priority,
            source: source.into(),
            status: CapaStatus::Open,
            assigned_to: assigned_to.into(),
            due_date,
            completion_date: None,
            effectiveness_verified: false,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_parse() {
        assert_eq!(Priority::parse_or_default("critical"), Priority::Critical);
        assert_eq!(Priority::parse_or_default("HIGH"), Priority::High);
        assert_eq!(Priority::parse_or_default("low"), Priority::Low);
    }

    #[test]
    fn test_priority_fallback() {
        assert_eq!(Priority::parse_or_default("urgent"), Priority::Medium);
        assert_eq!(Priority::parse_or_default(""), Priority::Medium);
    }
}

//! In-memory store

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::EngineError;
use crate::models::audit::{ActionType, AuditEntry};
use crate::models::capa::Capa;
use crate::models::step::WorkflowStep;
use crate::store::{CapaQuery, Store};

/// In-memory implementation of [`Store`].
///
/// Backs tests and embedders that bring no database. Steps are keyed by
/// owning CAPA; the audit table is append-only.
#[derive(Default)]
pub struct MemoryStore {
    capas: RwLock<HashMap<String, Capa>>,
    steps: RwLock<HashMap<String, Vec<WorkflowStep>>>,
    audit: RwLock<Vec<AuditEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_capa(&self, capa_id: &str) -> Result<Option<Capa>, EngineError> {
        let capas = self.capas.read().unwrap_or_else(|e| e.into_inner());
        Ok(capas.get(capa_id).cloned())
    }

    async fn insert_capa(&self, capa: Capa) -> Result<(), EngineError> {
        let mut capas = self.capas.write().unwrap_or_else(|e| e.into_inner());
        if capas.contains_key(&capa.id) {
            return Err(EngineError::PersistenceError(format!(
                "CAPA {} already exists",
                capa.id
            )));
        }
        capas.insert(capa.id.clone(), capa);
        Ok(())
    }

    async fn update_capa(&self, capa: Capa) -> Result<(), EngineError> {
        let mut capas = self.capas.write().unwrap_or_else(|e| e.into_inner());
        if !capas.contains_key(&capa.id) {
            return Err(EngineError::NotFound(format!("CAPA {}", capa.id)));
        }
        capas.insert(capa.id.clone(), capa);
        Ok(())
    }

    async fn list_capas(&self, query: &CapaQuery) -> Result<Vec<Capa>, EngineError> {
        let capas = self.capas.read().unwrap_or_else(|e| e.into_inner());
        let mut matched: Vec<Capa> = capas.values().filter(|c| query.matches(c)).cloned().collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }

    async fn insert_steps(&self, steps: Vec<WorkflowStep>) -> Result<(), EngineError> {
        if steps.is_empty() {
            return Ok(());
        }
        let capa_id = steps[0].capa_id.clone();
        let mut table = self.steps.write().unwrap_or_else(|e| e.into_inner());
        table.insert(capa_id, steps);
        Ok(())
    }

    async fn steps_for(&self, capa_id: &str) -> Result<Vec<WorkflowStep>, EngineError> {
        let table = self.steps.read().unwrap_or_else(|e| e.into_inner());
        Ok(table.get(capa_id).cloned().unwrap_or_default())
    }

    async fn update_step(&self, step: WorkflowStep) -> Result<(), EngineError> {
        let mut table = self.steps.write().unwrap_or_else(|e| e.into_inner());
        let steps = table
            .get_mut(&step.capa_id)
            .ok_or_else(|| EngineError::NotFound(format!("steps for CAPA {}", step.capa_id)))?;
        let slot = steps
            .iter_mut()
            .find(|s| s.id == step.id)
            .ok_or_else(|| EngineError::NotFound(format!("step {} of CAPA {}", step.id, step.capa_id)))?;
        *slot = step;
        Ok(())
    }

    async fn append_audit(&self, entry: AuditEntry) -> Result<(), EngineError> {
        let mut audit = self.audit.write().unwrap_or_else(|e| e.into_inner());
        audit.push(entry);
        Ok(())
    }

    async fn audit_for(
        &self,
        capa_id: &str,
        action: Option<ActionType>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<AuditEntry>, EngineError> {
        let audit = self.audit.read().unwrap_or_else(|e| e.into_inner());
        let mut entries: Vec<AuditEntry> = audit
            .iter()
            .filter(|e| e.capa_id == capa_id)
            .filter(|e| action.is_none_or(|a| e.action == a))
            .filter(|e| since.is_none_or(|t| e.timestamp >= t))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::capa::Priority;
    use chrono::Duration;

    fn sample_capa(id: &str) -> Capa {
        let now = Utc::now();
        Capa::new(
            id,
            "Sanitizer concentration drift",
            Priority::High,
            "Contamination",
            "alice",
            now + Duration::days(14),
            now,
        )
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = MemoryStore::new();
        store.insert_capa(sample_capa("capa-1")).await.unwrap();

        let fetched = store.get_capa("capa-1").await.unwrap().unwrap();
        assert_eq!(fetched.assigned_to, "alice");
        assert!(store.get_capa("capa-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_insert_rejected() {
        let store = MemoryStore::new();
        store.insert_capa(sample_capa("capa-1")).await.unwrap();
        assert!(store.insert_capa(sample_capa("capa-1")).await.is_err());
    }

    #[tokio::test]
    async fn test_query_by_status_and_due() {
        let store = MemoryStore::new();
        let now = Utc::now();

        let mut overdue = sample_capa("capa-1");
        overdue.due_date = now - Duration::days(1);
        store.insert_capa(overdue).await.unwrap();
        store.insert_capa(sample_capa("capa-2")).await.unwrap();

        let query = CapaQuery {
            due_before: Some(now),
            ..Default::default()
        };
        let matched = store.list_capas(&query).await.unwrap();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id, "capa-1");
    }

    #[tokio::test]
    async fn test_audit_filtering() {
        let store = MemoryStore::new();
        let now = Utc::now();

        store
            .append_audit(AuditEntry::new(
                "capa-1",
                ActionType::WorkflowInitiated,
                "Workflow initiated",
                "alice",
                now - Duration::days(2),
                serde_json::Value::Null,
            ))
            .await
            .unwrap();
        store
            .append_audit(AuditEntry::new(
                "capa-1",
                ActionType::OverdueNotification,
                "Overdue",
                "system",
                now,
                serde_json::Value::Null,
            ))
            .await
            .unwrap();

        let all = store.audit_for("capa-1", None, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let overdue_today = store
            .audit_for(
                "capa-1",
                Some(ActionType::OverdueNotification),
                Some(now - Duration::hours(1)),
            )
            .await
            .unwrap();
        assert_eq!(overdue_today.len(), 1);
    }
}

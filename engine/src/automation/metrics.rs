//! Read-side metric rollup

use serde::Serialize;

use crate::models::capa::{Capa, CapaStatus};

/// Aggregate counters projected over all CAPA records. Pure read-side
/// projection; computing it writes nothing.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CapaMetrics {
    pub total: usize,
    pub open: usize,
    pub in_progress: usize,
    pub pending_verification: usize,
    pub overdue: usize,
    pub closed: usize,

    /// Closed with a completion date at or before the due date
    pub completed_on_time: usize,

    /// Verified fraction of closed records, 0.0 when nothing is closed
    pub effectiveness_rate: f64,

    /// Mean of `completion_date - created_at` across closed records with a
    /// completion date, in days
    pub mean_resolution_days: Option<f64>,
}

impl CapaMetrics {
    pub fn from_capas(capas: &[Capa]) -> Self {
        let mut metrics = Self {
            total: capas.len(),
            ..Self::default()
        };

        let mut verified = 0usize;
        let mut resolution_days = Vec::new();
        for capa in capas {
            match capa.status {
                CapaStatus::Open => metrics.open += 1,
                CapaStatus::InProgress => metrics.in_progress += 1,
                CapaStatus::PendingVerification => metrics.pending_verification += 1,
                CapaStatus::Overdue => metrics.overdue += 1,
                CapaStatus::Closed => metrics.closed += 1,
            }
            if capa.status == CapaStatus::Closed {
                if capa.effectiveness_verified {
                    verified += 1;
                }
                if let Some(completed) = capa.completion_date {
                    if completed <= capa.due_date {
                        metrics.completed_on_time += 1;
                    }
                    resolution_days
                        .push((completed - capa.created_at).num_seconds() as f64 / 86_400.0);
                }
            }
        }

        if metrics.closed > 0 {
            metrics.effectiveness_rate = verified as f64 / metrics.closed as f64;
        }
        if !resolution_days.is_empty() {
            metrics.mean_resolution_days =
                Some(resolution_days.iter().sum::<f64>() / resolution_days.len() as f64);
        }
        metrics
    }
}

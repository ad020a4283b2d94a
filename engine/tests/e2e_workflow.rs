//! End-to-end workflow scenarios

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use tokio::sync::oneshot;

use capaflow::app::options::AppOptions;
use capaflow::app::run::run;
use capaflow::automation::sweeper::{AutomationSweeper, SweeperOptions};
use capaflow::clock::{Clock, ManualClock};
use capaflow::models::audit::ActionType;
use capaflow::models::capa::{Capa, CapaStatus, Priority};
use capaflow::models::step::{StepAction, StepKind};
use capaflow::notify::{ChannelNotifier, LogNotifier};
use capaflow::store::memory::MemoryStore;
use capaflow::store::Store;
use capaflow::workers::automation;
use capaflow::workflow::engine::WorkflowEngine;

/// The full High-priority lifecycle: initiation, sequential approvals,
/// closure, and the post-closure effectiveness review trigger.
#[tokio::test]
async fn test_high_priority_equipment_malfunction_lifecycle() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (notifier, mut rx) = ChannelNotifier::new();
    let engine = Arc::new(WorkflowEngine::new(
        store.clone(),
        Arc::new(notifier),
        clock.clone(),
    ));
    let sweeper = AutomationSweeper::new(
        store.clone(),
        engine.clone(),
        clock.clone(),
        SweeperOptions::default(),
    );

    let created_at = clock.now();
    store
        .insert_capa(Capa::new(
            "capa-77",
            "Conveyor motor failure",
            Priority::High,
            "Equipment Malfunction",
            "alice",
            created_at + Duration::days(14),
            created_at,
        ))
        .await
        .unwrap();

    // Initiate: 5 steps due 5/7/7/14/21 days out, status moves to in progress
    let plan = engine.initiate("capa-77", "alice").await.unwrap();
    assert_eq!(plan.len(), 5);

    let kinds: Vec<StepKind> = plan.iter().map(|s| s.kind).collect();
    assert_eq!(
        kinds,
        vec![
            StepKind::Investigation,
            StepKind::Approval,
            StepKind::Approval,
            StepKind::Implementation,
            StepKind::Verification,
        ]
    );
    let offsets: Vec<i64> = plan
        .iter()
        .map(|s| (s.due_date - created_at).num_days())
        .collect();
    assert_eq!(offsets, vec![5, 7, 7, 14, 21]);
    assert_eq!(plan[1].assigned_to, "QualityManager");
    assert_eq!(plan[2].assigned_to, "DepartmentHead");

    let capa = store.get_capa("capa-77").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::InProgress);

    // Approve every step in order
    for step in &plan {
        let actor = step.assigned_to.clone();
        engine
            .advance_step("capa-77", step.id, StepAction::Approve, None, &actor)
            .await
            .unwrap();
    }
    let capa = store.get_capa("capa-77").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::PendingVerification);

    // Close with completion date = now
    engine.close("capa-77", "QualityManager").await.unwrap();
    let capa = store.get_capa("capa-77").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::Closed);
    assert_eq!(capa.completion_date, Some(clock.now()));

    // 31 days later the effectiveness review comes due, exactly once
    clock.advance(Duration::days(31));
    let outcome = sweeper.sweep_effectiveness_reviews().await.unwrap();
    assert_eq!(outcome.applied, 1);
    let repeat = sweeper.sweep_effectiveness_reviews().await.unwrap();
    assert_eq!(repeat.applied, 0);

    let due = store
        .audit_for("capa-77", Some(ActionType::EffectivenessReviewDue), None)
        .await
        .unwrap();
    assert_eq!(due.len(), 1);

    let mut actions = Vec::new();
    while let Ok(event) = rx.try_recv() {
        actions.push(event.action);
    }
    assert!(actions.contains(&ActionType::EffectivenessReviewDue));

    // The review confirms the fix
    engine
        .verify_effectiveness("capa-77", "QualityManager")
        .await
        .unwrap();
    let capa = store.get_capa("capa-77").await.unwrap().unwrap();
    assert!(capa.effectiveness_verified);
    assert_eq!(capa.status, CapaStatus::Closed);
}

/// The runtime drives the automation worker on its interval and shuts down
/// cleanly on signal.
#[tokio::test(start_paused = true)]
async fn test_runtime_sweeps_on_interval_and_shuts_down() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let now = clock.now();

    let mut record = Capa::new(
        "capa-1",
        "Scale drift",
        Priority::Medium,
        "Equipment Malfunction",
        "alice",
        now - Duration::days(1),
        now - Duration::days(10),
    );
    record.status = CapaStatus::InProgress;
    store.insert_capa(record).await.unwrap();

    let options = AppOptions {
        automation_worker: automation::Options {
            interval: StdDuration::from_secs(1),
            initial_delay: StdDuration::ZERO,
        },
        ..Default::default()
    };

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let runtime = tokio::spawn(run(
        options,
        store.clone(),
        Arc::new(LogNotifier),
        clock.clone(),
        async move {
            let _ = shutdown_rx.await;
        },
    ));

    // Let a few sweep intervals elapse on the paused clock
    tokio::time::sleep(StdDuration::from_secs(5)).await;
    shutdown_tx.send(()).unwrap();
    runtime.await.unwrap().unwrap();

    let capa = store.get_capa("capa-1").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::Overdue);
    let notifications = store
        .audit_for("capa-1", Some(ActionType::OverdueNotification), None)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
}

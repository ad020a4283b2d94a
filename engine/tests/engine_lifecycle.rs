//! Workflow engine lifecycle tests

use std::sync::Arc;

use chrono::{Duration, Utc};

use capaflow::clock::{Clock, ManualClock};
use capaflow::errors::EngineError;
use capaflow::models::audit::ActionType;
use capaflow::models::capa::{Capa, CapaStatus, Priority};
use capaflow::models::step::{StepAction, StepStatus};
use capaflow::notify::{ChannelNotifier, LogNotifier, Notifier};
use capaflow::store::memory::MemoryStore;
use capaflow::store::Store;
use capaflow::workflow::engine::WorkflowEngine;

fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, WorkflowEngine) {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let engine = WorkflowEngine::new(store.clone(), Arc::new(LogNotifier), clock.clone());
    (store, clock, engine)
}

async fn seed_capa(store: &MemoryStore, clock: &ManualClock, id: &str, priority: Priority) {
    let now = clock.now();
    let capa = Capa::new(
        id,
        "Allergen cross-contact",
        priority,
        "Contamination",
        "alice",
        now + Duration::days(14),
        now,
    );
    store.insert_capa(capa).await.unwrap();
}

#[tokio::test]
async fn test_initiate_creates_plan_and_audit() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::High).await;

    let plan = engine.initiate("capa-1", "alice").await.unwrap();
    assert_eq!(plan.len(), 5);

    let capa = store.get_capa("capa-1").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::InProgress);

    let initiated = store
        .audit_for("capa-1", Some(ActionType::WorkflowInitiated), None)
        .await
        .unwrap();
    assert_eq!(initiated.len(), 1);
    assert_eq!(initiated[0].performed_by, "alice");

    let steps = store.steps_for("capa-1").await.unwrap();
    assert_eq!(steps.len(), 5);
    assert!(steps.iter().all(|s| s.status == StepStatus::Pending));
}

#[tokio::test]
async fn test_initiate_unknown_capa() {
    let (_store, _clock, engine) = setup();
    let result = engine.initiate("ghost", "alice").await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_initiate_is_idempotent() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::Medium).await;

    engine.initiate("capa-1", "alice").await.unwrap();
    let second = engine.initiate("capa-1", "alice").await;
    assert!(matches!(second, Err(EngineError::AlreadyInitiated(_))));

    let initiated = store
        .audit_for("capa-1", Some(ActionType::WorkflowInitiated), None)
        .await
        .unwrap();
    assert_eq!(initiated.len(), 1);
}

#[tokio::test]
async fn test_advance_terminal_step_fails_without_new_audit() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::Low).await;
    engine.initiate("capa-1", "alice").await.unwrap();

    engine
        .advance_step("capa-1", 0, StepAction::Approve, None, "alice")
        .await
        .unwrap();
    let again = engine
        .advance_step("capa-1", 0, StepAction::Approve, None, "alice")
        .await;
    assert!(matches!(again, Err(EngineError::InvalidTransition(_))));

    let completions = store
        .audit_for("capa-1", Some(ActionType::WorkflowStepCompleted), None)
        .await
        .unwrap();
    assert_eq!(completions.len(), 1);
}

#[tokio::test]
async fn test_advance_unknown_step() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::Low).await;
    engine.initiate("capa-1", "alice").await.unwrap();

    let result = engine
        .advance_step("capa-1", 99, StepAction::Approve, None, "alice")
        .await;
    assert!(matches!(result, Err(EngineError::NotFound(_))));
}

#[tokio::test]
async fn test_advance_before_initiation() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::Low).await;

    let result = engine
        .advance_step("capa-1", 0, StepAction::Approve, None, "alice")
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_sequential_gating_without_auto_advance() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::High).await;
    engine.initiate("capa-1", "alice").await.unwrap();

    // First approval is gated while the investigation is pending
    let gated = engine
        .advance_step("capa-1", 1, StepAction::Approve, None, "QualityManager")
        .await;
    assert!(matches!(gated, Err(EngineError::InvalidTransition(_))));

    engine
        .advance_step("capa-1", 0, StepAction::Approve, None, "alice")
        .await
        .unwrap();
    engine
        .advance_step("capa-1", 1, StepAction::Approve, None, "QualityManager")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_critical_flow_reaches_pending_verification() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::Critical).await;

    let plan = engine.initiate("capa-1", "alice").await.unwrap();
    assert_eq!(plan.len(), 6);

    for step in &plan {
        let actor = step.assigned_to.clone();
        engine
            .advance_step("capa-1", step.id, StepAction::Approve, None, &actor)
            .await
            .unwrap();
    }

    let capa = store.get_capa("capa-1").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::PendingVerification);
    assert_eq!(
        engine.derive_status("capa-1").await.unwrap(),
        CapaStatus::PendingVerification
    );
}

#[tokio::test]
async fn test_rejection_is_a_recorded_dead_end() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (notifier, mut rx) = ChannelNotifier::new();
    let engine = WorkflowEngine::new(store.clone(), Arc::new(notifier), clock.clone());
    seed_capa(&store, &clock, "capa-1", Priority::Medium).await;

    engine.initiate("capa-1", "alice").await.unwrap();
    let status = engine
        .advance_step(
            "capa-1",
            0,
            StepAction::Reject,
            Some("root cause not identified".to_string()),
            "QualityManager",
        )
        .await
        .unwrap();

    // The CAPA stays in progress; a human acts on the emitted event
    assert_eq!(status, CapaStatus::InProgress);
    let event = rx.try_recv().unwrap();
    assert_eq!(event.action, ActionType::WorkflowStepCompleted);
    assert!(event.message.contains("rejected"));

    let steps = store.steps_for("capa-1").await.unwrap();
    assert_eq!(steps[0].status, StepStatus::Rejected);
    assert_eq!(
        steps[0].comments.as_deref(),
        Some("root cause not identified")
    );
}

#[tokio::test]
async fn test_close_and_verify_effectiveness() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::Low).await;
    let plan = engine.initiate("capa-1", "alice").await.unwrap();

    // Cannot close while required steps are pending
    let early = engine.close("capa-1", "alice").await;
    assert!(matches!(early, Err(EngineError::InvalidTransition(_))));

    // Cannot verify a CAPA that is not closed
    let unverifiable = engine.verify_effectiveness("capa-1", "QualityManager").await;
    assert!(matches!(unverifiable, Err(EngineError::InvalidTransition(_))));

    for step in &plan {
        engine
            .advance_step("capa-1", step.id, StepAction::Approve, None, "alice")
            .await
            .unwrap();
    }
    engine.close("capa-1", "alice").await.unwrap();

    let capa = store.get_capa("capa-1").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::Closed);
    assert!(capa.completion_date.is_some());

    engine
        .verify_effectiveness("capa-1", "QualityManager")
        .await
        .unwrap();
    let capa = store.get_capa("capa-1").await.unwrap().unwrap();
    assert!(capa.effectiveness_verified);

    // Closing twice is invalid
    let again = engine.close("capa-1", "alice").await;
    assert!(matches!(again, Err(EngineError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_resume_overdue() {
    let (store, clock, engine) = setup();
    seed_capa(&store, &clock, "capa-1", Priority::Medium).await;
    engine.initiate("capa-1", "alice").await.unwrap();

    let mut capa = store.get_capa("capa-1").await.unwrap().unwrap();
    capa.status = CapaStatus::Overdue;
    store.update_capa(capa).await.unwrap();

    engine.resume("capa-1", "alice").await.unwrap();
    let capa = store.get_capa("capa-1").await.unwrap().unwrap();
    assert_eq!(capa.status, CapaStatus::InProgress);

    let not_overdue = engine.resume("capa-1", "alice").await;
    assert!(matches!(not_overdue, Err(EngineError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_schedule_effectiveness_review() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let (notifier, mut rx) = ChannelNotifier::new();
    let notifier: Arc<dyn Notifier> = Arc::new(notifier);
    let engine = WorkflowEngine::new(store.clone(), notifier, clock.clone());
    seed_capa(&store, &clock, "capa-1", Priority::Low).await;

    let plan = engine.initiate("capa-1", "alice").await.unwrap();
    for step in &plan {
        engine
            .advance_step("capa-1", step.id, StepAction::Approve, None, "alice")
            .await
            .unwrap();
    }
    engine.close("capa-1", "alice").await.unwrap();

    let review_at = clock.now() + Duration::days(30);
    engine
        .schedule_effectiveness_review("capa-1", review_at, "QualityManager")
        .await
        .unwrap();

    let scheduled = store
        .audit_for("capa-1", Some(ActionType::EffectivenessReviewScheduled), None)
        .await
        .unwrap();
    assert_eq!(scheduled.len(), 1);

    let event = rx.try_recv().unwrap();
    assert_eq!(event.action, ActionType::EffectivenessReviewScheduled);
}

// ==========================================
// 投运决策 API 端到端测试
// ==========================================
// 流程: 夜间方案 → 人工覆写 → 审批 → 情景试算 → 应急处置
// ==========================================


use chrono::{Duration, Utc};
use metro_induction::api::{ApiError, InductionApi};
use metro_induction::config::{config_keys, ConfigManager};
use metro_induction::domain::scenario::ScenarioPatch;
use metro_induction::domain::types::{
    EmergencyPhase, FaultSeverity, InductionAction, PlanMode, PlanStatus,
};
use metro_induction::engine::{
    cancel_pair, InductionEventPublisher, InductionEventType, RecordingEventPublisher,
    StaticSnapshotProvider,
};
use std::sync::Arc;
use test_helpers::*;

struct Harness {
    _tmp: tempfile::NamedTempFile,
    api: InductionApi,
    provider: Arc<StaticSnapshotProvider>,
    events: Arc<RecordingEventPublisher>,
}

async fn harness(service: usize, standby: usize) -> Harness {
    metro_induction::logging::init_test();
    let (tmp, db_path) = create_test_db().unwrap();
    let conn = shared_conn(&db_path);

    let config = ConfigManager::from_connection(conn.clone()).unwrap();
    config
        .set_global_config_value(config_keys::SERVICE_QUOTA, &service.to_string())
        .unwrap();
    config
        .set_global_config_value(config_keys::STANDBY_QUOTA, &standby.to_string())
        .unwrap();

    let provider = Arc::new(StaticSnapshotProvider::new(fleet(8, Utc::now())));
    let events = Arc::new(RecordingEventPublisher::new());
    let publisher: Arc<dyn InductionEventPublisher> = events.clone();
    let api = InductionApi::bootstrap(conn, provider.clone(), Some(publisher))
        .await
        .unwrap();

    Harness {
        _tmp: tmp,
        api,
        provider,
        events,
    }
}

#[tokio::test]
async fn test_nightly_plan_is_stored_as_draft() {
    let h = harness(4, 2).await;
    assert_eq!(h.api.config().quota.service_target, 4);

    let as_of = Utc::now();
    let plan = h.api.plan_nightly(as_of.date_naive(), as_of, None).await.unwrap();
    assert_eq!(plan.status, PlanStatus::Draft);
    assert_eq!(plan.mode, PlanMode::Normal);
    assert_eq!(plan.counts().service, 4);
    assert_eq!(plan.counts().standby, 2);

    let stored = h.api.get_plan(&plan.plan_id).unwrap();
    assert_eq!(stored.assignments, plan.assignments);
    assert_eq!(h.events.count_of(InductionEventType::PlanGenerated), 1);
}

#[tokio::test]
async fn test_cancelled_nightly_run_stores_nothing() {
    let h = harness(4, 2).await;
    let (handle, token) = cancel_pair();
    handle.cancel();

    let as_of = Utc::now();
    let err = h
        .api
        .plan_nightly(as_of.date_naive(), as_of, Some(token))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Cancelled));
    assert_eq!(h.events.count_of(InductionEventType::PlanGenerated), 0);
}

#[tokio::test]
async fn test_quota_infeasible_surfaces_counts() {
    let h = harness(8, 0).await;
    let as_of = Utc::now();
    let mut trains = fleet(8, as_of);
    expire_fitness(&mut trains[3], as_of);
    h.provider.replace_fleet(trains).unwrap();

    let err = h.api.plan_nightly(as_of.date_naive(), as_of, None).await.unwrap_err();
    assert!(matches!(err, ApiError::QuotaInfeasible { required: 8, eligible: 7 }));
}

#[tokio::test]
async fn test_override_respects_hard_blocks_and_approval() {
    let h = harness(4, 2).await;
    let as_of = Utc::now();
    let mut trains = fleet(8, as_of);
    expire_fitness(&mut trains[0], as_of);
    h.provider.replace_fleet(trains).unwrap();

    let plan = h.api.plan_nightly(as_of.date_naive(), as_of, None).await.unwrap();
    let now = Utc::now();

    let err = h
        .api
        .override_assignment(&plan.plan_id, "T01", InductionAction::Service, "op-1", "needed", now)
        .unwrap_err();
    assert!(matches!(err, ApiError::HardBlockViolation { .. }));

    let standby_id = plan
        .assignments
        .iter()
        .find(|a| a.action == InductionAction::Standby)
        .map(|a| a.train_id.clone())
        .unwrap();
    let updated = h
        .api
        .override_assignment(&plan.plan_id, &standby_id, InductionAction::IblCleaning, "op-1", "VIP visit", now)
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(
        h.api.get_plan(&plan.plan_id).unwrap().assignment(&standby_id).unwrap().action,
        InductionAction::IblCleaning
    );

    let approved = h.api.approve_plan(&plan.plan_id, "supervisor", now).unwrap();
    assert_eq!(approved.status, PlanStatus::Approved);
    assert_eq!(h.events.count_of(InductionEventType::PlanApproved), 1);

    // 审批后不可再覆写
    let err = h
        .api
        .override_assignment(&plan.plan_id, &standby_id, InductionAction::Standby, "op-1", "undo", now)
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidStateTransition { .. }));
}

#[tokio::test]
async fn test_simulation_is_never_persisted() {
    let h = harness(4, 2).await;
    let as_of = Utc::now();
    let baseline = h.api.plan_nightly(as_of.date_naive(), as_of, None).await.unwrap();

    let outcome = h
        .api
        .simulate(&baseline.plan_id, &ScenarioPatch::default(), None)
        .await
        .unwrap();
    assert!(outcome.diff.is_zero());
    assert_eq!(outcome.plan.mode, PlanMode::Scenario);
    assert!(matches!(
        h.api.get_plan(&outcome.plan.plan_id),
        Err(ApiError::NotFound(_))
    ));

    let mut patch = ScenarioPatch::default();
    patch.forced_unavailable.insert(baseline.service_train_ids()[0].clone());
    let outcome = h.api.simulate(&baseline.plan_id, &patch, None).await.unwrap();
    assert!(!outcome.diff.action_changes.is_empty());
}

#[tokio::test]
async fn test_simulation_during_crisis_keeps_withdrawn_trains_out() {
    let h = harness(4, 2).await;
    let as_of = Utc::now();
    let baseline = h.api.plan_nightly(as_of.date_naive(), as_of, None).await.unwrap();

    let mut last = String::new();
    for (minute, train) in [(0, "T01"), (5, "T02"), (10, "T03")] {
        last = h
            .api
            .handle_breakdown(train, "BRK-9", FaultSeverity::Major, as_of + Duration::minutes(minute))
            .await
            .unwrap();
    }
    assert_eq!(h.api.emergency_status(&last).await.unwrap().phase, EmergencyPhase::Crisis);

    let outcome = h
        .api
        .simulate(&baseline.plan_id, &ScenarioPatch::default(), None)
        .await
        .unwrap();
    for train in ["T01", "T02", "T03"] {
        assert_eq!(
            outcome.plan.assignment(train).unwrap().action,
            InductionAction::OutOfService,
            "{} still revenue-ready during crisis",
            train
        );
    }
    assert_eq!(outcome.plan.counts().service, 4);
    assert!(!outcome.diff.is_zero());
}

#[tokio::test]
async fn test_breakdown_flow_through_api() {
    let h = harness(4, 2).await;
    let now = Utc::now();
    let mut trains = vec![
        in_service("T01", "R1", now),
        in_service("T02", "R1", now),
        in_service("T03", "R2", now),
        in_service("T04", "R2", now),
        standby("T05", 6, now),
        standby("T06", 2, now),
    ];
    trains.push(healthy_train("T07", now, 12_000.0));
    h.provider.replace_fleet(trains).unwrap();

    let err = h
        .api
        .handle_breakdown("T99", "BRK-1", FaultSeverity::Major, now)
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));

    let id = h
        .api
        .handle_breakdown("T03", "BRK-1", FaultSeverity::Major, now)
        .await
        .unwrap();
    let status = h.api.emergency_status(&id).await.unwrap();
    assert_eq!(status.phase, EmergencyPhase::PlanReady);
    assert_eq!(status.emergency_plan.as_ref().unwrap().replacement.train_id, "T06");
    assert_eq!(h.events.count_of(InductionEventType::EmergencyRaised), 1);

    let resolved = h
        .api
        .approve_emergency(&id, "controller", now + Duration::minutes(4))
        .await
        .unwrap();
    assert_eq!(resolved.phase, EmergencyPhase::Resolved);

    // 第二起故障无人审批 → 超时清扫
    let later = now + Duration::hours(1);
    let second = h
        .api
        .handle_breakdown("T01", "BRK-2", FaultSeverity::Minor, later)
        .await
        .unwrap();
    let expired = h
        .api
        .sweep_expired_emergencies(later + Duration::minutes(20))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(expired[0].emergency_id(), second);
    assert_eq!(h.events.count_of(InductionEventType::UnresolvedEmergency), 1);
}

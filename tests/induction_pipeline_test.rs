// ==========================================
// 决策流水线集成测试
// ==========================================
// 职责: 验证评估 → 冲突 → 裁决 → 排名的端到端性质
// 场景: 硬阻断不上线、配额、幂等、权重归一、应急阈值边界、硬-软冲突
// ==========================================


use chrono::{Duration, Utc};
use metro_induction::config::PlanningConfig;
use metro_induction::domain::plan::ServiceQuota;
use metro_induction::domain::scenario::WeightOverrides;
use metro_induction::domain::types::{
    ConflictKind, ConflictSeverity, EvaluatorKind, InductionAction, PlanningMode,
};
use metro_induction::engine::weights::WeightTable;
use metro_induction::engine::{standard_evaluators, EngineError, InductionPipeline, PipelineRequest};
use std::sync::Arc;
use test_helpers::*;

fn pipeline(service: usize, standby: usize) -> InductionPipeline {
    let mut config = PlanningConfig::default();
    config.quota = ServiceQuota::new(service, standby);
    InductionPipeline::new(Arc::new(config))
}

#[tokio::test]
async fn test_hard_blocked_trains_never_revenue_ready() {
    let as_of = Utc::now();
    let mut trains = fleet(10, as_of);
    for i in [0, 4, 7] {
        expire_fitness(&mut trains[i], as_of);
    }

    let plan = pipeline(5, 2)
        .run(PipelineRequest::new(
            PlanningMode::Normal,
            as_of.date_naive(),
            as_of,
            trains,
            ServiceQuota::new(5, 2),
        ))
        .await
        .unwrap();

    let blocked: Vec<_> = plan.assignments.iter().filter(|a| a.hard_blocked).collect();
    assert_eq!(blocked.len(), 3);
    for a in blocked {
        assert!(!a.action.is_revenue_ready(), "{} assigned {}", a.train_id, a.action);
        assert!(!a.final_eligible);
    }
    assert_eq!(plan.counts().service, 5);
    assert_eq!(plan.counts().standby, 2);

    // SERVICE 名次连续
    let ranks: Vec<u32> = plan
        .assignments
        .iter()
        .filter_map(|a| a.service_rank)
        .collect::<std::collections::BTreeSet<_>>()
        .into_iter()
        .collect();
    assert_eq!(ranks, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_normal_mode_quota_shortfall_is_error() {
    let as_of = Utc::now();
    let mut trains = fleet(4, as_of);
    expire_fitness(&mut trains[1], as_of);

    let err = pipeline(4, 0)
        .run(PipelineRequest::new(
            PlanningMode::Normal,
            as_of.date_naive(),
            as_of,
            trains,
            ServiceQuota::new(4, 0),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::QuotaInfeasible { required: 4, eligible: 3 }));
}

#[tokio::test]
async fn test_identical_inputs_give_identical_ranking() {
    let as_of = Utc::now();
    let pipeline = pipeline(6, 2);
    let request = || {
        PipelineRequest::new(
            PlanningMode::Normal,
            as_of.date_naive(),
            as_of,
            fleet(12, as_of),
            ServiceQuota::new(6, 2),
        )
    };

    let first = pipeline.run(request()).await.unwrap();
    let second = pipeline.run(request()).await.unwrap();
    assert_eq!(first.service_train_ids(), second.service_train_ids());
    assert_eq!(first.assignments, second.assignments);
}

#[test]
fn test_weight_tables_sum_to_one() {
    for mode in [PlanningMode::Normal, PlanningMode::Emergency, PlanningMode::Crisis] {
        let table = WeightTable::for_mode(mode);
        assert!(table.is_normalized(), "{} sums to {}", mode, table.sum());

        let mut overrides = WeightOverrides::default();
        overrides.evaluators.insert(EvaluatorKind::Branding, 0.6);
        overrides.readiness = Some(0.1);
        let adjusted = table.with_overrides(&overrides);
        assert!(adjusted.is_normalized(), "{} override sums to {}", mode, adjusted.sum());
    }
}

#[tokio::test]
async fn test_emergency_fitness_validity_boundary() {
    let as_of = Utc::now();
    let mut short = standby("T01", 5, as_of);
    set_fitness_expiry(&mut short, as_of + Duration::hours(23) + Duration::minutes(59));
    let mut long = standby("T02", 5, as_of);
    set_fitness_expiry(&mut long, as_of + Duration::hours(24) + Duration::minutes(1));

    let plan = pipeline(1, 0)
        .run(PipelineRequest::new(
            PlanningMode::Emergency,
            as_of.date_naive(),
            as_of,
            vec![short, long],
            ServiceQuota::new(1, 0),
        ))
        .await
        .unwrap();

    let t01 = plan.assignment("T01").unwrap();
    assert!(t01.hard_blocked);
    assert!(!t01.final_eligible);
    assert_eq!(t01.evaluator_scores.get(&EvaluatorKind::Fitness), Some(&0.0));

    let t02 = plan.assignment("T02").unwrap();
    assert!(!t02.hard_blocked);
    assert!(t02.final_eligible);
    assert_eq!(t02.action, InductionAction::Service);
}

#[tokio::test]
async fn test_expired_fitness_overrides_branding_urgency() {
    let as_of = Utc::now();
    let mut trains = fleet(4, as_of);
    expire_fitness(&mut trains[0], as_of);

    let mut evaluators = standard_evaluators();
    evaluators[2] = Arc::new(FixedServicePullEvaluator {
        kind: EvaluatorKind::Branding,
        train_id: "T01".to_string(),
        score: 98.0,
    });
    let mut config = PlanningConfig::default();
    config.quota = ServiceQuota::new(2, 1);
    let pipeline = InductionPipeline::with_evaluators(Arc::new(config), evaluators);

    let plan = pipeline
        .run(PipelineRequest::new(
            PlanningMode::Normal,
            as_of.date_naive(),
            as_of,
            trains,
            ServiceQuota::new(2, 1),
        ))
        .await
        .unwrap();

    let conflict = plan
        .conflicts
        .iter()
        .find(|c| c.involves("T01"))
        .expect("conflict for T01");
    assert_eq!(conflict.kind, ConflictKind::HardVsSoft);
    assert_eq!(conflict.severity, ConflictSeverity::High);
    assert!(conflict.is_resolved());

    let t01 = plan.assignment("T01").unwrap();
    assert!(!t01.final_eligible);
    assert_eq!(t01.action, InductionAction::IblMaintenance);
    assert!(t01.resolved_conflicts.contains(&conflict.conflict_id));
}

#[tokio::test]
async fn test_branding_sla_mandate_against_expired_fitness_needs_operator() {
    let as_of = Utc::now();
    let mut trains = fleet(4, as_of);
    expire_fitness(&mut trains[0], as_of);
    trains[0].branding = Some(vec![branding_contract(
        "BR-1",
        10.0,
        100.0,
        as_of + Duration::hours(12),
    )]);

    let plan = pipeline(2, 1)
        .run(PipelineRequest::new(
            PlanningMode::Normal,
            as_of.date_naive(),
            as_of,
            trains,
            ServiceQuota::new(2, 1),
        ))
        .await
        .unwrap();

    assert!(plan
        .conflicts
        .iter()
        .any(|c| c.kind == ConflictKind::HardVsHard && c.severity == ConflictSeverity::Critical));
    let t01 = plan.assignment("T01").unwrap();
    assert!(t01.manual_decision_required);
    assert!(!t01.action.is_revenue_ready());
}

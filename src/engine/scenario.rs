// ==========================================
// 地铁列车夜间投运决策系统 - 情景试算引擎
// ==========================================
// 依据: 决策引擎设计 - 4.5 Scenario Engine
// 职责: 在基线快照上叠加补丁重跑流水线,输出方案差异
// 红线: 情景方案 mode = SCENARIO,不可审批、不落库
// 红线: 空补丁 → 零差异 (沿用基线快照时刻、规则模式、配额)
// ==========================================

use crate::domain::plan::Plan;
use crate::domain::scenario::{ActionChange, PlanDiff, ScenarioPatch};
use crate::domain::train::TrainSnapshot;
use crate::domain::types::InductionAction;
use crate::engine::cancel::CancelToken;
use crate::engine::composite_ranker::ForcedStates;
use crate::engine::error::EngineResult;
use crate::engine::pipeline::{InductionPipeline, PipelineRequest};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument};

/// 情景试算结果
#[derive(Debug, Clone)]
pub struct ScenarioOutcome {
    pub plan: Plan,
    pub diff: PlanDiff,
}

pub struct ScenarioEngine {
    pipeline: Arc<InductionPipeline>,
}

impl ScenarioEngine {
    pub fn new(pipeline: Arc<InductionPipeline>) -> Self {
        Self { pipeline }
    }

    /// 情景试算
    ///
    /// # 参数
    /// - baseline: 基线方案
    /// - snapshots: 基线生成时的车队快照
    /// - patch: 情景补丁
    /// - cancel: 可选取消令牌
    #[instrument(skip(self, baseline, snapshots, patch, cancel), fields(
        baseline_plan_id = %baseline.plan_id,
        empty_patch = patch.is_empty()
    ))]
    pub async fn simulate(
        &self,
        baseline: &Plan,
        snapshots: Vec<TrainSnapshot>,
        patch: &ScenarioPatch,
        cancel: Option<CancelToken>,
    ) -> EngineResult<ScenarioOutcome> {
        let quota = patch.quota_override.unwrap_or(baseline.service_quota);
        let mut request = PipelineRequest::new(
            baseline.rule_mode,
            baseline.decision_date,
            baseline.as_of,
            snapshots,
            quota,
        )
        .with_forced(ForcedStates::from(patch))
        .with_weight_overrides(patch.weight_overrides.clone().filter(|w| !w.is_empty()))
        .as_scenario(&baseline.plan_id);
        if let Some(token) = cancel {
            request = request.with_cancel(token);
        }

        let plan = self.pipeline.run(request).await?;
        let diff = diff_plans(baseline, &plan);
        info!(
            scenario_plan_id = %plan.plan_id,
            action_changes = diff.action_changes.len(),
            mean_score_delta = diff.mean_score_delta,
            "scenario simulated"
        );
        Ok(ScenarioOutcome { plan, diff })
    }
}

/// 计算两个方案的差异
pub fn diff_plans(baseline: &Plan, scenario: &Plan) -> PlanDiff {
    let before = baseline.counts();
    let after = scenario.counts();
    let count_deltas: BTreeMap<InductionAction, i64> = [
        InductionAction::Service,
        InductionAction::Standby,
        InductionAction::IblMaintenance,
        InductionAction::IblCleaning,
        InductionAction::OutOfService,
    ]
    .into_iter()
    .map(|action| (action, after.get(action) as i64 - before.get(action) as i64))
    .filter(|(_, delta)| *delta != 0)
    .collect();

    let mut action_changes: Vec<ActionChange> = scenario
        .assignments
        .iter()
        .filter_map(|a| {
            let base = baseline.assignment(&a.train_id)?;
            (base.action != a.action).then(|| ActionChange {
                train_id: a.train_id.clone(),
                from: base.action,
                to: a.action,
            })
        })
        .collect();
    action_changes.sort_by(|a, b| a.train_id.cmp(&b.train_id));

    let base_ids: BTreeSet<&str> = baseline.conflicts.iter().map(|c| c.conflict_id.as_str()).collect();
    let scen_ids: BTreeSet<&str> = scenario.conflicts.iter().map(|c| c.conflict_id.as_str()).collect();

    PlanDiff {
        baseline_plan_id: baseline.plan_id.clone(),
        scenario_plan_id: scenario.plan_id.clone(),
        count_deltas,
        mean_score_delta: scenario.mean_overall_score() - baseline.mean_overall_score(),
        action_changes,
        introduced_conflicts: scen_ids.difference(&base_ids).map(|s| s.to_string()).collect(),
        resolved_conflicts: base_ids.difference(&scen_ids).map(|s| s.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::domain::plan::ServiceQuota;
    use crate::domain::types::{PlanMode, PlanningMode};
    use crate::engine::test_fleet::fleet;
    use chrono::Utc;

    async fn baseline(pipeline: &InductionPipeline, snapshots: Vec<TrainSnapshot>) -> Plan {
        let as_of = Utc::now();
        pipeline
            .run(PipelineRequest::new(
                PlanningMode::Normal,
                as_of.date_naive(),
                as_of,
                snapshots,
                ServiceQuota::new(4, 1),
            ))
            .await
            .unwrap()
    }

    fn engine() -> (Arc<InductionPipeline>, ScenarioEngine) {
        let pipeline = Arc::new(InductionPipeline::new(Arc::new(PlanningConfig::default())));
        (pipeline.clone(), ScenarioEngine::new(pipeline))
    }

    #[tokio::test]
    async fn test_empty_patch_yields_zero_diff() {
        let (pipeline, engine) = engine();
        let snapshots = fleet(7, Utc::now());
        let base = baseline(&pipeline, snapshots.clone()).await;

        let outcome = engine
            .simulate(&base, snapshots, &ScenarioPatch::default(), None)
            .await
            .unwrap();
        assert!(outcome.diff.is_zero(), "{:?}", outcome.diff);
        assert_eq!(outcome.plan.mode, PlanMode::Scenario);
        assert_eq!(outcome.plan.baseline_plan_id.as_deref(), Some(base.plan_id.as_str()));
        assert!(!outcome.plan.is_approvable());
    }

    #[tokio::test]
    async fn test_forced_unavailable_shifts_service() {
        let (pipeline, engine) = engine();
        let snapshots = fleet(7, Utc::now());
        let base = baseline(&pipeline, snapshots.clone()).await;
        let top = base.service_train_ids()[0].clone();

        let mut patch = ScenarioPatch::default();
        patch.forced_unavailable.insert(top.clone());
        let outcome = engine.simulate(&base, snapshots, &patch, None).await.unwrap();

        assert_eq!(outcome.plan.assignment(&top).unwrap().action, InductionAction::OutOfService);
        assert_eq!(outcome.diff.count_deltas.get(&InductionAction::OutOfService), Some(&1));
        assert!(outcome.diff.action_changes.iter().any(|c| c.train_id == top));
        assert_eq!(outcome.plan.counts().service, 4);
    }

    #[tokio::test]
    async fn test_quota_override() {
        let (pipeline, engine) = engine();
        let snapshots = fleet(7, Utc::now());
        let base = baseline(&pipeline, snapshots.clone()).await;

        let patch = ScenarioPatch {
            quota_override: Some(ServiceQuota::new(5, 1)),
            ..Default::default()
        };
        let outcome = engine.simulate(&base, snapshots, &patch, None).await.unwrap();
        assert_eq!(outcome.diff.count_deltas.get(&InductionAction::Service), Some(&1));
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 决策流水线
// ==========================================
// 依据: 决策引擎设计 - 5. Orchestration
// 流程: 快照 → 并发评估 (扇出/扇入) → 冲突检测 → 冲突裁决 → 排名分配 → 方案
// 红线: 单评估器超时不阻塞整体,用上次结果或中性分替代并标记
// 红线: 超过整体截止时间仍出方案,标记 incomplete + DEADLINE_EXCEEDED
// 红线: 取消只在排名屏障之前生效
// ==========================================

use crate::config::PlanningConfig;
use crate::domain::evaluation::EvaluationResult;
use crate::domain::plan::{Plan, ServiceQuota};
use crate::domain::scenario::WeightOverrides;
use crate::domain::train::TrainSnapshot;
use crate::domain::types::{ErrorKind, EvaluatorKind, PlanMode, PlanningMode};
use crate::engine::cancel::CancelToken;
use crate::engine::composite_ranker::{CompositeRanker, ForcedStates, RankRequest};
use crate::engine::conflict_detector::ConflictDetector;
use crate::engine::conflict_resolver::{ConflictResolver, ResolvedTrain};
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::evaluator::{fleet_average_km, EvaluationContext, Evaluator};
use crate::engine::evaluators::standard_evaluators;
use crate::engine::weights::WeightTable;
use crate::perf::PerfGuard;
use chrono::{DateTime, NaiveDate, Utc};
use futures::future::join_all;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

// ==========================================
// PipelineRequest - 单次运行参数
// ==========================================
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub mode: PlanningMode,
    pub plan_mode: PlanMode,
    pub decision_date: NaiveDate,
    pub as_of: DateTime<Utc>,
    pub snapshots: Vec<TrainSnapshot>,
    pub quota: ServiceQuota,
    pub forced: ForcedStates,
    pub weight_overrides: Option<WeightOverrides>,
    pub deadline: Option<Duration>, // None => 按模式取配置预算
    pub cancel: Option<CancelToken>,
    pub baseline_plan_id: Option<String>,
}

impl PipelineRequest {
    pub fn new(
        mode: PlanningMode,
        decision_date: NaiveDate,
        as_of: DateTime<Utc>,
        snapshots: Vec<TrainSnapshot>,
        quota: ServiceQuota,
    ) -> Self {
        Self {
            mode,
            plan_mode: mode.into(),
            decision_date,
            as_of,
            snapshots,
            quota,
            forced: ForcedStates::default(),
            weight_overrides: None,
            deadline: None,
            cancel: None,
            baseline_plan_id: None,
        }
    }

    pub fn with_forced(mut self, forced: ForcedStates) -> Self {
        self.forced = forced;
        self
    }

    pub fn with_weight_overrides(mut self, overrides: Option<WeightOverrides>) -> Self {
        self.weight_overrides = overrides;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// 标记为情景试算 (不可审批、不落库)
    pub fn as_scenario(mut self, baseline_plan_id: &str) -> Self {
        self.plan_mode = PlanMode::Scenario;
        self.baseline_plan_id = Some(baseline_plan_id.to_string());
        self
    }
}

// 按规则模式分开缓存: 不同模式阈值表不同,分数不可互用
type LastKnownCache = HashMap<(String, EvaluatorKind, PlanningMode), EvaluationResult>;

// ==========================================
// InductionPipeline - 决策流水线
// ==========================================
pub struct InductionPipeline {
    config: Arc<PlanningConfig>,
    evaluators: Vec<Arc<dyn Evaluator>>,
    detector: ConflictDetector,
    resolver: ConflictResolver,
    ranker: CompositeRanker,
    last_known: Mutex<LastKnownCache>,
}

impl InductionPipeline {
    /// 使用标准六评估器
    pub fn new(config: Arc<PlanningConfig>) -> Self {
        Self::with_evaluators(config, standard_evaluators())
    }

    pub fn with_evaluators(config: Arc<PlanningConfig>, evaluators: Vec<Arc<dyn Evaluator>>) -> Self {
        Self {
            detector: ConflictDetector::new(config.soft_conflict_delta, config.high_urgency_threshold),
            resolver: ConflictResolver::new(config.cost_model),
            ranker: CompositeRanker::new(),
            last_known: Mutex::new(HashMap::new()),
            evaluators,
            config,
        }
    }

    pub fn config(&self) -> &PlanningConfig {
        &self.config
    }

    /// 执行一次完整决策
    ///
    /// # 返回
    /// - Ok(Plan): 草稿方案 (可能带 incomplete / error_kind)
    /// - Err(Cancelled): 排名前被取消
    /// - Err(QuotaInfeasible): NORMAL 规则下合格数不足
    #[instrument(skip(self, request), fields(
        mode = %request.mode,
        plan_mode = %request.plan_mode,
        decision_date = %request.decision_date,
        trains = request.snapshots.len()
    ))]
    pub async fn run(&self, request: PipelineRequest) -> EngineResult<Plan> {
        let deadline = request
            .deadline
            .unwrap_or_else(|| self.config.budgets.deadline_for(request.mode));
        let _total = PerfGuard::with_budget("pipeline.run", deadline);
        let started = Instant::now();

        if request.cancel.as_ref().map_or(false, |c| c.is_cancelled()) {
            return Err(EngineError::Cancelled);
        }

        let snapshots = dedup_snapshots(request.snapshots);
        let ctx = Arc::new(EvaluationContext::new(
            request.mode,
            request.decision_date,
            request.as_of,
            &self.config,
            fleet_average_km(&snapshots),
        ));
        let snapshots: Vec<Arc<TrainSnapshot>> = snapshots.into_iter().map(Arc::new).collect();

        // 步骤1: 并发评估
        let mut results = {
            let _g = PerfGuard::new("pipeline.evaluate");
            self.evaluate_fleet(&snapshots, &ctx, started + deadline, request.cancel.as_ref())
                .await?
        };

        // 步骤2: 冲突检测与裁决
        let (resolved, resource_conflicts) = {
            let _g = PerfGuard::new("pipeline.resolve");
            let resource_conflicts = self.detector.detect_resource_conflicts(&results);
            let resolved: Vec<ResolvedTrain> = snapshots
                .iter()
                .map(|snapshot| {
                    let train_results = results.remove(&snapshot.train_id).unwrap_or_default();
                    let conflicts = self.detector.detect_for_train(&train_results);
                    self.resolver.resolve(snapshot, train_results, conflicts, &ctx)
                })
                .collect();
            (resolved, resource_conflicts)
        };

        // 排名屏障
        if request.cancel.as_ref().map_or(false, |c| c.is_cancelled()) {
            info!("run cancelled before ranking");
            return Err(EngineError::Cancelled);
        }

        // 步骤3: 排名分配
        let base = WeightTable::for_mode(request.mode);
        let weights = match request
            .weight_overrides
            .as_ref()
            .or_else(|| self.config.weight_overrides_for(request.mode))
        {
            Some(overrides) if !overrides.is_empty() => base.with_overrides(overrides),
            _ => base,
        };

        let mut plan = {
            let _g = PerfGuard::new("pipeline.rank");
            self.ranker.rank(
                resolved,
                resource_conflicts,
                RankRequest {
                    ctx: &ctx,
                    plan_mode: request.plan_mode,
                    quota: request.quota,
                    weights: &weights,
                    forced: &request.forced,
                    baseline_plan_id: request.baseline_plan_id,
                },
            )?
        };

        if started.elapsed() > deadline {
            warn!(
                elapsed_ms = started.elapsed().as_millis() as u64,
                deadline_ms = deadline.as_millis() as u64,
                "deadline exceeded; plan marked incomplete"
            );
            plan.incomplete = true;
            plan.error_kind = ErrorKind::escalate(plan.error_kind, ErrorKind::DeadlineExceeded);
        }

        let counts = plan.counts();
        info!(
            plan_id = %plan.plan_id,
            service = counts.service,
            standby = counts.standby,
            ibl_maintenance = counts.ibl_maintenance,
            ibl_cleaning = counts.ibl_cleaning,
            out_of_service = counts.out_of_service,
            conflicts = plan.conflicts.len(),
            incomplete = plan.incomplete,
            "plan generated"
        );
        Ok(plan)
    }

    /// 扇出: 每车每评估器一个阻塞任务; 扇入: join_all
    async fn evaluate_fleet(
        &self,
        snapshots: &[Arc<TrainSnapshot>],
        ctx: &Arc<EvaluationContext>,
        deadline_at: Instant,
        cancel: Option<&CancelToken>,
    ) -> EngineResult<BTreeMap<String, Vec<EvaluationResult>>> {
        let soft = self.config.budgets.evaluator_soft_timeout;
        let mode = ctx.mode;
        let mut tasks = Vec::with_capacity(snapshots.len() * self.evaluators.len());

        for snapshot in snapshots {
            for evaluator in &self.evaluators {
                let budget = soft.min(deadline_at.saturating_duration_since(Instant::now()));
                let train_id = snapshot.train_id.clone();
                let kind = evaluator.kind();
                let snapshot = Arc::clone(snapshot);
                let evaluator = Arc::clone(evaluator);
                let ctx = Arc::clone(ctx);
                tasks.push(async move {
                    let handle =
                        tokio::task::spawn_blocking(move || evaluator.evaluate(&snapshot, &ctx));
                    let outcome = tokio::time::timeout(budget, handle).await;
                    (train_id, kind, outcome)
                });
            }
        }

        let fan_in = join_all(tasks);
        let outcomes = match cancel {
            Some(token) => tokio::select! {
                outcomes = fan_in => outcomes,
                _ = token.cancelled() => {
                    info!("run cancelled during evaluation");
                    return Err(EngineError::Cancelled);
                }
            },
            None => fan_in.await,
        };

        let mut by_train: BTreeMap<String, Vec<EvaluationResult>> = BTreeMap::new();
        for (train_id, kind, outcome) in outcomes {
            let result = match outcome {
                Ok(Ok(result)) => {
                    self.remember(&result, mode);
                    result
                }
                Ok(Err(e)) => {
                    warn!(train_id = %train_id, evaluator = %kind, error = %e, "evaluator task failed");
                    self.fallback(&train_id, kind, mode)
                }
                Err(_) => {
                    warn!(train_id = %train_id, evaluator = %kind, "evaluator timed out");
                    self.fallback(&train_id, kind, mode)
                }
            };
            by_train.entry(train_id).or_default().push(result);
        }
        for results in by_train.values_mut() {
            results.sort_by_key(|r| r.evaluator);
        }
        debug!(trains = by_train.len(), "evaluation fan-in complete");
        Ok(by_train)
    }

    fn remember(&self, result: &EvaluationResult, mode: PlanningMode) {
        if let Ok(mut cache) = self.last_known.lock() {
            cache.insert((result.train_id.clone(), result.evaluator, mode), result.clone());
        }
    }

    /// 超时替代: 同模式上次结果 > 中性分
    fn fallback(&self, train_id: &str, kind: EvaluatorKind, mode: PlanningMode) -> EvaluationResult {
        let last = self
            .last_known
            .lock()
            .ok()
            .and_then(|cache| cache.get(&(train_id.to_string(), kind, mode)).cloned());
        match last {
            Some(last) => EvaluationResult::from_last_known(&last),
            None => EvaluationResult::neutral_timeout(train_id, kind),
        }
    }
}

fn dedup_snapshots(snapshots: Vec<TrainSnapshot>) -> Vec<TrainSnapshot> {
    let mut seen = HashSet::new();
    snapshots
        .into_iter()
        .filter(|s| {
            let fresh = seen.insert(s.train_id.clone());
            if !fresh {
                warn!(train_id = %s.train_id, "duplicate snapshot ignored");
            }
            fresh
        })
        .collect()
}

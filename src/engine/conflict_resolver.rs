// ==========================================
// 地铁列车夜间投运决策系统 - 冲突裁决
// ==========================================
// 依据: 决策引擎设计 - 4.3 Conflict Resolution
// 裁决顺序:
// 1. 硬阻断绝对优先 (HARD_VS_SOFT)
// 2. 成本模型: 推迟入库代价 vs 错过上线代价,较低者让步
// 3. 成本平手: 决策窗口内有截止的一方胜
// 4. 仍无法区分: 维修优先
// HARD_VS_HARD 不自动裁决,标记人工决策
// RESOURCE 冲突在排名阶段按名次裁决
// 红线: 原始评估结果不可修改,只输出权重乘数与裁决记录
// ==========================================

use crate::config::CostModel;
use crate::domain::conflict::{Conflict, ConflictResolution, ResolutionRule};
use crate::domain::evaluation::EvaluationResult;
use crate::domain::train::TrainSnapshot;
use crate::domain::types::{ConflictKind, ErrorKind, EvaluatorKind, OperationalIntent, TrainStatus};
use crate::engine::evaluator::EvaluationContext;
use crate::engine::readiness::estimate_readiness_minutes;
use std::collections::BTreeMap;

const COST_TIE_EPSILON: f64 = 1e-6;

// ==========================================
// ResolvedTrain - 单车裁决结果 (排名输入)
// ==========================================
#[derive(Debug, Clone)]
pub struct ResolvedTrain {
    pub train_id: String,
    pub status: TrainStatus,
    pub cumulative_km: f64,
    pub readiness_minutes: u32,
    pub results: Vec<EvaluationResult>, // 原样保留
    pub final_eligible: bool,
    pub hard_blocked: bool,
    pub manual_decision_required: bool,
    pub weight_multipliers: BTreeMap<EvaluatorKind, f64>,
    pub resolution_notes: Vec<String>,
    pub conflicts: Vec<Conflict>,
    pub error_kinds: Vec<ErrorKind>,
}

impl ResolvedTrain {
    /// 权重乘数 (未裁决的评估器为 1.0)
    pub fn multiplier(&self, kind: EvaluatorKind) -> f64 {
        self.weight_multipliers.get(&kind).copied().unwrap_or(1.0)
    }

    pub fn result(&self, kind: EvaluatorKind) -> Option<&EvaluationResult> {
        self.results.iter().find(|r| r.evaluator == kind)
    }

    pub fn data_incomplete(&self) -> bool {
        self.results.iter().any(|r| r.data_incomplete)
    }

    pub fn timed_out(&self) -> bool {
        self.results.iter().any(|r| r.timed_out)
    }

    /// 只需保洁 (保洁倾向入库,其他评估器无入库倾向)
    pub fn cleaning_only_due(&self) -> bool {
        let cleaning_due = self
            .result(EvaluatorKind::Cleaning)
            .map(|r| r.intent == OperationalIntent::PreferCleaning)
            .unwrap_or(false);
        let maintenance_due = self
            .results
            .iter()
            .any(|r| r.evaluator != EvaluatorKind::Cleaning && r.intent.pulls_to_depot());
        cleaning_due && !maintenance_due
    }
}

#[derive(Debug, Clone)]
pub struct ConflictResolver {
    cost_model: CostModel,
}

impl ConflictResolver {
    pub fn new(cost_model: CostModel) -> Self {
        Self { cost_model }
    }

    /// 裁决单车冲突
    ///
    /// # 参数
    /// - snapshot: 列车快照 (状态、里程、就绪时间)
    /// - results: 该车评估结果
    /// - conflicts: 检测出的单车冲突
    /// - ctx: 运行上下文 (裁决时间戳、决策窗口)
    pub fn resolve(
        &self,
        snapshot: &TrainSnapshot,
        results: Vec<EvaluationResult>,
        conflicts: Vec<Conflict>,
        ctx: &EvaluationContext,
    ) -> ResolvedTrain {
        let hard_blocked = results.iter().any(|r| r.hard_block);
        let mut resolved = ResolvedTrain {
            train_id: snapshot.train_id.clone(),
            status: snapshot.status,
            cumulative_km: snapshot.cumulative_km(),
            readiness_minutes: estimate_readiness_minutes(snapshot),
            results,
            final_eligible: !hard_blocked,
            hard_blocked,
            manual_decision_required: false,
            weight_multipliers: BTreeMap::new(),
            resolution_notes: Vec::new(),
            conflicts: Vec::with_capacity(conflicts.len()),
            error_kinds: Vec::new(),
        };

        for mut conflict in conflicts {
            match conflict.kind {
                ConflictKind::HardVsHard => {
                    resolved.manual_decision_required = true;
                    resolved.final_eligible = false;
                    if !resolved.error_kinds.contains(&ErrorKind::UnresolvableConflict) {
                        resolved.error_kinds.push(ErrorKind::UnresolvableConflict);
                    }
                    resolved
                        .resolution_notes
                        .push(format!("{}: manual decision required", conflict.conflict_id));
                }
                ConflictKind::HardVsSoft => {
                    if let Some(resolution) = self.hard_block_precedence(&resolved, &conflict, ctx) {
                        resolved.resolution_notes.push(resolution.note.clone());
                        conflict.append_resolution(resolution);
                    }
                }
                ConflictKind::SoftVsSoft => {
                    if let Some(resolution) = self.resolve_soft(&resolved, &conflict, ctx) {
                        if let Some(loser) = resolution.losing_evaluator {
                            let m = resolved.multiplier(loser) * self.cost_model.losing_weight_factor;
                            resolved.weight_multipliers.insert(loser, m);
                        }
                        resolved.resolution_notes.push(resolution.note.clone());
                        conflict.append_resolution(resolution);
                    }
                }
                // 资源冲突由排名阶段裁决
                ConflictKind::Resource => {}
            }
            resolved.conflicts.push(conflict);
        }

        if resolved.manual_decision_required {
            tracing::warn!(
                train_id = %resolved.train_id,
                "hard-vs-hard conflict left for operator"
            );
        }
        resolved
    }

    fn hard_block_precedence(
        &self,
        train: &ResolvedTrain,
        conflict: &Conflict,
        ctx: &EvaluationContext,
    ) -> Option<ConflictResolution> {
        let (block, other) = self.pair(train, conflict, |r| r.hard_block)?;
        Some(
            ConflictResolution::by_engine(
                ResolutionRule::HardBlockPrecedence,
                format!(
                    "{}: {} blocks service; {} overruled",
                    conflict.conflict_id, block.reason_code, other.reason_code
                ),
                ctx.as_of,
            )
            .between(block.evaluator, other.evaluator),
        )
    }

    fn resolve_soft(
        &self,
        train: &ResolvedTrain,
        conflict: &Conflict,
        ctx: &EvaluationContext,
    ) -> Option<ConflictResolution> {
        let (service, depot) = self.pair(train, conflict, |r| r.intent.pulls_to_service())?;

        let per_point = if depot.intent == OperationalIntent::PreferCleaning {
            self.cost_model.cleaning_cost_per_point
        } else {
            self.cost_model.maintenance_cost_per_point
        };
        let deferral_cost = (100.0 - depot.score) * per_point;
        let miss_cost = service.score * self.cost_model.service_miss_cost_per_point;

        let (rule, winner, loser) = if (deferral_cost - miss_cost).abs() > COST_TIE_EPSILON {
            if deferral_cost < miss_cost {
                (ResolutionRule::CostModel, service, depot)
            } else {
                (ResolutionRule::CostModel, depot, service)
            }
        } else {
            let service_due = service.deadline.map(|d| ctx.within_window(d)).unwrap_or(false);
            let depot_due = depot.deadline.map(|d| ctx.within_window(d)).unwrap_or(false);
            match (service_due, depot_due) {
                (true, false) => (ResolutionRule::TemporalDeadline, service, depot),
                (false, true) => (ResolutionRule::TemporalDeadline, depot, service),
                _ => (ResolutionRule::MaintenanceDefault, depot, service),
            }
        };

        Some(
            ConflictResolution::by_engine(
                rule,
                format!(
                    "{}: {} wins by {} (deferral {:.1} vs miss {:.1}); {} weight x{}",
                    conflict.conflict_id,
                    winner.evaluator,
                    rule.to_db_str(),
                    deferral_cost,
                    miss_cost,
                    loser.evaluator,
                    self.cost_model.losing_weight_factor
                ),
                ctx.as_of,
            )
            .between(winner.evaluator, loser.evaluator),
        )
    }

    /// 按判定函数拆出冲突双方 (first 满足, second 不满足)
    fn pair<'a>(
        &self,
        train: &'a ResolvedTrain,
        conflict: &Conflict,
        is_first: impl Fn(&EvaluationResult) -> bool,
    ) -> Option<(&'a EvaluationResult, &'a EvaluationResult)> {
        let involved: Vec<&EvaluationResult> = conflict
            .involved_evaluators
            .iter()
            .filter_map(|k| train.result(*k))
            .collect();
        let first = involved.iter().copied().find(|r| is_first(r))?;
        let second = involved.iter().copied().find(|r| !is_first(r))?;
        Some((first, second))
    }
}

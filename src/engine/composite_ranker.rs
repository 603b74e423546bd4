// ==========================================
// 地铁列车夜间投运决策系统 - 综合排名与分配
// ==========================================
// 依据: 决策引擎设计 - 4.4 Composite Ranking
// 职责: 加权综合分 → 排名 → 按配额分配去向
// 排序键: 综合分降序 → 累计里程升序 → 列车ID升序
// 红线: 不合格列车不得进入 SERVICE/STANDBY
// 红线: NORMAL 模式合格数不足配额直接失败,其他模式尽量填充并标注
// ==========================================

use crate::domain::conflict::{Conflict, ConflictResolution, ResolutionRule};
use crate::domain::plan::{Assignment, Plan, ServiceQuota};
use crate::domain::scenario::ScenarioPatch;
use crate::domain::types::{
    ConflictKind, ErrorKind, InductionAction, PlanMode, PlanStatus, PlanningMode, TrainStatus,
};
use crate::engine::conflict_resolver::ResolvedTrain;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::evaluator::EvaluationContext;
use crate::engine::weights::{readiness_score, WeightTable};
use chrono::Utc;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use uuid::Uuid;

const CLEANING_SLOT_PREFIX: &str = "cleaning_slot:";
const CONFIDENCE_VARIANCE_SCALE: f64 = 10_000.0;
const CONFIDENCE_MAX_PENALTY: f64 = 0.2;

// ==========================================
// ForcedStates - 强制状态 (场景补丁 / 应急退出)
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForcedStates {
    pub unavailable: BTreeSet<String>,
    pub ibl: BTreeSet<String>,
    pub service: BTreeSet<String>,
}

impl ForcedStates {
    pub fn unavailable(train_ids: impl IntoIterator<Item = String>) -> Self {
        Self {
            unavailable: train_ids.into_iter().collect(),
            ..Self::default()
        }
    }
}

impl From<&ScenarioPatch> for ForcedStates {
    fn from(patch: &ScenarioPatch) -> Self {
        Self {
            unavailable: patch.forced_unavailable.clone(),
            ibl: patch.forced_ibl.clone(),
            service: patch.forced_service.clone(),
        }
    }
}

/// 排名请求参数
pub struct RankRequest<'a> {
    pub ctx: &'a EvaluationContext,
    pub plan_mode: PlanMode,
    pub quota: ServiceQuota,
    pub weights: &'a WeightTable,
    pub forced: &'a ForcedStates,
    pub baseline_plan_id: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CompositeRanker;

impl CompositeRanker {
    pub fn new() -> Self {
        Self
    }

    /// 加权综合分
    ///
    /// 评估器分 × 权重 × 裁决乘数,加上就绪项 (权重为 0 时不计)
    pub fn overall_score(train: &ResolvedTrain, weights: &WeightTable) -> f64 {
        let evaluators: f64 = train
            .results
            .iter()
            .map(|r| weights.weight(r.evaluator) * train.multiplier(r.evaluator) * r.score)
            .sum();
        let readiness = weights.readiness() * readiness_score(train.readiness_minutes);
        (evaluators + readiness).clamp(0.0, 100.0)
    }

    /// 推荐置信度 (0..1)
    ///
    /// 综合分/100,减去各评估器分相对综合分的方差罚项 (方差/10000,上限 0.2)
    pub fn confidence(overall: f64, scores: &[f64]) -> f64 {
        let base = overall / 100.0;
        if scores.is_empty() {
            return base.clamp(0.0, 1.0);
        }
        let variance =
            scores.iter().map(|s| (s - overall).powi(2)).sum::<f64>() / scores.len() as f64;
        let penalty = (variance / CONFIDENCE_VARIANCE_SCALE).min(CONFIDENCE_MAX_PENALTY);
        (base - penalty).clamp(0.0, 1.0)
    }

    /// 排名并分配去向
    ///
    /// # 参数
    /// - trains: 裁决后的列车
    /// - resource_conflicts: 跨车资源冲突 (在此按名次裁决)
    /// - req: 配额、权重、强制状态等
    ///
    /// # 返回
    /// - Ok(Plan): 草稿方案
    /// - Err(QuotaInfeasible): NORMAL 规则下合格数不足
    pub fn rank(
        &self,
        trains: Vec<ResolvedTrain>,
        resource_conflicts: Vec<Conflict>,
        req: RankRequest<'_>,
    ) -> EngineResult<Plan> {
        let scored: Vec<(ResolvedTrain, f64)> = trains
            .into_iter()
            .map(|t| {
                let overall = Self::overall_score(&t, req.weights);
                (t, overall)
            })
            .collect();

        let is_candidate = |t: &ResolvedTrain| {
            t.final_eligible
                && t.status != TrainStatus::OutOfService
                && !req.forced.unavailable.contains(&t.train_id)
                && !req.forced.ibl.contains(&t.train_id)
        };

        // 全序: 强制上线(仅合格) → 综合分 → 里程 → ID
        let mut order: Vec<usize> = (0..scored.len()).collect();
        order.sort_by(|&a, &b| {
            let (ta, sa) = &scored[a];
            let (tb, sb) = &scored[b];
            let pa = is_candidate(ta) && req.forced.service.contains(&ta.train_id);
            let pb = is_candidate(tb) && req.forced.service.contains(&tb.train_id);
            pb.cmp(&pa)
                .then_with(|| sb.total_cmp(sa))
                .then_with(|| ta.cumulative_km.partial_cmp(&tb.cumulative_km).unwrap_or(Ordering::Equal))
                .then_with(|| ta.train_id.cmp(&tb.train_id))
        });

        let candidates: Vec<usize> = order
            .iter()
            .copied()
            .filter(|&i| is_candidate(&scored[i].0))
            .collect();

        let required = req.quota.service_target;
        let mut plan_error = None;
        if candidates.len() < required {
            if req.ctx.mode == PlanningMode::Normal {
                tracing::error!(
                    required,
                    eligible = candidates.len(),
                    "quota infeasible under NORMAL rules"
                );
                return Err(EngineError::QuotaInfeasible {
                    required,
                    eligible: candidates.len(),
                });
            }
            tracing::warn!(
                required,
                eligible = candidates.len(),
                mode = %req.ctx.mode,
                "quota infeasible; filling as far as possible"
            );
            plan_error = Some(ErrorKind::QuotaInfeasible);
        }

        // 初步去向
        let mut actions: Vec<(InductionAction, Option<u32>)> = vec![(InductionAction::IblMaintenance, None); scored.len()];
        let mut notes: Vec<Vec<String>> = vec![Vec::new(); scored.len()];

        for (pos, &i) in candidates.iter().enumerate() {
            let train = &scored[i].0;
            actions[i] = if pos < required {
                (InductionAction::Service, Some(pos as u32 + 1))
            } else if pos < required + req.quota.standby_target {
                (InductionAction::Standby, None)
            } else if train.cleaning_only_due() {
                (InductionAction::IblCleaning, None)
            } else {
                (InductionAction::IblMaintenance, None)
            };
            if req.forced.service.contains(&train.train_id) {
                notes[i].push("forced to the top of the ranking".to_string());
            }
        }

        for (i, (train, _)) in scored.iter().enumerate() {
            if is_candidate(train) {
                continue;
            }
            let id = &train.train_id;
            if req.forced.unavailable.contains(id) {
                actions[i] = (InductionAction::OutOfService, None);
                notes[i].push("forced unavailable".to_string());
            } else if train.status == TrainStatus::OutOfService {
                actions[i] = (InductionAction::OutOfService, None);
            } else if req.forced.ibl.contains(id) {
                notes[i].push("forced to IBL".to_string());
            } else {
                let blocks: Vec<&str> = train
                    .results
                    .iter()
                    .filter(|r| r.hard_block)
                    .map(|r| r.reason_code.as_str())
                    .collect();
                notes[i].push(format!("ineligible: {}", blocks.join(", ")));
            }
            if req.forced.service.contains(id) {
                notes[i].push("forced service ignored: train is not eligible".to_string());
            }
        }

        // 资源冲突: 按名次授予
        let mut resource_conflicts = resource_conflicts;
        for conflict in resource_conflicts.iter_mut().filter(|c| c.kind == ConflictKind::Resource) {
            let resource = conflict.resource_id.clone().unwrap_or_default();
            let is_cleaning_slot = resource.starts_with(CLEANING_SLOT_PREFIX);
            let user_action = if is_cleaning_slot {
                InductionAction::IblCleaning
            } else {
                InductionAction::IblMaintenance
            };

            let claimants: Vec<usize> = order
                .iter()
                .copied()
                .filter(|&i| conflict.involves(&scored[i].0.train_id))
                .collect();
            let users: Vec<usize> = claimants
                .iter()
                .copied()
                .filter(|&i| actions[i].0 == user_action)
                .collect();
            let winner = match users.first().or_else(|| claimants.first()) {
                Some(&w) => w,
                None => continue,
            };
            let winner_id = scored[winner].0.train_id.clone();

            for &loser in users.iter().filter(|&&i| i != winner) {
                if is_cleaning_slot {
                    actions[loser] = (InductionAction::IblMaintenance, None);
                    notes[loser].push(format!(
                        "{} granted to {}; falls back to IBL_MAINTENANCE",
                        resource, winner_id
                    ));
                } else {
                    notes[loser].push(format!(
                        "{} granted to {}; queued for the next free bay",
                        resource, winner_id
                    ));
                }
            }

            conflict.append_resolution(
                ConflictResolution::by_engine(
                    ResolutionRule::RankOrder,
                    format!("{} granted to {} by rank", resource, winner_id),
                    req.ctx.as_of,
                )
                .granted_to(&winner_id),
            );
        }

        // 组装方案
        let mut conflicts: Vec<Conflict> = resource_conflicts;
        let mut assignments = Vec::with_capacity(scored.len());
        let mut any_manual = false;
        let mut any_timeout = false;

        for (i, (train, overall)) in scored.into_iter().enumerate() {
            let (action, service_rank) = actions[i];
            let mut error_kinds = train.error_kinds.clone();
            let mut warnings = Vec::new();
            for r in train.results.iter().filter(|r| r.data_incomplete) {
                warnings.push(format!("DATA_INCOMPLETE:{}", r.evaluator));
            }
            if !warnings.is_empty() && !error_kinds.contains(&ErrorKind::DataIncomplete) {
                error_kinds.push(ErrorKind::DataIncomplete);
            }
            let timed_out = train.timed_out();
            if timed_out {
                for r in train.results.iter().filter(|r| r.timed_out) {
                    warnings.push(format!("EVALUATOR_TIMEOUT:{}", r.evaluator));
                }
                if !error_kinds.contains(&ErrorKind::EvaluatorTimeout) {
                    error_kinds.push(ErrorKind::EvaluatorTimeout);
                }
            }
            any_manual |= train.manual_decision_required;
            any_timeout |= timed_out;

            let resolved_conflicts: Vec<String> = train
                .conflicts
                .iter()
                .chain(conflicts.iter())
                .filter(|c| c.involves(&train.train_id) && c.is_resolved())
                .map(|c| c.conflict_id.clone())
                .collect();

            let mut resolution_notes = train.resolution_notes.clone();
            resolution_notes.append(&mut notes[i]);

            let scores: Vec<f64> = train.results.iter().map(|r| r.score).collect();
            assignments.push(Assignment {
                train_id: train.train_id.clone(),
                action,
                overall_score: overall,
                confidence: Self::confidence(overall, &scores),
                service_rank,
                evaluator_scores: train.results.iter().map(|r| (r.evaluator, r.score)).collect(),
                hard_blocked: train.hard_blocked,
                final_eligible: train.final_eligible,
                readiness_minutes: train.readiness_minutes,
                resolved_conflicts,
                warnings,
                incomplete: timed_out,
                error_kinds,
                manual_decision_required: train.manual_decision_required,
                resolution_notes,
                version: 1,
                override_info: None,
            });
            conflicts.extend(train.conflicts);
        }

        assignments.sort_by(|a, b| a.train_id.cmp(&b.train_id));
        conflicts.sort_by(|a, b| a.conflict_id.cmp(&b.conflict_id));

        let error_kind = plan_error.or(if any_manual {
            Some(ErrorKind::UnresolvableConflict)
        } else if any_timeout {
            Some(ErrorKind::EvaluatorTimeout)
        } else {
            None
        });

        Ok(Plan {
            plan_id: Uuid::new_v4().to_string(),
            decision_date: req.ctx.decision_date,
            mode: req.plan_mode,
            rule_mode: req.ctx.mode,
            assignments,
            as_of: req.ctx.as_of,
            generated_at: Utc::now(),
            status: PlanStatus::Draft,
            incomplete: any_timeout,
            conflicts,
            error_kind,
            service_quota: req.quota,
            baseline_plan_id: req.baseline_plan_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::domain::evaluation::{EvaluationResult, ResourceClaim};
    use crate::domain::types::{ConflictSeverity, EvaluatorKind, OperationalIntent};
    use std::collections::BTreeMap;

    fn ctx(mode: PlanningMode) -> EvaluationContext {
        let now = Utc::now();
        EvaluationContext::new(mode, now.date_naive(), now, &PlanningConfig::default(), None)
    }

    fn train(id: &str, score: f64, km: f64) -> ResolvedTrain {
        ResolvedTrain {
            train_id: id.to_string(),
            status: TrainStatus::DepotReady,
            cumulative_km: km,
            readiness_minutes: 20,
            results: EvaluatorKind::ALL
                .iter()
                .map(|k| EvaluationResult::scored(id, *k, score, "TEST", ""))
                .collect(),
            final_eligible: true,
            hard_blocked: false,
            manual_decision_required: false,
            weight_multipliers: BTreeMap::new(),
            resolution_notes: Vec::new(),
            conflicts: Vec::new(),
            error_kinds: Vec::new(),
        }
    }

    fn blocked(id: &str) -> ResolvedTrain {
        let mut t = train(id, 80.0, 1000.0);
        t.results[0] = EvaluationResult::blocked(id, EvaluatorKind::Fitness, "FITNESS_EXPIRED", "");
        t.final_eligible = false;
        t.hard_blocked = true;
        t
    }

    fn rank(
        trains: Vec<ResolvedTrain>,
        mode: PlanningMode,
        quota: ServiceQuota,
        forced: &ForcedStates,
    ) -> EngineResult<Plan> {
        let c = ctx(mode);
        let weights = WeightTable::for_mode(mode);
        CompositeRanker::new().rank(
            trains,
            Vec::new(),
            RankRequest {
                ctx: &c,
                plan_mode: mode.into(),
                quota,
                weights: &weights,
                forced,
                baseline_plan_id: None,
            },
        )
    }

    #[test]
    fn test_overall_score_uses_weights_and_multipliers() {
        let mut t = train("T01", 80.0, 0.0);
        let weights = WeightTable::for_mode(PlanningMode::Normal);
        assert!((CompositeRanker::overall_score(&t, &weights) - 80.0).abs() < 1e-9);

        t.weight_multipliers.insert(EvaluatorKind::Branding, 0.5);
        // branding .15 × 0.5 × 80 = 6 少计
        assert!((CompositeRanker::overall_score(&t, &weights) - 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_emergency_readiness_bonus() {
        let mut t = train("T01", 80.0, 0.0);
        t.readiness_minutes = 12;
        let weights = WeightTable::for_mode(PlanningMode::Emergency);
        // 0.73 × 80 + 27
        assert!((CompositeRanker::overall_score(&t, &weights) - (0.73 * 80.0 + 27.0)).abs() < 1e-9);
    }

    #[test]
    fn test_confidence_penalizes_score_spread() {
        // 分数一致: 无罚项
        assert!((CompositeRanker::confidence(80.0, &[80.0; 6]) - 0.8).abs() < 1e-9);
        // 方差 400 → 罚 0.04
        let spread = [60.0, 100.0, 60.0, 100.0, 60.0, 100.0];
        assert!((CompositeRanker::confidence(80.0, &spread) - 0.76).abs() < 1e-9);
        // 罚项上限 0.2
        let wild = [0.0, 100.0, 0.0, 100.0, 0.0, 100.0];
        assert!((CompositeRanker::confidence(50.0, &wild) - 0.3).abs() < 1e-9);
        assert_eq!(CompositeRanker::confidence(10.0, &wild), 0.0);

        let plan = rank(vec![train("T01", 90.0, 0.0)], PlanningMode::Normal, ServiceQuota::new(1, 0), &ForcedStates::default()).unwrap();
        assert!((plan.assignment("T01").unwrap().confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_quota_allocation_and_tie_breaks() {
        let trains = vec![
            train("T03", 90.0, 5000.0),
            train("T01", 90.0, 5000.0),
            train("T02", 90.0, 4000.0),
            train("T04", 60.0, 1000.0),
            blocked("T05"),
        ];
        let plan = rank(trains, PlanningMode::Normal, ServiceQuota::new(2, 1), &ForcedStates::default()).unwrap();

        // 同分: 里程低者优先,再按ID
        assert_eq!(plan.service_train_ids(), vec!["T02".to_string(), "T01".to_string()]);
        assert_eq!(plan.assignment("T03").unwrap().action, InductionAction::Standby);
        assert_eq!(plan.assignment("T04").unwrap().action, InductionAction::IblMaintenance);
        let t05 = plan.assignment("T05").unwrap();
        assert_eq!(t05.action, InductionAction::IblMaintenance);
        assert!(t05.hard_blocked);
        assert_eq!(plan.counts().service, 2);
    }

    #[test]
    fn test_normal_quota_infeasible_fails() {
        let trains = vec![train("T01", 90.0, 0.0), blocked("T02")];
        let err = rank(trains, PlanningMode::Normal, ServiceQuota::new(2, 0), &ForcedStates::default()).unwrap_err();
        assert!(matches!(err, EngineError::QuotaInfeasible { required: 2, eligible: 1 }));
    }

    #[test]
    fn test_relaxed_quota_infeasible_fills() {
        let trains = vec![train("T01", 90.0, 0.0), blocked("T02")];
        let plan = rank(trains, PlanningMode::Crisis, ServiceQuota::new(2, 0), &ForcedStates::default()).unwrap();
        assert_eq!(plan.error_kind, Some(ErrorKind::QuotaInfeasible));
        assert_eq!(plan.counts().service, 1);
        assert_eq!(plan.assignment("T02").unwrap().action, InductionAction::IblMaintenance);
    }

    #[test]
    fn test_forced_states() {
        let trains = vec![
            train("T01", 90.0, 0.0),
            train("T02", 80.0, 0.0),
            train("T03", 40.0, 0.0),
            blocked("T04"),
        ];
        let forced = ForcedStates {
            unavailable: ["T01".to_string()].into_iter().collect(),
            ibl: BTreeSet::new(),
            service: ["T03".to_string(), "T04".to_string()].into_iter().collect(),
        };
        let plan = rank(trains, PlanningMode::Normal, ServiceQuota::new(2, 0), &forced).unwrap();

        assert_eq!(plan.assignment("T01").unwrap().action, InductionAction::OutOfService);
        assert_eq!(plan.service_train_ids(), vec!["T03".to_string(), "T02".to_string()]);
        // 硬阻断列车即使强制上线也不进入 SERVICE
        assert_eq!(plan.assignment("T04").unwrap().action, InductionAction::IblMaintenance);
    }

    #[test]
    fn test_cleaning_slot_granted_by_rank() {
        let mut trains = Vec::new();
        for (id, score) in [("T01", 95.0), ("T02", 70.0), ("T03", 60.0)] {
            let mut t = train(id, score, 0.0);
            t.results[4] = EvaluationResult::scored(id, EvaluatorKind::Cleaning, 30.0, "CLEANING_OVERDUE", "")
                .with_intent(OperationalIntent::PreferCleaning)
                .with_claim(if id == "T01" { None } else { Some(ResourceClaim::cleaning_slot("CS-1")) });
            trains.push(t);
        }
        let conflict = Conflict::new(
            ConflictKind::Resource,
            ConflictSeverity::Medium,
            vec!["T02".to_string(), "T03".to_string()],
            vec![EvaluatorKind::Cleaning],
            Some("cleaning_slot:CS-1".to_string()),
            "",
        );

        let c = ctx(PlanningMode::Normal);
        let weights = WeightTable::for_mode(PlanningMode::Normal);
        let plan = CompositeRanker::new()
            .rank(
                trains,
                vec![conflict],
                RankRequest {
                    ctx: &c,
                    plan_mode: PlanMode::Normal,
                    quota: ServiceQuota::new(1, 0),
                    weights: &weights,
                    forced: &ForcedStates::default(),
                    baseline_plan_id: None,
                },
            )
            .unwrap();

        assert_eq!(plan.assignment("T02").unwrap().action, InductionAction::IblCleaning);
        assert_eq!(plan.assignment("T03").unwrap().action, InductionAction::IblMaintenance);
        let resolved = &plan.conflicts[0].resolutions[0];
        assert_eq!(resolved.rule, ResolutionRule::RankOrder);
        assert_eq!(resolved.winning_train_id.as_deref(), Some("T02"));
        assert!(plan.assignment("T03").unwrap().resolved_conflicts.contains(&plan.conflicts[0].conflict_id));
    }
}

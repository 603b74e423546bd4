// ==========================================
// 地铁列车夜间投运决策系统 - 保洁评估器
// ==========================================
// 规则:
// - 已完成且 <= 1 天 → 100; 已完成且 <= 2 天 → 90; 已排期 → 90
// - 已完成且 <= 7 天 → week_score; <= 14 天 → fortnight_score
// - 逾期 → overdue_score; 其余 → 20
// - 应急: 2 天内保洁保底 recent_floor
// - VIP 检查或分数低于保洁线 → 倾向保洁; 已订保洁位 → 资源声明
// ==========================================

use crate::domain::evaluation::{EvaluationResult, ResourceClaim};
use crate::domain::train::{CleaningStatus, FactGroup, TrainSnapshot};
use crate::domain::types::{EvaluatorKind, OperationalIntent};
use crate::engine::evaluator::{EvaluationContext, Evaluator};

#[derive(Debug, Clone, Default)]
pub struct CleaningEvaluator;

impl CleaningEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for CleaningEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Cleaning
    }

    fn evaluate(&self, snapshot: &TrainSnapshot, ctx: &EvaluationContext) -> EvaluationResult {
        let train_id = snapshot.train_id.as_str();
        let facts = match snapshot.cleaning_facts() {
            Some(c) => c,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Cleaning),
        };
        let t = &ctx.thresholds.cleaning;

        let days_since = facts
            .last_cleaned_at
            .map(|at| -ctx.days_until(at))
            .unwrap_or(f64::MAX);
        let completed = facts.status == CleaningStatus::Completed;

        let (mut score, code) = if completed && days_since <= 1.0 {
            (100.0, "CLEANING_FRESH")
        } else if completed && days_since <= 2.0 {
            (90.0, "CLEANING_RECENT")
        } else if facts.status == CleaningStatus::Scheduled {
            (90.0, "CLEANING_SCHEDULED")
        } else if completed && days_since <= 7.0 {
            (t.week_score, "CLEANING_WITHIN_WEEK")
        } else if completed && days_since <= 14.0 {
            (t.fortnight_score, "CLEANING_WITHIN_FORTNIGHT")
        } else if facts.status == CleaningStatus::Overdue {
            (t.overdue_score, "CLEANING_OVERDUE")
        } else {
            (20.0, "CLEANING_STALE")
        };

        if let Some(floor) = t.recent_floor {
            if days_since <= 2.0 {
                score = score.max(floor);
            }
        }

        let intent = if facts.vip_inspection || score < ctx.cleaning_due_score {
            OperationalIntent::PreferCleaning
        } else {
            OperationalIntent::Neutral
        };

        let detail = if days_since == f64::MAX {
            format!("status {:?}, never cleaned on record", facts.status)
        } else {
            format!("status {:?}, last cleaned {:.1}d ago", facts.status, days_since)
        };

        EvaluationResult::scored(train_id, self.kind(), score, code, detail)
            .with_intent(intent)
            .with_claim(facts.booked_slot_id.as_ref().map(ResourceClaim::cleaning_slot))
    }
}

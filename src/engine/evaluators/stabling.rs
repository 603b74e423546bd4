// ==========================================
// 地铁列车夜间投运决策系统 - 停放/调车评估器
// ==========================================
// 规则 (调车时间,分钟):
// - NORMAL: 阻挡其他列车 → 30; <=5 → 100; <=10 → 90; <=15 → 75; <=20 → 60; <=30 → 40; 其余 → 30
// - EMERGENCY/CRISIS: <=20 → 50; <=30 → 40; 其余 → 30
// - 调车时间未知 → 中性分 + data_incomplete
// ==========================================

use crate::domain::evaluation::EvaluationResult;
use crate::domain::train::{FactGroup, TrainSnapshot};
use crate::domain::types::EvaluatorKind;
use crate::engine::evaluator::{EvaluationContext, Evaluator, StablingThresholds};

#[derive(Debug, Clone, Default)]
pub struct StablingEvaluator;

impl StablingEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn score_for(minutes: u32, blocking: bool, t: &StablingThresholds) -> f64 {
        if t.relaxed {
            return match minutes {
                0..=20 => 50.0,
                21..=30 => 40.0,
                _ => 30.0,
            };
        }
        if blocking {
            return t.blocking_score;
        }
        match minutes {
            0..=5 => 100.0,
            6..=10 => 90.0,
            11..=15 => 75.0,
            16..=20 => 60.0,
            21..=30 => 40.0,
            _ => 30.0,
        }
    }
}

impl Evaluator for StablingEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Stabling
    }

    fn evaluate(&self, snapshot: &TrainSnapshot, ctx: &EvaluationContext) -> EvaluationResult {
        let train_id = snapshot.train_id.as_str();
        let facts = match snapshot.stabling_facts() {
            Some(s) => s,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Stabling),
        };
        let minutes = match facts.shunting_time_min {
            Some(m) => m,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Stabling),
        };

        let t = &ctx.thresholds.stabling;
        let score = Self::score_for(minutes, facts.blocking_other_trains, t);
        let code = if facts.blocking_other_trains && !t.relaxed {
            "STABLING_BLOCKING"
        } else if score >= 90.0 {
            "STABLING_OPTIMAL"
        } else if score >= 60.0 {
            "STABLING_ACCEPTABLE"
        } else {
            "STABLING_LONG_SHUNT"
        };

        EvaluationResult::scored(
            train_id,
            self.kind(),
            score,
            code,
            format!("bay {} pos {}, {} min shunting", facts.bay, facts.position, minutes),
        )
    }
}

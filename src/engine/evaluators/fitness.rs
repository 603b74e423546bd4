// ==========================================
// 地铁列车夜间投运决策系统 - 适用证书评估器
// ==========================================
// 规则 (最差部门决定结果):
// - 剩余有效期 < block_below_hours → 硬阻断 (已过期 FITNESS_EXPIRED)
// - 剩余有效期 >= full_score_hours → 100
// - 其间从 floor_score 线性升至 100
// - 证书组存在但缺少必需部门 → 硬阻断
// ==========================================

use crate::domain::evaluation::EvaluationResult;
use crate::domain::train::{FactGroup, TrainSnapshot};
use crate::domain::types::{EvaluatorKind, OperationalIntent};
use crate::engine::evaluator::{EvaluationContext, Evaluator, FitnessThresholds};

/// 必须持有证书的部门
pub const REQUIRED_DEPARTMENTS: [&str; 3] = ["rolling_stock", "signalling", "telecom"];

/// 低于此分数时倾向安排证书复检
const RENEWAL_PULL_SCORE: f64 = 60.0;

#[derive(Debug, Clone, Default)]
pub struct FitnessEvaluator;

impl FitnessEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// 剩余小时数 → 分数 (不含阻断判断)
    pub fn score_for_remaining(hours: f64, t: &FitnessThresholds) -> f64 {
        if hours >= t.full_score_hours {
            return 100.0;
        }
        let span = t.full_score_hours - t.block_below_hours;
        if span <= 0.0 {
            return 100.0;
        }
        let fraction = ((hours - t.block_below_hours) / span).clamp(0.0, 1.0);
        t.floor_score + fraction * (100.0 - t.floor_score)
    }
}

impl Evaluator for FitnessEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Fitness
    }

    fn evaluate(&self, snapshot: &TrainSnapshot, ctx: &EvaluationContext) -> EvaluationResult {
        let train_id = snapshot.train_id.as_str();
        let facts = match snapshot.fitness_facts() {
            Some(f) => f,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Fitness),
        };
        let t = &ctx.thresholds.fitness;

        // 最差部门
        let mut worst: Option<(&str, f64, chrono::DateTime<chrono::Utc>)> = None;
        for dept in REQUIRED_DEPARTMENTS {
            let cert = match facts.certificate_for(dept) {
                Some(c) => c,
                None => {
                    return EvaluationResult::blocked(
                        train_id,
                        self.kind(),
                        "FITNESS_CERTIFICATE_MISSING",
                        format!("no {} certificate on record", dept),
                    );
                }
            };
            let hours = ctx.hours_until(cert.expires_at);
            if worst.map_or(true, |(_, h, _)| hours < h) {
                worst = Some((dept, hours, cert.expires_at));
            }
        }

        let (dept, hours, expires_at) = match worst {
            Some(w) => w,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Fitness),
        };

        if hours <= 0.0 {
            return EvaluationResult::blocked(
                train_id,
                self.kind(),
                "FITNESS_EXPIRED",
                format!("{} certificate expired {:.1}h ago", dept, -hours),
            )
            .with_deadline(Some(expires_at));
        }
        if hours < t.block_below_hours {
            return EvaluationResult::blocked(
                train_id,
                self.kind(),
                "FITNESS_BELOW_MIN_VALIDITY",
                format!(
                    "{} certificate valid {:.2}h, minimum {:.0}h",
                    dept, hours, t.block_below_hours
                ),
            )
            .with_deadline(Some(expires_at));
        }

        let score = Self::score_for_remaining(hours, t);
        let (code, intent) = if score >= 100.0 {
            ("FITNESS_VALID", OperationalIntent::Neutral)
        } else if score < RENEWAL_PULL_SCORE {
            ("FITNESS_NEAR_EXPIRY", OperationalIntent::PreferMaintenance)
        } else {
            ("FITNESS_NEAR_EXPIRY", OperationalIntent::Neutral)
        };

        EvaluationResult::scored(
            train_id,
            self.kind(),
            score,
            code,
            format!("worst department {} valid {:.1}h", dept, hours),
        )
        .with_intent(intent)
        .with_deadline(Some(expires_at))
    }
}

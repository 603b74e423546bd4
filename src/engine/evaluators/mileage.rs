// ==========================================
// 地铁列车夜间投运决策系统 - 里程均衡评估器
// ==========================================
// 规则 (偏离车队均值的百分比):
// - |偏差| <= 5 → 100; <= 10 → 90 低于 / 85 高于; <= 20 → 70 / 50
// - <= 30 → 50 / 30; > 30 → 100 低于 / 0 高于
// - 应急/危机: 统一 flat_score (不做均衡)
// - 距检修里程 <= 0 → 硬阻断; < 日均里程 → 封顶 capped_score,倾向检修
// ==========================================

use crate::domain::evaluation::{EvaluationResult, NEUTRAL_SCORE};
use crate::domain::train::{FactGroup, TrainSnapshot};
use crate::domain::types::{EvaluatorKind, OperationalIntent};
use crate::engine::evaluator::{EvaluationContext, Evaluator};

#[derive(Debug, Clone, Default)]
pub struct MileageEvaluator;

impl MileageEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// 偏差百分比 → 分数 (正数表示高于均值)
    pub fn score_for_deviation(deviation_pct: f64) -> f64 {
        let above = deviation_pct > 0.0;
        let d = deviation_pct.abs();
        match (d, above) {
            (d, _) if d <= 5.0 => 100.0,
            (d, false) if d <= 10.0 => 90.0,
            (d, true) if d <= 10.0 => 85.0,
            (d, false) if d <= 20.0 => 70.0,
            (d, true) if d <= 20.0 => 50.0,
            (d, false) if d <= 30.0 => 50.0,
            (d, true) if d <= 30.0 => 30.0,
            (_, false) => 100.0,
            (_, true) => 0.0,
        }
    }
}

impl Evaluator for MileageEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Mileage
    }

    fn evaluate(&self, snapshot: &TrainSnapshot, ctx: &EvaluationContext) -> EvaluationResult {
        let train_id = snapshot.train_id.as_str();
        let facts = match snapshot.mileage_facts() {
            Some(m) => m,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Mileage),
        };
        let t = &ctx.thresholds.mileage;

        if facts.km_to_next_maintenance <= 0.0 {
            return EvaluationResult::blocked(
                train_id,
                self.kind(),
                "MILEAGE_THRESHOLD_EXCEEDED",
                format!(
                    "maintenance threshold passed by {:.0} km",
                    -facts.km_to_next_maintenance
                ),
            );
        }

        let (mut score, mut code, detail) = match (t.flat_score, ctx.fleet_avg_km) {
            (Some(flat), _) => (flat, "MILEAGE_RELAXED", "mileage balancing suspended".to_string()),
            (None, Some(avg)) if avg > 0.0 => {
                let deviation = (facts.cumulative_km - avg) / avg * 100.0;
                (
                    Self::score_for_deviation(deviation),
                    "MILEAGE_BALANCE",
                    format!("{:.0} km, {:+.1}% vs fleet average", facts.cumulative_km, deviation),
                )
            }
            _ => (NEUTRAL_SCORE, "MILEAGE_NO_FLEET_AVERAGE", "fleet average unavailable".to_string()),
        };

        let mut intent = OperationalIntent::Neutral;
        if facts.km_to_next_maintenance < ctx.daily_km {
            score = score.min(t.capped_score);
            code = "MILEAGE_MAINTENANCE_DUE";
            intent = OperationalIntent::PreferMaintenance;
        }

        EvaluationResult::scored(
            train_id,
            self.kind(),
            score,
            code,
            format!("{}; {:.0} km to next maintenance", detail, facts.km_to_next_maintenance),
        )
        .with_intent(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::domain::train::MileageFacts;
    use crate::domain::types::{PlanningMode, TrainStatus};
    use chrono::Utc;

    fn ctx(mode: PlanningMode, avg: Option<f64>) -> EvaluationContext {
        let now = Utc::now();
        EvaluationContext::new(mode, now.date_naive(), now, &PlanningConfig::default(), avg)
    }

    fn train(km: f64, to_next: f64) -> TrainSnapshot {
        let mut t = TrainSnapshot::new("T04", TrainStatus::DepotReady);
        t.mileage = Some(MileageFacts {
            cumulative_km: km,
            km_to_next_maintenance: to_next,
        });
        t
    }

    #[test]
    fn test_deviation_table() {
        assert_eq!(MileageEvaluator::score_for_deviation(3.0), 100.0);
        assert_eq!(MileageEvaluator::score_for_deviation(-8.0), 90.0);
        assert_eq!(MileageEvaluator::score_for_deviation(8.0), 85.0);
        assert_eq!(MileageEvaluator::score_for_deviation(-15.0), 70.0);
        assert_eq!(MileageEvaluator::score_for_deviation(15.0), 50.0);
        assert_eq!(MileageEvaluator::score_for_deviation(-25.0), 50.0);
        assert_eq!(MileageEvaluator::score_for_deviation(25.0), 30.0);
        assert_eq!(MileageEvaluator::score_for_deviation(-40.0), 100.0);
        assert_eq!(MileageEvaluator::score_for_deviation(40.0), 0.0);
    }

    #[test]
    fn test_emergency_is_flat() {
        let r = MileageEvaluator::new().evaluate(&train(150_000.0, 5_000.0), &ctx(PlanningMode::Emergency, Some(100_000.0)));
        assert_eq!(r.score, 50.0);
    }

    #[test]
    fn test_threshold_exceeded_blocks() {
        let r = MileageEvaluator::new().evaluate(&train(100_000.0, 0.0), &ctx(PlanningMode::Normal, Some(100_000.0)));
        assert!(r.hard_block);
    }

    #[test]
    fn test_near_threshold_caps_score() {
        let r = MileageEvaluator::new().evaluate(&train(100_000.0, 150.0), &ctx(PlanningMode::Normal, Some(100_000.0)));
        assert_eq!(r.score, 20.0);
        assert_eq!(r.intent, OperationalIntent::PreferMaintenance);
        assert_eq!(r.reason_code, "MILEAGE_MAINTENANCE_DUE");
    }
}

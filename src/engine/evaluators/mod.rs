// ==========================================
// 地铁列车夜间投运决策系统 - 六个评估器
// ==========================================
// 职责: 每个评估器只负责一个业务域的阈值表
// 红线: 缺失/过期数据 → 中性分 50 + data_incomplete,绝不硬阻断
// ==========================================

pub mod branding;
pub mod cleaning;
pub mod fitness;
pub mod job_card;
pub mod mileage;
pub mod stabling;

pub use branding::BrandingEvaluator;
pub use cleaning::CleaningEvaluator;
pub use fitness::FitnessEvaluator;
pub use job_card::JobCardEvaluator;
pub use mileage::MileageEvaluator;
pub use stabling::StablingEvaluator;

use crate::engine::evaluator::Evaluator;
use std::sync::Arc;

/// 标准评估器组 (顺序与 EvaluatorKind::ALL 一致)
pub fn standard_evaluators() -> Vec<Arc<dyn Evaluator>> {
    vec![
        Arc::new(FitnessEvaluator::new()),
        Arc::new(JobCardEvaluator::new()),
        Arc::new(BrandingEvaluator::new()),
        Arc::new(MileageEvaluator::new()),
        Arc::new(CleaningEvaluator::new()),
        Arc::new(StablingEvaluator::new()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::domain::train::TrainSnapshot;
    use crate::domain::types::{EvaluatorKind, PlanningMode, TrainStatus};
    use crate::engine::evaluator::EvaluationContext;
    use chrono::Utc;

    #[test]
    fn test_standard_order_matches_kinds() {
        let kinds: Vec<EvaluatorKind> = standard_evaluators().iter().map(|e| e.kind()).collect();
        assert_eq!(kinds, EvaluatorKind::ALL.to_vec());
    }

    #[test]
    fn test_empty_snapshot_degrades_everywhere() {
        let now = Utc::now();
        for mode in [PlanningMode::Normal, PlanningMode::Emergency] {
            let ctx = EvaluationContext::new(mode, now.date_naive(), now, &PlanningConfig::default(), None);
            let snapshot = TrainSnapshot::new("T09", TrainStatus::Standby);
            for evaluator in standard_evaluators() {
                let r = evaluator.evaluate(&snapshot, &ctx);
                assert!(!r.hard_block, "{} blocked on missing data", r.evaluator);
                assert!(r.data_incomplete);
                assert_eq!(r.score, 50.0);
            }
        }
    }
}

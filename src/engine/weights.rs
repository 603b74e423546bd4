// ==========================================
// 地铁列车夜间投运决策系统 - 权重表
// ==========================================
// NORMAL:           fitness .25 job_card .20 branding .15 mileage .15 cleaning .10 stabling .15
// EMERGENCY/CRISIS: fitness .30 job_card .25 branding .05 mileage .05 cleaning .03 stabling .05
//                   + readiness .27
// 红线: 每种模式 评估器权重 + 就绪权重 = 1.0 (±1e-6)
// ==========================================

use crate::domain::scenario::WeightOverrides;
use crate::domain::types::{EvaluatorKind, PlanningMode};
use std::collections::BTreeMap;

/// 权重和校验容差
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct WeightTable {
    evaluators: BTreeMap<EvaluatorKind, f64>,
    readiness: f64,
}

impl WeightTable {
    pub fn for_mode(mode: PlanningMode) -> Self {
        let (w, readiness) = match mode {
            PlanningMode::Normal => ([0.25, 0.20, 0.15, 0.15, 0.10, 0.15], 0.0),
            PlanningMode::Emergency | PlanningMode::Crisis => {
                ([0.30, 0.25, 0.05, 0.05, 0.03, 0.05], 0.27)
            }
        };
        Self {
            evaluators: EvaluatorKind::ALL.iter().copied().zip(w).collect(),
            readiness,
        }
    }

    pub fn weight(&self, kind: EvaluatorKind) -> f64 {
        self.evaluators.get(&kind).copied().unwrap_or(0.0)
    }

    pub fn readiness(&self) -> f64 {
        self.readiness
    }

    /// 评估器权重之和 (不含就绪项)
    pub fn evaluator_sum(&self) -> f64 {
        self.evaluators.values().sum()
    }

    /// 全部权重之和
    pub fn sum(&self) -> f64 {
        self.evaluator_sum() + self.readiness
    }

    pub fn is_normalized(&self) -> bool {
        (self.sum() - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
    }

    /// 应用覆写并重新归一化
    ///
    /// 覆写后总和为 0 时保留原表
    pub fn with_overrides(&self, overrides: &WeightOverrides) -> Self {
        let mut next = self.clone();
        for (kind, w) in &overrides.evaluators {
            next.evaluators.insert(*kind, w.max(0.0));
        }
        if let Some(r) = overrides.readiness {
            next.readiness = r.max(0.0);
        }

        let total = next.sum();
        if total <= 0.0 {
            tracing::warn!("权重覆写总和为 0,保留原权重表");
            return self.clone();
        }
        for w in next.evaluators.values_mut() {
            *w /= total;
        }
        next.readiness /= total;
        next
    }
}

// ==========================================
// 就绪加分 (按预计出车时间分档)
// ==========================================

/// ≤15 min → 27; 16–20 → 20; 21–25 → 10; 其余 → 0
pub fn readiness_bonus_points(minutes: u32) -> u32 {
    match minutes {
        0..=15 => 27,
        16..=20 => 20,
        21..=25 => 10,
        _ => 0,
    }
}

/// 就绪项得分 (0–100,乘以就绪权重后计入综合分)
pub fn readiness_score(minutes: u32) -> f64 {
    readiness_bonus_points(minutes) as f64 / 27.0 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_sum_invariant_for_every_mode() {
        for mode in [PlanningMode::Normal, PlanningMode::Emergency, PlanningMode::Crisis] {
            let table = WeightTable::for_mode(mode);
            assert!(table.is_normalized(), "{} sums to {}", mode, table.sum());
        }
        assert!((WeightTable::for_mode(PlanningMode::Normal).evaluator_sum() - 1.0).abs() < WEIGHT_SUM_TOLERANCE);
        assert!((WeightTable::for_mode(PlanningMode::Emergency).readiness() - 0.27).abs() < WEIGHT_SUM_TOLERANCE);
    }

    #[test]
    fn test_overrides_are_renormalized() {
        let mut overrides = WeightOverrides::default();
        overrides.evaluators.insert(EvaluatorKind::Branding, 0.65);
        let table = WeightTable::for_mode(PlanningMode::Normal).with_overrides(&overrides);

        assert!(table.is_normalized());
        assert!((table.weight(EvaluatorKind::Branding) - 0.65 / 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_zero_overrides_keep_table() {
        let mut overrides = WeightOverrides::default();
        for kind in EvaluatorKind::ALL {
            overrides.evaluators.insert(kind, 0.0);
        }
        let base = WeightTable::for_mode(PlanningMode::Normal);
        assert_eq!(base.with_overrides(&overrides), base);
    }

    #[test]
    fn test_readiness_buckets() {
        assert_eq!(readiness_bonus_points(15), 27);
        assert_eq!(readiness_bonus_points(16), 20);
        assert_eq!(readiness_bonus_points(25), 10);
        assert_eq!(readiness_bonus_points(26), 0);
        // .27 × 100 × 27/27 = 27 分
        let table = WeightTable::for_mode(PlanningMode::Emergency);
        assert!((table.readiness() * readiness_score(10) - 27.0).abs() < 1e-9);
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 情景试算领域模型
// ==========================================
// 依据: 决策引擎设计 - 4.5 Scenario Engine
// 红线: 情景是临时对象,不落库
// ==========================================

use crate::domain::plan::ServiceQuota;
use crate::domain::types::{EvaluatorKind, InductionAction};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// WeightOverrides - 权重覆写
// ==========================================
// 覆写后整张权重表重新归一化
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeightOverrides {
    #[serde(default)]
    pub evaluators: BTreeMap<EvaluatorKind, f64>,
    #[serde(default)]
    pub readiness: Option<f64>,
}

impl WeightOverrides {
    pub fn is_empty(&self) -> bool {
        self.evaluators.is_empty() && self.readiness.is_none()
    }
}

// ==========================================
// ScenarioPatch - 情景补丁
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioPatch {
    #[serde(default)]
    pub forced_unavailable: BTreeSet<String>, // 强制不可用 -> OUT_OF_SERVICE
    #[serde(default)]
    pub forced_ibl: BTreeSet<String>,         // 强制入库检修
    #[serde(default)]
    pub forced_service: BTreeSet<String>,     // 强制上线 (不能越过硬阻断)
    #[serde(default)]
    pub weight_overrides: Option<WeightOverrides>,
    #[serde(default)]
    pub quota_override: Option<ServiceQuota>,
}

impl ScenarioPatch {
    pub fn is_empty(&self) -> bool {
        self.forced_unavailable.is_empty()
            && self.forced_ibl.is_empty()
            && self.forced_service.is_empty()
            && self.weight_overrides.as_ref().map_or(true, |w| w.is_empty())
            && self.quota_override.is_none()
    }
}

// ==========================================
// PlanDiff - 方案差异
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionChange {
    pub train_id: String,
    pub from: InductionAction,
    pub to: InductionAction,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDiff {
    pub baseline_plan_id: String,
    pub scenario_plan_id: String,
    pub count_deltas: BTreeMap<InductionAction, i64>, // 只记录非零项
    pub mean_score_delta: f64,
    pub action_changes: Vec<ActionChange>,
    pub introduced_conflicts: Vec<String>,
    pub resolved_conflicts: Vec<String>,
}

impl PlanDiff {
    /// 零差异: 无数量变化、无动作变化、无冲突变化、均分不变
    pub fn is_zero(&self) -> bool {
        self.count_deltas.is_empty()
            && self.action_changes.is_empty()
            && self.introduced_conflicts.is_empty()
            && self.resolved_conflicts.is_empty()
            && self.mean_score_delta.abs() < 1e-9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patch_is_empty() {
        assert!(ScenarioPatch::default().is_empty());

        let patch = ScenarioPatch {
            weight_overrides: Some(WeightOverrides::default()),
            ..Default::default()
        };
        assert!(patch.is_empty());

        let mut patch = ScenarioPatch::default();
        patch.forced_ibl.insert("T03".to_string());
        assert!(!patch.is_empty());
    }

    #[test]
    fn test_patch_deserializes_with_missing_fields() {
        let patch: ScenarioPatch =
            serde_json::from_str(r#"{"forced_unavailable":["T01"],"weight_overrides":{"evaluators":{"branding":0.4}}}"#)
                .unwrap();
        assert!(patch.forced_unavailable.contains("T01"));
        let w = patch.weight_overrides.unwrap();
        assert_eq!(w.evaluators.get(&EvaluatorKind::Branding), Some(&0.4));
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 评估结果
// ==========================================
// 依据: 决策引擎设计 - 3. 数据模型 EvaluationResult
// 红线: hard_block => score == 0
// 红线: 硬阻断时分数仍然有定义
// ==========================================

use crate::domain::train::FactGroup;
use crate::domain::types::{EvaluatorKind, OperationalIntent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 缺失/过期数据与超时的中性分
pub const NEUTRAL_SCORE: f64 = 50.0;

// ==========================================
// 资源占用 (Resource Claim)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceKind {
    CleaningSlot,
    IblBay,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceClaim {
    pub kind: ResourceKind,
    pub resource_id: String,
}

impl ResourceClaim {
    pub fn cleaning_slot(id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::CleaningSlot,
            resource_id: id.into(),
        }
    }

    pub fn ibl_bay(id: impl Into<String>) -> Self {
        Self {
            kind: ResourceKind::IblBay,
            resource_id: id.into(),
        }
    }
}

// ==========================================
// EvaluationResult - 单评估器单车结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub train_id: String,
    pub evaluator: EvaluatorKind,
    pub score: f64,
    pub hard_block: bool,
    pub reason_code: String,
    pub reason_detail: String,
    pub data_incomplete: bool,
    pub timed_out: bool,
    pub intent: OperationalIntent,
    pub deadline: Option<DateTime<Utc>>,
    pub resource_claim: Option<ResourceClaim>,
}

impl EvaluationResult {
    /// 正常打分结果 (分数截断到 0..=100)
    pub fn scored(
        train_id: &str,
        evaluator: EvaluatorKind,
        score: f64,
        reason_code: &str,
        reason_detail: impl Into<String>,
    ) -> Self {
        Self {
            train_id: train_id.to_string(),
            evaluator,
            score: score.clamp(0.0, 100.0),
            hard_block: false,
            reason_code: reason_code.to_string(),
            reason_detail: reason_detail.into(),
            data_incomplete: false,
            timed_out: false,
            intent: OperationalIntent::Neutral,
            deadline: None,
            resource_claim: None,
        }
    }

    /// 硬阻断结果 (分数固定 0,意图为强制入库)
    pub fn blocked(
        train_id: &str,
        evaluator: EvaluatorKind,
        reason_code: &str,
        reason_detail: impl Into<String>,
    ) -> Self {
        Self {
            hard_block: true,
            intent: OperationalIntent::RequireMaintenance,
            ..Self::scored(train_id, evaluator, 0.0, reason_code, reason_detail)
        }
    }

    /// 事实组缺失或过期: 中性分 + data_incomplete,绝不硬阻断
    pub fn incomplete(train_id: &str, evaluator: EvaluatorKind, group: FactGroup) -> Self {
        Self {
            data_incomplete: true,
            ..Self::scored(
                train_id,
                evaluator,
                NEUTRAL_SCORE,
                "DATA_INCOMPLETE",
                format!("{} facts missing or stale", group),
            )
        }
    }

    /// 超时且无历史结果时的中性替代
    pub fn neutral_timeout(train_id: &str, evaluator: EvaluatorKind) -> Self {
        Self {
            timed_out: true,
            ..Self::scored(
                train_id,
                evaluator,
                NEUTRAL_SCORE,
                "EVALUATOR_TIMEOUT",
                "evaluator exceeded its time budget; neutral score substituted",
            )
        }
    }

    /// 由上次结果派生的超时替代
    pub fn from_last_known(last: &EvaluationResult) -> Self {
        Self {
            timed_out: true,
            reason_detail: format!("last-known result substituted: {}", last.reason_detail),
            ..last.clone()
        }
    }

    pub fn with_intent(mut self, intent: OperationalIntent) -> Self {
        self.intent = intent;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<DateTime<Utc>>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn with_claim(mut self, claim: Option<ResourceClaim>) -> Self {
        self.resource_claim = claim;
        self
    }

    /// 维修/保洁方向的拉力分 (分数越低越需要入库)
    pub fn depot_pull(&self) -> f64 {
        100.0 - self.score
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocked_result_has_zero_score() {
        let r = EvaluationResult::blocked("T01", EvaluatorKind::Fitness, "FITNESS_EXPIRED", "x");
        assert!(r.hard_block);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.intent, OperationalIntent::RequireMaintenance);
    }

    #[test]
    fn test_incomplete_is_neutral_and_not_blocking() {
        let r = EvaluationResult::incomplete("T01", EvaluatorKind::Mileage, FactGroup::Mileage);
        assert!(r.data_incomplete);
        assert!(!r.hard_block);
        assert_eq!(r.score, NEUTRAL_SCORE);
    }

    #[test]
    fn test_scored_clamps() {
        let r = EvaluationResult::scored("T01", EvaluatorKind::JobCard, 130.0, "X", "");
        assert_eq!(r.score, 100.0);
        let r = EvaluationResult::scored("T01", EvaluatorKind::JobCard, -5.0, "X", "");
        assert_eq!(r.score, 0.0);
    }

    #[test]
    fn test_last_known_keeps_score_and_flags_timeout() {
        let last = EvaluationResult::scored("T01", EvaluatorKind::Stabling, 75.0, "SHUNT_15", "ok");
        let r = EvaluationResult::from_last_known(&last);
        assert!(r.timed_out);
        assert_eq!(r.score, 75.0);
        assert_eq!(r.reason_code, "SHUNT_15");
    }
}

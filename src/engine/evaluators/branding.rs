// ==========================================
// 地铁列车夜间投运决策系统 - 广告合同评估器
// ==========================================
// 规则 (只看 active 合同,最紧急合同决定分数):
// - 已达标 → 50; 已违约 (到期且未达标) → 0
// - 7 天内到期 → 100; 14 天内 → 95
// - 曝光比 < 0.5 → 85; < 0.8 → 70; 其余 → 50
// - mandate 窗口内到期且未达标 → 硬性要求上线 (REQUIRE_SERVICE)
// - 分数 > 70 → 倾向上线
// ==========================================

use crate::domain::evaluation::{EvaluationResult, NEUTRAL_SCORE};
use crate::domain::train::{BrandingContract, FactGroup, TrainSnapshot};
use crate::domain::types::{EvaluatorKind, OperationalIntent};
use crate::engine::evaluator::{EvaluationContext, Evaluator};

const PREFER_SERVICE_ABOVE: f64 = 70.0;

#[derive(Debug, Clone, Default)]
pub struct BrandingEvaluator;

impl BrandingEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// 单个合同的紧急分与原因码
    fn contract_urgency(contract: &BrandingContract, ctx: &EvaluationContext) -> (f64, &'static str) {
        let days_left = ctx.days_until(contract.end_date);
        if !contract.has_deficit() {
            return (50.0, "BRANDING_FULFILLED");
        }
        if days_left < 0.0 {
            return (0.0, "BRANDING_BREACHED");
        }
        if days_left < 7.0 {
            return (100.0, "BRANDING_ENDING_7D");
        }
        if days_left < 14.0 {
            return (95.0, "BRANDING_ENDING_14D");
        }
        let ratio = contract.exposure_ratio();
        if ratio < 0.5 {
            (85.0, "BRANDING_EXPOSURE_LOW")
        } else if ratio < 0.8 {
            (70.0, "BRANDING_EXPOSURE_BEHIND")
        } else {
            (50.0, "BRANDING_ON_TRACK")
        }
    }
}

impl Evaluator for BrandingEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Branding
    }

    fn evaluate(&self, snapshot: &TrainSnapshot, ctx: &EvaluationContext) -> EvaluationResult {
        let train_id = snapshot.train_id.as_str();
        let contracts = match snapshot.branding_facts() {
            Some(c) => c,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Branding),
        };

        let active: Vec<&BrandingContract> = contracts.iter().filter(|c| c.active).collect();
        if active.is_empty() {
            return EvaluationResult::scored(
                train_id,
                self.kind(),
                NEUTRAL_SCORE,
                "BRANDING_NO_CONTRACT",
                "no active branding contract",
            );
        }

        // 最紧急合同 (同分取先到期)
        let mut governing: Option<(&BrandingContract, f64, &'static str)> = None;
        for contract in active.iter().copied() {
            let (score, code) = Self::contract_urgency(contract, ctx);
            let replace = match governing {
                None => true,
                Some((g, gs, _)) => score > gs || (score == gs && contract.end_date < g.end_date),
            };
            if replace {
                governing = Some((contract, score, code));
            }
        }
        let (contract, score, code) = match governing {
            Some(g) => g,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::Branding),
        };

        // 硬性上线: mandate 窗口内到期且仍有缺口
        let mandate = active.iter().copied().find(|c| {
            let left = c.end_date - ctx.as_of;
            c.has_deficit() && left >= chrono::Duration::zero() && left <= ctx.mandate_window
        });

        let detail = format!(
            "contract {} exposure {:.1}/{:.1}h, ends in {:.1}d",
            contract.contract_id,
            contract.current_exposure_hours,
            contract.required_exposure_hours,
            ctx.days_until(contract.end_date)
        );

        if let Some(m) = mandate {
            return EvaluationResult::scored(train_id, self.kind(), 100.0, "BRANDING_SLA_MANDATE", detail)
                .with_intent(OperationalIntent::RequireService)
                .with_deadline(Some(m.end_date));
        }

        let intent = if score > PREFER_SERVICE_ABOVE {
            OperationalIntent::PreferService
        } else {
            OperationalIntent::Neutral
        };
        let deadline = if contract.has_deficit() {
            Some(contract.end_date)
        } else {
            None
        };

        EvaluationResult::scored(train_id, self.kind(), score, code, detail)
            .with_intent(intent)
            .with_deadline(deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlanningConfig;
    use crate::domain::types::{PlanningMode, TrainStatus};
    use chrono::{Duration, Utc};

    fn ctx() -> EvaluationContext {
        let now = Utc::now();
        EvaluationContext::new(PlanningMode::Normal, now.date_naive(), now, &PlanningConfig::default(), None)
    }

    fn contract(id: &str, current: f64, required: f64, ends_in: Duration, ctx: &EvaluationContext) -> BrandingContract {
        BrandingContract {
            contract_id: id.to_string(),
            required_exposure_hours: required,
            current_exposure_hours: current,
            end_date: ctx.as_of + ends_in,
            active: true,
            penalty_rate: 1200.0,
        }
    }

    fn train(contracts: Vec<BrandingContract>) -> TrainSnapshot {
        let mut t = TrainSnapshot::new("T03", TrainStatus::InService);
        t.branding = Some(contracts);
        t
    }

    #[test]
    fn test_no_contract_is_neutral_not_incomplete() {
        let r = BrandingEvaluator::new().evaluate(&train(vec![]), &ctx());
        assert_eq!(r.score, 50.0);
        assert!(!r.data_incomplete);
    }

    #[test]
    fn test_most_urgent_contract_governs() {
        let c = ctx();
        let r = BrandingEvaluator::new().evaluate(
            &train(vec![
                contract("A", 90.0, 100.0, Duration::days(60), &c),
                contract("B", 10.0, 100.0, Duration::days(10), &c),
            ]),
            &c,
        );
        assert_eq!(r.score, 95.0);
        assert_eq!(r.reason_code, "BRANDING_ENDING_14D");
        assert_eq!(r.intent, OperationalIntent::PreferService);
    }

    #[test]
    fn test_exposure_ratio_tiers() {
        let c = ctx();
        let low = BrandingEvaluator::new().evaluate(&train(vec![contract("A", 40.0, 100.0, Duration::days(40), &c)]), &c);
        assert_eq!(low.score, 85.0);
        let behind = BrandingEvaluator::new().evaluate(&train(vec![contract("A", 60.0, 100.0, Duration::days(40), &c)]), &c);
        assert_eq!(behind.score, 70.0);
        assert_eq!(behind.intent, OperationalIntent::Neutral);
        let done = BrandingEvaluator::new().evaluate(&train(vec![contract("A", 120.0, 100.0, Duration::days(2), &c)]), &c);
        assert_eq!(done.score, 50.0);
    }

    #[test]
    fn test_breached_contract_scores_zero() {
        let c = ctx();
        let r = BrandingEvaluator::new().evaluate(&train(vec![contract("A", 10.0, 100.0, Duration::days(-1), &c)]), &c);
        assert_eq!(r.score, 0.0);
        assert_eq!(r.reason_code, "BRANDING_BREACHED");
        assert!(!r.hard_block);
    }

    #[test]
    fn test_mandate_window_requires_service() {
        let c = ctx();
        let r = BrandingEvaluator::new().evaluate(&train(vec![contract("A", 10.0, 100.0, Duration::hours(12), &c)]), &c);
        assert_eq!(r.intent, OperationalIntent::RequireService);
        assert_eq!(r.reason_code, "BRANDING_SLA_MANDATE");
    }
}

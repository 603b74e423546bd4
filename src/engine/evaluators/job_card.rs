// ==========================================
// 地铁列车夜间投运决策系统 - 工单评估器
// ==========================================
// 规则 (仅统计未关闭工单 OPEN/IN_PROGRESS/PENDING_PARTS):
// - 阻断运营或安全关键工单 → 硬阻断
// - 紧急工单数 > max_critical → 硬阻断
// - 有紧急 → 40; 有高优先级 → 70; 仅中低 → 90; 无 → 100
// - 每张逾期工单扣 overdue_penalty
// - requires_ibl → 倾向入库检修,并声明 IBL 库位
// ==========================================

use crate::domain::evaluation::{EvaluationResult, ResourceClaim};
use crate::domain::train::{FactGroup, JobCard, JobPriority, TrainSnapshot};
use crate::domain::types::{EvaluatorKind, OperationalIntent};
use crate::engine::evaluator::{EvaluationContext, Evaluator};

#[derive(Debug, Clone, Default)]
pub struct JobCardEvaluator;

impl JobCardEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl Evaluator for JobCardEvaluator {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::JobCard
    }

    fn evaluate(&self, snapshot: &TrainSnapshot, ctx: &EvaluationContext) -> EvaluationResult {
        let train_id = snapshot.train_id.as_str();
        let cards = match snapshot.job_card_facts() {
            Some(c) => c,
            None => return EvaluationResult::incomplete(train_id, self.kind(), FactGroup::JobCards),
        };
        let t = &ctx.thresholds.job_cards;
        let open: Vec<&JobCard> = cards.iter().filter(|c| c.status.is_open()).collect();

        let earliest_due = open.iter().filter_map(|c| c.due_date).min();
        let ibl_claim = open
            .iter()
            .filter(|c| c.requires_ibl)
            .find_map(|c| c.ibl_bay.as_ref())
            .map(ResourceClaim::ibl_bay);

        if let Some(blocking) = open.iter().find(|c| c.blocking_service || c.safety_critical) {
            return EvaluationResult::blocked(
                train_id,
                self.kind(),
                "JOB_CARD_BLOCKING",
                format!("open job {} blocks revenue service", blocking.job_id),
            )
            .with_deadline(earliest_due)
            .with_claim(ibl_claim);
        }

        let count = |p: JobPriority| open.iter().filter(|c| c.priority == p).count();
        let critical = count(JobPriority::Critical);
        let high = count(JobPriority::High);

        if critical > t.max_critical {
            return EvaluationResult::blocked(
                train_id,
                self.kind(),
                "JOB_CARD_CRITICAL_LIMIT",
                format!("{} critical jobs open, limit {}", critical, t.max_critical),
            )
            .with_deadline(earliest_due)
            .with_claim(ibl_claim);
        }

        let (base, code) = if critical > 0 {
            (t.critical_score, "JOB_CARD_CRITICAL_OPEN")
        } else if high > 0 {
            (t.high_score, "JOB_CARD_HIGH_OPEN")
        } else if !open.is_empty() {
            (t.minor_score, "JOB_CARD_MINOR_OPEN")
        } else {
            (100.0, "JOB_CARD_CLEAR")
        };

        let overdue = open
            .iter()
            .filter(|c| c.due_date.map_or(false, |d| d < ctx.as_of))
            .count();
        let score = base - t.overdue_penalty * overdue as f64;

        let requires_ibl = open.iter().any(|c| c.requires_ibl);
        let intent = if requires_ibl || critical > 0 {
            OperationalIntent::PreferMaintenance
        } else {
            OperationalIntent::Neutral
        };

        EvaluationResult::scored(
            train_id,
            self.kind(),
            score,
            code,
            format!(
                "{} open ({} critical, {} high), {} overdue",
                open.len(),
                critical,
                high,
                overdue
            ),
        )
        .with_intent(intent)
        .with_deadline(earliest_due)
        .with_claim(ibl_claim)
    }
}

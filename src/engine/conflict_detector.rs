// ==========================================
// 地铁列车夜间投运决策系统 - 冲突检测
// ==========================================
// 依据: 决策引擎设计 - 4.2 Conflict Detection
// 职责: 从评估结果中识别四类冲突
// - HARD_VS_HARD: 同车 硬阻断 vs 强制上线 (CRITICAL)
// - HARD_VS_SOFT: 同车 硬阻断 vs 高紧迫度上线倾向 (HIGH)
// - SOFT_VS_SOFT: 同车 上线倾向 vs 入库倾向,分差 >= 阈值
// - RESOURCE:     多车 声明同一资源 (MEDIUM)
// 红线: 只检测不裁决; 输出顺序确定
// ==========================================

use crate::domain::conflict::Conflict;
use crate::domain::evaluation::{EvaluationResult, ResourceClaim, ResourceKind};
use crate::domain::types::{ConflictKind, ConflictSeverity, OperationalIntent};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct ConflictDetector {
    soft_conflict_delta: f64,
    high_urgency_threshold: f64,
}

impl ConflictDetector {
    /// # 参数
    /// - soft_conflict_delta: 软冲突分差阈值 (默认 40)
    /// - high_urgency_threshold: 硬-软冲突的紧迫度阈值 (默认 90)
    pub fn new(soft_conflict_delta: f64, high_urgency_threshold: f64) -> Self {
        Self {
            soft_conflict_delta,
            high_urgency_threshold,
        }
    }

    /// 检测单车内部冲突
    ///
    /// # 参数
    /// - results: 同一列车的全部评估结果
    pub fn detect_for_train(&self, results: &[EvaluationResult]) -> Vec<Conflict> {
        let mut conflicts = Vec::new();
        let train_id = match results.first() {
            Some(r) => r.train_id.clone(),
            None => return conflicts,
        };

        let blocks: Vec<&EvaluationResult> = results.iter().filter(|r| r.hard_block).collect();

        for block in &blocks {
            for other in results.iter().filter(|r| !r.hard_block) {
                if other.intent == OperationalIntent::RequireService {
                    conflicts.push(Conflict::new(
                        ConflictKind::HardVsHard,
                        ConflictSeverity::Critical,
                        vec![train_id.clone()],
                        vec![block.evaluator, other.evaluator],
                        None,
                        format!(
                            "{} blocks service while {} requires it; operator decision required",
                            block.reason_code, other.reason_code
                        ),
                    ));
                } else if other.intent.pulls_to_service()
                    && other.score > self.high_urgency_threshold
                {
                    conflicts.push(Conflict::new(
                        ConflictKind::HardVsSoft,
                        ConflictSeverity::High,
                        vec![train_id.clone()],
                        vec![block.evaluator, other.evaluator],
                        None,
                        format!("{} takes precedence over {}", block.reason_code, other.reason_code),
                    ));
                }
            }
        }

        // 已硬阻断的列车不再出现软冲突
        if !blocks.is_empty() {
            return conflicts;
        }

        for service in results.iter().filter(|r| r.intent.pulls_to_service()) {
            for depot in results.iter().filter(|r| {
                matches!(
                    r.intent,
                    OperationalIntent::PreferMaintenance | OperationalIntent::PreferCleaning
                )
            }) {
                if service.score - depot.score < self.soft_conflict_delta {
                    continue;
                }
                let severity = if depot.intent == OperationalIntent::PreferMaintenance {
                    ConflictSeverity::Medium
                } else {
                    ConflictSeverity::Low
                };
                conflicts.push(Conflict::new(
                    ConflictKind::SoftVsSoft,
                    severity,
                    vec![train_id.clone()],
                    vec![service.evaluator, depot.evaluator],
                    None,
                    format!(
                        "{} ({:.0}) pulls to service, {} ({:.0}) pulls to depot; cost model decides",
                        service.reason_code, service.score, depot.reason_code, depot.score
                    ),
                ));
            }
        }

        conflicts
    }

    /// 检测跨车资源冲突
    ///
    /// # 参数
    /// - results_by_train: 列车ID → 评估结果
    pub fn detect_resource_conflicts(
        &self,
        results_by_train: &BTreeMap<String, Vec<EvaluationResult>>,
    ) -> Vec<Conflict> {
        let mut claims: BTreeMap<ResourceClaim, Vec<&EvaluationResult>> = BTreeMap::new();
        for results in results_by_train.values() {
            for r in results {
                if let Some(claim) = &r.resource_claim {
                    claims.entry(claim.clone()).or_default().push(r);
                }
            }
        }

        claims
            .into_iter()
            .filter_map(|(claim, claimants)| {
                let mut train_ids: Vec<String> =
                    claimants.iter().map(|r| r.train_id.clone()).collect();
                train_ids.sort();
                train_ids.dedup();
                if train_ids.len() < 2 {
                    return None;
                }
                let evaluators = claimants.iter().map(|r| r.evaluator).collect();
                Some(Conflict::new(
                    ConflictKind::Resource,
                    ConflictSeverity::Medium,
                    train_ids,
                    evaluators,
                    Some(resource_key(&claim)),
                    "grant to the better-ranked train; others fall back",
                ))
            })
            .collect()
    }
}

/// 资源键 (含资源类型前缀,避免保洁位与检修位同名冲突)
pub fn resource_key(claim: &ResourceClaim) -> String {
    let prefix = match claim.kind {
        ResourceKind::CleaningSlot => "cleaning_slot",
        ResourceKind::IblBay => "ibl_bay",
    };
    format!("{}:{}", prefix, claim.resource_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::EvaluatorKind;

    fn detector() -> ConflictDetector {
        ConflictDetector::new(40.0, 90.0)
    }

    fn scored(kind: EvaluatorKind, score: f64, intent: OperationalIntent) -> EvaluationResult {
        EvaluationResult::scored("T01", kind, score, "TEST", "").with_intent(intent)
    }

    #[test]
    fn test_hard_vs_hard_on_block_and_mandate() {
        let results = vec![
            EvaluationResult::blocked("T01", EvaluatorKind::Fitness, "FITNESS_EXPIRED", ""),
            scored(EvaluatorKind::Branding, 100.0, OperationalIntent::RequireService),
        ];
        let conflicts = detector().detect_for_train(&results);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::HardVsHard);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Critical);
    }

    #[test]
    fn test_hard_vs_soft_requires_high_urgency() {
        let mut results = vec![
            EvaluationResult::blocked("T01", EvaluatorKind::JobCard, "JOB_CARD_BLOCKING", ""),
            scored(EvaluatorKind::Branding, 95.0, OperationalIntent::PreferService),
        ];
        let conflicts = detector().detect_for_train(&results);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::HardVsSoft);

        results[1].score = 85.0;
        assert!(detector().detect_for_train(&results).is_empty());
    }

    #[test]
    fn test_soft_vs_soft_threshold_and_severity() {
        let results = vec![
            scored(EvaluatorKind::Branding, 95.0, OperationalIntent::PreferService),
            scored(EvaluatorKind::Mileage, 20.0, OperationalIntent::PreferMaintenance),
            scored(EvaluatorKind::Cleaning, 60.0, OperationalIntent::PreferCleaning),
        ];
        let conflicts = detector().detect_for_train(&results);
        // 95-20 = 75 触发; 95-60 = 35 不触发
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::SoftVsSoft);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Medium);
    }

    #[test]
    fn test_service_pull_against_cleaning_is_low() {
        let results = vec![
            scored(EvaluatorKind::Branding, 90.0, OperationalIntent::PreferService),
            scored(EvaluatorKind::Cleaning, 30.0, OperationalIntent::PreferCleaning),
        ];
        let conflicts = detector().detect_for_train(&results);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ConflictKind::SoftVsSoft);
        assert_eq!(conflicts[0].severity, ConflictSeverity::Low);
        assert_eq!(
            conflicts[0].involved_evaluators,
            vec![EvaluatorKind::Branding, EvaluatorKind::Cleaning]
        );

        // 差值正好 40 仍触发; 39 不触发
        let mut edge = results.clone();
        edge[1].score = 50.0;
        assert_eq!(detector().detect_for_train(&edge).len(), 1);
        edge[1].score = 51.0;
        assert!(detector().detect_for_train(&edge).is_empty());
    }

    #[test]
    fn test_resource_conflict_across_trains() {
        let mut by_train = BTreeMap::new();
        for id in ["T01", "T02", "T03"] {
            let mut r = EvaluationResult::scored(id, EvaluatorKind::Cleaning, 40.0, "TEST", "");
            if id != "T03" {
                r = r.with_claim(Some(ResourceClaim::cleaning_slot("CS-1")));
            }
            by_train.insert(id.to_string(), vec![r]);
        }
        let conflicts = detector().detect_resource_conflicts(&by_train);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].train_ids, vec!["T01".to_string(), "T02".to_string()]);
        assert_eq!(conflicts[0].resource_id.as_deref(), Some("cleaning_slot:CS-1"));
    }

    #[test]
    fn test_single_claim_is_not_a_conflict() {
        let mut by_train = BTreeMap::new();
        by_train.insert(
            "T01".to_string(),
            vec![EvaluationResult::scored("T01", EvaluatorKind::JobCard, 70.0, "TEST", "")
                .with_claim(Some(ResourceClaim::ibl_bay("IBL-1")))],
        );
        assert!(detector().detect_resource_conflicts(&by_train).is_empty());
    }
}

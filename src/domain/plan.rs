// ==========================================
// 地铁列车夜间投运决策系统 - 投运方案领域模型
// ==========================================
// 依据: 决策引擎设计 - 3. 数据模型 Assignment / Plan
// 红线: 方案定稿后 Assignment 不可变,人工改派生成 version n+1
// 红线: SCENARIO 方案不可审批、不落库
// ==========================================

use crate::domain::conflict::Conflict;
use crate::domain::types::{
    ErrorKind, EvaluatorKind, InductionAction, PlanMode, PlanStatus, PlanningMode,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==========================================
// ServiceQuota - 运营配额
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceQuota {
    pub service_target: usize, // 正线列车数 N
    pub standby_target: usize, // 备车数 M
}

impl ServiceQuota {
    pub fn new(service_target: usize, standby_target: usize) -> Self {
        Self {
            service_target,
            standby_target,
        }
    }
}

// ==========================================
// AssignmentOverride - 人工改派元数据
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentOverride {
    pub previous_action: InductionAction,
    pub overridden_by: String,
    pub reason: String,
    pub overridden_at: DateTime<Utc>,
}

// ==========================================
// Assignment - 单车投运指派
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub train_id: String,
    pub action: InductionAction,
    pub overall_score: f64,
    #[serde(default)]
    pub confidence: f64,           // 推荐置信度 0..1
    pub service_rank: Option<u32>, // SERVICE 列车的名次 (1..N)
    pub evaluator_scores: BTreeMap<EvaluatorKind, f64>,
    pub hard_blocked: bool,
    pub final_eligible: bool,        // 解决冲突后是否可投运
    pub readiness_minutes: u32,      // 预计出车时间
    pub resolved_conflicts: Vec<String>,
    pub warnings: Vec<String>,       // DataIncomplete 等提示
    pub incomplete: bool,            // 有评估器超时
    pub error_kinds: Vec<ErrorKind>,
    pub manual_decision_required: bool,
    pub resolution_notes: Vec<String>,
    pub version: u32,
    pub override_info: Option<AssignmentOverride>,
}

impl Assignment {
    /// 产生人工改派后的新版本 (原版本不变)
    pub fn overridden(
        &self,
        action: InductionAction,
        by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> Assignment {
        Assignment {
            action,
            service_rank: None,
            version: self.version + 1,
            override_info: Some(AssignmentOverride {
                previous_action: self.action,
                overridden_by: by.to_string(),
                reason: reason.to_string(),
                overridden_at: at,
            }),
            ..self.clone()
        }
    }
}

// ==========================================
// CategoryCounts - 各去向数量
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCounts {
    pub service: usize,
    pub standby: usize,
    pub ibl_maintenance: usize,
    pub ibl_cleaning: usize,
    pub out_of_service: usize,
}

impl CategoryCounts {
    pub fn get(&self, action: InductionAction) -> usize {
        match action {
            InductionAction::Service => self.service,
            InductionAction::Standby => self.standby,
            InductionAction::IblMaintenance => self.ibl_maintenance,
            InductionAction::IblCleaning => self.ibl_cleaning,
            InductionAction::OutOfService => self.out_of_service,
        }
    }
}

// ==========================================
// Plan - 投运方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub decision_date: NaiveDate,
    pub mode: PlanMode,
    pub rule_mode: PlanningMode, // 实际使用的阈值/权重表
    pub assignments: Vec<Assignment>,
    pub as_of: DateTime<Utc>, // 快照时刻 (情景重放沿用)
    pub generated_at: DateTime<Utc>,
    pub status: PlanStatus,
    pub incomplete: bool,
    pub conflicts: Vec<Conflict>,
    pub error_kind: Option<ErrorKind>,
    pub service_quota: ServiceQuota,
    pub baseline_plan_id: Option<String>,
}

impl Plan {
    pub fn assignment(&self, train_id: &str) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.train_id == train_id)
    }

    pub fn counts(&self) -> CategoryCounts {
        let mut counts = CategoryCounts::default();
        for a in &self.assignments {
            match a.action {
                InductionAction::Service => counts.service += 1,
                InductionAction::Standby => counts.standby += 1,
                InductionAction::IblMaintenance => counts.ibl_maintenance += 1,
                InductionAction::IblCleaning => counts.ibl_cleaning += 1,
                InductionAction::OutOfService => counts.out_of_service += 1,
            }
        }
        counts
    }

    /// 按名次排列的 SERVICE 列车
    pub fn service_train_ids(&self) -> Vec<String> {
        let mut service: Vec<&Assignment> = self
            .assignments
            .iter()
            .filter(|a| a.action == InductionAction::Service)
            .collect();
        service.sort_by_key(|a| a.service_rank.unwrap_or(u32::MAX));
        service.iter().map(|a| a.train_id.clone()).collect()
    }

    pub fn mean_overall_score(&self) -> f64 {
        if self.assignments.is_empty() {
            return 0.0;
        }
        let total: f64 = self.assignments.iter().map(|a| a.overall_score).sum();
        total / self.assignments.len() as f64
    }

    pub fn is_approvable(&self) -> bool {
        self.mode != PlanMode::Scenario && self.status == PlanStatus::Draft
    }

    pub fn is_draft(&self) -> bool {
        self.status == PlanStatus::Draft
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 冲突领域模型
// ==========================================
// 依据: 决策引擎设计 - 3. 数据模型 Conflict
// 红线: 冲突只追加不删除,解决 = 追加 ConflictResolution
// 红线: conflict_id 确定性 (同输入同 ID)
// ==========================================

use crate::domain::types::{ConflictKind, ConflictSeverity, EvaluatorKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ResolutionRule - 冲突裁决依据
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionRule {
    HardBlockPrecedence, // 硬阻断绝对优先
    CostModel,           // 成本模型较低者胜
    TemporalDeadline,    // 成本平手: 决策窗口内有截止的一方胜
    MaintenanceDefault,  // 成本平手且时间规则无法区分: 维修优先
    RankOrder,           // 资源争用: 按排名先到先得
    Manual,              // 人工裁决
}

impl ResolutionRule {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ResolutionRule::HardBlockPrecedence => "HARD_BLOCK_PRECEDENCE",
            ResolutionRule::CostModel => "COST_MODEL",
            ResolutionRule::TemporalDeadline => "TEMPORAL_DEADLINE",
            ResolutionRule::MaintenanceDefault => "MAINTENANCE_DEFAULT",
            ResolutionRule::RankOrder => "RANK_ORDER",
            ResolutionRule::Manual => "MANUAL",
        }
    }
}

// ==========================================
// ConflictResolution - 裁决记录 (追加)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub rule: ResolutionRule,
    pub winning_evaluator: Option<EvaluatorKind>,
    pub losing_evaluator: Option<EvaluatorKind>,
    pub winning_train_id: Option<String>, // 资源争用时的获胜列车
    pub note: String,
    pub resolved_by: String, // ENGINE 或操作员
    pub resolved_at: DateTime<Utc>,
}

impl ConflictResolution {
    pub fn by_engine(rule: ResolutionRule, note: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            rule,
            winning_evaluator: None,
            losing_evaluator: None,
            winning_train_id: None,
            note: note.into(),
            resolved_by: "ENGINE".to_string(),
            resolved_at: at,
        }
    }

    pub fn between(mut self, winner: EvaluatorKind, loser: EvaluatorKind) -> Self {
        self.winning_evaluator = Some(winner);
        self.losing_evaluator = Some(loser);
        self
    }

    pub fn granted_to(mut self, train_id: &str) -> Self {
        self.winning_train_id = Some(train_id.to_string());
        self
    }
}

// ==========================================
// Conflict - 冲突
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub conflict_id: String,
    pub train_ids: Vec<String>,                // 排序后的列车ID
    pub kind: ConflictKind,
    pub involved_evaluators: Vec<EvaluatorKind>, // 排序后的评估器
    pub severity: ConflictSeverity,
    pub suggested_resolution: String,
    pub resource_id: Option<String>, // RESOURCE 冲突的资源
    pub resolutions: Vec<ConflictResolution>,
}

impl Conflict {
    /// 创建冲突 (ID 由类型、列车、评估器、资源确定性派生)
    pub fn new(
        kind: ConflictKind,
        severity: ConflictSeverity,
        mut train_ids: Vec<String>,
        mut involved_evaluators: Vec<EvaluatorKind>,
        resource_id: Option<String>,
        suggested_resolution: impl Into<String>,
    ) -> Self {
        train_ids.sort();
        train_ids.dedup();
        involved_evaluators.sort();
        involved_evaluators.dedup();

        let conflict_id = Self::derive_id(kind, &train_ids, &involved_evaluators, resource_id.as_deref());

        Self {
            conflict_id,
            train_ids,
            kind,
            involved_evaluators,
            severity,
            suggested_resolution: suggested_resolution.into(),
            resource_id,
            resolutions: Vec::new(),
        }
    }

    fn derive_id(
        kind: ConflictKind,
        train_ids: &[String],
        evaluators: &[EvaluatorKind],
        resource_id: Option<&str>,
    ) -> String {
        let evaluators: Vec<&str> = evaluators.iter().map(|e| e.as_str()).collect();
        let mut id = format!(
            "CF-{}-{}-{}",
            kind.to_db_str(),
            train_ids.join("+"),
            evaluators.join("+")
        );
        if let Some(resource) = resource_id {
            id.push('@');
            id.push_str(resource);
        }
        id
    }

    /// 追加裁决记录
    pub fn append_resolution(&mut self, resolution: ConflictResolution) {
        self.resolutions.push(resolution);
    }

    pub fn is_resolved(&self) -> bool {
        !self.resolutions.is_empty()
    }

    pub fn involves(&self, train_id: &str) -> bool {
        self.train_ids.iter().any(|t| t == train_id)
    }
}

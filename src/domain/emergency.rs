// ==========================================
// 地铁列车夜间投运决策系统 - 应急/危机领域模型
// ==========================================
// 依据: 决策引擎设计 - 4.6 Emergency Replanner / Crisis Reoptimizer
// 状态机: IDLE -> QUICK_CHECK -> PLAN_READY | CRISIS -> RESOLVED
// ==========================================

use crate::domain::plan::Plan;
use crate::domain::types::{EmergencyPhase, ErrorKind, FaultSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// EmergencyEvent - 故障退出事件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyEvent {
    pub emergency_id: String,
    pub withdrawn_train_id: String,
    pub fault_code: String,
    pub fault_severity: FaultSeverity,
    pub timestamp: DateTime<Utc>,
    pub deployment_deadline: DateTime<Utc>,
}

// ==========================================
// CrisisState - 危机状态
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisState {
    pub activated_at: DateTime<Utc>,
    pub withdrawal_count: usize,
    pub service_deficit: usize,
    pub closed_at: Option<DateTime<Utc>>,
}

// ==========================================
// CrisisAction - 危机处置动作
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrisisAction {
    DeployStandby {
        train_id: String,
        readiness_minutes: u32,
        overall_score: f64,
    },
    ReassignRoute {
        train_id: String,
        from_route: String,
        to_route: String,
    },
}

impl CrisisAction {
    pub fn train_id(&self) -> &str {
        match self {
            CrisisAction::DeployStandby { train_id, .. } => train_id,
            CrisisAction::ReassignRoute { train_id, .. } => train_id,
        }
    }
}

// ==========================================
// CrisisPlan - 全网重排结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisPlan {
    pub emergency_id: String,
    pub state: CrisisState,
    pub ranked_plan: Plan,
    pub actions: Vec<CrisisAction>,
    pub critical_routes: Vec<String>,
    pub remaining_deficit: usize,
    pub recovery_estimate_minutes: u32,
    pub error_kind: Option<ErrorKind>,
}

// ==========================================
// EmergencyPlan - 单车替换方案
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplacementCandidate {
    pub train_id: String,
    pub readiness_minutes: u32,
    pub overall_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyPlan {
    pub emergency_id: String,
    pub withdrawn_train_id: String,
    pub replacement: ReplacementCandidate,
    pub fallback_options: Vec<ReplacementCandidate>, // 后续最多 3 个候选
    pub candidate_plan: Plan,                        // 候选列车的 EMERGENCY 模式排名
    pub generated_at: DateTime<Utc>,
}

// ==========================================
// 状态机记录
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResolutionOutcome {
    Approved { approved_by: String },
    TimedOut,
    Superseded { by_emergency_id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: EmergencyPhase,
    pub to: EmergencyPhase,
    pub at: DateTime<Utc>,
    pub reason: String,
}

/// 单个应急实例的完整状态
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmergencyInstance {
    pub event: EmergencyEvent,
    pub phase: EmergencyPhase,
    pub emergency_plan: Option<EmergencyPlan>,
    pub crisis_plan: Option<CrisisPlan>,
    pub error_kind: Option<ErrorKind>,
    pub approval_deadline: Option<DateTime<Utc>>,
    pub outcome: Option<ResolutionOutcome>,
    pub transitions: Vec<PhaseTransition>,
}

impl EmergencyInstance {
    pub fn new(event: EmergencyEvent) -> Self {
        Self {
            event,
            phase: EmergencyPhase::Idle,
            emergency_plan: None,
            crisis_plan: None,
            error_kind: None,
            approval_deadline: None,
            outcome: None,
            transitions: Vec::new(),
        }
    }

    /// 记录状态迁移
    pub fn transition(&mut self, to: EmergencyPhase, at: DateTime<Utc>, reason: impl Into<String>) {
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            at,
            reason: reason.into(),
        });
        self.phase = to;
    }

    pub fn is_open(&self) -> bool {
        self.phase != EmergencyPhase::Resolved
    }

    pub fn emergency_id(&self) -> &str {
        &self.event.emergency_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_transition_records_history() {
        let now = Utc::now();
        let mut inst = EmergencyInstance::new(EmergencyEvent {
            emergency_id: "EM-1".to_string(),
            withdrawn_train_id: "T05".to_string(),
            fault_code: "BRK-01".to_string(),
            fault_severity: FaultSeverity::Major,
            timestamp: now,
            deployment_deadline: now + Duration::minutes(5),
        });
        inst.transition(EmergencyPhase::QuickCheck, now, "event received");
        inst.transition(EmergencyPhase::PlanReady, now, "replacement found");

        assert_eq!(inst.phase, EmergencyPhase::PlanReady);
        assert_eq!(inst.transitions.len(), 2);
        assert_eq!(inst.transitions[1].from, EmergencyPhase::QuickCheck);
        assert!(inst.is_open());
    }

    #[test]
    fn test_crisis_action_serializes_with_tag() {
        let action = CrisisAction::ReassignRoute {
            train_id: "T07".to_string(),
            from_route: "R3".to_string(),
            to_route: "R1".to_string(),
        };
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "REASSIGN_ROUTE");
        assert_eq!(action.train_id(), "T07");
    }
}

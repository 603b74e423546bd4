// ==========================================
// 地铁列车夜间投运决策系统 - 领域类型定义
// ==========================================
// 依据: 决策引擎设计 - 3. 数据模型
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库/下游一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 规划模式 (Planning Mode)
// ==========================================
// 红线: 模式只切换阈值表和权重表,不复制代码路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanningMode {
    Normal,    // 夜间常规
    Emergency, // 单车故障应急
    Crisis,    // 连锁故障全网重排
}

impl PlanningMode {
    /// 应急/危机模式共享放宽阈值
    pub fn is_relaxed(&self) -> bool {
        matches!(self, PlanningMode::Emergency | PlanningMode::Crisis)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanningMode::Normal => "NORMAL",
            PlanningMode::Emergency => "EMERGENCY",
            PlanningMode::Crisis => "CRISIS",
        }
    }

    /// 从字符串解析 (未知值返回 None)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "NORMAL" => Some(PlanningMode::Normal),
            "EMERGENCY" => Some(PlanningMode::Emergency),
            "CRISIS" => Some(PlanningMode::Crisis),
            _ => None,
        }
    }
}

impl fmt::Display for PlanningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 方案模式 (Plan Mode)
// ==========================================
// SCENARIO 仅用于试算,不可审批
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanMode {
    Normal,
    Emergency,
    Crisis,
    Scenario,
}

impl PlanMode {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlanMode::Normal => "NORMAL",
            PlanMode::Emergency => "EMERGENCY",
            PlanMode::Crisis => "CRISIS",
            PlanMode::Scenario => "SCENARIO",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "EMERGENCY" => PlanMode::Emergency,
            "CRISIS" => PlanMode::Crisis,
            "SCENARIO" => PlanMode::Scenario,
            _ => PlanMode::Normal,
        }
    }
}

impl From<PlanningMode> for PlanMode {
    fn from(mode: PlanningMode) -> Self {
        match mode {
            PlanningMode::Normal => PlanMode::Normal,
            PlanningMode::Emergency => PlanMode::Emergency,
            PlanningMode::Crisis => PlanMode::Crisis,
        }
    }
}

impl fmt::Display for PlanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 方案状态 (Plan Status)
// ==========================================
// 审批是外部状态迁移,引擎只产出 DRAFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanStatus {
    Draft,
    Approved,
}

impl PlanStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            PlanStatus::Draft => "DRAFT",
            PlanStatus::Approved => "APPROVED",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "APPROVED" => PlanStatus::Approved,
            _ => PlanStatus::Draft,
        }
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 投运动作 (Induction Action)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InductionAction {
    Service,        // 正线运营
    Standby,        // 备车
    IblMaintenance, // 检修库检修
    IblCleaning,    // 检修库保洁
    OutOfService,   // 停用
}

impl InductionAction {
    /// 是否属于可载客动作 (硬阻断列车禁止进入)
    pub fn is_revenue_ready(&self) -> bool {
        matches!(self, InductionAction::Service | InductionAction::Standby)
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            InductionAction::Service => "SERVICE",
            InductionAction::Standby => "STANDBY",
            InductionAction::IblMaintenance => "IBL_MAINTENANCE",
            InductionAction::IblCleaning => "IBL_CLEANING",
            InductionAction::OutOfService => "OUT_OF_SERVICE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "SERVICE" => Some(InductionAction::Service),
            "STANDBY" => Some(InductionAction::Standby),
            "IBL_MAINTENANCE" => Some(InductionAction::IblMaintenance),
            "IBL_CLEANING" => Some(InductionAction::IblCleaning),
            "OUT_OF_SERVICE" => Some(InductionAction::OutOfService),
            _ => None,
        }
    }
}

impl fmt::Display for InductionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 列车当前状态 (Train Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrainStatus {
    InService,
    Standby,
    DepotReady,
    IblMaintenance,
    OutOfService,
}

impl TrainStatus {
    /// 应急替换候选: 仅备车与库内就绪列车
    pub fn is_replacement_candidate(&self) -> bool {
        matches!(self, TrainStatus::Standby | TrainStatus::DepotReady)
    }
}

impl fmt::Display for TrainStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrainStatus::InService => write!(f, "IN_SERVICE"),
            TrainStatus::Standby => write!(f, "STANDBY"),
            TrainStatus::DepotReady => write!(f, "DEPOT_READY"),
            TrainStatus::IblMaintenance => write!(f, "IBL_MAINTENANCE"),
            TrainStatus::OutOfService => write!(f, "OUT_OF_SERVICE"),
        }
    }
}

// ==========================================
// 评估器类型 (Evaluator Kind)
// ==========================================
// 顺序即报表顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorKind {
    Fitness,
    JobCard,
    Branding,
    Mileage,
    Cleaning,
    Stabling,
}

impl EvaluatorKind {
    pub const ALL: [EvaluatorKind; 6] = [
        EvaluatorKind::Fitness,
        EvaluatorKind::JobCard,
        EvaluatorKind::Branding,
        EvaluatorKind::Mileage,
        EvaluatorKind::Cleaning,
        EvaluatorKind::Stabling,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluatorKind::Fitness => "fitness",
            EvaluatorKind::JobCard => "job_card",
            EvaluatorKind::Branding => "branding",
            EvaluatorKind::Mileage => "mileage",
            EvaluatorKind::Cleaning => "cleaning",
            EvaluatorKind::Stabling => "stabling",
        }
    }
}

impl fmt::Display for EvaluatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==========================================
// 运营意图 (Operational Intent)
// ==========================================
// 评估器对列车去向的"拉力",冲突检测的依据
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationalIntent {
    Neutral,
    PreferService,
    PreferMaintenance,
    PreferCleaning,
    RequireService,     // 硬性要求上线 (如 SLA 即将违约)
    RequireMaintenance, // 硬性要求入库 (伴随 hard_block)
}

impl OperationalIntent {
    pub fn pulls_to_service(&self) -> bool {
        matches!(
            self,
            OperationalIntent::PreferService | OperationalIntent::RequireService
        )
    }

    pub fn pulls_to_depot(&self) -> bool {
        matches!(
            self,
            OperationalIntent::PreferMaintenance
                | OperationalIntent::PreferCleaning
                | OperationalIntent::RequireMaintenance
        )
    }
}

// ==========================================
// 冲突类型与严重度
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictKind {
    HardVsHard,
    HardVsSoft,
    SoftVsSoft,
    Resource,
}

impl ConflictKind {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConflictKind::HardVsHard => "HARD_VS_HARD",
            ConflictKind::HardVsSoft => "HARD_VS_SOFT",
            ConflictKind::SoftVsSoft => "SOFT_VS_SOFT",
            ConflictKind::Resource => "RESOURCE",
        }
    }
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// 顺序: Low < Medium < High < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConflictSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl ConflictSeverity {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ConflictSeverity::Low => "LOW",
            ConflictSeverity::Medium => "MEDIUM",
            ConflictSeverity::High => "HIGH",
            ConflictSeverity::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 错误分类 (Error Kind)
// ==========================================
// 红线: 除 NORMAL 模式 QuotaInfeasible 外,全部以结构化字段返回
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    DataIncomplete,
    EvaluatorTimeout,
    UnresolvableConflict,
    NoEligibleReplacement,
    DeadlineExceeded,
    QuotaInfeasible,
}

impl ErrorKind {
    /// 严重程度 (越大越严重)
    pub fn severity(&self) -> u8 {
        match self {
            ErrorKind::DataIncomplete => 0,
            ErrorKind::EvaluatorTimeout => 1,
            ErrorKind::DeadlineExceeded => 2,
            ErrorKind::UnresolvableConflict => 3,
            ErrorKind::NoEligibleReplacement => 4,
            ErrorKind::QuotaInfeasible => 5,
        }
    }

    /// 方案只带一个错误类型时保留更严重者
    pub fn escalate(current: Option<ErrorKind>, next: ErrorKind) -> Option<ErrorKind> {
        match current {
            Some(existing) if existing.severity() >= next.severity() => Some(existing),
            _ => Some(next),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::DataIncomplete => write!(f, "DATA_INCOMPLETE"),
            ErrorKind::EvaluatorTimeout => write!(f, "EVALUATOR_TIMEOUT"),
            ErrorKind::UnresolvableConflict => write!(f, "UNRESOLVABLE_CONFLICT"),
            ErrorKind::NoEligibleReplacement => write!(f, "NO_ELIGIBLE_REPLACEMENT"),
            ErrorKind::DeadlineExceeded => write!(f, "DEADLINE_EXCEEDED"),
            ErrorKind::QuotaInfeasible => write!(f, "QUOTA_INFEASIBLE"),
        }
    }
}

// ==========================================
// 应急状态机阶段 (Emergency Phase)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EmergencyPhase {
    Idle,
    QuickCheck,
    PlanReady,
    Crisis,
    Resolved,
}

impl EmergencyPhase {
    /// 等待审批的阶段
    pub fn is_awaiting_approval(&self) -> bool {
        matches!(self, EmergencyPhase::PlanReady | EmergencyPhase::Crisis)
    }

    pub fn to_db_str(&self) -> &'static str {
        match self {
            EmergencyPhase::Idle => "IDLE",
            EmergencyPhase::QuickCheck => "QUICK_CHECK",
            EmergencyPhase::PlanReady => "PLAN_READY",
            EmergencyPhase::Crisis => "CRISIS",
            EmergencyPhase::Resolved => "RESOLVED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "IDLE" => Some(EmergencyPhase::Idle),
            "QUICK_CHECK" => Some(EmergencyPhase::QuickCheck),
            "PLAN_READY" => Some(EmergencyPhase::PlanReady),
            "CRISIS" => Some(EmergencyPhase::Crisis),
            "RESOLVED" => Some(EmergencyPhase::Resolved),
            _ => None,
        }
    }
}

impl fmt::Display for EmergencyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_str())
    }
}

// ==========================================
// 故障严重度 (Fault Severity)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultSeverity {
    Minor,
    Major,
    Critical,
}

impl fmt::Display for FaultSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultSeverity::Minor => write!(f, "MINOR"),
            FaultSeverity::Major => write!(f, "MAJOR"),
            FaultSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_escalation_keeps_most_severe() {
        assert_eq!(
            ErrorKind::escalate(None, ErrorKind::DeadlineExceeded),
            Some(ErrorKind::DeadlineExceeded)
        );
        assert_eq!(
            ErrorKind::escalate(Some(ErrorKind::EvaluatorTimeout), ErrorKind::DeadlineExceeded),
            Some(ErrorKind::DeadlineExceeded)
        );
        assert_eq!(
            ErrorKind::escalate(Some(ErrorKind::QuotaInfeasible), ErrorKind::DeadlineExceeded),
            Some(ErrorKind::QuotaInfeasible)
        );
        assert_eq!(
            ErrorKind::escalate(Some(ErrorKind::UnresolvableConflict), ErrorKind::DeadlineExceeded),
            Some(ErrorKind::UnresolvableConflict)
        );
    }

    #[test]
    fn test_action_round_trip_through_db_str() {
        for action in [
            InductionAction::Service,
            InductionAction::Standby,
            InductionAction::IblMaintenance,
            InductionAction::IblCleaning,
            InductionAction::OutOfService,
        ] {
            assert_eq!(InductionAction::parse(action.to_db_str()), Some(action));
        }
        assert_eq!(InductionAction::parse("revenue"), None);
    }

    #[test]
    fn test_relaxed_modes() {
        assert!(!PlanningMode::Normal.is_relaxed());
        assert!(PlanningMode::Emergency.is_relaxed());
        assert!(PlanningMode::Crisis.is_relaxed());
        assert_eq!(PlanMode::from(PlanningMode::Crisis), PlanMode::Crisis);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ConflictSeverity::Critical > ConflictSeverity::High);
        assert!(ConflictSeverity::Medium > ConflictSeverity::Low);
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&InductionAction::IblCleaning).unwrap();
        assert_eq!(json, "\"IBL_CLEANING\"");
        let kind: ConflictKind = serde_json::from_str("\"HARD_VS_SOFT\"").unwrap();
        assert_eq!(kind, ConflictKind::HardVsSoft);
    }
}

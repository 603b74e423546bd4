// ==========================================
// 地铁列车夜间投运决策系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体与类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod conflict;
pub mod emergency;
pub mod evaluation;
pub mod plan;
pub mod scenario;
pub mod train;
pub mod types;

// 重导出核心类型
pub use conflict::{Conflict, ConflictResolution, ResolutionRule};
pub use emergency::{
    CrisisAction, CrisisPlan, CrisisState, EmergencyEvent, EmergencyInstance, EmergencyPlan,
    PhaseTransition, ReplacementCandidate, ResolutionOutcome,
};
pub use evaluation::{EvaluationResult, ResourceClaim, ResourceKind, NEUTRAL_SCORE};
pub use plan::{Assignment, AssignmentOverride, CategoryCounts, Plan, ServiceQuota};
pub use scenario::{ActionChange, PlanDiff, ScenarioPatch, WeightOverrides};
pub use train::{
    BrandingContract, CleaningFacts, CleaningStatus, FactGroup, FitnessCertificate, FitnessFacts,
    JobCard, JobPriority, JobStatus, MileageFacts, StablingFacts, TrainSnapshot,
};
pub use types::{
    ConflictKind, ConflictSeverity, EmergencyPhase, ErrorKind, EvaluatorKind, FaultSeverity,
    InductionAction, OperationalIntent, PlanMode, PlanStatus, PlanningMode, TrainStatus,
};

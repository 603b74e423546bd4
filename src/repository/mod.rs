// ==========================================
// 地铁列车夜间投运决策系统 - 数据仓储层
// ==========================================
// 职责: 方案、冲突、应急记录的 SQLite 持久化
// 红线: Repository 不含业务逻辑
// 红线: 决策核心不依赖本层
// ==========================================

pub mod conflict_log_repo;
pub mod emergency_log_repo;
pub mod error;
pub mod plan_repo;

pub use conflict_log_repo::ConflictLogRepository;
pub use emergency_log_repo::EmergencyLogRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use plan_repo::{ApprovalRecord, PlanRepository};

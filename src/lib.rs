// ==========================================
// 地铁列车夜间投运决策系统 - 核心库
// ==========================================
// 技术栈: Rust + tokio + SQLite
// 系统定位: 决策支持系统 (人工最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 投运决策规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 阶段耗时
pub mod perf;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    ConflictKind, ConflictSeverity, EmergencyPhase, ErrorKind, EvaluatorKind, FaultSeverity,
    InductionAction, PlanMode, PlanStatus, PlanningMode, TrainStatus,
};

// 领域实体
pub use domain::{
    Assignment, Conflict, CrisisPlan, EmergencyEvent, EmergencyInstance, EmergencyPlan,
    EvaluationResult, Plan, PlanDiff, ScenarioPatch, ServiceQuota, TrainSnapshot,
};

// 引擎
pub use engine::{
    CompositeRanker, ConflictDetector, ConflictResolver, CrisisReoptimizer, EmergencyReplanner,
    EngineError, InductionPipeline, PipelineRequest, ScenarioEngine,
};

// API
pub use api::{ApiError, InductionApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "地铁列车夜间投运决策系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}

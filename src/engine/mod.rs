// ==========================================
// 地铁列车夜间投运决策系统 - 引擎层
// ==========================================
// 依据: 决策引擎设计 - 4 引擎体系
// 流水线: 评估器 → 冲突检测 → 冲突消解 → 综合排名
// ==========================================
// 职责: 实现投运决策规则,不拼 SQL
// 红线: Engine 不拼 SQL, 所有结论必须输出 reason
// ==========================================

pub mod cancel;
pub mod composite_ranker;
pub mod conflict_detector;
pub mod conflict_resolver;
pub mod crisis;
pub mod emergency;
pub mod error;
pub mod evaluator;
pub mod evaluators;
pub mod events;
pub mod pipeline;
pub mod provider;
pub mod readiness;
pub mod scenario;
pub mod weights;

#[cfg(test)]
mod test_fleet;

// 重导出核心引擎
pub use cancel::{cancel_pair, CancelHandle, CancelToken};
pub use composite_ranker::{CompositeRanker, ForcedStates, RankRequest};
pub use conflict_detector::ConflictDetector;
pub use conflict_resolver::{ConflictResolver, ResolvedTrain};
pub use crisis::{derive_critical_routes, CrisisReoptimizer};
pub use emergency::{CrisisFleet, EmergencyReplanner};
pub use error::{EngineError, EngineResult};
pub use evaluator::{EvaluationContext, Evaluator, ThresholdSet};
pub use evaluators::standard_evaluators;
pub use events::{
    InductionEvent, InductionEventPublisher, InductionEventType, NoOpEventPublisher,
    OptionalEventPublisher, RecordingEventPublisher,
};
pub use pipeline::{InductionPipeline, PipelineRequest};
pub use provider::{ProviderError, StaticSnapshotProvider, TrainSnapshotProvider};
pub use readiness::estimate_readiness_minutes;
pub use scenario::{diff_plans, ScenarioEngine, ScenarioOutcome};
pub use weights::WeightTable;

// ==========================================
// 地铁列车夜间投运决策系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 降级类问题 (数据缺失/超时/人工冲突) 不走错误通道,记录在方案上
// ==========================================

use crate::engine::provider::ProviderError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    // ===== 规划错误 =====
    #[error("配额不可行: 需要 {required} 列上线, 仅 {eligible} 列合格")]
    QuotaInfeasible { required: usize, eligible: usize },

    #[error("运行已取消")]
    Cancelled,

    // ===== 依赖错误 =====
    #[error("快照数据源错误: {0}")]
    Provider(#[from] ProviderError),

    #[error("配置读取失败: {0}")]
    Config(String),

    // ===== 应急/场景错误 =====
    #[error("基线方案不可用: {0}")]
    BaselineUnavailable(String),

    #[error("应急实例不存在: {0}")]
    EmergencyNotFound(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("内部错误: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

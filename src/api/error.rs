// ==========================================
// 地铁列车夜间投运决策系统 - API层错误类型
// ==========================================
// 职责: 将仓储层与引擎层错误转换为带显式原因的业务错误
// ==========================================

use crate::config::ConfigResult;
use crate::engine::error::EngineError;
use crate::engine::provider::ProviderError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    /// 硬阻断列车禁止进入可载客动作
    #[error("硬阻断列车不可投运: train_id={train_id}, action={action}")]
    HardBlockViolation { train_id: String, action: String },

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    // ==========================================
    // 引擎错误
    // ==========================================
    #[error("正线配额不可满足: 需要 {required} 列,合格 {eligible} 列")]
    QuotaInfeasible { required: usize, eligible: usize },

    #[error("运行已取消")]
    Cancelled,

    #[error("快照源不可用: {0}")]
    SnapshotUnavailable(String),

    #[error("配置错误: {0}")]
    ConfigError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => ApiError::DatabaseTransactionError(msg),
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::Serialization(e) => ApiError::InternalError(format!("序列化失败: {}", e)),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::DatabaseError(format!("字段{}取值错误: {}", field, message))
            }
            RepositoryError::Other(e) => ApiError::Other(e),
        }
    }
}

// ==========================================
// 从 EngineError 转换
// ==========================================
impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::QuotaInfeasible { required, eligible } => {
                ApiError::QuotaInfeasible { required, eligible }
            }
            EngineError::Cancelled => ApiError::Cancelled,
            EngineError::Provider(e) => ApiError::from(e),
            EngineError::Config(msg) => ApiError::ConfigError(msg),
            EngineError::BaselineUnavailable(msg) => ApiError::NotFound(format!("基线方案: {}", msg)),
            EngineError::EmergencyNotFound(id) => ApiError::NotFound(format!("应急事件(id={})不存在", id)),
            EngineError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            EngineError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable(msg) => ApiError::SnapshotUnavailable(msg),
            ProviderError::UnknownTrain(id) => ApiError::NotFound(format!("列车(id={})不存在", id)),
        }
    }
}

/// 配置读取错误 (Box<dyn Error>) 统一归为配置错误
pub(crate) fn config_error<T>(result: ConfigResult<T>) -> ApiResult<T> {
    result.map_err(|e| ApiError::ConfigError(e.to_string()))
}

/// API层Result类型
pub type ApiResult<T> = Result<T, ApiError>;

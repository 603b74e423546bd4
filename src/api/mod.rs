// ==========================================
// 地铁列车夜间投运决策系统 - API 层
// ==========================================
// 职责: 对外业务接口,组合引擎与仓储
// 红线: 所有错误必须带显式原因
// ==========================================

pub mod error;
pub mod induction_api;

pub use error::{ApiError, ApiResult};
pub use induction_api::InductionApi;

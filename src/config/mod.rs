// ==========================================
// 地铁列车夜间投运决策系统 - 配置层
// ==========================================
// 职责: 规划参数管理,支持 config_kv 覆写
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod planning_config;
pub mod planning_config_trait;
pub mod weight_profile;

pub use config_manager::{config_keys, ConfigManager};
pub use planning_config::{CostModel, EmergencyPolicy, PlanningConfig, TimeBudgets};
pub use planning_config_trait::{ConfigResult, PlanningConfigReader, StaticConfigReader};
pub use weight_profile::{parse_weight_profile, weight_profile_key};

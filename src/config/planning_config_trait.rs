// ==========================================
// 地铁列车夜间投运决策系统 - 规划配置读取 Trait
// ==========================================
// 职责: 定义决策引擎所需的配置读取接口 (不包含实现)
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use crate::config::planning_config::{CostModel, EmergencyPolicy, PlanningConfig, TimeBudgets};
use crate::domain::plan::ServiceQuota;
use crate::domain::scenario::WeightOverrides;
use crate::domain::types::PlanningMode;
use async_trait::async_trait;
use std::collections::HashMap;
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// PlanningConfigReader Trait
// ==========================================
// 实现者: ConfigManager (从 config_kv 表读取)
#[async_trait]
pub trait PlanningConfigReader: Send + Sync {
    // ===== 配额 =====

    /// 获取默认运营配额
    ///
    /// # 默认值
    /// - SERVICE 18, STANDBY 2
    async fn get_service_quota(&self) -> ConfigResult<ServiceQuota>;

    // ===== 冲突阈值 =====

    /// SOFT_VS_SOFT 分差阈值 (默认 40)
    async fn get_soft_conflict_delta(&self) -> ConfigResult<f64>;

    /// HARD_VS_SOFT 高紧急阈值 (默认 90)
    async fn get_high_urgency_threshold(&self) -> ConfigResult<f64>;

    // ===== 时间与评估参数 =====

    /// 决策窗口小时数 (默认 24)
    async fn get_decision_window_hours(&self) -> ConfigResult<i64>;

    /// 广告合同硬性上线窗口天数 (默认 1)
    async fn get_mandate_window_days(&self) -> ConfigResult<i64>;

    /// 日均运营里程 (默认 200 km)
    async fn get_daily_km(&self) -> ConfigResult<f64>;

    /// 保洁到期分数线 (默认 50)
    async fn get_cleaning_due_score(&self) -> ConfigResult<f64>;

    /// 时间预算 (软超时 45s, 应急 5min, 危机 3min)
    async fn get_time_budgets(&self) -> ConfigResult<TimeBudgets>;

    // ===== 冲突裁决 =====

    async fn get_cost_model(&self) -> ConfigResult<CostModel>;

    // ===== 应急 =====

    async fn get_emergency_policy(&self) -> ConfigResult<EmergencyPolicy>;

    /// 已配置的关键线路 (空表示按在线车辆分布推导)
    async fn get_critical_routes(&self) -> ConfigResult<Vec<String>>;

    // ===== 权重 =====

    /// 获取指定模式的权重覆写 (config_kv: weight_profile/{MODE})
    ///
    /// # 返回
    /// - None: 使用内置权重表
    async fn get_weight_overrides(&self, mode: PlanningMode) -> ConfigResult<Option<WeightOverrides>>;

    /// 读取整份配置快照
    ///
    /// # 逻辑
    /// 逐项读取上述配置,组装为单次运行使用的 PlanningConfig
    async fn load_planning_config(&self) -> ConfigResult<PlanningConfig> {
        let mut weight_profiles = HashMap::new();
        for mode in [PlanningMode::Normal, PlanningMode::Emergency, PlanningMode::Crisis] {
            if let Some(overrides) = self.get_weight_overrides(mode).await? {
                weight_profiles.insert(mode, overrides);
            }
        }

        Ok(PlanningConfig {
            quota: self.get_service_quota().await?,
            soft_conflict_delta: self.get_soft_conflict_delta().await?,
            high_urgency_threshold: self.get_high_urgency_threshold().await?,
            decision_window_hours: self.get_decision_window_hours().await?,
            mandate_window_days: self.get_mandate_window_days().await?,
            daily_km: self.get_daily_km().await?,
            cleaning_due_score: self.get_cleaning_due_score().await?,
            budgets: self.get_time_budgets().await?,
            cost_model: self.get_cost_model().await?,
            emergency: self.get_emergency_policy().await?,
            critical_routes: self.get_critical_routes().await?,
            weight_profiles,
        })
    }
}

// ==========================================
// StaticConfigReader - 固定配置 (嵌入式使用/测试)
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct StaticConfigReader {
    config: PlanningConfig,
}

impl StaticConfigReader {
    pub fn new(config: PlanningConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl PlanningConfigReader for StaticConfigReader {
    async fn get_service_quota(&self) -> ConfigResult<ServiceQuota> {
        Ok(self.config.quota)
    }

    async fn get_soft_conflict_delta(&self) -> ConfigResult<f64> {
        Ok(self.config.soft_conflict_delta)
    }

    async fn get_high_urgency_threshold(&self) -> ConfigResult<f64> {
        Ok(self.config.high_urgency_threshold)
    }

    async fn get_decision_window_hours(&self) -> ConfigResult<i64> {
        Ok(self.config.decision_window_hours)
    }

    async fn get_mandate_window_days(&self) -> ConfigResult<i64> {
        Ok(self.config.mandate_window_days)
    }

    async fn get_daily_km(&self) -> ConfigResult<f64> {
        Ok(self.config.daily_km)
    }

    async fn get_cleaning_due_score(&self) -> ConfigResult<f64> {
        Ok(self.config.cleaning_due_score)
    }

    async fn get_time_budgets(&self) -> ConfigResult<TimeBudgets> {
        Ok(self.config.budgets)
    }

    async fn get_cost_model(&self) -> ConfigResult<CostModel> {
        Ok(self.config.cost_model)
    }

    async fn get_emergency_policy(&self) -> ConfigResult<EmergencyPolicy> {
        Ok(self.config.emergency)
    }

    async fn get_critical_routes(&self) -> ConfigResult<Vec<String>> {
        Ok(self.config.critical_routes.clone())
    }

    async fn get_weight_overrides(&self, mode: PlanningMode) -> ConfigResult<Option<WeightOverrides>> {
        Ok(self.config.weight_profiles.get(&mode).cloned())
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 规划配置快照
// ==========================================
// 职责: 单次运行使用的全部可调参数 (运行开始时读取一次)
// 红线: 运行期间配置不可变
// ==========================================

use crate::domain::plan::ServiceQuota;
use crate::domain::scenario::WeightOverrides;
use crate::domain::types::PlanningMode;
use std::collections::HashMap;
use std::time::Duration;

// ==========================================
// TimeBudgets - 时间预算
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeBudgets {
    pub evaluator_soft_timeout: Duration, // 单评估器软超时
    pub normal_deadline: Duration,        // NORMAL/SCENARIO 整体截止
    pub emergency_deadline: Duration,     // QUICK_CHECK 硬截止
    pub crisis_deadline: Duration,        // CRISIS 全网重排硬截止
}

impl TimeBudgets {
    pub fn deadline_for(&self, mode: PlanningMode) -> Duration {
        match mode {
            PlanningMode::Normal => self.normal_deadline,
            PlanningMode::Emergency => self.emergency_deadline,
            PlanningMode::Crisis => self.crisis_deadline,
        }
    }
}

impl Default for TimeBudgets {
    fn default() -> Self {
        Self {
            evaluator_soft_timeout: Duration::from_secs(45),
            normal_deadline: Duration::from_secs(10 * 60),
            emergency_deadline: Duration::from_secs(5 * 60),
            crisis_deadline: Duration::from_secs(3 * 60),
        }
    }
}

// ==========================================
// CostModel - 软冲突成本模型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub maintenance_cost_per_point: f64,  // 推迟维修的每分代价
    pub cleaning_cost_per_point: f64,     // 推迟保洁的每分代价
    pub service_miss_cost_per_point: f64, // 错过上线的每分代价 (SLA/广告)
    pub losing_weight_factor: f64,        // 败方权重乘数
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            maintenance_cost_per_point: 1.5,
            cleaning_cost_per_point: 0.5,
            service_miss_cost_per_point: 1.0,
            losing_weight_factor: 0.5,
        }
    }
}

// ==========================================
// EmergencyPolicy - 应急策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmergencyPolicy {
    pub cascade_window_minutes: i64, // 连锁故障窗口
    pub cascade_threshold: usize,    // 窗口内退出数达到即进入 CRISIS
    pub approval_timeout_minutes: i64,
    pub fallback_options: usize,
    pub critical_route_count: usize, // 未配置线路优先级时按在线车数取前 K 条
}

impl Default for EmergencyPolicy {
    fn default() -> Self {
        Self {
            cascade_window_minutes: 30,
            cascade_threshold: 3,
            approval_timeout_minutes: 15,
            fallback_options: 3,
            critical_route_count: 2,
        }
    }
}

// ==========================================
// PlanningConfig - 运行配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningConfig {
    pub quota: ServiceQuota,
    pub soft_conflict_delta: f64,    // SOFT_VS_SOFT 分差阈值
    pub high_urgency_threshold: f64, // HARD_VS_SOFT 高紧急阈值
    pub decision_window_hours: i64,  // 时间规则的决策窗口
    pub mandate_window_days: i64,    // 广告合同硬性上线窗口
    pub daily_km: f64,               // 日均运营里程
    pub cleaning_due_score: f64,     // 保洁分低于此值视为需保洁
    pub budgets: TimeBudgets,
    pub cost_model: CostModel,
    pub emergency: EmergencyPolicy,
    pub critical_routes: Vec<String>, // 已配置的关键线路 (空 = 自动推导)
    pub weight_profiles: HashMap<PlanningMode, WeightOverrides>,
}

impl PlanningConfig {
    pub fn weight_overrides_for(&self, mode: PlanningMode) -> Option<&WeightOverrides> {
        self.weight_profiles.get(&mode)
    }
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            quota: ServiceQuota::new(18, 2),
            soft_conflict_delta: 40.0,
            high_urgency_threshold: 90.0,
            decision_window_hours: 24,
            mandate_window_days: 1,
            daily_km: 200.0,
            cleaning_due_score: 50.0,
            budgets: TimeBudgets::default(),
            cost_model: CostModel::default(),
            emergency: EmergencyPolicy::default(),
            critical_routes: Vec::new(),
            weight_profiles: HashMap::new(),
        }
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::planning_config::{CostModel, EmergencyPolicy, PlanningConfig, TimeBudgets};
use crate::config::planning_config_trait::{ConfigResult, PlanningConfigReader};
use crate::config::weight_profile::{parse_weight_profile, validate_weight_overrides, weight_profile_key};
use crate::db::open_sqlite_connection;
use crate::domain::plan::ServiceQuota;
use crate::domain::scenario::WeightOverrides;
use crate::domain::types::PlanningMode;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明: 会对传入连接再次应用统一 PRAGMA (幂等)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值 (scope_id='global')
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取并解析数值配置,解析失败时告警并使用默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy + std::fmt::Display,
    {
        let raw = match self.get_config_value(key)? {
            Some(v) => v,
            None => return Ok(default),
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(
                    config_key = key,
                    raw_value = %raw,
                    default = %default,
                    "配置值格式错误,使用默认值"
                );
                Ok(default)
            }
        }
    }

    /// 写入 global 配置 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at)
             VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 保存模式权重配置档
    pub fn set_weight_overrides(
        &self,
        mode: PlanningMode,
        overrides: &WeightOverrides,
    ) -> ConfigResult<()> {
        validate_weight_overrides(overrides)?;
        let raw = serde_json::to_string(overrides)?;
        self.set_global_config_value(&weight_profile_key(mode), &raw)
    }

    /// 获取所有 global 配置的快照 (JSON 格式,方案审计用)
    pub fn get_config_snapshot(&self) -> ConfigResult<String> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut config_map: BTreeMap<String, String> = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(serde_json::to_string(&config_map)?)
    }
}

// ==========================================
// PlanningConfigReader Trait 实现
// ==========================================
#[async_trait]
impl PlanningConfigReader for ConfigManager {
    async fn get_service_quota(&self) -> ConfigResult<ServiceQuota> {
        let d = PlanningConfig::default().quota;
        Ok(ServiceQuota::new(
            self.get_parsed_or_default(config_keys::SERVICE_QUOTA, d.service_target)?,
            self.get_parsed_or_default(config_keys::STANDBY_QUOTA, d.standby_target)?,
        ))
    }

    async fn get_soft_conflict_delta(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::SOFT_CONFLICT_DELTA, 40.0)
    }

    async fn get_high_urgency_threshold(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::HIGH_URGENCY_THRESHOLD, 90.0)
    }

    async fn get_decision_window_hours(&self) -> ConfigResult<i64> {
        self.get_parsed_or_default(config_keys::DECISION_WINDOW_HOURS, 24)
    }

    async fn get_mandate_window_days(&self) -> ConfigResult<i64> {
        self.get_parsed_or_default(config_keys::MANDATE_WINDOW_DAYS, 1)
    }

    async fn get_daily_km(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::DAILY_KM, 200.0)
    }

    async fn get_cleaning_due_score(&self) -> ConfigResult<f64> {
        self.get_parsed_or_default(config_keys::CLEANING_DUE_SCORE, 50.0)
    }

    async fn get_time_budgets(&self) -> ConfigResult<TimeBudgets> {
        let d = TimeBudgets::default();
        let ms = |key: &str, default: Duration| -> ConfigResult<Duration> {
            let v = self.get_parsed_or_default(key, default.as_millis() as u64)?;
            Ok(Duration::from_millis(v))
        };
        Ok(TimeBudgets {
            evaluator_soft_timeout: ms(config_keys::EVALUATOR_SOFT_TIMEOUT_MS, d.evaluator_soft_timeout)?,
            normal_deadline: ms(config_keys::NORMAL_DEADLINE_MS, d.normal_deadline)?,
            emergency_deadline: ms(config_keys::EMERGENCY_DEADLINE_MS, d.emergency_deadline)?,
            crisis_deadline: ms(config_keys::CRISIS_DEADLINE_MS, d.crisis_deadline)?,
        })
    }

    async fn get_cost_model(&self) -> ConfigResult<CostModel> {
        let d = CostModel::default();
        Ok(CostModel {
            maintenance_cost_per_point: self
                .get_parsed_or_default(config_keys::MAINTENANCE_COST_PER_POINT, d.maintenance_cost_per_point)?,
            cleaning_cost_per_point: self
                .get_parsed_or_default(config_keys::CLEANING_COST_PER_POINT, d.cleaning_cost_per_point)?,
            service_miss_cost_per_point: self
                .get_parsed_or_default(config_keys::SERVICE_MISS_COST_PER_POINT, d.service_miss_cost_per_point)?,
            losing_weight_factor: self
                .get_parsed_or_default(config_keys::LOSING_WEIGHT_FACTOR, d.losing_weight_factor)?,
        })
    }

    async fn get_emergency_policy(&self) -> ConfigResult<EmergencyPolicy> {
        let d = EmergencyPolicy::default();
        Ok(EmergencyPolicy {
            cascade_window_minutes: self
                .get_parsed_or_default(config_keys::CASCADE_WINDOW_MINUTES, d.cascade_window_minutes)?,
            cascade_threshold: self.get_parsed_or_default(config_keys::CASCADE_THRESHOLD, d.cascade_threshold)?,
            approval_timeout_minutes: self
                .get_parsed_or_default(config_keys::APPROVAL_TIMEOUT_MINUTES, d.approval_timeout_minutes)?,
            fallback_options: self.get_parsed_or_default(config_keys::FALLBACK_OPTIONS, d.fallback_options)?,
            critical_route_count: self
                .get_parsed_or_default(config_keys::CRITICAL_ROUTE_COUNT, d.critical_route_count)?,
        })
    }

    async fn get_critical_routes(&self) -> ConfigResult<Vec<String>> {
        let value = self.get_config_value(config_keys::CRITICAL_ROUTES)?.unwrap_or_default();
        Ok(value
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect())
    }

    async fn get_weight_overrides(&self, mode: PlanningMode) -> ConfigResult<Option<WeightOverrides>> {
        let key = weight_profile_key(mode);
        let raw = match self.get_config_value(&key)? {
            Some(v) => v,
            None => return Ok(None),
        };
        match parse_weight_profile(&raw) {
            Ok(overrides) => Ok(Some(overrides)),
            Err(msg) => {
                tracing::warn!(config_key = %key, error = %msg, "权重配置档无效,使用内置权重表");
                Ok(None)
            }
        }
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 配额
    pub const SERVICE_QUOTA: &str = "service_quota";
    pub const STANDBY_QUOTA: &str = "standby_quota";

    // 冲突阈值
    pub const SOFT_CONFLICT_DELTA: &str = "soft_conflict_delta";
    pub const HIGH_URGENCY_THRESHOLD: &str = "high_urgency_threshold";

    // 评估参数
    pub const DECISION_WINDOW_HOURS: &str = "decision_window_hours";
    pub const MANDATE_WINDOW_DAYS: &str = "mandate_window_days";
    pub const DAILY_KM: &str = "daily_km";
    pub const CLEANING_DUE_SCORE: &str = "cleaning_due_score";

    // 时间预算
    pub const EVALUATOR_SOFT_TIMEOUT_MS: &str = "evaluator_soft_timeout_ms";
    pub const NORMAL_DEADLINE_MS: &str = "normal_deadline_ms";
    pub const EMERGENCY_DEADLINE_MS: &str = "emergency_deadline_ms";
    pub const CRISIS_DEADLINE_MS: &str = "crisis_deadline_ms";

    // 成本模型
    pub const MAINTENANCE_COST_PER_POINT: &str = "maintenance_cost_per_point";
    pub const CLEANING_COST_PER_POINT: &str = "cleaning_cost_per_point";
    pub const SERVICE_MISS_COST_PER_POINT: &str = "service_miss_cost_per_point";
    pub const LOSING_WEIGHT_FACTOR: &str = "losing_weight_factor";

    // 应急
    pub const CASCADE_WINDOW_MINUTES: &str = "cascade_window_minutes";
    pub const CASCADE_THRESHOLD: &str = "cascade_threshold";
    pub const APPROVAL_TIMEOUT_MINUTES: &str = "approval_timeout_minutes";
    pub const FALLBACK_OPTIONS: &str = "fallback_options";
    pub const CRITICAL_ROUTE_COUNT: &str = "critical_route_count";
    pub const CRITICAL_ROUTES: &str = "critical_routes";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use crate::domain::types::EvaluatorKind;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_table_empty() {
        let mgr = manager();
        let cfg = mgr.load_planning_config().await.unwrap();
        assert_eq!(cfg, PlanningConfig::default());
    }

    #[tokio::test]
    async fn test_overrides_are_read() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::SERVICE_QUOTA, "12").unwrap();
        mgr.set_global_config_value(config_keys::EMERGENCY_DEADLINE_MS, "1500").unwrap();
        mgr.set_global_config_value(config_keys::CRITICAL_ROUTES, "R1, R4,").unwrap();

        let cfg = mgr.load_planning_config().await.unwrap();
        assert_eq!(cfg.quota.service_target, 12);
        assert_eq!(cfg.quota.standby_target, 2);
        assert_eq!(cfg.budgets.emergency_deadline, Duration::from_millis(1500));
        assert_eq!(cfg.critical_routes, vec!["R1".to_string(), "R4".to_string()]);
    }

    #[tokio::test]
    async fn test_malformed_value_falls_back_to_default() {
        let mgr = manager();
        mgr.set_global_config_value(config_keys::SOFT_CONFLICT_DELTA, "forty").unwrap();
        assert_eq!(mgr.get_soft_conflict_delta().await.unwrap(), 40.0);
    }

    #[tokio::test]
    async fn test_weight_profile_round_trip() {
        let mgr = manager();
        let mut overrides = WeightOverrides::default();
        overrides.evaluators.insert(EvaluatorKind::Branding, 0.35);
        mgr.set_weight_overrides(PlanningMode::Normal, &overrides).unwrap();

        let loaded = mgr.get_weight_overrides(PlanningMode::Normal).await.unwrap();
        assert_eq!(loaded, Some(overrides));
        assert!(mgr.get_weight_overrides(PlanningMode::Crisis).await.unwrap().is_none());

        let snapshot = mgr.get_config_snapshot().unwrap();
        assert!(snapshot.contains("weight_profile/NORMAL"));
    }
}

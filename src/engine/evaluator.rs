// ==========================================
// 地铁列车夜间投运决策系统 - 评估器契约与阈值表
// ==========================================
// 依据: 决策引擎设计 - 4.1 Evaluators
// 职责: 定义 Evaluator trait、运行上下文、按模式选择的阈值表
// 红线: 评估器是纯函数,无 I/O、无状态、结果确定
// 红线: 模式只通过阈值表选择生效,评估器内部不再分支
// ==========================================

use crate::config::PlanningConfig;
use crate::domain::evaluation::EvaluationResult;
use crate::domain::train::TrainSnapshot;
use crate::domain::types::{EvaluatorKind, PlanningMode};
use chrono::{DateTime, Duration, NaiveDate, Utc};

// ==========================================
// Evaluator Trait
// ==========================================
pub trait Evaluator: Send + Sync {
    fn kind(&self) -> EvaluatorKind;

    /// 评估单车
    ///
    /// # 参数
    /// - snapshot: 列车快照 (只读)
    /// - ctx: 运行上下文 (模式、时间、车队统计、阈值表)
    fn evaluate(&self, snapshot: &TrainSnapshot, ctx: &EvaluationContext) -> EvaluationResult;
}

// ==========================================
// 阈值表
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitnessThresholds {
    pub block_below_hours: f64, // 剩余有效期低于此值硬阻断
    pub full_score_hours: f64,  // 剩余有效期达到此值满分
    pub floor_score: f64,       // 阻断线处的最低分
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobCardThresholds {
    pub max_critical: usize,
    pub critical_score: f64,
    pub high_score: f64,
    pub minor_score: f64,
    pub overdue_penalty: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MileageThresholds {
    pub flat_score: Option<f64>, // Some => 不做均衡,统一打分
    pub capped_score: f64,       // 临近里程检修时的封顶分
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CleaningThresholds {
    pub week_score: f64,
    pub fortnight_score: f64,
    pub overdue_score: f64,
    pub recent_floor: Option<f64>, // 2 天内保洁的保底分
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StablingThresholds {
    pub relaxed: bool,             // 应急: 只分三档,不惩罚阻挡
    pub blocking_score: f64,
}

/// 一种模式的完整阈值表
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSet {
    pub fitness: FitnessThresholds,
    pub job_cards: JobCardThresholds,
    pub mileage: MileageThresholds,
    pub cleaning: CleaningThresholds,
    pub stabling: StablingThresholds,
}

impl ThresholdSet {
    pub const NORMAL: ThresholdSet = ThresholdSet {
        fitness: FitnessThresholds {
            block_below_hours: 24.0,
            full_score_hours: 72.0,
            floor_score: 40.0,
        },
        job_cards: JobCardThresholds {
            max_critical: 2,
            critical_score: 40.0,
            high_score: 70.0,
            minor_score: 90.0,
            overdue_penalty: 10.0,
        },
        mileage: MileageThresholds {
            flat_score: None,
            capped_score: 20.0,
        },
        cleaning: CleaningThresholds {
            week_score: 75.0,
            fortnight_score: 50.0,
            overdue_score: 30.0,
            recent_floor: None,
        },
        stabling: StablingThresholds {
            relaxed: false,
            blocking_score: 30.0,
        },
    };

    /// EMERGENCY 与 CRISIS 共用
    pub const RELAXED: ThresholdSet = ThresholdSet {
        fitness: FitnessThresholds {
            block_below_hours: 24.0,
            full_score_hours: 48.0,
            floor_score: 40.0,
        },
        job_cards: JobCardThresholds {
            max_critical: 3,
            critical_score: 40.0,
            high_score: 70.0,
            minor_score: 90.0,
            overdue_penalty: 10.0,
        },
        mileage: MileageThresholds {
            flat_score: Some(50.0),
            capped_score: 20.0,
        },
        cleaning: CleaningThresholds {
            week_score: 50.0,
            fortnight_score: 30.0,
            overdue_score: 20.0,
            recent_floor: Some(50.0),
        },
        stabling: StablingThresholds {
            relaxed: true,
            blocking_score: 30.0,
        },
    };

    pub fn for_mode(mode: PlanningMode) -> ThresholdSet {
        if mode.is_relaxed() {
            Self::RELAXED
        } else {
            Self::NORMAL
        }
    }
}

// ==========================================
// EvaluationContext - 单次运行上下文
// ==========================================
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    pub mode: PlanningMode,
    pub decision_date: NaiveDate,
    pub as_of: DateTime<Utc>,
    pub decision_window: Duration,
    pub mandate_window: Duration,
    pub daily_km: f64,
    pub cleaning_due_score: f64,
    pub fleet_avg_km: Option<f64>,
    pub thresholds: ThresholdSet,
}

impl EvaluationContext {
    /// 按模式与配置构造上下文
    pub fn new(
        mode: PlanningMode,
        decision_date: NaiveDate,
        as_of: DateTime<Utc>,
        config: &PlanningConfig,
        fleet_avg_km: Option<f64>,
    ) -> Self {
        Self {
            mode,
            decision_date,
            as_of,
            decision_window: Duration::hours(config.decision_window_hours),
            mandate_window: Duration::days(config.mandate_window_days),
            daily_km: config.daily_km,
            cleaning_due_score: config.cleaning_due_score,
            fleet_avg_km,
            thresholds: ThresholdSet::for_mode(mode),
        }
    }

    /// 截止时间是否落在决策窗口内
    pub fn within_window(&self, deadline: DateTime<Utc>) -> bool {
        deadline <= self.as_of + self.decision_window
    }

    /// 距离某时刻的小时数 (可为负)
    pub fn hours_until(&self, at: DateTime<Utc>) -> f64 {
        (at - self.as_of).num_seconds() as f64 / 3600.0
    }

    /// 距离某时刻的天数 (可为负)
    pub fn days_until(&self, at: DateTime<Utc>) -> f64 {
        self.hours_until(at) / 24.0
    }
}

/// 车队平均累计里程 (仅统计可用的里程事实)
pub fn fleet_average_km(snapshots: &[TrainSnapshot]) -> Option<f64> {
    let kms: Vec<f64> = snapshots
        .iter()
        .filter_map(|s| s.mileage_facts().map(|m| m.cumulative_km))
        .collect();
    if kms.is_empty() {
        return None;
    }
    Some(kms.iter().sum::<f64>() / kms.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::train::MileageFacts;
    use crate::domain::types::TrainStatus;

    #[test]
    fn test_threshold_table_selection() {
        assert_eq!(ThresholdSet::for_mode(PlanningMode::Normal), ThresholdSet::NORMAL);
        assert_eq!(ThresholdSet::for_mode(PlanningMode::Emergency), ThresholdSet::RELAXED);
        assert_eq!(ThresholdSet::for_mode(PlanningMode::Crisis), ThresholdSet::RELAXED);
    }

    #[test]
    fn test_fleet_average_ignores_missing_mileage() {
        let mut a = TrainSnapshot::new("T01", TrainStatus::DepotReady);
        a.mileage = Some(MileageFacts {
            cumulative_km: 100.0,
            km_to_next_maintenance: 1000.0,
        });
        let mut b = TrainSnapshot::new("T02", TrainStatus::DepotReady);
        b.mileage = Some(MileageFacts {
            cumulative_km: 300.0,
            km_to_next_maintenance: 1000.0,
        });
        let c = TrainSnapshot::new("T03", TrainStatus::DepotReady);

        assert_eq!(fleet_average_km(&[a, b, c]), Some(200.0));
        assert_eq!(fleet_average_km(&[]), None);
    }

    #[test]
    fn test_window_check() {
        let as_of = Utc::now();
        let ctx = EvaluationContext::new(
            PlanningMode::Normal,
            as_of.date_naive(),
            as_of,
            &PlanningConfig::default(),
            None,
        );
        assert!(ctx.within_window(as_of + Duration::hours(23)));
        assert!(!ctx.within_window(as_of + Duration::hours(25)));
        assert!((ctx.hours_until(as_of + Duration::minutes(90)) - 1.5).abs() < 1e-9);
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 出车就绪时间估算
// ==========================================
// 规则: 基础 10 分钟 + 调车时间 (未知按 10 分钟) + 未完成保洁 5 分钟
// ==========================================

use crate::domain::train::{CleaningStatus, TrainSnapshot};

const BASE_MINUTES: u32 = 10;
const DEFAULT_SHUNTING_MINUTES: u32 = 10;
const CLEANING_PENDING_MINUTES: u32 = 5;

/// 估算列车从当前位置到可投运的分钟数
pub fn estimate_readiness_minutes(snapshot: &TrainSnapshot) -> u32 {
    let shunting = snapshot
        .stabling_facts()
        .and_then(|s| s.shunting_time_min)
        .unwrap_or(DEFAULT_SHUNTING_MINUTES);

    let cleaning = match snapshot.cleaning_facts() {
        Some(c) if c.status != CleaningStatus::Completed => CLEANING_PENDING_MINUTES,
        _ => 0,
    };

    BASE_MINUTES + shunting + cleaning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::train::{CleaningFacts, StablingFacts};
    use crate::domain::types::TrainStatus;

    #[test]
    fn test_defaults_without_facts() {
        let t = TrainSnapshot::new("T01", TrainStatus::Standby);
        assert_eq!(estimate_readiness_minutes(&t), 20);
    }

    #[test]
    fn test_shunting_and_pending_cleaning() {
        let mut t = TrainSnapshot::new("T01", TrainStatus::Standby);
        t.stabling = Some(StablingFacts {
            bay: "B1".to_string(),
            position: 1,
            shunting_distance_m: Some(120.0),
            shunting_time_min: Some(4),
            blocking_other_trains: false,
        });
        assert_eq!(estimate_readiness_minutes(&t), 14);

        t.cleaning = Some(CleaningFacts {
            last_cleaned_at: None,
            status: CleaningStatus::Scheduled,
            booked_slot_id: None,
            vip_inspection: false,
        });
        assert_eq!(estimate_readiness_minutes(&t), 19);
    }
}

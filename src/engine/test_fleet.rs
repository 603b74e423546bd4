// ==========================================
// 引擎单元测试用车队构造
// ==========================================

use crate::domain::evaluation::EvaluationResult;
use crate::domain::train::{
    CleaningFacts, CleaningStatus, FitnessCertificate, FitnessFacts, MileageFacts, StablingFacts,
    TrainSnapshot,
};
use crate::domain::types::{EvaluatorKind, TrainStatus};
use crate::engine::evaluator::{EvaluationContext, Evaluator};
use chrono::{DateTime, Duration, Utc};
use std::time::Duration as StdDuration;

/// 全部事实健康的列车
pub fn healthy_train(id: &str, as_of: DateTime<Utc>, km: f64) -> TrainSnapshot {
    let mut t = TrainSnapshot::new(id, TrainStatus::DepotReady);
    t.fitness = Some(FitnessFacts {
        certificates: ["rolling_stock", "signalling", "telecom"]
            .iter()
            .map(|d| FitnessCertificate {
                department: d.to_string(),
                expires_at: as_of + Duration::days(10),
            })
            .collect(),
    });
    t.job_cards = Some(Vec::new());
    t.branding = Some(Vec::new());
    t.mileage = Some(MileageFacts {
        cumulative_km: km,
        km_to_next_maintenance: 5000.0,
    });
    t.cleaning = Some(CleaningFacts {
        last_cleaned_at: Some(as_of - Duration::hours(12)),
        status: CleaningStatus::Completed,
        booked_slot_id: None,
        vip_inspection: false,
    });
    t.stabling = Some(StablingFacts {
        bay: "B1".to_string(),
        position: 1,
        shunting_distance_m: Some(100.0),
        shunting_time_min: Some(5),
        blocking_other_trains: false,
    });
    t
}

/// T01..Tnn,里程递增
pub fn fleet(n: usize, as_of: DateTime<Utc>) -> Vec<TrainSnapshot> {
    (1..=n)
        .map(|i| healthy_train(&format!("T{:02}", i), as_of, 10_000.0 + i as f64 * 100.0))
        .collect()
}

/// 证书过期 (硬阻断)
pub fn expire_fitness(train: &mut TrainSnapshot, as_of: DateTime<Utc>) {
    if let Some(f) = train.fitness.as_mut() {
        for c in f.certificates.iter_mut() {
            c.expires_at = as_of - Duration::hours(1);
        }
    }
}

/// 固定延迟的评估器 (超时测试)
pub struct SleepyEvaluator {
    pub kind: EvaluatorKind,
    pub delay: StdDuration,
}

impl Evaluator for SleepyEvaluator {
    fn kind(&self) -> EvaluatorKind {
        self.kind
    }

    fn evaluate(&self, snapshot: &TrainSnapshot, _ctx: &EvaluationContext) -> EvaluationResult {
        std::thread::sleep(self.delay);
        EvaluationResult::scored(&snapshot.train_id, self.kind, 99.0, "SLEPT", "")
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 列车快照
// ==========================================
// 依据: 决策引擎设计 - 3. 数据模型 TrainSnapshot
// 红线: 快照在一次运行内不可变,由 Provider 提供
// 红线: 标记为 stale 的事实组等同于缺失
// ==========================================

use crate::domain::types::TrainStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// ==========================================
// 事实组 (Fact Group)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactGroup {
    Fitness,
    JobCards,
    Branding,
    Mileage,
    Cleaning,
    Stabling,
}

impl fmt::Display for FactGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FactGroup::Fitness => "fitness",
            FactGroup::JobCards => "job_cards",
            FactGroup::Branding => "branding",
            FactGroup::Mileage => "mileage",
            FactGroup::Cleaning => "cleaning",
            FactGroup::Stabling => "stabling",
        };
        f.write_str(s)
    }
}

// ==========================================
// 适用证书 (Fitness)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessCertificate {
    pub department: String, // rolling_stock / signalling / telecom
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessFacts {
    pub certificates: Vec<FitnessCertificate>,
}

impl FitnessFacts {
    /// 某部门证书 (同部门多张时取最晚到期)
    pub fn certificate_for(&self, department: &str) -> Option<&FitnessCertificate> {
        self.certificates
            .iter()
            .filter(|c| c.department.eq_ignore_ascii_case(department))
            .max_by_key(|c| c.expires_at)
    }
}

// ==========================================
// 工单 (Job Card)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPriority {
    Critical,
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Open,
    InProgress,
    PendingParts,
    Closed,
}

impl JobStatus {
    /// 未关闭工单 (OPEN / IN_PROGRESS / PENDING_PARTS)
    pub fn is_open(&self) -> bool {
        !matches!(self, JobStatus::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCard {
    pub job_id: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    #[serde(default)]
    pub blocking_service: bool,
    #[serde(default)]
    pub safety_critical: bool,
    #[serde(default)]
    pub requires_ibl: bool,
    pub due_date: Option<DateTime<Utc>>,
    pub ibl_bay: Option<String>,
}

// ==========================================
// 广告合同 (Branding)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrandingContract {
    pub contract_id: String,
    pub required_exposure_hours: f64,
    pub current_exposure_hours: f64,
    pub end_date: DateTime<Utc>,
    pub active: bool,
    #[serde(default)]
    pub penalty_rate: f64,
}

impl BrandingContract {
    pub fn exposure_ratio(&self) -> f64 {
        if self.required_exposure_hours <= 0.0 {
            return 1.0;
        }
        self.current_exposure_hours / self.required_exposure_hours
    }

    pub fn has_deficit(&self) -> bool {
        self.current_exposure_hours < self.required_exposure_hours
    }
}

// ==========================================
// 里程 (Mileage)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MileageFacts {
    pub cumulative_km: f64,
    pub km_to_next_maintenance: f64,
}

// ==========================================
// 保洁 (Cleaning)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CleaningStatus {
    Completed,
    Scheduled,
    InProgress,
    Pending,
    Overdue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningFacts {
    pub last_cleaned_at: Option<DateTime<Utc>>,
    pub status: CleaningStatus,
    pub booked_slot_id: Option<String>,
    #[serde(default)]
    pub vip_inspection: bool,
}

// ==========================================
// 停放 (Stabling)
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StablingFacts {
    pub bay: String,
    pub position: u32,
    pub shunting_distance_m: Option<f64>,
    pub shunting_time_min: Option<u32>,
    #[serde(default)]
    pub blocking_other_trains: bool,
}

// ==========================================
// TrainSnapshot - 单车单次运行快照
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainSnapshot {
    pub train_id: String,
    pub train_number: String,
    pub status: TrainStatus,
    pub current_route: Option<String>,
    pub fitness: Option<FitnessFacts>,
    pub job_cards: Option<Vec<JobCard>>,
    pub branding: Option<Vec<BrandingContract>>,
    pub mileage: Option<MileageFacts>,
    pub cleaning: Option<CleaningFacts>,
    pub stabling: Option<StablingFacts>,
    #[serde(default)]
    pub stale_groups: BTreeSet<FactGroup>,
}

impl TrainSnapshot {
    /// 创建不含任何事实组的快照
    pub fn new(train_id: impl Into<String>, status: TrainStatus) -> Self {
        let train_id = train_id.into();
        Self {
            train_number: train_id.clone(),
            train_id,
            status,
            current_route: None,
            fitness: None,
            job_cards: None,
            branding: None,
            mileage: None,
            cleaning: None,
            stabling: None,
            stale_groups: BTreeSet::new(),
        }
    }

    pub fn is_stale(&self, group: FactGroup) -> bool {
        self.stale_groups.contains(&group)
    }

    fn usable<'a, T>(&self, group: FactGroup, value: &'a Option<T>) -> Option<&'a T> {
        if self.is_stale(group) {
            None
        } else {
            value.as_ref()
        }
    }

    // ===== 可用事实组访问 (stale => None) =====

    pub fn fitness_facts(&self) -> Option<&FitnessFacts> {
        self.usable(FactGroup::Fitness, &self.fitness)
    }

    pub fn job_card_facts(&self) -> Option<&Vec<JobCard>> {
        self.usable(FactGroup::JobCards, &self.job_cards)
    }

    pub fn branding_facts(&self) -> Option<&Vec<BrandingContract>> {
        self.usable(FactGroup::Branding, &self.branding)
    }

    pub fn mileage_facts(&self) -> Option<&MileageFacts> {
        self.usable(FactGroup::Mileage, &self.mileage)
    }

    pub fn cleaning_facts(&self) -> Option<&CleaningFacts> {
        self.usable(FactGroup::Cleaning, &self.cleaning)
    }

    pub fn stabling_facts(&self) -> Option<&StablingFacts> {
        self.usable(FactGroup::Stabling, &self.stabling)
    }

    /// 累计里程 (排序平手时使用;缺失视为无穷大)
    pub fn cumulative_km(&self) -> f64 {
        self.mileage_facts()
            .map(|m| m.cumulative_km)
            .unwrap_or(f64::MAX)
    }
}

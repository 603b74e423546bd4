// ==========================================
// 地铁列车夜间投运决策系统 - 列车快照数据源
// ==========================================
// 职责: 定义外部快照提供者接口,引擎只读取不写回
// 说明: 过期的事实组由提供者在 stale_groups 中标记
// ==========================================

use crate::domain::train::TrainSnapshot;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("列车快照不可用: {0}")]
    Unavailable(String),

    #[error("列车不存在: {0}")]
    UnknownTrain(String),
}

/// 列车快照提供者
#[async_trait]
pub trait TrainSnapshotProvider: Send + Sync {
    /// 获取全车队快照
    ///
    /// # 参数
    /// - decision_date: 决策日期
    /// - as_of: 快照时刻
    async fn fetch_fleet(
        &self,
        decision_date: NaiveDate,
        as_of: DateTime<Utc>,
    ) -> Result<Vec<TrainSnapshot>, ProviderError>;
}

/// 内存快照提供者 (测试与离线回放)
#[derive(Debug, Default)]
pub struct StaticSnapshotProvider {
    fleet: RwLock<Vec<TrainSnapshot>>,
}

impl StaticSnapshotProvider {
    pub fn new(fleet: Vec<TrainSnapshot>) -> Self {
        Self {
            fleet: RwLock::new(fleet),
        }
    }

    /// 整体替换车队快照
    pub fn replace_fleet(&self, fleet: Vec<TrainSnapshot>) -> Result<(), ProviderError> {
        let mut guard = self
            .fleet
            .write()
            .map_err(|e| ProviderError::Unavailable(format!("锁获取失败: {}", e)))?;
        *guard = fleet;
        Ok(())
    }

    /// 更新单车快照
    pub fn update_train(&self, snapshot: TrainSnapshot) -> Result<(), ProviderError> {
        let mut guard = self
            .fleet
            .write()
            .map_err(|e| ProviderError::Unavailable(format!("锁获取失败: {}", e)))?;
        match guard.iter_mut().find(|t| t.train_id == snapshot.train_id) {
            Some(slot) => {
                *slot = snapshot;
                Ok(())
            }
            None => Err(ProviderError::UnknownTrain(snapshot.train_id)),
        }
    }
}

#[async_trait]
impl TrainSnapshotProvider for StaticSnapshotProvider {
    async fn fetch_fleet(
        &self,
        _decision_date: NaiveDate,
        _as_of: DateTime<Utc>,
    ) -> Result<Vec<TrainSnapshot>, ProviderError> {
        let guard = self
            .fleet
            .read()
            .map_err(|e| ProviderError::Unavailable(format!("锁获取失败: {}", e)))?;
        Ok(guard.clone())
    }
}

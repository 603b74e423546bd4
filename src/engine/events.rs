// ==========================================
// 地铁列车夜间投运决策系统 - 引擎层事件发布
// ==========================================
// 职责: 定义投运事件发布 trait,实现依赖倒置
// 说明: Engine 层定义 trait,调度台/告警系统实现适配器
// 红线: 发布失败只记日志,不影响方案生成
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// 投运事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InductionEventType {
    /// 夜间方案生成
    PlanGenerated,
    /// 方案审批
    PlanApproved,
    /// 存在需人工处理的冲突
    ConflictsSurfaced,
    /// 正线故障,应急方案待审批
    EmergencyRaised,
    /// 连锁故障,进入 CRISIS
    CrisisActivated,
    /// 应急审批超时 (致命告警)
    UnresolvedEmergency,
}

impl InductionEventType {
    pub fn as_str(&self) -> &str {
        match self {
            InductionEventType::PlanGenerated => "PlanGenerated",
            InductionEventType::PlanApproved => "PlanApproved",
            InductionEventType::ConflictsSurfaced => "ConflictsSurfaced",
            InductionEventType::EmergencyRaised => "EmergencyRaised",
            InductionEventType::CrisisActivated => "CrisisActivated",
            InductionEventType::UnresolvedEmergency => "UnresolvedEmergency",
        }
    }

    /// 是否为致命告警
    pub fn is_fatal(&self) -> bool {
        matches!(self, InductionEventType::UnresolvedEmergency)
    }
}

/// 投运事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InductionEvent {
    pub event_type: InductionEventType,
    /// 方案ID 或应急ID
    pub subject_id: String,
    pub train_ids: Vec<String>,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl InductionEvent {
    pub fn new(
        event_type: InductionEventType,
        subject_id: impl Into<String>,
        message: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            subject_id: subject_id.into(),
            train_ids: Vec::new(),
            message: message.into(),
            at,
        }
    }

    pub fn with_trains(mut self, train_ids: Vec<String>) -> Self {
        self.train_ids = train_ids;
        self
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 投运事件发布者 Trait
///
/// # 返回
/// - `Ok(receipt)`: 下游回执 (不支持时为空字符串)
/// - `Err`: 发布失败
pub trait InductionEventPublisher: Send + Sync {
    fn publish(&self, event: InductionEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl InductionEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: InductionEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - subject_id={}, event_type={}",
            event.subject_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 内存记录发布者 (测试与本地回放)
#[derive(Debug, Default)]
pub struct RecordingEventPublisher {
    events: Mutex<Vec<InductionEvent>>,
}

impl RecordingEventPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<InductionEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, event_type: InductionEventType) -> usize {
        self.events().iter().filter(|e| e.event_type == event_type).count()
    }
}

impl InductionEventPublisher for RecordingEventPublisher {
    fn publish(&self, event: InductionEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        let mut events = self
            .events
            .lock()
            .map_err(|e| format!("事件缓冲锁获取失败: {}", e))?;
        events.push(event);
        Ok(events.len().to_string())
    }
}

/// 可选的事件发布者包装
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn InductionEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn InductionEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件; 失败只记日志
    pub fn publish(&self, event: InductionEvent) {
        let event_type = event.event_type;
        let subject_id = event.subject_id.clone();
        match &self.inner {
            Some(publisher) => {
                if let Err(e) = publisher.publish(event) {
                    tracing::error!(
                        subject_id = %subject_id,
                        event_type = event_type.as_str(),
                        error = %e,
                        "事件发布失败"
                    );
                } else if event_type.is_fatal() {
                    tracing::error!(subject_id = %subject_id, "致命告警已发布: {}", event_type.as_str());
                }
            }
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者,跳过事件 - subject_id={}, event_type={}",
                    subject_id,
                    event_type.as_str()
                );
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_publisher() {
        let event = InductionEvent::new(InductionEventType::PlanGenerated, "P1", "ok", Utc::now());
        let result = NoOpEventPublisher.publish(event);
        assert!(result.unwrap().is_empty());
    }

    #[test]
    fn test_optional_publisher_none() {
        let publisher = OptionalEventPublisher::none();
        assert!(!publisher.is_configured());
        publisher.publish(InductionEvent::new(
            InductionEventType::CrisisActivated,
            "E1",
            "cascade",
            Utc::now(),
        ));
    }

    #[test]
    fn test_recording_publisher_through_wrapper() {
        let recorder = Arc::new(RecordingEventPublisher::new());
        let publisher = OptionalEventPublisher::with_publisher(recorder.clone());
        publisher.publish(
            InductionEvent::new(InductionEventType::UnresolvedEmergency, "E1", "timeout", Utc::now())
                .with_trains(vec!["T03".to_string()]),
        );
        assert_eq!(recorder.count_of(InductionEventType::UnresolvedEmergency), 1);
        assert_eq!(recorder.events()[0].train_ids, vec!["T03".to_string()]);
        assert!(InductionEventType::UnresolvedEmergency.is_fatal());
    }
}

// ==========================================
// 地铁列车夜间投运决策系统 - 应急重排状态机
// ==========================================
// 依据: 决策引擎设计 - 4.6 Emergency Replanner
// 状态机 (每个应急实例独立):
//   IDLE → QUICK_CHECK → PLAN_READY (有合格替换车)
//                      → CRISIS     (无合格替换车 / 30 分钟内 ≥3 列退出)
//   PLAN_READY | CRISIS → RESOLVED  (审批 / 审批超时 / 被新危机取代)
// 红线: 应急/危机运行不可取消
// 红线: 审批超时发布致命告警,不自动重试
// 红线: 状态锁只保护实例表,流水线/危机重排期间不持锁
// ==========================================

use crate::config::EmergencyPolicy;
use crate::domain::emergency::{
    EmergencyEvent, EmergencyInstance, EmergencyPlan, ReplacementCandidate, ResolutionOutcome,
};
use crate::domain::plan::ServiceQuota;
use crate::domain::scenario::ScenarioPatch;
use crate::domain::train::TrainSnapshot;
use crate::domain::types::{EmergencyPhase, ErrorKind, FaultSeverity, PlanningMode};
use crate::engine::crisis::CrisisReoptimizer;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::events::{InductionEvent, InductionEventType, OptionalEventPublisher};
use crate::engine::pipeline::{InductionPipeline, PipelineRequest};
use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone)]
struct Withdrawal {
    at: DateTime<Utc>,
    train_id: String,
}

/// CRISIS 进入时冻结的车队快照与退出列车
#[derive(Debug, Clone, PartialEq)]
pub struct CrisisFleet {
    pub snapshots: Vec<TrainSnapshot>,
    pub withdrawn: BTreeSet<String>,
}

impl CrisisFleet {
    /// 情景补丁叠加危机上下文: 退出列车强制不可用
    pub fn scenario_patch(&self, patch: &ScenarioPatch) -> ScenarioPatch {
        let mut patch = patch.clone();
        for train_id in &self.withdrawn {
            patch.forced_service.remove(train_id);
            patch.forced_unavailable.insert(train_id.clone());
        }
        patch
    }
}

#[derive(Debug, Default)]
struct ReplannerState {
    instances: BTreeMap<String, EmergencyInstance>,
    withdrawals: VecDeque<Withdrawal>,
    crisis_fleet: Option<CrisisFleet>,
}

impl ReplannerState {
    /// 记录退出并返回窗口内的退出列车
    fn record_withdrawal(&mut self, event: &EmergencyEvent, window: Duration) -> BTreeSet<String> {
        self.withdrawals.push_back(Withdrawal {
            at: event.timestamp,
            train_id: event.withdrawn_train_id.clone(),
        });
        let cutoff = event.timestamp - window;
        while self.withdrawals.front().map_or(false, |w| w.at < cutoff) {
            self.withdrawals.pop_front();
        }
        self.withdrawals
            .iter()
            .filter(|w| w.at >= cutoff && w.at <= event.timestamp)
            .map(|w| w.train_id.clone())
            .collect()
    }

    fn has_open_crisis(&self) -> bool {
        self.instances
            .values()
            .any(|i| i.is_open() && i.phase == EmergencyPhase::Crisis)
    }
}

pub struct EmergencyReplanner {
    pipeline: Arc<InductionPipeline>,
    crisis: CrisisReoptimizer,
    events: OptionalEventPublisher,
    state: Mutex<ReplannerState>,
}

impl EmergencyReplanner {
    pub fn new(pipeline: Arc<InductionPipeline>, events: OptionalEventPublisher) -> Self {
        Self {
            crisis: CrisisReoptimizer::new(pipeline.clone()),
            pipeline,
            events,
            state: Mutex::new(ReplannerState::default()),
        }
    }

    fn policy(&self) -> &EmergencyPolicy {
        &self.pipeline.config().emergency
    }

    /// 构造故障事件 (部署截止 = 故障时刻 + 应急预算)
    pub fn new_event(
        &self,
        withdrawn_train_id: &str,
        fault_code: &str,
        fault_severity: FaultSeverity,
        timestamp: DateTime<Utc>,
    ) -> EmergencyEvent {
        let budget = self.pipeline.config().budgets.emergency_deadline;
        let budget = Duration::from_std(budget).unwrap_or_else(|_| Duration::minutes(5));
        EmergencyEvent {
            emergency_id: format!("EM-{}", uuid::Uuid::new_v4()),
            withdrawn_train_id: withdrawn_train_id.to_string(),
            fault_code: fault_code.to_string(),
            fault_severity,
            timestamp,
            deployment_deadline: timestamp + budget,
        }
    }

    /// 处理正线故障退出
    ///
    /// # 参数
    /// - event: 故障事件
    /// - fleet: 当前车队快照
    ///
    /// # 返回
    /// 处理后的应急实例 (PLAN_READY 或 CRISIS)
    #[instrument(skip(self, event, fleet), fields(
        emergency_id = %event.emergency_id,
        withdrawn_train_id = %event.withdrawn_train_id,
        fault_code = %event.fault_code
    ))]
    pub async fn handle_breakdown(
        &self,
        event: EmergencyEvent,
        fleet: Vec<TrainSnapshot>,
    ) -> EngineResult<EmergencyInstance> {
        let policy = *self.policy();
        let withdrawn = self
            .state
            .lock()
            .await
            .record_withdrawal(&event, Duration::minutes(policy.cascade_window_minutes));
        let now = event.timestamp;
        let mut instance = EmergencyInstance::new(event);
        instance.approval_deadline = Some(now + Duration::minutes(policy.approval_timeout_minutes));

        if withdrawn.len() >= policy.cascade_threshold {
            let reason = format!(
                "cascade: {} withdrawals within {} min",
                withdrawn.len(),
                policy.cascade_window_minutes
            );
            instance.transition(EmergencyPhase::Crisis, now, reason);
            let instance = self.enter_crisis(instance, fleet, withdrawn).await?;
            return Ok(instance);
        }

        instance.transition(EmergencyPhase::QuickCheck, now, "breakdown event received");

        let candidates: Vec<TrainSnapshot> = fleet
            .iter()
            .filter(|t| t.status.is_replacement_candidate() && !withdrawn.contains(&t.train_id))
            .cloned()
            .collect();
        let candidate_count = candidates.len();

        let request = PipelineRequest::new(
            PlanningMode::Emergency,
            now.date_naive(),
            now,
            candidates,
            ServiceQuota::new(1, policy.fallback_options),
        );
        let candidate_plan = self.pipeline.run(request).await?;

        let mut eligible: Vec<ReplacementCandidate> = candidate_plan
            .assignments
            .iter()
            .filter(|a| a.final_eligible)
            .map(|a| ReplacementCandidate {
                train_id: a.train_id.clone(),
                readiness_minutes: a.readiness_minutes,
                overall_score: a.overall_score,
            })
            .collect();
        eligible.sort_by(|a, b| {
            a.readiness_minutes
                .cmp(&b.readiness_minutes)
                .then_with(|| b.overall_score.total_cmp(&a.overall_score))
                .then_with(|| a.train_id.cmp(&b.train_id))
        });

        if eligible.is_empty() {
            warn!(candidates = candidate_count, "no eligible replacement; escalating to crisis");
            instance.error_kind = Some(ErrorKind::NoEligibleReplacement);
            instance.transition(EmergencyPhase::Crisis, now, "no eligible replacement");
            let instance = self.enter_crisis(instance, fleet, withdrawn).await?;
            return Ok(instance);
        }

        let replacement = eligible.remove(0);
        let fallback_options: Vec<ReplacementCandidate> =
            eligible.into_iter().take(policy.fallback_options).collect();
        if candidate_plan.incomplete {
            instance.error_kind = candidate_plan.error_kind;
        }

        instance.transition(
            EmergencyPhase::PlanReady,
            now,
            format!(
                "replacement {} ready in {} min",
                replacement.train_id, replacement.readiness_minutes
            ),
        );
        let train_ids = vec![
            instance.event.withdrawn_train_id.clone(),
            replacement.train_id.clone(),
        ];
        instance.emergency_plan = Some(EmergencyPlan {
            emergency_id: instance.event.emergency_id.clone(),
            withdrawn_train_id: instance.event.withdrawn_train_id.clone(),
            replacement,
            fallback_options,
            candidate_plan,
            generated_at: Utc::now(),
        });

        self.state
            .lock()
            .await
            .instances
            .insert(instance.emergency_id().to_string(), instance.clone());

        self.events.publish(
            InductionEvent::new(
                InductionEventType::EmergencyRaised,
                instance.emergency_id(),
                "replacement plan awaiting approval",
                now,
            )
            .with_trains(train_ids),
        );
        info!(phase = %instance.phase, "emergency plan ready");

        Ok(instance)
    }

    /// 进入 CRISIS: 全网重排后冻结快照、取代旧实例
    async fn enter_crisis(
        &self,
        mut instance: EmergencyInstance,
        fleet: Vec<TrainSnapshot>,
        withdrawn: BTreeSet<String>,
    ) -> EngineResult<EmergencyInstance> {
        let now = instance.event.timestamp;
        let emergency_id = instance.emergency_id().to_string();

        let crisis_plan = self
            .crisis
            .reoptimize(&emergency_id, fleet.clone(), &withdrawn, now)
            .await?;
        if instance.error_kind.is_none() {
            instance.error_kind = crisis_plan.error_kind;
        }
        let withdrawal_count = crisis_plan.state.withdrawal_count;
        let deficit = crisis_plan.state.service_deficit;
        let action_count = crisis_plan.actions.len();
        instance.crisis_plan = Some(crisis_plan);

        {
            let mut state = self.state.lock().await;
            for other in state.instances.values_mut().filter(|i| i.is_open()) {
                other.outcome = Some(ResolutionOutcome::Superseded {
                    by_emergency_id: emergency_id.clone(),
                });
                other.transition(
                    EmergencyPhase::Resolved,
                    now,
                    format!("superseded by {}", emergency_id),
                );
                if let Some(crisis) = other.crisis_plan.as_mut() {
                    crisis.state.closed_at = Some(now);
                }
            }
            state.crisis_fleet = Some(CrisisFleet {
                snapshots: fleet,
                withdrawn: withdrawn.clone(),
            });
            state.instances.insert(emergency_id.clone(), instance.clone());
        }

        self.events.publish(
            InductionEvent::new(
                InductionEventType::CrisisActivated,
                &emergency_id,
                format!(
                    "{} withdrawals, deficit {}, {} actions",
                    withdrawal_count, deficit, action_count
                ),
                now,
            )
            .with_trains(withdrawn.into_iter().collect()),
        );
        info!(
            emergency_id = %emergency_id,
            deficit,
            actions = action_count,
            "crisis activated"
        );
        Ok(instance)
    }

    /// 操作员审批
    ///
    /// 审批截止已过的实例先按超时处理,再拒绝审批
    pub async fn approve(
        &self,
        emergency_id: &str,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<EmergencyInstance> {
        let mut state = self.state.lock().await;
        let instance = state
            .instances
            .get_mut(emergency_id)
            .ok_or_else(|| EngineError::EmergencyNotFound(emergency_id.to_string()))?;

        if !instance.phase.is_awaiting_approval() {
            return Err(EngineError::InvalidStateTransition {
                from: instance.phase.to_string(),
                to: EmergencyPhase::Resolved.to_string(),
            });
        }
        if instance.approval_deadline.map_or(false, |d| now > d) {
            let from = instance.phase.to_string();
            self.time_out(instance, now);
            let closing_crisis = instance.crisis_plan.is_some();
            if closing_crisis && !state.has_open_crisis() {
                state.crisis_fleet = None;
            }
            return Err(EngineError::InvalidStateTransition {
                from: format!("{} (approval expired)", from),
                to: EmergencyPhase::Resolved.to_string(),
            });
        }

        instance.outcome = Some(ResolutionOutcome::Approved {
            approved_by: approved_by.to_string(),
        });
        instance.transition(EmergencyPhase::Resolved, now, format!("approved by {}", approved_by));
        if let Some(crisis) = instance.crisis_plan.as_mut() {
            crisis.state.closed_at = Some(now);
        }
        let resolved = instance.clone();
        if !state.has_open_crisis() {
            state.crisis_fleet = None;
        }
        info!(emergency_id, approved_by, "emergency approved");
        Ok(resolved)
    }

    /// 处理审批超时的实例
    ///
    /// # 返回
    /// 本次被超时关闭的实例
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> Vec<EmergencyInstance> {
        let mut state = self.state.lock().await;
        let mut expired = Vec::new();
        for instance in state.instances.values_mut() {
            let overdue = instance.phase.is_awaiting_approval()
                && instance.approval_deadline.map_or(false, |d| now > d);
            if overdue {
                self.time_out(instance, now);
                expired.push(instance.clone());
            }
        }
        if !state.has_open_crisis() {
            state.crisis_fleet = None;
        }
        expired
    }

    fn time_out(&self, instance: &mut EmergencyInstance, now: DateTime<Utc>) {
        instance.outcome = Some(ResolutionOutcome::TimedOut);
        instance.transition(EmergencyPhase::Resolved, now, "approval timed out");
        if let Some(crisis) = instance.crisis_plan.as_mut() {
            crisis.state.closed_at = Some(now);
        }
        warn!(emergency_id = %instance.emergency_id(), "approval timed out; raising fatal alert");
        self.events.publish(
            InductionEvent::new(
                InductionEventType::UnresolvedEmergency,
                instance.emergency_id(),
                "emergency plan not approved before deadline",
                now,
            )
            .with_trains(vec![instance.event.withdrawn_train_id.clone()]),
        );
    }

    pub async fn get(&self, emergency_id: &str) -> Option<EmergencyInstance> {
        self.state.lock().await.instances.get(emergency_id).cloned()
    }

    pub async fn open_instances(&self) -> Vec<EmergencyInstance> {
        self.state
            .lock()
            .await
            .instances
            .values()
            .filter(|i| i.is_open())
            .cloned()
            .collect()
    }

    /// 活动 CRISIS 的冻结快照 (情景试算使用)
    pub async fn crisis_fleet(&self) -> Option<CrisisFleet> {
        self.state.lock().await.crisis_fleet.clone()
    }
}

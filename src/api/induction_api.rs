// ==========================================
// 地铁列车夜间投运决策系统 - 投运决策 API
// ==========================================
// 职责: 夜间方案生成/审批/人工覆写、情景试算、应急处置
// 红线: 引擎只产出 DRAFT,审批是人工动作
// 红线: 硬阻断列车不可被覆写为 SERVICE/STANDBY
// 红线: 情景方案不落库
// ==========================================

use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{info, instrument, warn};

use crate::api::error::{config_error, ApiError, ApiResult};
use crate::config::{ConfigManager, PlanningConfig, PlanningConfigReader};
use crate::domain::emergency::EmergencyInstance;
use crate::domain::plan::{Assignment, Plan};
use crate::domain::scenario::ScenarioPatch;
use crate::domain::types::{FaultSeverity, InductionAction, PlanStatus, PlanningMode};
use crate::engine::cancel::CancelToken;
use crate::engine::emergency::EmergencyReplanner;
use crate::engine::events::{
    InductionEvent, InductionEventPublisher, InductionEventType, OptionalEventPublisher,
};
use crate::engine::pipeline::{InductionPipeline, PipelineRequest};
use crate::engine::provider::TrainSnapshotProvider;
use crate::engine::scenario::{ScenarioEngine, ScenarioOutcome};
use crate::repository::{ConflictLogRepository, EmergencyLogRepository, PlanRepository};

// ==========================================
// InductionApi - 投运决策 API
// ==========================================
pub struct InductionApi {
    config_manager: Arc<ConfigManager>,
    provider: Arc<dyn TrainSnapshotProvider>,
    pipeline: Arc<InductionPipeline>,
    scenario_engine: ScenarioEngine,
    replanner: EmergencyReplanner,
    plan_repo: PlanRepository,
    conflict_repo: ConflictLogRepository,
    emergency_repo: EmergencyLogRepository,
    event_publisher: OptionalEventPublisher,
}

impl InductionApi {
    /// 创建 API 实例 (读取一次配置快照,所有引擎共享)
    ///
    /// # 参数
    /// - conn: 已建表的 SQLite 连接
    /// - provider: 列车快照数据源
    /// - event_publisher: 可选事件发布者
    pub async fn bootstrap(
        conn: Arc<Mutex<Connection>>,
        provider: Arc<dyn TrainSnapshotProvider>,
        event_publisher: Option<Arc<dyn InductionEventPublisher>>,
    ) -> ApiResult<Self> {
        let config_manager =
            Arc::new(config_error(ConfigManager::from_connection(conn.clone()))?);
        let config = config_error(config_manager.load_planning_config().await)?;
        Ok(Self::with_config(conn, config_manager, config, provider, event_publisher))
    }

    /// 使用指定配置创建 API 实例
    pub fn with_config(
        conn: Arc<Mutex<Connection>>,
        config_manager: Arc<ConfigManager>,
        config: PlanningConfig,
        provider: Arc<dyn TrainSnapshotProvider>,
        event_publisher: Option<Arc<dyn InductionEventPublisher>>,
    ) -> Self {
        let event_publisher = match event_publisher {
            Some(p) => OptionalEventPublisher::with_publisher(p),
            None => OptionalEventPublisher::none(),
        };
        let pipeline = Arc::new(InductionPipeline::new(Arc::new(config)));

        Self {
            config_manager,
            provider,
            scenario_engine: ScenarioEngine::new(pipeline.clone()),
            replanner: EmergencyReplanner::new(pipeline.clone(), event_publisher.clone()),
            pipeline,
            plan_repo: PlanRepository::new(conn.clone()),
            conflict_repo: ConflictLogRepository::new(conn.clone()),
            emergency_repo: EmergencyLogRepository::new(conn),
            event_publisher,
        }
    }

    pub fn config(&self) -> &PlanningConfig {
        self.pipeline.config()
    }

    // ==========================================
    // 夜间方案
    // ==========================================

    /// 生成夜间投运方案 (NORMAL)
    ///
    /// # 参数
    /// - decision_date: 决策日
    /// - as_of: 快照时刻
    /// - cancel: 可选取消令牌
    ///
    /// # 返回
    /// - Ok(Plan): 已落库的 DRAFT 方案
    /// - Err(QuotaInfeasible): 合格列车不足配额
    #[instrument(skip(self, cancel), fields(decision_date = %decision_date))]
    pub async fn plan_nightly(
        &self,
        decision_date: NaiveDate,
        as_of: DateTime<Utc>,
        cancel: Option<CancelToken>,
    ) -> ApiResult<Plan> {
        let snapshots = self.provider.fetch_fleet(decision_date, as_of).await?;
        let config_snapshot = config_error(self.config_manager.get_config_snapshot())?;

        let mut request = PipelineRequest::new(
            PlanningMode::Normal,
            decision_date,
            as_of,
            snapshots.clone(),
            self.config().quota,
        );
        if let Some(token) = cancel {
            request = request.with_cancel(token);
        }
        let plan = self.pipeline.run(request).await?;

        self.plan_repo
            .save_with_conflicts(&plan, &snapshots, Some(&config_snapshot))?;

        let service_ids = plan.service_train_ids();
        self.event_publisher.publish(
            InductionEvent::new(
                InductionEventType::PlanGenerated,
                &plan.plan_id,
                format!("{} trains to service", service_ids.len()),
                plan.generated_at,
            )
            .with_trains(service_ids),
        );

        let manual: Vec<String> = plan
            .assignments
            .iter()
            .filter(|a| a.manual_decision_required)
            .map(|a| a.train_id.clone())
            .collect();
        if !manual.is_empty() {
            self.event_publisher.publish(
                InductionEvent::new(
                    InductionEventType::ConflictsSurfaced,
                    &plan.plan_id,
                    format!("{} trains need a manual decision", manual.len()),
                    plan.generated_at,
                )
                .with_trains(manual),
            );
        }

        info!(plan_id = %plan.plan_id, conflicts = plan.conflicts.len(), "nightly plan stored");
        Ok(plan)
    }

    /// 查询方案 (指派为最新版本)
    pub fn get_plan(&self, plan_id: &str) -> ApiResult<Plan> {
        let mut plan = self
            .plan_repo
            .find_by_id(plan_id)?
            .ok_or_else(|| ApiError::NotFound(format!("方案(id={})不存在", plan_id)))?;
        plan.conflicts = self.conflict_repo.list_for_plan(plan_id)?;
        Ok(plan)
    }

    /// 审批方案
    pub fn approve_plan(&self, plan_id: &str, approved_by: &str, at: DateTime<Utc>) -> ApiResult<Plan> {
        if approved_by.trim().is_empty() {
            return Err(ApiError::InvalidInput("审批人不能为空".to_string()));
        }
        self.plan_repo.mark_approved(plan_id, approved_by, at)?;
        let plan = self.get_plan(plan_id)?;

        self.event_publisher.publish(InductionEvent::new(
            InductionEventType::PlanApproved,
            plan_id,
            format!("approved by {}", approved_by),
            at,
        ));
        info!(plan_id, approved_by, "plan approved");
        Ok(plan)
    }

    /// 人工覆写指派 (追加新版本)
    ///
    /// # 返回
    /// - Err(HardBlockViolation): 硬阻断列车覆写为 SERVICE/STANDBY
    /// - Err(InvalidStateTransition): 方案已审批
    pub fn override_assignment(
        &self,
        plan_id: &str,
        train_id: &str,
        action: InductionAction,
        overridden_by: &str,
        reason: &str,
        at: DateTime<Utc>,
    ) -> ApiResult<Assignment> {
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput("覆写原因不能为空".to_string()));
        }
        let plan = self.get_plan(plan_id)?;
        if plan.status != PlanStatus::Draft {
            return Err(ApiError::InvalidStateTransition {
                from: plan.status.to_string(),
                to: "OVERRIDE".to_string(),
            });
        }
        let current = plan
            .assignment(train_id)
            .ok_or_else(|| ApiError::NotFound(format!("列车(id={})不在方案 {} 中", train_id, plan_id)))?;

        if action.is_revenue_ready() && current.hard_blocked {
            warn!(plan_id, train_id, action = %action, "override rejected: train is hard blocked");
            return Err(ApiError::HardBlockViolation {
                train_id: train_id.to_string(),
                action: action.to_string(),
            });
        }

        let updated = current.overridden(action, overridden_by, reason, at);
        self.plan_repo.append_assignment_version(plan_id, &updated, at)?;
        info!(
            plan_id,
            train_id,
            from = %current.action,
            to = %action,
            version = updated.version,
            "assignment overridden"
        );
        Ok(updated)
    }

    // ==========================================
    // 情景试算
    // ==========================================

    /// 情景试算 (不落库)
    ///
    /// 存在活动 CRISIS 时在危机冻结快照上试算,退出列车强制不可用
    pub async fn simulate(
        &self,
        baseline_plan_id: &str,
        patch: &ScenarioPatch,
        cancel: Option<CancelToken>,
    ) -> ApiResult<ScenarioOutcome> {
        let baseline = self.get_plan(baseline_plan_id)?;
        let (snapshots, patch) = match self.replanner.crisis_fleet().await {
            Some(frozen) => {
                info!(
                    baseline_plan_id,
                    withdrawn = frozen.withdrawn.len(),
                    "simulating against frozen crisis snapshot"
                );
                let patch = frozen.scenario_patch(patch);
                (frozen.snapshots, patch)
            }
            None => (self.plan_repo.load_snapshots(baseline_plan_id)?, patch.clone()),
        };
        Ok(self
            .scenario_engine
            .simulate(&baseline, snapshots, &patch, cancel)
            .await?)
    }

    // ==========================================
    // 应急处置
    // ==========================================

    /// 处理正线故障退出
    ///
    /// # 返回
    /// 应急ID
    #[instrument(skip(self))]
    pub async fn handle_breakdown(
        &self,
        train_id: &str,
        fault_code: &str,
        severity: FaultSeverity,
        timestamp: DateTime<Utc>,
    ) -> ApiResult<String> {
        if train_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("故障列车不能为空".to_string()));
        }
        let fleet = self
            .provider
            .fetch_fleet(timestamp.date_naive(), timestamp)
            .await?;
        if !fleet.iter().any(|t| t.train_id == train_id) {
            return Err(ApiError::NotFound(format!("列车(id={})不存在", train_id)));
        }

        let event = self.replanner.new_event(train_id, fault_code, severity, timestamp);
        let instance = self.replanner.handle_breakdown(event, fleet).await?;
        self.persist_emergencies(&instance).await?;
        Ok(instance.emergency_id().to_string())
    }

    pub async fn emergency_status(&self, emergency_id: &str) -> ApiResult<EmergencyInstance> {
        match self.replanner.get(emergency_id).await {
            Some(instance) => Ok(instance),
            None => self
                .emergency_repo
                .find_by_id(emergency_id)?
                .ok_or_else(|| ApiError::NotFound(format!("应急事件(id={})不存在", emergency_id))),
        }
    }

    /// 审批应急/危机方案
    pub async fn approve_emergency(
        &self,
        emergency_id: &str,
        approved_by: &str,
        now: DateTime<Utc>,
    ) -> ApiResult<EmergencyInstance> {
        match self.replanner.approve(emergency_id, approved_by, now).await {
            Ok(instance) => {
                self.emergency_repo.record(&instance)?;
                Ok(instance)
            }
            Err(e) => {
                // 审批超时的实例已被关闭,同样落库
                if let Some(instance) = self.replanner.get(emergency_id).await {
                    self.emergency_repo.record(&instance)?;
                }
                Err(e.into())
            }
        }
    }

    /// 关闭审批超时的应急实例
    pub async fn sweep_expired_emergencies(&self, now: DateTime<Utc>) -> ApiResult<Vec<EmergencyInstance>> {
        let expired = self.replanner.sweep_expired(now).await;
        for instance in &expired {
            self.emergency_repo.record(instance)?;
        }
        Ok(expired)
    }

    /// 落库当前实例及被其取代的实例
    async fn persist_emergencies(&self, instance: &EmergencyInstance) -> ApiResult<()> {
        self.emergency_repo.record(instance)?;
        for open_id in self.emergency_repo.list_open_ids()? {
            if open_id == instance.emergency_id() {
                continue;
            }
            if let Some(current) = self.replanner.get(&open_id).await {
                if !current.is_open() {
                    self.emergency_repo.record(&current)?;
                }
            }
        }
        Ok(())
    }
}

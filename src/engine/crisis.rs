// ==========================================
// 地铁列车夜间投运决策系统 - 危机全网重排
// ==========================================
// 依据: 决策引擎设计 - 4.6 Crisis Reoptimizer
// 流程:
// 1. 全车队 CRISIS 模式重排 (退出列车强制不可用,截止 3 分钟)
// 2. 所有合格备车/库内待命车 → DEPLOY_STANDBY (就绪时间升序)
// 3. 缺口未补足 → 低需求线路在线车 REASSIGN_ROUTE 至关键线路
// 4. 恢复时间估算: 每个动作 15 分钟
// 红线: 危机运行不可取消,只能被更新的事件取代
// ==========================================

use crate::domain::emergency::{CrisisAction, CrisisPlan, CrisisState};
use crate::domain::train::TrainSnapshot;
use crate::domain::types::{ErrorKind, PlanningMode, TrainStatus};
use crate::engine::composite_ranker::ForcedStates;
use crate::engine::error::EngineResult;
use crate::engine::pipeline::{InductionPipeline, PipelineRequest};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{info, instrument, warn};

const MINUTES_PER_ACTION: u32 = 15;

pub struct CrisisReoptimizer {
    pipeline: Arc<InductionPipeline>,
}

impl CrisisReoptimizer {
    pub fn new(pipeline: Arc<InductionPipeline>) -> Self {
        Self { pipeline }
    }

    /// 生成危机处置方案
    ///
    /// # 参数
    /// - emergency_id: 触发危机的应急实例
    /// - fleet: CRISIS 进入时冻结的车队快照
    /// - withdrawn: 窗口内退出的列车
    /// - activated_at: 危机激活时刻
    #[instrument(skip(self, fleet, withdrawn), fields(
        emergency_id = %emergency_id,
        fleet = fleet.len(),
        withdrawn = withdrawn.len()
    ))]
    pub async fn reoptimize(
        &self,
        emergency_id: &str,
        fleet: Vec<TrainSnapshot>,
        withdrawn: &BTreeSet<String>,
        activated_at: DateTime<Utc>,
    ) -> EngineResult<CrisisPlan> {
        let config = self.pipeline.config();
        let quota = config.quota;

        let in_service: Vec<&TrainSnapshot> = fleet
            .iter()
            .filter(|t| t.status == TrainStatus::InService && !withdrawn.contains(&t.train_id))
            .collect();
        let service_deficit = quota.service_target.saturating_sub(in_service.len());

        let critical_routes = if config.critical_routes.is_empty() {
            derive_critical_routes(&fleet, config.emergency.critical_route_count)
        } else {
            config.critical_routes.clone()
        };
        let route_demand = route_demand(&fleet);

        let in_service_ids: Vec<(String, Option<String>)> = in_service
            .iter()
            .map(|t| (t.train_id.clone(), t.current_route.clone()))
            .collect();
        let standby_ids: BTreeSet<String> = fleet
            .iter()
            .filter(|t| t.status.is_replacement_candidate() && !withdrawn.contains(&t.train_id))
            .map(|t| t.train_id.clone())
            .collect();

        let request = PipelineRequest::new(
            PlanningMode::Crisis,
            activated_at.date_naive(),
            activated_at,
            fleet,
            quota,
        )
        .with_forced(ForcedStates::unavailable(withdrawn.iter().cloned()));
        let ranked_plan = self.pipeline.run(request).await?;

        // 步骤2: 部署全部合格备车
        let mut standby: Vec<_> = ranked_plan
            .assignments
            .iter()
            .filter(|a| a.final_eligible && standby_ids.contains(&a.train_id))
            .collect();
        standby.sort_by(|a, b| {
            a.readiness_minutes
                .cmp(&b.readiness_minutes)
                .then_with(|| b.overall_score.total_cmp(&a.overall_score))
                .then_with(|| a.train_id.cmp(&b.train_id))
        });

        let mut actions: Vec<CrisisAction> = standby
            .iter()
            .map(|a| CrisisAction::DeployStandby {
                train_id: a.train_id.clone(),
                readiness_minutes: a.readiness_minutes,
                overall_score: a.overall_score,
            })
            .collect();

        // 步骤3: 线路调配
        let mut remaining = service_deficit.saturating_sub(actions.len());
        if remaining > 0 && !critical_routes.is_empty() {
            let mut donors: Vec<(&String, &String)> = in_service_ids
                .iter()
                .filter_map(|(id, route)| route.as_ref().map(|r| (id, r)))
                .filter(|(_, route)| !critical_routes.contains(route))
                .collect();
            donors.sort_by(|(ia, ra), (ib, rb)| {
                let da = route_demand.get(*ra).copied().unwrap_or(0);
                let db = route_demand.get(*rb).copied().unwrap_or(0);
                da.cmp(&db).then_with(|| ia.cmp(ib))
            });

            for (i, (train_id, from_route)) in donors.into_iter().take(remaining).enumerate() {
                actions.push(CrisisAction::ReassignRoute {
                    train_id: train_id.clone(),
                    from_route: from_route.clone(),
                    to_route: critical_routes[i % critical_routes.len()].clone(),
                });
                remaining -= 1;
            }
        }

        let error_kind = if remaining > 0 {
            warn!(remaining, "service deficit not closed by crisis actions");
            Some(ErrorKind::QuotaInfeasible)
        } else {
            ranked_plan.error_kind
        };

        info!(
            service_deficit,
            actions = actions.len(),
            remaining_deficit = remaining,
            "crisis plan generated"
        );

        Ok(CrisisPlan {
            emergency_id: emergency_id.to_string(),
            state: CrisisState {
                activated_at,
                withdrawal_count: withdrawn.len(),
                service_deficit,
                closed_at: None,
            },
            recovery_estimate_minutes: actions.len() as u32 * MINUTES_PER_ACTION,
            ranked_plan,
            actions,
            critical_routes,
            remaining_deficit: remaining,
            error_kind,
        })
    }
}

/// 各线路需求 (在线列车数,含已退出的列车)
fn route_demand(fleet: &[TrainSnapshot]) -> BTreeMap<String, usize> {
    let mut demand = BTreeMap::new();
    for t in fleet.iter().filter(|t| t.status == TrainStatus::InService) {
        if let Some(route) = &t.current_route {
            *demand.entry(route.clone()).or_insert(0) += 1;
        }
    }
    demand
}

/// 在线车数最多的前 K 条线路 (同数按线路名)
pub fn derive_critical_routes(fleet: &[TrainSnapshot], count: usize) -> Vec<String> {
    let mut routes: Vec<(String, usize)> = route_demand(fleet).into_iter().collect();
    routes.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    routes.into_iter().take(count).map(|(r, _)| r).collect()
}

// ==========================================
// 地铁列车夜间投运决策系统 - 投运方案仓储
// ==========================================
// 职责: 方案头 + 输入快照 + 配置快照持久化,指派版本只追加
// 红线: Repository 不含业务逻辑
// 红线: 情景方案 (SCENARIO) 不落库
// ==========================================

use crate::domain::plan::{Assignment, Plan};
use crate::domain::train::TrainSnapshot;
use crate::domain::types::{PlanMode, PlanStatus};
use crate::repository::conflict_log_repo::insert_plan_conflicts;
use crate::repository::error::{parse_ts, RepositoryError, RepositoryResult};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// 已审批信息
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalRecord {
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

// ==========================================
// PlanRepository - 投运方案仓储
// ==========================================
pub struct PlanRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PlanRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 保存方案 (含输入快照与配置快照,同一事务写入初始指派版本)
    ///
    /// # 参数
    /// - `plan`: 引擎产出的草稿方案
    /// - `snapshots`: 生成方案时的车队快照
    /// - `config_snapshot_json`: 运行配置快照
    ///
    /// # 返回
    /// - `Err(BusinessRuleViolation)`: 情景方案
    pub fn save(
        &self,
        plan: &Plan,
        snapshots: &[TrainSnapshot],
        config_snapshot_json: Option<&str>,
    ) -> RepositoryResult<()> {
        self.write(plan, snapshots, config_snapshot_json, false)
    }

    /// 保存方案并在同一事务写入冲突日志
    ///
    /// 任一写入失败则整体回滚,不会留下缺冲突记录的方案
    pub fn save_with_conflicts(
        &self,
        plan: &Plan,
        snapshots: &[TrainSnapshot],
        config_snapshot_json: Option<&str>,
    ) -> RepositoryResult<()> {
        self.write(plan, snapshots, config_snapshot_json, true)
    }

    fn write(
        &self,
        plan: &Plan,
        snapshots: &[TrainSnapshot],
        config_snapshot_json: Option<&str>,
        with_conflicts: bool,
    ) -> RepositoryResult<()> {
        if plan.mode == PlanMode::Scenario {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "scenario plan {} is never persisted",
                plan.plan_id
            )));
        }

        let plan_json = serde_json::to_string(plan)?;
        let snapshots_json = serde_json::to_string(snapshots)?;

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        tx.execute(
            r#"INSERT INTO induction_plan (
                plan_id, decision_date, mode, status, generated_at,
                plan_json, snapshots_json, config_snapshot_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &plan.plan_id,
                plan.decision_date.to_string(),
                plan.mode.to_db_str(),
                plan.status.to_db_str(),
                plan.generated_at.to_rfc3339(),
                plan_json,
                snapshots_json,
                config_snapshot_json,
            ],
        )?;
        for assignment in &plan.assignments {
            insert_assignment(&tx, &plan.plan_id, assignment, plan.generated_at)?;
        }
        if with_conflicts {
            insert_plan_conflicts(&tx, &plan.plan_id, &plan.conflicts)?;
        }
        tx.commit()?;

        debug!(
            plan_id = %plan.plan_id,
            assignments = plan.assignments.len(),
            conflicts = if with_conflicts { plan.conflicts.len() } else { 0 },
            "plan saved"
        );
        Ok(())
    }

    /// 按 plan_id 查询方案 (指派取最新版本,状态取审批列)
    pub fn find_by_id(&self, plan_id: &str) -> RepositoryResult<Option<Plan>> {
        let row = {
            let conn = self.get_conn()?;
            conn.query_row(
                "SELECT plan_json, status FROM induction_plan WHERE plan_id = ?1",
                params![plan_id],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?
        };

        let Some((plan_json, status)) = row else {
            return Ok(None);
        };
        let mut plan: Plan = serde_json::from_str(&plan_json)?;
        plan.status = PlanStatus::from_str(&status);
        plan.assignments = self.latest_assignments(plan_id)?;
        Ok(Some(plan))
    }

    /// 指定决策日的方案ID (按生成时间降序)
    pub fn list_ids_by_date(&self, decision_date: NaiveDate) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT plan_id FROM induction_plan
               WHERE decision_date = ?1
               ORDER BY generated_at DESC"#,
        )?;
        let ids = stmt
            .query_map(params![decision_date.to_string()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    /// 生成方案时的车队快照
    pub fn load_snapshots(&self, plan_id: &str) -> RepositoryResult<Vec<TrainSnapshot>> {
        let conn = self.get_conn()?;
        let json: String = conn
            .query_row(
                "SELECT snapshots_json FROM induction_plan WHERE plan_id = ?1",
                params![plan_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| not_found(plan_id))?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn load_config_snapshot(&self, plan_id: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let json: Option<Option<String>> = conn
            .query_row(
                "SELECT config_snapshot_json FROM induction_plan WHERE plan_id = ?1",
                params![plan_id],
                |row| row.get(0),
            )
            .optional()?;
        json.ok_or_else(|| not_found(plan_id))
    }

    /// 追加指派版本 (人工覆写)
    ///
    /// 版本号必须严格大于已有最大版本
    pub fn append_assignment_version(
        &self,
        plan_id: &str,
        assignment: &Assignment,
        at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let current: Option<u32> = conn.query_row(
            "SELECT MAX(version) FROM assignment WHERE plan_id = ?1 AND train_id = ?2",
            params![plan_id, &assignment.train_id],
            |row| row.get(0),
        )?;
        let current = current.ok_or_else(|| RepositoryError::NotFound {
            entity: "Assignment".to_string(),
            id: format!("{}/{}", plan_id, assignment.train_id),
        })?;
        if assignment.version <= current {
            return Err(RepositoryError::BusinessRuleViolation(format!(
                "assignment version {} not after {} for train {}",
                assignment.version, current, assignment.train_id
            )));
        }
        insert_assignment(&conn, plan_id, assignment, at)?;
        Ok(())
    }

    /// 各列车最新指派版本 (按 train_id 排序)
    pub fn latest_assignments(&self, plan_id: &str) -> RepositoryResult<Vec<Assignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT train_id, assignment_json FROM assignment
               WHERE plan_id = ?1
               ORDER BY train_id, version"#,
        )?;
        let rows = stmt
            .query_map(params![plan_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        // 同一列车后出现的版本覆盖前者
        let mut latest: BTreeMap<String, String> = BTreeMap::new();
        for (train_id, json) in rows {
            latest.insert(train_id, json);
        }
        latest
            .into_values()
            .map(|json| serde_json::from_str(&json).map_err(RepositoryError::from))
            .collect()
    }

    /// 单列车全部指派版本 (版本升序)
    pub fn assignment_history(&self, plan_id: &str, train_id: &str) -> RepositoryResult<Vec<Assignment>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT assignment_json FROM assignment
               WHERE plan_id = ?1 AND train_id = ?2
               ORDER BY version"#,
        )?;
        let rows = stmt
            .query_map(params![plan_id, train_id], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(RepositoryError::from))
            .collect()
    }

    /// 审批方案 (DRAFT → APPROVED)
    pub fn mark_approved(&self, plan_id: &str, approved_by: &str, at: DateTime<Utc>) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let status: String = conn
            .query_row(
                "SELECT status FROM induction_plan WHERE plan_id = ?1",
                params![plan_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| not_found(plan_id))?;

        if PlanStatus::from_str(&status) != PlanStatus::Draft {
            return Err(RepositoryError::InvalidStateTransition {
                from: status,
                to: PlanStatus::Approved.to_db_str().to_string(),
            });
        }

        conn.execute(
            r#"UPDATE induction_plan
               SET status = ?1, approved_by = ?2, approved_at = ?3
               WHERE plan_id = ?4"#,
            params![PlanStatus::Approved.to_db_str(), approved_by, at.to_rfc3339(), plan_id],
        )?;
        Ok(())
    }

    pub fn approval(&self, plan_id: &str) -> RepositoryResult<Option<ApprovalRecord>> {
        let conn = self.get_conn()?;
        let row: Option<(Option<String>, Option<String>)> = conn
            .query_row(
                "SELECT approved_by, approved_at FROM induction_plan WHERE plan_id = ?1",
                params![plan_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            None => Err(not_found(plan_id)),
            Some((Some(approved_by), Some(approved_at))) => Ok(Some(ApprovalRecord {
                approved_by,
                approved_at: parse_ts("approved_at", &approved_at)?,
            })),
            Some(_) => Ok(None),
        }
    }
}

fn insert_assignment(
    conn: &Connection,
    plan_id: &str,
    assignment: &Assignment,
    at: DateTime<Utc>,
) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO assignment (
            plan_id, train_id, version, action, overall_score,
            service_rank, assignment_json, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
        params![
            plan_id,
            &assignment.train_id,
            assignment.version,
            assignment.action.to_db_str(),
            assignment.overall_score,
            assignment.service_rank,
            serde_json::to_string(assignment)?,
            at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn not_found(plan_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "InductionPlan".to_string(),
        id: plan_id.to_string(),
    }
}

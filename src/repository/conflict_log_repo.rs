// ==========================================
// 地铁列车夜间投运决策系统 - 冲突日志仓储
// ==========================================
// 红线: 冲突与裁决只追加不删除
// ==========================================

use crate::domain::conflict::{Conflict, ConflictResolution};
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

pub struct ConflictLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ConflictLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 记录方案的全部冲突及引擎裁决
    ///
    /// # 返回
    /// 写入的冲突数
    pub fn record_plan_conflicts(&self, plan_id: &str, conflicts: &[Conflict]) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        insert_plan_conflicts(&tx, plan_id, conflicts)?;
        tx.commit()?;
        Ok(conflicts.len())
    }

    /// 追加人工裁决
    pub fn append_resolution(
        &self,
        plan_id: &str,
        conflict_id: &str,
        resolution: &ConflictResolution,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        insert_resolution(&conn, plan_id, conflict_id, resolution)
    }

    /// 读取方案冲突 (裁决按追加顺序还原)
    pub fn list_for_plan(&self, plan_id: &str) -> RepositoryResult<Vec<Conflict>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT conflict_id, conflict_json FROM conflict_log
               WHERE plan_id = ?1
               ORDER BY conflict_id"#,
        )?;
        let rows = stmt
            .query_map(params![plan_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut res_stmt = conn.prepare(
            r#"SELECT resolution_json FROM conflict_resolution
               WHERE plan_id = ?1 AND conflict_id = ?2
               ORDER BY resolution_id"#,
        )?;

        let mut conflicts = Vec::with_capacity(rows.len());
        for (conflict_id, json) in rows {
            let mut conflict: Conflict = serde_json::from_str(&json)?;
            let resolutions = res_stmt
                .query_map(params![plan_id, &conflict_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<String>, _>>()?;
            conflict.resolutions = resolutions
                .iter()
                .map(|r| serde_json::from_str(r))
                .collect::<Result<Vec<ConflictResolution>, _>>()?;
            conflicts.push(conflict);
        }
        Ok(conflicts)
    }
}

/// 写入冲突及其裁决 (由调用方控制事务)
pub(crate) fn insert_plan_conflicts(
    conn: &Connection,
    plan_id: &str,
    conflicts: &[Conflict],
) -> RepositoryResult<()> {
    for conflict in conflicts {
        let detected_at = conflict
            .resolutions
            .first()
            .map(|r| r.resolved_at.to_rfc3339())
            .unwrap_or_else(|| chrono::Utc::now().to_rfc3339());
        conn.execute(
            r#"INSERT INTO conflict_log (
                plan_id, conflict_id, kind, severity, train_ids, conflict_json, detected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
            params![
                plan_id,
                &conflict.conflict_id,
                conflict.kind.to_db_str(),
                conflict.severity.to_db_str(),
                conflict.train_ids.join(","),
                serde_json::to_string(conflict)?,
                detected_at,
            ],
        )?;
        for resolution in &conflict.resolutions {
            insert_resolution(conn, plan_id, &conflict.conflict_id, resolution)?;
        }
    }
    Ok(())
}

fn insert_resolution(
    conn: &Connection,
    plan_id: &str,
    conflict_id: &str,
    resolution: &ConflictResolution,
) -> RepositoryResult<()> {
    conn.execute(
        r#"INSERT INTO conflict_resolution (
            plan_id, conflict_id, rule, resolved_by, resolution_json, resolved_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        params![
            plan_id,
            conflict_id,
            resolution.rule.to_db_str(),
            &resolution.resolved_by,
            serde_json::to_string(resolution)?,
            resolution.resolved_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

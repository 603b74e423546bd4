// ==========================================
// 地铁列车夜间投运决策系统 - 应急日志仓储
// ==========================================
// 职责: 应急实例快照 + 状态迁移流水 (只追加)
// ==========================================

use crate::domain::emergency::{EmergencyInstance, PhaseTransition};
use crate::domain::types::EmergencyPhase;
use crate::repository::error::{parse_ts, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

pub struct EmergencyLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl EmergencyLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入实例当前状态,并追加尚未记录的状态迁移
    ///
    /// # 返回
    /// 本次新追加的迁移数
    pub fn record(&self, instance: &EmergencyInstance) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().to_rfc3339();

        tx.execute(
            r#"INSERT INTO emergency_log (
                emergency_id, withdrawn_train_id, fault_code, fault_severity,
                event_ts, phase, instance_json, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(emergency_id) DO UPDATE SET
                phase = excluded.phase,
                instance_json = excluded.instance_json,
                updated_at = excluded.updated_at"#,
            params![
                instance.emergency_id(),
                &instance.event.withdrawn_train_id,
                &instance.event.fault_code,
                instance.event.fault_severity.to_string(),
                instance.event.timestamp.to_rfc3339(),
                instance.phase.to_db_str(),
                serde_json::to_string(instance)?,
                now,
            ],
        )?;

        let recorded: usize = tx.query_row(
            "SELECT COUNT(*) FROM emergency_transition WHERE emergency_id = ?1",
            params![instance.emergency_id()],
            |row| row.get::<_, i64>(0),
        )? as usize;

        let pending = instance.transitions.iter().skip(recorded);
        let mut appended = 0;
        for t in pending {
            tx.execute(
                r#"INSERT INTO emergency_transition (emergency_id, from_phase, to_phase, reason, at)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
                params![
                    instance.emergency_id(),
                    t.from.to_db_str(),
                    t.to.to_db_str(),
                    &t.reason,
                    t.at.to_rfc3339(),
                ],
            )?;
            appended += 1;
        }
        tx.commit()?;
        Ok(appended)
    }

    pub fn find_by_id(&self, emergency_id: &str) -> RepositoryResult<Option<EmergencyInstance>> {
        let conn = self.get_conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT instance_json FROM emergency_log WHERE emergency_id = ?1",
                params![emergency_id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(RepositoryError::from))
            .transpose()
    }

    /// 状态迁移流水 (追加顺序)
    pub fn transitions(&self, emergency_id: &str) -> RepositoryResult<Vec<PhaseTransition>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT from_phase, to_phase, reason, at FROM emergency_transition
               WHERE emergency_id = ?1
               ORDER BY transition_id"#,
        )?;
        let rows = stmt
            .query_map(params![emergency_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(from, to, reason, at)| {
                Ok(PhaseTransition {
                    from: parse_phase(&from)?,
                    to: parse_phase(&to)?,
                    reason,
                    at: parse_ts("at", &at)?,
                })
            })
            .collect()
    }

    /// 未关闭的应急ID
    pub fn list_open_ids(&self) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"SELECT emergency_id FROM emergency_log
               WHERE phase <> ?1
               ORDER BY event_ts"#,
        )?;
        let ids = stmt
            .query_map(params![EmergencyPhase::Resolved.to_db_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

fn parse_phase(value: &str) -> RepositoryResult<EmergencyPhase> {
    EmergencyPhase::parse(value).ok_or_else(|| RepositoryError::FieldValueError {
        field: "phase".to_string(),
        message: format!("unknown phase {}", value),
    })
}

// ==========================================
// 地铁列车夜间投运决策系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout,减少并发写入时的偶发 busy 错误
// - 提供持久化适配层的建表语句 (决策核心不依赖存储)
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout (毫秒)
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明:
/// - foreign_keys 需要"每个连接"单独开启
/// - busy_timeout 需要"每个连接"单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let mut conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    crate::perf::install_sqlite_tracing(&mut conn);
    Ok(conn)
}

/// 建表 (幂等)
///
/// 表:
/// - config_kv: 配置键值
/// - induction_plan: 方案头 + 输入快照 JSON
/// - assignment: 指派版本 (只追加)
/// - conflict_log / conflict_resolution: 冲突与裁决 (只追加)
/// - emergency_log / emergency_transition: 应急事件与状态迁移
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS induction_plan (
            plan_id TEXT PRIMARY KEY,
            decision_date TEXT NOT NULL,
            mode TEXT NOT NULL,
            status TEXT NOT NULL,
            generated_at TEXT NOT NULL,
            approved_by TEXT,
            approved_at TEXT,
            plan_json TEXT NOT NULL,
            snapshots_json TEXT NOT NULL,
            config_snapshot_json TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_induction_plan_date
            ON induction_plan (decision_date, status);

        CREATE TABLE IF NOT EXISTS assignment (
            plan_id TEXT NOT NULL REFERENCES induction_plan(plan_id),
            train_id TEXT NOT NULL,
            version INTEGER NOT NULL,
            action TEXT NOT NULL,
            overall_score REAL NOT NULL,
            service_rank INTEGER,
            assignment_json TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (plan_id, train_id, version)
        );

        CREATE TABLE IF NOT EXISTS conflict_log (
            plan_id TEXT NOT NULL REFERENCES induction_plan(plan_id),
            conflict_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            severity TEXT NOT NULL,
            train_ids TEXT NOT NULL,
            conflict_json TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            PRIMARY KEY (plan_id, conflict_id)
        );

        CREATE TABLE IF NOT EXISTS conflict_resolution (
            resolution_id INTEGER PRIMARY KEY AUTOINCREMENT,
            plan_id TEXT NOT NULL,
            conflict_id TEXT NOT NULL,
            rule TEXT NOT NULL,
            resolved_by TEXT NOT NULL,
            resolution_json TEXT NOT NULL,
            resolved_at TEXT NOT NULL,
            FOREIGN KEY (plan_id, conflict_id) REFERENCES conflict_log(plan_id, conflict_id)
        );

        CREATE TABLE IF NOT EXISTS emergency_log (
            emergency_id TEXT PRIMARY KEY,
            withdrawn_train_id TEXT NOT NULL,
            fault_code TEXT NOT NULL,
            fault_severity TEXT NOT NULL,
            event_ts TEXT NOT NULL,
            phase TEXT NOT NULL,
            instance_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS emergency_transition (
            transition_id INTEGER PRIMARY KEY AUTOINCREMENT,
            emergency_id TEXT NOT NULL REFERENCES emergency_log(emergency_id),
            from_phase TEXT NOT NULL,
            to_phase TEXT NOT NULL,
            reason TEXT NOT NULL,
            at TEXT NOT NULL
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

/// 读取 schema_version (若表不存在则返回 None)
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

// ==========================================
// 地铁列车夜间投运决策系统 - 性能观测
// ==========================================
// 职责: 流水线阶段耗时日志 (target = "perf") + SQLite 慢查询日志
// 说明: 阶段超出预算时 warn,不影响运行结果
// ==========================================

use rusqlite::Connection;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

static PERF_SQL_ENABLED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_THRESHOLD_MS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static SQL_COUNT: Cell<u64> = Cell::new(0);
}

fn is_true(v: &str) -> bool {
    matches!(
        v.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "y" | "on"
    )
}

fn truncate_sql(sql: &str, max_len: usize) -> String {
    let s = sql.trim().replace('\n', " ");
    match s.char_indices().nth(max_len) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s,
    }
}

/// 安装 SQLite 语句 trace/profile (SQL 计数 + 慢查询日志)
///
/// 开关:
/// - Debug 默认开启; Release 默认关闭
/// - `METRO_INDUCTION_PERF_SQL=1` 强制开启
/// - `METRO_INDUCTION_SLOW_SQL_MS=50` 慢 SQL 阈值 (毫秒)
pub fn install_sqlite_tracing(conn: &mut Connection) {
    let enabled = match std::env::var("METRO_INDUCTION_PERF_SQL") {
        Ok(v) => is_true(&v),
        Err(_) => cfg!(debug_assertions),
    };
    PERF_SQL_ENABLED.store(enabled, Ordering::Relaxed);

    if !enabled {
        conn.trace(None);
        conn.profile(None);
        return;
    }

    let slow_ms = std::env::var("METRO_INDUCTION_SLOW_SQL_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });
    SLOW_SQL_THRESHOLD_MS.store(slow_ms, Ordering::Relaxed);

    conn.trace(Some(sql_trace_callback));
    conn.profile(Some(sql_profile_callback));
}

fn sql_trace_callback(_sql: &str) {
    if PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        SQL_COUNT.with(|c| c.set(c.get().saturating_add(1)));
    }
}

fn sql_profile_callback(sql: &str, duration: Duration) {
    if !PERF_SQL_ENABLED.load(Ordering::Relaxed) {
        return;
    }
    let ms = duration.as_millis() as u64;
    let threshold = SLOW_SQL_THRESHOLD_MS.load(Ordering::Relaxed);
    if threshold > 0 && ms >= threshold {
        tracing::warn!(
            target: "slow_sql",
            duration_ms = ms,
            sql = %truncate_sql(sql, 420),
            "slow sql"
        );
    }
}

/// 阶段耗时 Guard: drop 时记录 elapsed_ms,超预算时告警
///
/// ```ignore
/// let _perf = metro_induction::perf::PerfGuard::with_budget("rank", budget);
/// ```
pub struct PerfGuard {
    op: &'static str,
    start: Instant,
    budget: Option<Duration>,
    sql_start: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        Self {
            op,
            start: Instant::now(),
            budget: None,
            sql_start: SQL_COUNT.with(|c| c.get()),
        }
    }

    pub fn with_budget(op: &'static str, budget: Duration) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new(op)
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;
        let sql_count = SQL_COUNT.with(|c| c.get()).saturating_sub(self.sql_start);

        match self.budget {
            Some(budget) if elapsed > budget => {
                tracing::warn!(
                    target: "perf",
                    op = self.op,
                    elapsed_ms,
                    budget_ms = budget.as_millis() as u64,
                    sql_count,
                    "over budget"
                );
            }
            _ => {
                tracing::info!(target: "perf", op = self.op, elapsed_ms, sql_count, "done");
            }
        }
    }
}

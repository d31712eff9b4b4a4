//! Activity log — the audit trail every execution attempt leaves behind.
//!
//! Append-mostly: a record is inserted as `started` and updated in place to
//! exactly one terminal status. Never deleted here; retention is someone
//! else's problem. The rate gate reads `count_today` from this log, which
//! makes it the source of truth for "how often did this account act today".

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use moltclaw_core::error::{MoltClawError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityStatus {
    Started,
    Completed,
    Failed,
    Skipped,
}

impl ActivityStatus {
    fn as_str(&self) -> &'static str {
        match self {
            ActivityStatus::Started => "started",
            ActivityStatus::Completed => "completed",
            ActivityStatus::Failed => "failed",
            ActivityStatus::Skipped => "skipped",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => ActivityStatus::Completed,
            "failed" => ActivityStatus::Failed,
            "skipped" => ActivityStatus::Skipped,
            _ => ActivityStatus::Started,
        }
    }
}

/// One execution attempt.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRecord {
    pub id: String,
    pub agent_id: String,
    pub account_id: String,
    /// None for manually triggered actions.
    pub schedule_id: Option<String>,
    /// Action kind tag ("post", "engage", ...).
    pub action: String,
    /// Params snapshot at execution time.
    pub params: serde_json::Value,
    pub status: ActivityStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub duration_ms: Option<u64>,
}

/// Filter for activity queries. Every field is optional and they compose
/// with AND; the empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub account_id: Option<String>,
    pub agent_id: Option<String>,
    /// Action kind tag ("post", "engage", ...).
    pub action: Option<String>,
    /// Inclusive lower bound.
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub until: Option<DateTime<Utc>>,
}

/// SQLite-backed activity log.
pub struct ActivityLog {
    conn: Mutex<Connection>,
}

impl ActivityLog {
    /// Open or create the activity database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MoltClawError::Store(format!("activity db open: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS activity (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                schedule_id TEXT,
                action TEXT NOT NULL,
                params TEXT NOT NULL DEFAULT '{}',
                status TEXT NOT NULL DEFAULT 'started',
                result TEXT,
                error TEXT,
                timestamp TEXT NOT NULL,
                duration_ms INTEGER
            );
            CREATE INDEX IF NOT EXISTS idx_activity_account_action
                ON activity (account_id, action, timestamp);",
        )
        .map_err(|e| MoltClawError::Store(format!("activity migration: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MoltClawError::Store(format!("activity lock poisoned: {e}")))
    }

    /// Record the start of an execution attempt. Returns the attempt id.
    pub fn record_started(
        &self,
        agent_id: &str,
        account_id: &str,
        schedule_id: Option<&str>,
        action: &str,
        params: &serde_json::Value,
    ) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        self.lock()?
            .execute(
                "INSERT INTO activity (id, agent_id, account_id, schedule_id, action, params, status, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'started', ?7)",
                rusqlite::params![
                    id,
                    agent_id,
                    account_id,
                    schedule_id,
                    action,
                    params.to_string(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(|e| MoltClawError::Store(format!("record started: {e}")))?;
        Ok(id)
    }

    /// Resolve an attempt as completed.
    pub fn record_completed(
        &self,
        id: &str,
        result: &serde_json::Value,
        duration_ms: u64,
    ) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE activity SET status = 'completed', result = ?1, duration_ms = ?2 WHERE id = ?3",
                rusqlite::params![result.to_string(), duration_ms as i64, id],
            )
            .map_err(|e| MoltClawError::Store(format!("record completed: {e}")))?;
        Ok(())
    }

    /// Resolve an attempt as failed.
    pub fn record_failed(&self, id: &str, error: &str, duration_ms: Option<u64>) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE activity SET status = 'failed', error = ?1, duration_ms = ?2 WHERE id = ?3",
                rusqlite::params![error, duration_ms.map(|d| d as i64), id],
            )
            .map_err(|e| MoltClawError::Store(format!("record failed: {e}")))?;
        Ok(())
    }

    /// Resolve an attempt as skipped (precondition not met, no platform call).
    pub fn record_skipped(&self, id: &str, reason: &str) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE activity SET status = 'skipped', error = ?1 WHERE id = ?2",
                rusqlite::params![reason, id],
            )
            .map_err(|e| MoltClawError::Store(format!("record skipped: {e}")))?;
        Ok(())
    }

    /// Count of terminal, non-skipped attempts for (account, action) in the
    /// current UTC calendar day. This is what the rate gate's daily cap reads.
    pub fn count_today(&self, account_id: &str, action: &str) -> Result<u32> {
        let day_start = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc()
            .to_rfc3339();
        let count: i64 = self
            .lock()?
            .query_row(
                "SELECT COUNT(*) FROM activity
                 WHERE account_id = ?1 AND action = ?2
                   AND status IN ('completed', 'failed')
                   AND timestamp >= ?3",
                rusqlite::params![account_id, action, day_start],
                |row| row.get(0),
            )
            .map_err(|e| MoltClawError::Store(format!("count today: {e}")))?;
        Ok(count as u32)
    }

    /// Fetch a single record by attempt id.
    pub fn get(&self, id: &str) -> Result<Option<ActivityRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, agent_id, account_id, schedule_id, action, params, status, result, error, timestamp, duration_ms
                 FROM activity WHERE id = ?1",
            )
            .map_err(|e| MoltClawError::Store(format!("get activity: {e}")))?;
        let mut rows = stmt
            .query_map([id], row_to_record)
            .map_err(|e| MoltClawError::Store(format!("get activity: {e}")))?;
        Ok(rows.next().transpose().unwrap_or(None))
    }

    /// Most recent records, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ActivityRecord>> {
        self.query(&ActivityFilter::default(), limit)
    }

    /// Filtered listing by account, agent, action kind, and time range,
    /// newest first. RFC3339 text timestamps compare lexicographically.
    pub fn query(&self, filter: &ActivityFilter, limit: usize) -> Result<Vec<ActivityRecord>> {
        let mut sql = String::from(
            "SELECT id, agent_id, account_id, schedule_id, action, params, status, result, error, timestamp, duration_ms
             FROM activity",
        );
        let mut clauses: Vec<&str> = Vec::new();
        let mut params: Vec<String> = Vec::new();

        if let Some(account_id) = &filter.account_id {
            clauses.push("account_id = ?");
            params.push(account_id.clone());
        }
        if let Some(agent_id) = &filter.agent_id {
            clauses.push("agent_id = ?");
            params.push(agent_id.clone());
        }
        if let Some(action) = &filter.action {
            clauses.push("action = ?");
            params.push(action.clone());
        }
        if let Some(since) = filter.since {
            clauses.push("timestamp >= ?");
            params.push(since.to_rfc3339());
        }
        if let Some(until) = filter.until {
            clauses.push("timestamp < ?");
            params.push(until.to_rfc3339());
        }
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY timestamp DESC LIMIT {limit}"));

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| MoltClawError::Store(format!("query activity: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params.iter()), row_to_record)
            .map_err(|e| MoltClawError::Store(format!("query activity: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<ActivityRecord> {
    let params_str: String = row.get(5)?;
    let result_str: Option<String> = row.get(7)?;
    let timestamp_str: String = row.get(9)?;
    let duration: Option<i64> = row.get(10)?;
    Ok(ActivityRecord {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        account_id: row.get(2)?,
        schedule_id: row.get(3)?,
        action: row.get(4)?,
        params: serde_json::from_str(&params_str).unwrap_or_default(),
        status: ActivityStatus::parse(&row.get::<_, String>(6)?),
        result: result_str.and_then(|s| serde_json::from_str(&s).ok()),
        error: row.get(8)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        duration_ms: duration.map(|d| d as u64),
    })
}

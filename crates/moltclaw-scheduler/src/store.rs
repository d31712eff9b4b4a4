//! SQLite-backed schedule store.
//!
//! All writes are whole-row read-modify-write serialized by the connection
//! mutex, so concurrent firings for different schedules never interleave
//! partial writes. A short-TTL read cache absorbs read bursts between
//! writes; every write path invalidates it. Every create/update/delete
//! publishes on the `schedule:changed` topic.

use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::Connection;

use moltclaw_core::error::{MoltClawError, Result};

use crate::bus::{ChangeAction, EventBus};
use crate::schedule::{RateLimit, Schedule, SchedulePatch, ScheduleAction, Timing};

pub struct ScheduleStore {
    conn: Mutex<Connection>,
    bus: EventBus,
    cache: Mutex<Option<(Instant, Vec<Schedule>)>>,
    cache_ttl: Duration,
}

impl ScheduleStore {
    /// Open or create the schedule database.
    pub fn open(path: &Path, bus: EventBus, cache_ttl: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MoltClawError::Store(format!("schedule db open: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schedules (
                id TEXT PRIMARY KEY,
                agent_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                action TEXT NOT NULL,        -- JSON, tagged by 'type'
                timing TEXT NOT NULL,        -- JSON, tagged by 'type'
                rate_limit TEXT,             -- JSON or NULL
                enabled INTEGER NOT NULL DEFAULT 1,
                last_run TEXT,
                run_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(|e| MoltClawError::Store(format!("schedule migration: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
            bus,
            cache: Mutex::new(None),
            cache_ttl,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MoltClawError::Store(format!("schedule lock poisoned: {e}")))
    }

    fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            *cache = None;
        }
    }

    /// Persist a new schedule and announce it.
    pub fn create(&self, schedule: Schedule) -> Result<Schedule> {
        self.write_row(&schedule, true)?;
        self.invalidate();
        self.bus.publish_change(ChangeAction::Create, &schedule.id);
        tracing::info!("📅 Schedule created: {} ({})", schedule.action.kind(), schedule.id);
        Ok(schedule)
    }

    /// Fetch one schedule by id.
    pub fn get(&self, id: &str) -> Result<Option<Schedule>> {
        if let Ok(cache) = self.cache.lock()
            && let Some((at, schedules)) = cache.as_ref()
            && at.elapsed() < self.cache_ttl
        {
            return Ok(schedules.iter().find(|s| s.id == id).cloned());
        }

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLS} WHERE id = ?1"))
            .map_err(|e| MoltClawError::Store(format!("get schedule: {e}")))?;
        let mut rows = stmt
            .query_map([id], row_to_schedule)
            .map_err(|e| MoltClawError::Store(format!("get schedule: {e}")))?;
        Ok(rows.next().transpose().unwrap_or(None))
    }

    /// List all schedules (read-through cache, ~2s TTL).
    pub fn list(&self) -> Result<Vec<Schedule>> {
        if let Ok(cache) = self.cache.lock()
            && let Some((at, schedules)) = cache.as_ref()
            && at.elapsed() < self.cache_ttl
        {
            return Ok(schedules.clone());
        }

        let schedules = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(&format!("{SELECT_COLS} ORDER BY created_at"))
                .map_err(|e| MoltClawError::Store(format!("list schedules: {e}")))?;
            let rows = stmt
                .query_map([], row_to_schedule)
                .map_err(|e| MoltClawError::Store(format!("list schedules: {e}")))?;
            rows.filter_map(|r| r.ok()).collect::<Vec<_>>()
        };

        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some((Instant::now(), schedules.clone()));
        }
        Ok(schedules)
    }

    /// Apply a partial update. `id` and `created_at` survive any patch;
    /// `updated_at` strictly increases even for back-to-back calls.
    pub fn update(&self, id: &str, patch: SchedulePatch) -> Result<Option<Schedule>> {
        let Some(mut schedule) = self.get_uncached(id)? else {
            return Ok(None);
        };

        if let Some(action) = patch.action {
            schedule.action = action;
        }
        if let Some(timing) = patch.timing {
            schedule.timing = timing;
        }
        if let Some(rate_limit) = patch.rate_limit {
            schedule.rate_limit = rate_limit;
        }
        if let Some(enabled) = patch.enabled {
            schedule.enabled = enabled;
        }
        schedule.updated_at = bump(schedule.updated_at);

        self.write_row(&schedule, false)?;
        self.invalidate();
        self.bus.publish_change(ChangeAction::Update, id);
        Ok(Some(schedule))
    }

    /// Toggle the enabled flag.
    pub fn set_enabled(&self, id: &str, enabled: bool) -> Result<Option<Schedule>> {
        self.update(
            id,
            SchedulePatch {
                enabled: Some(enabled),
                ..Default::default()
            },
        )
    }

    /// Delete a schedule. Returns whether anything was removed.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .lock()?
            .execute("DELETE FROM schedules WHERE id = ?1", [id])
            .map_err(|e| MoltClawError::Store(format!("delete schedule: {e}")))?;
        if removed > 0 {
            self.invalidate();
            self.bus.publish_change(ChangeAction::Delete, id);
            tracing::info!("🗑️ Schedule deleted: {id}");
        }
        Ok(removed > 0)
    }

    /// Bump run statistics for an allowed firing. Internal write: it does
    /// not announce a change, so timers are not torn down by their own
    /// firings. `run_count` bumps before the execute event is published.
    pub fn mark_fired(&self, id: &str, at: DateTime<Utc>) -> Result<Option<Schedule>> {
        let Some(mut schedule) = self.get_uncached(id)? else {
            return Ok(None);
        };
        schedule.run_count += 1;
        schedule.last_run = Some(at);
        schedule.updated_at = bump(schedule.updated_at);
        self.write_row(&schedule, false)?;
        self.invalidate();
        Ok(Some(schedule))
    }

    /// Read one row straight from SQLite, bypassing the cache. Writers use
    /// this so read-modify-write never starts from stale data.
    fn get_uncached(&self, id: &str) -> Result<Option<Schedule>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&format!("{SELECT_COLS} WHERE id = ?1"))
            .map_err(|e| MoltClawError::Store(format!("get schedule: {e}")))?;
        let mut rows = stmt
            .query_map([id], row_to_schedule)
            .map_err(|e| MoltClawError::Store(format!("get schedule: {e}")))?;
        Ok(rows.next().transpose().unwrap_or(None))
    }

    fn write_row(&self, s: &Schedule, insert: bool) -> Result<()> {
        let sql = if insert {
            "INSERT INTO schedules
             (id, agent_id, account_id, action, timing, rate_limit, enabled, last_run, run_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        } else {
            "INSERT OR REPLACE INTO schedules
             (id, agent_id, account_id, action, timing, rate_limit, enabled, last_run, run_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
        };
        self.lock()?
            .execute(
                sql,
                rusqlite::params![
                    s.id,
                    s.agent_id,
                    s.account_id,
                    serde_json::to_string(&s.action)?,
                    serde_json::to_string(&s.timing)?,
                    s.rate_limit
                        .as_ref()
                        .map(serde_json::to_string)
                        .transpose()?,
                    s.enabled as i32,
                    s.last_run.map(|t| t.to_rfc3339()),
                    s.run_count,
                    s.created_at.to_rfc3339(),
                    s.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| MoltClawError::Store(format!("write schedule: {e}")))?;
        Ok(())
    }
}

const SELECT_COLS: &str = "SELECT id, agent_id, account_id, action, timing, rate_limit, enabled, last_run, run_count, created_at, updated_at FROM schedules";

/// Strictly-increasing updated_at, even when the clock hasn't moved.
fn bump(prev: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > prev {
        now
    } else {
        prev + chrono::Duration::milliseconds(1)
    }
}

fn row_to_schedule(row: &rusqlite::Row<'_>) -> rusqlite::Result<Schedule> {
    let action_str: String = row.get(3)?;
    let timing_str: String = row.get(4)?;
    let rate_limit_str: Option<String> = row.get(5)?;
    let last_run_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(9)?;
    let updated_str: String = row.get(10)?;

    let action: ScheduleAction = serde_json::from_str(&action_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let timing: Timing = serde_json::from_str(&timing_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let rate_limit: Option<RateLimit> =
        rate_limit_str.and_then(|s| serde_json::from_str(&s).ok());

    Ok(Schedule {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        account_id: row.get(2)?,
        action,
        timing,
        rate_limit,
        enabled: row.get::<_, i32>(6)? != 0,
        last_run: last_run_str
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|d| d.with_timezone(&Utc)),
        run_count: row.get(8)?,
        created_at: DateTime::parse_from_rfc3339(&created_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        updated_at: DateTime::parse_from_rfc3339(&updated_str)
            .map(|d| d.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::{ScheduleAction, Timing};

    fn temp_store(name: &str) -> (ScheduleStore, EventBus, std::path::PathBuf) {
        let dir = std::env::temp_dir().join(format!("moltclaw-store-{name}"));
        std::fs::create_dir_all(&dir).ok();
        let path = dir.join("schedules.db");
        std::fs::remove_file(&path).ok();
        let bus = EventBus::default();
        let store = ScheduleStore::open(&path, bus.clone(), Duration::from_secs(2)).unwrap();
        (store, bus, dir)
    }

    fn vote_schedule() -> Schedule {
        Schedule::new(
            "agent-1",
            "acct-1",
            ScheduleAction::Vote {
                post_id: None,
                comment_id: None,
                direction: Default::default(),
            },
            Timing::Interval { every_ms: 60_000 },
        )
    }

    #[test]
    fn test_create_get_list_delete() {
        let (store, _bus, dir) = temp_store("crud");
        let created = store.create(vote_schedule()).unwrap();

        let fetched = store.get(&created.id).unwrap().unwrap();
        assert_eq!(fetched.id, created.id);
        assert_eq!(store.list().unwrap().len(), 1);

        assert!(store.delete(&created.id).unwrap());
        assert!(!store.delete(&created.id).unwrap());
        assert!(store.get(&created.id).unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_update_preserves_id_and_created_at() {
        let (store, _bus, dir) = temp_store("update");
        let created = store.create(vote_schedule()).unwrap();

        let first = store
            .update(
                &created.id,
                SchedulePatch {
                    timing: Some(Timing::Interval { every_ms: 1000 }),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(first.id, created.id);
        assert_eq!(first.created_at, created.created_at);
        assert!(first.updated_at > created.updated_at);

        // Back-to-back update: updated_at must still strictly increase.
        let second = store
            .update(
                &created.id,
                SchedulePatch {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert!(second.updated_at > first.updated_at);
        assert!(!second.enabled);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_update_missing_returns_none() {
        let (store, _bus, dir) = temp_store("missing");
        assert!(store.update("nope", SchedulePatch::default()).unwrap().is_none());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_cache_invalidated_on_write() {
        let (store, _bus, dir) = temp_store("cache");
        let created = store.create(vote_schedule()).unwrap();

        // Prime the cache.
        let _ = store.list().unwrap();
        store.set_enabled(&created.id, false).unwrap();

        // A read right after the write must see the new value.
        let fetched = store.get(&created.id).unwrap().unwrap();
        assert!(!fetched.enabled);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_crud_publishes_changes() {
        let (store, bus, dir) = temp_store("events");
        let mut rx = bus.subscribe_changed();

        let created = store.create(vote_schedule()).unwrap();
        store.set_enabled(&created.id, false).unwrap();
        store.delete(&created.id).unwrap();

        assert_eq!(rx.recv().await.unwrap().action, ChangeAction::Create);
        assert_eq!(rx.recv().await.unwrap().action, ChangeAction::Update);
        assert_eq!(rx.recv().await.unwrap().action, ChangeAction::Delete);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_toggle_preserves_run_stats() {
        // Re-enabling must not reset last_run/run_count, or a disable/enable
        // cycle would launder the cooldown.
        let (store, _bus, dir) = temp_store("toggle");
        let created = store.create(vote_schedule()).unwrap();
        store.mark_fired(&created.id, Utc::now()).unwrap();

        store.set_enabled(&created.id, false).unwrap();
        let back = store.set_enabled(&created.id, true).unwrap().unwrap();
        assert_eq!(back.run_count, 1);
        assert!(back.last_run.is_some());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_mark_fired_bumps_without_change_event() {
        let (store, bus, dir) = temp_store("fired");
        let created = store.create(vote_schedule()).unwrap();
        let mut rx = bus.subscribe_changed();

        let now = Utc::now();
        let fired = store.mark_fired(&created.id, now).unwrap().unwrap();
        assert_eq!(fired.run_count, 1);
        assert_eq!(fired.last_run, Some(now));

        // No schedule:changed for run-stat bumps.
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::broadcast::error::TryRecvError::Empty)
        ));
        std::fs::remove_dir_all(&dir).ok();
    }
}

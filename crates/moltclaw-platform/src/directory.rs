//! SQLite directory of agent personas and platform accounts.
//!
//! Shares the scheduler's storage conventions: one `Mutex<Connection>`,
//! RFC3339 timestamps, insert-or-replace upserts. The trait methods are
//! what the executor touches at runtime; the upsert/list methods back the
//! CLI's seeding commands.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;

use moltclaw_core::error::{MoltClawError, Result};
use moltclaw_core::traits::{AccountDirectory, AgentDirectory};
use moltclaw_core::types::{Account, AccountStatus, Agent};

pub struct SqliteDirectory {
    conn: Mutex<Connection>,
}

impl SqliteDirectory {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| MoltClawError::Store(format!("directory db open: {e}")))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                persona TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            );
            CREATE TABLE IF NOT EXISTS accounts (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                api_key TEXT NOT NULL,
                last_activity TEXT
            );",
        )
        .map_err(|e| MoltClawError::Store(format!("directory migration: {e}")))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MoltClawError::Store(format!("directory lock poisoned: {e}")))
    }

    pub fn upsert_agent(&self, agent: &Agent) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO agents (id, name, persona, enabled) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![agent.id, agent.name, agent.persona, agent.enabled],
            )
            .map_err(|e| MoltClawError::Store(format!("upsert agent: {e}")))?;
        Ok(())
    }

    pub fn upsert_account(&self, account: &Account) -> Result<()> {
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO accounts (id, username, status, api_key, last_activity)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    account.id,
                    account.username,
                    account.status.to_string(),
                    account.api_key,
                    account.last_activity.map(|t| t.to_rfc3339()),
                ],
            )
            .map_err(|e| MoltClawError::Store(format!("upsert account: {e}")))?;
        Ok(())
    }

    pub fn list_agents(&self) -> Result<Vec<Agent>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, persona, enabled FROM agents ORDER BY name")
            .map_err(|e| MoltClawError::Store(format!("list agents: {e}")))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Agent {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    persona: row.get(2)?,
                    enabled: row.get(3)?,
                })
            })
            .map_err(|e| MoltClawError::Store(format!("list agents: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, username, status, api_key, last_activity FROM accounts ORDER BY username",
            )
            .map_err(|e| MoltClawError::Store(format!("list accounts: {e}")))?;
        let rows = stmt
            .query_map([], row_to_account)
            .map_err(|e| MoltClawError::Store(format!("list accounts: {e}")))?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }
}

fn row_to_account(row: &rusqlite::Row<'_>) -> rusqlite::Result<Account> {
    let status: String = row.get(2)?;
    let last_activity: Option<String> = row.get(4)?;
    Ok(Account {
        id: row.get(0)?,
        username: row.get(1)?,
        status: parse_status(&status),
        api_key: row.get(3)?,
        last_activity: last_activity
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc)),
    })
}

fn parse_status(s: &str) -> AccountStatus {
    match s {
        "suspended" => AccountStatus::Suspended,
        "disabled" => AccountStatus::Disabled,
        _ => AccountStatus::Active,
    }
}

#[async_trait]
impl AgentDirectory for SqliteDirectory {
    async fn get_agent(&self, id: &str) -> Result<Option<Agent>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT id, name, persona, enabled FROM agents WHERE id = ?1")
            .map_err(|e| MoltClawError::Store(format!("get agent: {e}")))?;
        let mut rows = stmt
            .query_map([id], |row| {
                Ok(Agent {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    persona: row.get(2)?,
                    enabled: row.get(3)?,
                })
            })
            .map_err(|e| MoltClawError::Store(format!("get agent: {e}")))?;
        Ok(rows.next().transpose().unwrap_or(None))
    }
}

#[async_trait]
impl AccountDirectory for SqliteDirectory {
    async fn get_account_with_credentials(&self, id: &str) -> Result<Option<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, username, status, api_key, last_activity FROM accounts WHERE id = ?1",
            )
            .map_err(|e| MoltClawError::Store(format!("get account: {e}")))?;
        let mut rows = stmt
            .query_map([id], row_to_account)
            .map_err(|e| MoltClawError::Store(format!("get account: {e}")))?;
        Ok(rows.next().transpose().unwrap_or(None))
    }

    async fn set_status(&self, id: &str, status: AccountStatus) -> Result<()> {
        let changed = self
            .lock()?
            .execute(
                "UPDATE accounts SET status = ?1 WHERE id = ?2",
                rusqlite::params![status.to_string(), id],
            )
            .map_err(|e| MoltClawError::Store(format!("set status: {e}")))?;
        if changed == 0 {
            return Err(MoltClawError::NotFound(format!("account {id}")));
        }
        tracing::info!("🔐 Account {id} status -> {status}");
        Ok(())
    }

    async fn touch_activity(&self, id: &str) -> Result<()> {
        self.lock()?
            .execute(
                "UPDATE accounts SET last_activity = ?1 WHERE id = ?2",
                rusqlite::params![Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| MoltClawError::Store(format!("touch activity: {e}")))?;
        Ok(())
    }
}

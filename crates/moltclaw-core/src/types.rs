//! Domain types shared across the workspace.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persona that acts on Moltbook. Owned by the directory, referenced by
/// schedules via `agent_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: String,
    pub name: String,
    /// Free-form persona description — seeds content generation.
    pub persona: String,
    pub enabled: bool,
}

/// Lifecycle state of a platform credential set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Suspended,
    Disabled,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Suspended => write!(f, "suspended"),
            AccountStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// A Moltbook credential set, resolved with its API key at execution time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    pub status: AccountStatus,
    pub api_key: String,
    pub last_activity: Option<DateTime<Utc>>,
}

/// A post as seen through the platform client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    /// The submolt (community) the post lives in.
    pub submolt: String,
    pub title: String,
    #[serde(default)]
    pub content: String,
    pub author: String,
    #[serde(default)]
    pub score: i64,
}

/// A comment as seen through the platform client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub content: String,
    pub author: String,
}

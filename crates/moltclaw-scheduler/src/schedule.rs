//! Schedule definitions — the core data model for automated engagement.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted schedule: what action to run, how often, under what limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// Unique id, generated at creation, immutable.
    pub id: String,
    /// Which persona acts.
    pub agent_id: String,
    /// Which credential set is used.
    pub account_id: String,
    /// What to do when the timer fires.
    pub action: ScheduleAction,
    /// When/how the timer fires.
    pub timing: Timing,
    /// Optional rate-limit policy evaluated before every firing.
    pub rate_limit: Option<RateLimit>,
    /// Whether the schedule holds an active timer.
    pub enabled: bool,
    /// Last firing that passed the rate gate.
    pub last_run: Option<DateTime<Utc>>,
    /// Count of gate-passing firings (attempted, not necessarily successful).
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What the schedule does when it fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScheduleAction {
    /// Ambient browse with probabilistic engagement.
    Heartbeat {
        #[serde(default = "default_engage_chance")]
        engage_chance: f64,
        #[serde(default = "default_max_engagements")]
        max_engagements: u32,
    },
    /// Publish a post. Missing title/content requests AI generation.
    Post {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        submolt: Option<String>,
    },
    /// Comment on a post (or reply when `parent_id` is set). Missing
    /// `post_id` picks the top relevance candidate; missing `content` is
    /// generated from the thread.
    Comment {
        #[serde(default)]
        post_id: Option<String>,
        #[serde(default)]
        parent_id: Option<String>,
        #[serde(default)]
        content: Option<String>,
    },
    /// Vote on an explicit target, or a random hot-feed post when none given.
    Vote {
        #[serde(default)]
        post_id: Option<String>,
        #[serde(default)]
        comment_id: Option<String>,
        #[serde(default)]
        direction: VoteDirection,
    },
    /// Compound action: bounded, paced voting and commenting across
    /// relevance-ranked candidates.
    Engage {
        #[serde(default = "default_max_votes")]
        max_votes: u32,
        #[serde(default = "default_max_comments")]
        max_comments: u32,
    },
}

fn default_engage_chance() -> f64 {
    0.3
}
fn default_max_engagements() -> u32 {
    3
}
fn default_max_votes() -> u32 {
    3
}
fn default_max_comments() -> u32 {
    1
}

impl ScheduleAction {
    /// Stable tag for activity records and rate-limit keys.
    pub fn kind(&self) -> &'static str {
        match self {
            ScheduleAction::Heartbeat { .. } => "heartbeat",
            ScheduleAction::Post { .. } => "post",
            ScheduleAction::Comment { .. } => "comment",
            ScheduleAction::Vote { .. } => "vote",
            ScheduleAction::Engage { .. } => "engage",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    #[default]
    Up,
    Down,
}

/// When/how the schedule fires. Exactly one variant — enforced by the type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Timing {
    /// Fire on every match of a 5-field cron expression.
    Cron { expression: String },
    /// Fire every `every_ms` milliseconds, forever.
    Interval { every_ms: u64 },
    /// Fire after a uniform delay from [min_ms, max_ms), resampled after
    /// every firing. A fixed cadence would make the account trivially
    /// fingerprintable by periodicity analysis.
    Random { min_ms: u64, max_ms: u64 },
}

/// Per-schedule rate-limit policy. Both checks are independent.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RateLimit {
    #[serde(default)]
    pub max_per_day: Option<u32>,
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
}

/// Partial update applied through the store. `id` and `created_at` are never
/// touched regardless of patch contents.
#[derive(Debug, Clone, Default)]
pub struct SchedulePatch {
    pub action: Option<ScheduleAction>,
    pub timing: Option<Timing>,
    /// `Some(None)` clears the policy, `Some(Some(..))` replaces it.
    pub rate_limit: Option<Option<RateLimit>>,
    pub enabled: Option<bool>,
}

impl Schedule {
    /// Create a new schedule (enabled by default).
    pub fn new(agent_id: &str, account_id: &str, action: ScheduleAction, timing: Timing) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            agent_id: agent_id.to_string(),
            account_id: account_id.to_string(),
            action,
            timing,
            rate_limit: None,
            enabled: true,
            last_run: None,
            run_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_rate_limit(mut self, rate_limit: RateLimit) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }
}

//! Collaborator contracts.
//!
//! The scheduling core talks to the outside world exclusively through these
//! trait objects, so the engine and executor can be tested with in-memory
//! fakes and wired to reqwest/SQLite implementations in production.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Account, AccountStatus, Agent, Comment, Post};

/// Moltbook transport — the action verbs plus the feed reads the executor
/// needs. Implementations must map a platform-reported suspension to
/// `MoltClawError::Suspended`.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn create_post(
        &self,
        api_key: &str,
        submolt: &str,
        title: &str,
        content: &str,
    ) -> Result<Post>;

    async fn create_comment(&self, api_key: &str, post_id: &str, content: &str)
    -> Result<Comment>;

    /// Reply to an existing comment on a post.
    async fn reply_comment(
        &self,
        api_key: &str,
        post_id: &str,
        parent_id: &str,
        content: &str,
    ) -> Result<Comment>;

    async fn upvote_post(&self, api_key: &str, post_id: &str) -> Result<()>;
    async fn downvote_post(&self, api_key: &str, post_id: &str) -> Result<()>;
    async fn upvote_comment(&self, api_key: &str, comment_id: &str) -> Result<()>;
    async fn downvote_comment(&self, api_key: &str, comment_id: &str) -> Result<()>;

    async fn get_post(&self, api_key: &str, post_id: &str) -> Result<Post>;
    async fn hot_feed(&self, api_key: &str, limit: usize) -> Result<Vec<Post>>;
    async fn post_comments(&self, api_key: &str, post_id: &str) -> Result<Vec<Comment>>;

    /// Ambient browse with probabilistic engagement — the heartbeat action.
    /// Returns whatever activity summary the platform reports.
    async fn browse(
        &self,
        api_key: &str,
        engage_chance: f64,
        max_engagements: u32,
    ) -> Result<serde_json::Value>;
}

/// Black-box AI content generation, seeded with the acting persona.
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Generate a post for the given submolt. Returns (title, body).
    async fn generate_post(&self, agent: &Agent, submolt: &str) -> Result<(String, String)>;

    /// Generate a comment for a post, aware of the existing thread.
    async fn generate_comment(
        &self,
        agent: &Agent,
        post: &Post,
        existing: &[Comment],
    ) -> Result<String>;
}

/// Persona lookup.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_agent(&self, id: &str) -> Result<Option<Agent>>;
}

/// Account lookup with credentials, plus the two side effects the executor
/// performs: status transitions and last-activity touches.
#[async_trait]
pub trait AccountDirectory: Send + Sync {
    async fn get_account_with_credentials(&self, id: &str) -> Result<Option<Account>>;
    async fn set_status(&self, id: &str, status: AccountStatus) -> Result<()>;
    async fn touch_activity(&self, id: &str) -> Result<()>;
}

/// Relevance-ranked candidate posts for a persona.
#[async_trait]
pub trait FeedRelevance: Send + Sync {
    async fn relevant_posts(&self, agent: &Agent, api_key: &str, limit: usize)
    -> Result<Vec<Post>>;
}

/// Fine-grained per-account limiter keyed by (api_key, action kind). This is
/// distinct from a schedule's own rate-limit policy: it throttles individual
/// platform calls inside compound actions.
#[async_trait]
pub trait AccountRateLimiter: Send + Sync {
    /// Returns true when another `action` call is allowed for this key.
    async fn check(&self, api_key: &str, action: &str) -> Result<bool>;
}

//! Action executor — turns execute events into platform calls.
//!
//! Subscribes to `schedule:execute`; every event runs in its own spawned
//! task so one slow engage cycle never delays another schedule. Within a
//! firing, execution is strictly sequential, and compound actions pace
//! each sub-call — pacing, not throughput, is the design goal.
//!
//! All collaborator errors are converted into a terminal activity record at
//! this boundary; nothing escapes to the engine's timer tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use moltclaw_core::error::{MoltClawError, Result};
use moltclaw_core::traits::{
    AccountDirectory, AccountRateLimiter, AgentDirectory, ContentGenerator, FeedRelevance,
    PlatformClient,
};
use moltclaw_core::types::{Account, AccountStatus, Agent};

use crate::activity::ActivityLog;
use crate::bus::ExecuteEvent;
use crate::schedule::{Schedule, ScheduleAction, VoteDirection};

/// Everything the executor talks to, behind trait objects.
#[derive(Clone)]
pub struct ExecutorDeps {
    pub platform: Arc<dyn PlatformClient>,
    pub generator: Arc<dyn ContentGenerator>,
    pub agents: Arc<dyn AgentDirectory>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub relevance: Arc<dyn FeedRelevance>,
    pub limiter: Arc<dyn AccountRateLimiter>,
}

pub struct ActionExecutor {
    deps: ExecutorDeps,
    activity: Arc<ActivityLog>,
    /// Inter-operation delay inside compound actions (~1.5s in production).
    pacing: Duration,
}

impl ActionExecutor {
    pub fn new(deps: ExecutorDeps, activity: Arc<ActivityLog>, pacing: Duration) -> Arc<Self> {
        Arc::new(Self {
            deps,
            activity,
            pacing,
        })
    }

    /// Run the subscriber loop. Each received event is handled in its own
    /// task; lagged events are dropped with a warning (the next natural
    /// firing is the only retry mechanism anyway).
    pub fn spawn(self: Arc<Self>, mut rx: broadcast::Receiver<ExecuteEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("🏃 Action executor listening");
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let executor = Arc::clone(&self);
                        tokio::spawn(async move {
                            executor.handle(event).await;
                        });
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("⚠️ Executor lagged, dropped {n} firing(s)");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Handle one firing end to end: resolve, precondition-check, dispatch,
    /// record. Also the entry point for manually triggered runs.
    pub async fn handle(&self, event: ExecuteEvent) {
        let schedule = event.schedule;
        let kind = schedule.action.kind();
        let params = serde_json::to_value(&schedule.action).unwrap_or_default();

        let account = match self
            .deps
            .accounts
            .get_account_with_credentials(&schedule.account_id)
            .await
        {
            Ok(Some(account)) => account,
            Ok(None) => {
                self.record_precondition_failure(&schedule, &params, "account not found");
                return;
            }
            Err(e) => {
                self.record_precondition_failure(
                    &schedule,
                    &params,
                    &format!("account lookup failed: {e}"),
                );
                return;
            }
        };

        if account.status != AccountStatus::Active {
            self.record_precondition_skip(
                &schedule,
                &params,
                &format!("account status: {}", account.status),
            );
            let _ = self.deps.accounts.touch_activity(&account.id).await;
            return;
        }

        let agent = match self.deps.agents.get_agent(&schedule.agent_id).await {
            Ok(Some(agent)) => agent,
            // Deliberately no activity record here, unlike the missing
            // account above.
            Ok(None) => {
                tracing::warn!(
                    "⚠️ Agent {} not found for schedule {}",
                    schedule.agent_id,
                    schedule.id
                );
                let _ = self.deps.accounts.touch_activity(&account.id).await;
                return;
            }
            Err(e) => {
                tracing::warn!("⚠️ Agent lookup failed for schedule {}: {e}", schedule.id);
                let _ = self.deps.accounts.touch_activity(&account.id).await;
                return;
            }
        };

        if !agent.enabled {
            self.record_precondition_skip(&schedule, &params, "agent disabled");
            let _ = self.deps.accounts.touch_activity(&account.id).await;
            return;
        }

        let attempt = match self.activity.record_started(
            &schedule.agent_id,
            &account.id,
            Some(&schedule.id),
            kind,
            &params,
        ) {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!("⚠️ Could not open activity record: {e}");
                return;
            }
        };

        let started = Instant::now();
        let outcome = self.dispatch(&schedule, &agent, &account).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                tracing::info!("✅ {} completed for {} ({duration_ms}ms)", kind, schedule.id);
                if let Err(e) = self.activity.record_completed(&attempt, &result, duration_ms) {
                    tracing::warn!("⚠️ Could not record completion: {e}");
                }
            }
            Err(e) => {
                if e.is_suspension() {
                    tracing::warn!("🚫 Platform suspended account {}", account.id);
                    if let Err(se) = self
                        .deps
                        .accounts
                        .set_status(&account.id, AccountStatus::Suspended)
                        .await
                    {
                        tracing::warn!("⚠️ Could not mark account suspended: {se}");
                    }
                }
                tracing::warn!("❌ {} failed for {}: {e}", kind, schedule.id);
                if let Err(re) =
                    self.activity
                        .record_failed(&attempt, &e.to_string(), Some(duration_ms))
                {
                    tracing::warn!("⚠️ Could not record failure: {re}");
                }
            }
        }

        let _ = self.deps.accounts.touch_activity(&account.id).await;
    }

    async fn dispatch(
        &self,
        schedule: &Schedule,
        agent: &Agent,
        account: &Account,
    ) -> Result<serde_json::Value> {
        match &schedule.action {
            ScheduleAction::Heartbeat {
                engage_chance,
                max_engagements,
            } => {
                self.deps
                    .platform
                    .browse(&account.api_key, *engage_chance, *max_engagements)
                    .await
            }
            ScheduleAction::Post {
                title,
                content,
                submolt,
            } => self.run_post(agent, account, title, content, submolt).await,
            ScheduleAction::Comment {
                post_id,
                parent_id,
                content,
            } => {
                self.run_comment(agent, account, post_id, parent_id, content)
                    .await
            }
            ScheduleAction::Vote {
                post_id,
                comment_id,
                direction,
            } => self.run_vote(account, post_id, comment_id, *direction).await,
            ScheduleAction::Engage {
                max_votes,
                max_comments,
            } => self.run_engage(agent, account, *max_votes, *max_comments).await,
        }
    }

    async fn run_post(
        &self,
        agent: &Agent,
        account: &Account,
        title: &Option<String>,
        content: &Option<String>,
        submolt: &Option<String>,
    ) -> Result<serde_json::Value> {
        let submolt = submolt.clone().unwrap_or_else(|| "general".to_string());
        let (title, content, generated) = match (title, content) {
            (Some(t), Some(c)) => (t.clone(), c.clone(), false),
            (maybe_title, maybe_content) => {
                let (gen_title, gen_content) =
                    self.deps.generator.generate_post(agent, &submolt).await?;
                (
                    maybe_title.clone().unwrap_or(gen_title),
                    maybe_content.clone().unwrap_or(gen_content),
                    true,
                )
            }
        };
        let post = self
            .deps
            .platform
            .create_post(&account.api_key, &submolt, &title, &content)
            .await?;
        Ok(json!({
            "post_id": post.id,
            "submolt": submolt,
            "generated": generated,
        }))
    }

    async fn run_comment(
        &self,
        agent: &Agent,
        account: &Account,
        post_id: &Option<String>,
        parent_id: &Option<String>,
        content: &Option<String>,
    ) -> Result<serde_json::Value> {
        let post = match post_id {
            Some(id) => self.deps.platform.get_post(&account.api_key, id).await?,
            None => self
                .deps
                .relevance
                .relevant_posts(agent, &account.api_key, 1)
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| MoltClawError::NotFound("no relevant post to comment on".into()))?,
        };

        let (text, generated) = match content {
            Some(c) => (c.clone(), false),
            None => {
                let existing = self
                    .deps
                    .platform
                    .post_comments(&account.api_key, &post.id)
                    .await?;
                let text = self
                    .deps
                    .generator
                    .generate_comment(agent, &post, &existing)
                    .await?;
                (text, true)
            }
        };

        let comment = match parent_id {
            Some(parent) => {
                self.deps
                    .platform
                    .reply_comment(&account.api_key, &post.id, parent, &text)
                    .await?
            }
            None => {
                self.deps
                    .platform
                    .create_comment(&account.api_key, &post.id, &text)
                    .await?
            }
        };

        Ok(json!({
            "comment_id": comment.id,
            "post_id": post.id,
            "generated": generated,
        }))
    }

    async fn run_vote(
        &self,
        account: &Account,
        post_id: &Option<String>,
        comment_id: &Option<String>,
        direction: VoteDirection,
    ) -> Result<serde_json::Value> {
        if let Some(comment_id) = comment_id {
            let direction_tag = match direction {
                VoteDirection::Up => {
                    self.deps
                        .platform
                        .upvote_comment(&account.api_key, comment_id)
                        .await?;
                    "up"
                }
                VoteDirection::Down => {
                    self.deps
                        .platform
                        .downvote_comment(&account.api_key, comment_id)
                        .await?;
                    "down"
                }
            };
            return Ok(json!({"comment_id": comment_id, "direction": direction_tag}));
        }

        let (target, random) = match post_id {
            Some(id) => (id.clone(), false),
            None => {
                let feed = self.deps.platform.hot_feed(&account.api_key, 25).await?;
                if feed.is_empty() {
                    return Err(MoltClawError::NotFound("hot feed is empty".into()));
                }
                (feed[pick_index(feed.len())].id.clone(), true)
            }
        };

        let direction_tag = match direction {
            VoteDirection::Up => {
                self.deps
                    .platform
                    .upvote_post(&account.api_key, &target)
                    .await?;
                "up"
            }
            VoteDirection::Down => {
                self.deps
                    .platform
                    .downvote_post(&account.api_key, &target)
                    .await?;
                "down"
            }
        };

        Ok(json!({
            "post_id": target,
            "direction": direction_tag,
            "random": random,
        }))
    }

    /// Compound action: bounded, paced voting then commenting over the same
    /// relevance-ranked candidate set. Each sub-call is pre-checked against
    /// the per-account limiter; a denial stops that phase, a propagated
    /// error (notably suspension) aborts the remaining candidates entirely.
    /// The pacing delay sits between consecutive sub-operations only, never
    /// after the last one.
    async fn run_engage(
        &self,
        agent: &Agent,
        account: &Account,
        max_votes: u32,
        max_comments: u32,
    ) -> Result<serde_json::Value> {
        let want = max_votes.saturating_add(max_comments) as usize;
        let candidates = self
            .deps
            .relevance
            .relevant_posts(agent, &account.api_key, want.max(1))
            .await?;

        let mut votes = 0u32;
        let mut comments = 0u32;
        let mut done = 0u32;

        for post in &candidates {
            if votes >= max_votes {
                break;
            }
            if !self.deps.limiter.check(&account.api_key, "vote").await? {
                tracing::debug!("⏳ Per-account limiter ended voting at {votes}/{max_votes}");
                break;
            }
            if done > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            self.deps
                .platform
                .upvote_post(&account.api_key, &post.id)
                .await?;
            votes += 1;
            done += 1;
        }

        for post in &candidates {
            if comments >= max_comments {
                break;
            }
            if !self.deps.limiter.check(&account.api_key, "comment").await? {
                tracing::debug!(
                    "⏳ Per-account limiter ended commenting at {comments}/{max_comments}"
                );
                break;
            }
            if done > 0 {
                tokio::time::sleep(self.pacing).await;
            }
            let existing = self
                .deps
                .platform
                .post_comments(&account.api_key, &post.id)
                .await?;
            let text = self
                .deps
                .generator
                .generate_comment(agent, post, &existing)
                .await?;
            self.deps
                .platform
                .create_comment(&account.api_key, &post.id, &text)
                .await?;
            comments += 1;
            done += 1;
        }

        Ok(json!({
            "votes": votes,
            "comments": comments,
            "candidates": candidates.len(),
        }))
    }

    /// Started + failed, back to back. Keeps the "started before terminal"
    /// ordering even for attempts that never reach dispatch.
    fn record_precondition_failure(
        &self,
        schedule: &Schedule,
        params: &serde_json::Value,
        error: &str,
    ) {
        match self.activity.record_started(
            &schedule.agent_id,
            &schedule.account_id,
            Some(&schedule.id),
            schedule.action.kind(),
            params,
        ) {
            Ok(id) => {
                if let Err(e) = self.activity.record_failed(&id, error, None) {
                    tracing::warn!("⚠️ Could not record failure: {e}");
                }
            }
            Err(e) => tracing::warn!("⚠️ Could not open activity record: {e}"),
        }
        tracing::warn!("❌ Schedule {} failed preconditions: {error}", schedule.id);
    }

    fn record_precondition_skip(
        &self,
        schedule: &Schedule,
        params: &serde_json::Value,
        reason: &str,
    ) {
        match self.activity.record_started(
            &schedule.agent_id,
            &schedule.account_id,
            Some(&schedule.id),
            schedule.action.kind(),
            params,
        ) {
            Ok(id) => {
                if let Err(e) = self.activity.record_skipped(&id, reason) {
                    tracing::warn!("⚠️ Could not record skip: {e}");
                }
            }
            Err(e) => tracing::warn!("⚠️ Could not open activity record: {e}"),
        }
        tracing::info!("⏭️ Schedule {} skipped: {reason}", schedule.id);
    }
}

/// Uniform index pick — kept out of async bodies, ThreadRng is not Send.
fn pick_index(len: usize) -> usize {
    rand::thread_rng().gen_range(0..len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::Timing;
    use async_trait::async_trait;
    use chrono::Utc;
    use moltclaw_core::types::{Comment, Post};
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    // ─── Mock collaborators ──────────────────────────────────

    #[derive(Default)]
    struct MockPlatform {
        posts_created: AtomicU32,
        comment_attempts: AtomicU32,
        comments_created: AtomicU32,
        votes: AtomicU32,
        downvotes: AtomicU32,
        browse_calls: AtomicU32,
        /// 1-based attempt number at which create_comment reports suspension.
        suspend_on_comment: Option<u32>,
    }

    fn post(id: &str) -> Post {
        Post {
            id: id.into(),
            submolt: "rustaceans".into(),
            title: format!("post {id}"),
            content: "body".into(),
            author: "someone".into(),
            score: 10,
        }
    }

    #[async_trait]
    impl PlatformClient for MockPlatform {
        async fn create_post(
            &self,
            _api_key: &str,
            submolt: &str,
            title: &str,
            _content: &str,
        ) -> Result<Post> {
            self.posts_created.fetch_add(1, Ordering::SeqCst);
            Ok(Post {
                id: "p-new".into(),
                submolt: submolt.into(),
                title: title.into(),
                content: String::new(),
                author: "me".into(),
                score: 1,
            })
        }

        async fn create_comment(
            &self,
            _api_key: &str,
            post_id: &str,
            content: &str,
        ) -> Result<Comment> {
            let attempt = self.comment_attempts.fetch_add(1, Ordering::SeqCst) + 1;
            if Some(attempt) == self.suspend_on_comment {
                return Err(MoltClawError::Suspended("mock".into()));
            }
            self.comments_created.fetch_add(1, Ordering::SeqCst);
            Ok(Comment {
                id: format!("c-{attempt}"),
                post_id: post_id.into(),
                parent_id: None,
                content: content.into(),
                author: "me".into(),
            })
        }

        async fn reply_comment(
            &self,
            api_key: &str,
            post_id: &str,
            parent_id: &str,
            content: &str,
        ) -> Result<Comment> {
            let mut comment = self.create_comment(api_key, post_id, content).await?;
            comment.parent_id = Some(parent_id.into());
            Ok(comment)
        }

        async fn upvote_post(&self, _api_key: &str, _post_id: &str) -> Result<()> {
            self.votes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn downvote_post(&self, _api_key: &str, _post_id: &str) -> Result<()> {
            self.votes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn upvote_comment(&self, _api_key: &str, _comment_id: &str) -> Result<()> {
            self.votes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn downvote_comment(&self, _api_key: &str, _comment_id: &str) -> Result<()> {
            self.downvotes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn get_post(&self, _api_key: &str, post_id: &str) -> Result<Post> {
            Ok(post(post_id))
        }

        async fn hot_feed(&self, _api_key: &str, limit: usize) -> Result<Vec<Post>> {
            Ok((0..limit.min(3)).map(|i| post(&format!("hot-{i}"))).collect())
        }

        async fn post_comments(&self, _api_key: &str, _post_id: &str) -> Result<Vec<Comment>> {
            Ok(vec![])
        }

        async fn browse(
            &self,
            _api_key: &str,
            _engage_chance: f64,
            _max_engagements: u32,
        ) -> Result<serde_json::Value> {
            self.browse_calls.fetch_add(1, Ordering::SeqCst);
            Ok(json!({"engaged": 1}))
        }
    }

    #[derive(Default)]
    struct MockGenerator {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ContentGenerator for MockGenerator {
        async fn generate_post(&self, _agent: &Agent, _submolt: &str) -> Result<(String, String)> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(("Generated title".into(), "Generated body".into()))
        }

        async fn generate_comment(
            &self,
            _agent: &Agent,
            _post: &Post,
            _existing: &[Comment],
        ) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok("Generated comment".into())
        }
    }

    struct MockDirectory {
        agent: Option<Agent>,
        account: Option<Account>,
        status_transitions: StdMutex<Vec<AccountStatus>>,
        touches: AtomicU32,
    }

    impl MockDirectory {
        fn active() -> Self {
            Self {
                agent: Some(Agent {
                    id: "agent-1".into(),
                    name: "Crabby".into(),
                    persona: "a rust enthusiast".into(),
                    enabled: true,
                }),
                account: Some(Account {
                    id: "acct-1".into(),
                    username: "crabby".into(),
                    status: AccountStatus::Active,
                    api_key: "key-1".into(),
                    last_activity: None,
                }),
                status_transitions: StdMutex::new(vec![]),
                touches: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl AgentDirectory for MockDirectory {
        async fn get_agent(&self, _id: &str) -> Result<Option<Agent>> {
            Ok(self.agent.clone())
        }
    }

    #[async_trait]
    impl AccountDirectory for MockDirectory {
        async fn get_account_with_credentials(&self, _id: &str) -> Result<Option<Account>> {
            Ok(self.account.clone())
        }

        async fn set_status(&self, _id: &str, status: AccountStatus) -> Result<()> {
            self.status_transitions.lock().unwrap().push(status);
            Ok(())
        }

        async fn touch_activity(&self, _id: &str) -> Result<()> {
            self.touches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockRelevance {
        posts: Vec<Post>,
    }

    #[async_trait]
    impl FeedRelevance for MockRelevance {
        async fn relevant_posts(
            &self,
            _agent: &Agent,
            _api_key: &str,
            limit: usize,
        ) -> Result<Vec<Post>> {
            Ok(self.posts.iter().take(limit).cloned().collect())
        }
    }

    struct MockLimiter {
        /// Allow this many checks, deny afterwards. None = always allow.
        allow: Option<u32>,
        checks: AtomicU32,
    }

    #[async_trait]
    impl AccountRateLimiter for MockLimiter {
        async fn check(&self, _api_key: &str, _action: &str) -> Result<bool> {
            let n = self.checks.fetch_add(1, Ordering::SeqCst);
            Ok(self.allow.is_none_or(|max| n < max))
        }
    }

    // ─── Harness ──────────────────────────────────

    struct Harness {
        executor: Arc<ActionExecutor>,
        platform: Arc<MockPlatform>,
        generator: Arc<MockGenerator>,
        directory: Arc<MockDirectory>,
        activity: Arc<ActivityLog>,
        dir: std::path::PathBuf,
    }

    fn harness(name: &str, platform: MockPlatform, directory: MockDirectory) -> Harness {
        harness_with_limiter(name, platform, directory, MockLimiter {
            allow: None,
            checks: AtomicU32::new(0),
        })
    }

    fn harness_with_limiter(
        name: &str,
        platform: MockPlatform,
        directory: MockDirectory,
        limiter: MockLimiter,
    ) -> Harness {
        harness_full(name, platform, directory, limiter, Duration::ZERO)
    }

    fn harness_full(
        name: &str,
        platform: MockPlatform,
        directory: MockDirectory,
        limiter: MockLimiter,
        pacing: Duration,
    ) -> Harness {
        let dir = std::env::temp_dir().join(format!("moltclaw-exec-{name}"));
        std::fs::create_dir_all(&dir).ok();
        std::fs::remove_file(dir.join("activity.db")).ok();
        let activity = Arc::new(ActivityLog::open(&dir.join("activity.db")).unwrap());

        let platform = Arc::new(platform);
        let generator = Arc::new(MockGenerator::default());
        let directory = Arc::new(directory);
        let relevance = Arc::new(MockRelevance {
            posts: (0..5).map(|i| post(&format!("rel-{i}"))).collect(),
        });

        let deps = ExecutorDeps {
            platform: platform.clone(),
            generator: generator.clone(),
            agents: directory.clone(),
            accounts: directory.clone(),
            relevance,
            limiter: Arc::new(limiter),
        };
        let executor = ActionExecutor::new(deps, activity.clone(), pacing);
        Harness {
            executor,
            platform,
            generator,
            directory,
            activity,
            dir,
        }
    }

    fn event(action: ScheduleAction) -> ExecuteEvent {
        let schedule = Schedule::new("agent-1", "acct-1", action, Timing::Interval {
            every_ms: 1000,
        });
        ExecuteEvent {
            schedule_id: schedule.id.clone(),
            schedule,
            timestamp: Utc::now(),
        }
    }

    // ─── Tests ──────────────────────────────────

    #[tokio::test]
    async fn test_suspended_account_skips_without_platform_call() {
        let mut directory = MockDirectory::active();
        directory.account.as_mut().unwrap().status = AccountStatus::Suspended;
        let h = harness("susp-skip", MockPlatform::default(), directory);

        h.executor
            .handle(event(ScheduleAction::Heartbeat {
                engage_chance: 0.5,
                max_engagements: 2,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Skipped);
        assert!(records[0].error.as_deref().unwrap().contains("suspended"));
        assert_eq!(h.platform.browse_calls.load(Ordering::SeqCst), 0);
        assert_eq!(h.directory.touches.load(Ordering::SeqCst), 1);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_missing_account_records_failed() {
        let mut directory = MockDirectory::active();
        directory.account = None;
        let h = harness("no-acct", MockPlatform::default(), directory);

        h.executor
            .handle(event(ScheduleAction::Vote {
                post_id: None,
                comment_id: None,
                direction: VoteDirection::Up,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Failed);
        assert_eq!(records[0].error.as_deref(), Some("account not found"));
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_missing_agent_leaves_no_record() {
        let mut directory = MockDirectory::active();
        directory.agent = None;
        let h = harness("no-agent", MockPlatform::default(), directory);

        h.executor
            .handle(event(ScheduleAction::Heartbeat {
                engage_chance: 0.5,
                max_engagements: 2,
            }))
            .await;

        assert!(h.activity.recent(10).unwrap().is_empty());
        assert_eq!(h.platform.browse_calls.load(Ordering::SeqCst), 0);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_disabled_agent_records_skipped() {
        let mut directory = MockDirectory::active();
        directory.agent.as_mut().unwrap().enabled = false;
        let h = harness("agent-off", MockPlatform::default(), directory);

        h.executor
            .handle(event(ScheduleAction::Heartbeat {
                engage_chance: 0.5,
                max_engagements: 2,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Skipped);
        assert_eq!(records[0].error.as_deref(), Some("agent disabled"));
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_post_without_content_generates() {
        let h = harness("gen-post", MockPlatform::default(), MockDirectory::active());

        h.executor
            .handle(event(ScheduleAction::Post {
                title: None,
                content: None,
                submolt: Some("rustaceans".into()),
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Completed);
        let result = records[0].result.as_ref().unwrap();
        assert_eq!(result["generated"], true);
        assert_eq!(result["post_id"], "p-new");
        assert!(records[0].duration_ms.is_some());
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.platform.posts_created.load(Ordering::SeqCst), 1);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_post_with_explicit_content_skips_generation() {
        let h = harness("lit-post", MockPlatform::default(), MockDirectory::active());

        h.executor
            .handle(event(ScheduleAction::Post {
                title: Some("Hello".into()),
                content: Some("World".into()),
                submolt: None,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].result.as_ref().unwrap()["generated"], false);
        assert_eq!(h.generator.calls.load(Ordering::SeqCst), 0);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_vote_without_target_picks_from_hot_feed() {
        let h = harness("rand-vote", MockPlatform::default(), MockDirectory::active());

        h.executor
            .handle(event(ScheduleAction::Vote {
                post_id: None,
                comment_id: None,
                direction: VoteDirection::Up,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Completed);
        assert_eq!(records[0].result.as_ref().unwrap()["random"], true);
        assert_eq!(h.platform.votes.load(Ordering::SeqCst), 1);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_comment_on_relevant_post() {
        let h = harness("rel-comment", MockPlatform::default(), MockDirectory::active());

        h.executor
            .handle(event(ScheduleAction::Comment {
                post_id: None,
                parent_id: None,
                content: None,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Completed);
        let result = records[0].result.as_ref().unwrap();
        assert_eq!(result["generated"], true);
        assert_eq!(result["post_id"], "rel-0");
        assert_eq!(h.platform.comments_created.load(Ordering::SeqCst), 1);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_engage_counts_votes_and_comments() {
        let h = harness("engage", MockPlatform::default(), MockDirectory::active());

        h.executor
            .handle(event(ScheduleAction::Engage {
                max_votes: 2,
                max_comments: 1,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Completed);
        let result = records[0].result.as_ref().unwrap();
        assert_eq!(result["votes"], 2);
        assert_eq!(result["comments"], 1);
        assert_eq!(h.platform.votes.load(Ordering::SeqCst), 2);
        assert_eq!(h.platform.comments_created.load(Ordering::SeqCst), 1);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_engage_halts_on_suspension_and_marks_account() {
        let platform = MockPlatform {
            suspend_on_comment: Some(2),
            ..Default::default()
        };
        let h = harness("engage-susp", platform, MockDirectory::active());

        h.executor
            .handle(event(ScheduleAction::Engage {
                max_votes: 0,
                max_comments: 5,
            }))
            .await;

        // First comment landed, second hit suspension, candidates 3-5 were
        // never attempted.
        assert_eq!(h.platform.comments_created.load(Ordering::SeqCst), 1);
        assert_eq!(h.platform.comment_attempts.load(Ordering::SeqCst), 2);

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Failed);
        assert!(records[0].error.as_deref().unwrap().contains("suspended"));

        let transitions = h.directory.status_transitions.lock().unwrap();
        assert_eq!(transitions.as_slice(), &[AccountStatus::Suspended]);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_comment_downvote_dispatches_on_direction() {
        let h = harness("c-down", MockPlatform::default(), MockDirectory::active());

        h.executor
            .handle(event(ScheduleAction::Vote {
                post_id: None,
                comment_id: Some("c-42".into()),
                direction: VoteDirection::Down,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Completed);
        let result = records[0].result.as_ref().unwrap();
        assert_eq!(result["comment_id"], "c-42");
        assert_eq!(result["direction"], "down");
        assert_eq!(h.platform.downvotes.load(Ordering::SeqCst), 1);
        assert_eq!(h.platform.votes.load(Ordering::SeqCst), 0);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test(start_paused = true)]
    async fn test_engage_paces_between_operations_only() {
        // 2 votes + 1 comment = 3 sub-operations = exactly 2 pacing delays;
        // a trailing delay after the last operation would make it 3.
        let limiter = MockLimiter {
            allow: None,
            checks: AtomicU32::new(0),
        };
        let h = harness_full(
            "engage-pace",
            MockPlatform::default(),
            MockDirectory::active(),
            limiter,
            Duration::from_millis(100),
        );

        let started = tokio::time::Instant::now();
        h.executor
            .handle(event(ScheduleAction::Engage {
                max_votes: 2,
                max_comments: 1,
            }))
            .await;
        let elapsed = started.elapsed();

        assert!(
            elapsed >= Duration::from_millis(200) && elapsed < Duration::from_millis(300),
            "expected two pacing delays, got {elapsed:?}"
        );
        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].result.as_ref().unwrap()["votes"], 2);
        assert_eq!(records[0].result.as_ref().unwrap()["comments"], 1);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_engage_with_extreme_bounds_completes() {
        let limiter = MockLimiter {
            allow: Some(0),
            checks: AtomicU32::new(0),
        };
        let h = harness_with_limiter(
            "engage-extreme",
            MockPlatform::default(),
            MockDirectory::active(),
            limiter,
        );

        h.executor
            .handle(event(ScheduleAction::Engage {
                max_votes: u32::MAX,
                max_comments: u32::MAX,
            }))
            .await;

        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Completed);
        assert_eq!(records[0].result.as_ref().unwrap()["votes"], 0);
        assert_eq!(records[0].result.as_ref().unwrap()["comments"], 0);
        std::fs::remove_dir_all(&h.dir).ok();
    }

    #[tokio::test]
    async fn test_engage_stops_when_limiter_denies() {
        let limiter = MockLimiter {
            allow: Some(1),
            checks: AtomicU32::new(0),
        };
        let h = harness_with_limiter(
            "engage-limit",
            MockPlatform::default(),
            MockDirectory::active(),
            limiter,
        );

        h.executor
            .handle(event(ScheduleAction::Engage {
                max_votes: 3,
                max_comments: 3,
            }))
            .await;

        // One vote allowed, everything after the first limiter denial stops.
        let records = h.activity.recent(10).unwrap();
        assert_eq!(records[0].status, crate::activity::ActivityStatus::Completed);
        let result = records[0].result.as_ref().unwrap();
        assert_eq!(result["votes"], 1);
        assert_eq!(result["comments"], 0);
        std::fs::remove_dir_all(&h.dir).ok();
    }
}

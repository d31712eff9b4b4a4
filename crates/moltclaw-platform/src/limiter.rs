//! In-process sliding-window limiter, keyed by (api_key, action kind).
//!
//! This throttles individual platform calls inside compound actions; it is
//! independent of any per-schedule rate policy. Window state lives in
//! memory only — a restart forgets it, which is acceptable because the
//! windows are short.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use moltclaw_core::config::LimiterConfig;
use moltclaw_core::error::Result;
use moltclaw_core::traits::AccountRateLimiter;

pub struct SlidingWindowLimiter {
    window: Duration,
    max_per_window: u32,
    hits: Mutex<HashMap<(String, String), Vec<Instant>>>,
}

impl SlidingWindowLimiter {
    pub fn new(config: &LimiterConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            max_per_window: config.max_per_window,
            hits: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl AccountRateLimiter for SlidingWindowLimiter {
    /// Counts the call when allowed; a denied check records nothing.
    async fn check(&self, api_key: &str, action: &str) -> Result<bool> {
        let now = Instant::now();
        let mut hits = self.hits.lock().await;
        let window = hits
            .entry((api_key.to_string(), action.to_string()))
            .or_default();
        window.retain(|t| now.duration_since(*t) < self.window);

        if window.len() as u32 >= self.max_per_window {
            tracing::debug!("⏳ Limiter full for {action} ({} in window)", window.len());
            return Ok(false);
        }
        window.push(now);
        Ok(true)
    }
}

//! Persona-keyword ranking over the hot feed.
//!
//! No model call here: relevance is cheap lexical overlap between the
//! agent's persona text and a post's title/content, with the platform's
//! own score as tiebreaker. Good enough to keep an agent commenting on
//! things its persona would plausibly care about.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;

use moltclaw_core::error::Result;
use moltclaw_core::traits::{FeedRelevance, PlatformClient};
use moltclaw_core::types::{Agent, Post};

/// How much of the hot feed to consider per ranking pass.
const FEED_DEPTH: usize = 50;

/// Words too common to signal topical interest.
const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "being", "from", "have", "into", "just", "like",
    "more", "most", "other", "over", "some", "such", "than", "that", "their", "them", "then",
    "there", "these", "they", "this", "very", "what", "when", "which", "will", "with", "your",
];

pub struct PersonaRelevance {
    platform: Arc<dyn PlatformClient>,
}

impl PersonaRelevance {
    pub fn new(platform: Arc<dyn PlatformClient>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl FeedRelevance for PersonaRelevance {
    async fn relevant_posts(
        &self,
        agent: &Agent,
        api_key: &str,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let feed = self.platform.hot_feed(api_key, FEED_DEPTH).await?;
        let interests = keywords(&agent.persona);

        let mut scored: Vec<(usize, Post)> = feed
            .into_iter()
            .map(|post| (overlap(&interests, &post), post))
            .collect();
        // keyword overlap first, platform score as tiebreaker
        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.score.cmp(&a.1.score)));

        tracing::debug!(
            "🔎 Ranked feed for {}: top overlap {}",
            agent.name,
            scored.first().map(|(s, _)| *s).unwrap_or(0)
        );
        Ok(scored.into_iter().take(limit).map(|(_, p)| p).collect())
    }
}

fn keywords(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .map(String::from)
        .collect()
}

fn overlap(interests: &HashSet<String>, post: &Post) -> usize {
    let text = format!("{} {} {}", post.submolt, post.title, post.content);
    keywords(&text).intersection(interests).count()
}

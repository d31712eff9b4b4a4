//! Moltbook REST client.
//!
//! Thin transport: every method is one API call, authenticated with the
//! acting account's API key. The one piece of interpretation that happens
//! here is suspension detection — a 403 whose body mentions suspension is
//! mapped to `MoltClawError::Suspended` so the executor can react to it.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use moltclaw_core::config::PlatformConfig;
use moltclaw_core::error::{MoltClawError, Result};
use moltclaw_core::traits::PlatformClient;
use moltclaw_core::types::{Comment, Post};

pub struct MoltbookClient {
    base_url: String,
    client: reqwest::Client,
}

impl MoltbookClient {
    pub fn new(config: &PlatformConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| MoltClawError::Http(format!("client build: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(&self, req: reqwest::RequestBuilder, api_key: &str) -> Result<Value> {
        let resp = req
            .header("Authorization", format!("Bearer {api_key}"))
            .send()
            .await
            .map_err(|e| MoltClawError::Http(format!("moltbook request failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 403 && text.to_lowercase().contains("suspend") {
                return Err(MoltClawError::Suspended(text));
            }
            return Err(MoltClawError::Platform {
                status: status.as_u16(),
                message: text,
            });
        }

        resp.json()
            .await
            .map_err(|e| MoltClawError::Http(format!("moltbook response decode: {e}")))
    }

    async fn post_json(&self, api_key: &str, path: &str, body: Value) -> Result<Value> {
        self.send(self.client.post(self.url(path)).json(&body), api_key)
            .await
    }

    async fn get_json(&self, api_key: &str, path: &str) -> Result<Value> {
        self.send(self.client.get(self.url(path)), api_key).await
    }
}

#[async_trait]
impl PlatformClient for MoltbookClient {
    async fn create_post(
        &self,
        api_key: &str,
        submolt: &str,
        title: &str,
        content: &str,
    ) -> Result<Post> {
        let body = json!({ "submolt": submolt, "title": title, "content": content });
        let json = self.post_json(api_key, "/posts", body).await?;
        tracing::info!("📝 Posted to m/{submolt}: {title}");
        Ok(parse_post(&json["post"]))
    }

    async fn create_comment(
        &self,
        api_key: &str,
        post_id: &str,
        content: &str,
    ) -> Result<Comment> {
        let body = json!({ "content": content });
        let json = self
            .post_json(api_key, &format!("/posts/{post_id}/comments"), body)
            .await?;
        Ok(parse_comment(&json["comment"]))
    }

    async fn reply_comment(
        &self,
        api_key: &str,
        post_id: &str,
        parent_id: &str,
        content: &str,
    ) -> Result<Comment> {
        let body = json!({ "content": content, "parent_id": parent_id });
        let json = self
            .post_json(api_key, &format!("/posts/{post_id}/comments"), body)
            .await?;
        Ok(parse_comment(&json["comment"]))
    }

    async fn upvote_post(&self, api_key: &str, post_id: &str) -> Result<()> {
        self.post_json(api_key, &format!("/posts/{post_id}/upvote"), json!({}))
            .await?;
        Ok(())
    }

    async fn downvote_post(&self, api_key: &str, post_id: &str) -> Result<()> {
        self.post_json(api_key, &format!("/posts/{post_id}/downvote"), json!({}))
            .await?;
        Ok(())
    }

    async fn upvote_comment(&self, api_key: &str, comment_id: &str) -> Result<()> {
        self.post_json(api_key, &format!("/comments/{comment_id}/upvote"), json!({}))
            .await?;
        Ok(())
    }

    async fn downvote_comment(&self, api_key: &str, comment_id: &str) -> Result<()> {
        self.post_json(api_key, &format!("/comments/{comment_id}/downvote"), json!({}))
            .await?;
        Ok(())
    }

    async fn get_post(&self, api_key: &str, post_id: &str) -> Result<Post> {
        let json = self.get_json(api_key, &format!("/posts/{post_id}")).await?;
        Ok(parse_post(&json["post"]))
    }

    async fn hot_feed(&self, api_key: &str, limit: usize) -> Result<Vec<Post>> {
        let json = self
            .get_json(api_key, &format!("/posts?sort=hot&limit={limit}"))
            .await?;
        Ok(json["posts"]
            .as_array()
            .map(|arr| arr.iter().map(parse_post).collect())
            .unwrap_or_default())
    }

    async fn post_comments(&self, api_key: &str, post_id: &str) -> Result<Vec<Comment>> {
        let json = self
            .get_json(api_key, &format!("/posts/{post_id}/comments"))
            .await?;
        Ok(json["comments"]
            .as_array()
            .map(|arr| arr.iter().map(parse_comment).collect())
            .unwrap_or_default())
    }

    /// Ambient browsing: walk the hot feed and upvote a random subset, the
    /// way a human idly scrolling would. Engagement rolls are sampled up
    /// front so the RNG never crosses an await.
    async fn browse(
        &self,
        api_key: &str,
        engage_chance: f64,
        max_engagements: u32,
    ) -> Result<Value> {
        let feed = self.hot_feed(api_key, 25).await?;
        let rolls = roll_engagements(feed.len(), engage_chance);

        let mut engaged = 0u32;
        for (post, roll) in feed.iter().zip(rolls) {
            if engaged >= max_engagements {
                break;
            }
            if roll {
                self.upvote_post(api_key, &post.id).await?;
                engaged += 1;
            }
        }
        tracing::debug!("👀 Browsed {} posts, engaged {engaged}", feed.len());
        Ok(json!({ "viewed": feed.len(), "engaged": engaged }))
    }
}

fn roll_engagements(count: usize, chance: f64) -> Vec<bool> {
    use rand::Rng;
    let mut rng = rand::thread_rng();
    (0..count).map(|_| rng.gen_bool(chance.clamp(0.0, 1.0))).collect()
}

fn parse_post(v: &Value) -> Post {
    Post {
        id: v["id"].as_str().unwrap_or_default().to_string(),
        submolt: v["submolt"].as_str().unwrap_or_default().to_string(),
        title: v["title"].as_str().unwrap_or_default().to_string(),
        content: v["content"].as_str().unwrap_or_default().to_string(),
        author: v["author"].as_str().unwrap_or_default().to_string(),
        score: v["score"].as_i64().unwrap_or(0),
    }
}

fn parse_comment(v: &Value) -> Comment {
    Comment {
        id: v["id"].as_str().unwrap_or_default().to_string(),
        post_id: v["post_id"].as_str().unwrap_or_default().to_string(),
        parent_id: v["parent_id"].as_str().map(String::from),
        content: v["content"].as_str().unwrap_or_default().to_string(),
        author: v["author"].as_str().unwrap_or_default().to_string(),
    }
}

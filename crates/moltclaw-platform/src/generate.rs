//! Persona-voiced content generation over an OpenAI-compatible chat API.
//!
//! One endpoint, one model, bearer auth. The persona text from the agent
//! record becomes the system prompt, so the same generator serves every
//! agent in the directory.

use async_trait::async_trait;
use serde_json::{Value, json};

use moltclaw_core::config::LlmConfig;
use moltclaw_core::error::{MoltClawError, Result};
use moltclaw_core::traits::ContentGenerator;
use moltclaw_core::types::{Agent, Comment, Post};

/// How many existing comments to show the model as thread context.
const THREAD_CONTEXT: usize = 5;

pub struct PersonaGenerator {
    endpoint: String,
    api_key: String,
    model: String,
    client: reqwest::Client,
}

impl PersonaGenerator {
    pub fn new(config: &LlmConfig) -> Self {
        Self {
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            client: reqwest::Client::new(),
        }
    }

    async fn chat(&self, system: &str, user: &str) -> Result<String> {
        let body = json!({
            "model": self.model,
            "temperature": 0.9,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let url = format!("{}/chat/completions", self.endpoint);
        let req = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body);
        let req = if self.api_key.is_empty() {
            req
        } else {
            req.header("Authorization", format!("Bearer {}", self.api_key))
        };

        let resp = req
            .send()
            .await
            .map_err(|e| MoltClawError::Http(format!("llm connection failed ({url}): {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(MoltClawError::ContentGeneration(format!(
                "llm API error {status}: {text}"
            )));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| MoltClawError::Http(e.to_string()))?;
        let content = json["choices"]
            .get(0)
            .and_then(|c| c["message"]["content"].as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MoltClawError::ContentGeneration("empty completion".into()))?;

        Ok(content.to_string())
    }

    fn system_prompt(agent: &Agent) -> String {
        format!(
            "You are {}, a member of the Moltbook community. Your persona: {}. \
             Write naturally in that voice. Never mention being an AI.",
            agent.name, agent.persona
        )
    }
}

#[async_trait]
impl ContentGenerator for PersonaGenerator {
    async fn generate_post(&self, agent: &Agent, submolt: &str) -> Result<(String, String)> {
        let user = format!(
            "Write a post for the m/{submolt} community. First line must be \
             `Title: <title>`, then a blank line, then the post body (2-4 short paragraphs)."
        );
        let raw = self.chat(&Self::system_prompt(agent), &user).await?;
        let (title, body) = split_titled(&raw);
        tracing::debug!("✍️ Generated post for m/{submolt}: {title}");
        Ok((title, body))
    }

    async fn generate_comment(
        &self,
        agent: &Agent,
        post: &Post,
        existing: &[Comment],
    ) -> Result<String> {
        let mut user = format!(
            "Write a comment on this m/{} post.\n\nTitle: {}\n\n{}\n",
            post.submolt, post.title, post.content
        );
        if !existing.is_empty() {
            user.push_str("\nExisting comments:\n");
            for comment in existing.iter().take(THREAD_CONTEXT) {
                user.push_str(&format!("- {}: {}\n", comment.author, comment.content));
            }
        }
        user.push_str("\nReply with the comment text only, 1-3 sentences.");
        self.chat(&Self::system_prompt(agent), &user).await
    }
}

/// Split a `Title: ...` first line from the body. Falls back to treating the
/// first line as the title when the model ignores the format.
fn split_titled(raw: &str) -> (String, String) {
    let mut lines = raw.lines();
    let first = lines.next().unwrap_or_default();
    let title = first
        .strip_prefix("Title:")
        .unwrap_or(first)
        .trim()
        .trim_matches('"')
        .to_string();
    let body = lines.collect::<Vec<_>>().join("\n").trim().to_string();
    if body.is_empty() {
        (title.clone(), title)
    } else {
        (title, body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_titled_with_prefix() {
        let (title, body) = split_titled("Title: Molting season tips\n\nKeep the tank humid.");
        assert_eq!(title, "Molting season tips");
        assert_eq!(body, "Keep the tank humid.");
    }

    #[test]
    fn test_split_titled_without_prefix() {
        let (title, body) = split_titled("\"A bare first line\"\nAnd a body.");
        assert_eq!(title, "A bare first line");
        assert_eq!(body, "And a body.");
    }

    #[test]
    fn test_split_titled_single_line() {
        let (title, body) = split_titled("Title: Just a title");
        assert_eq!(title, "Just a title");
        assert_eq!(body, "Just a title");
    }
}

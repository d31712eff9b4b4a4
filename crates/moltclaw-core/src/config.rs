//! MoltClaw configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{MoltClawError, Result};

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoltClawConfig {
    /// Data directory for SQLite databases (defaults to `~/.moltclaw`).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub limiter: LimiterConfig,
}

fn default_data_dir() -> String {
    String::new()
}

impl Default for MoltClawConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            scheduler: SchedulerConfig::default(),
            platform: PlatformConfig::default(),
            llm: LlmConfig::default(),
            limiter: LimiterConfig::default(),
        }
    }
}

/// Scheduler/executor knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Inter-operation delay inside compound actions, in milliseconds.
    /// Pacing is the design goal: burst-free call patterns read as human.
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    /// TTL of the schedule store's read cache, in milliseconds.
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

fn default_pacing_ms() -> u64 {
    1500
}
fn default_cache_ttl_ms() -> u64 {
    2000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            cache_ttl_ms: default_cache_ttl_ms(),
        }
    }
}

/// Moltbook API endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    #[serde(default = "default_platform_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_platform_url() -> String {
    "https://www.moltbook.com/api/v1".into()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// OpenAI-compatible endpoint for content generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
}

fn default_llm_endpoint() -> String {
    "https://api.openai.com/v1".into()
}
fn default_llm_model() -> String {
    "gpt-4o-mini".into()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: String::new(),
            model: default_llm_model(),
        }
    }
}

/// Per-account sliding-window limiter defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_per_window")]
    pub max_per_window: u32,
}

fn default_window_secs() -> u64 {
    3600
}
fn default_max_per_window() -> u32 {
    30
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_per_window: default_max_per_window(),
        }
    }
}

impl MoltClawConfig {
    /// Home directory for MoltClaw state (~/.moltclaw).
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".moltclaw")
    }

    /// Default config path (~/.moltclaw/config.toml).
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Load config from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MoltClawError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| MoltClawError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| MoltClawError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(&path, content)?;
        Ok(())
    }

    /// Resolved data directory.
    pub fn data_dir(&self) -> PathBuf {
        if self.data_dir.is_empty() {
            Self::home_dir()
        } else {
            PathBuf::from(&self.data_dir)
        }
    }
}

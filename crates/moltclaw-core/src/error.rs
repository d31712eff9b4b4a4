//! MoltClaw error taxonomy.
//!
//! Everything that crosses a crate boundary uses `MoltClawError`. The
//! `Suspended` variant is load-bearing: the action executor checks
//! [`MoltClawError::is_suspension`] to decide whether to halt a compound
//! action and flip the account status.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MoltClawError>;

#[derive(Debug, Error)]
pub enum MoltClawError {
    #[error("config error: {0}")]
    Config(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Moltbook API returned a non-success status.
    #[error("platform error {status}: {message}")]
    Platform { status: u16, message: String },

    /// The platform reported the account as suspended. Terminal for any
    /// in-flight compound action.
    #[error("account suspended: {0}")]
    Suspended(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("content generation failed: {0}")]
    ContentGeneration(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MoltClawError {
    /// True when the platform reported the acting account as suspended.
    pub fn is_suspension(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }
}

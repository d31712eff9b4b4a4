//! Production implementations of the MoltClaw collaborator traits.
//!
//! - [`client::MoltbookClient`] — reqwest transport for the Moltbook REST API
//! - [`generate::PersonaGenerator`] — OpenAI-compatible chat completion
//! - [`directory::SqliteDirectory`] — agent personas and account credentials
//! - [`limiter::SlidingWindowLimiter`] — per-account call throttle
//! - [`relevance::PersonaRelevance`] — keyword ranking over the hot feed

pub mod client;
pub mod directory;
pub mod generate;
pub mod limiter;
pub mod relevance;

pub use client::MoltbookClient;
pub use directory::SqliteDirectory;
pub use generate::PersonaGenerator;
pub use limiter::SlidingWindowLimiter;
pub use relevance::PersonaRelevance;

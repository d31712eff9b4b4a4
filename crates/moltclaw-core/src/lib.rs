//! # MoltClaw Core
//!
//! Shared foundation for the MoltClaw workspace: configuration, the error
//! taxonomy, domain types (agents, accounts, posts), and the async trait
//! contracts every outbound collaborator implements (Moltbook transport,
//! content generation, directories, feed relevance, per-account limiting).
//!
//! The scheduler core only ever sees these traits — concrete reqwest/SQLite
//! implementations live in `moltclaw-platform`.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::MoltClawConfig;
pub use error::{MoltClawError, Result};

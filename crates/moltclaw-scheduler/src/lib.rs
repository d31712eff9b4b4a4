//! # MoltClaw Scheduler
//!
//! The scheduling-and-execution core: persisted schedules drive per-schedule
//! timers, every firing is gated by rate-limit policy, and allowed firings
//! flow over an in-process event bus to the action executor.
//!
//! ## Architecture
//! ```text
//! ScheduleStore (SQLite + 2s read cache)
//!   └── CRUD → bus "schedule:changed" → SchedulerEngine re-arms timer
//!
//! SchedulerEngine (one tokio task per enabled schedule)
//!   ├── Cron:     fire at each expression match
//!   ├── Interval: fire every N ms
//!   ├── Random:   fresh uniform delay from [min, max) on EVERY arm
//!   └── on fire → RateGate (cooldown + daily cap from ActivityLog)
//!                   → allowed: bump run stats, bus "schedule:execute"
//!
//! ActionExecutor (subscriber, one spawned task per firing)
//!   ├── resolve account + agent, precondition checks
//!   ├── dispatch: heartbeat | post | comment | vote | engage
//!   └── ActivityLog: started → completed | failed | skipped
//! ```

pub mod activity;
pub mod bus;
pub mod cron;
pub mod engine;
pub mod executor;
pub mod gate;
pub mod schedule;
pub mod store;

pub use activity::{ActivityFilter, ActivityLog, ActivityRecord, ActivityStatus};
pub use bus::{ChangeAction, EventBus, ExecuteEvent, ScheduleChange};
pub use engine::SchedulerEngine;
pub use executor::{ActionExecutor, ExecutorDeps};
pub use schedule::{RateLimit, Schedule, ScheduleAction, SchedulePatch, Timing, VoteDirection};
pub use store::ScheduleStore;

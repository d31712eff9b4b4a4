//! Scheduling engine — one timer task per enabled schedule.
//!
//! The registry maps schedule id → abort handle and lives only in process
//! memory; it is rebuilt at startup from the store, so durable state and
//! runtime state can never diverge. Firing handlers are fire-and-forget:
//! a slow execution never delays another schedule's timer, and nothing a
//! handler does can corrupt or deactivate someone else's timer.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use moltclaw_core::error::Result;

use crate::activity::ActivityLog;
use crate::bus::{ChangeAction, EventBus, ScheduleChange};
use crate::cron;
use crate::gate;
use crate::schedule::{Schedule, Timing};
use crate::store::ScheduleStore;

pub struct SchedulerEngine {
    store: Arc<ScheduleStore>,
    activity: Arc<ActivityLog>,
    bus: EventBus,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl SchedulerEngine {
    pub fn new(store: Arc<ScheduleStore>, activity: Arc<ActivityLog>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            store,
            activity,
            bus,
            timers: Mutex::new(HashMap::new()),
        })
    }

    /// Reconstruct runtime timer state from durable state: activate every
    /// enabled schedule. Called once at process start.
    pub async fn start(&self) -> Result<()> {
        let schedules = self.store.list()?;
        let mut activated = 0usize;
        for schedule in schedules.into_iter().filter(|s| s.enabled) {
            self.activate(schedule).await;
            activated += 1;
        }
        tracing::info!("⏰ Scheduler started: {activated} active timer(s)");
        Ok(())
    }

    /// Register a timer for this schedule. No-op if one is already active
    /// for the id, or if the schedule is disabled.
    pub async fn activate(&self, schedule: Schedule) {
        if !schedule.enabled {
            return;
        }
        let mut timers = self.timers.lock().await;
        if timers.contains_key(&schedule.id) {
            return;
        }
        tracing::info!(
            "📅 Timer armed: {} [{}] ({:?})",
            schedule.id,
            schedule.action.kind(),
            schedule.timing
        );
        let id = schedule.id.clone();
        let handle = tokio::spawn(timer_loop(
            self.store.clone(),
            self.activity.clone(),
            self.bus.clone(),
            schedule,
        ));
        timers.insert(id, handle);
    }

    /// Cancel and remove the timer for this id. Idempotent.
    pub async fn deactivate(&self, id: &str) {
        if let Some(handle) = self.timers.lock().await.remove(id) {
            handle.abort();
            tracing::debug!("⏹️ Timer cancelled: {id}");
        }
    }

    /// Execute the firing protocol immediately, outside any timer. Still
    /// re-fetches and rate-gates like a scheduled firing.
    pub async fn run_now(&self, id: &str) {
        fire(&self.store, &self.activity, &self.bus, id).await;
    }

    pub async fn is_active(&self, id: &str) -> bool {
        self.timers.lock().await.contains_key(id)
    }

    pub async fn active_count(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Abort every timer. Used at shutdown.
    pub async fn stop_all(&self) {
        let mut timers = self.timers.lock().await;
        for (_, handle) in timers.drain() {
            handle.abort();
        }
    }

    /// React to schedule CRUD from the bus: full timer replacement on
    /// create/update (stale timing parameters must never linger), removal
    /// on delete. Returns the listener task handle.
    pub fn watch_changes(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut rx = self.bus.subscribe_changed();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(change) => engine.handle_change(change).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("⚠️ Schedule change listener lagged by {n} events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    async fn handle_change(&self, change: ScheduleChange) {
        self.deactivate(&change.schedule_id).await;
        if change.action == ChangeAction::Delete {
            return;
        }
        match self.store.get(&change.schedule_id) {
            Ok(Some(schedule)) if schedule.enabled => self.activate(schedule).await,
            Ok(_) => {}
            Err(e) => tracing::warn!("⚠️ Failed to re-fetch {}: {e}", change.schedule_id),
        }
    }
}

/// Per-schedule timer body. The schedule snapshot only provides timing —
/// each firing re-fetches the live row.
async fn timer_loop(
    store: Arc<ScheduleStore>,
    activity: Arc<ActivityLog>,
    bus: EventBus,
    schedule: Schedule,
) {
    let id = schedule.id;
    match schedule.timing {
        Timing::Interval { every_ms } => {
            let period = std::time::Duration::from_millis(every_ms.max(1));
            let mut ticker = tokio::time::interval(period);
            // A stalled process (system sleep) must not replay the missed
            // ticks as a burst — that is the exact pattern pacing avoids.
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // first tick is immediate — skip it
            loop {
                ticker.tick().await;
                fire(&store, &activity, &bus, &id).await;
            }
        }
        Timing::Cron { expression } => loop {
            let now = Utc::now();
            let Some(next) = cron::next_fire(&expression, now) else {
                tracing::warn!("⚠️ Cron expression never matches, disarming: '{expression}'");
                return;
            };
            let wait = (next - now).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;
            fire(&store, &activity, &bus, &id).await;
        },
        Timing::Random { min_ms, max_ms } => loop {
            // Resampled on every arm. A delay computed once and reused
            // would settle into a periodic, fingerprintable cadence.
            let delay = sample_delay_ms(min_ms, max_ms);
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            fire(&store, &activity, &bus, &id).await;
        },
    }
}

/// Uniform sample from [min_ms, max_ms).
fn sample_delay_ms(min_ms: u64, max_ms: u64) -> u64 {
    if max_ms <= min_ms {
        return min_ms;
    }
    rand::thread_rng().gen_range(min_ms..max_ms)
}

/// The firing protocol: re-fetch, rate-gate, bump run stats, publish.
/// Gate denials are a pure skip — no activity record, no event, just a
/// debug line (routine cooldown hits would otherwise flood the log).
async fn fire(store: &ScheduleStore, activity: &ActivityLog, bus: &EventBus, id: &str) {
    // Guard against deletion/disable since the timer was armed.
    let schedule = match store.get(id) {
        Ok(Some(s)) if s.enabled => s,
        Ok(_) => return,
        Err(e) => {
            tracing::warn!("⚠️ Firing fetch failed for {id}: {e}");
            return;
        }
    };

    let today = activity
        .count_today(&schedule.account_id, schedule.action.kind())
        .unwrap_or(0);
    let now = Utc::now();
    if !gate::allow(&schedule, today, now) {
        tracing::debug!(
            "⏳ Rate gate denied {} [{}] (today: {today})",
            schedule.id,
            schedule.action.kind()
        );
        return;
    }

    // run_count/last_run land in the store before the event goes out, so a
    // crash in between can lose an audit trail but never double-count.
    match store.mark_fired(id, now) {
        Ok(Some(updated)) => {
            tracing::info!("🔔 Schedule fired: {} [{}]", updated.id, updated.action.kind());
            bus.publish_execute(updated);
        }
        Ok(None) => {}
        Err(e) => tracing::warn!("⚠️ Failed to bump run stats for {id}: {e}"),
    }
}

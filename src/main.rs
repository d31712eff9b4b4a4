//! # MoltClaw — Autonomous Moltbook Engagement Agent
//!
//! Runs scheduled actions (posting, commenting, voting, ambient browsing)
//! against Moltbook on behalf of configured agent personas, with
//! human-like pacing and per-account rate limits.
//!
//! Usage:
//!   moltclaw serve                                  # Start scheduler + executor
//!   moltclaw schedule add --agent a1 --account m1 \
//!       --action '{"type":"heartbeat"}' \
//!       --timing '{"type":"random","min_ms":60000,"max_ms":300000}'
//!   moltclaw schedule list
//!   moltclaw schedule run <id>                      # Fire once, rate-gated
//!   moltclaw activity --limit 20

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use moltclaw_core::config::MoltClawConfig;
use moltclaw_core::traits::PlatformClient;
use moltclaw_core::types::{Account, AccountStatus, Agent};
use moltclaw_platform::{
    MoltbookClient, PersonaGenerator, PersonaRelevance, SlidingWindowLimiter, SqliteDirectory,
};
use moltclaw_scheduler::{
    ActionExecutor, ActivityFilter, ActivityLog, EventBus, ExecutorDeps, RateLimit, Schedule,
    ScheduleAction, ScheduleStore, SchedulerEngine, Timing,
};

#[derive(Parser)]
#[command(
    name = "moltclaw",
    version,
    about = "🦀 MoltClaw — Autonomous Moltbook Engagement Agent"
)]
struct Cli {
    /// Config file path (default: ~/.moltclaw/config.toml)
    #[arg(long)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the scheduler and action executor
    Serve,
    /// Manage schedules
    Schedule {
        #[command(subcommand)]
        command: ScheduleCommand,
    },
    /// Manage agent personas
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },
    /// Manage platform accounts
    Account {
        #[command(subcommand)]
        command: AccountCommand,
    },
    /// Show the activity log
    Activity {
        /// Only records for this account
        #[arg(long)]
        account: Option<String>,
        /// Only records for this agent
        #[arg(long)]
        agent: Option<String>,
        /// Only records with this action kind (heartbeat, post, ...)
        #[arg(long)]
        action: Option<String>,
        /// Only records at or after this RFC3339 timestamp
        #[arg(long)]
        since: Option<String>,
        /// Only records before this RFC3339 timestamp
        #[arg(long)]
        until: Option<String>,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[derive(Subcommand)]
enum ScheduleCommand {
    /// Create a schedule
    Add {
        #[arg(long)]
        agent: String,
        #[arg(long)]
        account: String,
        /// Action as JSON, e.g. '{"type":"post","submolt":"rustaceans"}'
        #[arg(long)]
        action: String,
        /// Timing as JSON, e.g. '{"type":"interval","every_ms":3600000}'
        #[arg(long)]
        timing: String,
        #[arg(long)]
        max_per_day: Option<u32>,
        #[arg(long)]
        cooldown_ms: Option<u64>,
    },
    /// List all schedules
    List,
    /// Delete a schedule
    Rm { id: String },
    /// Flip a schedule's enabled flag
    Toggle { id: String },
    /// Fire a schedule once (still rate-gated)
    Run { id: String },
}

#[derive(Subcommand)]
enum AgentCommand {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        persona: String,
    },
    List,
}

#[derive(Subcommand)]
enum AccountCommand {
    Add {
        #[arg(long)]
        id: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        api_key: String,
    },
    List,
}

/// Everything `serve` and the one-shot commands wire together.
struct App {
    config: MoltClawConfig,
    bus: EventBus,
    store: Arc<ScheduleStore>,
    activity: Arc<ActivityLog>,
    directory: Arc<SqliteDirectory>,
}

impl App {
    fn open(config: MoltClawConfig) -> Result<Self> {
        let data = config.data_dir();
        std::fs::create_dir_all(&data)?;

        let bus = EventBus::default();
        let store = Arc::new(ScheduleStore::open(
            &data.join("schedules.db"),
            bus.clone(),
            Duration::from_millis(config.scheduler.cache_ttl_ms),
        )?);
        let activity = Arc::new(ActivityLog::open(&data.join("activity.db"))?);
        let directory = Arc::new(SqliteDirectory::open(&data.join("directory.db"))?);

        Ok(Self {
            config,
            bus,
            store,
            activity,
            directory,
        })
    }

    fn executor(&self) -> Result<Arc<ActionExecutor>> {
        let platform: Arc<dyn PlatformClient> = Arc::new(MoltbookClient::new(&self.config.platform)?);
        let deps = ExecutorDeps {
            generator: Arc::new(PersonaGenerator::new(&self.config.llm)),
            agents: self.directory.clone(),
            accounts: self.directory.clone(),
            relevance: Arc::new(PersonaRelevance::new(platform.clone())),
            limiter: Arc::new(SlidingWindowLimiter::new(&self.config.limiter)),
            platform,
        };
        Ok(ActionExecutor::new(
            deps,
            self.activity.clone(),
            Duration::from_millis(self.config.scheduler.pacing_ms),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "moltclaw=debug,moltclaw_scheduler=debug,moltclaw_platform=debug"
    } else {
        "moltclaw=info,moltclaw_scheduler=info,moltclaw_platform=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => {
            let path = shellexpand::tilde(path).to_string();
            MoltClawConfig::load_from(std::path::Path::new(&path))?
        }
        None => MoltClawConfig::load()?,
    };

    let app = App::open(config)?;

    match cli.command {
        Command::Serve => serve(app).await,
        Command::Schedule { command } => schedule_command(app, command).await,
        Command::Agent { command } => agent_command(app, command),
        Command::Account { command } => account_command(app, command),
        Command::Activity {
            account,
            agent,
            action,
            since,
            until,
            limit,
        } => {
            let filter = ActivityFilter {
                account_id: account,
                agent_id: agent,
                action,
                since: parse_timestamp(since.as_deref())?,
                until: parse_timestamp(until.as_deref())?,
            };
            activity_command(app, filter, limit)
        }
    }
}

async fn serve(app: App) -> Result<()> {
    let executor = app.executor()?;
    let _executor_task = executor.spawn(app.bus.subscribe_execute());

    let engine = SchedulerEngine::new(app.store.clone(), app.activity.clone(), app.bus.clone());
    let _watcher = engine.watch_changes();
    engine.start().await?;
    tracing::info!("🚀 Serve loop ready");

    println!("🦀 MoltClaw v{}", env!("CARGO_PKG_VERSION"));
    println!("   🌐 Platform:  {}", app.config.platform.base_url);
    println!("   🧠 Model:     {}", app.config.llm.model);
    println!("   🗄️  Data Dir:  {}", app.config.data_dir().display());
    println!("   ⏰ Timers:    {}", engine.active_count().await);
    println!();

    tokio::signal::ctrl_c().await?;
    println!("\n👋 Shutting down...");
    engine.stop_all().await;
    Ok(())
}

async fn schedule_command(app: App, command: ScheduleCommand) -> Result<()> {
    match command {
        ScheduleCommand::Add {
            agent,
            account,
            action,
            timing,
            max_per_day,
            cooldown_ms,
        } => {
            let action: ScheduleAction = serde_json::from_str(&action)?;
            let timing: Timing = serde_json::from_str(&timing)?;
            let mut schedule = Schedule::new(&agent, &account, action, timing);
            if max_per_day.is_some() || cooldown_ms.is_some() {
                schedule = schedule.with_rate_limit(RateLimit {
                    max_per_day,
                    cooldown_ms,
                });
            }
            let created = app.store.create(schedule)?;
            println!("✅ Schedule created: {}", created.id);
        }
        ScheduleCommand::List => {
            let schedules = app.store.list()?;
            if schedules.is_empty() {
                println!("No schedules.");
            }
            for s in schedules {
                let state = if s.enabled { "on " } else { "off" };
                println!(
                    "[{state}] {} {:10} agent={} account={} runs={} last={}",
                    s.id,
                    s.action.kind(),
                    s.agent_id,
                    s.account_id,
                    s.run_count,
                    s.last_run
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into()),
                );
            }
        }
        ScheduleCommand::Rm { id } => {
            if app.store.delete(&id)? {
                println!("🗑️ Schedule deleted: {id}");
            } else {
                println!("⚠️ No schedule with id {id}");
            }
        }
        ScheduleCommand::Toggle { id } => {
            let schedule = app
                .store
                .get(&id)?
                .ok_or_else(|| anyhow::anyhow!("schedule {id} not found"))?;
            let updated = app
                .store
                .set_enabled(&id, !schedule.enabled)?
                .ok_or_else(|| anyhow::anyhow!("schedule {id} not found"))?;
            println!(
                "🔁 Schedule {} is now {}",
                id,
                if updated.enabled { "enabled" } else { "disabled" }
            );
        }
        ScheduleCommand::Run { id } => {
            let executor = app.executor()?;
            let engine =
                SchedulerEngine::new(app.store.clone(), app.activity.clone(), app.bus.clone());
            let mut rx = app.bus.subscribe_execute();

            engine.run_now(&id).await;
            match tokio::time::timeout(Duration::from_millis(200), rx.recv()).await {
                Ok(Ok(event)) => {
                    executor.handle(event).await;
                    println!("✅ Schedule {id} ran (see `moltclaw activity` for the result)");
                }
                _ => println!("⏳ Schedule {id} did not fire (missing, disabled, or rate-gated)"),
            }
        }
    }
    Ok(())
}

fn agent_command(app: App, command: AgentCommand) -> Result<()> {
    match command {
        AgentCommand::Add { id, name, persona } => {
            app.directory.upsert_agent(&Agent {
                id: id.clone(),
                name,
                persona,
                enabled: true,
            })?;
            println!("✅ Agent saved: {id}");
        }
        AgentCommand::List => {
            for agent in app.directory.list_agents()? {
                let state = if agent.enabled { "on " } else { "off" };
                println!("[{state}] {} {} — {}", agent.id, agent.name, agent.persona);
            }
        }
    }
    Ok(())
}

fn account_command(app: App, command: AccountCommand) -> Result<()> {
    match command {
        AccountCommand::Add {
            id,
            username,
            api_key,
        } => {
            app.directory.upsert_account(&Account {
                id: id.clone(),
                username,
                status: AccountStatus::Active,
                api_key,
                last_activity: None,
            })?;
            println!("✅ Account saved: {id}");
        }
        AccountCommand::List => {
            for account in app.directory.list_accounts()? {
                println!(
                    "[{}] {} {} last_activity={}",
                    account.status,
                    account.id,
                    account.username,
                    account
                        .last_activity
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_else(|| "never".into()),
                );
            }
        }
    }
    Ok(())
}

fn parse_timestamp(value: Option<&str>) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
    value
        .map(|v| {
            chrono::DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&chrono::Utc))
                .map_err(|e| anyhow::anyhow!("invalid timestamp '{v}': {e}"))
        })
        .transpose()
}

fn activity_command(app: App, filter: ActivityFilter, limit: usize) -> Result<()> {
    let records = app.activity.query(&filter, limit)?;
    if records.is_empty() {
        println!("No activity.");
    }
    for r in records {
        let detail = r
            .error
            .clone()
            .or_else(|| r.result.as_ref().map(|v| v.to_string()))
            .unwrap_or_default();
        println!(
            "{} {:9?} {:10} agent={} account={} {}ms {}",
            r.timestamp.to_rfc3339(),
            r.status,
            r.action,
            r.agent_id,
            r.account_id,
            r.duration_ms.unwrap_or(0),
            detail,
        );
    }
    Ok(())
}

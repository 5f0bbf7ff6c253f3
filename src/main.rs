//! Roster-Sync main entry point
//!
//! This is the command-line interface for the Roster-Sync bot backend.

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use roster_sync::config::{load_config_with_hash, Config};
use roster_sync::crawler::Engine;
use roster_sync::output::{load_statistics, print_cycle_report, print_statistics};
use roster_sync::storage::{lock_storage, open_storage, SqliteStorage};
use roster_sync::sync::{parse_key_spec, Ack, PartialGroup, RefreshOutcome};
use roster_sync::{EntityKey, GroupKey};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

/// Roster-Sync: keeps guild rosters and character records in sync
///
/// Roster-Sync polls guild rosters and character profiles on a schedule,
/// keeps a weekly activity log, and runs the weekly reset of pending keys.
#[derive(Parser, Debug)]
#[command(name = "roster-sync")]
#[command(version = "1.0.0")]
#[command(about = "Scheduled roster and character sync", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the sync and reset loops until Ctrl-C
    Run,

    /// Run a single sync cycle and exit
    SyncOnce,

    /// Fetch and store one character
    SyncEntity(EntityArgs),

    /// Fetch one guild roster and sync its members
    CrawlGroup(GroupArgs),

    /// Stop tracking one character
    Remove(EntityArgs),

    /// Stop tracking every member of a guild
    RemoveGroup(GroupArgs),

    /// Assign a pending key, e.g. `fh+18`
    AddKey {
        #[command(flatten)]
        entity: EntityArgs,

        /// Key spec: <dungeon>+<level>
        spec: String,
    },

    /// Clear the pending key of a character
    RemoveKey(EntityArgs),

    /// List the runs logged for a character this week
    Runs { name: String },

    /// Run the weekly reset now
    Reset,

    /// Set the default guild of a chat room
    SetDefaults {
        room_id: String,
        room_name: String,
        group: String,
        realm: String,
        region: String,
    },

    /// Show the default guild of a chat room
    ShowDefaults { room_id: String },

    /// Show statistics from the database and exit
    Stats,

    /// Validate the configuration and show what would be synced
    CheckConfig,
}

#[derive(Args, Debug)]
struct EntityArgs {
    name: String,
    realm: String,
    region: String,
}

impl EntityArgs {
    fn key(&self) -> EntityKey {
        EntityKey::new(&self.name, &self.realm, &self.region)
    }
}

/// Guild parameters; missing parts come from the room defaults
#[derive(Args, Debug)]
struct GroupArgs {
    name: Option<String>,
    realm: Option<String>,
    region: Option<String>,

    /// Chat room whose defaults fill in missing parts
    #[arg(long)]
    room: Option<String>,
}

impl GroupArgs {
    fn partial(&self) -> PartialGroup {
        PartialGroup {
            name: self.name.clone(),
            realm: self.realm.clone(),
            region: self.region.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load configuration {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    match cli.command {
        Command::Stats => handle_stats(&config),
        Command::CheckConfig => {
            handle_check_config(&config);
            Ok(())
        }
        command => {
            let engine = Engine::open(config, config_hash).context("failed to start engine")?;
            handle_command(engine, command).await
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("roster_sync=info,warn"),
            1 => EnvFilter::new("roster_sync=debug,info"),
            2 => EnvFilter::new("roster_sync=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

async fn handle_command(engine: Engine<SqliteStorage>, command: Command) -> anyhow::Result<()> {
    let synchronizer = &engine.synchronizer;

    match command {
        Command::Run => handle_run(&engine).await,
        Command::SyncOnce => {
            let report = engine.coordinator.run_cycle().await;
            print_cycle_report(&report);
            Ok(())
        }
        Command::SyncEntity(args) => {
            let key = args.key();
            match synchronizer.refresh_entity(&key, None).await {
                RefreshOutcome::Synced(outcome) => println!("{}: {:?}", key, outcome),
                RefreshOutcome::Missed(outcome) => bail!("{} could not be fetched: {:?}", key, outcome),
            }
            Ok(())
        }
        Command::CrawlGroup(args) => {
            let group = synchronizer.resolve_group(args.room.as_deref(), &args.partial())?;
            match engine.coordinator.crawl_group(&group).await {
                Some(batch) => {
                    println!(
                        "{}: {} synced, {} failed, {} marked stale, {} deleted",
                        group,
                        batch.synced(),
                        batch.failed,
                        batch.marked_stale,
                        batch.deleted
                    );
                    Ok(())
                }
                None => bail!("roster of {} could not be fetched", group),
            }
        }
        Command::Remove(args) => report_ack(synchronizer.remove(&args.key())),
        Command::RemoveGroup(args) => {
            let group = synchronizer.resolve_group(args.room.as_deref(), &args.partial())?;
            report_ack(synchronizer.remove_group(&group))
        }
        Command::AddKey { entity, spec } => {
            let pending = parse_key_spec(&spec, &engine.config.dungeons)?;
            report_ack(synchronizer.assign_key(&entity.key(), &pending))
        }
        Command::RemoveKey(args) => report_ack(synchronizer.clear_key(&args.key())),
        Command::Runs { name } => {
            let runs = synchronizer.weekly_runs(&name)?;
            if runs.is_empty() {
                println!("No runs logged for {} this week", name);
            }
            for run in runs {
                println!(
                    "  +{:<3} {} (run {}, seen {})",
                    run.level,
                    run.dungeon,
                    run.run_id,
                    run.observed_at.format("%Y-%m-%d %H:%M")
                );
            }
            Ok(())
        }
        Command::Reset => {
            if !engine.reset.run_reset(None).await {
                bail!("weekly reset failed, nothing was cleared");
            }
            println!("Weekly reset complete");
            Ok(())
        }
        Command::SetDefaults {
            room_id,
            room_name,
            group,
            realm,
            region,
        } => report_ack(synchronizer.set_group_defaults(
            &room_id,
            &room_name,
            GroupKey::new(&group, &realm, &region),
        )),
        Command::ShowDefaults { room_id } => {
            match synchronizer.group_defaults(&room_id)? {
                Some(defaults) => println!(
                    "{} ({}): {} (since {})",
                    defaults.room_name, defaults.room_id, defaults.group, defaults.updated_at
                ),
                None => println!("No defaults set for room {}", room_id),
            }
            Ok(())
        }
        Command::Stats => {
            let stats = load_statistics(&*lock_storage(&engine.storage)?)?;
            print_statistics(&stats);
            Ok(())
        }
        Command::CheckConfig => {
            handle_check_config(&engine.config);
            Ok(())
        }
    }
}

/// Runs both background loops until Ctrl-C
async fn handle_run(engine: &Engine<SqliteStorage>) -> anyhow::Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    tracing::info!(
        "Starting sync every {}s for {} configured groups",
        engine.config.sync.interval_secs,
        engine.config.groups.len()
    );
    let handles = engine.scheduler().spawn(shutdown_rx);

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("Shutdown requested, stopping background loops (Ctrl-C again to force)");

    // Receivers may already be gone if both loops exited
    let _ = shutdown_tx.send(true);
    let abort = handles.abort_handles();
    tokio::select! {
        _ = handles.join() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Second Ctrl-C, aborting background loops");
            abort.abort();
        }
    }

    tracing::info!("Stopped");
    Ok(())
}

fn report_ack(ack: Ack) -> anyhow::Result<()> {
    match ack {
        Ack::Done(message) => {
            println!("{}", message);
            Ok(())
        }
        Ack::Failed(message) => bail!(message),
    }
}

/// Handles the stats command: shows statistics from the database
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let storage = open_storage(Path::new(&config.storage.database_path))
        .context("failed to open database")?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the check-config command: shows the effective configuration
fn handle_check_config(config: &Config) {
    println!("=== Roster-Sync Configuration ===\n");

    println!("Sync:");
    println!("  Interval: {}s", config.sync.interval_secs);
    println!("  Staleness window: {} days", config.sync.staleness_days);
    println!(
        "  Roster levels: {}..={}",
        config.sync.min_level, config.sync.max_level
    );

    println!("\nRate Limit:");
    println!(
        "  {} calls per {}s, {} in flight",
        config.rate_limit.max_calls, config.rate_limit.period_secs, config.rate_limit.max_in_flight
    );

    println!("\nWeekly Reset:");
    println!(
        "  {} at {:02}:00 UTC, polled every {}s",
        config.reset.weekday, config.reset.hour, config.reset.poll_secs
    );

    println!("\nUpstream:");
    println!("  Profiles: {}", config.upstream.profile_url);
    println!("  Rosters: {}", config.upstream.roster_url);
    println!("  Token: {}", config.auth.token_url);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.bot_name);
    println!("  Version: {}", config.user_agent.bot_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);
    println!("  Contact Email: {}", config.user_agent.contact_email);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nGroups ({}):", config.groups.len());
    for group in &config.groups {
        println!("  - {}", GroupKey::new(&group.name, &group.realm, &group.region));
    }

    println!("\nDungeons ({}):", config.dungeons.len());
    for (abbr, name) in &config.dungeons {
        println!("  - {} = {}", abbr, name);
    }

    println!("\n✓ Configuration is valid");
}

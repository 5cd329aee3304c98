use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use vellum_core::{Micros, RevisionRepository, TransitionStatusRepository, UserId};
use vellum_engine::{apply_status_update, RevisionMigrator, TransitionScheduler};
use vellum_store::{load_or_init_config, open_primary_store, open_secondary_store, VellumStore};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Command::Schedule(args) => schedule(&cli.base, args).await,
        Command::Migrate(args) => migrate(&cli.base, args).await,
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Operational entry points for the Vellum sync backend"
)]
struct Cli {
    /// Directory holding vellum.json and the sqlite databases.
    #[arg(long, default_value = ".vellum")]
    base: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request transitions for users created inside a date window.
    Schedule(ScheduleArgs),
    /// Run the revision transition for a single user.
    Migrate(MigrateArgs),
}

#[derive(Parser)]
struct ScheduleArgs {
    /// Start of the user-creation window, inclusive (ISO-8601 or date-parseable).
    start_date: String,
    /// End of the user-creation window, inclusive.
    end_date: String,
    /// Re-request transitions that are still in progress.
    #[arg(long, default_value_t = false)]
    force_run: bool,
}

#[derive(Parser)]
struct MigrateArgs {
    /// User whose revisions should transition, as a uuid.
    user: String,
}

async fn schedule(base: &PathBuf, args: ScheduleArgs) -> Result<()> {
    let correlation = Micros::now();
    let start = Micros::from_date_string(&args.start_date)
        .with_context(|| format!("start date '{}'", args.start_date))?;
    let end = Micros::from_date_string(&args.end_date)
        .with_context(|| format!("end date '{}'", args.end_date))?;
    if end < start {
        bail!("end date precedes start date");
    }

    let config = load_or_init_config(base)?;
    let store = Arc::new(open_primary_store(base).await?);
    let scheduler = TransitionScheduler::new(
        store.clone(),
        store.clone(),
        store.clone(),
        config.user_page_size(),
    );

    info!(
        "[{correlation}] scheduling transitions for window {start}..={end} force_run={}",
        args.force_run
    );
    let outcome = scheduler.schedule(start, end, args.force_run).await?;
    info!(
        "[{correlation}] scheduling done: scanned {} requested {} skipped {}",
        outcome.users_scanned, outcome.requested, outcome.skipped
    );
    Ok(())
}

async fn migrate(base: &PathBuf, args: MigrateArgs) -> Result<()> {
    let correlation = Micros::now();
    let user_id = UserId::parse(&args.user)?;

    let config = load_or_init_config(base)?;
    let primary = Arc::new(open_primary_store(base).await?);
    let secondary = open_secondary_store(base)
        .await?
        .map(|store| Arc::new(store) as Arc<dyn RevisionRepository>);
    let statuses: Arc<dyn TransitionStatusRepository> = primary.clone();

    let migrator = RevisionMigrator::new(
        primary.clone(),
        secondary,
        Some(statuses.clone()),
        primary.clone(),
        config.revision_page_size(),
        Duration::from_millis(config.replication_lag_ms()),
    );

    let seen = primary.latest_event_sequence().await?;
    info!("[{correlation}] migrating revisions for user {user_id}");
    let run = migrator.migrate_user(user_id).await;
    apply_pending_status_events(&primary, statuses.as_ref(), seen).await?;
    run?;
    info!("[{correlation}] migration done for user {user_id}");
    Ok(())
}

/// Stand-in for the durable-bus status handler when running in place: apply
/// every status event the migration just published.
async fn apply_pending_status_events(
    store: &VellumStore,
    statuses: &dyn TransitionStatusRepository,
    seen: Option<i64>,
) -> Result<()> {
    let mut cursor = seen;
    loop {
        let events = store.get_events_since(cursor, 256).await?;
        if events.is_empty() {
            return Ok(());
        }
        cursor = events.last().map(|event| event.sequence);
        for event in events {
            apply_status_update(statuses, &event.event).await?;
        }
    }
}

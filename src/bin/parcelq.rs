//! parcelq CLI — operator interface to the report dispatch queue.

use clap::{Parser, Subcommand};
use parcelq_rs::config::Config;
use parcelq_rs::db::Db;
use parcelq_rs::dispatch::{DispatchConfig, Dispatcher};
use parcelq_rs::janitor::Janitor;
use parcelq_rs::model::{NewWorkItem, Priority, State, WorkId};
use parcelq_rs::recorder::OutcomeRecorder;
use parcelq_rs::retry::RetryPolicy;
use parcelq_rs::telemetry;
use secrecy::ExposeSecret;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "parcelq", about = "Dispatch queue for parcel analysis reports")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the janitor daemon
    Serve,
    /// Reclaim expired leases once and exit
    Reclaim,
    /// Show per-state queue depths
    Stats,
    /// Work item operations
    Work {
        #[command(subcommand)]
        action: WorkAction,
    },
}

#[derive(Subcommand)]
enum WorkAction {
    /// Create a report and enqueue its generation
    Submit {
        /// Parcel UUID the report analyzes
        parcel_id: uuid::Uuid,
        /// Requesting user UUID
        requested_by: uuid::Uuid,
        /// Priority: urgent | high | normal | low
        #[arg(long, default_value = "normal")]
        priority: String,
        /// Override the attempt bound
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// List work items
    List {
        /// Filter by state
        #[arg(long)]
        state: Option<String>,
        /// Maximum items to show
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Show a work item
    Show {
        /// Work item ID (full UUID or prefix)
        id: String,
        /// Emit the item as JSON instead of the field listing
        #[arg(long)]
        json: bool,
    },
    /// Cancel a queued work item
    Cancel {
        /// Work item ID (full UUID)
        id: uuid::Uuid,
    },
    /// Claim the next eligible item (manual worker / smoke testing)
    Claim {
        /// Worker identifier to lease under
        #[arg(long, default_value = "parcelq-cli")]
        worker: String,
    },
    /// Report an item complete on behalf of its worker
    Complete {
        /// Work item ID (full UUID)
        id: uuid::Uuid,
    },
    /// Report an item failed; requeues under backoff or fails terminally
    Fail {
        /// Work item ID (full UUID)
        id: uuid::Uuid,
        /// Error text to record
        #[arg(long)]
        error: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve => cmd_serve().await,
        Command::Reclaim => {
            let db = connect().await?;
            let count = db.reclaim_expired().await?;
            println!("Reclaimed {count} expired lease(s)");
            Ok(())
        }
        Command::Stats => {
            let db = connect().await?;
            let stats = db.queue_stats().await?;
            println!("queued:     {}", stats.queued);
            println!("leased:     {}", stats.leased);
            println!("complete:   {}", stats.complete);
            println!("failed:     {}", stats.failed);
            println!("cancelled:  {}", stats.cancelled);
            Ok(())
        }
        Command::Work { action } => {
            let config = Config::from_env()?;
            let db = Arc::new(connect_with(&config).await?);
            match action {
                WorkAction::Submit {
                    parcel_id,
                    requested_by,
                    priority,
                    max_attempts,
                } => {
                    let max_attempts = max_attempts.unwrap_or(config.queue.max_attempts);
                    cmd_work_submit(&db, parcel_id, requested_by, priority, max_attempts).await
                }
                WorkAction::List { state, limit } => cmd_work_list(&db, state, limit).await,
                WorkAction::Show { id, json } => cmd_work_show(&db, id, json).await,
                WorkAction::Cancel { id } => {
                    if db.cancel(WorkId(id)).await? {
                        println!("Cancelled {id}");
                    } else {
                        println!("Not cancelled - item is not in queued state");
                    }
                    Ok(())
                }
                WorkAction::Claim { worker } => {
                    let dispatcher = Dispatcher::new(
                        Arc::clone(&db),
                        DispatchConfig {
                            lease_duration: config.queue.lease_duration,
                        },
                    );
                    match dispatcher.dispatch(&worker).await? {
                        Some(item) => println!(
                            "Claimed: {} (attempt {}/{}, lease expires {})",
                            item.id,
                            item.attempts,
                            item.max_attempts,
                            item.lease_expires_at
                                .map(|t| t.to_rfc3339())
                                .unwrap_or_default()
                        ),
                        None => println!("No eligible work"),
                    }
                    Ok(())
                }
                WorkAction::Complete { id } => {
                    let recorder = recorder_from(&config, &db);
                    if recorder.complete(WorkId(id)).await? {
                        println!("Completed {id}");
                    } else {
                        println!("Ignored - item is not leased (already reported or reclaimed)");
                    }
                    Ok(())
                }
                WorkAction::Fail { id, error } => {
                    let recorder = recorder_from(&config, &db);
                    if recorder.fail(WorkId(id), &error).await? {
                        let item = db.get_work_item(WorkId(id)).await?;
                        println!("Recorded failure: {id} is now {}", item.state);
                    } else {
                        println!("Ignored - item is not leased (already reported or reclaimed)");
                    }
                    Ok(())
                }
            }
        }
    }
}

async fn connect() -> anyhow::Result<Db> {
    let config = Config::from_env()?;
    connect_with(&config).await
}

async fn connect_with(config: &Config) -> anyhow::Result<Db> {
    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;
    Ok(db)
}

fn recorder_from(config: &Config, db: &Arc<Db>) -> OutcomeRecorder {
    OutcomeRecorder::with_pg_sink(
        Arc::clone(db),
        RetryPolicy::exponential(config.queue.retry_delay),
    )
}

async fn cmd_serve() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = telemetry::init("parcelq", config.otel_endpoint.as_deref())?;

    let db = Db::connect(config.database_url.expose_secret()).await?;
    db.migrate().await?;

    let janitor = Janitor::new(Arc::new(db), config.queue.janitor_interval);

    let jan = janitor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        jan.shutdown();
    });

    janitor.run().await?;
    Ok(())
}

async fn cmd_work_submit(
    db: &Db,
    parcel_id: uuid::Uuid,
    requested_by: uuid::Uuid,
    priority: String,
    max_attempts: u32,
) -> anyhow::Result<()> {
    let priority: Priority = priority
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid priority: {priority}"))?;

    let report_id = db.create_report(parcel_id, requested_by).await?;

    let new = NewWorkItem::new(report_id, parcel_id, requested_by)
        .priority(priority)
        .max_attempts(max_attempts);

    let item = db.enqueue(new).await?;
    println!(
        "Enqueued: {} (report: {report_id}, priority: {}, state: {})",
        item.id, item.priority, item.state
    );

    Ok(())
}

async fn cmd_work_list(db: &Db, state: Option<String>, limit: i64) -> anyhow::Result<()> {
    let state_filter: Option<State> = match state {
        Some(s) => Some(
            s.parse()
                .map_err(|_| anyhow::anyhow!("invalid state: {s}"))?,
        ),
        None => None,
    };

    let items = db.list_work_items(state_filter, limit).await?;

    if items.is_empty() {
        println!("No work items found.");
        return Ok(());
    }

    // Header
    println!(
        "{:<8}  {:<10}  {:<7}  {:<8}  {:<16}  QUEUED",
        "ID", "STATE", "PRI", "ATTEMPTS", "HOLDER"
    );
    println!("{}", "-".repeat(80));

    for item in &items {
        let short_id = &item.id.0.to_string()[..8];
        let holder = item.lease_holder.as_deref().unwrap_or("-");
        println!(
            "{:<8}  {:<10}  {:<7}  {:<8}  {:<16}  {}",
            short_id,
            item.state.to_string(),
            item.priority.to_string(),
            format!("{}/{}", item.attempts, item.max_attempts),
            holder,
            item.queued_at.format("%Y-%m-%d %H:%M")
        );
    }

    println!("\n{} item(s)", items.len());
    Ok(())
}

async fn cmd_work_show(db: &Db, id_str: String, json: bool) -> anyhow::Result<()> {
    // Support prefix matching — find the work item whose ID starts with the given string
    let id = if id_str.len() < 36 {
        let items = db.list_work_items(None, 100).await?;
        let matches: Vec<_> = items
            .iter()
            .filter(|item| item.id.0.to_string().starts_with(&id_str))
            .collect();
        match matches.len() {
            0 => anyhow::bail!("no work item matching prefix '{id_str}'"),
            1 => matches[0].id,
            n => anyhow::bail!("{n} work items match prefix '{id_str}' — be more specific"),
        }
    } else {
        WorkId(uuid::Uuid::parse_str(&id_str)?)
    };

    let item = db.get_work_item(id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&item)?);
        return Ok(());
    }

    println!("ID:            {}", item.id.0);
    println!("Report:        {}", item.report_id);
    println!("Parcel:        {}", item.parcel_id);
    println!("Requested By:  {}", item.requested_by);
    println!("Priority:      {}", item.priority);
    println!("State:         {}", item.state);
    println!("Attempts:      {}/{}", item.attempts, item.max_attempts);
    println!("Queued:        {}", item.queued_at);
    if let Some(next) = item.next_eligible_at {
        println!("Eligible At:   {next}");
    }
    if let Some(ref holder) = item.lease_holder {
        println!("Lease Holder:  {holder}");
    }
    if let Some(expires) = item.lease_expires_at {
        let marker = if item.lease_expired(chrono::Utc::now()) {
            " (expired, pending reclaim)"
        } else {
            ""
        };
        println!("Lease Expires: {expires}{marker}");
    }
    if item.error_count > 0 {
        println!("Errors:        {}", item.error_count);
    }
    if let Some(ref err) = item.last_error {
        println!("Last Error:    {err}");
    }
    println!("Updated:       {}", item.updated_at);
    if let Some(resolved) = item.resolved_at {
        println!("Resolved:      {resolved}");
    }

    Ok(())
}

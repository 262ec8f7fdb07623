// Main entry point for the job-posting sync service

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jobsync::stores::{export_snapshot, import_snapshot};
use jobsync::FieldMapping;
use server_core::kernel::{
    create_feishu_client, open_state_store, run_scheduled, start_scheduler, PipelineDeps,
};
use server_core::server::{build_app, serve};
use server_core::Config;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "jobsync")]
#[command(about = "Sync campus-recruitment postings into a Feishu table")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every enabled source once and print the summary as JSON
    Run {
        /// In-memory state and no Feishu writes
        #[arg(long)]
        dry_run: bool,
    },

    /// Run on SCHEDULE_CRON and serve /health until interrupted
    Schedule,

    /// Check Feishu credentials and table access
    Test,

    /// List the table's fields against the column mapping
    Fields,

    /// Write the state store to a JSON snapshot
    ExportState { path: PathBuf },

    /// Load a JSON snapshot into the state store
    ImportState { path: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobsync=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    match cli.command {
        Commands::Run { dry_run } => run_once(&config, dry_run).await,
        Commands::Schedule => schedule(&config).await,
        Commands::Test => test_connection(&config).await,
        Commands::Fields => list_fields(&config).await,
        Commands::ExportState { path } => {
            let store = open_state_store(&config.state_database_url).await?;
            let count = export_snapshot(store.as_ref(), &path)
                .await
                .context("Failed to export state")?;
            println!("Exported {} entries to {}", count, path.display());
            Ok(())
        }
        Commands::ImportState { path } => {
            let store = open_state_store(&config.state_database_url).await?;
            let count = import_snapshot(store.as_ref(), &path)
                .await
                .context("Failed to import state")?;
            println!("Imported {} entries from {}", count, path.display());
            Ok(())
        }
    }
}

async fn run_once(config: &Config, dry_run: bool) -> Result<()> {
    let deps = if dry_run {
        PipelineDeps::dry_run(config)?
    } else {
        PipelineDeps::connect(config).await?
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current write");
            ctrl_c.cancel();
        }
    });

    let summary = deps
        .orchestrator
        .run_until_cancelled(&deps.registry, &cancel)
        .await
        .context("Run aborted")?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn schedule(config: &Config) -> Result<()> {
    tracing::info!("Starting scheduled sync");

    test_connection(config)
        .await
        .context("Feishu connection check failed, not starting the scheduler")?;

    let deps = PipelineDeps::connect(config).await?;
    let cancel = CancellationToken::new();

    let app = build_app(deps.status.clone(), deps.store.clone());
    let server = tokio::spawn(serve(app, config.health_port, cancel.clone()));

    let mut scheduler = start_scheduler(deps.clone(), &config.schedule_cron, cancel.clone()).await?;

    // First run right away rather than waiting for the next tick
    let first_run = {
        let deps = deps.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { run_scheduled(&deps, &cancel).await })
    };

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for interrupt")?;
    tracing::info!("Shutting down");

    cancel.cancel();
    scheduler.shutdown().await?;
    if let Err(e) = first_run.await {
        tracing::error!("Initial run task failed: {}", e);
    }
    server.await.context("Health server task failed")??;

    Ok(())
}

async fn test_connection(config: &Config) -> Result<()> {
    let client = create_feishu_client(config.require_feishu()?)?;

    client
        .tenant_access_token()
        .await
        .context("Failed to obtain tenant access token")?;
    let fields = client
        .list_fields()
        .await
        .context("Failed to list table fields")?;

    tracing::info!(
        app_token = client.app_token(),
        table_id = client.table_id(),
        fields = fields.len(),
        "Feishu connection OK"
    );
    Ok(())
}

async fn list_fields(config: &Config) -> Result<()> {
    let client = create_feishu_client(config.require_feishu()?)?;
    let fields = client
        .list_fields()
        .await
        .context("Failed to list table fields")?;

    println!("Table fields:");
    for field in &fields {
        let primary = if field.is_primary { " (primary)" } else { "" };
        println!("  {} [type {}]{}", field.field_name, field.field_type, primary);
    }

    let mapping = FieldMapping::default();
    let missing = mapping.missing_columns(&fields);

    println!("\nColumn mapping:");
    for (record_field, column) in mapping.columns() {
        let flag = if missing.contains(&column) { "  MISSING" } else { "" };
        println!("  {:<16} -> {}{}", record_field, column, flag);
    }

    if !missing.is_empty() {
        println!("\n{} mapped column(s) missing from the table", missing.len());
    }
    Ok(())
}

//! Tallyhall ledger repair tool.
//!
//! Backfills entries missing for approved and voided documents, rewrites
//! running balances and resyncs every entity's balance cache.
//!
//! Usage:
//!   repair                    - Repair every entity
//!   repair --dry-run          - Report drift without writing
//!   repair --entity <UUID>... - Repair only the given entities

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tallyhall_core::LedgerEngine;
use tallyhall_core::engine::RepairOptions;
use tallyhall_db::{PgLedgerStore, connect_with};
use tallyhall_shared::{AppConfig, AppError};
use tallyhall_shared::config::LoggingConfig;
use tallyhall_shared::types::EntityId;

#[derive(Parser)]
#[command(name = "repair")]
#[command(about = "Reconcile ledger entries and balance caches")]
struct Cli {
    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,

    /// Only repair these entities (repeatable)
    #[arg(long = "entity", value_name = "UUID")]
    entities: Vec<EntityId>,

    /// Print the full report as JSON
    #[arg(long)]
    json: bool,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter.clone().into());
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    let db = connect_with(&config.database)
        .await
        .context("failed to connect to database")?;
    info!("Connected to database");

    let engine = LedgerEngine::with_config(
        PgLedgerStore::from_config(db, &config.engine),
        &config.reporting,
    );
    let options = RepairOptions {
        dry_run: cli.dry_run,
        entity_ids: (!cli.entities.is_empty()).then_some(cli.entities),
    };
    let report = match engine.run_repair(options).await {
        Ok(report) => report,
        Err(err) => {
            let err = AppError::from(err);
            error!(
                code = err.error_code(),
                retryable = err.is_retryable(),
                "Repair aborted: {err}"
            );
            return Err(err.into());
        }
    };

    for drift in &report.drifted {
        info!(
            entity_id = %drift.entity_id,
            cached = %drift.cached_balance,
            ledger = %drift.ledger_balance,
            "Cache drift"
        );
    }
    for entity_id in &report.anomalies {
        warn!(entity_id = %entity_id, "Ledger implies negative stock");
    }
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    if report.failures.is_empty() {
        Ok(())
    } else {
        anyhow::bail!("{} item(s) could not be repaired", report.failures.len())
    }
}

//! # Chartbatch Transaction Recovery
//!
//! Command-line tool for inspecting journaled batch transactions and
//! resolving the ambiguous ones against the server. Run it after a crash
//! or interrupted submission to find out what actually landed.

use anyhow::Context;
use chartbatch_core::config::CoordinatorConfig;
use chartbatch_core::coordinator::OperationCoordinator;
use chartbatch_core::model::TransactionId;
use clap::{Parser, Subcommand};
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "chartbatch-recover")]
#[command(about = "Inspect and recover journaled batch transactions")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path (default: discovered per platform)
    #[arg(short, long)]
    config: Option<String>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List journaled transactions, newest first
    List,

    /// Fetch the authoritative server record for one transaction
    Status {
        /// Transaction id (UUID)
        transaction_id: String,
    },

    /// Check one transaction and request a server-side retry when its
    /// authoritative status says one is worth it
    Retry {
        /// Transaction id (UUID)
        transaction_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    match run(&cli).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("Recovery command failed: {e:#}");
            process::exit(1);
        }
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => CoordinatorConfig::load_from_file(std::path::Path::new(path))
            .with_context(|| format!("failed to load configuration from {path}"))?,
        None => CoordinatorConfig::load().context("failed to load configuration")?,
    };

    let coordinator =
        OperationCoordinator::new(config).context("failed to build operation coordinator")?;

    match &cli.command {
        Some(Commands::List) | None => list_transactions(&coordinator),
        Some(Commands::Status { transaction_id }) => {
            show_status(&coordinator, transaction_id).await
        }
        Some(Commands::Retry { transaction_id }) => {
            retry_transaction(&coordinator, transaction_id).await
        }
    }
}

fn list_transactions(coordinator: &OperationCoordinator) -> anyhow::Result<()> {
    let entries = coordinator.journal_recent();

    if entries.is_empty() {
        println!("ℹ️  Journal is empty - nothing to recover");
        return Ok(());
    }

    println!("📋 Journaled transactions (newest first):");
    for entry in entries {
        let marker = if entry.status.is_complete() {
            "✅"
        } else if entry.status.is_retryable() {
            "❌"
        } else {
            "⏳"
        };
        println!(
            "  {} {}  {:<12} {:>3} item(s)  {}",
            marker,
            entry.id,
            entry.status.to_string(),
            entry.item_count,
            entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        );
    }

    Ok(())
}

async fn show_status(coordinator: &OperationCoordinator, raw: &str) -> anyhow::Result<()> {
    let id = parse_transaction_id(raw)?;

    let record = coordinator
        .refresh_transaction(id)
        .outcome()
        .await
        .with_context(|| format!("failed to fetch status for transaction {id}"))?;

    println!("🔎 Transaction {}", record.transaction_id);
    println!("   Status: {}", record.status);
    println!("   Items:  {}", record.item_count);

    if let Some(items) = &record.items {
        for item in items {
            let site = item
                .site
                .as_deref()
                .map(|s| format!(" ({s})"))
                .unwrap_or_default();
            println!(
                "   • server id {}  {} {}{}",
                item.server_id.0, item.category, item.code, site
            );
        }
    }

    if let Some(audit) = &record.audit_records {
        println!("   Audit trail:");
        for entry in audit {
            let detail = entry
                .detail
                .as_deref()
                .map(|d| format!(": {d}"))
                .unwrap_or_default();
            println!(
                "   - {} {}{}",
                entry.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                entry.action,
                detail
            );
        }
    }

    Ok(())
}

async fn retry_transaction(coordinator: &OperationCoordinator, raw: &str) -> anyhow::Result<()> {
    let id = parse_transaction_id(raw)?;
    println!("🔄 Recovering transaction {id}");

    let outcome = coordinator
        .recover_transaction(id)
        .outcome()
        .await
        .with_context(|| format!("recovery failed for transaction {id}"))?;

    if outcome.retried {
        println!(
            "✅ Server retry requested - status is now {}",
            outcome.record.status
        );
        if !outcome.newly_completed.is_empty() {
            println!(
                "   {} staged item(s) resolved by the retry",
                outcome.newly_completed.len()
            );
        }
    } else {
        println!(
            "ℹ️  Status is {} - no retry needed",
            outcome.record.status
        );
    }

    Ok(())
}

fn parse_transaction_id(raw: &str) -> anyhow::Result<TransactionId> {
    raw.parse()
        .with_context(|| format!("'{raw}' is not a valid transaction id"))
}

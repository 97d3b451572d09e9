//! Stock ledger CLI.
//!
//! # Quick Start
//!
//! ```bash
//! export DATABASE_URL=postgres://localhost/stock
//!
//! stockledger increase 0190f5c2-7a1e-7c3b-9d41-2f6b8e0a1c55 10 --reason restock
//! stockledger decrease 0190f5c2-7a1e-7c3b-9d41-2f6b8e0a1c55 4 --reason sale
//! stockledger history 0190f5c2-7a1e-7c3b-9d41-2f6b8e0a1c55 --json
//! ```
//!
//! Exit codes: 0 success, 1 setup failure, 2 usage error, then one code per
//! ledger error kind (see [`commands::exit_code`]).

mod commands;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stockledger_core::ItemId;
use stockledger_infra::{
    LedgerConfig, PostgresItemDirectory, PostgresStockStore, StockLedger, db,
};

/// Stock ledger: quantities on hand plus an append-only movement log.
#[derive(Parser)]
#[command(name = "stockledger")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Receive stock.
    Increase {
        /// Item identifier (UUID).
        item: ItemId,

        /// Units received (> 0).
        qty: i64,

        /// Why the stock moved.
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Issue stock.
    Decrease {
        /// Item identifier (UUID).
        item: ItemId,

        /// Units issued (> 0).
        qty: i64,

        /// Why the stock moved.
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Apply a signed delta (positive in, negative out).
    Adjust {
        /// Item identifier (UUID).
        item: ItemId,

        /// Signed, non-zero delta.
        #[arg(allow_negative_numbers = true)]
        delta: i64,

        /// Why the stock moved.
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// Show the quantity on hand.
    Quantity {
        /// Item identifier (UUID).
        item: ItemId,
    },

    /// List movements, newest first.
    History {
        /// Item identifier (UUID).
        item: ItemId,

        /// Page size (capped at 1000).
        #[arg(short, long)]
        limit: Option<u32>,

        /// Number of newest movements to skip.
        #[arg(short, long)]
        offset: Option<u32>,

        /// Print the page as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Check the snapshot against a replay of the movement log.
    Reconcile {
        /// Item identifier (UUID).
        item: ItemId,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    stockledger_observability::init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(commands::exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> Result<String> {
    let config = LedgerConfig::from_env().context("Failed to load configuration")?;
    let pool = db::connect(&config)
        .await
        .context("Failed to connect to the database")?;

    let ledger = StockLedger::new(
        PostgresStockStore::new(pool.clone()),
        PostgresItemDirectory::new(pool),
    )
    .with_retry_policy(config.retry);

    match cli.command {
        Commands::Increase { item, qty, reason } => {
            commands::increase(&ledger, item, qty, reason).await
        }
        Commands::Decrease { item, qty, reason } => {
            commands::decrease(&ledger, item, qty, reason).await
        }
        Commands::Adjust {
            item,
            delta,
            reason,
        } => commands::adjust(&ledger, item, delta, reason).await,
        Commands::Quantity { item } => commands::quantity(&ledger, item).await,
        Commands::History {
            item,
            limit,
            offset,
            json,
        } => commands::history(&ledger, item, limit, offset, json).await,
        Commands::Reconcile { item } => commands::reconcile(&ledger, item).await,
    }
}

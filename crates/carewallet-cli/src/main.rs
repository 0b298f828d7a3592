//! CareWallet CLI - Run the benefit core against an in-memory engine
//!
//! # Quick Start
//!
//! ```bash
//! # Full claim lifecycle for a family wallet
//! carewallet demo --bill 2000 --limit 5000
//!
//! # Carry last year's unused balance forward
//! carewallet rollover --spent 4000 --carry-percent 50
//!
//! # Effective engine configuration
//! carewallet config
//! ```
//!
//! Engine settings come from `CAREWALLET_*` environment variables, optionally
//! loaded from a `.env` file. Log verbosity follows `RUST_LOG`.

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use carewallet_sdk::{BenefitEngine, EngineConfig};

mod commands;
mod display;

use commands::demo::DemoOptions;
use commands::rollover::RolloverOptions;

/// CareWallet CLI - Benefit wallets and claim adjudication
#[derive(Parser)]
#[command(name = "carewallet")]
#[command(author = "CareWallet Contributors")]
#[command(version)]
#[command(about = "Employee health-benefit wallets with claim adjudication and payment", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a claim from submission through documents, review and payment
    Demo {
        /// Annual wallet allocation, in whole currency units
        #[arg(long, default_value = "10000")]
        annual: i64,

        /// Per-claim limit, in whole currency units
        #[arg(long, default_value = "5000")]
        limit: i64,

        /// Bill amount, in whole currency units
        #[arg(long, default_value = "2000")]
        bill: i64,

        /// Copay percent charged to the member
        #[arg(long)]
        copay: Option<u32>,

        /// Pay the capped amount when the bill exceeds a limit
        #[arg(long)]
        partial: bool,

        /// Print analytics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Roll a wallet over into the next policy period
    Rollover {
        /// Annual wallet allocation, in whole currency units
        #[arg(long, default_value = "10000")]
        annual: i64,

        /// Amount claimed during the prior period, in whole currency units
        #[arg(long, default_value = "4000")]
        spent: i64,

        /// Share of the unused balance carried forward
        #[arg(long, default_value = "100")]
        carry_percent: u32,

        /// Months the carried balance stays usable
        #[arg(long, default_value = "3")]
        carry_months: u32,
    },

    /// Show the effective engine configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = EngineConfig::from_env();

    match cli.command {
        Commands::Demo {
            annual,
            limit,
            bill,
            copay,
            partial,
            json,
        } => {
            let engine = BenefitEngine::new(config);
            commands::demo::run(
                &engine,
                DemoOptions {
                    annual,
                    per_claim_limit: limit,
                    bill,
                    copay_percent: copay,
                    partial,
                    json,
                },
            )
            .await?;
        }
        Commands::Rollover {
            annual,
            spent,
            carry_percent,
            carry_months,
        } => {
            let engine = BenefitEngine::new(config);
            commands::rollover::run(
                &engine,
                RolloverOptions {
                    annual,
                    spent,
                    carry_percent,
                    carry_months,
                },
            )
            .await?;
        }
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

//! Escrowkit CLI - run the escrow lifecycle and inspect approval records
//!
//! # Quick Start
//!
//! ```bash
//! # Deploy two escrows on the local chain and approve them
//! escrowkit demo --escrows 2 --eth 1.5
//!
//! # Inspect the durable approval records
//! escrowkit approved list
//! escrowkit approved clear --yes
//! escrowkit status
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use colored::*;
use escrowkit_escrow::EscrowConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod display;

use commands::{approved, demo, status};

/// Escrowkit CLI - two-party escrows with durable approval records
#[derive(Parser)]
#[command(name = "escrowkit")]
#[command(author = "Escrowkit Contributors")]
#[command(version)]
#[command(about = "Deploy escrows, watch for approval, and keep a durable approval ledger", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Directory of the approval store
    #[arg(long, global = true, env = "ESCROWKIT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Key the approval records are stored under
    #[arg(long, global = true, env = "ESCROWKIT_STORAGE_KEY")]
    storage_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full lifecycle on an in-process chain
    Demo {
        /// Wallet label of the depositor
        #[arg(long, default_value = "depositor")]
        depositor_label: String,

        /// Wallet label of the arbiter
        #[arg(long, default_value = "arbiter")]
        arbiter_label: String,

        /// Wallet label of the beneficiary
        #[arg(long, default_value = "beneficiary")]
        beneficiary_label: String,

        /// Deposit per escrow, in ether
        #[arg(long, default_value = "1.0")]
        eth: String,

        /// Number of escrows to deploy
        #[arg(short, long, default_value = "1")]
        escrows: u32,
    },

    /// Inspect or clear approved escrow records
    Approved {
        #[command(subcommand)]
        action: ApprovedCommands,
    },

    /// Show configuration
    Status,
}

#[derive(Subcommand)]
enum ApprovedCommands {
    /// List stored records
    List {
        /// Print the raw stored JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete every stored record
    Clear {
        /// Confirm deletion
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let mut config = EscrowConfig::from_env()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    if let Some(key) = cli.storage_key {
        config.storage_key = key;
    }

    let raw_output = matches!(
        cli.command,
        Commands::Approved {
            action: ApprovedCommands::List { json: true }
        }
    );
    if !raw_output {
        print_banner();
    }

    match cli.command {
        Commands::Demo {
            depositor_label,
            arbiter_label,
            beneficiary_label,
            eth,
            escrows,
        } => {
            demo::run_demo(
                &config,
                demo::DemoOptions {
                    depositor_label,
                    arbiter_label,
                    beneficiary_label,
                    eth,
                    escrows,
                },
            )
            .await?;
        }
        Commands::Approved { action } => match action {
            ApprovedCommands::List { json } => approved::list(&config, json)?,
            ApprovedCommands::Clear { yes } => approved::clear(&config, yes)?,
        },
        Commands::Status => status::show(&config)?,
    }

    Ok(())
}

fn print_banner() {
    println!();
    println!("{}", "╔══════════════════════════════════════════════════╗".bright_cyan());
    println!(
        "{}{}{}",
        "║  ".bright_cyan(),
        "Escrowkit".bright_white().bold(),
        " - Two-party escrow lifecycle controller  ║".bright_cyan()
    );
    println!("{}", "╚══════════════════════════════════════════════════╝".bright_cyan());
    println!();
}

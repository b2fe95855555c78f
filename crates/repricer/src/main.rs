// SPDX-FileCopyrightText: 2026 Repricer Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! repricer - inventory-driven price rules for commerce webhooks.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod commands;
mod serve;
mod shutdown;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use repricer_config::RepricerConfig;
use repricer_core::RepricerError;
use repricer_core::traits::StorageAdapter;
use repricer_storage::SqliteStorage;

/// repricer - inventory-driven price rules for commerce webhooks.
#[derive(Parser, Debug)]
#[command(name = "repricer", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook receiver and queue workers.
    Serve,
    /// Validate configuration and print the effective settings.
    CheckConfig,
    /// Manage campaigns.
    Campaign {
        #[command(subcommand)]
        action: CampaignCommands,
    },
    /// Inspect a variant.
    Variant {
        #[command(subcommand)]
        action: VariantCommands,
    },
}

#[derive(Subcommand, Debug)]
enum CampaignCommands {
    /// Import campaigns from a JSON file (one campaign or an array).
    Import { path: PathBuf },
    /// Print a stored campaign.
    Show { id: String },
    /// Change a campaign's status (DRAFT, ACTIVE, PAUSED, COMPLETED, ARCHIVED).
    Transition { id: String, status: String },
}

#[derive(Subcommand, Debug)]
enum VariantCommands {
    /// Snapshot history, newest first.
    History {
        shop: String,
        variant: String,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Execution state of every rule tracked for the variant.
    State { shop: String, variant: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => repricer_config::load_and_validate_path(path),
        None => repricer_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            repricer_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.service.log_level);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: RepricerConfig) -> Result<(), RepricerError> {
    match command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::CheckConfig) => {
            print_config_summary(&config);
            Ok(())
        }
        Some(Commands::Campaign { action }) => {
            let storage = open_storage(&config).await?;
            match action {
                CampaignCommands::Import { path } => {
                    let campaigns = commands::read_campaigns(&path)?;
                    let count = commands::import_campaigns(
                        &storage,
                        &campaigns,
                        config.engine.default_reset_margin,
                    )
                    .await?;
                    println!("imported {count} campaign(s)");
                }
                CampaignCommands::Show { id } => {
                    println!("{}", commands::show_campaign(&storage, &id).await?);
                }
                CampaignCommands::Transition { id, status } => {
                    let campaign = commands::transition_campaign(&storage, &id, &status).await?;
                    println!("campaign {} is now {}", campaign.id, campaign.status);
                }
            }
            storage.close().await
        }
        Some(Commands::Variant { action }) => {
            let storage = open_storage(&config).await?;
            let lines = match action {
                VariantCommands::History {
                    shop,
                    variant,
                    limit,
                } => commands::variant_history(&storage, &shop, &variant, limit).await?,
                VariantCommands::State { shop, variant } => {
                    commands::variant_states(&storage, &shop, &variant).await?
                }
            };
            if lines.is_empty() {
                println!("no records");
            }
            for line in lines {
                println!("{line}");
            }
            storage.close().await
        }
        None => {
            println!("repricer: use --help for available commands");
            Ok(())
        }
    }
}

async fn open_storage(config: &RepricerConfig) -> Result<SqliteStorage, RepricerError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    Ok(storage)
}

fn print_config_summary(config: &RepricerConfig) {
    println!("configuration ok");
    println!("  service.name             = {}", config.service.name);
    println!("  storage.database_path    = {}", config.storage.database_path);
    println!("  engine.default_reset_margin = {}", config.engine.default_reset_margin);
    println!(
        "  engine.cooldown_secs     = {}",
        config
            .engine
            .cooldown_secs
            .map(|s| s.to_string())
            .unwrap_or_else(|| "none".into())
    );
    println!("  webhook.listen           = {}:{}", config.webhook.host, config.webhook.port);
    println!(
        "  webhook.shared_secret    = {}",
        if config.webhook.shared_secret.is_some() { "set" } else { "unset" }
    );
    println!("  webhook.workers          = {}", config.webhook.workers);
    println!("  prometheus.enabled       = {}", config.prometheus.enabled);
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("repricer={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

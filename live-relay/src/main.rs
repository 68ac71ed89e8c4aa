use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use live_relay::config::{DEFAULT_CONFIG_PATH, RelayConfig};
use live_relay::subscription::SubscriptionIndex;
use live_relay::utils::http_client::install_rustls_provider;
use live_relay::{LiveRelay, RelayParts, logging};

#[derive(Debug, Parser)]
#[command(name = "live-relay", version, about = "Relay live status and danmu to subscriber groups")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log filter directive (overridden by RUST_LOG)
    #[arg(long)]
    log_filter: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Validate the config file and print the subscription index
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = RelayConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if let Some(Command::Check) = args.command {
        print_index(&config);
        return Ok(());
    }

    let filter = args.log_filter.as_deref().or(config.log_filter.as_deref());
    logging::init_logging(filter, args.json_logs)?;
    install_rustls_provider();

    info!(config = %args.config.display(), "Starting live-relay {}", env!("CARGO_PKG_VERSION"));
    let relay = LiveRelay::start(&config, RelayParts::from_config(&config));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("Received shutdown signal");

    relay.shutdown().await;
    Ok(())
}

fn print_index(config: &RelayConfig) {
    let index = SubscriptionIndex::new(&config.subscriptions);
    println!("Config OK");
    println!("Polling interval: {}s", config.polling_interval_secs);
    println!("Forward keywords: {:?}", config.danmu_forward_keywords);
    for &group_id in index.groups() {
        println!("Group {}: {:?}", group_id, index.accounts_of(group_id));
    }
    println!("Tracked accounts: {}", index.accounts().len());
}

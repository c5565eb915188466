//! playtimed - The playtime budget service
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization
//! - Budget engine
//! - HTTP live gate
//! - IPC server

mod handler;
mod presenter;
mod service;

use anyhow::Result;
use clap::Parser;
use playtime_util::{default_config_path, PLAYTIME_DATA_DIR_ENV, PLAYTIME_SOCKET_ENV};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::service::Service;

/// playtimed - daily playtime budgets with live feedback
#[derive(Parser, Debug)]
#[command(name = "playtimed")]
#[command(about = "Daily playtime budget service", long_about = None)]
pub struct Args {
    /// Configuration file path (default: ~/.config/playtimed/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override
    #[arg(short, long, env = PLAYTIME_SOCKET_ENV)]
    socket: Option<PathBuf>,

    /// Data directory override
    #[arg(short, long, env = PLAYTIME_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }

    info!(version = env!("CARGO_PKG_VERSION"), "playtimed starting");

    if playtime_util::is_mock_time_active() {
        info!(today = %playtime_util::today(), "Mock time active");
    }

    let service = Service::new(&args).await?;
    service.run().await
}

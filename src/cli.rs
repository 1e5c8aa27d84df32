//! Command-line interface.
//!
//! - `serve` (default): run the pairing gateway
//! - `config`: print the resolved configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::{self, Config};
use crate::gateway::{GatewayConfig, GatewayServer};
use crate::link::SimulatedLinkClient;
use crate::pairing::PairingService;

const DEFAULT_QR_REFRESH_SECS: u64 = 20;

#[derive(Parser, Debug)]
#[command(name = "pairgate")]
#[command(about = "Pairing-session gateway for device-linking clients")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Log output format
    #[arg(long, global = true, value_enum, env = "PAIRGATE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the pairing gateway (default if no subcommand given)
    Serve(ServeArgs),

    /// Print the resolved configuration
    Config,
}

/// Overrides applied on top of the environment configuration.
///
/// Each flag also reads the same environment variable as [`Config`], and
/// durations must be positive in both places.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = config::ENV_HTTP_ADDR)]
    pub addr: Option<SocketAddr>,

    /// Directory holding per-session working directories
    #[arg(long, env = config::ENV_SESSIONS_DIR)]
    pub sessions_dir: Option<PathBuf>,

    /// Seconds a session that is not open may live
    #[arg(long, env = config::ENV_SESSION_TTL, value_parser = clap::value_parser!(u64).range(1..))]
    pub ttl_secs: Option<u64>,

    /// Seconds between expiry sweeps
    #[arg(long, env = config::ENV_SWEEP_INTERVAL, value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval_secs: Option<u64>,

    /// Seconds between simulated scannable-payload refreshes
    #[arg(long, env = "PAIRGATE_QR_REFRESH_SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub qr_refresh_secs: Option<u64>,
}

impl ServeArgs {
    /// Apply command-line overrides to `config`.
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(addr) = self.addr {
            config.http_addr = addr;
        }
        if let Some(dir) = &self.sessions_dir {
            config.sessions_dir = dir.clone();
        }
        if let Some(ttl) = self.ttl_secs {
            config.session_ttl = Duration::from_secs(ttl);
        }
        if let Some(interval) = self.sweep_interval_secs {
            config.sweep_interval = Duration::from_secs(interval);
        }
        config
    }
}

/// Run the gateway until Ctrl-C.
pub async fn run_serve_command(args: ServeArgs, config: Config) -> anyhow::Result<()> {
    let config = args.apply(config);
    tokio::fs::create_dir_all(&config.sessions_dir).await?;

    let qr_refresh = args.qr_refresh_secs.unwrap_or(DEFAULT_QR_REFRESH_SECS);
    let client = SimulatedLinkClient::new().with_qr_refresh(Duration::from_secs(qr_refresh));
    let service = Arc::new(PairingService::from_config(&config, Arc::new(client)));
    service.start_sweeper();

    let mut server = GatewayServer::new(
        GatewayConfig {
            addr: config.http_addr,
        },
        Arc::clone(&service),
    );
    let addr = server.start().await?;

    tracing::info!(
        addr = %addr,
        sessions_dir = %config.sessions_dir.display(),
        ttl_secs = config.session_ttl.as_secs(),
        "pairgate ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    server.shutdown().await;
    service.shutdown().await;
    Ok(())
}

/// Print the resolved configuration.
pub fn run_config_command(config: &Config) {
    println!("pairgate configuration");
    println!("======================\n");
    println!("  Sessions dir:    {}", config.sessions_dir.display());
    println!("  Session TTL:     {}s", config.session_ttl.as_secs());
    println!("  Sweep interval:  {}s", config.sweep_interval.as_secs());
    println!("  Code digits:     {}", config.code_digits);
    println!("  HTTP address:    {}", config.http_addr);
}

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pairgate::Config;
use pairgate::cli::{Cli, Command, LogFormat, ServeArgs, run_config_command, run_serve_command};

const DEFAULT_LOG_FILTER: &str = "pairgate=info,tower_http=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine; everything has a default.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = Config::from_env()?;

    match cli.command.unwrap_or(Command::Serve(ServeArgs::default())) {
        Command::Serve(args) => run_serve_command(args, config).await,
        Command::Config => {
            run_config_command(&config);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

//! CLI for ledgercast
//!
//! Loads configuration, initialises logging and serves the HTTP and WebSocket
//! routes until Ctrl+C or SIGTERM.

use std::process::ExitCode;

use clap::Parser;
use ledgercast::config::{DEFAULT_CONFIG_PATH, Settings, load_config_from};
use ledgercast::transport::serve;
use ledgercast::utils::error::Result;
use ledgercast::utils::logging;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ledgercast", about = "Real-time balance broadcaster")]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: String,
    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = load_config_from(&cli.config);

    let level = cli
        .log_level
        .clone()
        .or_else(|| config.as_ref().ok().map(|c| c.log.level.clone()))
        .unwrap_or_else(|| "info".to_string());
    logging::init(&level);

    let result = match config {
        Ok(config) => run_server(config).await,
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Server failed: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(config: Settings) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await?;

    serve(listener, &config, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Shutdown signal received. Exiting gracefully."),
        _ = terminate => info!("Terminate signal received. Exiting gracefully."),
    }
}

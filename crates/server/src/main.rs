mod bootstrap;
mod health;
mod reconcile;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;

use intake_core::config::{AppConfig, ConfigOverrides, LoadOptions};

#[derive(Debug, Parser)]
#[command(name = "intake-server", about = "Order-intake chat bot")]
struct Cli {
    /// Path to the configuration file (defaults to intake.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level override (trace|debug|info|warn|error).
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(config: &AppConfig) {
    use intake_core::config::LogFormat::*;
    use tracing::Level;

    let log_level = config.logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(LoadOptions {
        config_path: cli.config,
        overrides: ConfigOverrides { log_level: cli.log_level, ..ConfigOverrides::default() },
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        Arc::clone(&app.registry),
    )
    .await?;

    let reconciler = Arc::clone(&app.reconciler);
    tokio::spawn(async move { reconciler.run().await });

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        "intake-server started"
    );

    let transport = Arc::clone(&app.transport);
    let sessions = Arc::clone(&app.sessions);
    tokio::select! {
        _ = app.router.run(transport, sessions) => {
            tracing::info!(
                event_name = "system.server.transport_closed",
                correlation_id = "shutdown",
                "chat transport stopped"
            );
        }
        result = tokio::signal::ctrl_c() => {
            result?;
            tracing::info!(
                event_name = "system.server.stopping",
                correlation_id = "shutdown",
                "intake-server stopping"
            );
        }
    }

    Ok(())
}

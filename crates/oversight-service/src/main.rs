//! oversightd - grant oversight service
//!
//! Serves the REST API for objectives, activities, spend, attachments and
//! the two-stage budget revision workflow.

use clap::Parser;
use oversight_service::error::{DaemonError, DaemonResult};
use oversight_service::{Server, ServiceConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// oversightd CLI
#[derive(Parser)]
#[command(name = "oversightd")]
#[command(about = "Grant oversight service", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "OVERSIGHT_CONFIG")]
    config: Option<String>,

    /// Listen address, overriding the configuration file
    #[arg(short, long, env = "OVERSIGHT_LISTEN_ADDR")]
    listen: Option<String>,

    /// Log level, overriding the configuration file
    #[arg(long, env = "OVERSIGHT_LOG_LEVEL")]
    log_level: Option<String>,

    /// Enable JSON logging
    #[arg(long, env = "OVERSIGHT_LOG_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> DaemonResult<()> {
    let cli = Cli::parse();

    let mut config = ServiceConfig::load(cli.config.as_deref())
        .map_err(|e| DaemonError::Config(e.to_string()))?;

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.logging.level.clone().into());

    if config.logging.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    if let Some(listen) = cli.listen {
        config.server.listen_addr = listen
            .parse()
            .map_err(|e| DaemonError::Config(format!("Invalid listen address: {}", e)))?;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        listen = %config.server.listen_addr,
        storage = config.storage.label(),
        "Starting oversightd"
    );

    let server = Server::new(config).await?;
    server.run().await
}

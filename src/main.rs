//! Notification Service - subscription event webhook dispatcher
//!
//! Subscribes to the configured Redis channel and forwards every event to the
//! callback URLs registered in the database.

use anyhow::Result;
use clap::Parser;
use notification_service::{
    app::{cancel_on_signal, App},
    cli::Cli,
    config::Config,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = Config::load(&cli).unwrap_or_else(|err| {
        tracing_subscriber::fmt().with_env_filter(EnvFilter::new("error")).init();
        error!("Failed to load configuration: {}", err);
        std::process::exit(1);
    });

    if cli.check_config {
        println!("{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Notification service starting up...");
    log_config_summary(&config);

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = cancel_on_signal(tokio::signal::ctrl_c(), signal_token).await {
            error!("Failed to listen for shutdown signal: {}", e);
            std::process::exit(1);
        }
    });

    let app = match App::builder(config).build(shutdown).await {
        Ok(app) => app,
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run().await {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("Shutdown complete.");
    Ok(())
}

fn log_config_summary(config: &Config) {
    let config = config.redacted();
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Redis URL: {}", config.redis.url);
    info!("Channel: {}", config.redis.channel);
    info!("Database URL: {}", config.database.url);
    info!("Max Attempts: {}", config.delivery.max_attempts);
    info!("Retry Delay: {}ms", config.delivery.retry_delay_ms);
    info!("Request Timeout: {}s", config.delivery.request_timeout_secs);
    info!(
        "Max Concurrent Deliveries: {}",
        config.delivery.max_concurrent_deliveries
    );
    if config.metrics.enabled {
        info!("Metrics: {}", config.metrics.listen_address);
    } else {
        info!("Metrics: Disabled");
    }
    info!("-------------------------------------------------------");
}

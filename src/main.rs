//! Bullet - webhook relay with source- and label-based routing.

use anyhow::Result;
use bullet::{
    app::{shutdown_on_signal, App},
    cli::Cli,
    config::Config,
};
use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration by layering sources: defaults, file, environment, and CLI args.
    let config = match Config::load(&cli) {
        Ok(config) => config,
        Err(err) => {
            tracing_subscriber::fmt().init();
            error!("Failed to load configuration: {}", err);
            std::process::exit(1);
        }
    };

    // RUST_LOG wins over the configured level.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Bullet starting up...");
    info!("-------------------- Configuration --------------------");
    info!("Log Level: {}", config.log_level);
    info!("Listen Address: {}:{}", config.server.host, config.server.port);
    info!("Routes Config: {}", config.routes_config.display());
    info!("Timezone: {}", config.timezone);
    info!("Delivery Timeout: {}s", config.delivery.timeout_seconds);
    info!("Fan-out: {}", config.delivery.fan_out);
    info!(
        "Resend Defaults: {}",
        if config.resend.api_key.is_empty() {
            "Not configured"
        } else {
            "Configured"
        }
    );
    if config.metrics.enabled {
        info!("Metrics: Enabled ({})", config.metrics.listen_address);
    } else {
        info!("Metrics: Disabled");
    }
    info!("-------------------------------------------------------");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let app = App::builder(config).build(shutdown_rx).await?;

    tokio::spawn(shutdown_on_signal(tokio::signal::ctrl_c(), shutdown_tx));

    app.run().await
}

//! CDN server - content-addressed file delivery
//!
//! Registers with service discovery, connects the durable store and the
//! optional cache, and serves content until SIGINT or SIGTERM.

use cdn_server::{App, Config, Result};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env().add_directive("cdn_server=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting CDN server...");

    let config = Config::from_env()?;
    info!("Port: {}", config.http.port);
    info!("Service: {} ({})", config.discovery.service_name, config.discovery.service_id);
    info!(
        "Insert: {}, delete: {}",
        config.http.allow_insert, config.http.allow_delete
    );
    if config.rate_limit.enabled {
        info!(
            "Rate limit: {} req/s, slack {}",
            config.rate_limit.rate, config.rate_limit.slack
        );
    }

    let app = App::start(config).await?;
    app.run().await
}

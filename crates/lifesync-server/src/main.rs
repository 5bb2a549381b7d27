//! # Lifesync
//!
//! Realtime life counter server.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! lifesync
//!
//! # Run with environment variables
//! LIFESYNC_PORT=8080 LIFESYNC_HOST=0.0.0.0 LIFESYNC_ROOMS__DEFAULT_LIFE=20 lifesync
//! ```

use anyhow::Result;
use lifesync_server::{config::Config, handlers, metrics};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lifesync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;

    tracing::info!("Starting Lifesync server on {}:{}", config.host, config.port);

    metrics::init_metrics();

    handlers::run_server(config).await?;

    Ok(())
}

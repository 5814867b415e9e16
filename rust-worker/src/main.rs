//! Relay Worker - async RabbitMQ consumer that turns queued messages into
//! HTTP POST requests.
//!
//! Successful and permanently failed requests are acknowledged; transient
//! failures are rejected into the wait queue and come back after the retry
//! delay until their TTL runs out.

mod consumer;

use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use relay::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    tracing::info!("worker_starting");

    // Load configuration from environment
    let config = Config::from_env();
    tracing::info!(
        amqp_url_set = !config.amqp_url.is_empty(),
        queue = %config.queue_name,
        wait_queue = %config.wait_queue_name,
        concurrency = config.worker_concurrency,
        request_timeout_secs = config.request_timeout_secs,
        retry_delay_secs = config.retry_delay_secs,
        default_ttl_secs = config.default_ttl_secs,
        "config_loaded"
    );

    consumer::run(config).await?;

    Ok(())
}

//! Main queue / wait queue declaration.
//!
//! Retries are driven entirely by RabbitMQ. A rejected message dead-letters
//! from the main queue into the wait queue, sits there for the retry delay,
//! then dead-letters back into the main queue. Every hop is recorded in the
//! `x-death` header, which the parser reads back as the retry count.

use anyhow::{Context, Result};
use lapin::{
    options::QueueDeclareOptions,
    types::{AMQPValue, FieldTable, LongString, ShortString},
    Channel,
};
use tracing::info;

use crate::config::Config;

/// Arguments for the main queue: dead-letter into the wait queue.
pub fn main_queue_args(wait_queue: &str) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from("")),
    );
    args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(wait_queue)),
    );
    args
}

/// Arguments for the wait queue: hold for the retry delay, then dead-letter
/// back into the main queue.
pub fn wait_queue_args(main_queue: &str, retry_delay_secs: u64) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        ShortString::from("x-dead-letter-exchange"),
        AMQPValue::LongString(LongString::from("")),
    );
    args.insert(
        ShortString::from("x-dead-letter-routing-key"),
        AMQPValue::LongString(LongString::from(main_queue)),
    );
    let ttl_ms = i64::try_from(retry_delay_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    args.insert(
        ShortString::from("x-message-ttl"),
        AMQPValue::LongLongInt(ttl_ms),
    );
    args
}

/// Declare both queues (idempotent as long as the arguments match).
pub async fn declare_topology(channel: &Channel, config: &Config) -> Result<()> {
    channel
        .queue_declare(
            &config.queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            main_queue_args(&config.wait_queue_name),
        )
        .await
        .context("Failed to declare main queue")?;

    channel
        .queue_declare(
            &config.wait_queue_name,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            wait_queue_args(&config.queue_name, config.retry_delay_secs),
        )
        .await
        .context("Failed to declare wait queue")?;

    info!(
        queue = %config.queue_name,
        wait_queue = %config.wait_queue_name,
        retry_delay_secs = config.retry_delay_secs,
        "rabbitmq_queues_declared"
    );

    Ok(())
}

//! RabbitMQ consumer module using lapin.
//!
//! This module handles connecting to RabbitMQ, consuming messages from the
//! main queue, spawning one dispatch task per message, and settling each
//! delivery once its outcome comes back on the outcome stream.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicQosOptions,
        BasicRejectOptions,
    },
    types::FieldTable,
    Channel, Connection, ConnectionProperties,
};
use tokio::signal;
use tracing::{error, info, warn};

use relay::{
    ack::{decide, AckAction},
    declare_topology, outcome_channel, parse,
    util::unix_now,
    Config, Dispatcher, Disposition, Envelope, OutcomeSink, OutcomeStream,
};

const CONSUMER_TAG: &str = "relay-worker";

/// Run the RabbitMQ consumer.
///
/// This function:
/// 1. Connects to RabbitMQ using the configured URL
/// 2. Sets up QoS so at most `worker_concurrency` messages are in flight
/// 3. Declares the main / wait queue pair (idempotent operation)
/// 4. Starts the acknowledgement loop on the outcome stream
/// 5. Starts consuming messages, spawning a dispatch task for each
/// 6. Handles graceful shutdown on SIGINT/SIGTERM
pub async fn run(config: Config) -> Result<()> {
    let config = Arc::new(config);

    // Connect to RabbitMQ
    info!(url_length = config.amqp_url.len(), "rabbitmq_connecting");

    let conn = Connection::connect(&config.amqp_url, ConnectionProperties::default())
        .await
        .context("Failed to connect to RabbitMQ")?;

    info!("rabbitmq_connected");

    let channel = conn.create_channel().await.context("Failed to create channel")?;

    info!("rabbitmq_channel_created");

    // The prefetch count is the only bound on concurrent dispatches
    let prefetch_count = u16::try_from(config.worker_concurrency).unwrap_or(u16::MAX);
    channel
        .basic_qos(prefetch_count, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    info!(prefetch_count = prefetch_count, "rabbitmq_qos_set");

    declare_topology(&channel, &config).await?;

    let dispatcher =
        Dispatcher::new(config.request_timeout()).context("Failed to create HTTP client")?;

    let channel = Arc::new(channel);

    // Settle deliveries as their outcomes arrive
    let (sink, stream) = outcome_channel(config.worker_concurrency);
    let settler = tokio::spawn(settle_outcomes(
        Arc::clone(&channel),
        stream,
        config.default_ttl(),
    ));

    let mut consumer = channel
        .basic_consume(
            &config.queue_name,
            CONSUMER_TAG,
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(queue = %config.queue_name, "rabbitmq_consumer_started");
    info!("worker_ready");

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    // Process messages until shutdown
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("worker_stopping");
                break;
            }
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let envelope = Envelope::from_delivery(&delivery);

                        info!(
                            queue = %config.queue_name,
                            delivery_tag = envelope.delivery_tag,
                            redelivered = delivery.redelivered,
                            body_length = envelope.body.len(),
                            "rabbitmq_message_received"
                        );

                        let dispatcher = dispatcher.clone();
                        let sink = sink.clone();
                        let channel = Arc::clone(&channel);

                        tokio::spawn(async move {
                            handle_envelope(envelope, &dispatcher, &sink, &channel).await;
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = channel
        .basic_cancel(CONSUMER_TAG, BasicCancelOptions::default())
        .await
    {
        warn!(error = %e, "rabbitmq_consumer_cancel_failed");
    }

    // In-flight tasks hold their own sinks; the settler drains until the last
    // one finishes.
    drop(sink);
    if let Err(e) = settler.await {
        error!(error = %e, "outcome_settler_failed");
    }

    info!("worker_shutdown_complete");
    Ok(())
}

/// Parse one envelope and dispatch it.
///
/// A message that fails to parse is acknowledged right away: redelivering
/// the same bytes cannot make it valid.
async fn handle_envelope(
    envelope: Envelope,
    dispatcher: &Dispatcher,
    sink: &OutcomeSink,
    channel: &Channel,
) {
    match parse(&envelope) {
        Ok(descriptor) => dispatcher.dispatch(descriptor, sink).await,
        Err(e) => {
            error!(
                delivery_tag = envelope.delivery_tag,
                body_length = envelope.body.len(),
                error = %e,
                "message_parse_failed"
            );

            if let Err(ack_err) = channel
                .basic_ack(envelope.delivery_tag, BasicAckOptions::default())
                .await
            {
                error!(
                    delivery_tag = envelope.delivery_tag,
                    error = %ack_err,
                    "rabbitmq_ack_failed"
                );
            }
        }
    }
}

/// Drain the outcome stream, acknowledging or rejecting each delivery.
async fn settle_outcomes(channel: Arc<Channel>, mut stream: OutcomeStream, default_ttl: Duration) {
    while let Some(descriptor) = stream.recv().await {
        let action = decide(&descriptor, default_ttl, unix_now());
        let delivery_tag = descriptor.delivery_tag;

        match descriptor.disposition() {
            Some(Disposition::Accepted) => info!(
                message_id = %descriptor.message_id,
                retry_count = descriptor.retry_count,
                "relay_message_delivered"
            ),
            Some(Disposition::Dropped(err)) => warn!(
                message_id = %descriptor.message_id,
                retry_count = descriptor.retry_count,
                error = %err,
                "relay_message_dropped"
            ),
            Some(Disposition::RetryEligible(err)) => warn!(
                message_id = %descriptor.message_id,
                retry_count = descriptor.retry_count,
                first_rejected_at = descriptor.first_rejected_at,
                error = %err,
                expired = action == AckAction::Expire,
                "relay_message_failed"
            ),
            None => error!(message_id = %descriptor.message_id, "relay_message_without_outcome"),
        }

        let result = match action {
            AckAction::Ack | AckAction::Expire => {
                channel
                    .basic_ack(delivery_tag, BasicAckOptions::default())
                    .await
            }
            AckAction::Retry => {
                channel
                    .basic_reject(
                        delivery_tag,
                        BasicRejectOptions {
                            requeue: false,
                            ..Default::default()
                        },
                    )
                    .await
            }
        };

        match result {
            Ok(()) => info!(
                message_id = %descriptor.message_id,
                delivery_tag = delivery_tag,
                action = action.as_str(),
                "rabbitmq_message_settled"
            ),
            Err(e) => error!(
                message_id = %descriptor.message_id,
                delivery_tag = delivery_tag,
                action = action.as_str(),
                error = %e,
                "rabbitmq_settle_failed"
            ),
        }
    }

    info!("outcome_stream_drained");
}

/// Resolve once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

//! fire-worker: consumes fired timers from SQS.
//!
//! For every fired timer it deletes the timer, refills the area's timer group
//! when it drained, and posts the event to the area's webhook subscribers.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use shedwatch_core::config::{load_dotenv, Config};
use shedwatch_notify::{
    DeliveryLog, DeliveryLogWriter, DynamoDeliveryLog, DynamoSubscriberDirectory,
    NotificationDispatcher, ReqwestWebhookSender, StaticSubscriberDirectory, SubscriberDirectory,
    TracingDeliveryLog,
};
use shedwatch_queue::{FiredBatchProcessor, QueueConsumer, SqsConsumer};
use shedwatch_scheduler::{EventBridgeTimerRegistry, FireHandler, HttpEventSource, Ingestor};

// ── CLI ─────────────────────────────────────────────────────────────

/// Fire worker: handles elapsed outage timers.
#[derive(Parser, Debug)]
#[command(name = "fire-worker", version, about)]
struct Cli {
    /// Messages to request per poll (SQS caps this at 10).
    #[arg(long, env = "FIRED_MAX_MESSAGES")]
    max_messages: Option<u32>,

    /// JSON subscriber file; overrides the DynamoDB directory.
    #[arg(long, env = "SUBSCRIBERS_FILE")]
    subscribers_file: Option<String>,
}

// ── main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    load_dotenv();
    let cli = Cli::parse();
    let config = Config::from_env();
    info!(profile = config.profile_label(), "loaded config");

    // Timer side: fire handler with the ingestor as its refill path.
    let registry = Arc::new(
        EventBridgeTimerRegistry::new(&config.aws, &config.scheduler)
            .await
            .context("initializing EventBridge timer registry")?,
    );
    let source = Arc::new(
        HttpEventSource::from_config(&config.source).context("initializing event source")?,
    );
    let ingestor = Arc::new(Ingestor::new(source, registry.clone()));
    let fire = Arc::new(FireHandler::new(registry, ingestor));

    // Notification side.
    let subscribers_file = cli
        .subscribers_file
        .or_else(|| config.storage.subscribers_file.clone());
    let directory: Arc<dyn SubscriberDirectory> = match subscribers_file {
        Some(path) => Arc::new(StaticSubscriberDirectory::from_file(&path)?),
        None => Arc::new(
            DynamoSubscriberDirectory::from_config(&config.aws, &config.storage)
                .await
                .context("initializing subscriber directory")?,
        ),
    };
    let log: Arc<dyn DeliveryLog> = if config.storage.logs_table.is_some() {
        Arc::new(DynamoDeliveryLog::from_config(&config.aws, &config.storage).await?)
    } else {
        warn!("LOGS_TABLE not set: delivery records go to the log only");
        Arc::new(TracingDeliveryLog)
    };
    let writer = Arc::new(DeliveryLogWriter::spawn(log, config.notify.delivery_log_buffer));
    let sender = Arc::new(ReqwestWebhookSender::from_config(&config.notify)?);
    let dispatcher = Arc::new(NotificationDispatcher::new(directory, sender, writer.clone()));

    let processor =
        FiredBatchProcessor::new(fire, dispatcher).with_max_receives(config.queue.max_receives);
    let consumer = SqsConsumer::new(&config.aws, &config.queue)
        .await
        .context("initializing SQS consumer")?;

    match consumer.health_check().await {
        Ok(health) => info!(%health, "fired-timer queue reachable"),
        Err(e) => warn!(error = %e, "fired-timer queue health check failed"),
    }
    if let Ok(Some(depth)) = consumer.dlq_depth().await {
        if depth > 0 {
            warn!(depth, "dead-letter queue has messages");
        }
    }

    let max_messages = cli.max_messages.unwrap_or(config.queue.max_messages);
    let poll_interval = Duration::from_millis(config.queue.poll_interval_ms);
    info!(
        max_messages,
        poll_interval_ms = config.queue.poll_interval_ms,
        max_receives = config.queue.max_receives,
        "fire-worker started"
    );

    loop {
        tokio::select! {
            polled = consumer.poll_batch(max_messages) => match polled {
                Ok(messages) if !messages.is_empty() => {
                    processor.process(&messages, &consumer).await;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "SQS poll error, retrying in {:?}", poll_interval);
                    tokio::time::sleep(poll_interval).await;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
        }
    }

    writer.close().await;
    info!("fire-worker exited cleanly");
    Ok(())
}

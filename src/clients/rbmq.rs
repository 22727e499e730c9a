use anyhow::{Error, Result, anyhow};
use futures_util::StreamExt;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer,
    message::Delivery,
    options::{
        BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions,
    },
    types::FieldTable,
};
use tracing::{debug, info};

use crate::{config::Config, models::message::StatusMessage};

/// Broker connection shared by the worker pool: declares both durable queues,
/// hands out per-worker consumers, and carries the status publish side.
pub struct RabbitMqClient {
    connection: Connection,
    publish_channel: Channel,
    email_queue_name: String,
    status_queue_name: String,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to RabbitMQ");

        let connection = Connection::connect(&config.rabbitmq_url, ConnectionProperties::default())
            .await
            .map_err(|e| anyhow!("Failed to connect to RabbitMQ: {e}"))?;

        info!("RabbitMQ connection established");

        let publish_channel = connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("RabbitMQ channel creation failed: {e}"))?;

        publish_channel
            .queue_declare(
                &config.email_queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare email queue: {e}"))?;

        publish_channel
            .queue_declare(
                &config.status_queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to declare status queue: {e}"))?;

        info!(
            email_queue = %config.email_queue_name,
            status_queue = %config.status_queue_name,
            "Queues declared"
        );

        Ok(Self {
            connection,
            publish_channel,
            email_queue_name: config.email_queue_name.clone(),
            status_queue_name: config.status_queue_name.clone(),
        })
    }

    /// Opens a dedicated channel with a prefetch window of one message, so a
    /// worker holds at most one unacknowledged delivery at a time.
    pub async fn create_consumer(&self, consumer_tag: &str) -> Result<QueueConsumer, Error> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| anyhow!("Failed to create consumer channel: {e}"))?;

        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| anyhow!("Failed to set up QoS: {e}"))?;

        let consumer = channel
            .basic_consume(
                &self.email_queue_name,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| anyhow!("Failed to create consumer: {e}"))?;

        debug!(consumer_tag, "Consumer created for email queue");

        Ok(QueueConsumer {
            _channel: channel,
            consumer,
        })
    }

    /// Publishes a terminal status event with persistent delivery mode.
    pub async fn publish_status(&self, status: &StatusMessage) -> Result<(), Error> {
        let payload = serde_json::to_vec(status)?;

        self.publish_channel
            .basic_publish(
                "",
                &self.status_queue_name,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2),
            )
            .await
            .map_err(|e| anyhow!("Failed to publish status message: {e}"))?;

        info!(
            notification_id = %status.notification_id,
            status = %status.status,
            "Status published"
        );

        Ok(())
    }

    pub async fn close(&self) -> Result<(), Error> {
        self.connection
            .close(200, "shutdown")
            .await
            .map_err(|e| anyhow!("Failed to close RabbitMQ connection: {e}"))?;

        Ok(())
    }
}

/// A worker's delivery stream. Holding the channel keeps the consumer alive.
pub struct QueueConsumer {
    _channel: Channel,
    consumer: Consumer,
}

impl QueueConsumer {
    pub async fn next(&mut self) -> Option<Result<Delivery, lapin::Error>> {
        self.consumer.next().await
    }
}

use std::sync::Arc;

use anyhow::{Error, Result, anyhow};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicRejectOptions},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    clients::{
        circuit_breaker::CircuitBreaker,
        provider::EmailProvider,
        rbmq::{QueueConsumer, RabbitMqClient},
        redis::RedisClient,
        template::TemplateSource,
    },
    error::DeliveryError,
    models::{
        message::{EmailMessage, StatusMessage},
        status::DeliveryStatus,
    },
    renderer,
    retry::RetryController,
};

/// Worker pool draining the email queue.
///
/// Built bottom-up over the broker client, the idempotency store, the
/// template source, the provider behind its breaker, and the retry policy.
/// Each worker owns a prefetch-1 consumer; the pool is the only source of
/// concurrency.
pub struct Dispatcher {
    config: DispatcherConfig,
}

/// Everything the dispatcher orchestrates, wired once at startup.
pub struct DispatcherConfig {
    pub rabbitmq: Arc<RabbitMqClient>,
    pub redis: Arc<RedisClient>,
    pub templates: Arc<dyn TemplateSource>,
    pub provider: Arc<dyn EmailProvider>,
    pub breaker: Arc<CircuitBreaker>,
    pub retry: RetryController,
    pub worker_count: usize,
    pub shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig) -> Self {
        Self { config }
    }

    /// Runs the pool until cancellation or a broker transport failure, which
    /// is surfaced rather than silently reconnected.
    pub async fn run(&self) -> Result<(), Error> {
        let config = &self.config;
        let mut handles = Vec::with_capacity(config.worker_count);

        for worker_id in 0..config.worker_count {
            let consumer = config
                .rabbitmq
                .create_consumer(&format!("email_worker_{worker_id}"))
                .await?;

            let worker = Worker {
                worker_id,
                rabbitmq: Arc::clone(&config.rabbitmq),
                redis: Arc::clone(&config.redis),
                templates: Arc::clone(&config.templates),
                provider: Arc::clone(&config.provider),
                breaker: Arc::clone(&config.breaker),
                retry: config.retry.clone(),
                shutdown: config.shutdown.clone(),
            };

            handles.push(tokio::spawn(worker.run(consumer)));
        }

        info!(workers = config.worker_count, "Worker pool started");

        let results = futures_util::future::join_all(handles).await;
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(anyhow!("worker task panicked: {e}")),
            }
        }

        Ok(())
    }
}

struct Worker {
    worker_id: usize,
    rabbitmq: Arc<RabbitMqClient>,
    redis: Arc<RedisClient>,
    templates: Arc<dyn TemplateSource>,
    provider: Arc<dyn EmailProvider>,
    breaker: Arc<CircuitBreaker>,
    retry: RetryController,
    shutdown: CancellationToken,
}

impl Worker {
    async fn run(self, mut consumer: QueueConsumer) -> Result<(), Error> {
        info!(worker_id = self.worker_id, "Worker started");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!(worker_id = self.worker_id, "Worker stopping");
                    return Ok(());
                }
                delivery = consumer.next() => {
                    match delivery {
                        Some(Ok(delivery)) => self.process_delivery(delivery).await,
                        Some(Err(e)) => {
                            return Err(anyhow!("consumer stream failed: {e}"));
                        }
                        None => {
                            info!(worker_id = self.worker_id, "Delivery stream closed");
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    async fn process_delivery(&self, delivery: Delivery) {
        let message = match serde_json::from_slice::<EmailMessage>(&delivery.data) {
            Ok(message) => message,
            Err(e) => {
                error!(worker_id = self.worker_id, error = %e, "Failed to decode message, discarding");
                self.reject(&delivery).await;
                return;
            }
        };

        info!(
            notification_id = %message.id,
            correlation_id = %message.correlation_id,
            recipient = %message.recipient,
            template_id = %message.template_id,
            "Processing email"
        );

        // The gate fails open: a store outage never blocks delivery.
        match self.redis.was_processed(&message.id).await {
            Ok(true) => {
                info!(notification_id = %message.id, "Message already processed, skipping");
                self.acknowledge(&delivery).await;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                error!(notification_id = %message.id, error = %e, "Failed to check idempotency");
            }
        }

        let outcome = deliver_with_retry(
            &message,
            self.templates.as_ref(),
            self.provider.as_ref(),
            &self.breaker,
            &self.retry,
            &self.shutdown,
        )
        .await;

        match outcome {
            Ok(()) => {
                // Fingerprint only after the status publication has been attempted.
                self.publish_status(&message, DeliveryStatus::Sent, None).await;

                if let Err(e) = self.redis.mark_processed(&message.id).await {
                    error!(notification_id = %message.id, error = %e, "Failed to mark as processed");
                }

                self.acknowledge(&delivery).await;

                info!(
                    notification_id = %message.id,
                    recipient = %message.recipient,
                    "Email sent successfully"
                );
            }
            Err(DeliveryError::Canceled) => {
                // Left unacknowledged; the broker redelivers after restart.
                warn!(notification_id = %message.id, "Delivery canceled mid-flight");
            }
            Err(e) => {
                error!(
                    notification_id = %message.id,
                    error = %e,
                    "Failed to process email after retries"
                );

                self.publish_status(&message, DeliveryStatus::Failed, Some(e.to_string()))
                    .await;
                self.reject(&delivery).await;
            }
        }
    }

    async fn publish_status(
        &self,
        message: &EmailMessage,
        status: DeliveryStatus,
        error: Option<String>,
    ) {
        let status_message = StatusMessage::new(
            &message.id,
            &message.correlation_id,
            status,
            self.provider.provider_name(),
            error,
        );

        // Publish failures never change the acknowledgment decision.
        if let Err(e) = self.rabbitmq.publish_status(&status_message).await {
            error!(notification_id = %message.id, error = %e, "Failed to publish status");
        }
    }

    async fn acknowledge(&self, delivery: &Delivery) {
        if let Err(e) = delivery.acker.ack(BasicAckOptions::default()).await {
            error!(worker_id = self.worker_id, error = %e, "Failed to acknowledge message");
        }
    }

    async fn reject(&self, delivery: &Delivery) {
        let options = BasicRejectOptions { requeue: false };
        if let Err(e) = delivery.acker.reject(options).await {
            error!(worker_id = self.worker_id, error = %e, "Failed to reject message");
        }
    }
}

/// Runs the resolve-render-send sequence until it succeeds, the error is
/// classified permanent, or attempts are exhausted. Backoff sleeps observe
/// the cancellation token.
pub async fn deliver_with_retry(
    message: &EmailMessage,
    templates: &dyn TemplateSource,
    provider: &dyn EmailProvider,
    breaker: &CircuitBreaker,
    retry: &RetryController,
    shutdown: &CancellationToken,
) -> Result<(), DeliveryError> {
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            let backoff = retry.backoff(attempt - 1);
            info!(
                attempt,
                backoff_secs = backoff.as_secs(),
                correlation_id = %message.correlation_id,
                "Retry backoff"
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Err(DeliveryError::Canceled),
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        match attempt_delivery(message, templates, provider, breaker).await {
            Ok(()) => return Ok(()),
            Err(error) => {
                if !retry.should_retry(&error, attempt) {
                    warn!(
                        attempt,
                        error = %error,
                        correlation_id = %message.correlation_id,
                        "Not retrying"
                    );
                    return Err(error);
                }

                warn!(
                    attempt,
                    error = %error,
                    correlation_id = %message.correlation_id,
                    "Retrying after error"
                );
            }
        }

        attempt += 1;
    }
}

async fn attempt_delivery(
    message: &EmailMessage,
    templates: &dyn TemplateSource,
    provider: &dyn EmailProvider,
    breaker: &CircuitBreaker,
) -> Result<(), DeliveryError> {
    let template = templates.fetch_template(&message.template_id).await?;

    let subject = renderer::render(&template.subject, &message.variables)?;
    let body = renderer::render(&template.body, &message.variables)?;

    breaker
        .call(|| provider.send(&message.recipient, &subject, &body))
        .await
}

use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use email_service::{
    api::run_api_server,
    clients::{
        circuit_breaker::CircuitBreaker, provider::build_provider, rbmq::RabbitMqClient,
        redis::RedisClient, template::TemplateServiceClient,
    },
    config::Config,
    retry::RetryController,
    worker::{Dispatcher, DispatcherConfig},
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting email service");

    let redis = Arc::new(RedisClient::connect(&config).await?);
    let rabbitmq = Arc::new(RabbitMqClient::connect(&config).await?);
    let provider = build_provider(&config)?;
    let templates = Arc::new(TemplateServiceClient::new(&config, Arc::clone(&redis))?);
    let breaker = Arc::new(CircuitBreaker::new(
        "email-provider",
        Duration::from_secs(config.circuit_breaker_timeout_seconds),
    ));
    let retry = RetryController::new(
        config.max_retry_attempts,
        config.retry_backoff_base_seconds,
    );

    let shutdown = CancellationToken::new();

    let dispatcher = Dispatcher::new(DispatcherConfig {
        rabbitmq: Arc::clone(&rabbitmq),
        redis: Arc::clone(&redis),
        templates,
        provider,
        breaker: Arc::clone(&breaker),
        retry,
        worker_count: config.worker_count,
        shutdown: shutdown.clone(),
    });

    let mut dispatcher_handle = tokio::spawn(async move { dispatcher.run().await });

    let api_handle = tokio::spawn(run_api_server(
        config.clone(),
        Arc::clone(&breaker),
        shutdown.clone(),
    ));

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
            shutdown.cancel();

            let drain = Duration::from_secs(config.shutdown_timeout_seconds);
            match tokio::time::timeout(drain, &mut dispatcher_handle).await {
                Ok(Ok(Ok(()))) => info!("Worker pool drained"),
                Ok(Ok(Err(e))) => error!(error = %e, "Worker pool exited with error"),
                Ok(Err(e)) => error!(error = %e, "Worker pool task failed"),
                Err(_) => {
                    warn!("Workers did not stop within the shutdown window, aborting");
                    dispatcher_handle.abort();
                }
            }
        }
        result = &mut dispatcher_handle => {
            // A broker transport failure ends the pool; surface it and stop.
            shutdown.cancel();
            match result {
                Ok(Ok(())) => info!("Worker pool stopped"),
                Ok(Err(e)) => error!(error = %e, "Worker pool exited with error"),
                Err(e) => error!(error = %e, "Worker pool task failed"),
            }
        }
    }

    let _ = api_handle.await;

    if let Err(e) = rabbitmq.close().await {
        warn!(error = %e, "Failed to close RabbitMQ connection");
    }

    info!("Email service stopped");

    Ok(())
}

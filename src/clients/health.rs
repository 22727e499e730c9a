use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{circuit_breaker::CircuitBreaker, rbmq::RabbitMqClient},
    config::Config,
    models::{
        circuit_breaker::CircuitState,
        health::{HealthCheckResponse, HealthStatus, ServiceHealth},
    },
};

pub struct HealthChecker {
    config: Config,
    breaker: Arc<CircuitBreaker>,
}

impl HealthChecker {
    pub fn new(config: Config, breaker: Arc<CircuitBreaker>) -> Self {
        Self { config, breaker }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("cache_service".to_string(), self.check_redis().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq().await);
        checks.insert("email_provider".to_string(), self.check_provider_breaker());

        let status = overall_status(&checks);

        HealthCheckResponse {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    async fn check_redis(&self) -> ServiceHealth {
        let start = Instant::now();

        match redis::Client::open(self.config.redis_url.as_str()) {
            Ok(client) => match client.get_multiplexed_async_connection().await {
                Ok(mut connection) => match redis::cmd("PING")
                    .query_async::<String>(&mut connection)
                    .await
                {
                    Ok(_) => {
                        let elapsed = start.elapsed().as_millis() as u64;
                        debug!(response_time_ms = elapsed, "Redis health check passed");
                        ServiceHealth::healthy(elapsed)
                    }
                    Err(e) => {
                        warn!(error = %e, "Redis ping failed");
                        ServiceHealth::unhealthy(format!("Ping failed: {e}"))
                    }
                },
                Err(e) => {
                    warn!(error = %e, "Redis connection failed");
                    ServiceHealth::unhealthy(format!("Connection failed: {e}"))
                }
            },
            Err(e) => {
                warn!(error = %e, "Redis client creation failed");
                ServiceHealth::unhealthy(format!("Client creation failed: {e}"))
            }
        }
    }

    async fn check_rabbitmq(&self) -> ServiceHealth {
        let start = Instant::now();

        match RabbitMqClient::connect(&self.config).await {
            Ok(client) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "RabbitMQ health check passed");
                let _ = client.close().await;
                ServiceHealth::healthy(elapsed)
            }
            Err(e) => {
                warn!(error = %e, "RabbitMQ connection failed");
                ServiceHealth::unhealthy(format!("Connection failed: {e}"))
            }
        }
    }

    fn check_provider_breaker(&self) -> ServiceHealth {
        let state = self.breaker.state();
        let state_str = state.as_str().to_string();

        match state {
            CircuitState::Closed => ServiceHealth::healthy(0).with_circuit_breaker(state_str),
            CircuitState::HalfOpen => ServiceHealth::degraded(
                state_str,
                Some("Circuit breaker in recovery mode".to_string()),
            ),
            CircuitState::Open => ServiceHealth::degraded(state_str, None),
        }
    }
}

fn overall_status(checks: &HashMap<String, ServiceHealth>) -> HealthStatus {
    let has_unhealthy = checks
        .values()
        .any(|health| health.status == HealthStatus::Unhealthy);

    let has_degraded = checks
        .values()
        .any(|health| health.status == HealthStatus::Degraded);

    if has_unhealthy {
        HealthStatus::Unhealthy
    } else if has_degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

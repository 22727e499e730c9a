use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    pub rabbitmq_url: String,

    #[serde(default = "default_email_queue_name")]
    pub email_queue_name: String,

    #[serde(default = "default_status_queue_name")]
    pub status_queue_name: String,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    pub redis_url: String,

    #[serde(default = "default_idempotency_ttl_seconds")]
    pub idempotency_ttl_seconds: u64,

    #[serde(default = "default_template_cache_ttl_seconds")]
    pub template_cache_ttl_seconds: u64,

    pub template_service_url: String,

    #[serde(default)]
    pub sendgrid_api_key: Option<String>,

    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub smtp_username: Option<String>,

    #[serde(default)]
    pub smtp_password: Option<String>,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    #[serde(default = "default_retry_backoff_base_seconds")]
    pub retry_backoff_base_seconds: u64,

    #[serde(default = "default_circuit_breaker_timeout_seconds")]
    pub circuit_breaker_timeout_seconds: u64,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_shutdown_timeout_seconds")]
    pub shutdown_timeout_seconds: u64,
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {e}"))?;
        Ok(config)
    }
}

fn default_email_queue_name() -> String {
    "email.queue".to_string()
}

fn default_status_queue_name() -> String {
    "notification.status.queue".to_string()
}

fn default_worker_count() -> usize {
    10
}

fn default_idempotency_ttl_seconds() -> u64 {
    86_400
}

fn default_template_cache_ttl_seconds() -> u64 {
    600
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_retry_backoff_base_seconds() -> u64 {
    1
}

fn default_circuit_breaker_timeout_seconds() -> u64 {
    30
}

fn default_server_port() -> u16 {
    8082
}

fn default_shutdown_timeout_seconds() -> u64 {
    30
}

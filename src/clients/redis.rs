use anyhow::{Error, Result, anyhow};
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::{debug, info};

use crate::{config::Config, models::template::EmailTemplate};

/// Keyed store backing the idempotency gate and the template cache.
pub struct RedisClient {
    connection: MultiplexedConnection,
    idempotency_ttl_seconds: u64,
    template_ttl_seconds: u64,
}

impl RedisClient {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| anyhow!("Failed to create redis client: {e}"))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {e}"))?;

        info!("Redis connection established");

        Ok(Self {
            connection,
            idempotency_ttl_seconds: config.idempotency_ttl_seconds,
            template_ttl_seconds: config.template_cache_ttl_seconds,
        })
    }

    /// Whether a prior worker already delivered this notification.
    pub async fn was_processed(&self, notification_id: &str) -> Result<bool, Error> {
        let key = format!("email:processed:{notification_id}");
        let mut connection = self.connection.clone();

        let exists: bool = connection
            .exists(&key)
            .await
            .map_err(|e| anyhow!("Failed to check idempotency key: {e}"))?;

        debug!(notification_id, exists, "Checked delivery fingerprint");

        Ok(exists)
    }

    /// Records the delivery fingerprint; expires after the idempotency TTL.
    pub async fn mark_processed(&self, notification_id: &str) -> Result<(), Error> {
        let key = format!("email:processed:{notification_id}");
        let mut connection = self.connection.clone();

        connection
            .set_ex::<_, _, ()>(&key, "1", self.idempotency_ttl_seconds)
            .await
            .map_err(|e| anyhow!("Failed to mark notification as processed: {e}"))?;

        debug!(notification_id, "Marked as processed");

        Ok(())
    }

    /// Cached template lookup. An entry that fails to decode counts as a miss.
    pub async fn get_cached_template(
        &self,
        template_key: &str,
    ) -> Result<Option<EmailTemplate>, Error> {
        let key = format!("template:{template_key}");
        let mut connection = self.connection.clone();

        let cached: Option<String> = connection
            .get(&key)
            .await
            .map_err(|e| anyhow!("Failed to read template cache: {e}"))?;

        match cached {
            None => Ok(None),
            Some(raw) => match serde_json::from_str::<EmailTemplate>(&raw) {
                Ok(template) => Ok(Some(template)),
                Err(e) => {
                    debug!(template_key, error = %e, "Discarding undecodable cache entry");
                    Ok(None)
                }
            },
        }
    }

    pub async fn cache_template(
        &self,
        template_key: &str,
        template: &EmailTemplate,
    ) -> Result<(), Error> {
        let key = format!("template:{template_key}");
        let payload = serde_json::to_string(template)?;
        let mut connection = self.connection.clone();

        connection
            .set_ex::<_, _, ()>(&key, payload, self.template_ttl_seconds)
            .await
            .map_err(|e| anyhow!("Failed to write template cache: {e}"))?;

        debug!(template_key, "Template cached");

        Ok(())
    }
}

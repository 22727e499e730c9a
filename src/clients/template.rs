use std::{sync::Arc, time::Duration};

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::{
    clients::redis::RedisClient,
    config::Config,
    error::DeliveryError,
    models::template::{EmailTemplate, TemplateResponse},
};

/// Resolves template records for the renderer.
#[async_trait]
pub trait TemplateSource: Send + Sync {
    async fn fetch_template(&self, template_key: &str) -> Result<EmailTemplate, DeliveryError>;
}

/// Catalog client with a read-through redis cache in front of the HTTP API.
pub struct TemplateServiceClient {
    http_client: Client,
    base_url: String,
    cache: Arc<RedisClient>,
}

impl TemplateServiceClient {
    pub fn new(config: &Config, cache: Arc<RedisClient>) -> Result<Self, Error> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {e}"))?;

        Ok(Self {
            http_client,
            base_url: config.template_service_url.clone(),
            cache,
        })
    }
}

#[async_trait]
impl TemplateSource for TemplateServiceClient {
    async fn fetch_template(&self, template_key: &str) -> Result<EmailTemplate, DeliveryError> {
        // Cache reads fail open: a store outage degrades to a catalog fetch.
        match self.cache.get_cached_template(template_key).await {
            Ok(Some(template)) => {
                debug!(template_key, "Template cache hit");
                return Ok(template);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(template_key, error = %e, "Template cache read failed, fetching from catalog");
            }
        }

        let url = format!(
            "{}/api/v1/templates/key/{}?language=en&version=latest",
            self.base_url, template_key
        );

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(|e| DeliveryError::TemplateFetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::TemplateFetch(format!(
                "template service returned status {status}"
            )));
        }

        let response: TemplateResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::TemplateFetch(format!("undecodable response: {e}")))?;

        if !response.success {
            return Err(DeliveryError::TemplateNotFound(template_key.to_string()));
        }

        let data = response.data.ok_or_else(|| {
            DeliveryError::TemplateFetch("response is missing the data section".to_string())
        })?;

        let template = EmailTemplate {
            subject: data.version.subject,
            body: data.version.body,
            variables: data.version.variables,
        };

        if let Err(e) = self.cache.cache_template(template_key, &template).await {
            warn!(template_key, error = %e, "Failed to cache template");
        }

        info!(template_key, "Template fetched from catalog");

        Ok(template)
    }
}

use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use tracing::info;

use crate::{
    clients::{sendgrid::SendGridProvider, smtp::SmtpProvider},
    config::Config,
    error::DeliveryError,
};

/// Uniform send capability over heterogeneous email backends.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;

    fn provider_name(&self) -> &'static str;
}

/// Selects the backend once at construction: an API key means SendGrid,
/// otherwise SMTP. Both constructors require their credentials.
pub fn build_provider(config: &Config) -> Result<Arc<dyn EmailProvider>, Error> {
    let has_api_key = config
        .sendgrid_api_key
        .as_deref()
        .is_some_and(|key| !key.is_empty());

    let provider: Arc<dyn EmailProvider> = if has_api_key {
        Arc::new(SendGridProvider::new(config)?)
    } else {
        Arc::new(SmtpProvider::new(config)?)
    };

    info!(provider = provider.provider_name(), "Email provider selected");

    Ok(provider)
}

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use tracing::debug;

use crate::{clients::provider::EmailProvider, config::Config, error::DeliveryError};

/// SMTP backend: authenticated STARTTLS relay sending HTML mail.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpProvider {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let username = config
            .smtp_username
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| anyhow!("SMTP username and password are required"))?;
        let password = config
            .smtp_password
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow!("SMTP username and password are required"))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| anyhow!("Failed to create SMTP transport: {e}"))?
            .port(config.smtp_port)
            .credentials(Credentials::new(username.clone(), password))
            .build();

        Ok(Self {
            transport,
            from_address: username,
        })
    }
}

#[async_trait]
impl EmailProvider for SmtpProvider {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let message = Message::builder()
            .from(self.from_address.parse().map_err(|_| {
                DeliveryError::Provider(format!("invalid email address: {}", self.from_address))
            })?)
            .to(recipient.parse().map_err(|_| {
                DeliveryError::Provider(format!("invalid email address: {recipient}"))
            })?)
            .subject(subject)
            .header(ContentType::TEXT_HTML)
            .body(body.to_string())
            .map_err(|e| DeliveryError::Provider(format!("failed to build message: {e}")))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| DeliveryError::Provider(format!("failed to send email via SMTP: {e}")))?;

        debug!(recipient, "Email sent via SMTP");

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "smtp"
    }
}

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::{
    clients::provider::EmailProvider,
    config::Config,
    error::DeliveryError,
    models::sendgrid::{EmailAddress, MailContent, MailSendRequest, Personalization},
};

const SENDGRID_SEND_URL: &str = "https://api.sendgrid.com/v3/mail/send";
const FROM_EMAIL: &str = "noreply@example.com";
const FROM_NAME: &str = "Notification System";

/// Transactional API backend: SendGrid v3 mail-send over HTTPS.
pub struct SendGridProvider {
    http_client: Client,
    api_key: String,
}

impl SendGridProvider {
    pub fn new(config: &Config) -> Result<Self, Error> {
        let api_key = config
            .sendgrid_api_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("SendGrid API key is required"))?;

        Ok(Self {
            http_client: Client::new(),
            api_key,
        })
    }
}

#[async_trait]
impl EmailProvider for SendGridProvider {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let payload = MailSendRequest {
            personalizations: vec![Personalization {
                to: vec![EmailAddress {
                    email: recipient.to_string(),
                    name: None,
                }],
            }],
            from: EmailAddress {
                email: FROM_EMAIL.to_string(),
                name: Some(FROM_NAME.to_string()),
            },
            subject: subject.to_string(),
            content: vec![MailContent {
                content_type: "text/html".to_string(),
                value: body.to_string(),
            }],
        };

        let response = self
            .http_client
            .post(SENDGRID_SEND_URL)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                DeliveryError::Provider(format!("failed to send email via SendGrid: {e}"))
            })?;

        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Provider(format!(
                "SendGrid error: status {}, body: {body}",
                status.as_u16()
            )));
        }

        debug!(recipient, "Email sent via SendGrid");

        Ok(())
    }

    fn provider_name(&self) -> &'static str {
        "sendgrid"
    }
}

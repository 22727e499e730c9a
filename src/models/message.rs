use std::collections::HashMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::models::status::DeliveryStatus;

/// A notification request consumed from the email queue.
///
/// `id` is the deduplication key and stays stable across redeliveries of the
/// same logical notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailMessage {
    pub id: String,
    pub correlation_id: String,
    pub recipient: String,
    pub template_id: String,
    pub variables: HashMap<String, serde_json::Value>,

    #[serde(default)]
    pub priority: String,

    #[serde(default)]
    pub retry_count: u32,

    #[serde(default)]
    pub scheduled_at: String,
}

/// Terminal outcome event published to the status queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusMessage {
    pub notification_id: String,
    pub correlation_id: String,
    pub status: DeliveryStatus,
    pub timestamp: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub provider: String,
}

impl StatusMessage {
    pub fn new(
        notification_id: &str,
        correlation_id: &str,
        status: DeliveryStatus,
        provider: &str,
        error: Option<String>,
    ) -> Self {
        Self {
            notification_id: notification_id.to_string(),
            correlation_id: correlation_id.to_string(),
            status,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            error,
            provider: provider.to_string(),
        }
    }
}

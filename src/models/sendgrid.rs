use serde::Serialize;

/// SendGrid v3 mail-send request body.
#[derive(Debug, Clone, Serialize)]
pub struct MailSendRequest {
    pub personalizations: Vec<Personalization>,
    pub from: EmailAddress,
    pub subject: String,
    pub content: Vec<MailContent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Personalization {
    pub to: Vec<EmailAddress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailAddress {
    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MailContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub value: String,
}

use serde::{Deserialize, Serialize};

/// Immutable template snapshot used for rendering; cached under a bounded TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub subject: String,
    pub body: String,

    #[serde(default)]
    pub variables: Vec<String>,
}

/// Response envelope of the template catalog service.
#[derive(Debug, Deserialize)]
pub struct TemplateResponse {
    pub success: bool,

    #[serde(default)]
    pub data: Option<TemplateData>,

    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TemplateData {
    pub version: TemplateVersion,
}

/// The currently-published version section of a catalog record.
#[derive(Debug, Deserialize)]
pub struct TemplateVersion {
    pub subject: String,
    pub body: String,

    #[serde(default)]
    pub variables: Vec<String>,
}

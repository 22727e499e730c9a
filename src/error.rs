use thiserror::Error;

/// Failure modes of a single delivery attempt.
///
/// Renderer and catalog-lookup failures carry their own variants so the retry
/// controller can classify them without inspecting message text.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("failed to fetch template: {0}")]
    TemplateFetch(String),

    #[error("missing required variables: {0:?}")]
    MissingVariables(Vec<String>),

    #[error("unsupported variable type for key '{0}'")]
    UnsupportedVariable(String),

    #[error("circuit breaker is open for {0}")]
    CircuitOpen(String),

    #[error("{0}")]
    Provider(String),

    #[error("delivery canceled")]
    Canceled,
}

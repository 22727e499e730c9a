use std::collections::HashMap;
use std::sync::{
    Mutex,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use async_trait::async_trait;
use email_service::{
    clients::{circuit_breaker::CircuitBreaker, provider::EmailProvider, template::TemplateSource},
    error::DeliveryError,
    models::{message::EmailMessage, template::EmailTemplate},
    retry::RetryController,
    worker::deliver_with_retry,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

struct StubTemplateSource {
    template: EmailTemplate,
    fetches: AtomicU32,
}

impl StubTemplateSource {
    fn new(subject: &str, body: &str) -> Self {
        Self {
            template: EmailTemplate {
                subject: subject.to_string(),
                body: body.to_string(),
                variables: Vec::new(),
            },
            fetches: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl TemplateSource for StubTemplateSource {
    async fn fetch_template(&self, _template_key: &str) -> Result<EmailTemplate, DeliveryError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.template.clone())
    }
}

struct MissingTemplateSource;

#[async_trait]
impl TemplateSource for MissingTemplateSource {
    async fn fetch_template(&self, template_key: &str) -> Result<EmailTemplate, DeliveryError> {
        Err(DeliveryError::TemplateNotFound(template_key.to_string()))
    }
}

struct MockProvider {
    calls: AtomicU32,
    fail_first: u32,
    error_message: String,
    last_send: Mutex<Option<(String, String, String)>>,
}

impl MockProvider {
    fn succeeding() -> Self {
        Self::failing_first(0, "")
    }

    fn failing_first(fail_first: u32, error_message: &str) -> Self {
        Self {
            calls: AtomicU32::new(0),
            fail_first,
            error_message: error_message.to_string(),
            last_send: Mutex::new(None),
        }
    }

    fn always_failing(error_message: &str) -> Self {
        Self::failing_first(u32::MAX, error_message)
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmailProvider for MockProvider {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst);

        *self.last_send.lock().unwrap() = Some((
            recipient.to_string(),
            subject.to_string(),
            body.to_string(),
        ));

        if attempt < self.fail_first {
            Err(DeliveryError::Provider(self.error_message.clone()))
        } else {
            Ok(())
        }
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

fn test_message(variables: HashMap<String, Value>) -> EmailMessage {
    EmailMessage {
        id: format!("n-{}", Uuid::new_v4()),
        correlation_id: format!("c-{}", Uuid::new_v4()),
        recipient: "a@b.com".to_string(),
        template_id: "welcome".to_string(),
        variables,
        priority: "normal".to_string(),
        retry_count: 0,
        scheduled_at: String::new(),
    }
}

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new("email-provider", Duration::from_secs(30))
}

/// Test: Happy path renders and delivers on the first attempt
#[tokio::test]
async fn test_happy_path_single_attempt() {
    let templates = StubTemplateSource::new("Hi {{name}}", "Hello {{name}}");
    let provider = MockProvider::succeeding();
    let breaker = breaker();
    let retry = RetryController::new(5, 1);
    let shutdown = CancellationToken::new();

    let message = test_message(HashMap::from([("name".to_string(), json!("Ada"))]));

    deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
        .await
        .expect("delivery should succeed");

    assert_eq!(provider.call_count(), 1);

    let sent = provider.last_send.lock().unwrap().clone().unwrap();
    assert_eq!(
        sent,
        (
            "a@b.com".to_string(),
            "Hi Ada".to_string(),
            "Hello Ada".to_string()
        )
    );
}

/// Test: Transient failures back off exponentially, then succeed
#[tokio::test(start_paused = true)]
async fn test_transient_failures_then_success() {
    let templates = StubTemplateSource::new("Hi {{name}}", "Hello {{name}}");
    let provider = MockProvider::failing_first(2, "temporary network");
    let breaker = breaker();
    let retry = RetryController::new(5, 1);
    let shutdown = CancellationToken::new();

    let message = test_message(HashMap::from([("name".to_string(), json!("Ada"))]));

    let start = tokio::time::Instant::now();
    deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
        .await
        .expect("third attempt should succeed");

    assert_eq!(provider.call_count(), 3);

    // Backoffs of 1s and 2s accumulate before the successful attempt.
    assert!(start.elapsed() >= Duration::from_secs(3));
}

/// Test: A permanent provider error is not retried
#[tokio::test]
async fn test_permanent_error_is_not_retried() {
    let templates = StubTemplateSource::new("Hi {{name}}", "Hello {{name}}");
    let provider = MockProvider::always_failing("invalid email address: a@b.com");
    let breaker = breaker();
    let retry = RetryController::new(5, 1);
    let shutdown = CancellationToken::new();

    let message = test_message(HashMap::from([("name".to_string(), json!("Ada"))]));

    let error =
        deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
            .await
            .unwrap_err();

    assert_eq!(provider.call_count(), 1);
    assert!(error.to_string().contains("invalid email"));
}

/// Test: A template with uncovered variables never reaches the provider
#[tokio::test]
async fn test_missing_variables_skip_provider() {
    let templates = StubTemplateSource::new("Hi {{name}}", "Hello {{name}}");
    let provider = MockProvider::succeeding();
    let breaker = breaker();
    let retry = RetryController::new(5, 1);
    let shutdown = CancellationToken::new();

    let message = test_message(HashMap::new());

    let error =
        deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
            .await
            .unwrap_err();

    assert_eq!(provider.call_count(), 0);
    assert_eq!(templates.fetches.load(Ordering::SeqCst), 1, "no retries");
    assert!(error.to_string().contains("missing required variables"));
}

/// Test: An unknown template is terminal without any provider call
#[tokio::test]
async fn test_template_not_found_is_terminal() {
    let templates = MissingTemplateSource;
    let provider = MockProvider::succeeding();
    let breaker = breaker();
    let retry = RetryController::new(5, 1);
    let shutdown = CancellationToken::new();

    let message = test_message(HashMap::new());

    let error =
        deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
            .await
            .unwrap_err();

    assert_eq!(provider.call_count(), 0);
    assert!(error.to_string().contains("template not found"));
}

/// Test: Exhausted retries surface the last transient error
#[tokio::test(start_paused = true)]
async fn test_exhausted_retries() {
    let templates = StubTemplateSource::new("Hi {{name}}", "Hello {{name}}");
    let provider = MockProvider::always_failing("service unavailable");
    // Zero cooldown keeps admitting probes so every attempt reaches the provider.
    let breaker = CircuitBreaker::new("email-provider", Duration::ZERO);
    let retry = RetryController::new(5, 1);
    let shutdown = CancellationToken::new();

    let message = test_message(HashMap::from([("name".to_string(), json!("Ada"))]));

    let error =
        deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
            .await
            .unwrap_err();

    // Five retries after the initial attempt.
    assert_eq!(provider.call_count(), 6);
    assert!(error.to_string().contains("service unavailable"));
}

/// Test: An open breaker fast-fails every attempt without provider calls
#[tokio::test(start_paused = true)]
async fn test_open_breaker_short_circuits_delivery() {
    let templates = StubTemplateSource::new("Hi {{name}}", "Hello {{name}}");
    let provider = MockProvider::succeeding();
    let breaker = breaker();
    let retry = RetryController::new(2, 1);
    let shutdown = CancellationToken::new();

    // Trip the breaker with three direct failures.
    for _ in 0..3 {
        let _ = breaker
            .call(|| async { Err::<(), _>(DeliveryError::Provider("boom".to_string())) })
            .await;
    }

    let message = test_message(HashMap::from([("name".to_string(), json!("Ada"))]));

    let error =
        deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
            .await
            .unwrap_err();

    assert_eq!(provider.call_count(), 0);
    assert!(matches!(error, DeliveryError::CircuitOpen(_)));
}

/// Test: Cancellation during backoff abandons the delivery
#[tokio::test(start_paused = true)]
async fn test_cancellation_interrupts_backoff() {
    let templates = StubTemplateSource::new("Hi {{name}}", "Hello {{name}}");
    let provider = MockProvider::always_failing("temporary network");
    let breaker = breaker();
    let retry = RetryController::new(5, 1);
    let shutdown = CancellationToken::new();
    shutdown.cancel();

    let message = test_message(HashMap::from([("name".to_string(), json!("Ada"))]));

    let error =
        deliver_with_retry(&message, &templates, &provider, &breaker, &retry, &shutdown)
            .await
            .unwrap_err();

    assert_eq!(provider.call_count(), 1, "only the initial attempt runs");
    assert!(matches!(error, DeliveryError::Canceled));
}

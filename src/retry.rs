use std::time::Duration;

use crate::error::DeliveryError;

/// Backoff is capped regardless of how many attempts have accumulated.
const MAX_BACKOFF_SECONDS: u64 = 16;

/// Error messages containing any of these substrings never succeed on retry.
/// Matching is case-sensitive.
const PERMANENT_ERRORS: [&str; 5] = [
    "invalid email",
    "template not found",
    "authentication failed",
    "unauthorized",
    "forbidden",
];

/// Pure retry policy: classifies errors and computes backoff. Sleeping is the
/// caller's job so cancellation remains possible.
#[derive(Debug, Clone)]
pub struct RetryController {
    max_attempts: u32,
    base_backoff_seconds: u64,
}

impl RetryController {
    /// `max_attempts` counts retries after the initial attempt, so a message
    /// sees at most `max_attempts + 1` sends.
    pub fn new(max_attempts: u32, base_backoff_seconds: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_seconds,
        }
    }

    pub fn should_retry(&self, error: &DeliveryError, attempt: u32) -> bool {
        if attempt >= self.max_attempts {
            return false;
        }

        !is_permanent(error)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let seconds = self
            .base_backoff_seconds
            .saturating_mul(2u64.saturating_pow(attempt));

        Duration::from_secs(seconds.min(MAX_BACKOFF_SECONDS))
    }
}

fn is_permanent(error: &DeliveryError) -> bool {
    match error {
        DeliveryError::TemplateNotFound(_)
        | DeliveryError::MissingVariables(_)
        | DeliveryError::UnsupportedVariable(_) => true,
        DeliveryError::CircuitOpen(_) => false,
        other => {
            let message = other.to_string();
            PERMANENT_ERRORS
                .iter()
                .any(|permanent| message.contains(permanent))
        }
    }
}

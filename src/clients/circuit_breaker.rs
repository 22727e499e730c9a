use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::{error::DeliveryError, models::circuit_breaker::CircuitState};

/// Minimum observations before the failure ratio is meaningful.
const TRIP_MIN_REQUESTS: u32 = 3;
const TRIP_FAILURE_RATIO: f64 = 0.6;

/// Short-circuits provider calls while the backend is failing.
///
/// State lives in-process behind a mutex; the lock is never held across an
/// await, so simultaneous calls from the whole worker pool are safe.
pub struct CircuitBreaker {
    service_name: String,
    cooldown: Duration,
    inner: Mutex<BreakerState>,
}

struct BreakerState {
    state: CircuitState,
    requests: u32,
    failures: u32,
    opened_at: Option<Instant>,
    probe_in_flight: bool,
}

impl CircuitBreaker {
    pub fn new(service_name: &str, cooldown: Duration) -> Self {
        info!(service = service_name, "Circuit breaker initialized");

        Self {
            service_name: service_name.to_string(),
            cooldown,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                requests: 0,
                failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    pub async fn call<F, Fut, T>(&self, operation: F) -> Result<T, DeliveryError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, DeliveryError>>,
    {
        self.admit()?;

        match operation().await {
            Ok(result) => {
                self.record_success();
                Ok(result)
            }
            Err(e) => {
                self.record_failure();
                Err(e)
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().expect("breaker lock poisoned").state
    }

    fn admit(&self) -> Result<(), DeliveryError> {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .is_some_and(|opened_at| opened_at.elapsed() >= self.cooldown);

                if cooled_down {
                    info!(service = %self.service_name, "Circuit breaker attempting recovery probe");
                    inner.transition(CircuitState::HalfOpen);
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    warn!(service = %self.service_name, "Circuit breaker is open, rejecting request");
                    Err(DeliveryError::CircuitOpen(self.service_name.clone()))
                }
            }
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    Err(DeliveryError::CircuitOpen(self.service_name.clone()))
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    fn record_success(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.probe_in_flight = false;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.transition(CircuitState::Closed);
                inner.opened_at = None;
                info!(service = %self.service_name, "Circuit breaker closed after successful probe");
            }
            _ => {
                inner.requests += 1;
            }
        }
    }

    fn record_failure(&self) {
        let mut inner = self.inner.lock().expect("breaker lock poisoned");
        inner.probe_in_flight = false;

        match inner.state {
            CircuitState::HalfOpen => {
                inner.transition(CircuitState::Open);
                inner.opened_at = Some(Instant::now());
                warn!(service = %self.service_name, "Circuit breaker reopened after failed probe");
            }
            _ => {
                inner.requests += 1;
                inner.failures += 1;

                debug!(
                    service = %self.service_name,
                    requests = inner.requests,
                    failures = inner.failures,
                    "Circuit breaker failure recorded"
                );

                if inner.requests >= TRIP_MIN_REQUESTS
                    && f64::from(inner.failures) / f64::from(inner.requests) >= TRIP_FAILURE_RATIO
                {
                    inner.transition(CircuitState::Open);
                    inner.opened_at = Some(Instant::now());
                    warn!(
                        service = %self.service_name,
                        "Circuit breaker opened due to failure ratio"
                    );
                }
            }
        }
    }
}

impl BreakerState {
    /// Counters describe the window since the last transition.
    fn transition(&mut self, state: CircuitState) {
        self.state = state;
        self.requests = 0;
        self.failures = 0;
    }
}

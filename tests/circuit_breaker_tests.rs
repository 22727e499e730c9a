use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};
use std::time::Duration;

use email_service::{
    clients::circuit_breaker::CircuitBreaker, error::DeliveryError,
    models::circuit_breaker::CircuitState,
};

async fn failing_call(breaker: &CircuitBreaker, calls: &Arc<AtomicU32>) -> Result<(), DeliveryError> {
    let counter = Arc::clone(calls);
    breaker
        .call(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(DeliveryError::Provider("service unavailable".to_string()))
        })
        .await
}

async fn succeeding_call(
    breaker: &CircuitBreaker,
    calls: &Arc<AtomicU32>,
) -> Result<(), DeliveryError> {
    let counter = Arc::clone(calls);
    breaker
        .call(|| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await
}

/// Test: Three failures trip the breaker and the next call fails fast
#[tokio::test]
async fn test_breaker_trips_after_failure_ratio() {
    let breaker = CircuitBreaker::new("test-provider", Duration::from_secs(30));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let _ = failing_call(&breaker, &calls).await;
    }

    assert_eq!(breaker.state(), CircuitState::Open);

    let result = failing_call(&breaker, &calls).await;

    assert!(matches!(result, Err(DeliveryError::CircuitOpen(_))));
    assert_eq!(
        calls.load(Ordering::SeqCst),
        3,
        "open breaker must not invoke the operation"
    );
}

/// Test: The ratio is not evaluated before three requests
#[tokio::test]
async fn test_breaker_needs_minimum_requests() {
    let breaker = CircuitBreaker::new("test-provider", Duration::from_secs(30));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..2 {
        let _ = failing_call(&breaker, &calls).await;
    }

    assert_eq!(breaker.state(), CircuitState::Closed);

    let _ = succeeding_call(&breaker, &calls).await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

/// Test: A low failure ratio keeps the breaker closed
#[tokio::test]
async fn test_breaker_stays_closed_below_ratio() {
    let breaker = CircuitBreaker::new("test-provider", Duration::from_secs(30));
    let calls = Arc::new(AtomicU32::new(0));

    let _ = failing_call(&breaker, &calls).await;
    let _ = succeeding_call(&breaker, &calls).await;
    let _ = succeeding_call(&breaker, &calls).await;
    // 2 failures of 4 requests: ratio 0.5 stays under the 0.6 trip line.
    let _ = failing_call(&breaker, &calls).await;

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

/// Test: After the cooldown one probe is admitted and closes the breaker
#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_through_probe() {
    let breaker = CircuitBreaker::new("test-provider", Duration::from_millis(100));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let _ = failing_call(&breaker, &calls).await;
    }
    assert_eq!(breaker.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(150)).await;

    succeeding_call(&breaker, &calls)
        .await
        .expect("probe should be admitted after cooldown");

    assert_eq!(breaker.state(), CircuitState::Closed);

    succeeding_call(&breaker, &calls)
        .await
        .expect("closed breaker admits requests");
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

/// Test: A failed probe reopens the breaker and resets the cooldown
#[tokio::test(start_paused = true)]
async fn test_breaker_reopens_on_failed_probe() {
    let breaker = CircuitBreaker::new("test-provider", Duration::from_millis(100));
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let _ = failing_call(&breaker, &calls).await;
    }

    tokio::time::sleep(Duration::from_millis(150)).await;

    let result = failing_call(&breaker, &calls).await;
    assert!(matches!(result, Err(DeliveryError::Provider(_))));
    assert_eq!(breaker.state(), CircuitState::Open);

    // Cooldown restarted: an immediate call is still rejected.
    let result = failing_call(&breaker, &calls).await;
    assert!(matches!(result, Err(DeliveryError::CircuitOpen(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    // A second cooldown admits another probe, which succeeds this time.
    tokio::time::sleep(Duration::from_millis(150)).await;
    succeeding_call(&breaker, &calls)
        .await
        .expect("probe admitted after renewed cooldown");
    assert_eq!(breaker.state(), CircuitState::Closed);
}

/// Test: Concurrent calls through the breaker are counted safely
#[tokio::test]
async fn test_breaker_is_safe_under_concurrency() {
    let breaker = Arc::new(CircuitBreaker::new("test-provider", Duration::from_secs(30)));
    let calls = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let breaker = Arc::clone(&breaker);
        let calls = Arc::clone(&calls);

        handles.push(tokio::spawn(async move {
            succeeding_call(&breaker, &calls).await
        }));
    }

    for handle in handles {
        handle.await.unwrap().expect("successful calls pass through");
    }

    assert_eq!(breaker.state(), CircuitState::Closed);
    assert_eq!(calls.load(Ordering::SeqCst), 10);
}

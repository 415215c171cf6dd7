//! Property-based tests for the circuit breaker.
//!
//! These tests check the breaker against a simple reference model of the
//! failure-ratio policy across arbitrary outcome sequences.

use proptest::prelude::*;
use rust_common::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState, TripPolicy};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn ratio_breaker(timeout: Duration) -> CircuitBreaker {
    CircuitBreaker::new(
        CircuitBreakerConfig::new("upstream-login")
            .with_timeout(timeout)
            .with_trip_policy(TripPolicy::FailureRatio {
                min_requests: 3,
                ratio: 0.6,
            }),
    )
}

// *For any* sequence of outcomes, the breaker opens exactly when the closed
// window has seen at least 3 requests with a failure ratio of at least 0.6,
// and every call after that is rejected without running.
proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    #[test]
    fn prop_breaker_matches_ratio_model(outcomes in prop::collection::vec(any::<bool>(), 1..40)) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cb = ratio_breaker(Duration::from_secs(60));
            let invocations = AtomicUsize::new(0);

            let mut requests = 0u32;
            let mut failures = 0u32;
            let mut open = false;

            for ok in outcomes {
                let result = cb
                    .execute(|| async {
                        invocations.fetch_add(1, Ordering::SeqCst);
                        if ok { Ok(()) } else { Err("upstream failure") }
                    })
                    .await;

                if open {
                    let rejected = matches!(result, Err(CircuitBreakerError::Open { .. }));
                    prop_assert!(rejected);
                    continue;
                }

                requests += 1;
                if !ok {
                    failures += 1;
                    if requests >= 3 && f64::from(failures) / f64::from(requests) >= 0.6 {
                        open = true;
                    }
                }
                prop_assert_eq!(result.is_ok(), ok);
            }

            let expected = if open { CircuitState::Open } else { CircuitState::Closed };
            prop_assert_eq!(cb.state(), expected);
            prop_assert_eq!(invocations.load(Ordering::SeqCst) as u32, requests);
            Ok(())
        })?;
    }

    #[test]
    fn prop_success_only_never_trips(calls in 1usize..50) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let cb = ratio_breaker(Duration::from_secs(60));
            for _ in 0..calls {
                let result = cb.execute(|| async { Ok::<_, ()>(()) }).await;
                prop_assert!(result.is_ok());
            }
            prop_assert_eq!(cb.state(), CircuitState::Closed);
            prop_assert_eq!(cb.counts().requests as usize, calls);
            Ok(())
        })?;
    }
}

#[tokio::test]
async fn test_fourth_call_rejected_after_three_failures() {
    let cb = ratio_breaker(Duration::from_secs(60));
    let invocations = AtomicUsize::new(0);

    for _ in 0..3 {
        let _ = cb
            .execute(|| async {
                invocations.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("connection refused")
            })
            .await;
    }
    assert_eq!(cb.state(), CircuitState::Open);

    let fourth = cb
        .execute(|| async {
            invocations.fetch_add(1, Ordering::SeqCst);
            Ok::<(), &str>(())
        })
        .await;

    assert!(matches!(fourth, Err(CircuitBreakerError::Open { .. })));
    assert_eq!(invocations.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_half_open_admits_exactly_one_concurrent_trial() {
    let cb = Arc::new(ratio_breaker(Duration::from_millis(20)));
    for _ in 0..3 {
        let _ = cb.execute(|| async { Err::<(), _>("down") }).await;
    }
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(40)).await;

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
    let (started_tx, started_rx) = tokio::sync::oneshot::channel::<()>();
    let trial_cb = Arc::clone(&cb);
    let trial = tokio::spawn(async move {
        trial_cb
            .execute(|| async move {
                let _ = started_tx.send(());
                let _ = release_rx.await;
                Ok::<_, &str>("recovered")
            })
            .await
    });

    started_rx.await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);

    let second = cb.execute(|| async { Ok::<_, &str>("second") }).await;
    assert!(matches!(
        second,
        Err(CircuitBreakerError::Open {
            state: CircuitState::HalfOpen,
            ..
        })
    ));

    release_tx.send(()).unwrap();
    assert_eq!(trial.await.unwrap().unwrap(), "recovered");
    assert_eq!(cb.state(), CircuitState::Closed);

    let after = cb.execute(|| async { Ok::<_, &str>("after") }).await;
    assert_eq!(after.unwrap(), "after");
}

#[tokio::test]
async fn test_failed_trial_reopens() {
    let cb = ratio_breaker(Duration::from_millis(20));
    for _ in 0..3 {
        let _ = cb.execute(|| async { Err::<(), _>("down") }).await;
    }

    tokio::time::sleep(Duration::from_millis(40)).await;
    let trial = cb.execute(|| async { Err::<(), _>("still down") }).await;

    assert!(matches!(trial, Err(CircuitBreakerError::ServiceError("still down"))));
    assert_eq!(cb.state(), CircuitState::Open);
}

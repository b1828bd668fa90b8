use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::*;

enum Step {
    Found(ProductSnapshot),
    Missing,
    Transient,
    Auth,
}

/// Transport that replays a scripted sequence of outcomes and counts
/// calls. An exhausted script keeps failing transiently.
struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn new(script: Vec<Step>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                script: Mutex::new(script.into()),
                calls: calls.clone(),
            },
            calls,
        )
    }
}

#[async_trait]
impl ProductTransport for ScriptedTransport {
    async fn fetch(&self, _product_id: i32) -> Result<Option<ProductSnapshot>, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.script.lock().unwrap().pop_front();
        match step {
            Some(Step::Found(snapshot)) => Ok(Some(snapshot)),
            Some(Step::Missing) => Ok(None),
            Some(Step::Auth) => Err(TransportError::Auth(crate::auth::AuthError::Exchange(
                "denied".to_string(),
            ))),
            Some(Step::Transient) | None => {
                Err(TransportError::Transient("connection refused".to_string()))
            }
        }
    }
}

fn snapshot(id: i32, stock: i32) -> ProductSnapshot {
    ProductSnapshot { id, stock }
}

fn breaker() -> CircuitBreaker {
    CircuitBreaker::new(5, Duration::from_millis(50))
}

#[tokio::test]
async fn test_lookup_succeeds_first_try() {
    let (transport, calls) = ScriptedTransport::new(vec![Step::Found(snapshot(1, 10))]);
    let client = ResilientProductClient::new(transport, fast_retry(3), breaker());

    let result = client.lookup(1).await.unwrap();
    assert_eq!(result, Some(snapshot(1, 10)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lookup_retries_transient_failures() {
    let (transport, calls) = ScriptedTransport::new(vec![
        Step::Transient,
        Step::Transient,
        Step::Found(snapshot(7, 3)),
    ]);
    let client = ResilientProductClient::new(transport, fast_retry(3), breaker());

    let result = client.lookup(7).await.unwrap();
    assert_eq!(result, Some(snapshot(7, 3)));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_missing_product_is_not_retried() {
    let (transport, calls) = ScriptedTransport::new(vec![Step::Missing]);
    let client = ResilientProductClient::new(transport, fast_retry(3), breaker());

    let result = client.lookup(99).await.unwrap();
    assert_eq!(result, None);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_retries_exhausted_after_initial_plus_retries() {
    let (transport, calls) = ScriptedTransport::new(vec![]);
    let client = ResilientProductClient::new(transport, fast_retry(3), breaker());

    let err = client.lookup(1).await.unwrap_err();
    match err {
        LookupError::RetriesExhausted { attempts, .. } => assert_eq!(attempts, 4),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_auth_failure_is_not_retried() {
    let (transport, calls) = ScriptedTransport::new(vec![Step::Auth]);
    let client = ResilientProductClient::new(transport, fast_retry(3), breaker());

    let err = client.lookup(1).await.unwrap_err();
    assert!(matches!(err, LookupError::Auth(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_breaker_opens_and_admits_single_probe() {
    let (transport, calls) = ScriptedTransport::new(vec![]);
    let client = ResilientProductClient::new(
        transport,
        fast_retry(3),
        CircuitBreaker::new(5, Duration::from_millis(50)),
    );

    // First lookup burns 4 attempts (initial + 3 retries).
    let err = client.lookup(1).await.unwrap_err();
    assert!(matches!(err, LookupError::RetriesExhausted { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 4);

    // Fifth consecutive failure opens the circuit mid-lookup.
    let err = client.lookup(1).await.unwrap_err();
    assert!(matches!(err, LookupError::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    // While open, no transport call is made at all.
    let err = client.lookup(1).await.unwrap_err();
    assert!(matches!(err, LookupError::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    // After the window a single probe goes through; its failure re-opens
    // the circuit before the retry loop comes back around.
    tokio::time::sleep(Duration::from_millis(60)).await;
    let err = client.lookup(1).await.unwrap_err();
    assert!(matches!(err, LookupError::CircuitOpen));
    assert_eq!(calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn test_probe_success_closes_breaker() {
    let (transport, calls) =
        ScriptedTransport::new(vec![Step::Transient, Step::Found(snapshot(1, 5))]);
    let client = ResilientProductClient::new(
        transport,
        fast_retry(0),
        CircuitBreaker::new(1, Duration::from_millis(20)),
    );

    // One failure opens the single-failure circuit.
    let err = client.lookup(1).await.unwrap_err();
    assert!(matches!(err, LookupError::RetriesExhausted { .. }));

    tokio::time::sleep(Duration::from_millis(30)).await;

    // The probe succeeds and closes the circuit.
    let result = client.lookup(1).await.unwrap();
    assert_eq!(result, Some(snapshot(1, 5)));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_snapshot_accepts_pascal_case() {
    let snapshot: ProductSnapshot = serde_json::from_str(r#"{"Id":3,"Stock":12}"#).unwrap();
    assert_eq!(snapshot.id, 3);
    assert_eq!(snapshot.stock, 12);
}

#[test]
fn test_snapshot_accepts_lower_case() {
    let snapshot: ProductSnapshot = serde_json::from_str(r#"{"id":3,"stock":12}"#).unwrap();
    assert_eq!(snapshot.id, 3);
    assert_eq!(snapshot.stock, 12);
}

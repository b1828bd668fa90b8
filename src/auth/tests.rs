use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::*;

struct StubExchange {
    ttl: Duration,
    calls: Arc<AtomicUsize>,
    fail: bool,
}

impl StubExchange {
    fn new(ttl: Duration) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                ttl,
                calls: calls.clone(),
                fail: false,
            },
            calls,
        )
    }
}

#[async_trait]
impl TokenExchange for StubExchange {
    async fn exchange(&self) -> Result<BearerToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AuthError::Exchange("authority unavailable".to_string()));
        }
        Ok(BearerToken::new(format!("token-{n}"), self.ttl))
    }
}

#[tokio::test]
async fn test_token_cached_while_fresh() {
    let (exchange, calls) = StubExchange::new(Duration::from_secs(3600));
    let source = CachedCredentialSource::new(exchange, Duration::from_secs(30));

    let first = source.token().await.unwrap();
    let second = source.token().await.unwrap();

    assert_eq!(first, "token-0");
    assert_eq!(second, "token-0");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_token_refreshed_inside_buffer() {
    // Tokens expire in 20s but the buffer demands 30s of validity, so
    // every call refreshes.
    let (exchange, calls) = StubExchange::new(Duration::from_secs(20));
    let source = CachedCredentialSource::new(exchange, Duration::from_secs(30));

    let first = source.token().await.unwrap();
    let second = source.token().await.unwrap();

    assert_eq!(first, "token-0");
    assert_eq!(second, "token-1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_exchange_error_surfaces() {
    let (mut exchange, calls) = StubExchange::new(Duration::from_secs(3600));
    exchange.fail = true;
    let source = CachedCredentialSource::new(exchange, Duration::from_secs(30));

    let err = source.token().await.unwrap_err();
    assert!(matches!(err, AuthError::Exchange(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_concurrent_callers_get_tokens() {
    let (exchange, _calls) = StubExchange::new(Duration::from_secs(3600));
    let source = Arc::new(CachedCredentialSource::new(
        exchange,
        Duration::from_secs(30),
    ));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let source = source.clone();
        handles.push(tokio::spawn(async move { source.token().await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().is_ok());
    }
}

#[test]
fn test_bearer_token_remaining_saturates() {
    let token = BearerToken::new("t", Duration::from_secs(0));
    assert_eq!(token.remaining(), Duration::ZERO);
}

#[test]
fn test_discovery_url() {
    let exchange = OidcTokenExchange::new(crate::config::AuthConfig {
        authority: "https://id.example.com/realms/shop/".to_string(),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(
        exchange.discovery_url(),
        "https://id.example.com/realms/shop/.well-known/openid-configuration"
    );
}

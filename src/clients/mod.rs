//! HTTP client for the products service, wrapped in retry and
//! circuit-breaker policies.
//!
//! The transport layer speaks plain HTTP with a bearer credential; the
//! resilient client above it decides which outcomes count as failures,
//! when to back off, and when to stop calling altogether.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::{AuthError, CredentialSource};
use crate::config::ProductsApiConfig;
use crate::resilience::{CircuitBreaker, RetryConfig};

/// A product as reported by the products service.
///
/// The service emits PascalCase field names; both casings are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ProductSnapshot {
    #[serde(alias = "Id")]
    pub id: i32,
    #[serde(alias = "Stock")]
    pub stock: i32,
}

/// Terminal outcome of a resilient lookup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Product lookup failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Product lookup rejected: circuit open")]
    CircuitOpen,
}

/// Per-attempt transport outcome, classified for the retry loop.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failures, timeouts and server errors. Worth retrying.
    #[error("{0}")]
    Transient(String),

    /// Credential acquisition failed. Retrying without a token is
    /// pointless, and the breaker must not count it against the products
    /// service.
    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Resolve a product by id.
#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// Returns the product, or `None` when the service reports it does
    /// not exist.
    async fn lookup(&self, product_id: i32) -> Result<Option<ProductSnapshot>, LookupError>;
}

/// Single-attempt product fetch, without any resilience policy.
#[async_trait]
pub trait ProductTransport: Send + Sync {
    async fn fetch(&self, product_id: i32) -> Result<Option<ProductSnapshot>, TransportError>;
}

/// HTTP transport for the products service.
pub struct HttpProductTransport<C> {
    http: reqwest::Client,
    base_url: String,
    credentials: Arc<C>,
}

impl<C: CredentialSource> HttpProductTransport<C> {
    /// Build a transport against the configured endpoint.
    pub fn new(config: &ProductsApiConfig, credentials: Arc<C>) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| TransportError::Transient(e.to_string()))?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            credentials,
        })
    }
}

#[async_trait]
impl<C: CredentialSource> ProductTransport for HttpProductTransport<C> {
    async fn fetch(&self, product_id: i32) -> Result<Option<ProductSnapshot>, TransportError> {
        let token = self.credentials.token().await?;
        let url = format!("{}/products/{}", self.base_url, product_id);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| TransportError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let snapshot = response
                .json::<ProductSnapshot>()
                .await
                .map_err(|e| TransportError::Transient(e.to_string()))?;
            return Ok(Some(snapshot));
        }
        if status.is_server_error() {
            return Err(TransportError::Transient(format!(
                "products service returned {status}"
            )));
        }
        // Any other non-success response is treated as "no such product".
        debug!(product_id, %status, "Product lookup returned non-success");
        Ok(None)
    }
}

/// Product lookup with retry and circuit-breaker policies around a
/// transport.
///
/// Transient failures are retried with exponential backoff and recorded
/// against the breaker; credential failures pass straight through without
/// touching either policy. A lookup that finds no product is a success.
pub struct ResilientProductClient<T> {
    transport: T,
    retry: RetryConfig,
    breaker: CircuitBreaker,
}

impl<T: ProductTransport> ResilientProductClient<T> {
    pub fn new(transport: T, retry: RetryConfig, breaker: CircuitBreaker) -> Self {
        Self {
            transport,
            retry,
            breaker,
        }
    }
}

#[async_trait]
impl<T: ProductTransport> ProductLookup for ResilientProductClient<T> {
    async fn lookup(&self, product_id: i32) -> Result<Option<ProductSnapshot>, LookupError> {
        let mut attempt = 0u32;
        loop {
            if !self.breaker.try_acquire() {
                warn!(product_id, "Product lookup rejected by open circuit");
                return Err(LookupError::CircuitOpen);
            }

            match self.transport.fetch(product_id).await {
                Ok(snapshot) => {
                    self.breaker.record_success();
                    return Ok(snapshot);
                }
                Err(TransportError::Auth(e)) => return Err(e.into()),
                Err(TransportError::Transient(message)) => {
                    self.breaker.record_failure();
                    if !self.retry.should_retry(attempt) {
                        return Err(LookupError::RetriesExhausted {
                            attempts: attempt + 1,
                            message,
                        });
                    }
                    let delay = self.retry.delay_for_attempt(attempt);
                    warn!(
                        product_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Product lookup failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Quick millisecond-scale policies for exercising the retry loop.
#[cfg(test)]
pub(crate) fn fast_retry(max_retries: u32) -> RetryConfig {
    use std::time::Duration;
    RetryConfig {
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
        max_retries,
    }
}

#[cfg(test)]
mod tests;

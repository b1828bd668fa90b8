//! Bearer-credential acquisition for service-to-service calls.
//!
//! The order side authenticates against the products service with a
//! client-credentials grant. Tokens are cached process-wide in a single
//! slot and refreshed once their remaining validity drops below a
//! configured buffer, so a token is never presented close to expiry.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::AuthConfig;

/// Result type for credential operations.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur while obtaining a bearer credential.
///
/// All variants are fatal to the in-flight remote call; there is no local
/// fallback for a missing token.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Discovery failed: {0}")]
    Discovery(String),

    #[error("Token exchange failed: {0}")]
    Exchange(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// A bearer token with its absolute expiry instant.
#[derive(Debug, Clone)]
pub struct BearerToken {
    pub access_token: String,
    pub expires_at: Instant,
}

impl BearerToken {
    /// Create a token valid for `ttl` from now.
    pub fn new(access_token: impl Into<String>, ttl: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Instant::now() + ttl,
        }
    }

    /// Remaining validity, zero once expired.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

/// Capability interface for anything that needs a current bearer token.
#[async_trait]
pub trait CredentialSource: Send + Sync {
    /// Returns a token with at least the configured buffer of validity
    /// left.
    async fn token(&self) -> Result<String>;
}

/// Seam for the actual token acquisition, so caching logic can be tested
/// without a live authority.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    /// Obtain a fresh token from the authority.
    async fn exchange(&self) -> Result<BearerToken>;
}

/// Single-slot token cache in front of a [`TokenExchange`].
///
/// Concurrent callers that observe a stale slot may refresh in parallel;
/// the exchange is idempotent so the duplicate work is tolerated rather
/// than serialized.
pub struct CachedCredentialSource<E> {
    exchange: E,
    refresh_buffer: Duration,
    cached: RwLock<Option<BearerToken>>,
}

impl<E: TokenExchange> CachedCredentialSource<E> {
    /// Wrap `exchange`, refreshing any token whose remaining validity is
    /// below `refresh_buffer`.
    pub fn new(exchange: E, refresh_buffer: Duration) -> Self {
        Self {
            exchange,
            refresh_buffer,
            cached: RwLock::new(None),
        }
    }
}

#[async_trait]
impl<E: TokenExchange> CredentialSource for CachedCredentialSource<E> {
    async fn token(&self) -> Result<String> {
        if let Some(token) = self.cached.read().await.as_ref() {
            if token.remaining() > self.refresh_buffer {
                return Ok(token.access_token.clone());
            }
        }

        let fresh = self.exchange.exchange().await?;
        debug!(valid_for = ?fresh.remaining(), "Refreshed bearer token");
        let access_token = fresh.access_token.clone();
        *self.cached.write().await = Some(fresh);
        Ok(access_token)
    }
}

#[derive(Debug, Deserialize)]
struct DiscoveryDocument {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Client-credentials exchange against an OpenID Connect authority.
///
/// Fetches the discovery document to locate the token endpoint, then posts
/// a `client_credentials` grant with the configured client id, secret and
/// audience.
pub struct OidcTokenExchange {
    http: reqwest::Client,
    config: AuthConfig,
}

impl OidcTokenExchange {
    /// Create an exchange for the given authority configuration.
    pub fn new(config: AuthConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, config })
    }

    fn discovery_url(&self) -> String {
        format!(
            "{}/.well-known/openid-configuration",
            self.config.authority.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl TokenExchange for OidcTokenExchange {
    async fn exchange(&self) -> Result<BearerToken> {
        let response = self.http.get(self.discovery_url()).send().await?;
        if !response.status().is_success() {
            return Err(AuthError::Discovery(format!(
                "discovery document returned {}",
                response.status()
            )));
        }
        let discovery: DiscoveryDocument = response
            .json()
            .await
            .map_err(|e| AuthError::Discovery(e.to_string()))?;

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("audience", self.config.audience.as_str()),
        ];
        let response = self
            .http
            .post(&discovery.token_endpoint)
            .form(&params)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Exchange(format!(
                "token endpoint returned {}",
                response.status()
            )));
        }
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Exchange(e.to_string()))?;

        Ok(BearerToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}

/// Build the production credential source from configuration.
pub fn oidc_credentials(config: AuthConfig) -> Result<CachedCredentialSource<OidcTokenExchange>> {
    let buffer = config.refresh_buffer();
    Ok(CachedCredentialSource::new(
        OidcTokenExchange::new(config)?,
        buffer,
    ))
}

#[cfg(test)]
mod tests;

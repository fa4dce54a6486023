//! Cached JSON client
//!
//! Every query goes through the same pipeline:
//! 1. Look the request fingerprint up in the response cache
//! 2. On a miss, POST the form parameters, retrying non-200 answers
//! 3. Decode the body as JSON
//! 4. Reject upstream error envelopes
//! 5. Persist fresh bodies into the cache
//!
//! A body only reaches the cache after it passed steps 3 and 4.

use super::cache::ResponseCache;
use super::retry::{FailureKind, RetryPolicy};
use super::ApiError;
use crate::config::{ApiConfig, Config};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// Form parameters of a single upstream request
pub type Params = Vec<(&'static str, String)>;

/// Keys upstream uses to signal a failed query inside a 200 response
const ERROR_ENVELOPE_KEYS: [&str; 2] = ["erro", "error"];

/// Builds the HTTP client used for all upstream calls
///
/// # Arguments
///
/// * `config` - The upstream API configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &ApiConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .connect_timeout(Duration::from_secs(config.timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP client with an on-disk cache and bounded retries in front of it
#[derive(Debug, Clone)]
pub struct CachedClient {
    http: Client,
    base_url: String,
    cache: ResponseCache,
    retry: RetryPolicy,
    pacing: Duration,
}

impl CachedClient {
    /// Creates a client from the crawl configuration
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = build_http_client(&config.api)?;
        let cache = ResponseCache::new(&config.cache.directory)?;
        tracing::info!("Response cache at {}", cache.directory().display());

        Ok(Self::with_parts(
            http,
            &config.api.base_url,
            cache,
            RetryPolicy::from(&config.retry),
            Duration::from_millis(config.api.pacing_ms),
        ))
    }

    /// Assembles a client from already-built parts
    pub fn with_parts(
        http: Client,
        base_url: &str,
        cache: ResponseCache,
        retry: RetryPolicy,
        pacing: Duration,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache,
            retry,
            pacing,
        }
    }

    /// The response cache backing this client
    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Runs a query and returns the decoded JSON document
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Endpoint name appended to the base URL
    /// * `params` - Form parameters
    /// * `ttl` - Maximum age of a usable cache entry; `None` never expires
    ///
    /// # Returns
    ///
    /// * `Ok(Value)` - The decoded document
    /// * `Err(ApiError::UpstreamRequest)` - Every attempt failed
    /// * `Err(ApiError::UpstreamSemantic)` - Upstream answered with an error envelope
    /// * `Err(ApiError::Malformed)` - The body is not JSON
    pub async fn query(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<Value, ApiError> {
        let fingerprint = ResponseCache::fingerprint(endpoint, params);

        let (body, from_network) = match self.cache.read(&fingerprint, ttl)? {
            Some(body) => {
                tracing::trace!("Cache hit for {} ({})", endpoint, fingerprint);
                (body, false)
            }
            None => (self.fetch_with_retry(endpoint, params).await?, true),
        };

        let document: Value = match serde_json::from_str(&body) {
            Ok(document) => document,
            Err(e) => {
                self.cache.evict(&fingerprint)?;
                return Err(ApiError::Malformed {
                    endpoint: endpoint.to_string(),
                    message: e.to_string(),
                });
            }
        };

        if let Some(message) = error_envelope(&document) {
            self.cache.evict(&fingerprint)?;
            return Err(ApiError::UpstreamSemantic {
                endpoint: endpoint.to_string(),
                message,
            });
        }

        if from_network {
            self.cache.write(&fingerprint, &body)?;
        }

        Ok(document)
    }

    /// Drops the cached response of a request
    pub fn evict(&self, endpoint: &str, params: &[(&str, String)]) -> Result<(), ApiError> {
        let fingerprint = ResponseCache::fingerprint(endpoint, params);
        self.cache.evict(&fingerprint)?;
        Ok(())
    }

    async fn fetch_with_retry(
        &self,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<String, ApiError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let max_attempts = self.retry.max_attempts();
        let mut attempt = 0;

        loop {
            let (error, kind) = match self.attempt(&url, endpoint, params).await {
                Ok(body) => {
                    if !self.pacing.is_zero() {
                        tokio::time::sleep(self.pacing).await;
                    }
                    return Ok(body);
                }
                Err(failure) => failure,
            };

            attempt += 1;
            if attempt >= max_attempts {
                tracing::error!(
                    "Giving up on {} after {} attempts: {}",
                    endpoint,
                    attempt,
                    error
                );
                return Err(ApiError::UpstreamRequest {
                    endpoint: endpoint.to_string(),
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }

            let delay = self.retry.delay_before_retry(attempt - 1, kind);
            tracing::warn!(
                "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                attempt,
                max_attempts,
                endpoint,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt(
        &self,
        url: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> Result<String, (ApiError, FailureKind)> {
        let transport = |status: Option<StatusCode>, message: String| ApiError::Transport {
            endpoint: endpoint.to_string(),
            status: status.map(|s| s.as_u16()),
            message,
        };

        let response = self
            .http
            .post(url)
            .form(params)
            .send()
            .await
            .map_err(|e| (transport(None, e.to_string()), FailureKind::Other))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err((
                transport(Some(status), format!("HTTP {}", status.as_u16())),
                FailureKind::classify(status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| (transport(Some(status), e.to_string()), FailureKind::Other))
    }
}

/// Extracts the message of an upstream error envelope, if the document is one
fn error_envelope(document: &Value) -> Option<String> {
    let object = document.as_object()?;

    ERROR_ENVELOPE_KEYS.iter().find_map(|key| {
        object.get(*key).map(|message| match message {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
    })
}

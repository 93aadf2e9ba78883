//! Shared blocking JSON client for the provider adapters.
//!
//! Handles per-request timeouts, retries with exponential backoff, 429
//! `Retry-After`, and the circuit breaker. Adapters only build URLs and map
//! typed responses.

use super::circuit_breaker::CircuitBreaker;
use super::provider::ProviderError;
use crate::cache::RetryPolicy;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Connection settings for one provider.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ProviderSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key;
        self
    }
}

/// How the API key is presented.
#[derive(Debug, Clone, Copy)]
pub enum ApiKeyStyle {
    /// `{name}: {key}`
    Header(&'static str),
    /// `Authorization: Bearer {key}`
    Bearer,
}

pub struct JsonClient {
    provider: &'static str,
    client: Client,
    base_url: String,
    timeout: Duration,
    retry: RetryPolicy,
    breaker: Arc<CircuitBreaker>,
}

impl JsonClient {
    pub fn new(
        provider: &'static str,
        settings: &ProviderSettings,
        key_style: ApiKeyStyle,
        breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, ProviderError> {
        let config_err = |reason: String| ProviderError::Configuration {
            provider: provider.into(),
            reason,
        };

        let mut headers = HeaderMap::new();
        if let Some(key) = &settings.api_key {
            let (name, value) = match key_style {
                ApiKeyStyle::Header(name) => (
                    HeaderName::from_bytes(name.as_bytes())
                        .map_err(|e| config_err(format!("invalid API key header name '{name}': {e}")))?,
                    key.clone(),
                ),
                ApiKeyStyle::Bearer => (AUTHORIZATION, format!("Bearer {key}")),
            };
            let mut value = HeaderValue::from_str(&value)
                .map_err(|e| config_err(format!("invalid API key header: {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(settings.timeout)
            .default_headers(headers)
            .user_agent(concat!("cryptonest/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| config_err(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider,
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
            retry: settings.retry,
            breaker,
        })
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    pub fn is_available(&self) -> bool {
        self.breaker.is_allowed()
    }

    /// Absolute URL for an API path such as `/coins/markets`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// GET `url` and decode JSON, retrying transient failures.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        entity: &str,
    ) -> Result<T, ProviderError> {
        self.retry.run(
            url,
            || self.attempt(url, query, entity),
            ProviderError::is_transient,
            |e| match e {
                ProviderError::RateLimited {
                    retry_after_secs, ..
                } => Some(Duration::from_secs(*retry_after_secs)),
                _ => None,
            },
        )
    }

    fn attempt<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
        entity: &str,
    ) -> Result<T, ProviderError> {
        if !self.breaker.is_allowed() {
            return Err(ProviderError::CircuitBreakerTripped {
                provider: self.provider.into(),
            });
        }

        let resp = match self.client.get(url).query(query).send() {
            Ok(resp) => resp,
            Err(e) => {
                self.breaker.record_failure();
                return Err(if e.is_timeout() {
                    ProviderError::Timeout {
                        provider: self.provider.into(),
                        timeout_secs: self.timeout.as_secs(),
                    }
                } else {
                    ProviderError::Network {
                        provider: self.provider.into(),
                        reason: e.to_string(),
                    }
                });
            }
        };

        let status = resp.status();
        match status {
            StatusCode::FORBIDDEN => {
                self.breaker.trip();
                return Err(ProviderError::CircuitBreakerTripped {
                    provider: self.provider.into(),
                });
            }
            StatusCode::UNAUTHORIZED => {
                return Err(ProviderError::Authentication {
                    provider: self.provider.into(),
                    reason: format!("HTTP 401 for '{entity}'"),
                });
            }
            StatusCode::TOO_MANY_REQUESTS => {
                self.breaker.record_failure();
                let retry_after_secs = resp
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                return Err(ProviderError::RateLimited {
                    provider: self.provider.into(),
                    retry_after_secs,
                });
            }
            StatusCode::NOT_FOUND => {
                return Err(ProviderError::NotFound {
                    provider: self.provider.into(),
                    entity: entity.into(),
                });
            }
            s if !s.is_success() => {
                if s.is_server_error() {
                    self.breaker.record_failure();
                }
                return Err(ProviderError::Http {
                    provider: self.provider.into(),
                    entity: entity.into(),
                    status: s.as_u16(),
                });
            }
            _ => {}
        }

        let body: T = resp.json().map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    provider: self.provider.into(),
                    timeout_secs: self.timeout.as_secs(),
                }
            } else {
                ProviderError::ResponseFormat {
                    provider: self.provider.into(),
                    reason: format!("'{entity}': {e}"),
                }
            }
        })?;
        self.breaker.record_success();
        Ok(body)
    }
}

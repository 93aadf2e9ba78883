//! Google Cloud Storage store over the JSON API.
//!
//! Objects are named exactly like the cache key. Every request carries a
//! timeout; connection failures, timeouts, 429 and 5xx map to
//! `StoreError::Unavailable` so the manager's backoff can retry them.

use super::key::CacheKey;
use super::store::{CacheStore, StoreError};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use std::time::Duration;

pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

pub struct GcsStore {
    client: Client,
    endpoint: Url,
    bucket: String,
    token: String,
}

impl GcsStore {
    pub fn new(
        bucket: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        Self::with_endpoint(DEFAULT_GCS_ENDPOINT, bucket, token, timeout)
    }

    /// Point the store at a different endpoint (e.g. a local emulator).
    pub fn with_endpoint(
        endpoint: &str,
        bucket: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let endpoint = Url::parse(endpoint).map_err(|e| StoreError::Rejected {
            store: "gcs".into(),
            reason: format!("invalid endpoint '{endpoint}': {e}"),
        })?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StoreError::Unavailable {
                store: "gcs".into(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint,
            bucket: bucket.into(),
            token: token.into(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// `{endpoint}/storage/v1/b/{bucket}/o/{object}`, object name percent-encoded
    /// as a single path segment.
    fn object_url(&self, key: &CacheKey) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| self.rejected("endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["storage", "v1", "b", self.bucket.as_str(), "o", key.as_str()]);
        Ok(url)
    }

    fn upload_url(&self, key: &CacheKey) -> Result<Url, StoreError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| self.rejected("endpoint cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["upload", "storage", "v1", "b", self.bucket.as_str(), "o"]);
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key.as_str());
        Ok(url)
    }

    fn rejected(&self, reason: String) -> StoreError {
        StoreError::Rejected {
            store: self.name().into(),
            reason,
        }
    }

    fn unavailable(&self, reason: String) -> StoreError {
        StoreError::Unavailable {
            store: self.name().into(),
            reason,
        }
    }

    fn transport_error(&self, e: reqwest::Error) -> StoreError {
        // Every transport failure (connect, timeout, reset) is worth a retry.
        self.unavailable(e.to_string())
    }

    fn status_error(&self, key: &CacheKey, status: StatusCode) -> StoreError {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            self.unavailable(format!("HTTP {status} for '{key}'"))
        } else {
            self.rejected(format!("HTTP {status} for '{key}'"))
        }
    }

    fn send_get(&self, url: Url) -> Result<Response, StoreError> {
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .map_err(|e| self.transport_error(e))
    }
}

impl CacheStore for GcsStore {
    fn name(&self) -> &str {
        "gcs"
    }

    fn exists(&self, key: &CacheKey) -> Result<bool, StoreError> {
        let resp = self.send_get(self.object_url(key)?)?;
        match resp.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            s => Err(self.status_error(key, s)),
        }
    }

    fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StoreError> {
        let mut url = self.object_url(key)?;
        url.query_pairs_mut().append_pair("alt", "media");
        let resp = self.send_get(url)?;
        match resp.status() {
            s if s.is_success() => {
                let bytes = resp.bytes().map_err(|e| self.transport_error(e))?;
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            s => Err(self.status_error(key, s)),
        }
    }

    fn put(&self, key: &CacheKey, payload: &[u8]) -> Result<(), StoreError> {
        let resp = self
            .client
            .post(self.upload_url(key)?)
            .bearer_auth(&self.token)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_vec())
            .send()
            .map_err(|e| self.transport_error(e))?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(self.status_error(key, status))
        }
    }
}

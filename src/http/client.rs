//! HTTP client with built-in retry logic and error handling.

use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::{Client, Url};
use serde_json::Value;

use super::config::{CustomRequestConfig, RetryConfig};
use super::retry::{classify_status, is_retryable_error};
use crate::errors::ApiError;
use crate::types::RawResponse;

/// Header carrying the correlation id of each request.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// HTTP client with built-in retry logic for API requests.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Sends the request described by `config` and decodes the JSON response.
    /// Relative URLs are resolved against `base_url`. Transient failures are
    /// retried as `retry` allows.
    #[tracing::instrument(skip(self, config, retry), fields(request_id = %config.request_id))]
    pub async fn execute(
        &self,
        config: &CustomRequestConfig,
        base_url: &str,
        retry: &RetryConfig,
    ) -> Result<RawResponse> {
        let url = config.resolve_url(base_url)?;
        let operation_name = format!("[{}] {} {}", config.request_id, config.method, url.path());

        debug!("{}: sending...", operation_name);

        self.with_retry(&operation_name, retry, || {
            self.execute_once(config, url.clone())
        })
        .await
        .with_context(|| format!("Request {} failed", config.request_id))
    }

    /// Single attempt without retry.
    async fn execute_once(&self, config: &CustomRequestConfig, url: Url) -> Result<RawResponse> {
        let mut request = self
            .client
            .request(config.method.clone(), url)
            .headers(config.headers.clone())
            .header(REQUEST_ID_HEADER, config.request_id.as_str());

        if !config.params.is_empty() {
            request = request.query(&config.params);
        }
        if let Some(data) = &config.data {
            request = request.json(data);
        }
        if let Some(timeout) = config.timeout {
            request = request.timeout(timeout);
        }

        let response = request
            .send()
            .await
            .context("Failed to send request to Senler API")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        debug!(
            "[{}] HTTP {} ({} bytes)",
            config.request_id,
            status.as_u16(),
            body.len()
        );

        if let Some(error) = classify_status(status, &body) {
            return Err(error.into());
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value = serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!("response body is not JSON ({})", e))
        })?;

        Ok(value)
    }

    /// Executes an async operation with retry logic.
    async fn with_retry<F, Fut, T>(
        &self,
        operation_name: &str,
        retry: &RetryConfig,
        operation: F,
    ) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let max_attempts = retry.attempts();
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if !is_retryable_error(&e) {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                        return Err(e);
                    }

                    if attempt < max_attempts {
                        warn!(
                            "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                            operation_name,
                            attempt,
                            max_attempts,
                            e,
                            retry.retry_delay.as_millis()
                        );
                        tokio::time::sleep(retry.retry_delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow::anyhow!("{}: failed after {} attempts", operation_name, max_attempts)
        }))
    }
}

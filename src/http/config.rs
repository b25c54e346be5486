//! Configuration shapes consumed by the HTTP layer and the API client.

use anyhow::{Context, Result};
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::time::Duration;

use super::retry::{MAX_RETRIES, RETRY_DELAY_MS};
use crate::errors::ApiError;
use crate::runtime::Runtime;
use crate::types::GroupScope;

pub const DEFAULT_BASE_URL: &str = "https://api.senler.ru";
pub const DEFAULT_API_VERSION: &str = "v2";

pub const ENV_ACCESS_TOKEN: &str = "SENLER_ACCESS_TOKEN";
pub const ENV_API_VERSION: &str = "SENLER_API_VERSION";
pub const ENV_BASE_URL: &str = "SENLER_BASE_URL";
pub const ENV_VK_GROUP_ID: &str = "SENLER_VK_GROUP_ID";
pub const ENV_GROUP_ID: &str = "SENLER_GROUP_ID";

/// Connection parameters for the Senler API.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vk_group_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<u64>,
}

impl ApiConfig {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            api_version: None,
            base_url: None,
            access_token: access_token.into(),
            vk_group_id: None,
            group_id: None,
        }
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_vk_group_id(mut self, id: u64) -> Self {
        self.vk_group_id = Some(id);
        self
    }

    pub fn with_group_id(mut self, id: u64) -> Self {
        self.group_id = Some(id);
        self
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn api_version(&self) -> &str {
        self.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
    }

    /// Versioned API root, e.g. `https://api.senler.ru/v2`.
    pub fn endpoint(&self) -> String {
        format!(
            "{}/{}",
            self.base_url().trim_end_matches('/'),
            self.api_version().trim_matches('/')
        )
    }

    pub fn group_scope(&self) -> GroupScope {
        GroupScope {
            vk_group_id: self.vk_group_id,
            group_id: self.group_id,
        }
    }

    /// Rejects configurations no request could succeed with.
    pub fn validate(&self) -> Result<()> {
        if self.access_token.trim().is_empty() {
            return Err(ApiError::InvalidConfig("access token must not be empty".into()).into());
        }

        if self.api_version().trim_matches('/').is_empty() {
            return Err(ApiError::InvalidConfig("API version must not be empty".into()).into());
        }

        let url = Url::parse(self.base_url()).map_err(|e| {
            ApiError::InvalidConfig(format!("invalid base URL '{}': {}", self.base_url(), e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidConfig(format!(
                "base URL '{}' must use http or https",
                self.base_url()
            ))
            .into());
        }

        Ok(())
    }

    /// Builds a config from `SENLER_*` environment variables.
    #[tracing::instrument(skip(runtime))]
    pub fn from_env<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        if runtime.env_var(ENV_ACCESS_TOKEN).is_err() {
            return Err(
                ApiError::InvalidConfig(format!("{} is not set", ENV_ACCESS_TOKEN)).into(),
            );
        }

        let mut config = Self::new(String::new());
        config.apply_env(runtime)?;
        Ok(config)
    }

    /// Overwrites fields with the `SENLER_*` environment variables that are set.
    #[tracing::instrument(skip(self, runtime))]
    pub fn apply_env<R: Runtime + ?Sized>(&mut self, runtime: &R) -> Result<()> {
        if let Ok(token) = runtime.env_var(ENV_ACCESS_TOKEN) {
            debug!("Using {}: {}", ENV_ACCESS_TOKEN, mask_token(&token));
            self.access_token = token;
        }
        if let Ok(version) = runtime.env_var(ENV_API_VERSION) {
            self.api_version = Some(version);
        }
        if let Ok(base_url) = runtime.env_var(ENV_BASE_URL) {
            self.base_url = Some(base_url);
        }
        if let Some(id) = parse_id_var(runtime, ENV_VK_GROUP_ID)? {
            self.vk_group_id = Some(id);
        }
        if let Some(id) = parse_id_var(runtime, ENV_GROUP_ID)? {
            self.group_id = Some(id);
        }
        Ok(())
    }

    /// Loads a JSON config file (`{"accessToken": "...", "vkGroupId": 1}`).
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime + ?Sized>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime.read_to_string(path)?;
        let config: ApiConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("api_version", &self.api_version)
            .field("base_url", &self.base_url)
            .field("access_token", &mask_token(&self.access_token))
            .field("vk_group_id", &self.vk_group_id)
            .field("group_id", &self.group_id)
            .finish()
    }
}

fn parse_id_var<R: Runtime + ?Sized>(runtime: &R, key: &str) -> Result<Option<u64>> {
    match runtime.env_var(key) {
        Ok(value) => value
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| {
                ApiError::InvalidConfig(format!("{} must be a number, got '{}'", key, value))
                    .into()
            }),
        Err(_) => Ok(None),
    }
}

/// Renders a token for logs: first and last four characters only.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

/// Retry settings for the fixed-interval retry loop of the HTTP layer.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryConfig {
    /// Total attempts including the first one. `0` behaves as `1`.
    pub max_attempts: usize,
    /// Pause between attempts, e.g. `"500ms"`
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            retry_delay: Duration::from_millis(RETRY_DELAY_MS),
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: usize, retry_delay: Duration) -> Self {
        Self {
            max_attempts,
            retry_delay,
        }
    }

    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            retry_delay: Duration::ZERO,
        }
    }

    pub fn attempts(&self) -> usize {
        self.max_attempts.max(1)
    }
}

/// Generic HTTP request options shared by every call.
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub method: Method,
    pub headers: HeaderMap,
    /// Query string pairs
    pub params: Vec<(String, String)>,
    /// JSON body
    pub data: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn json(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Options of one outbound call: the generic request options plus the
/// target URL and the correlation id.
#[derive(Debug, Clone)]
pub struct CustomRequestConfig {
    pub base: RequestConfig,
    /// Absolute URL, or a path relative to the API endpoint
    pub url: String,
    /// Correlates the request with its response, log lines and cache entry
    pub request_id: String,
}

impl CustomRequestConfig {
    pub fn new(url: impl Into<String>, request_id: impl Into<String>) -> Result<Self> {
        Self::from_base(RequestConfig::default(), url, request_id)
    }

    pub fn from_base(
        base: RequestConfig,
        url: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Result<Self> {
        let url = url.into();
        let request_id = request_id.into();

        if url.trim().is_empty() {
            return Err(ApiError::InvalidRequest("request URL must not be empty".into()).into());
        }
        if request_id.trim().is_empty() {
            return Err(ApiError::InvalidRequest("request id must not be empty".into()).into());
        }

        Ok(Self {
            base,
            url,
            request_id,
        })
    }

    /// Resolves `url` against `base`. Absolute URLs are returned unchanged.
    pub fn resolve_url(&self, base: &str) -> Result<Url> {
        if let Ok(url) = Url::parse(&self.url) {
            return Ok(url);
        }

        // Url::join drops the last path segment unless the base ends with '/'
        let base = format!("{}/", base.trim_end_matches('/'));
        let base = Url::parse(&base)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid base URL '{}': {}", base, e)))?;
        let url = base
            .join(self.url.trim_start_matches('/'))
            .map_err(|e| ApiError::InvalidRequest(format!("invalid URL '{}': {}", self.url, e)))?;
        Ok(url)
    }
}

impl Deref for CustomRequestConfig {
    type Target = RequestConfig;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}

impl DerefMut for CustomRequestConfig {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.base
    }
}

//! Senler API v2 client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::{
    Client, Method,
    header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::errors::ApiError;
use crate::http::config::mask_token;
use crate::http::{
    ApiConfig, CacheConfig, CacheManager, CustomRequestConfig, HttpClient, RequestCacheConfig,
    RequestConfig, RetryConfig,
};
use crate::logging::LoggingConfig;
use crate::types::{RawResponse, RequestParams};

pub const DEFAULT_USER_AGENT: &str = concat!("senler-api-rust/", env!("SENLER_VERSION"));

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Everything needed to build a [`SenlerApiClientV2`].
#[derive(Debug)]
pub struct ApiClientConfig {
    pub api: ApiConfig,
    /// Defaults to [`RetryConfig::default`]
    pub retry: Option<RetryConfig>,
    /// Defaults to a disabled cache
    pub cache: Option<CacheConfig>,
    /// When set, installed as the process logger on client creation
    pub logging: Option<LoggingConfig>,
    pub user_agent: Option<String>,
}

impl ApiClientConfig {
    pub fn new(api: ApiConfig) -> Self {
        Self {
            api,
            retry: None,
            cache: None,
            logging: None,
            user_agent: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

impl From<ApiConfig> for ApiClientConfig {
    fn from(api: ApiConfig) -> Self {
        Self::new(api)
    }
}

/// Calls API methods by name. Implemented by [`SenlerApiClientV2`];
/// the CLI depends on this trait so it can be tested without a server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SenlerApi: Send + Sync {
    /// Calls `method` (e.g. `subscribers/get`) and returns the undecoded response.
    async fn call_raw(
        &self,
        method: &str,
        params: RequestParams,
        cache: Option<RequestCacheConfig>,
    ) -> Result<RawResponse>;
}

/// Client for the Senler API v2.
///
/// API methods are sent as `POST {endpoint}/{method}` with the parameters as
/// a JSON body. Configured group ids are added to every call unless the
/// caller already set them.
#[derive(Debug)]
pub struct SenlerApiClientV2 {
    api: ApiConfig,
    endpoint: String,
    http_client: HttpClient,
    retry: RetryConfig,
    cache: CacheManager,
}

impl SenlerApiClientV2 {
    #[tracing::instrument(skip(config))]
    pub fn new(config: ApiClientConfig) -> Result<Self> {
        let ApiClientConfig {
            api,
            retry,
            cache,
            logging,
            user_agent,
        } = config;

        api.validate()?;

        if let Some(logging) = logging {
            if let Err(e) = logging.init() {
                debug!("Keeping the already installed logger: {:#}", e);
            }
        }

        let http_client = build_http_client(&api, user_agent.as_deref())?;
        let endpoint = api.endpoint();

        debug!("Senler API client for {} created", endpoint);

        Ok(Self {
            api,
            endpoint,
            http_client,
            retry: retry.unwrap_or_default(),
            cache: CacheManager::new(cache.unwrap_or_default()),
        })
    }

    pub fn config(&self) -> &ApiConfig {
        &self.api
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Versioned API root all method calls are resolved against.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// A fresh correlation id, unique within the process.
    pub fn next_request_id(&self) -> String {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let seq = NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        format!("{:x}-{}", millis, seq)
    }

    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    /// Sends a fully described request, bypassing the cache.
    #[tracing::instrument(skip(self, config), fields(request_id = %config.request_id))]
    pub async fn request<T: DeserializeOwned>(&self, config: CustomRequestConfig) -> Result<T> {
        let response = self
            .http_client
            .execute(&config, &self.endpoint, &self.retry)
            .await?;
        decode(response, &config.url)
    }

    /// Calls an API method, using the cache if the client-wide cache is enabled.
    #[tracing::instrument(skip(self, params))]
    pub async fn call<T, P>(&self, method: &str, params: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let params = to_params(params)?;
        let response = self.call_method(method, params, None).await?;
        decode(response, method)
    }

    /// Calls an API method with per-call cache overrides.
    #[tracing::instrument(skip(self, params, cache))]
    pub async fn call_with_cache<T, P>(
        &self,
        method: &str,
        params: &P,
        cache: &RequestCacheConfig,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized,
    {
        let params = to_params(params)?;
        let response = self.call_method(method, params, Some(cache)).await?;
        decode(response, method)
    }

    async fn call_method(
        &self,
        method: &str,
        mut params: RequestParams,
        cache: Option<&RequestCacheConfig>,
    ) -> Result<RawResponse> {
        let method = method.trim_matches('/');
        if method.is_empty() {
            return Err(ApiError::InvalidRequest("API method must not be empty".into()).into());
        }

        self.api.group_scope().merge_into(&mut params);

        let base = RequestConfig::default()
            .method(Method::POST)
            .json(Value::Object(params));
        let config = CustomRequestConfig::from_base(base, method, self.next_request_id())?;

        if !self.cache.should_cache(cache) {
            return self.execute(&config, method).await;
        }

        let url = config.resolve_url(&self.endpoint)?;
        let key = self.cache.key_for(url.as_str(), &config, cache);

        if let Some(hit) = self.cache.get(&key) {
            debug!("[{}] {} served from cache", config.request_id, method);
            return Ok(hit);
        }

        let response = self.execute(&config, method).await?;
        self.cache
            .set(key, response.clone(), self.cache.ttl_for(cache));
        Ok(response)
    }

    async fn execute(&self, config: &CustomRequestConfig, method: &str) -> Result<RawResponse> {
        self.http_client
            .execute(config, &self.endpoint, &self.retry)
            .await
            .with_context(|| format!("Senler API method {} failed", method))
    }
}

#[async_trait]
impl SenlerApi for SenlerApiClientV2 {
    async fn call_raw(
        &self,
        method: &str,
        params: RequestParams,
        cache: Option<RequestCacheConfig>,
    ) -> Result<RawResponse> {
        self.call_method(method, params, cache.as_ref()).await
    }
}

/// Builds the reqwest client with bearer authentication.
pub fn build_http_client(api: &ApiConfig, user_agent: Option<&str>) -> Result<HttpClient> {
    let mut headers = HeaderMap::new();

    let mut auth_value = HeaderValue::from_str(&format!("Bearer {}", api.access_token))
        .map_err(|_| ApiError::InvalidConfig("access token contains invalid characters".into()))?;
    auth_value.set_sensitive(true);
    headers.insert(AUTHORIZATION, auth_value);
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    debug!(
        "HTTP client configured with token {}",
        mask_token(&api.access_token)
    );

    let client = Client::builder()
        .user_agent(user_agent.unwrap_or(DEFAULT_USER_AGENT))
        .default_headers(headers)
        .build()
        .context("Failed to build HTTP client")?;

    Ok(HttpClient::new(client))
}

fn to_params<P: Serialize + ?Sized>(params: &P) -> Result<RequestParams> {
    match serde_json::to_value(params).context("Failed to serialize request parameters")? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(RequestParams::new()),
        _ => Err(ApiError::InvalidRequest(
            "request parameters must serialize to a JSON object".into(),
        )
        .into()),
    }
}

fn decode<T: DeserializeOwned>(response: RawResponse, what: &str) -> Result<T> {
    serde_json::from_value(response)
        .with_context(|| format!("Failed to decode response of {}", what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    const TOKEN: &str = "test-token-123456";

    fn client_for(url: &str) -> SenlerApiClientV2 {
        client_with(ApiClientConfig::new(ApiConfig::new(TOKEN).with_base_url(url)))
    }

    fn client_with(config: ApiClientConfig) -> SenlerApiClientV2 {
        let config = config.with_retry(RetryConfig::new(2, Duration::from_millis(1)));
        SenlerApiClientV2::new(config).unwrap()
    }

    #[derive(Deserialize, Debug, PartialEq)]
    struct Subscribers {
        success: bool,
        count: u32,
    }

    #[test]
    fn test_new_rejects_empty_token() {
        let err = SenlerApiClientV2::new(ApiClientConfig::new(ApiConfig::new(""))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_new_rejects_token_with_newline() {
        let err =
            SenlerApiClientV2::new(ApiClientConfig::new(ApiConfig::new("abc\ndef"))).unwrap_err();
        assert!(err.to_string().contains("invalid characters"));
    }

    #[test]
    fn test_new_applies_defaults() {
        let client = SenlerApiClientV2::new(ApiConfig::new(TOKEN).into()).unwrap();
        assert_eq!(client.endpoint(), "https://api.senler.ru/v2");
        assert_eq!(*client.retry_config(), RetryConfig::default());
        assert!(!client.cache().is_enabled());
        assert_eq!(client.config().access_token, TOKEN);
    }

    #[test]
    fn test_new_tolerates_installed_logger() {
        for _ in 0..2 {
            let config = ApiClientConfig::new(ApiConfig::new(TOKEN))
                .with_logging(LoggingConfig::default().with_destination(std::io::sink()));
            assert!(SenlerApiClientV2::new(config).is_ok());
        }
    }

    #[test]
    fn test_request_ids_are_unique() {
        let client = SenlerApiClientV2::new(ApiConfig::new(TOKEN).into()).unwrap();
        let ids: HashSet<String> = (0..100).map(|_| client.next_request_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test_log::test(tokio::test)]
    async fn test_call_sends_auth_and_group_scope() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/subscribers/get")
            .match_header("authorization", format!("Bearer {}", TOKEN).as_str())
            .match_header("user-agent", DEFAULT_USER_AGENT)
            .match_header("x-request-id", Matcher::Regex("^[0-9a-f]+-[0-9]+$".into()))
            .match_body(Matcher::Json(
                json!({"count": 10, "vk_group_id": 777, "group_id": 5}),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"success": true, "count": 10}"#)
            .create_async()
            .await;

        let client = client_with(ApiClientConfig::new(
            ApiConfig::new(TOKEN)
                .with_base_url(&url)
                .with_vk_group_id(777)
                .with_group_id(5),
        ));

        let result: Subscribers = client
            .call("subscribers/get", &json!({"count": 10}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(
            result,
            Subscribers {
                success: true,
                count: 10
            }
        );
    }

    #[tokio::test]
    async fn test_call_custom_user_agent_and_version() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v3/stat/get")
            .match_header("user-agent", "my-app/1.0")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_with(
            ApiClientConfig::new(
                ApiConfig::new(TOKEN)
                    .with_base_url(&url)
                    .with_api_version("v3"),
            )
            .with_user_agent("my-app/1.0"),
        );

        let _: Value = client.call("/stat/get/", &json!({})).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_uses_cache_when_enabled() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/subscriptions/get")
            .with_status(200)
            .with_body(r#"{"items": [1, 2, 3]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_with(
            ApiClientConfig::new(ApiConfig::new(TOKEN).with_base_url(&url))
                .with_cache(CacheConfig::with_ttl(Duration::from_secs(60))),
        );

        let first: Value = client.call("subscriptions/get", &json!({})).await.unwrap();
        let second: Value = client.call("subscriptions/get", &json!({})).await.unwrap();

        mock.assert_async().await;
        assert_eq!(first, second);
        assert_eq!(client.cache().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_calls_share_cache() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/subscribers/get")
            .with_status(200)
            .with_body(r#"{"items": [7]}"#)
            .expect_at_least(1)
            .expect_at_most(8)
            .create_async()
            .await;

        let client = std::sync::Arc::new(client_with(
            ApiClientConfig::new(ApiConfig::new(TOKEN).with_base_url(&url))
                .with_cache(CacheConfig::with_ttl(Duration::from_secs(60))),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    client
                        .call::<Value, _>("subscribers/get", &json!({"count": 1}))
                        .await
                })
            })
            .collect();

        for handle in handles {
            let value = handle.await.unwrap().unwrap();
            assert_eq!(value, json!({"items": [7]}));
        }

        // Every miss has been stored by now
        let _: Value = client
            .call("subscribers/get", &json!({"count": 1}))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(client.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_call_with_cache_bypass() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/subscriptions/get")
            .with_status(200)
            .with_body("{}")
            .expect(2)
            .create_async()
            .await;

        let client = client_with(
            ApiClientConfig::new(ApiConfig::new(TOKEN).with_base_url(&url))
                .with_cache(CacheConfig::with_ttl(Duration::from_secs(60))),
        );

        for _ in 0..2 {
            let _: Value = client
                .call_with_cache("subscriptions/get", &json!({}), &RequestCacheConfig::bypass())
                .await
                .unwrap();
        }

        mock.assert_async().await;
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_call_with_cache_enables_per_request() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/mailings/get")
            .with_status(200)
            .with_body("{}")
            .expect(1)
            .create_async()
            .await;

        // Client-wide cache is off by default
        let client = client_for(&url);
        let cache = RequestCacheConfig::with_ttl(Duration::from_secs(30));

        for _ in 0..3 {
            let _: Value = client
                .call_with_cache("mailings/get", &json!({"id": 1}), &cache)
                .await
                .unwrap();
        }

        mock.assert_async().await;

        client.invalidate_cache();
        assert!(client.cache().is_empty());
    }

    #[tokio::test]
    async fn test_call_without_cache_hits_server_each_time() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/mailings/get")
            .with_status(200)
            .with_body("{}")
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&url);
        for _ in 0..2 {
            let _: Value = client.call("mailings/get", &json!({})).await.unwrap();
        }

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_call_errors_are_typed() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/subscribers/get")
            .with_status(401)
            .with_body(r#"{"error": "invalid token"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&url);
        let err = client
            .call::<Value, _>("subscribers/get", &json!({}))
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::AuthenticationFailed(_))
        ));
        assert!(err.to_string().contains("subscribers/get"));
    }

    #[tokio::test]
    async fn test_call_server_errors_are_retried() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/subscribers/get")
            .with_status(502)
            .expect(2)
            .create_async()
            .await;

        let client = client_for(&url);
        let result = client.call::<Value, _>("subscribers/get", &json!({})).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_call_rejects_non_object_params() {
        let client = client_for("http://127.0.0.1:9");
        let err = client
            .call::<Value, _>("subscribers/get", &json!([1, 2]))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ApiError>(),
            Some(ApiError::InvalidRequest(_))
        ));

        let err = client
            .call::<Value, _>("/", &json!({}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("must not be empty"));
    }

    #[tokio::test]
    async fn test_call_accepts_structs_and_unit_params() {
        #[derive(Serialize)]
        struct Params {
            subscription_id: u64,
        }

        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/subscribers/add")
            .match_body(Matcher::Json(json!({"subscription_id": 3})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let client = client_for(&url);
        let _: Value = client
            .call("subscribers/add", &Params { subscription_id: 3 })
            .await
            .unwrap();
        mock.assert_async().await;

        assert!(to_params(&()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_with_custom_config() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/v2/ping")
            .match_header("x-request-id", "custom-id")
            .with_status(200)
            .with_body(r#"{"success": true, "count": 0}"#)
            .create_async()
            .await;

        let client = client_for(&url);
        let config = CustomRequestConfig::new("ping", "custom-id").unwrap();
        let result: Subscribers = client.request(config).await.unwrap();

        mock.assert_async().await;
        assert!(result.success);
    }

    #[tokio::test]
    async fn test_call_raw_through_trait() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("POST", "/v2/vars/get")
            .match_body(Matcher::Json(json!({"name": "x"})))
            .with_status(200)
            .with_body(r#"{"value": 1}"#)
            .create_async()
            .await;

        let client = client_for(&url);
        let api: &dyn SenlerApi = &client;

        let mut params = RequestParams::new();
        params.insert("name".into(), json!("x"));
        let result = api.call_raw("vars/get", params, None).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result, json!({"value": 1}));
    }
}

//! HTTP layer: request configuration, response cache, retry logic and the
//! client that ties them together.

pub mod cache;
mod client;
pub mod config;
mod retry;

pub use cache::{CacheConfig, CacheManager, RequestCacheConfig};
pub use client::{HttpClient, REQUEST_ID_HEADER};
pub use config::{ApiConfig, CustomRequestConfig, RequestConfig, RetryConfig};
pub use retry::{MAX_RETRIES, RETRY_DELAY_MS, classify_status, is_retryable_error};

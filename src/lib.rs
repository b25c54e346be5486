//! Client for the Senler API v2.
//!
//! ```rust,no_run
//! use senler_api::{ApiClientConfig, ApiConfig, CacheConfig, SenlerApiClientV2};
//! use serde_json::{Value, json};
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let api = ApiConfig::new("access-token").with_vk_group_id(123456);
//! let client = SenlerApiClientV2::new(
//!     ApiClientConfig::new(api).with_cache(CacheConfig::with_ttl(Duration::from_secs(30))),
//! )?;
//!
//! let subscribers: Value = client.call("subscribers/get", &json!({"count": 10})).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod errors;
pub mod http;
pub mod logging;
pub mod runtime;
pub mod types;

pub use client::{ApiClientConfig, SenlerApiClientV2};

// Request, response and other data types
pub use types::*;

// Configuration
pub use http::{ApiConfig, CustomRequestConfig, RetryConfig};
pub use logging::LoggingConfig;
pub use http::{CacheConfig, CacheManager, RequestCacheConfig};

// Errors
pub use errors::ApiError;

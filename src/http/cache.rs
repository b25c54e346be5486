//! In-memory response cache.

use log::debug;
use moka::Expiry;
use moka::notification::RemovalCause;
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::config::RequestConfig;
use crate::types::RawResponse;

/// Entries with a longer lifetime are kept until evicted or removed.
pub const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// Client-wide cache settings.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lifetime of an entry unless the request overrides it, e.g. `"90s"`
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ttl: Duration::from_secs(60),
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            enabled: true,
            ttl,
            ..Default::default()
        }
    }
}

/// Cache overrides for a single call.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct RequestCacheConfig {
    pub enabled: Option<bool>,
    #[serde(with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Explicit cache key instead of one derived from the request
    pub key: Option<String>,
}

impl RequestCacheConfig {
    pub fn bypass() -> Self {
        Self {
            enabled: Some(false),
            ..Default::default()
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            enabled: Some(true),
            ttl: Some(ttl),
            key: None,
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: RawResponse,
    /// `None` never expires
    ttl: Option<Duration>,
}

/// Per-entry lifetimes: each entry expires `ttl` after it was last written.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        entry.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        entry.ttl
    }
}

/// Thread-safe TTL cache of decoded responses, bounded by
/// [`CacheConfig::max_entries`].
pub struct CacheManager {
    config: CacheConfig,
    entries: Cache<String, CacheEntry>,
    expired: Arc<AtomicUsize>,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&expired);

        let entries = Cache::builder()
            .max_capacity(config.max_entries as u64)
            .expire_after(EntryExpiry)
            .eviction_listener(move |key, _entry, cause| match cause {
                RemovalCause::Expired => {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
                RemovalCause::Size => debug!("Cache full, evicted {}", key),
                _ => {}
            })
            .build();

        Self {
            config,
            entries,
            expired,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Whether a call with these overrides goes through the cache.
    pub fn should_cache(&self, request: Option<&RequestCacheConfig>) -> bool {
        request
            .and_then(|r| r.enabled)
            .unwrap_or(self.config.enabled)
    }

    pub fn ttl_for(&self, request: Option<&RequestCacheConfig>) -> Duration {
        request.and_then(|r| r.ttl).unwrap_or(self.config.ttl)
    }

    /// Cache key of a request: the explicit key if one is given, otherwise
    /// method, URL, query and body.
    pub fn key_for(
        &self,
        url: &str,
        request: &RequestConfig,
        overrides: Option<&RequestCacheConfig>,
    ) -> String {
        if let Some(key) = overrides.and_then(|r| r.key.as_ref()) {
            return key.clone();
        }

        let query = request
            .params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let body = request
            .data
            .as_ref()
            .map(|d| d.to_string())
            .unwrap_or_default();

        format!("{} {}?{}#{}", request.method, url, query, body)
    }

    pub fn get(&self, key: &str) -> Option<RawResponse> {
        let hit = self.entries.get(key).map(|entry| entry.value);
        if hit.is_some() {
            debug!("Cache hit: {}", key);
        }
        hit
    }

    /// Stores `value` for `ttl`. A zero ttl stores nothing.
    pub fn set(&self, key: impl Into<String>, value: RawResponse, ttl: Duration) {
        if ttl.is_zero() || self.config.max_entries == 0 {
            return;
        }

        let ttl = (ttl <= MAX_TTL).then_some(ttl);
        self.entries.insert(key.into(), CacheEntry { value, ttl });
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        for (key, _) in self.entries.iter() {
            self.entries.invalidate(key.as_str());
        }
        self.entries.run_pending_tasks();
    }

    /// Drops expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.expired.load(Ordering::Relaxed);
        self.entries.run_pending_tasks();
        self.expired.load(Ordering::Relaxed) - before
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

impl fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("entries", &self.entries.entry_count())
            .finish()
    }
}

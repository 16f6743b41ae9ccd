//! Keyed store for large tool results passed by reference

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use chain_core::ToolName;
use chain_utils::EngineConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Hex characters after the timestamp in a generated key
const KEY_SUFFIX_LEN: usize = 9;

/// Whether `value` is `prefix` + digits + `_` + 9 lowercase hex characters
pub fn has_key_shape(prefix: &str, value: &str) -> bool {
    let Some((millis, suffix)) = value
        .strip_prefix(prefix)
        .and_then(|rest| rest.split_once('_'))
    else {
        return false;
    };
    !millis.is_empty()
        && millis.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == KEY_SUFFIX_LEN
        && suffix.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// A cached tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Generated key
    pub key: String,
    /// Materialized payload
    pub data: Value,
    /// When the entry was created
    pub timestamp: DateTime<Utc>,
    /// Tool that produced the payload
    pub producer: ToolName,
}

impl CacheEntry {
    /// Create an entry stamped with the current time
    pub fn new(key: impl Into<String>, data: Value, producer: ToolName) -> Self {
        Self {
            key: key.into(),
            data,
            timestamp: Utc::now(),
            producer,
        }
    }

    /// Whether the entry is older than `ttl`
    pub fn is_expired(&self, ttl: Duration) -> bool {
        (Utc::now() - self.timestamp)
            .to_std()
            .is_ok_and(|age| age > ttl)
    }
}

/// Storage behind the [`ResultCache`]
///
/// Implementations must make `take` atomic per key so a key is consumed at
/// most once even when several runs share a store.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyedStore: Send + Sync {
    /// Insert or replace an entry
    async fn put(&self, entry: CacheEntry);

    /// Read an entry without consuming it
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Read and delete an entry in one step
    async fn take(&self, key: &str) -> Option<CacheEntry>;

    /// Delete an entry, returning whether it existed
    async fn delete(&self, key: &str) -> bool;

    /// Drop expired entries, returning how many were dropped
    async fn purge_expired(&self) -> usize;

    /// Drop every entry
    async fn clear(&self);

    /// Number of stored entries, expired ones included until purged
    async fn len(&self) -> usize;
}

/// In-memory [`KeyedStore`] whose entries expire after a fixed lifespan
pub struct TimedStore {
    cache: Arc<RwLock<TimedCache<String, CacheEntry>>>,
    ttl: Duration,
}

impl TimedStore {
    /// Create a store with the given entry lifespan
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(RwLock::new(TimedCache::with_lifespan(ttl))),
            ttl,
        }
    }
}

impl Clone for TimedStore {
    fn clone(&self) -> Self {
        Self {
            cache: Arc::clone(&self.cache),
            ttl: self.ttl,
        }
    }
}

#[async_trait]
impl KeyedStore for TimedStore {
    async fn put(&self, entry: CacheEntry) {
        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(entry.key.clone(), entry);
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let mut cache = self.cache.write().await;
        cache
            .cache_get(&key.to_owned())
            .filter(|entry| !entry.is_expired(self.ttl))
            .cloned()
    }

    async fn take(&self, key: &str) -> Option<CacheEntry> {
        let mut cache = self.cache.write().await;
        cache
            .cache_remove(&key.to_owned())
            .filter(|entry| !entry.is_expired(self.ttl))
    }

    async fn delete(&self, key: &str) -> bool {
        let mut cache = self.cache.write().await;
        cache.cache_remove(&key.to_owned()).is_some()
    }

    async fn purge_expired(&self) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.cache_size();
        cache.flush();
        before.saturating_sub(cache.cache_size())
    }

    async fn clear(&self) {
        let mut cache = self.cache.write().await;
        cache.cache_clear();
    }

    async fn len(&self) -> usize {
        let cache = self.cache.read().await;
        cache.cache_size()
    }
}

/// Cache of large results addressed by generated, single-use keys
///
/// Keys look like `{prefix}{unix_millis}_{random}`. The cache is injected
/// into the dispatcher rather than living in a global, so tests and
/// separate engines get separate stores.
#[derive(Clone)]
pub struct ResultCache {
    store: Arc<dyn KeyedStore>,
    prefix: String,
}

impl ResultCache {
    /// Create a cache over `store`
    pub fn new(store: Arc<dyn KeyedStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
        }
    }

    /// Create a [`TimedStore`]-backed cache from the engine configuration
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            Arc::new(TimedStore::new(config.cache_ttl)),
            config.cache_key_prefix.clone(),
        )
    }

    /// Key prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Generate a fresh key: `prefix` + epoch millis + `_` + random hex
    pub fn generate_key(&self) -> String {
        let suffix = Uuid::new_v4().simple().to_string();
        format!(
            "{}{}_{}",
            self.prefix,
            Utc::now().timestamp_millis(),
            &suffix[..KEY_SUFFIX_LEN]
        )
    }

    /// Whether `value` has the shape of a key this cache generates
    pub fn is_cache_key(&self, value: &str) -> bool {
        has_key_shape(&self.prefix, value)
    }

    /// Store `data` under a fresh key and return the key
    pub async fn store(&self, producer: ToolName, data: Value) -> String {
        let key = self.generate_key();
        debug!(key = %key, producer = %producer, "Caching tool result");
        self.store.put(CacheEntry::new(key.clone(), data, producer)).await;
        key
    }

    /// Read a payload without consuming it
    pub async fn peek(&self, key: &str) -> Option<Value> {
        self.store.get(key).await.map(|entry| entry.data)
    }

    /// Consume an entry; the key is unreadable afterwards
    pub async fn take(&self, key: &str) -> Option<CacheEntry> {
        self.store.take(key).await
    }

    /// Delete an entry without reading it
    pub async fn delete(&self, key: &str) -> bool {
        self.store.delete(key).await
    }

    /// Drop expired entries
    pub async fn purge_expired(&self) -> usize {
        self.store.purge_expired().await
    }

    /// Drop every entry
    pub async fn clear(&self) {
        self.store.clear().await;
    }

    /// Number of stored entries
    pub async fn len(&self) -> usize {
        self.store.len().await
    }

    /// Check if the cache is empty
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

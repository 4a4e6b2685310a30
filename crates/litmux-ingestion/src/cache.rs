//! Result cache for upstream search responses.
//!
//! Values are stored as JSON text behind the [`CacheStore`] trait, with an
//! in-process moka store and, behind the `redis` feature, a Redis store.
//! [`ResultCache`] never returns an error: backend failures degrade to a
//! miss (or a no-op write) and are counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use litmux_common::config::{BackendKind, CacheConfig};
use litmux_common::LitmuxError;
use moka::future::Cache;
use moka::Expiry;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, LitmuxError>;

/// Key/value backend with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    fn backend(&self) -> &'static str;
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn del(&self, key: &str) -> Result<bool>;
    async fn has(&self, key: &str) -> Result<bool>;
    async fn flush(&self) -> Result<()>;
    async fn len(&self) -> Result<u64>;
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: String,
    pub ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, CacheEntry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &CacheEntry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process store: bounded moka cache, each entry expiring after its own TTL.
pub struct MemoryCacheStore {
    inner: Cache<String, CacheEntry>,
}

impl MemoryCacheStore {
    pub fn new(max_entries: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(PerEntryTtl)
            .build();
        Self { inner }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner.get(key).await.map(|e| e.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let entry = CacheEntry { value, ttl };
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool> {
        Ok(self.inner.remove(key).await.is_some())
    }

    async fn has(&self, key: &str) -> Result<bool> {
        Ok(self.inner.get(key).await.is_some())
    }

    async fn flush(&self) -> Result<()> {
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
        Ok(())
    }

    async fn len(&self) -> Result<u64> {
        self.inner.run_pending_tasks().await;
        Ok(self.inner.entry_count())
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisCacheStore;
#[cfg(feature = "redis")]
pub(crate) use self::redis_store::scan_keys;

#[cfg(feature = "redis")]
mod redis_store {
    use super::*;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;

    const PREFIX: &str = "litmux:cache:";

    fn cache_err(e: redis::RedisError) -> LitmuxError {
        LitmuxError::Cache(e.to_string())
    }

    /// Cursor-based key listing; never blocks the server the way KEYS does.
    pub(crate) async fn scan_keys(conn: &mut ConnectionManager, pattern: &str) -> redis::RedisResult<Vec<String>> {
        let mut iter = conn.scan_match::<_, String>(pattern).await?;
        let mut keys = Vec::new();
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    /// Redis-backed store; TTL is enforced by Redis key expiry.
    pub struct RedisCacheStore {
        conn: ConnectionManager,
    }

    impl RedisCacheStore {
        pub async fn connect(url: &str) -> Result<Self> {
            let client = redis::Client::open(url).map_err(cache_err)?;
            let conn = ConnectionManager::new(client).await.map_err(cache_err)?;
            Ok(Self { conn })
        }

        fn key(key: &str) -> String {
            format!("{PREFIX}{key}")
        }

        async fn keys(&self) -> Result<Vec<String>> {
            let mut conn = self.conn.clone();
            scan_keys(&mut conn, &format!("{PREFIX}*")).await.map_err(cache_err)
        }
    }

    #[async_trait]
    impl CacheStore for RedisCacheStore {
        fn backend(&self) -> &'static str {
            "redis"
        }

        async fn get(&self, key: &str) -> Result<Option<String>> {
            let mut conn = self.conn.clone();
            conn.get(Self::key(key)).await.map_err(cache_err)
        }

        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
            let mut conn = self.conn.clone();
            let secs = ttl.as_secs().max(1);
            conn.set_ex::<_, _, ()>(Self::key(key), value, secs).await.map_err(cache_err)
        }

        async fn del(&self, key: &str) -> Result<bool> {
            let mut conn = self.conn.clone();
            let removed: i64 = conn.del(Self::key(key)).await.map_err(cache_err)?;
            Ok(removed > 0)
        }

        async fn has(&self, key: &str) -> Result<bool> {
            let mut conn = self.conn.clone();
            conn.exists(Self::key(key)).await.map_err(cache_err)
        }

        async fn flush(&self) -> Result<()> {
            let keys = self.keys().await?;
            if keys.is_empty() {
                return Ok(());
            }
            let mut conn = self.conn.clone();
            conn.del::<_, ()>(keys).await.map_err(cache_err)
        }

        async fn len(&self) -> Result<u64> {
            Ok(self.keys().await?.len() as u64)
        }
    }
}

/// Cache counters reported by the status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub backend: &'static str,
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    pub entries: u64,
    pub hit_rate: f64,
}

/// Typed, infallible facade over a [`CacheStore`].
///
/// When the primary store is remote, a memory store with the same limits
/// serves any operation the primary fails.
pub struct ResultCache {
    primary: Arc<dyn CacheStore>,
    fallback: Option<MemoryCacheStore>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

impl ResultCache {
    pub fn new(primary: Arc<dyn CacheStore>, fallback: Option<MemoryCacheStore>, default_ttl: Duration) -> Self {
        Self {
            primary,
            fallback,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    pub fn memory(max_entries: u64, default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryCacheStore::new(max_entries)), None, default_ttl)
    }

    /// Builds the configured backend. A Redis backend that cannot be
    /// reached (or is not compiled in) is replaced by the memory store.
    pub async fn from_config(config: &CacheConfig) -> Self {
        if config.backend == BackendKind::Redis {
            #[cfg(feature = "redis")]
            {
                let url = config.url.as_deref().unwrap_or_default();
                match RedisCacheStore::connect(url).await {
                    Ok(store) => {
                        info!("result cache using redis");
                        return Self::new(
                            Arc::new(store),
                            Some(MemoryCacheStore::new(config.max_entries)),
                            config.ttl(),
                        );
                    }
                    Err(e) => warn!(error = %e, "redis cache unreachable, using memory store"),
                }
            }
            #[cfg(not(feature = "redis"))]
            warn!("redis cache configured but the redis feature is not enabled, using memory store");
        }
        Self::memory(config.max_entries, config.ttl())
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    fn record_error(&self, op: &str, key: &str, e: &LitmuxError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, key, backend = self.primary.backend(), error = %e, "cache backend error");
    }

    async fn raw_get(&self, key: &str) -> Option<String> {
        match self.primary.get(key).await {
            Ok(v) => v,
            Err(e) => {
                self.record_error("get", key, &e);
                match &self.fallback {
                    Some(f) => f.get(key).await.ok().flatten(),
                    None => None,
                }
            }
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(raw) = self.raw_get(key).await else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, "cache miss");
            return None;
        };
        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key, "cache hit");
                Some(value)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                warn!(key, error = %e, "discarding undecodable cache entry");
                self.del(key).await;
                None
            }
        }
    }

    /// Stores `value`; `ttl` defaults to the configured TTL. Returns
    /// whether the value was stored.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> bool {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "value not cacheable");
                return false;
            }
        };
        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.primary.set(key, raw.clone(), ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.record_error("set", key, &e);
                match &self.fallback {
                    Some(f) => f.set(key, raw, ttl).await.is_ok(),
                    None => false,
                }
            }
        }
    }

    pub async fn del(&self, key: &str) -> bool {
        let mut removed = false;
        if let Some(f) = &self.fallback {
            removed = f.del(key).await.unwrap_or(false);
        }
        match self.primary.del(key).await {
            Ok(r) => r || removed,
            Err(e) => {
                self.record_error("del", key, &e);
                removed
            }
        }
    }

    pub async fn has(&self, key: &str) -> bool {
        match self.primary.has(key).await {
            Ok(found) => found,
            Err(e) => {
                self.record_error("has", key, &e);
                match &self.fallback {
                    Some(f) => f.has(key).await.unwrap_or(false),
                    None => false,
                }
            }
        }
    }

    /// Drops every entry. Returns false if the primary store failed.
    pub async fn flush(&self) -> bool {
        if let Some(f) = &self.fallback {
            let _ = f.flush().await;
        }
        match self.primary.flush().await {
            Ok(()) => {
                info!(backend = self.primary.backend(), "result cache flushed");
                true
            }
            Err(e) => {
                self.record_error("flush", "*", &e);
                false
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let entries = match self.primary.len().await {
            Ok(n) => n,
            Err(e) => {
                self.record_error("len", "*", &e);
                0
            }
        };
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            backend: self.primary.backend(),
            hits,
            misses,
            errors: self.errors.load(Ordering::Relaxed),
            entries,
            hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use litmux_test_utils::ArticleBuilder;
    use litmux_common::Article;

    /// A store whose every operation fails.
    struct DownStore;

    #[async_trait]
    impl CacheStore for DownStore {
        fn backend(&self) -> &'static str { "down" }
        async fn get(&self, _: &str) -> Result<Option<String>> { Err(LitmuxError::Cache("down".into())) }
        async fn set(&self, _: &str, _: String, _: Duration) -> Result<()> { Err(LitmuxError::Cache("down".into())) }
        async fn del(&self, _: &str) -> Result<bool> { Err(LitmuxError::Cache("down".into())) }
        async fn has(&self, _: &str) -> Result<bool> { Err(LitmuxError::Cache("down".into())) }
        async fn flush(&self) -> Result<()> { Err(LitmuxError::Cache("down".into())) }
        async fn len(&self) -> Result<u64> { Err(LitmuxError::Cache("down".into())) }
    }

    #[tokio::test]
    async fn test_set_then_get_roundtrips_articles() {
        let cache = ResultCache::memory(100, Duration::from_secs(60));
        let articles = vec![ArticleBuilder::new("pubmed-1").title("One").build()];
        assert!(cache.set("k", &articles, None).await);
        let got: Option<Vec<Article>> = cache.get("k").await;
        assert_eq!(got, Some(articles));
        assert!(cache.has("k").await);
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = ResultCache::memory(100, Duration::from_secs(60));
        cache.set("short", &"v", Some(Duration::from_millis(50))).await;
        assert_eq!(cache.get::<String>("short").await.as_deref(), Some("v"));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.get::<String>("short").await, None);
        assert!(!cache.has("short").await);
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_value() {
        let cache = ResultCache::memory(100, Duration::from_secs(60));
        cache.set("k", &1u32, None).await;
        cache.set("k", &2u32, None).await;
        assert_eq!(cache.get::<u32>("k").await, Some(2));
    }

    #[tokio::test]
    async fn test_del_and_flush() {
        let cache = ResultCache::memory(100, Duration::from_secs(60));
        cache.set("a", &1u32, None).await;
        cache.set("b", &2u32, None).await;
        assert!(cache.del("a").await);
        assert!(!cache.del("a").await);
        assert!(cache.flush().await);
        assert_eq!(cache.get::<u32>("b").await, None);
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_stats_count_hits_and_misses() {
        let cache = ResultCache::memory(100, Duration::from_secs(60));
        cache.set("a", &1u32, None).await;
        cache.get::<u32>("a").await;
        cache.get::<u32>("a").await;
        cache.get::<u32>("missing").await;
        let stats = cache.stats().await;
        assert_eq!((stats.hits, stats.misses), (2, 1));
        assert_eq!(stats.backend, "memory");
        assert_eq!(stats.entries, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_type_mismatch_is_a_miss() {
        let cache = ResultCache::memory(100, Duration::from_secs(60));
        cache.set("k", &"not a number", None).await;
        assert_eq!(cache.get::<u32>("k").await, None);
        assert!(!cache.has("k").await);
    }

    #[tokio::test]
    async fn test_failing_backend_never_errors() {
        let cache = ResultCache::new(Arc::new(DownStore), None, Duration::from_secs(60));
        assert!(!cache.set("k", &1u32, None).await);
        assert_eq!(cache.get::<u32>("k").await, None);
        assert!(!cache.has("k").await);
        assert!(!cache.del("k").await);
        assert!(!cache.flush().await);
        let stats = cache.stats().await;
        assert!(stats.errors >= 5);
    }

    #[tokio::test]
    async fn test_failing_backend_degrades_to_memory() {
        let cache = ResultCache::new(
            Arc::new(DownStore),
            Some(MemoryCacheStore::new(10)),
            Duration::from_secs(60),
        );
        assert!(cache.set("k", &7u32, None).await);
        assert_eq!(cache.get::<u32>("k").await, Some(7));
        assert!(cache.has("k").await);
    }

    #[tokio::test]
    async fn test_redis_without_feature_or_server_uses_memory() {
        let config = CacheConfig {
            backend: BackendKind::Redis,
            url: Some("redis://127.0.0.1:1/".into()),
            ..CacheConfig::default()
        };
        let cache = ResultCache::from_config(&config).await;
        assert_eq!(cache.stats().await.backend, "memory");
    }
}

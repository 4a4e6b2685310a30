//! Fixed-window rate limiting per (service, identifier).
//!
//! Each permitted call increments the window counter. The call that would
//! exceed `max_requests` is denied and blocks the key for
//! `block_duration_ms`; the window is stretched to cover the block, so the
//! key is released (counter and block cleared) once `reset_time` passes.
//!
//! When the state store cannot be consulted the limiter applies
//! `rate_limits.fail_open`: allow (default) or deny.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use litmux_common::config::{BackendKind, RateLimitRule, RateLimitsConfig};
use litmux_common::LitmuxError;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub type Result<T> = std::result::Result<T, LitmuxError>;

/// Identifier used when a caller does not partition a service's budget.
pub const GLOBAL: &str = "global";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RateLimitKey {
    pub service: String,
    pub identifier: String,
}

impl RateLimitKey {
    pub fn new(service: &str, identifier: &str) -> Self {
        Self { service: service.to_string(), identifier: identifier.to_string() }
    }
}

/// A key's counter as seen by one store operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyState {
    pub key: RateLimitKey,
    pub count: u32,
    pub blocked: bool,
    /// Time until the window (and any block) ends.
    pub reset_in: Duration,
}

/// Counter storage. `hit` must be atomic per key.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    fn backend(&self) -> &'static str;
    /// Records one request and returns the resulting state; the request
    /// was permitted iff the state is not blocked.
    async fn hit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<KeyState>;
    /// Current state without counting a request; `None` for unseen or
    /// expired keys.
    async fn peek(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<Option<KeyState>>;
    /// Clears one service's keys, or every key.
    async fn reset(&self, service: Option<&str>) -> Result<()>;
    async fn snapshot(&self) -> Result<Vec<KeyState>>;
}

#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub count: u32,
    pub window_start: Instant,
    pub reset_time: Instant,
    pub blocked: bool,
    pub block_end_time: Option<Instant>,
}

impl RateLimitState {
    fn fresh(now: Instant, rule: &RateLimitRule) -> Self {
        Self {
            count: 0,
            window_start: now,
            reset_time: now + rule.window(),
            blocked: false,
            block_end_time: None,
        }
    }

    fn expired(&self, now: Instant) -> bool {
        now >= self.reset_time
    }

    fn view(&self, key: &RateLimitKey, now: Instant) -> KeyState {
        KeyState {
            key: key.clone(),
            count: self.count,
            blocked: self.blocked,
            reset_in: self.reset_time.saturating_duration_since(now),
        }
    }
}

/// In-process store guarded by a mutex; tokio's clock so tests can pause time.
#[derive(Default)]
pub struct MemoryRateLimitStore {
    states: Mutex<HashMap<RateLimitKey, RateLimitState>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<RateLimitKey, RateLimitState>>> {
        self.states
            .lock()
            .map_err(|_| LitmuxError::RateLimit("rate limit state lock poisoned".into()))
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn hit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<KeyState> {
        let now = Instant::now();
        let mut states = self.lock()?;
        let state = states
            .entry(key.clone())
            .or_insert_with(|| RateLimitState::fresh(now, rule));

        if state.expired(now) {
            *state = RateLimitState::fresh(now, rule);
        }
        if !state.blocked {
            if state.count < rule.max_requests {
                state.count += 1;
            } else {
                let block_end = now + rule.block_duration();
                state.blocked = true;
                state.block_end_time = Some(block_end);
                state.reset_time = state.reset_time.max(block_end);
            }
        }
        Ok(state.view(key, now))
    }

    async fn peek(&self, key: &RateLimitKey, _rule: &RateLimitRule) -> Result<Option<KeyState>> {
        let now = Instant::now();
        let states = self.lock()?;
        Ok(states
            .get(key)
            .filter(|s| !s.expired(now))
            .map(|s| s.view(key, now)))
    }

    async fn reset(&self, service: Option<&str>) -> Result<()> {
        let mut states = self.lock()?;
        match service {
            Some(service) => states.retain(|k, _| k.service != service),
            None => states.clear(),
        }
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<KeyState>> {
        let now = Instant::now();
        let states = self.lock()?;
        let mut out: Vec<KeyState> = states
            .iter()
            .filter(|(_, s)| !s.expired(now))
            .map(|(k, s)| s.view(k, now))
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }
}

#[cfg(feature = "redis")]
pub use self::redis_store::RedisRateLimitStore;

#[cfg(feature = "redis")]
mod redis_store {
    use super::*;
    use redis::aio::ConnectionManager;
    use redis::AsyncCommands;

    use crate::cache::scan_keys;

    const PREFIX: &str = "litmux:rl:";
    const BLOCK_SUFFIX: &str = ":block";

    fn rl_err(e: redis::RedisError) -> LitmuxError {
        LitmuxError::RateLimit(e.to_string())
    }

    fn ms(pttl: i64) -> Duration {
        Duration::from_millis(pttl.max(0) as u64)
    }

    /// Creates the window counter with its expiry (if absent) and counts the
    /// hit in one MULTI/EXEC, so a counter never exists without a TTL.
    /// Replies: (count, counter pttl).
    pub(super) fn window_pipeline(counter: &str, window_ms: u64) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("SET").arg(counter).arg(0).arg("NX").arg("PX").arg(window_ms).ignore()
            .incr(counter, 1)
            .pttl(counter);
        pipe
    }

    /// Redis store: an expiring counter per window, a separate PX key for blocks.
    pub struct RedisRateLimitStore {
        conn: ConnectionManager,
    }

    impl RedisRateLimitStore {
        pub async fn connect(url: &str) -> Result<Self> {
            let client = redis::Client::open(url).map_err(rl_err)?;
            let conn = ConnectionManager::new(client).await.map_err(rl_err)?;
            Ok(Self { conn })
        }

        fn counter_key(key: &RateLimitKey) -> String {
            format!("{PREFIX}{}:{}", key.service, key.identifier)
        }

        async fn read(&self, key: &RateLimitKey) -> Result<Option<KeyState>> {
            let mut conn = self.conn.clone();
            let counter = Self::counter_key(key);
            let block = format!("{counter}{BLOCK_SUFFIX}");
            let count: Option<u32> = conn.get(&counter).await.map_err(rl_err)?;
            let counter_ttl: i64 = conn.pttl(&counter).await.map_err(rl_err)?;
            let block_ttl: i64 = conn.pttl(&block).await.map_err(rl_err)?;
            if count.is_none() && block_ttl <= 0 {
                return Ok(None);
            }
            Ok(Some(KeyState {
                key: key.clone(),
                count: count.unwrap_or(0),
                blocked: block_ttl > 0,
                reset_in: ms(counter_ttl.max(block_ttl)),
            }))
        }
    }

    #[async_trait]
    impl RateLimitStore for RedisRateLimitStore {
        fn backend(&self) -> &'static str {
            "redis"
        }

        async fn hit(&self, key: &RateLimitKey, rule: &RateLimitRule) -> Result<KeyState> {
            let mut conn = self.conn.clone();
            let counter = Self::counter_key(key);
            let block = format!("{counter}{BLOCK_SUFFIX}");

            let block_ttl: i64 = conn.pttl(&block).await.map_err(rl_err)?;
            if block_ttl > 0 {
                return Ok(KeyState {
                    key: key.clone(),
                    count: rule.max_requests,
                    blocked: true,
                    reset_in: ms(block_ttl),
                });
            }

            let (count, counter_ttl): (u32, i64) = window_pipeline(&counter, rule.window_ms)
                .query_async(&mut conn)
                .await
                .map_err(rl_err)?;

            if count > rule.max_requests {
                redis::cmd("SET")
                    .arg(&block)
                    .arg(1)
                    .arg("PX")
                    .arg(rule.block_duration_ms)
                    .query_async::<_, ()>(&mut conn)
                    .await
                    .map_err(rl_err)?;
                return Ok(KeyState {
                    key: key.clone(),
                    count: rule.max_requests,
                    blocked: true,
                    reset_in: ms(counter_ttl).max(rule.block_duration()),
                });
            }
            Ok(KeyState { key: key.clone(), count, blocked: false, reset_in: ms(counter_ttl) })
        }

        async fn peek(&self, key: &RateLimitKey, _rule: &RateLimitRule) -> Result<Option<KeyState>> {
            self.read(key).await
        }

        async fn reset(&self, service: Option<&str>) -> Result<()> {
            let mut conn = self.conn.clone();
            let pattern = match service {
                Some(s) => format!("{PREFIX}{s}:*"),
                None => format!("{PREFIX}*"),
            };
            let keys = scan_keys(&mut conn, &pattern).await.map_err(rl_err)?;
            if !keys.is_empty() {
                conn.del::<_, ()>(keys).await.map_err(rl_err)?;
            }
            Ok(())
        }

        async fn snapshot(&self) -> Result<Vec<KeyState>> {
            let mut conn = self.conn.clone();
            let keys = scan_keys(&mut conn, &format!("{PREFIX}*")).await.map_err(rl_err)?;
            let mut out = Vec::new();
            for raw in keys.iter().filter(|k| !k.ends_with(BLOCK_SUFFIX)) {
                let Some((service, identifier)) = raw[PREFIX.len()..].split_once(':') else { continue };
                if let Some(state) = self.read(&RateLimitKey::new(service, identifier)).await? {
                    out.push(state);
                }
            }
            out.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(out)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStats {
    pub identifier: String,
    pub count: u32,
    pub remaining: u32,
    pub blocked: bool,
    pub reset_in_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub rule: RateLimitRule,
    pub keys: Vec<KeyStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitStats {
    pub backend: &'static str,
    pub fail_open: bool,
    pub services: BTreeMap<String, ServiceStats>,
}

pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    config: RwLock<RateLimitsConfig>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, config: RateLimitsConfig) -> Self {
        Self { store, config: RwLock::new(config) }
    }

    pub fn memory(config: RateLimitsConfig) -> Self {
        Self::new(Arc::new(MemoryRateLimitStore::new()), config)
    }

    /// Builds the configured store, using the memory store when Redis is
    /// unreachable or not compiled in.
    pub async fn from_config(config: RateLimitsConfig) -> Self {
        if config.backend == BackendKind::Redis {
            #[cfg(feature = "redis")]
            {
                let url = config.url.clone().unwrap_or_default();
                match RedisRateLimitStore::connect(&url).await {
                    Ok(store) => {
                        info!("rate limiter using redis");
                        return Self::new(Arc::new(store), config);
                    }
                    Err(e) => warn!(error = %e, "redis rate limit store unreachable, using memory store"),
                }
            }
            #[cfg(not(feature = "redis"))]
            warn!("redis rate limiting configured but the redis feature is not enabled, using memory store");
        }
        Self::memory(config)
    }

    fn config(&self) -> std::sync::RwLockReadGuard<'_, RateLimitsConfig> {
        self.config.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn rule(&self, service: &str) -> RateLimitRule {
        self.config().rule_for(service)
    }

    pub fn fail_open(&self) -> bool {
        self.config().fail_open
    }

    /// Replaces one service's limits for subsequent windows.
    pub fn configure(&self, service: &str, rule: RateLimitRule) {
        let mut config = self.config.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        config.services.insert(service.to_string(), rule);
    }

    pub async fn is_allowed(&self, service: &str, identifier: &str) -> bool {
        let key = RateLimitKey::new(service, identifier);
        let rule = self.rule(service);
        match self.store.hit(&key, &rule).await {
            Ok(state) => {
                if state.blocked {
                    debug!(service, identifier, reset_in_ms = state.reset_in.as_millis() as u64, "rate limited");
                }
                !state.blocked
            }
            Err(e) => {
                let allow = self.fail_open();
                warn!(service, identifier, error = %e, allow, "rate limit state unavailable");
                allow
            }
        }
    }

    pub async fn get_remaining_requests(&self, service: &str, identifier: &str) -> u32 {
        let key = RateLimitKey::new(service, identifier);
        let rule = self.rule(service);
        match self.store.peek(&key, &rule).await {
            Ok(Some(state)) if state.blocked => 0,
            Ok(Some(state)) => rule.max_requests.saturating_sub(state.count),
            Ok(None) => rule.max_requests,
            Err(e) => {
                warn!(service, identifier, error = %e, "rate limit state unavailable");
                if self.fail_open() { rule.max_requests } else { 0 }
            }
        }
    }

    /// Time until the key's window resets; `None` if the key has no live window.
    pub async fn get_reset_time(&self, service: &str, identifier: &str) -> Option<Duration> {
        let key = RateLimitKey::new(service, identifier);
        let rule = self.rule(service);
        match self.store.peek(&key, &rule).await {
            Ok(state) => state.map(|s| s.reset_in),
            Err(e) => {
                warn!(service, identifier, error = %e, "rate limit state unavailable");
                None
            }
        }
    }

    /// Clears counters for one service, or all services.
    pub async fn reset_limits(&self, service: Option<&str>) -> bool {
        match self.store.reset(service).await {
            Ok(()) => {
                info!(service = service.unwrap_or("*"), "rate limits reset");
                true
            }
            Err(e) => {
                warn!(error = %e, "failed to reset rate limits");
                false
            }
        }
    }

    pub async fn stats(&self) -> RateLimitStats {
        let states = self.store.snapshot().await.unwrap_or_else(|e| {
            warn!(error = %e, "rate limit snapshot failed");
            vec![]
        });
        let config = self.config().clone();

        let mut services: BTreeMap<String, ServiceStats> = config
            .services
            .iter()
            .map(|(name, rule)| (name.clone(), ServiceStats { rule: *rule, keys: vec![] }))
            .collect();

        for state in states {
            let rule = config.rule_for(&state.key.service);
            let remaining = if state.blocked { 0 } else { rule.max_requests.saturating_sub(state.count) };
            services
                .entry(state.key.service.clone())
                .or_insert_with(|| ServiceStats { rule, keys: vec![] })
                .keys
                .push(KeyStats {
                    identifier: state.key.identifier,
                    count: state.count,
                    remaining,
                    blocked: state.blocked,
                    reset_in_ms: state.reset_in.as_millis() as u64,
                });
        }

        RateLimitStats { backend: self.store.backend(), fail_open: config.fail_open, services }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(rule: RateLimitRule) -> RateLimiter {
        let mut config = RateLimitsConfig::default();
        config.services.insert("svc".into(), rule);
        RateLimiter::memory(config)
    }

    struct UnreachableStore;

    #[async_trait]
    impl RateLimitStore for UnreachableStore {
        fn backend(&self) -> &'static str { "unreachable" }
        async fn hit(&self, _: &RateLimitKey, _: &RateLimitRule) -> Result<KeyState> {
            Err(LitmuxError::RateLimit("connection refused".into()))
        }
        async fn peek(&self, _: &RateLimitKey, _: &RateLimitRule) -> Result<Option<KeyState>> {
            Err(LitmuxError::RateLimit("connection refused".into()))
        }
        async fn reset(&self, _: Option<&str>) -> Result<()> {
            Err(LitmuxError::RateLimit("connection refused".into()))
        }
        async fn snapshot(&self) -> Result<Vec<KeyState>> {
            Err(LitmuxError::RateLimit("connection refused".into()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_after_max_until_reset_then_allowed() {
        let rl = limiter(RateLimitRule::new(1_000, 3, 500));
        for _ in 0..3 {
            assert!(rl.is_allowed("svc", GLOBAL).await);
        }
        assert!(!rl.is_allowed("svc", GLOBAL).await);
        assert_eq!(rl.get_remaining_requests("svc", GLOBAL).await, 0);

        tokio::time::advance(Duration::from_millis(998)).await;
        assert!(!rl.is_allowed("svc", GLOBAL).await);
        assert_eq!(rl.get_reset_time("svc", GLOBAL).await, Some(Duration::from_millis(2)));

        tokio::time::advance(Duration::from_millis(2)).await;
        assert!(rl.is_allowed("svc", GLOBAL).await);
        assert_eq!(rl.get_remaining_requests("svc", GLOBAL).await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_block_longer_than_window_extends_reset() {
        let rl = limiter(RateLimitRule::new(1_000, 1, 5_000));
        assert!(rl.is_allowed("svc", GLOBAL).await);
        assert!(!rl.is_allowed("svc", GLOBAL).await);
        assert_eq!(rl.get_reset_time("svc", GLOBAL).await, Some(Duration::from_millis(5_000)));

        tokio::time::advance(Duration::from_millis(1_500)).await;
        assert!(!rl.is_allowed("svc", GLOBAL).await);

        tokio::time::advance(Duration::from_millis(3_500)).await;
        assert!(rl.is_allowed("svc", GLOBAL).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let rl = limiter(RateLimitRule::new(1_000, 1, 1_000));
        assert!(rl.is_allowed("svc", "a").await);
        assert!(rl.is_allowed("svc", "b").await);
        assert!(rl.is_allowed("other", GLOBAL).await);
        assert!(!rl.is_allowed("svc", "a").await);
    }

    #[tokio::test]
    async fn test_unseen_key_reports_full_budget() {
        let rl = limiter(RateLimitRule::new(1_000, 4, 1_000));
        assert_eq!(rl.get_remaining_requests("svc", GLOBAL).await, 4);
        assert_eq!(rl.get_reset_time("svc", GLOBAL).await, None);
    }

    #[tokio::test]
    async fn test_reset_limits_per_service() {
        let rl = limiter(RateLimitRule::new(60_000, 1, 60_000));
        rl.configure("other", RateLimitRule::new(60_000, 1, 60_000));
        assert!(rl.is_allowed("svc", GLOBAL).await);
        assert!(rl.is_allowed("other", GLOBAL).await);
        assert!(!rl.is_allowed("svc", GLOBAL).await);

        assert!(rl.reset_limits(Some("svc")).await);
        assert!(rl.is_allowed("svc", GLOBAL).await);
        assert!(!rl.is_allowed("other", GLOBAL).await);

        assert!(rl.reset_limits(None).await);
        assert!(rl.is_allowed("other", GLOBAL).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_hits_are_not_undercounted() {
        let rl = Arc::new(limiter(RateLimitRule::new(60_000, 10, 60_000)));
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let rl = rl.clone();
                tokio::spawn(async move { rl.is_allowed("svc", GLOBAL).await })
            })
            .collect();
        let mut allowed = 0;
        for h in handles {
            if h.await.unwrap() {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 10);
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_open_by_default() {
        let rl = RateLimiter::new(Arc::new(UnreachableStore), RateLimitsConfig::default());
        assert!(rl.is_allowed("pubmed", GLOBAL).await);
        assert_eq!(rl.get_remaining_requests("pubmed", GLOBAL).await, 3);
        assert!(!rl.reset_limits(None).await);
    }

    #[tokio::test]
    async fn test_unreachable_store_denies_when_fail_closed() {
        let config = RateLimitsConfig { fail_open: false, ..RateLimitsConfig::default() };
        let rl = RateLimiter::new(Arc::new(UnreachableStore), config);
        assert!(!rl.is_allowed("pubmed", GLOBAL).await);
        assert_eq!(rl.get_remaining_requests("pubmed", GLOBAL).await, 0);
    }

    #[tokio::test]
    async fn test_stats_list_configured_services_and_live_keys() {
        let rl = limiter(RateLimitRule::new(60_000, 5, 60_000));
        rl.is_allowed("svc", GLOBAL).await;
        rl.is_allowed("svc", GLOBAL).await;
        let stats = rl.stats().await;
        assert_eq!(stats.backend, "memory");
        assert!(stats.fail_open);
        assert!(stats.services.contains_key("pubmed"));
        let svc = &stats.services["svc"];
        assert_eq!(svc.keys.len(), 1);
        assert_eq!(svc.keys[0].count, 2);
        assert_eq!(svc.keys[0].remaining, 3);
    }
}

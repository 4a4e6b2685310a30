//! Configuration loading for litmux.
//! Reads litmux.toml from the current directory or the path in the LITMUX_CONFIG env var.
//! Every field has a default, so a missing file yields a working configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::article::SourceKind;
use crate::error::{LitmuxError, Result};

pub const CONFIG_ENV_VAR: &str = "LITMUX_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "litmux.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LitmuxConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sources: SourcesConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub rate_limits: RateLimitsConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

// ── Server ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16    { 3001 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

// ── Sources ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    #[serde(default = "default_enabled_sources")]
    pub enabled: Vec<SourceKind>,
    /// Hard timeout for a single adapter call.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Overall deadline for one aggregated search; stragglers are dropped.
    #[serde(default = "default_deadline_secs")]
    pub search_deadline_secs: u64,
    /// Upper bound on results fetched for one HTTP search; deeper pages are
    /// served from the cached merged list.
    #[serde(default = "default_max_fetch")]
    pub max_fetch: usize,
    #[serde(default)]
    pub pubmed: PubMedConfig,
    #[serde(default)]
    pub arxiv: ArxivConfig,
    #[serde(default)]
    pub biorxiv: BioRxivConfig,
}

fn default_enabled_sources() -> Vec<SourceKind> { SourceKind::ALL.to_vec() }
fn default_timeout_secs() -> u64  { 12 }
fn default_deadline_secs() -> u64 { 15 }
fn default_max_fetch() -> usize    { 200 }

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_sources(),
            timeout_secs: default_timeout_secs(),
            search_deadline_secs: default_deadline_secs(),
            max_fetch: default_max_fetch(),
            pubmed: PubMedConfig::default(),
            arxiv: ArxivConfig::default(),
            biorxiv: BioRxivConfig::default(),
        }
    }
}

impl SourcesConfig {
    pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }

    pub fn deadline(&self) -> Duration { Duration::from_secs(self.search_deadline_secs) }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PubMedConfig {
    /// NCBI API key; overridden by the NCBI_API_KEY env var.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
    #[serde(default = "default_esearch_url")]
    pub esearch_url: String,
    #[serde(default = "default_efetch_url")]
    pub efetch_url: String,
}

fn default_esearch_url() -> String { "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/esearch.fcgi".to_string() }
fn default_efetch_url() -> String  { "https://eutils.ncbi.nlm.nih.gov/entrez/eutils/efetch.fcgi".to_string() }

impl Default for PubMedConfig {
    fn default() -> Self {
        Self { api_key: None, esearch_url: default_esearch_url(), efetch_url: default_efetch_url() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArxivConfig {
    #[serde(default = "default_arxiv_url")]
    pub query_url: String,
}

fn default_arxiv_url() -> String { "https://export.arxiv.org/api/query".to_string() }

impl Default for ArxivConfig {
    fn default() -> Self {
        Self { query_url: default_arxiv_url() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BioRxivConfig {
    #[serde(default = "default_biorxiv_url")]
    pub details_url: String,
    /// Width of the rolling date window fetched on every search.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

fn default_biorxiv_url() -> String { "https://api.biorxiv.org/details/biorxiv".to_string() }
fn default_window_days() -> i64    { 730 }

/// Longest rolling window the bioRxiv adapter will request.
pub const MAX_WINDOW_DAYS: i64 = 3650;

impl Default for BioRxivConfig {
    fn default() -> Self {
        Self { details_url: default_biorxiv_url(), window_days: default_window_days() }
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Connection URL for the distributed backend.
    pub url: Option<String>,
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
}

fn default_backend() -> BackendKind { BackendKind::Memory }
fn default_cache_ttl() -> u64     { 24 * 60 * 60 }
fn default_cache_entries() -> u64 { 10_000 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            ttl_secs: default_cache_ttl(),
            max_entries: default_cache_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
}

// ── Rate limits ───────────────────────────────────────────────────────────────

/// Fixed-window limits for one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRule {
    pub window_ms: u64,
    pub max_requests: u32,
    #[serde(default = "default_block_ms")]
    pub block_duration_ms: u64,
}

fn default_block_ms() -> u64 { 60_000 }

impl RateLimitRule {
    pub const fn new(window_ms: u64, max_requests: u32, block_duration_ms: u64) -> Self {
        Self { window_ms, max_requests, block_duration_ms }
    }

    pub fn window(&self) -> Duration { Duration::from_millis(self.window_ms) }

    pub fn block_duration(&self) -> Duration { Duration::from_millis(self.block_duration_ms) }
}

impl Default for RateLimitRule {
    fn default() -> Self {
        Self::new(60_000, 60, default_block_ms())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitsConfig {
    #[serde(default = "default_backend")]
    pub backend: BackendKind,
    /// Connection URL for the distributed backend.
    pub url: Option<String>,
    /// Allow calls when the limiter's own state cannot be consulted.
    #[serde(default = "default_true")]
    pub fail_open: bool,
    #[serde(default)]
    pub default: RateLimitRule,
    #[serde(default = "default_service_rules")]
    pub services: BTreeMap<String, RateLimitRule>,
}

fn default_true() -> bool { true }

fn default_service_rules() -> BTreeMap<String, RateLimitRule> {
    BTreeMap::from([
        // NCBI allows 3 req/s without an API key
        ("pubmed".to_string(),  RateLimitRule::new(1_000, 3, 60_000)),
        // arXiv asks for one request every three seconds
        ("arxiv".to_string(),   RateLimitRule::new(3_000, 1, 60_000)),
        ("biorxiv".to_string(), RateLimitRule::new(60_000, 10, 60_000)),
    ])
}

impl Default for RateLimitsConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            url: None,
            fail_open: true,
            default: RateLimitRule::default(),
            services: default_service_rules(),
        }
    }
}

impl RateLimitsConfig {
    pub fn rule_for(&self, service: &str) -> RateLimitRule {
        self.services.get(service).copied().unwrap_or(self.default)
    }
}

// ── Fallback & local store ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Serve placeholder articles when every source comes back empty.
    #[serde(default = "default_true")]
    pub synthetic_enabled: bool,
    #[serde(default = "default_fallback_count")]
    pub count: usize,
}

fn default_fallback_count() -> usize { 3 }

impl Default for FallbackConfig {
    fn default() -> Self {
        Self { synthetic_enabled: true, count: default_fallback_count() }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocalConfig {
    /// JSON array of articles loaded into the in-memory local store.
    pub seed_path: Option<PathBuf>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl LitmuxConfig {
    /// Load from `$LITMUX_CONFIG` or `./litmux.toml`, falling back to defaults.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        let path = std::env::var(CONFIG_ENV_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            tracing::info!(path = %path.display(), "No config file found, using defaults");
            Self::default()
        };

        if let Ok(key) = std::env::var("NCBI_API_KEY") {
            if !key.trim().is_empty() {
                config.sources.pubmed.api_key = Some(key);
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| LitmuxError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| LitmuxError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.sources.timeout_secs == 0 || self.sources.search_deadline_secs == 0 {
            return Err(LitmuxError::Config("source timeouts must be non-zero".into()));
        }
        if self.sources.max_fetch == 0 {
            return Err(LitmuxError::Config("sources.max_fetch must be non-zero".into()));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.sources.biorxiv.window_days) {
            return Err(LitmuxError::Config(format!(
                "sources.biorxiv.window_days must be within 1..={MAX_WINDOW_DAYS}"
            )));
        }
        if self.cache.max_entries == 0 {
            return Err(LitmuxError::Config("cache.max_entries must be non-zero".into()));
        }
        if self.cache.backend == BackendKind::Redis && self.cache.url.is_none() {
            return Err(LitmuxError::Config("cache.url is required for the redis backend".into()));
        }
        if self.rate_limits.backend == BackendKind::Redis && self.rate_limits.url.is_none() {
            return Err(LitmuxError::Config("rate_limits.url is required for the redis backend".into()));
        }
        let rules = std::iter::once(("default", &self.rate_limits.default))
            .chain(self.rate_limits.services.iter().map(|(k, v)| (k.as_str(), v)));
        for (name, rule) in rules {
            if rule.max_requests == 0 || rule.window_ms == 0 {
                return Err(LitmuxError::Config(format!(
                    "rate limit for {name} needs non-zero window_ms and max_requests"
                )));
            }
        }
        for name in self.rate_limits.services.keys() {
            if name.parse::<SourceKind>().is_err() {
                return Err(LitmuxError::Config(format!("rate limit for unknown source: {name}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_enable_all_sources() {
        let config = LitmuxConfig::default();
        assert_eq!(config.sources.enabled.len(), 3);
        assert_eq!(config.cache.ttl_secs, 86_400);
        assert!(config.rate_limits.fail_open);
        assert!(config.fallback.synthetic_enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = LitmuxConfig::from_toml(r#"
            [sources]
            enabled = ["pubmed", "arxiv"]
            timeout_secs = 5

            [rate_limits.services.pubmed]
            window_ms = 1000
            max_requests = 10
        "#).unwrap();

        assert_eq!(config.sources.enabled, vec![SourceKind::PubMed, SourceKind::Arxiv]);
        assert_eq!(config.sources.timeout_secs, 5);
        assert_eq!(config.sources.search_deadline_secs, 15);
        assert_eq!(config.rate_limits.rule_for("pubmed").max_requests, 10);
        assert_eq!(config.rate_limits.rule_for("pubmed").block_duration_ms, 60_000);
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_unknown_source_rejected() {
        assert!(LitmuxConfig::from_toml("[sources]\nenabled = [\"scopus\"]").is_err());
    }

    #[test]
    fn test_rule_for_unknown_service_uses_default() {
        let config = RateLimitsConfig::default();
        assert_eq!(config.rule_for("nonexistent"), RateLimitRule::default());
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let mut config = LitmuxConfig::default();
        config.rate_limits.default.max_requests = 0;
        assert!(config.validate().is_err());

        let mut config = LitmuxConfig::default();
        config.sources.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_fetch_and_window() {
        let mut config = LitmuxConfig::default();
        config.sources.max_fetch = 0;
        assert!(config.validate().is_err());

        for days in [0, -5, MAX_WINDOW_DAYS + 1, i64::MAX] {
            let mut config = LitmuxConfig::default();
            config.sources.biorxiv.window_days = days;
            assert!(config.validate().is_err(), "window_days {days} accepted");
        }

        let mut config = LitmuxConfig::default();
        config.sources.biorxiv.window_days = MAX_WINDOW_DAYS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let mut config = LitmuxConfig::default();
        config.cache.backend = BackendKind::Redis;
        assert!(config.validate().is_err());
        config.cache.url = Some("redis://127.0.0.1/".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_example_config_is_valid() {
        let raw = include_str!("../../../litmux.example.toml");
        let config = LitmuxConfig::from_toml(raw).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limits.rule_for("arxiv"), RateLimitRule::new(3_000, 1, 60_000));
        assert_eq!(config.rate_limits.backend, BackendKind::Memory);
    }
}

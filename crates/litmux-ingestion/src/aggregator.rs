//! Concurrent multi-source search.
//!
//! Per request:
//!   1. Plan one `SourceQuery` per selected source, splitting `max_results`
//!   2. Call every source concurrently: rate limit → cache → fetch → cache
//!   3. Wait for all calls to settle; failures and stragglers contribute nothing
//!   4. Merge with local-store results and drop duplicates
//!   5. Re-rank by the semantic scorer when there is a free-text query
//!   6. Optionally fall back to synthetic placeholders when nothing matched

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use litmux_common::config::{FallbackConfig, SourcesConfig};
use litmux_common::{Article, LitmuxConfig, LitmuxError, SourceKind};
use litmux_ranker::SemanticScorer;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, instrument, warn};

use crate::cache::ResultCache;
use crate::dedup::dedup_articles;
use crate::fallback::synthetic_articles;
use crate::local::{InMemoryLocalStore, LocalSearchOptions, LocalStore};
use crate::query::{per_source_limit, SourceQuery};
use crate::rate_limit::{RateLimiter, GLOBAL};
use crate::sources::{build_sources, LiteratureSource};

pub const DEFAULT_MAX_RESULTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    /// Sources to query; empty means every configured source.
    pub sources: Vec<SourceKind>,
    pub max_results: usize,
    pub use_cache: bool,
    pub categories: Vec<String>,
    pub include_local: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            sources: vec![],
            max_results: DEFAULT_MAX_RESULTS,
            use_cache: true,
            categories: vec![],
            include_local: true,
        }
    }
}

pub struct Aggregator {
    sources: Vec<Arc<dyn LiteratureSource>>,
    cache: Arc<ResultCache>,
    limiter: Arc<RateLimiter>,
    scorer: Arc<SemanticScorer>,
    local: Option<Arc<dyn LocalStore>>,
    source_timeout: Duration,
    search_deadline: Duration,
    fallback: FallbackConfig,
}

impl Aggregator {
    pub fn new(
        sources: Vec<Arc<dyn LiteratureSource>>,
        cache: Arc<ResultCache>,
        limiter: Arc<RateLimiter>,
        scorer: Arc<SemanticScorer>,
    ) -> Self {
        let defaults = SourcesConfig::default();
        Self {
            sources,
            cache,
            limiter,
            scorer,
            local: None,
            source_timeout: defaults.timeout(),
            search_deadline: defaults.deadline(),
            fallback: FallbackConfig::default(),
        }
    }

    pub fn with_local(mut self, local: Arc<dyn LocalStore>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_timeouts(mut self, source_timeout: Duration, search_deadline: Duration) -> Self {
        self.source_timeout = source_timeout;
        self.search_deadline = search_deadline;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackConfig) -> Self {
        self.fallback = fallback;
        self
    }

    /// Wires sources, cache, limiter and the optional seeded local store from config.
    pub async fn from_config(config: &LitmuxConfig) -> Result<Self, LitmuxError> {
        let sources = build_sources(&config.sources)?;
        let cache = Arc::new(ResultCache::from_config(&config.cache).await);
        let limiter = Arc::new(RateLimiter::from_config(config.rate_limits.clone()).await);

        let mut aggregator = Self::new(sources, cache, limiter, Arc::new(SemanticScorer::default()))
            .with_timeouts(config.sources.timeout(), config.sources.deadline())
            .with_fallback(config.fallback.clone());
        if let Some(path) = &config.local.seed_path {
            aggregator = aggregator.with_local(Arc::new(InMemoryLocalStore::from_json_file(path)?));
        }
        info!(
            sources = aggregator.sources.len(),
            local = aggregator.local.is_some(),
            "aggregator ready"
        );
        Ok(aggregator)
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn scorer(&self) -> &Arc<SemanticScorer> {
        &self.scorer
    }

    pub fn source_kinds(&self) -> Vec<SourceKind> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// External sources only, no placeholders: an outage yields `[]`.
    pub async fn aggregated_search(&self, query: &str, max_results: usize) -> Vec<Article> {
        let options = SearchOptions { max_results, include_local: false, ..SearchOptions::default() };
        self.run(query, &options, false).await
    }

    /// Full search: selected sources, optional local results and categories,
    /// with the synthetic fallback when enabled.
    pub async fn enhanced_search(&self, query: &str, options: &SearchOptions) -> Vec<Article> {
        self.run(query, options, self.fallback.synthetic_enabled).await
    }

    /// Local store only. A blank query browses by category.
    pub async fn search_local(&self, query: &str, options: &SearchOptions) -> Vec<Article> {
        let Some(local) = &self.local else {
            return vec![];
        };
        let local_options = LocalSearchOptions {
            categories: options.categories.clone(),
            limit: options.max_results,
        };
        let result = if query.trim().is_empty() {
            local.advanced_search(&local_options).await
        } else {
            local.full_text_search(query, &local_options).await
        };
        result.unwrap_or_else(|e| {
            warn!(error = %e, "local store search failed");
            vec![]
        })
    }

    #[instrument(skip(self, options), fields(max_results = options.max_results))]
    async fn run(&self, query: &str, options: &SearchOptions, allow_fallback: bool) -> Vec<Article> {
        if options.max_results == 0 {
            return vec![];
        }
        let query = query.trim();

        let local = async {
            if options.include_local {
                self.search_local(query, options).await
            } else {
                vec![]
            }
        };
        let (local, external) = tokio::join!(local, self.fan_out(query, options));
        debug!(local = local.len(), external = external.len(), "merging results");

        let mut merged = local;
        merged.extend(external);
        let (merged, dropped) = dedup_articles(merged);
        if dropped > 0 {
            debug!(dropped, "dropped duplicate articles");
        }

        let mut ranked = if !merged.is_empty() && !query.is_empty() {
            self.scorer.enhance_search_results(query, merged)
        } else {
            merged
        };
        ranked.truncate(options.max_results);

        let asked = !query.is_empty() || options.categories.iter().any(|c| !c.trim().is_empty());
        if ranked.is_empty() && asked && allow_fallback {
            let count = self.fallback.count.min(options.max_results);
            warn!(count, "no results from any source, serving synthetic placeholders");
            return synthetic_articles(query, &options.categories, count);
        }
        ranked
    }

    /// One concurrent call per planned source; every call is abandoned at
    /// the search deadline.
    async fn fan_out(&self, query: &str, options: &SearchOptions) -> Vec<Article> {
        let plans: Vec<(Arc<dyn LiteratureSource>, String)> = self
            .sources
            .iter()
            .filter(|s| options.sources.is_empty() || options.sources.contains(&s.kind()))
            .filter_map(|s| s.build_query(query, &options.categories).map(|q| (s.clone(), q)))
            .collect();
        if plans.is_empty() {
            return vec![];
        }

        let per_source = per_source_limit(options.max_results, plans.len());
        let deadline = Instant::now() + self.search_deadline;
        let calls = plans.into_iter().map(|(source, upstream_query)| {
            let plan = SourceQuery::new(source.kind(), &upstream_query, per_source);
            async move {
                match timeout_at(deadline, self.query_source(source.as_ref(), &plan, options.use_cache)).await {
                    Ok(articles) => articles,
                    Err(_) => {
                        warn!(source = %plan.source, "source dropped at search deadline");
                        vec![]
                    }
                }
            }
        });

        join_all(calls).await.into_iter().flatten().collect()
    }

    async fn query_source(&self, source: &dyn LiteratureSource, plan: &SourceQuery, use_cache: bool) -> Vec<Article> {
        let kind = plan.source;
        if !self.limiter.is_allowed(kind.as_str(), GLOBAL).await {
            warn!(source = %kind, "rate limited, skipping source");
            return vec![];
        }

        if use_cache {
            if let Some(hit) = self.cache.get::<Vec<Article>>(&plan.cache_key).await {
                debug!(source = %kind, count = hit.len(), "cache hit");
                return hit;
            }
            debug!(source = %kind, "cache miss");
        }

        let mut articles = match timeout(self.source_timeout, source.fetch(&plan.query, plan.max_results)).await {
            Ok(Ok(articles)) => articles,
            Ok(Err(e)) => {
                warn!(source = %kind, error = %e, "source search failed");
                return vec![];
            }
            Err(_) => {
                warn!(source = %kind, timeout_ms = self.source_timeout.as_millis() as u64, "source timed out");
                return vec![];
            }
        };
        articles.truncate(plan.max_results);

        // Empty answers are not cached so a transient outage is retried.
        if use_cache && !articles.is_empty() {
            self.cache.set(&plan.cache_key, &articles, None).await;
        }
        debug!(source = %kind, count = articles.len(), "source returned");
        articles
    }
}

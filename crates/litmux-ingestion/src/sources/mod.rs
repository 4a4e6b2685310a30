//! Literature source clients.

pub mod pubmed;
pub mod arxiv;
pub mod biorxiv;

use std::sync::Arc;

use async_trait::async_trait;
use litmux_common::config::SourcesConfig;
use litmux_common::sandbox::SandboxClient;
use litmux_common::{Article, LitmuxError, SourceKind};
use tracing::{debug, warn};

pub use arxiv::ArxivClient;
pub use biorxiv::BioRxivClient;
pub use pubmed::PubMedClient;

/// Common interface for all literature source clients.
#[async_trait]
pub trait LiteratureSource: Send + Sync {
    fn kind(&self) -> SourceKind;

    /// Upstream query string for free text and/or category browsing, or
    /// `None` when there is nothing to ask this source.
    fn build_query(&self, text: &str, categories: &[String]) -> Option<String>;

    /// Fetches and normalises up to `max_results` articles.
    async fn fetch(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Article>>;

    /// Like `fetch`, but any failure is logged and yields no articles.
    async fn search(&self, query: &str, max_results: usize) -> Vec<Article> {
        match self.fetch(query, max_results).await {
            Ok(articles) => articles,
            Err(e) => {
                warn!(source = %self.kind(), error = %e, "source search failed");
                vec![]
            }
        }
    }
}

/// Outcome of normalising one upstream record.
#[derive(Debug)]
pub enum RecordOutcome {
    Parsed(Article),
    Skipped { reason: String },
}

impl RecordOutcome {
    pub fn skipped(reason: impl Into<String>) -> Self {
        RecordOutcome::Skipped { reason: reason.into() }
    }
}

/// Keeps parsed records, logging every skipped one.
pub fn collect_records(kind: SourceKind, outcomes: impl IntoIterator<Item = RecordOutcome>) -> Vec<Article> {
    let mut articles = Vec::new();
    let mut skipped = 0usize;
    for outcome in outcomes {
        match outcome {
            RecordOutcome::Parsed(article) => articles.push(article),
            RecordOutcome::Skipped { reason } => {
                skipped += 1;
                warn!(source = %kind, %reason, "skipping malformed record");
            }
        }
    }
    debug!(source = %kind, parsed = articles.len(), skipped, "normalised records");
    articles
}

/// Builds a client for every enabled source, sharing one sandboxed HTTP
/// client whose allowlist covers the configured endpoints.
pub fn build_sources(config: &SourcesConfig) -> Result<Vec<Arc<dyn LiteratureSource>>, LitmuxError> {
    let mut http = SandboxClient::with_timeout(config.timeout())?;
    for url in [
        &config.pubmed.esearch_url,
        &config.pubmed.efetch_url,
        &config.arxiv.query_url,
        &config.biorxiv.details_url,
    ] {
        http.allow_url_host(url);
    }

    let sources = config
        .enabled
        .iter()
        .map(|kind| -> Arc<dyn LiteratureSource> {
            match kind {
                SourceKind::PubMed  => Arc::new(PubMedClient::new(http.clone(), &config.pubmed)),
                SourceKind::Arxiv   => Arc::new(ArxivClient::new(http.clone(), &config.arxiv)),
                SourceKind::BioRxiv => Arc::new(BioRxivClient::new(http.clone(), &config.biorxiv)),
            }
        })
        .collect();
    Ok(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_records_drops_skipped() {
        let outcomes = vec![
            RecordOutcome::Parsed(Article::new("pubmed-1", "One", SourceKind::PubMed, "")),
            RecordOutcome::skipped("missing title"),
            RecordOutcome::Parsed(Article::new("pubmed-2", "Two", SourceKind::PubMed, "")),
        ];
        let articles = collect_records(SourceKind::PubMed, outcomes);
        assert_eq!(articles.len(), 2);
        assert_eq!(articles[1].id, "pubmed-2");
    }

    #[test]
    fn test_build_sources_follows_enabled_order() {
        let mut config = SourcesConfig::default();
        config.enabled = vec![SourceKind::BioRxiv, SourceKind::PubMed];
        let sources = build_sources(&config).unwrap();
        let kinds: Vec<SourceKind> = sources.iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, vec![SourceKind::BioRxiv, SourceKind::PubMed]);
    }
}

//! Local article store collaborator.
//!
//! The aggregator only needs the two search capabilities below; persistence
//! lives elsewhere. `InMemoryLocalStore` backs the binary (seeded from a
//! JSON file) and the tests.

use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use litmux_common::Article;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalSearchOptions {
    /// Keep articles in any of these categories; empty keeps all.
    pub categories: Vec<String>,
    pub limit: usize,
}

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Articles matching every whitespace-separated term of `query`.
    async fn full_text_search(&self, query: &str, options: &LocalSearchOptions) -> anyhow::Result<Vec<Article>>;

    /// Filter-only browse, used when there is no free-text query.
    async fn advanced_search(&self, options: &LocalSearchOptions) -> anyhow::Result<Vec<Article>>;
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryLocalStore {
    articles: Vec<Article>,
}

impl InMemoryLocalStore {
    pub fn new(articles: Vec<Article>) -> Self {
        let articles = articles
            .into_iter()
            .map(|mut a| {
                a.is_local = true;
                a.is_synthetic = false;
                a
            })
            .collect();
        Self { articles }
    }

    /// Loads a JSON array of articles.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading local store seed {}", path.display()))?;
        let articles: Vec<Article> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing local store seed {}", path.display()))?;
        info!(count = articles.len(), path = %path.display(), "loaded local articles");
        Ok(Self::new(articles))
    }

    pub fn len(&self) -> usize {
        self.articles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.articles.is_empty()
    }

    fn in_categories(article: &Article, categories: &[String]) -> bool {
        categories.is_empty()
            || article
                .categories
                .iter()
                .any(|c| categories.iter().any(|want| c.eq_ignore_ascii_case(want.trim())))
    }

    fn haystack(article: &Article) -> String {
        let mut text = format!("{} {}", article.title, article.abstract_text);
        for k in &article.keywords {
            text.push(' ');
            text.push_str(k);
        }
        text.to_lowercase()
    }

    fn take(&self, options: &LocalSearchOptions, keep: impl Fn(&Article) -> bool) -> Vec<Article> {
        self.articles
            .iter()
            .filter(|a| Self::in_categories(a, &options.categories))
            .filter(|a| keep(a))
            .take(options.limit)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl LocalStore for InMemoryLocalStore {
    async fn full_text_search(&self, query: &str, options: &LocalSearchOptions) -> anyhow::Result<Vec<Article>> {
        let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
        if terms.is_empty() {
            return self.advanced_search(options).await;
        }
        Ok(self.take(options, |a| {
            let text = Self::haystack(a);
            terms.iter().all(|t| text.contains(t.as_str()))
        }))
    }

    async fn advanced_search(&self, options: &LocalSearchOptions) -> anyhow::Result<Vec<Article>> {
        Ok(self.take(options, |_| true))
    }
}

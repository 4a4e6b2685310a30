//! Duplicate detection across merged search results.
//!
//! Stage 1: DOI exact match (case-insensitive, blank DOIs ignored)
//! Stage 2: normalised title match (trimmed, lower-cased)
//!
//! The first occurrence wins, so callers put preferred results first.

use std::collections::HashSet;

use litmux_common::Article;

/// Result of a deduplication check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupResult {
    /// Not seen before; keep it.
    New,
    /// Shares a DOI with an earlier article.
    DuplicateDoi(String),
    /// Shares a normalised title with an earlier article.
    DuplicateTitle(String),
}

impl DedupResult {
    pub fn is_new(&self) -> bool {
        matches!(self, DedupResult::New)
    }
}

#[derive(Debug, Default)]
pub struct Deduplicator {
    dois: HashSet<String>,
    titles: HashSet<String>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks `article` against everything seen so far and records it when new.
    pub fn check(&mut self, article: &Article) -> DedupResult {
        let doi = article.normalized_doi();
        if let Some(doi) = &doi {
            if self.dois.contains(doi) {
                return DedupResult::DuplicateDoi(doi.clone());
            }
        }
        let title = article.normalized_title();
        if !title.is_empty() && self.titles.contains(&title) {
            return DedupResult::DuplicateTitle(title);
        }

        if let Some(doi) = doi {
            self.dois.insert(doi);
        }
        if !title.is_empty() {
            self.titles.insert(title);
        }
        DedupResult::New
    }
}

/// Drops later articles that repeat an earlier DOI or title. Returns the
/// kept articles and the number dropped.
pub fn dedup_articles(articles: Vec<Article>) -> (Vec<Article>, usize) {
    let mut seen = Deduplicator::new();
    let before = articles.len();
    let kept: Vec<Article> = articles.into_iter().filter(|a| seen.check(a).is_new()).collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

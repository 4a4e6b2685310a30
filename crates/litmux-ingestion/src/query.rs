//! Per-source query planning and cache keys.

use litmux_common::SourceKind;
use sha2::{Digest, Sha256};

/// One planned adapter call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceQuery {
    pub source: SourceKind,
    /// Upstream query with whitespace collapsed.
    pub query: String,
    pub max_results: usize,
    pub cache_key: String,
}

impl SourceQuery {
    pub fn new(source: SourceKind, query: &str, max_results: usize) -> Self {
        let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
        let cache_key = cache_key(source, &query, max_results);
        Self { source, query, max_results, cache_key }
    }
}

/// Deterministic key for (source, query, max_results). Query case is
/// ignored.
pub fn cache_key(source: SourceKind, query: &str, max_results: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(query.trim().to_lowercase().as_bytes());
    hasher.update([0u8]);
    hasher.update(max_results.to_string().as_bytes());
    format!("search:{}:{:x}", source, hasher.finalize())
}

/// Key for a whole merged result list. Source and category order and case
/// are ignored.
pub fn merged_cache_key(
    query: &str,
    sources: &[SourceKind],
    categories: &[String],
    scope: &str,
    max_results: usize,
) -> String {
    let mut sources: Vec<&str> = sources.iter().map(|s| s.as_str()).collect();
    sources.sort_unstable();
    sources.dedup();
    let mut categories: Vec<String> = categories.iter().map(|c| c.trim().to_lowercase()).collect();
    categories.sort_unstable();
    categories.dedup();

    let mut hasher = Sha256::new();
    for part in [
        scope.to_string(),
        query.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase(),
        sources.join(","),
        categories.join(","),
        max_results.to_string(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update([0u8]);
    }
    format!("merged:{:x}", hasher.finalize())
}

/// Results per source when `max_results` is shared by `sources` sources.
pub fn per_source_limit(max_results: usize, sources: usize) -> usize {
    if sources == 0 {
        return 0;
    }
    max_results.div_ceil(sources)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_deterministic() {
        let a = SourceQuery::new(SourceKind::PubMed, "CRISPR  gene editing", 5);
        let b = SourceQuery::new(SourceKind::PubMed, " crispr gene editing ", 5);
        assert_eq!(a.cache_key, b.cache_key);
        assert_eq!(a.query, "CRISPR gene editing");
        assert!(a.cache_key.starts_with("search:pubmed:"));
    }

    #[test]
    fn test_cache_key_varies_by_source_and_limit() {
        let base = cache_key(SourceKind::PubMed, "crispr", 5);
        assert_ne!(base, cache_key(SourceKind::Arxiv, "crispr", 5));
        assert_ne!(base, cache_key(SourceKind::PubMed, "crispr", 6));
        assert_ne!(base, cache_key(SourceKind::PubMed, "crisp", 5));
    }

    #[test]
    fn test_merged_key_ignores_order_and_case() {
        let a = merged_cache_key(
            "CRISPR  editing",
            &[SourceKind::PubMed, SourceKind::Arxiv],
            &["Genomics".into(), "ai".into()],
            "all",
            200,
        );
        let b = merged_cache_key(
            "crispr editing",
            &[SourceKind::Arxiv, SourceKind::PubMed],
            &["AI".into(), "genomics".into()],
            "all",
            200,
        );
        assert_eq!(a, b);
        assert!(a.starts_with("merged:"));
        assert_ne!(a, merged_cache_key("crispr editing", &[SourceKind::PubMed], &[], "all", 200));
        assert_ne!(
            a,
            merged_cache_key("crispr editing", &[SourceKind::PubMed, SourceKind::Arxiv], &["ai".into(), "genomics".into()], "local", 200)
        );
    }

    #[test]
    fn test_per_source_limit_rounds_up() {
        assert_eq!(per_source_limit(10, 2), 5);
        assert_eq!(per_source_limit(10, 3), 4);
        assert_eq!(per_source_limit(1, 3), 1);
        assert_eq!(per_source_limit(10, 0), 0);
    }
}

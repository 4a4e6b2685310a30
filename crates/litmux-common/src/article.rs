//! Normalised article model shared by every source, the local store and the ranker.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A research article in the common schema, regardless of origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    pub authors: Vec<Author>,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub source: ArticleSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    /// PMID or arXiv id, depending on the source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default)]
    pub publication_date: Option<NaiveDate>,
    #[serde(default)]
    pub citation_count: u32,
    #[serde(default)]
    pub view_count: u32,
    #[serde(default)]
    pub bookmark_count: u32,
    #[serde(default)]
    pub trending_score: f64,
    pub status: ArticleStatus,
    #[serde(default)]
    pub metrics: ArticleMetrics,
    /// Per-request relevance annotation written by the ranker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_score: Option<f64>,
    #[serde(default)]
    pub is_local: bool,
    /// Degraded-mode placeholder, never real upstream data.
    #[serde(default)]
    pub is_synthetic: bool,
}

impl Article {
    /// Empty external article for `kind`; adapters fill in the rest.
    pub fn new(id: impl Into<String>, title: impl Into<String>, kind: SourceKind, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            abstract_text: String::new(),
            authors: vec![],
            categories: vec![],
            tags: vec![],
            keywords: vec![],
            source: ArticleSource {
                name: kind.display_name().to_string(),
                url: url.into(),
                source_type: kind.source_type(),
            },
            doi: None,
            external_id: None,
            publication_date: None,
            citation_count: 0,
            view_count: 0,
            bookmark_count: 0,
            trending_score: 0.0,
            status: kind.default_status(),
            metrics: ArticleMetrics::default(),
            search_score: None,
            is_local: false,
            is_synthetic: false,
        }
    }

    /// Lower-cased, trimmed title used for duplicate detection.
    pub fn normalized_title(&self) -> String {
        self.title.trim().to_lowercase()
    }

    /// DOI if present and non-blank, lower-cased.
    pub fn normalized_doi(&self) -> Option<String> {
        self.doi
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_lowercase)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affiliation: Option<String>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), affiliation: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleSource {
    pub name: String,
    pub url: String,
    #[serde(rename = "type")]
    pub source_type: SourceType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Journal,
    Preprint,
    Conference,
    Patent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArticleStatus {
    Published,
    Preprint,
    UnderReview,
}

impl ArticleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArticleStatus::Published   => "published",
            ArticleStatus::Preprint    => "preprint",
            ArticleStatus::UnderReview => "under-review",
        }
    }
}

impl FromStr for ArticleStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "published"    => Ok(ArticleStatus::Published),
            "preprint"     => Ok(ArticleStatus::Preprint),
            "under-review" | "under_review" => Ok(ArticleStatus::UnderReview),
            other => Err(format!("unknown article status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticleMetrics {
    pub impact_score: f64,
    pub readability_score: f64,
    pub novelty_score: f64,
}

impl Default for ArticleMetrics {
    fn default() -> Self {
        Self { impact_score: 0.0, readability_score: 0.0, novelty_score: 0.0 }
    }
}

/// External literature sources the aggregator knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    PubMed,
    Arxiv,
    BioRxiv,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::PubMed, SourceKind::Arxiv, SourceKind::BioRxiv];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::PubMed  => "pubmed",
            SourceKind::Arxiv   => "arxiv",
            SourceKind::BioRxiv => "biorxiv",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            SourceKind::PubMed  => "PubMed",
            SourceKind::Arxiv   => "arXiv",
            SourceKind::BioRxiv => "bioRxiv",
        }
    }

    pub fn source_type(&self) -> SourceType {
        match self {
            SourceKind::PubMed => SourceType::Journal,
            SourceKind::Arxiv | SourceKind::BioRxiv => SourceType::Preprint,
        }
    }

    pub fn default_status(&self) -> ArticleStatus {
        match self {
            SourceKind::PubMed => ArticleStatus::Published,
            SourceKind::Arxiv | SourceKind::BioRxiv => ArticleStatus::Preprint,
        }
    }

    /// Category assigned when taxonomy matching finds nothing.
    pub fn default_category(&self) -> &'static str {
        match self {
            SourceKind::PubMed  => "biomedical",
            SourceKind::Arxiv   => "ai",
            SourceKind::BioRxiv => "biology",
        }
    }

    /// True if `name` is this source's key or display name.
    pub fn matches_name(&self, name: &str) -> bool {
        name.eq_ignore_ascii_case(self.as_str()) || name.eq_ignore_ascii_case(self.display_name())
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceKind::ALL
            .into_iter()
            .find(|k| k.matches_name(s.trim()))
            .ok_or_else(|| format!("unknown source: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_parse_case_insensitive() {
        assert_eq!("PubMed".parse::<SourceKind>(), Ok(SourceKind::PubMed));
        assert_eq!(" arxiv ".parse::<SourceKind>(), Ok(SourceKind::Arxiv));
        assert_eq!("bioRxiv".parse::<SourceKind>(), Ok(SourceKind::BioRxiv));
        assert!("scopus".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_new_article_defaults_per_source() {
        let a = Article::new("pubmed-1", "Title", SourceKind::PubMed, "https://pubmed.ncbi.nlm.nih.gov/1/");
        assert_eq!(a.source.source_type, SourceType::Journal);
        assert_eq!(a.status, ArticleStatus::Published);
        assert!(!a.is_local);

        let b = Article::new("arxiv-1", "Title", SourceKind::Arxiv, "https://arxiv.org/abs/1");
        assert_eq!(b.source.source_type, SourceType::Preprint);
        assert_eq!(b.status, ArticleStatus::Preprint);
    }

    #[test]
    fn test_article_json_shape() {
        let a = Article::new("arxiv-2401.00001", "Attention", SourceKind::Arxiv, "https://arxiv.org/abs/2401.00001");
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["source"]["type"], "preprint");
        assert_eq!(v["status"], "preprint");
        assert_eq!(v["isLocal"], false);
        assert!(v.get("abstract").is_some());
        assert!(v.get("searchScore").is_none());
    }

    #[test]
    fn test_normalized_doi_ignores_blank() {
        let mut a = Article::new("x", "t", SourceKind::BioRxiv, "");
        a.doi = Some("   ".into());
        assert_eq!(a.normalized_doi(), None);
        a.doi = Some(" 10.1101/ABC ".into());
        assert_eq!(a.normalized_doi().as_deref(), Some("10.1101/abc"));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("under-review".parse::<ArticleStatus>(), Ok(ArticleStatus::UnderReview));
        assert!("retracted".parse::<ArticleStatus>().is_err());
    }
}

//! bioRxiv preprint client.
//!
//! Uses the bioRxiv REST API:
//!   https://api.biorxiv.org/details/biorxiv/{from}/{to}/{cursor}/json
//!
//! The endpoint has no text search: every preprint in the rolling date
//! window comes back and is filtered client-side.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use litmux_common::config::{BioRxivConfig, MAX_WINDOW_DAYS};
use litmux_common::sandbox::SandboxClient as Client;
use litmux_common::{Article, Author, SourceKind};
use serde_json::Value;
use tracing::{debug, instrument};

use super::{collect_records, LiteratureSource, RecordOutcome};
use crate::normalise::{clean_text, derive_metrics, derive_tags};

pub struct BioRxivClient {
    client: Client,
    details_url: String,
    window_days: i64,
}

impl BioRxivClient {
    pub fn new(client: Client, config: &BioRxivConfig) -> Self {
        Self {
            client,
            details_url: config.details_url.trim_end_matches('/').to_string(),
            window_days: config.window_days.clamp(1, MAX_WINDOW_DAYS),
        }
    }

    /// "{from}/{to}" covering the last `window_days` up to `today`.
    fn interval(&self, today: NaiveDate) -> String {
        let from = today - Duration::days(self.window_days);
        format!("{}/{}", from, today)
    }
}

#[async_trait]
impl LiteratureSource for BioRxivClient {
    fn kind(&self) -> SourceKind {
        SourceKind::BioRxiv
    }

    fn build_query(&self, text: &str, categories: &[String]) -> Option<String> {
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_string());
        }
        let terms: Vec<&str> = categories.iter().map(|c| c.trim()).filter(|c| !c.is_empty()).collect();
        (!terms.is_empty()).then(|| terms.join(" OR "))
    }

    #[instrument(skip(self))]
    async fn fetch(&self, query: &str, max_results: usize) -> anyhow::Result<Vec<Article>> {
        let today = Utc::now().date_naive();
        let url = format!("{}/{}/0/json", self.details_url, self.interval(today));
        let resp: Value = self.client
            .get(&url)?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut articles = collect_records(SourceKind::BioRxiv, parse_collection(&resp, query, today));
        articles.truncate(max_results);
        debug!(count = articles.len(), "bioRxiv matches after filtering");
        Ok(articles)
    }
}

/// Coarse category from keyword cues in the preprint's text.
pub fn categorize(text: &str) -> &'static str {
    let text = text.to_lowercase();
    if text.contains("neuro") {
        "neuroscience"
    } else if text.contains("biotech") {
        "biotechnology"
    } else {
        "biology"
    }
}

/// True when any " OR "-separated term occurs in the title or abstract,
/// ignoring case. A blank query matches nothing.
fn matches_query(item: &Value, terms: &[String]) -> bool {
    let title = item["title"].as_str().unwrap_or("").to_lowercase();
    let abstract_text = item["abstract"].as_str().unwrap_or("").to_lowercase();
    terms.iter().any(|t| title.contains(t.as_str()) || abstract_text.contains(t.as_str()))
}

fn normalise_item(item: &Value, today: NaiveDate) -> RecordOutcome {
    let Some(doi) = item["doi"].as_str().map(str::trim).filter(|d| !d.is_empty()) else {
        return RecordOutcome::skipped("preprint without DOI");
    };
    let title = clean_text(item["title"].as_str().unwrap_or(""));
    if title.is_empty() {
        return RecordOutcome::skipped(format!("bioRxiv {doi} has no title"));
    }
    let abstract_text = clean_text(item["abstract"].as_str().unwrap_or(""));
    let server_category = item["category"].as_str().map(clean_text).unwrap_or_default();
    let version = item["version"].as_str().unwrap_or("1");
    let published = item["date"]
        .as_str()
        .and_then(|d| NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").ok());

    let authors: Vec<Author> = item["authors"]
        .as_str()
        .unwrap_or("")
        .split(';')
        .map(clean_text)
        .filter(|name| !name.is_empty())
        .map(Author::named)
        .collect();

    let mut article = Article::new(
        format!("biorxiv-{doi}"),
        title,
        SourceKind::BioRxiv,
        format!("https://www.biorxiv.org/content/{doi}v{version}"),
    );
    let text = format!("{} {} {}", article.title, abstract_text, server_category);
    article.categories = vec![categorize(&text).to_string()];
    article.tags = derive_tags(&text, SourceKind::BioRxiv);
    article.metrics = derive_metrics(&abstract_text, published, article.source.source_type, today);
    article.abstract_text = abstract_text;
    if !server_category.is_empty() {
        article.keywords = vec![server_category];
    }
    article.authors = authors;
    article.doi = Some(doi.to_string());
    article.external_id = Some(doi.to_string());
    article.publication_date = published;
    RecordOutcome::Parsed(article)
}

/// Filters a details response by `query` and normalises the matches.
pub fn parse_collection(resp: &Value, query: &str, today: NaiveDate) -> Vec<RecordOutcome> {
    let terms: Vec<String> = query
        .split(" OR ")
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    if terms.is_empty() {
        return vec![];
    }

    let Some(collection) = resp["collection"].as_array() else {
        return vec![];
    };
    debug!(fetched = collection.len(), "bioRxiv window");

    collection
        .iter()
        .filter(|item| matches_query(item, &terms))
        .map(|item| normalise_item(item, today))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use litmux_test_utils::BIORXIV_DETAILS_JSON;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn fixture() -> Value {
        serde_json::from_str(BIORXIV_DETAILS_JSON).unwrap()
    }

    #[test]
    fn test_filter_is_case_insensitive_substring() {
        let articles = collect_records(SourceKind::BioRxiv, parse_collection(&fixture(), "NEURO", today()));
        // The untitled neuro preprint is skipped.
        assert_eq!(articles.len(), 2);
        for a in &articles {
            assert_eq!(a.categories, vec!["neuroscience".to_string()]);
            let text = format!("{} {}", a.title, a.abstract_text).to_lowercase();
            assert!(text.contains("neuro"));
        }
    }

    #[test]
    fn test_item_normalisation() {
        let articles = collect_records(SourceKind::BioRxiv, parse_collection(&fixture(), "cortical", today()));
        let a = &articles[0];
        assert_eq!(a.id, "biorxiv-10.1101/2024.01.01.000001");
        assert_eq!(a.source.url, "https://www.biorxiv.org/content/10.1101/2024.01.01.000001v1");
        assert_eq!(a.authors.len(), 2);
        assert_eq!(a.authors[1].name, "Doe, A.");
        assert_eq!(a.publication_date, NaiveDate::from_ymd_opt(2024, 1, 2));
        assert_eq!(a.keywords, vec!["neuroscience".to_string()]);
        assert_eq!(a.source.name, "bioRxiv");
    }

    #[test]
    fn test_category_heuristics() {
        let articles = collect_records(SourceKind::BioRxiv, parse_collection(&fixture(), "fermentation", today()));
        assert_eq!(articles[0].categories, vec!["biotechnology".to_string()]);
        assert_eq!(categorize("Plant root growth"), "biology");
    }

    #[test]
    fn test_blank_query_and_empty_payload() {
        assert!(parse_collection(&fixture(), "  ", today()).is_empty());
        assert!(parse_collection(&serde_json::json!({"collection": []}), "neuro", today()).is_empty());
        assert!(parse_collection(&serde_json::json!({}), "neuro", today()).is_empty());
    }

    #[test]
    fn test_interval_spans_window() {
        let c = BioRxivClient::new(Client::new().unwrap(), &BioRxivConfig::default());
        assert_eq!(c.interval(today()), "2022-06-02/2024-06-01");
    }

    #[test]
    fn test_out_of_range_window_is_clamped() {
        let huge = BioRxivConfig { window_days: i64::MAX, ..BioRxivConfig::default() };
        let c = BioRxivClient::new(Client::new().unwrap(), &huge);
        assert!(c.interval(today()).ends_with("/2024-06-01"));

        let negative = BioRxivConfig { window_days: -30, ..BioRxivConfig::default() };
        let c = BioRxivClient::new(Client::new().unwrap(), &negative);
        assert_eq!(c.interval(today()), "2024-05-31/2024-06-01");
    }
}

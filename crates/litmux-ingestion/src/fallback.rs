//! Degraded-mode placeholder results.
//!
//! Served only when every source came back empty and the caller asked for
//! something. Placeholders are flagged `is_synthetic` and never local.

use litmux_common::{Article, ArticleStatus, SourceKind, SourceType};

pub const SYNTHETIC_SOURCE_NAME: &str = "Synthetic";

const TITLE_TEMPLATES: &[&str] = &[
    "Recent advances in {topic}",
    "Methods and open problems in {topic}",
    "A survey of {topic} research",
    "Emerging directions in {topic}",
];

const ABSTRACT_TEMPLATE: &str =
    "Placeholder result for \"{topic}\". Live literature sources returned no matches; retry later for indexed articles.";

/// Deterministic placeholders for `query` (or `categories` when the query is blank).
pub fn synthetic_articles(query: &str, categories: &[String], count: usize) -> Vec<Article> {
    let categories: Vec<String> = categories
        .iter()
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect();
    let topic = match query.trim() {
        "" => categories.join(", "),
        q => q.to_string(),
    };
    if topic.is_empty() {
        return vec![];
    }

    (0..count)
        .map(|i| {
            let template = TITLE_TEMPLATES[i % TITLE_TEMPLATES.len()];
            let mut article = Article::new(
                format!("synthetic-{}", i + 1),
                template.replace("{topic}", &topic),
                SourceKind::Arxiv,
                "",
            );
            article.source.name = SYNTHETIC_SOURCE_NAME.to_string();
            article.source.source_type = SourceType::Preprint;
            article.status = ArticleStatus::Preprint;
            article.abstract_text = ABSTRACT_TEMPLATE.replace("{topic}", &topic);
            article.categories = if categories.is_empty() {
                vec!["general".to_string()]
            } else {
                categories.clone()
            };
            article.is_local = false;
            article.is_synthetic = true;
            article
        })
        .collect()
}

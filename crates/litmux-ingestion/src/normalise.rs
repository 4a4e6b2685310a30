//! Text clean-up, taxonomy tagging and derived metrics shared by all sources.

use chrono::{Datelike, NaiveDate};
use lazy_static::lazy_static;
use litmux_common::{ArticleMetrics, SourceKind, SourceType};
use regex::Regex;

lazy_static! {
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]+").unwrap();
}

/// Platform category → lexical cues. Cues are matched against lower-cased
/// text padded with spaces, so a leading/trailing space pins a word edge.
static TAXONOMY: &[(&str, &[&str])] = &[
    ("brain-computer-interface", &["brain-computer interface", "brain computer interface", "brain-machine interface", " bci", "neural interface", "neuroprosthe"]),
    ("neuroscience", &["neuro", "cortex", "cortical", "synap", " brain"]),
    ("machine-learning", &["machine learning", "deep learning", "neural network", "reinforcement learning"]),
    ("ai", &["artificial intelligence", " ai ", "language model", " llm"]),
    ("genomics", &["genom", "crispr", "gene editing", "sequencing", "transcriptom"]),
    ("biotechnology", &["biotech", "bioengineer", "synthetic biology", "protein engineering"]),
    ("medicine", &["clinical", "patient", "therapy", "disease", "cancer"]),
    ("robotics", &["robot", "locomotion", "manipulator"]),
];

/// Strips markup tags and collapses runs of whitespace.
pub fn clean_text(raw: &str) -> String {
    let stripped = HTML_TAG.replace_all(raw, "");
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Taxonomy categories whose cues appear in `text`, or the source's default
/// category when none do.
pub fn derive_tags(text: &str, kind: SourceKind) -> Vec<String> {
    let padded = format!(" {} ", text.to_lowercase());
    let tags: Vec<String> = TAXONOMY
        .iter()
        .filter(|(_, cues)| cues.iter().any(|cue| padded.contains(cue)))
        .map(|(tag, _)| tag.to_string())
        .collect();

    if tags.is_empty() {
        vec![kind.default_category().to_string()]
    } else {
        tags
    }
}

/// Readability from mean sentence length: short sentences score high.
pub fn readability_score(text: &str) -> f64 {
    let words = text.split_whitespace().count();
    let sentences = SENTENCE_END
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .count();
    if words == 0 || sentences == 0 {
        return 0.0;
    }
    let mean = words as f64 / sentences as f64;
    (120.0 - 3.0 * mean).clamp(0.0, 100.0)
}

/// 1.0 for the current year, losing 0.15 per year of age, never below 0.1.
pub fn novelty_score(published: Option<NaiveDate>, today: NaiveDate) -> f64 {
    let Some(date) = published else { return 0.1 };
    let age = (today.year() - date.year()).max(0) as f64;
    (1.0 - 0.15 * age).max(0.1)
}

pub fn impact_score(source_type: SourceType) -> f64 {
    match source_type {
        SourceType::Journal  => 0.6,
        SourceType::Preprint => 0.4,
        _ => 0.3,
    }
}

pub fn derive_metrics(
    abstract_text: &str,
    published: Option<NaiveDate>,
    source_type: SourceType,
    today: NaiveDate,
) -> ArticleMetrics {
    ArticleMetrics {
        impact_score: impact_score(source_type),
        readability_score: readability_score(abstract_text),
        novelty_score: novelty_score(published, today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_text_strips_tags_and_whitespace() {
        assert_eq!(
            clean_text("  Base editing with <i>CRISPR</i>\n\t  Cas9 "),
            "Base editing with CRISPR Cas9"
        );
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("<p></p>"), "");
    }

    #[test]
    fn test_tags_from_taxonomy() {
        let tags = derive_tags("A BCI for cortical speech decoding", SourceKind::Arxiv);
        assert!(tags.contains(&"brain-computer-interface".to_string()));
        assert!(tags.contains(&"neuroscience".to_string()));
    }

    #[test]
    fn test_ai_cue_needs_word_edges() {
        assert_eq!(derive_tags("Rainfall in Spain", SourceKind::Arxiv), vec!["ai".to_string()]);
        assert_eq!(derive_tags("Rainfall in Spain", SourceKind::PubMed), vec!["biomedical".to_string()]);
        assert!(derive_tags("Safe AI systems", SourceKind::PubMed).contains(&"ai".to_string()));
    }

    #[test]
    fn test_readability_prefers_short_sentences() {
        let short = readability_score("Cells grew. We measured them. Results hold.");
        let long = readability_score(&"word ".repeat(50));
        assert!(short > long);
        assert_eq!(readability_score(""), 0.0);
        assert!((0.0..=100.0).contains(&short));
    }

    #[test]
    fn test_novelty_decay_and_floor() {
        let today = NaiveDate::from_ymd_opt(2026, 6, 1).unwrap();
        assert_eq!(novelty_score(NaiveDate::from_ymd_opt(2026, 1, 1), today), 1.0);
        assert!((novelty_score(NaiveDate::from_ymd_opt(2024, 1, 1), today) - 0.7).abs() < 1e-9);
        assert_eq!(novelty_score(NaiveDate::from_ymd_opt(1990, 1, 1), today), 0.1);
        assert_eq!(novelty_score(None, today), 0.1);
    }

    #[test]
    fn test_impact_by_source_type() {
        assert_eq!(impact_score(SourceType::Journal), 0.6);
        assert_eq!(impact_score(SourceType::Preprint), 0.4);
        assert_eq!(impact_score(SourceType::Patent), 0.3);
    }
}

//! Lexical semantic scorer.
//!
//! score(q, a) = (Σ weighted field hits × matched / total) / total
//!
//! where `total` is the size of the expanded term set and `matched` the
//! number of distinct expanded terms found anywhere in the article. The
//! second division by `total` discounts broad expansions with a low match
//! rate.

use std::collections::BTreeSet;

use litmux_common::Article;
use tracing::debug;

use crate::expansion::{expand_query, generate_suggestions};
use crate::similar::find_similar;
use crate::tables::{TermTable, CONCEPTS, SYNONYMS};
use crate::weights::FieldWeights;

/// Scores closer than this are ordered by trending score instead.
pub const TIE_EPSILON: f64 = 0.1;

#[derive(Debug, Clone)]
pub struct SemanticScorer {
    weights: FieldWeights,
    synonyms: TermTable,
    concepts: TermTable,
}

impl Default for SemanticScorer {
    fn default() -> Self {
        Self::new(FieldWeights::default(), SYNONYMS, CONCEPTS)
    }
}

impl SemanticScorer {
    pub fn new(weights: FieldWeights, synonyms: TermTable, concepts: TermTable) -> Self {
        Self { weights, synonyms, concepts }
    }

    pub fn expand_query(&self, query: &str) -> BTreeSet<String> {
        expand_query(query, &[self.synonyms, self.concepts])
    }

    pub fn generate_search_suggestions(&self, partial: &str) -> Vec<String> {
        generate_suggestions(partial, &[self.synonyms, self.concepts])
    }

    pub fn calculate_similarity_score(&self, query: &str, article: &Article) -> f64 {
        if query.trim().is_empty() {
            return 0.0;
        }
        let terms = self.expand_query(query);
        let total = terms.len() as f64;

        let title = article.title.to_lowercase();
        let abstract_text = article.abstract_text.to_lowercase();
        let keywords: Vec<String> = article.keywords.iter().map(|k| k.to_lowercase()).collect();

        let mut weighted = 0.0;
        let mut matched = 0usize;
        for term in &terms {
            let term = term.to_lowercase();
            let mut hit = false;
            if title.contains(&term) {
                weighted += self.weights.title;
                hit = true;
            }
            if abstract_text.contains(&term) {
                weighted += self.weights.abstract_text;
                hit = true;
            }
            if keywords.iter().any(|k| k.contains(&term)) {
                weighted += self.weights.keyword;
                hit = true;
            }
            if hit {
                matched += 1;
            }
        }

        let match_ratio = matched as f64 / total;
        (weighted * match_ratio) / total
    }

    /// Annotates every article with its score and orders by it, descending.
    ///
    /// Runs of articles whose scores lie within [`TIE_EPSILON`] of the run's
    /// leader are re-ordered by trending score, descending; equal trending
    /// scores keep their prior order.
    pub fn enhance_search_results(&self, query: &str, mut articles: Vec<Article>) -> Vec<Article> {
        for article in articles.iter_mut() {
            article.search_score = Some(self.calculate_similarity_score(query, article));
        }

        let score = |a: &Article| a.search_score.unwrap_or(0.0);
        articles.sort_by(|a, b| score(b).total_cmp(&score(a)));

        let mut start = 0;
        while start < articles.len() {
            let leader = score(&articles[start]);
            let mut end = start + 1;
            while end < articles.len() && leader - score(&articles[end]) < TIE_EPSILON {
                end += 1;
            }
            articles[start..end].sort_by(|a, b| b.trending_score.total_cmp(&a.trending_score));
            start = end;
        }

        debug!(query, count = articles.len(), "re-ranked results");
        articles
    }

    pub fn find_similar_articles(&self, target: &Article, candidates: &[Article], limit: usize) -> Vec<Article> {
        find_similar(self.concepts, target, candidates, limit)
    }
}

//! Concept-overlap similarity between articles.

use std::collections::BTreeMap;

use litmux_common::Article;

use crate::tables::TermTable;

/// Added per category the two articles share.
pub const SHARED_CATEGORY_BONUS: f64 = 0.3;
/// Candidates at or below this score are dropped.
pub const MIN_SIMILARITY: f64 = 0.1;

/// Relevance of `article` to every concept present in it: the fraction of
/// the concept's vocabulary found in title, abstract or keywords.
pub fn concept_profile(concepts: TermTable, article: &Article) -> BTreeMap<&'static str, f64> {
    let text = format!(
        "{} {} {}",
        article.title,
        article.abstract_text,
        article.keywords.join(" ")
    )
    .to_lowercase();

    concepts
        .iter()
        .filter_map(|(concept, terms)| {
            let found = terms.iter().filter(|t| text.contains(*t)).count();
            (found > 0).then(|| (*concept, found as f64 / terms.len() as f64))
        })
        .collect()
}

fn similarity(
    target_profile: &BTreeMap<&'static str, f64>,
    target: &Article,
    concepts: TermTable,
    candidate: &Article,
) -> f64 {
    let profile = concept_profile(concepts, candidate);
    let concept_overlap: f64 = target_profile
        .iter()
        .filter_map(|(concept, t)| profile.get(concept).map(|c| t.min(*c)))
        .sum();

    let shared_categories = candidate
        .categories
        .iter()
        .filter(|c| target.categories.iter().any(|t| t.eq_ignore_ascii_case(c)))
        .count();

    concept_overlap + SHARED_CATEGORY_BONUS * shared_categories as f64
}

/// Up to `limit` candidates most similar to `target`, best first, each
/// annotated with its similarity in `search_score`. The target itself is
/// never returned.
pub fn find_similar(concepts: TermTable, target: &Article, candidates: &[Article], limit: usize) -> Vec<Article> {
    let target_profile = concept_profile(concepts, target);

    let mut scored: Vec<(f64, &Article)> = candidates
        .iter()
        .filter(|c| c.id != target.id)
        .map(|c| (similarity(&target_profile, target, concepts, c), c))
        .filter(|(score, _)| *score > MIN_SIMILARITY)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(score, article)| {
            let mut article = article.clone();
            article.search_score = Some(score);
            article
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::CONCEPTS;
    use litmux_test_utils::ArticleBuilder;

    #[test]
    fn test_concept_profile_fractions() {
        let a = ArticleBuilder::new("a")
            .title("fMRI connectivity")
            .abstract_text("Resting-state imaging")
            .build();
        let p = concept_profile(CONCEPTS, &a);
        // neuroimaging: fmri, mri, imaging, connectivity → all 4 present
        assert_eq!(p.get("neuroimaging"), Some(&1.0));
        assert!(p.get("immunology").is_none());
    }

    #[test]
    fn test_similar_ranks_by_overlap_and_categories() {
        let target = ArticleBuilder::new("t")
            .title("CRISPR Cas9 gene editing with AAV vectors")
            .categories(&["genomics"])
            .build();
        let close = ArticleBuilder::new("close")
            .title("AAV delivery of CRISPR Cas9")
            .categories(&["genomics"])
            .build();
        let category_only = ArticleBuilder::new("cat")
            .title("Unrelated wording")
            .categories(&["genomics"])
            .build();
        let far = ArticleBuilder::new("far").title("Bird migration").build();

        let candidates = vec![far, category_only, close, target.clone()];
        let similar = find_similar(CONCEPTS, &target, &candidates, 10);
        let ids: Vec<&str> = similar.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["close", "cat"]);
        assert!((similar[1].search_score.unwrap() - SHARED_CATEGORY_BONUS).abs() < 1e-12);
    }

    #[test]
    fn test_similar_respects_limit() {
        let target = ArticleBuilder::new("t").title("x").categories(&["ai"]).build();
        let candidates: Vec<Article> = (0..5)
            .map(|i| ArticleBuilder::new(&format!("c{i}")).title("y").categories(&["ai"]).build())
            .collect();
        assert_eq!(find_similar(CONCEPTS, &target, &candidates, 2).len(), 2);
    }
}

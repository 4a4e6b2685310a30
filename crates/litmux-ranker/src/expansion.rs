//! Query expansion and search-as-you-type suggestions over the static tables.

use std::collections::BTreeSet;

use crate::tables::TermTable;

/// Maximum number of suggestions returned for a partial query.
pub const MAX_SUGGESTIONS: usize = 8;

/// Expands `query` with every related term whose table key occurs in it.
///
/// The original query is always part of the result, verbatim.
pub fn expand_query(query: &str, tables: &[TermTable]) -> BTreeSet<String> {
    let mut terms = BTreeSet::new();
    terms.insert(query.to_string());

    let lowered = query.to_lowercase();
    if lowered.trim().is_empty() {
        return terms;
    }

    for table in tables {
        for (key, related) in table.iter() {
            if lowered.contains(key) {
                terms.extend(related.iter().map(|t| t.to_string()));
            }
        }
    }
    terms
}

/// Table keys and values matching `partial` as a substring in either direction.
pub fn generate_suggestions(partial: &str, tables: &[TermTable]) -> Vec<String> {
    let needle = partial.trim().to_lowercase();
    if needle.is_empty() {
        return vec![];
    }

    let matches = |term: &str| term.contains(&needle) || needle.contains(term);

    let mut seen = BTreeSet::new();
    let mut out = Vec::new();
    for table in tables {
        for (key, related) in table.iter() {
            for term in std::iter::once(key).chain(related.iter()) {
                if out.len() == MAX_SUGGESTIONS {
                    return out;
                }
                if matches(*term) && seen.insert(*term) {
                    out.push(term.to_string());
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::{CONCEPTS, SYNONYMS};
    use pretty_assertions::assert_eq;

    const TABLES: [TermTable; 2] = [SYNONYMS, CONCEPTS];

    #[test]
    fn test_expansion_contains_query_verbatim() {
        for q in ["", "  ", "CRISPR gene editing", "quantum gravity"] {
            assert!(expand_query(q, &TABLES).contains(q));
        }
    }

    #[test]
    fn test_expansion_is_case_insensitive() {
        let terms = expand_query("New CRISPR screens", &TABLES);
        assert!(terms.contains("cas9"));
        assert!(terms.contains("genome editing"));
    }

    #[test]
    fn test_expansion_pulls_concept_vocabulary() {
        let terms = expand_query("deep machine learning", &TABLES);
        assert!(terms.contains("classifier"));
        assert!(terms.contains("neural network"));
    }

    #[test]
    fn test_unrelated_query_expands_to_itself() {
        let terms = expand_query("volcanic ash", &TABLES);
        assert_eq!(terms.len(), 1);
    }

    #[test]
    fn test_suggestions_match_both_directions() {
        let s = generate_suggestions("gene", &TABLES);
        assert!(s.contains(&"gene editing".to_string()));
        assert!(s.contains(&"gene therapy".to_string()));

        // key contained in a longer partial
        let s = generate_suggestions("eeg recordings", &TABLES);
        assert!(s.contains(&"eeg".to_string()));
    }

    #[test]
    fn test_suggestions_capped_and_unique() {
        let s = generate_suggestions("e", &TABLES);
        assert_eq!(s.len(), MAX_SUGGESTIONS);
        let unique: BTreeSet<_> = s.iter().collect();
        assert_eq!(unique.len(), s.len());
        assert!(generate_suggestions("   ", &TABLES).is_empty());
    }
}

//! Per-field weights for lexical match scoring.

use serde::{Deserialize, Serialize};

/// Weight added when an expanded term is found in each article field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldWeights {
    pub title: f64,
    pub abstract_text: f64,
    pub keyword: f64,
}

impl Default for FieldWeights {
    fn default() -> Self {
        Self {
            title:         3.0,
            abstract_text: 2.0,
            keyword:       1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights() {
        let w = FieldWeights::default();
        assert_eq!((w.title, w.abstract_text, w.keyword), (3.0, 2.0, 1.0));
    }
}

//! litmux-ranker — Deterministic lexical re-ranking of aggregated search results.
//!
//! Queries are expanded through static synonym and concept tables, then every
//! article is scored by weighted substring matches of the expanded terms.
//! No learned relevance model is involved.

pub mod tables;
pub mod weights;
pub mod expansion;
pub mod scorer;
pub mod similar;

pub use scorer::SemanticScorer;
pub use weights::FieldWeights;

//! litmux-ingestion — Literature search across external sources.
//! - Source clients (PubMed, arXiv, bioRxiv) and record normalisation
//! - Result cache and per-source rate limiting
//! - Local store collaborator
//! - Concurrent aggregation, deduplication and synthetic fallback

pub mod sources;
pub mod normalise;
pub mod query;
pub mod cache;
pub mod rate_limit;
pub mod local;
pub mod dedup;
pub mod fallback;
pub mod aggregator;

pub use aggregator::{Aggregator, SearchOptions};
pub use cache::{CacheStats, ResultCache};
pub use local::{InMemoryLocalStore, LocalSearchOptions, LocalStore};
pub use rate_limit::{RateLimitStats, RateLimiter};
pub use sources::LiteratureSource;

//! litmux-common — Shared types, errors, and configuration used across all litmux crates.

pub mod error;
pub mod article;
pub mod config;
pub mod sandbox;
pub mod search;

// Re-export commonly used types
pub use article::{Article, ArticleMetrics, ArticleSource, ArticleStatus, Author, SourceKind, SourceType};
pub use config::LitmuxConfig;
pub use error::{ApiError, LitmuxError};

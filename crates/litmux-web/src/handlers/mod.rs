//! HTTP handlers for all API routes.

pub mod search;
pub mod system;

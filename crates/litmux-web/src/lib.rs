//! litmux-web — HTTP surface for litmux
//!   - Aggregated literature search (GET/POST /api/search)
//!   - Query suggestions
//!   - System status and operational controls

pub mod router;
pub mod handlers;
pub mod state;

//! System status and operational controls.

use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use litmux_common::error::ApiError;
use litmux_common::SourceKind;
use litmux_ingestion::{CacheStats, RateLimitStats};

use crate::state::SharedState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub physical_bytes: usize,
    pub virtual_bytes: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub cache: CacheStats,
    pub rate_limits: RateLimitStats,
    pub sources: Vec<SourceKind>,
    pub uptime_secs: u64,
    /// `None` on platforms where process memory cannot be read.
    pub memory: Option<MemoryUsage>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse<T> {
    pub success: bool,
    pub data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemActionRequest {
    pub action: String,
    pub service: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub action: String,
    pub service: Option<String>,
    pub applied: bool,
}

fn memory_usage() -> Option<MemoryUsage> {
    memory_stats::memory_stats().map(|m| MemoryUsage {
        physical_bytes: m.physical_mem,
        virtual_bytes: m.virtual_mem,
    })
}

/// GET /api/system/status
pub async fn system_status(State(state): State<SharedState>) -> Json<StatusResponse<SystemStatus>> {
    let aggregator = &state.aggregator;
    let status = SystemStatus {
        cache: aggregator.cache().stats().await,
        rate_limits: aggregator.limiter().stats().await,
        sources: aggregator.source_kinds(),
        uptime_secs: state.uptime_secs(),
        memory: memory_usage(),
    };
    Json(StatusResponse { success: true, data: status })
}

/// POST /api/system/status — `{action: "resetRateLimit" | "flushCache", service?}`
pub async fn system_action(
    State(state): State<SharedState>,
    body: Result<Json<SystemActionRequest>, JsonRejection>,
) -> Result<Json<StatusResponse<ActionOutcome>>, ApiError> {
    let Json(req) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let service = match req.service.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => Some(
            name.parse::<SourceKind>()
                .map_err(ApiError::BadRequest)?
                .as_str()
                .to_string(),
        ),
        None => None,
    };

    let applied = match req.action.as_str() {
        "resetRateLimit" => state.aggregator.limiter().reset_limits(service.as_deref()).await,
        "flushCache" => state.aggregator.cache().flush().await,
        other => return Err(ApiError::BadRequest(format!("unknown action: {other}"))),
    };
    info!(action = %req.action, service = ?service, applied, "system action");

    Ok(Json(StatusResponse {
        success: true,
        data: ActionOutcome { action: req.action, service, applied },
    }))
}

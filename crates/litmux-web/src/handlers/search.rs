//! Literature search endpoints.
//! Aggregates external sources and the local store, then filters, sorts and
//! paginates the ranked list.

use axum::{
    extract::{rejection::{JsonRejection, QueryRejection}, Query, State},
    Json,
};
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use litmux_common::error::ApiError;
use litmux_common::search::{
    sort_articles, DateRange, PageInfo, Pagination, Range, SearchFilters, SearchType, SortOrder, SortSpec,
};
use litmux_common::{Article, ArticleStatus, SourceKind};
use litmux_ingestion::query::merged_cache_key;
use litmux_ingestion::SearchOptions;

use crate::state::SharedState;

/// Query string accepted by `GET /api/search`. List values are comma-separated.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub q: Option<String>,
    #[serde(rename = "type")]
    pub search_type: Option<String>,
    pub categories: Option<String>,
    pub authors: Option<String>,
    pub sources: Option<String>,
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub min_citations: Option<u32>,
    pub max_citations: Option<u32>,
    pub min_impact: Option<f64>,
    pub max_impact: Option<f64>,
}

/// JSON body accepted by `POST /api/search`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchBody {
    pub query: String,
    #[serde(rename = "type")]
    pub search_type: SearchType,
    pub filters: SearchFilters,
    pub pagination: Pagination,
    pub sort: SortSpec,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchMeta {
    pub query: String,
    pub local_count: usize,
    pub external_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: Vec<Article>,
    pub pagination: PageInfo,
    pub meta: SearchMeta,
}

#[derive(Debug, Deserialize)]
pub struct SuggestionParams {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SuggestionResponse {
    pub success: bool,
    pub data: Vec<String>,
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl SearchParams {
    fn into_body(self) -> Result<SearchBody, ApiError> {
        let search_type = self
            .search_type
            .as_deref()
            .unwrap_or("all")
            .parse::<SearchType>()
            .map_err(ApiError::BadRequest)?;
        let by = self
            .sort_by
            .as_deref()
            .unwrap_or("relevance")
            .parse()
            .map_err(ApiError::BadRequest)?;
        let order = match self.sort_order.as_deref().map(str::to_lowercase).as_deref() {
            None | Some("desc") => SortOrder::Desc,
            Some("asc") => SortOrder::Asc,
            Some(other) => return Err(ApiError::BadRequest(format!("unknown sort order: {other}"))),
        };
        let status = split_list(self.status.as_deref())
            .iter()
            .map(|s| s.parse::<ArticleStatus>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(ApiError::BadRequest)?;

        Ok(SearchBody {
            query: self.q.unwrap_or_default(),
            search_type,
            filters: SearchFilters {
                categories: split_list(self.categories.as_deref()),
                authors: split_list(self.authors.as_deref()),
                sources: split_list(self.sources.as_deref()),
                date_range: DateRange { from: self.date_from, to: self.date_to },
                citation_range: Range { min: self.min_citations, max: self.max_citations },
                impact_range: Range { min: self.min_impact, max: self.max_impact },
                status,
            },
            pagination: Pagination::new(self.page, self.limit),
            sort: SortSpec { by, order },
        })
    }
}

/// GET /api/search
pub async fn search_get(
    State(state): State<SharedState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    run_search(state, params.into_body()?).await
}

/// POST /api/search
pub async fn search_post(
    State(state): State<SharedState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(body) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    run_search(state, body).await
}

/// GET /api/search/suggestions
pub async fn search_suggestions(
    State(state): State<SharedState>,
    Query(params): Query<SuggestionParams>,
) -> Json<SuggestionResponse> {
    let data = state.aggregator.scorer().generate_search_suggestions(&params.q);
    Json(SuggestionResponse { success: true, data })
}

/// Merged lists live briefly so paging through one search reuses a single
/// fan-out.
const MERGED_TTL: Duration = Duration::from_secs(600);

fn scope(search_type: SearchType, external: bool) -> &'static str {
    match (external, search_type.includes_local()) {
        (true, true) => "all",
        (true, false) => "external",
        (false, _) => "local",
    }
}

async fn run_search(state: SharedState, body: SearchBody) -> Result<Json<SearchResponse>, ApiError> {
    let query = body.query.trim().to_string();
    let pagination = body.pagination.normalized();

    // Source names in the filter narrow the external fan-out; "local" is
    // handled by the filter pass.
    let kinds: Vec<SourceKind> = body
        .filters
        .sources
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();
    let external = body.search_type.includes_external() && (body.filters.sources.is_empty() || !kinds.is_empty());

    // Every page of a search is cut from the same bounded fetch.
    let options = SearchOptions {
        sources: kinds,
        max_results: state.config.sources.max_fetch,
        use_cache: true,
        categories: body.filters.categories.clone(),
        include_local: body.search_type.includes_local(),
    };
    let key = merged_cache_key(
        &query,
        &options.sources,
        &options.categories,
        scope(body.search_type, external),
        options.max_results,
    );

    let cache = state.aggregator.cache().clone();
    let articles = match cache.get::<Vec<Article>>(&key).await {
        Some(hit) => hit,
        None => {
            let aggregator = state.aggregator.clone();
            let task_query = query.clone();
            let articles = tokio::spawn(async move {
                if external {
                    aggregator.enhanced_search(&task_query, &options).await
                } else {
                    aggregator.search_local(&task_query, &options).await
                }
            })
            .await
            .map_err(|e| ApiError::Internal(format!("search task failed: {e}")))?;

            if articles.iter().any(|a| !a.is_synthetic) {
                cache.set(&key, &articles, Some(MERGED_TTL)).await;
            }
            articles
        }
    };

    // Placeholders stand in for an outage; filtering them would hand the
    // caller an empty page.
    let degraded = !articles.is_empty() && articles.iter().all(|a| a.is_synthetic);
    let mut filtered = if degraded { articles } else { body.filters.apply(articles) };
    sort_articles(&mut filtered, body.sort);

    let local_count = filtered.iter().filter(|a| a.is_local).count();
    let total_count = filtered.len();
    let (data, page_info) = pagination.paginate(filtered);

    info!(query = %query, total = total_count, local = local_count, degraded, "search served");
    Ok(Json(SearchResponse {
        success: true,
        data,
        pagination: page_info,
        meta: SearchMeta {
            query,
            local_count,
            external_count: total_count - local_count,
            total_count,
        },
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use litmux_common::search::SortBy;

    #[test]
    fn test_params_into_body() {
        let params = SearchParams {
            q: Some("crispr".into()),
            search_type: Some("external".into()),
            categories: Some("genomics, neuroscience,".into()),
            sources: Some("pubmed,arxiv".into()),
            status: Some("preprint".into()),
            sort_by: Some("citations".into()),
            sort_order: Some("asc".into()),
            limit: Some(500),
            page: Some(0),
            min_citations: Some(3),
            ..SearchParams::default()
        };
        let body = params.into_body().unwrap();
        assert_eq!(body.search_type, SearchType::External);
        assert_eq!(body.filters.categories, vec!["genomics".to_string(), "neuroscience".to_string()]);
        assert_eq!(body.filters.status, vec![ArticleStatus::Preprint]);
        assert_eq!(body.filters.citation_range.min, Some(3));
        assert_eq!(body.sort, SortSpec { by: SortBy::Citations, order: SortOrder::Asc });
        assert_eq!(body.pagination, Pagination { page: 1, limit: 100 });
    }

    #[test]
    fn test_invalid_params_rejected() {
        let bad_type = SearchParams { search_type: Some("remote".into()), ..SearchParams::default() };
        assert!(matches!(bad_type.into_body(), Err(ApiError::BadRequest(_))));

        let bad_sort = SearchParams { sort_by: Some("colour".into()), ..SearchParams::default() };
        assert!(matches!(bad_sort.into_body(), Err(ApiError::BadRequest(_))));

        let bad_order = SearchParams { sort_order: Some("sideways".into()), ..SearchParams::default() };
        assert!(matches!(bad_order.into_body(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_post_body_defaults() {
        let body: SearchBody = serde_json::from_str(r#"{"query": "bci"}"#).unwrap();
        assert_eq!(body.search_type, SearchType::All);
        assert_eq!(body.pagination, Pagination::default());
        assert_eq!(body.sort, SortSpec::default());
    }
}

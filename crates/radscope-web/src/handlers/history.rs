//! Stored analyses: history, statistics, search and deletion.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use radscope_db::{AnalysisRecord, AnalysisStatistics, Category};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::handlers::{parse_id, Pagination};
use crate::state::{AppEvent, SharedState};

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub category: Option<String>,
    pub category_value: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub results: Vec<AnalysisRecord>,
    pub page: i64,
    pub limit: i64,
}

/// GET /api/history - newest first, optionally filtered by one column
pub async fn history(
    State(state): State<SharedState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let Query(query) = query?;
    let filter = match (query.category.as_deref(), query.category_value.as_deref()) {
        (Some(c), Some(v)) if !c.is_empty() && !v.is_empty() => Some((Category::parse(c)?, v)),
        _ => None,
    };
    let p = state.persistence()?;
    let pagination = Pagination { page: query.page, limit: query.limit };
    let (limit, offset) = (pagination.limit(), pagination.offset());

    let results = match filter {
        Some((category, value)) => p.analyses.by_category(category, value, limit, offset).await?,
        None => p.analyses.history(limit, offset).await?,
    };
    Ok(Json(HistoryResponse { success: true, results, page: pagination.page(), limit }))
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub success: bool,
    pub statistics: AnalysisStatistics,
}

/// GET /api/statistics
pub async fn statistics(State(state): State<SharedState>) -> Result<Json<StatisticsResponse>, ApiError> {
    let statistics = state.persistence()?.analyses.statistics().await?;
    Ok(Json(StatisticsResponse { success: true, statistics }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub results: Vec<AnalysisRecord>,
    pub search_term: String,
}

/// GET /api/search?q=
pub async fn search(
    State(state): State<SharedState>,
    query: Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Query(query) = query?;
    let term = query.q.trim();
    if term.is_empty() {
        return Err(ApiError::BadRequest("Search term required".into()));
    }
    let results = state.persistence()?.analyses.search(term).await?;
    Ok(Json(SearchResponse { success: true, results, search_term: term.to_string() }))
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

/// DELETE /api/analysis/{id}/delete
pub async fn delete_analysis(
    State(state): State<SharedState>,
    id: Result<Path<String>, PathRejection>,
) -> Result<Json<MessageResponse>, ApiError> {
    let Path(id) = id?;
    let id = parse_id(&id, "analysis")?;
    if !state.persistence()?.analyses.delete(id).await? {
        return Err(ApiError::NotFound("Analysis not found".into()));
    }
    state.publish(AppEvent::AnalysisDeleted { analysis_id: id });
    Ok(Json(MessageResponse { success: true, message: "Analysis deleted successfully".into() }))
}

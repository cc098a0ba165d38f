//! Health, capabilities and generation audit.

use std::collections::BTreeMap;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use radscope_db::GenerationLog;
use radscope_dicom::{modality_description, SUPPORTED_MODALITIES};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub analyzer_ready: bool,
    /// `connected`, `unreachable` or `disabled`
    pub database: &'static str,
    pub total_analyses: Option<i64>,
    pub storage: &'static str,
    pub ai_providers: Vec<String>,
    pub vision_enabled: bool,
    pub active_sessions: usize,
}

/// GET /api/health
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let (database, total_analyses) = match &state.persistence {
        None => ("disabled", None),
        Some(p) => match p.analyses.count().await {
            Ok(n) => ("connected", Some(n)),
            Err(e) => {
                tracing::warn!(error = %e, "Health check could not reach the database");
                ("unreachable", None)
            }
        },
    };

    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        analyzer_ready: true,
        database,
        total_analyses,
        storage: state.storage.backend(),
        ai_providers: state.llm.providers(),
        vision_enabled: state.llm.vision_enabled(),
        active_sessions: state.sessions.len().await,
    })
}

#[derive(Debug, Serialize)]
pub struct ModalitiesResponse {
    pub modalities: Vec<&'static str>,
    pub descriptions: BTreeMap<&'static str, &'static str>,
}

/// GET /api/modalities
pub async fn modalities() -> Json<ModalitiesResponse> {
    Json(ModalitiesResponse {
        modalities: SUPPORTED_MODALITIES.to_vec(),
        descriptions: SUPPORTED_MODALITIES
            .iter()
            .map(|m| (*m, modality_description(m)))
            .collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub success: bool,
    pub logs: Vec<GenerationLog>,
}

/// GET /api/generation-logs - recent report and summary generations
pub async fn generation_logs(
    State(state): State<SharedState>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> Result<Json<LogsResponse>, ApiError> {
    let Query(query) = query?;
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let logs = state.persistence()?.logs.recent(limit).await?;
    Ok(Json(LogsResponse { success: true, logs }))
}

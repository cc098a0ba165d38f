//! AI summaries of one study and combined analysis of several.

use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use radscope_db::{AiAnalysisKind, AiAnalysisRecord, GenerationKind, GenerationLog};
use radscope_llm::{
    analyze_batch, clinical_summary, BatchAnalysis, ClinicalSummary, LlmError, LlmTask, SummaryOutcome,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{analysis_from_value, parse_id, provider_for, AnalysisPayload};
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct AiAnalysisResponse {
    pub success: bool,
    pub ai_analysis: ClinicalSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_analysis_id: Option<Uuid>,
}

/// POST /api/ai-analysis - clinical summary of one upload
pub async fn ai_analysis(
    State(state): State<SharedState>,
    payload: Result<Json<AnalysisPayload>, JsonRejection>,
) -> Result<Json<AiAnalysisResponse>, ApiError> {
    if !state.llm.has_backend(LlmTask::Summary) {
        return Err(LlmError::Unavailable("No AI provider configured".into()).into());
    }
    let Json(payload) = payload?;
    let (result, database_id) = payload.into_analysis()?;

    let started = Instant::now();
    let outcome = clinical_summary(&state.llm, &result).await;
    let latency_ms = started.elapsed().as_millis() as i64;
    let provider = provider_for(&state.llm, LlmTask::Summary);

    let Some(p) = &state.persistence else {
        let ai_analysis = outcome?.summary;
        return Ok(Json(AiAnalysisResponse { success: true, ai_analysis, ai_analysis_id: None }));
    };

    let mut entry = GenerationLog::new(GenerationKind::ClinicalSummary);
    entry.analysis_id = database_id;
    entry.provider = provider.clone();
    entry.latency_ms = latency_ms;

    let ai_analysis = match outcome {
        Ok(SummaryOutcome { summary, provider_error }) => {
            entry.error = provider_error.map(|e| e.to_string());
            summary
        }
        Err(e) => {
            entry.error = Some(e.to_string());
            p.log_generation(entry).await;
            return Err(e.into());
        }
    };
    if let Some(text) = &ai_analysis.clinical_summary {
        entry = entry.with_output(text);
    }
    entry.enhanced = ai_analysis.enhanced;
    p.log_generation(entry).await;

    let raw = serde_json::to_value(&ai_analysis).map_err(|e| ApiError::Internal(e.to_string()))?;
    let mut record = AiAnalysisRecord::new(AiAnalysisKind::Summary, raw);
    record.analysis_id = database_id;
    record.provider = provider;
    record.clinical_summary = ai_analysis.clinical_summary.clone();
    record.risk_assessment = Some(ai_analysis.risk_assessment.clone());
    record.confidence_level = Some(ai_analysis.confidence_level.clone());
    record.enhanced = ai_analysis.enhanced;

    let ai_analysis_id = match p.ai_analyses.insert(&record).await {
        Ok(id) => Some(id),
        Err(e) => {
            tracing::error!(error = %e, "Could not store AI analysis");
            None
        }
    };
    Ok(Json(AiAnalysisResponse { success: true, ai_analysis, ai_analysis_id }))
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub analysis_results: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub success: bool,
    pub ai_analysis: BatchAnalysis,
}

/// POST /api/batch-analysis - combined analysis feeding the AI report
pub async fn batch_analysis(
    State(state): State<SharedState>,
    payload: Result<Json<BatchRequest>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(req) = payload?;
    if req.analysis_results.is_empty() {
        return Err(ApiError::BadRequest("No analysis results provided".into()));
    }

    let mut results = Vec::with_capacity(req.analysis_results.len());
    let mut related = Vec::new();
    for value in req.analysis_results {
        let (result, database_id) = analysis_from_value(value)?;
        results.push(result);
        related.extend(database_id);
    }

    let ai_analysis = analyze_batch(&state.llm, &results).await;
    tracing::info!(files = results.len(), "Batch analysis completed");

    if let Some(p) = &state.persistence {
        let raw = serde_json::to_value(&ai_analysis).map_err(|e| ApiError::Internal(e.to_string()))?;
        let mut record = AiAnalysisRecord::new(AiAnalysisKind::Batch, raw);
        record.related_analyses = related;
        record.files_analyzed = results.len() as i32;
        record.provider = provider_for(&state.llm, LlmTask::Batch);
        record.clinical_summary = Some(ai_analysis.summary.clone());
        record.risk_assessment = Some(ai_analysis.risk_assessment.clone());
        if let Err(e) = p.ai_analyses.insert(&record).await {
            tracing::error!(error = %e, "Could not store batch analysis");
        }
    }

    Ok(Json(BatchResponse { success: true, ai_analysis }))
}

#[derive(Debug, Serialize)]
pub struct StoredAiAnalysis {
    pub success: bool,
    pub ai_analysis: AiAnalysisRecord,
}

/// GET /api/ai-analysis/{analysis_id} - latest stored summary
pub async fn latest_ai_analysis(
    State(state): State<SharedState>,
    analysis_id: Result<Path<String>, PathRejection>,
) -> Result<Json<StoredAiAnalysis>, ApiError> {
    let Path(analysis_id) = analysis_id?;
    let analysis_id = parse_id(&analysis_id, "analysis")?;
    let ai_analysis = state
        .persistence()?
        .ai_analyses
        .latest_for_analysis(analysis_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("No AI analysis for this study".into()))?;
    Ok(Json(StoredAiAnalysis { success: true, ai_analysis }))
}

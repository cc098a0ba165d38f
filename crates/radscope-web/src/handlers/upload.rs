//! Upload, validation and re-analysis of DICOM files.

use std::path::{Path as FsPath, PathBuf};

use axum::{
    extract::{rejection::PathRejection, Multipart, Path, State},
    Json,
};
use chrono::Utc;
use radscope_analysis::{apply_vision, AnalysisError, Analyzer};
use radscope_common::{AnalysisResult, StudyMetadata};
use radscope_db::{AnalysisRecord, PatientReportRecord};
use radscope_dicom::{encode_for_vision, VISION_MIME};
use radscope_llm::{assess_image, LlmTask};
use serde::Serialize;
use uuid::Uuid;

use crate::error::{ApiError, INVALID_FILE_TYPE};
use crate::state::{AppEvent, SharedState};
use crate::uploads::{allowed_file, read_file_field, resolve_stored, save, sha256_hex, stored_name};

/// Analysis plus the identifiers the browser needs to keep patients apart.
#[derive(Debug, Serialize)]
pub struct UploadResult {
    #[serde(flatten)]
    pub analysis: AnalysisResult,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_id: Option<Uuid>,
    pub cache_buster: i64,
    pub analysis_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_checksum: Option<String>,
    pub patient_isolation: bool,
}

impl UploadResult {
    fn new(analysis: AnalysisResult, filename: String) -> Self {
        let now = Utc::now();
        let analysis_id = format!("{}_{}", analysis.body_part, now.timestamp());
        Self {
            analysis,
            filename,
            database_id: None,
            report_id: None,
            cache_buster: now.timestamp_millis(),
            analysis_id,
            session_id: None,
            session_checksum: None,
            patient_isolation: false,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub result: UploadResult,
    pub timestamp: i64,
    pub force_refresh: bool,
}

impl UploadResponse {
    fn new(result: UploadResult) -> Self {
        Self { success: true, result, timestamp: Utc::now().timestamp(), force_refresh: true }
    }
}

/// Decoded study, its analysis and, when wanted, the frame encoded for the
/// vision model.
struct Analysed {
    result: AnalysisResult,
    metadata: StudyMetadata,
    vision_image: Option<(String, [u32; 2])>,
}

fn analyse_upload(
    analyzer: &Analyzer,
    path: &FsPath,
    filename: &str,
    want_vision: bool,
) -> Result<Analysed, AnalysisError> {
    let study = radscope_dicom::load(path)?;
    if study.image.width() == 0 || study.image.height() == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    let result = analyzer.analyze(&study.metadata, &study.image, Some(filename));

    let vision_image = if want_vision {
        match encode_for_vision(&study.image) {
            Ok(b64) => Some((b64, [study.image.width(), study.image.height()])),
            Err(e) => {
                tracing::warn!(error = %e, "Could not encode frame for vision model");
                None
            }
        }
    } else {
        None
    };

    Ok(Analysed { result, metadata: study.metadata, vision_image })
}

/// POST /api/upload - store, analyse, persist
pub async fn upload(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let file = read_file_field(multipart, state.max_upload_mb).await?;
    if !allowed_file(&file.filename) {
        return Err(ApiError::BadRequest(INVALID_FILE_TYPE.into()));
    }

    let filename = stored_name(&file.filename, Utc::now());
    let path = save(&state.upload_dir, &filename, &file.bytes).await?;
    let file_hash = sha256_hex(&file.bytes);
    let file_size = file.bytes.len() as u64;
    tracing::info!(%filename, size = file_size, "File uploaded");

    let want_vision = state.llm.vision_enabled() && state.llm.has_backend(LlmTask::Vision);
    let analyzer = state.analyzer.clone();
    let (task_path, task_name) = (path.clone(), filename.clone());
    let analysed = tokio::task::spawn_blocking(move || {
        analyse_upload(&analyzer, &task_path, &task_name, want_vision)
    })
    .await?;

    let Analysed { mut result, metadata, vision_image } = match analysed {
        Ok(a) => a,
        Err(e) => {
            tracing::warn!(%filename, error = %e, "Analysis failed");
            if let Err(rm) = tokio::fs::remove_file(&path).await {
                tracing::debug!(error = %rm, "Could not remove rejected upload");
            }
            return Err(e.into());
        }
    };

    if let Some((b64, size)) = vision_image {
        match assess_image(&state.llm, &metadata, size, VISION_MIME, &b64).await {
            Ok(vision) => apply_vision(&mut result, vision),
            Err(e) => tracing::warn!(error = %e, "Vision enrichment skipped"),
        }
    }

    let patient = &result.patient_info;
    let session = state
        .sessions
        .create(
            patient.display_name(),
            patient.display_id(),
            patient.study_date.as_deref().unwrap_or("Unknown"),
            result.body_part.as_str(),
            &filename,
        )
        .await;
    tracing::info!(session_id = %session.session_id, "Isolated patient session created");

    let mut response = UploadResult::new(result, filename.clone());
    response.session_id = Some(session.session_id.clone());
    response.session_checksum = Some(session.checksum.clone());
    response.patient_isolation = true;

    if let Some(p) = &state.persistence {
        let record = AnalysisRecord::from_analysis(&response.analysis, &metadata, &filename, &file_hash, file_size)
            .with_session(&session.session_id);
        match p.analyses.insert(&record).await {
            Ok(id) => response.database_id = Some(id),
            Err(e) => tracing::error!(error = %e, "Could not store analysis"),
        }

        let report = PatientReportRecord::from_analysis(response.database_id, &response.analysis);
        match p.reports.insert(&report).await {
            Ok(id) => response.report_id = Some(id),
            Err(e) => tracing::error!(error = %e, "Could not store patient report"),
        }
    }

    tracing::info!(%filename, body_part = %response.analysis.body_part, "Analysis completed");
    state.publish(AppEvent::AnalysisCompleted {
        filename,
        body_part: response.analysis.body_part.to_string(),
        session_id: session.session_id,
        database_id: response.database_id,
    });

    Ok(Json(UploadResponse::new(response)))
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub filename: String,
    pub missing_tags: Vec<String>,
    pub modality: Option<String>,
    pub modality_supported: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /api/validate - tag check without analysis
pub async fn validate(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<ValidateResponse>, ApiError> {
    let file = read_file_field(multipart, state.max_upload_mb).await?;
    if !allowed_file(&file.filename) {
        return Err(ApiError::BadRequest(INVALID_FILE_TYPE.into()));
    }

    let temp_name = format!("temp_{}", stored_name(&file.filename, Utc::now()));
    let path: PathBuf = save(&state.upload_dir, &temp_name, &file.bytes).await?;
    let task_path = path.clone();
    let outcome = tokio::task::spawn_blocking(move || radscope_dicom::validate(task_path)).await;
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::debug!(error = %e, "Could not remove temporary upload");
    }

    let response = match outcome? {
        Ok(v) => ValidateResponse {
            valid: v.valid,
            filename: file.filename,
            missing_tags: v.missing_tags,
            modality: v.modality,
            modality_supported: v.modality_supported,
            error: None,
        },
        Err(e) => ValidateResponse {
            valid: false,
            filename: file.filename,
            missing_tags: Vec::new(),
            modality: None,
            modality_supported: false,
            error: Some(e.to_string()),
        },
    };
    Ok(Json(response))
}

/// GET /api/analysis/{filename} - analyse a stored upload again
pub async fn get_analysis(
    State(state): State<SharedState>,
    filename: Result<Path<String>, PathRejection>,
) -> Result<Json<UploadResponse>, ApiError> {
    let Path(filename) = filename?;
    let path = resolve_stored(&state.upload_dir, &filename)
        .ok_or_else(|| ApiError::NotFound("File not found".into()))?;

    let analyzer = state.analyzer.clone();
    let name = filename.clone();
    let result =
        tokio::task::spawn_blocking(move || analyzer.analyze_file_or_fallback(&path, Some(&name))).await?;

    Ok(Json(UploadResponse::new(UploadResult::new(result, filename))))
}

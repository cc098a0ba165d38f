//! PDF reports: the multi-study AI report and the per-patient radiologist report.

use std::time::Instant;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    response::Response,
    Json,
};
use base64::Engine as _;
use chrono::Utc;
use radscope_common::AnalysisResult;
use radscope_db::{object_path, GenerationKind, GenerationLog, PatientReportRecord, ReportStatus};
use radscope_llm::{generate_report, BatchAnalysis, LlmTask, RadiologistReport};
use radscope_report::{
    ai_report_filename, professional_report_filename, render_ai_report, render_professional_report,
    IndividualResult, ReportSubject,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::{parse_id, pdf_attachment, provider_for, AnalysisPayload, Pagination};
use crate::state::{AppEvent, AppState, SharedState};

// ── AI analysis report ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DownloadReportRequest {
    pub ai_analysis: Option<BatchAnalysis>,
    #[serde(default)]
    pub individual_results: Vec<IndividualResult>,
}

/// POST /api/download-report
pub async fn download_report(
    State(state): State<SharedState>,
    payload: Result<Json<DownloadReportRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(req) = payload?;
    let analysis = req
        .ai_analysis
        .ok_or_else(|| ApiError::BadRequest("No AI analysis data provided".into()))?;

    let started = Instant::now();
    let now = Utc::now();
    let results = req.individual_results;
    let summary = analysis.summary.clone();
    let bytes = tokio::task::spawn_blocking(move || render_ai_report(&analysis, &results, now)).await??;
    tracing::info!(size = bytes.len(), "AI report rendered");

    if let Some(p) = &state.persistence {
        let mut entry = GenerationLog::new(GenerationKind::AiReport).with_output(&summary);
        entry.latency_ms = started.elapsed().as_millis() as i64;
        p.log_generation(entry).await;
    }

    Ok(pdf_attachment(bytes, &ai_report_filename(now)))
}

// ── Radiologist report ──────────────────────────────────────────────────────

/// Report text plus the rendered PDF.
struct Rendered {
    report: RadiologistReport,
    pdf: Vec<u8>,
    latency_ms: i64,
}

async fn render_for(state: &AppState, result: &AnalysisResult, subject: ReportSubject) -> Result<Rendered, ApiError> {
    let started = Instant::now();
    let report = generate_report(&state.llm, result).await;
    let now = Utc::now();
    let task_report = report.clone();
    let pdf =
        tokio::task::spawn_blocking(move || render_professional_report(&subject, &task_report, now)).await??;
    Ok(Rendered { report, pdf, latency_ms: started.elapsed().as_millis() as i64 })
}

fn report_log(state: &AppState, rendered: &Rendered) -> GenerationLog {
    let mut entry = GenerationLog::new(GenerationKind::ProfessionalReport).with_output(&rendered.report.full_report);
    entry.enhanced = rendered.report.enhanced;
    entry.latency_ms = rendered.latency_ms;
    if rendered.report.enhanced {
        entry.provider = provider_for(&state.llm, LlmTask::Report);
    }
    entry
}

fn generated_message(enhanced: bool) -> String {
    format!(
        "Enhanced {} report generated successfully",
        if enhanced { "AI-powered" } else { "professional" }
    )
}

#[derive(Debug, Default, Serialize)]
pub struct ProfessionalReportResponse {
    pub success: bool,
    pub report_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enhanced: Option<bool>,
    pub message: String,
}

/// GET /api/professional-report/{report_id}
///
/// A stored PDF is returned as-is. Otherwise the report is written, rendered
/// and uploaded; when the upload fails the PDF comes back inline as base64.
pub async fn professional_report(
    State(state): State<SharedState>,
    report_id: Result<Path<String>, PathRejection>,
) -> Result<Json<ProfessionalReportResponse>, ApiError> {
    let Path(report_id) = report_id?;
    let report_id = parse_id(&report_id, "report")?;
    let p = state.persistence()?;
    let record = p
        .reports
        .find(report_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Report not found".into()))?;

    if let Some(url) = record.download_url() {
        let download_url = url.to_string();
        p.reports.update_status(report_id, ReportStatus::Downloaded).await?;
        tracing::info!(%report_id, "Serving stored report");
        return Ok(Json(ProfessionalReportResponse {
            success: true,
            report_id,
            download_url: Some(download_url),
            message: "PDF ready for download".into(),
            ..Default::default()
        }));
    }

    let institution = match record.analysis_id {
        Some(id) => p.analyses.find(id).await?.and_then(|a| a.institution_name),
        None => None,
    };
    let now = Utc::now();
    let subject = ReportSubject::from_analysis(&record.report_data, now)
        .with_names(record.patient_name.clone(), record.doctor_name.clone())
        .with_institution(institution)
        .with_report_date(record.report_date.clone());

    let rendered = render_for(&state, &record.report_data, subject).await?;
    let mut entry = report_log(&state, &rendered);
    entry.report_id = Some(report_id);
    entry.analysis_id = record.analysis_id;
    let enhanced = rendered.report.enhanced;
    let message = generated_message(enhanced);

    let path = object_path(&record.patient_id, report_id, now);
    let response = match state.storage.upload(&path, rendered.pdf.clone()).await {
        Ok(info) => {
            p.reports.attach_pdf(report_id, &info).await?;
            tracing::info!(%report_id, url = %info.public_url, enhanced, "Report stored");
            state.publish(AppEvent::ReportGenerated {
                report_id,
                download_url: info.public_url.clone(),
                enhanced,
            });
            ProfessionalReportResponse {
                success: true,
                report_id,
                download_url: Some(info.public_url),
                enhanced: Some(enhanced),
                message,
                ..Default::default()
            }
        }
        Err(e) => {
            tracing::error!(%report_id, error = %e, "Report storage failed, returning inline PDF");
            entry.error = Some(e.to_string());
            ProfessionalReportResponse {
                success: true,
                report_id,
                pdf_content: Some(base64::engine::general_purpose::STANDARD.encode(&rendered.pdf)),
                filename: Some(professional_report_filename(&record.patient_id, now)),
                enhanced: Some(enhanced),
                message,
                ..Default::default()
            }
        }
    };

    p.log_generation(entry).await;
    Ok(Json(response))
}

/// POST /api/generate-professional-report - render without storing
pub async fn generate_professional_report(
    State(state): State<SharedState>,
    payload: Result<Json<AnalysisPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(payload) = payload?;
    let (result, database_id) = payload.into_analysis()?;
    let now = Utc::now();
    let subject = ReportSubject::from_analysis(&result, now);
    let patient_id = subject.patient_id.clone();

    let rendered = render_for(&state, &result, subject).await?;
    tracing::info!(enhanced = rendered.report.enhanced, size = rendered.pdf.len(), "Professional report rendered");

    if let Some(p) = &state.persistence {
        let mut entry = report_log(&state, &rendered);
        entry.analysis_id = database_id;
        p.log_generation(entry).await;
    }

    Ok(pdf_attachment(rendered.pdf, &professional_report_filename(&patient_id, now)))
}

// ── Patient report rows ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PatientReportsResponse {
    pub success: bool,
    pub reports: Vec<PatientReportRecord>,
    pub page: i64,
    pub limit: i64,
}

/// GET /api/patient-reports
pub async fn patient_reports(
    State(state): State<SharedState>,
    pagination: Result<Query<Pagination>, QueryRejection>,
) -> Result<Json<PatientReportsResponse>, ApiError> {
    let Query(pagination) = pagination?;
    let limit = pagination.limit();
    let reports = state.persistence()?.reports.list(limit, pagination.offset()).await?;
    Ok(Json(PatientReportsResponse { success: true, reports, page: pagination.page(), limit }))
}

#[derive(Debug, Serialize)]
pub struct SavedReportResponse {
    pub success: bool,
    pub report_id: Uuid,
    pub message: String,
}

/// POST /api/save-patient-report
pub async fn save_patient_report(
    State(state): State<SharedState>,
    payload: Result<Json<AnalysisPayload>, JsonRejection>,
) -> Result<Json<SavedReportResponse>, ApiError> {
    let Json(payload) = payload?;
    let p = state.persistence()?;
    let (result, database_id) = payload.into_analysis()?;
    let record = PatientReportRecord::from_analysis(database_id, &result);
    let report_id = p.reports.insert(&record).await?;
    tracing::info!(%report_id, patient_id = %record.patient_id, "Patient report saved");
    Ok(Json(SavedReportResponse {
        success: true,
        report_id,
        message: "Patient report saved successfully".into(),
    }))
}

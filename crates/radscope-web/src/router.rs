//! Axum router: maps all URL paths to handlers.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::error::ApiError;
use crate::handlers::{
    ai::{ai_analysis, batch_analysis, latest_ai_analysis},
    history::{delete_analysis, history, search, statistics},
    pages::{index, refresh},
    reports::{download_report, generate_professional_report, patient_reports, professional_report, save_patient_report},
    sessions::{clear_session, session_info, validate_session},
    system::{generation_logs, health, modalities},
    upload::{get_analysis, upload, validate},
};
use crate::sse::sse_handler;
use crate::state::{AppState, SharedState};

async fn not_found() -> ApiError {
    ApiError::NotFound("Endpoint not found".into())
}

/// Build and return the full Axum router.
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.max_upload_mb * 1024 * 1024;
    let static_dir = state.static_dir.clone();
    let reports_dir = state.local_reports_dir.clone();
    let shared: SharedState = Arc::new(state);

    let router = Router::new()
        // Pages
        .route("/",        get(index))
        .route("/refresh", get(refresh))

        // SSE streaming
        .route("/api/events", get(sse_handler))

        // System
        .route("/api/health",          get(health))
        .route("/api/modalities",      get(modalities))
        .route("/api/generation-logs", get(generation_logs))

        // Uploads
        .route("/api/upload",               post(upload))
        .route("/api/validate",             post(validate))
        .route("/api/analysis/{filename}",  get(get_analysis))
        .route("/api/analysis/{id}/delete", delete(delete_analysis))

        // Stored analyses
        .route("/api/history",    get(history))
        .route("/api/statistics", get(statistics))
        .route("/api/search",     get(search))

        // Reports
        .route("/api/download-report",                  post(download_report))
        .route("/api/professional-report/{report_id}",  get(professional_report))
        .route("/api/generate-professional-report",     post(generate_professional_report))
        .route("/api/patient-reports",                  get(patient_reports))
        .route("/api/save-patient-report",              post(save_patient_report))

        // AI
        .route("/api/ai-analysis",               post(ai_analysis))
        .route("/api/ai-analysis/{analysis_id}", get(latest_ai_analysis))
        .route("/api/batch-analysis",            post(batch_analysis))

        // Patient sessions
        .route("/api/sessions/validate", post(validate_session))
        .route("/api/sessions/{id}",     get(session_info).delete(clear_session))

        // Static files
        .nest_service("/static", ServeDir::new(static_dir));

    let router = match reports_dir {
        Some(dir) => router.nest_service(radscope_db::storage::LOCAL_URL_PREFIX, ServeDir::new(dir)),
        None => router,
    };

    router
        .fallback(not_found)
        // Middleware
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(shared)
}

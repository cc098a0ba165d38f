//! Browser pages.

use axum::{
    extract::State,
    http::header,
    response::{Html, IntoResponse},
};
use minijinja::context;
use radscope_common::DISCLAIMER;
use radscope_llm::LlmTask;

use crate::error::ApiError;
use crate::state::SharedState;
use crate::templates::{INDEX, REFRESH};

const NO_STORE: [(header::HeaderName, &str); 1] =
    [(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")];

/// GET / - upload UI
pub async fn index(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let html = state.templates.render(
        INDEX,
        context! {
            disclaimer => DISCLAIMER,
            max_upload_mb => state.max_upload_mb,
            ai_enabled => state.llm.has_backend(LlmTask::Summary),
            version => env!("CARGO_PKG_VERSION"),
        },
    )?;
    Ok((NO_STORE, Html(html)))
}

/// GET /refresh - clears client storage, then back to /
pub async fn refresh(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let html = state.templates.render(
        REFRESH,
        context! { cache_buster => chrono::Utc::now().timestamp_millis() },
    )?;
    Ok((NO_STORE, Html(html)))
}

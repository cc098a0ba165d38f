//! Patient session checks for the browser.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    Json,
};
use radscope_analysis::{PatientSession, SessionClaim};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ValidateSessionRequest {
    pub session_id: String,
    pub patient_name: String,
    pub patient_id: String,
    pub body_part: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateSessionResponse {
    pub success: bool,
    pub valid: bool,
    pub message: String,
}

/// POST /api/sessions/validate
pub async fn validate_session(
    State(state): State<SharedState>,
    payload: Result<Json<ValidateSessionRequest>, JsonRejection>,
) -> Result<Json<ValidateSessionResponse>, ApiError> {
    let Json(req) = payload?;
    if req.session_id.trim().is_empty() {
        return Err(ApiError::BadRequest("Session ID required".into()));
    }
    let claim = SessionClaim {
        patient_name: &req.patient_name,
        patient_id: &req.patient_id,
        body_part: &req.body_part,
    };
    let check = state.sessions.validate(&req.session_id, &claim).await;
    if !check.valid {
        tracing::warn!(session_id = %req.session_id, reason = %check.message, "Session validation failed");
    }
    Ok(Json(ValidateSessionResponse { success: true, valid: check.valid, message: check.message }))
}

#[derive(Debug, Serialize)]
pub struct SessionInfoResponse {
    pub success: bool,
    pub session: PatientSession,
}

/// GET /api/sessions/{id}
pub async fn session_info(
    State(state): State<SharedState>,
    session_id: Result<Path<String>, PathRejection>,
) -> Result<Json<SessionInfoResponse>, ApiError> {
    let Path(session_id) = session_id?;
    let session = state
        .sessions
        .info(&session_id)
        .await
        .ok_or_else(|| ApiError::NotFound("Session not found".into()))?;
    Ok(Json(SessionInfoResponse { success: true, session }))
}

#[derive(Debug, Serialize)]
pub struct ClearSessionResponse {
    pub success: bool,
    pub message: String,
}

/// DELETE /api/sessions/{id}
pub async fn clear_session(
    State(state): State<SharedState>,
    session_id: Result<Path<String>, PathRejection>,
) -> Result<Json<ClearSessionResponse>, ApiError> {
    let Path(session_id) = session_id?;
    if !state.sessions.clear(&session_id).await {
        return Err(ApiError::NotFound("Session not found".into()));
    }
    Ok(Json(ClearSessionResponse { success: true, message: "Session cleared".into() }))
}

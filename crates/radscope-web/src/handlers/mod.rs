//! HTTP handlers for all web routes.

pub mod ai;
pub mod history;
pub mod pages;
pub mod reports;
pub mod sessions;
pub mod system;
pub mod upload;

use axum::http::header;
use axum::response::{IntoResponse, Response};
use radscope_common::AnalysisResult;
use radscope_llm::{LlmRouter, LlmTask};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const MAX_PAGE: i64 = 1_000_000;

/// `?page&limit`, 1-based pages.
#[derive(Debug, Default, Deserialize)]
pub struct Pagination {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl Pagination {
    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, MAX_PAGE)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

/// Body of the endpoints that take an upload result back from the browser.
#[derive(Debug, Deserialize)]
pub struct AnalysisPayload {
    pub analysis_result: Option<serde_json::Value>,
}

impl AnalysisPayload {
    /// The analysis plus the `database_id` the upload response carried, if any.
    pub fn into_analysis(self) -> Result<(AnalysisResult, Option<Uuid>), ApiError> {
        let value = self
            .analysis_result
            .filter(|v| v.is_object())
            .ok_or_else(|| ApiError::BadRequest("No analysis result provided".into()))?;
        analysis_from_value(value)
    }
}

pub fn analysis_from_value(value: serde_json::Value) -> Result<(AnalysisResult, Option<Uuid>), ApiError> {
    let database_id = value
        .get("database_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok());
    let result = serde_json::from_value(value)
        .map_err(|e| ApiError::BadRequest(format!("Invalid analysis result: {e}")))?;
    Ok((result, database_id))
}

pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid {what} id: {raw}")))
}

/// Provider a task would be routed to, for logs.
pub fn provider_for(llm: &LlmRouter, task: LlmTask) -> Option<String> {
    let registered = llm.providers();
    task.preference()
        .iter()
        .find(|p| registered.iter().any(|r| r == *p))
        .map(|p| p.to_string())
}

/// PDF bytes as a download.
pub fn pdf_attachment(bytes: Vec<u8>, filename: &str) -> Response {
    (
        [
            (header::CONTENT_TYPE, radscope_db::storage::PDF_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn pagination_defaults_and_bounds() {
        let p = Pagination::default();
        assert_eq!((p.page(), p.limit(), p.offset()), (1, 20, 0));

        let p = Pagination { page: Some(3), limit: Some(500) };
        assert_eq!((p.limit(), p.offset()), (100, 200));

        let p = Pagination { page: Some(-2), limit: Some(0) };
        assert_eq!((p.page(), p.limit(), p.offset()), (1, 1, 0));
    }

    #[test]
    fn huge_page_numbers_are_clamped() {
        let p = Pagination { page: Some(i64::MAX / 10), limit: Some(100) };
        assert_eq!(p.page(), MAX_PAGE);
        assert_eq!(p.offset(), (MAX_PAGE - 1) * 100);

        let p = Pagination { page: Some(i64::MAX), limit: Some(i64::MAX) };
        assert!(p.offset() > 0);
    }

    #[test]
    fn payload_keeps_database_id() {
        let id = Uuid::new_v4();
        let payload = AnalysisPayload {
            analysis_result: Some(json!({ "body_part": "chest", "confidence": 0.9, "database_id": id })),
        };
        let (result, database_id) = payload.into_analysis().unwrap();
        assert_eq!(result.body_part.as_str(), "chest");
        assert_eq!(database_id, Some(id));
    }

    #[test]
    fn payload_requires_an_object() {
        let missing = AnalysisPayload { analysis_result: None };
        assert!(matches!(missing.into_analysis(), Err(ApiError::BadRequest(_))));
        let wrong = AnalysisPayload { analysis_result: Some(json!("text")) };
        assert!(matches!(wrong.into_analysis(), Err(ApiError::BadRequest(_))));
    }
}

//! API errors rendered as `{"error": message}` with a status code.

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use radscope_analysis::AnalysisError;
use radscope_db::{DbError, StorageError};
use radscope_dicom::DicomError;
use radscope_llm::LlmError;
use radscope_report::ReportError;
use serde::Serialize;

pub const INVALID_FILE_TYPE: &str = "Invalid file type. Only DICOM files (.dcm, .dicom) are allowed";
pub const DATABASE_UNAVAILABLE: &str = "Database not available";

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("Database not available")]
    DatabaseUnavailable,
    #[error("{0}")]
    ServiceUnavailable(String),
    #[error("{0}")]
    BadGateway(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::DatabaseUnavailable | ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn too_large(max_mb: usize) -> Self {
        ApiError::PayloadTooLarge(format!("File too large. Maximum size is {max_mb}MB"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::Internal(detail) => {
                tracing::error!(%detail, "Request failed");
                "Internal server error".to_string()
            }
            other => {
                if status.is_server_error() {
                    tracing::warn!(status = status.as_u16(), error = %other, "Request failed");
                }
                other.to_string()
            }
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotConfigured | DbError::Pool(_) | DbError::CreatePool(_) => {
                tracing::warn!(error = %err, "Database unavailable");
                ApiError::DatabaseUnavailable
            }
            DbError::NotFound(what) => ApiError::NotFound(what),
            DbError::InvalidCategory(_) | DbError::InvalidStatus(_) => ApiError::BadRequest(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DicomError> for ApiError {
    fn from(err: DicomError) -> Self {
        match err {
            DicomError::Io(e) => ApiError::Internal(e.to_string()),
            other => ApiError::Unprocessable(other.to_string()),
        }
    }
}

impl From<AnalysisError> for ApiError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Dicom(e) => e.into(),
            AnalysisError::EmptyImage => ApiError::Unprocessable(err.to_string()),
        }
    }
}

impl From<LlmError> for ApiError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Unavailable(msg) => ApiError::ServiceUnavailable(format!("AI provider not available: {msg}")),
            other => ApiError::BadGateway(other.to_string()),
        }
    }
}

impl From<ReportError> for ApiError {
    fn from(err: ReportError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        if rejection.status() == StatusCode::INTERNAL_SERVER_ERROR {
            ApiError::Internal(rejection.body_text())
        } else {
            ApiError::BadRequest(rejection.body_text())
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("worker task failed: {err}"))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn body_of(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn internal_errors_hide_details() {
        let (status, json) = body_of(ApiError::Internal("connection string leaked".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"], "Internal server error");
    }

    #[tokio::test]
    async fn client_errors_carry_message() {
        let (status, json) = body_of(ApiError::BadRequest(INVALID_FILE_TYPE.into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], INVALID_FILE_TYPE);

        let (status, json) = body_of(ApiError::too_large(50)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(json["error"], "File too large. Maximum size is 50MB");
    }

    #[tokio::test]
    async fn missing_database_is_503() {
        let (status, json) = body_of(DbError::NotConfigured.into()).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["error"], DATABASE_UNAVAILABLE);
    }

    #[test]
    fn llm_errors_map_to_gateway_statuses() {
        let unavailable: ApiError = LlmError::Unavailable("no backend".into()).into();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
        let upstream: ApiError = LlmError::ApiError { status: 500, message: "boom".into() }.into();
        assert_eq!(upstream.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn unreadable_dicom_is_422() {
        let err: ApiError = AnalysisError::Dicom(DicomError::Open("bad preamble".into())).into();
        assert_eq!(err.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert!(err.to_string().contains("bad preamble"));
    }
}

//! HTTP-level tests for the router, without a database or AI provider.
//!
//! Run with: cargo test -p radscope-web --test api

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use radscope_config::Config;
use radscope_db::LocalReportStorage;
use radscope_llm::{LlmBackend, LlmError, LlmRequest, LlmResponse, LlmRouter};
use radscope_web::router::build_router;
use radscope_web::state::AppState;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

// ── Test app builder ───────────────────────────────────────────

const BOUNDARY: &str = "radscope-test-boundary";

fn test_app_with_limit(max_upload_mb: usize) -> (Router, TempDir) {
    test_app_with(max_upload_mb, LlmRouter::new())
}

fn test_app_with(max_upload_mb: usize, llm: LlmRouter) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::default();
    config.server.upload_dir = dir.path().join("uploads");
    config.server.static_dir = dir.path().join("static");
    config.server.template_dir = dir.path().join("templates");
    config.server.max_upload_mb = max_upload_mb;
    config.storage.local_dir = dir.path().join("reports");
    std::fs::create_dir_all(&config.server.upload_dir).unwrap();

    let storage = Arc::new(LocalReportStorage::new(config.storage.local_dir.clone(), "patient-reports"));
    let state = AppState::new(&config, None, storage, llm);
    (build_router(state), dir)
}

fn test_app() -> (Router, TempDir) {
    test_app_with_limit(50)
}

/// Provider that always answers with a server error.
struct BrokenProvider;

#[async_trait::async_trait]
impl LlmBackend for BrokenProvider {
    async fn complete(&self, _req: LlmRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::ApiError { status: 500, message: "boom".into() })
    }

    fn model_id(&self) -> &str {
        "broken"
    }

    fn provider(&self) -> &'static str {
        "gemini"
    }

    fn max_output_tokens(&self) -> usize {
        1024
    }
}

/// A 128x128 MONOCHROME2 chest CT with patient tags.
fn chest_study() -> Vec<u8> {
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use dicom_dictionary_std::{tags, uids};
    use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

    let (rows, cols) = (128_u16, 128_u16);
    let pixels: Vec<u8> = (0..rows as u32 * cols as u32)
        .map(|i| ((i % 128) * 2 + i / 128) as u8)
        .collect();

    let mut obj = InMemDicomObject::new_empty();
    obj.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("CT")));
    obj.put(DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::from("CHEST WITH CONTRAST")));
    obj.put(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("DOE^JANE")));
    obj.put(DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("P-001")));
    obj.put(DataElement::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20240101")));
    obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(rows)));
    obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(cols)));
    obj.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
    obj.put(DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("MONOCHROME2")));
    obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)));
    obj.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)));
    obj.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)));
    obj.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)));
    obj.put(DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::U8(pixels.into())));

    let file = obj
        .with_meta(
            FileMetaTableBuilder::new()
                .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
                .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.7"),
        )
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chest.dcm");
    file.write_to_file(&path).unwrap();
    std::fs::read(&path).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_file(uri: &str, field: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn analysis_json() -> Value {
    json!({
        "body_part": "chest",
        "confidence": 0.82,
        "modality": "CR",
        "anatomical_landmarks": ["ribs", "heart", "lungs"],
        "pathologies": ["Possible nodular opacity"],
        "patient_info": { "name": "DOE^JANE DR.SHAH", "patient_id": "P-001", "sex": "F", "age": "054Y" }
    })
}

// ── System ─────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_disabled_database() {
    let (app, _dir) = test_app();
    let response = app.oneshot(get("/api/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "disabled");
    assert_eq!(body["storage"], "local");
    assert_eq!(body["ai_providers"], json!([]));
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let (app, _dir) = test_app();
    let response = app.oneshot(get("/api/nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "Endpoint not found");
}

#[tokio::test]
async fn modalities_lists_descriptions() {
    let (app, _dir) = test_app();
    let response = app.oneshot(get("/api/modalities")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    let modalities = body["modalities"].as_array().unwrap();
    assert!(modalities.iter().any(|m| m == "CT"));
    assert!(body["descriptions"]["CT"].is_string());
}

#[tokio::test]
async fn index_page_renders() {
    let (app, _dir) = test_app();
    let response = app.oneshot(get("/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CACHE_CONTROL).unwrap(), "no-cache, no-store, must-revalidate");

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("50MB"));
}

// ── Database-backed routes without a database ──────────────────

#[tokio::test]
async fn history_without_database_is_503() {
    let (app, _dir) = test_app();
    let response = app.oneshot(get("/api/history?page=2&limit=5")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json_body(response).await["error"], "Database not available");
}

#[tokio::test]
async fn empty_search_term_is_rejected_first() {
    let (app, _dir) = test_app();
    let response = app.oneshot(get("/api/search?q=%20%20")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "Search term required");
}

#[tokio::test]
async fn save_patient_report_without_database_is_503() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(post_json("/api/save-patient-report", json!({ "analysis_result": analysis_json() })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

// ── Uploads ────────────────────────────────────────────────────

#[tokio::test]
async fn upload_analyses_study_and_opens_session() {
    let (app, dir) = test_app();
    let response = app
        .clone()
        .oneshot(post_file("/api/upload", "file", "chest study.dcm", &chest_study()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["force_refresh"], true);
    assert!(body["timestamp"].is_i64());

    let result = &body["result"];
    assert_eq!(result["body_part"], "chest");
    assert_eq!(result["modality"], "CT");
    assert_eq!(result["patient_isolation"], true);
    assert!(result["cache_buster"].is_i64());
    assert_eq!(result["session_checksum"].as_str().unwrap().len(), 32);
    assert!(result["heuristic_findings"].is_array());
    assert!(!result["disclaimer"].as_str().unwrap().is_empty());
    assert!(result.get("database_id").is_none());

    let filename = result["filename"].as_str().unwrap();
    assert!(filename.ends_with("_chest_study.dcm"));
    assert!(dir.path().join("uploads").join(filename).exists());

    let session_id = result["session_id"].as_str().unwrap();
    assert!(session_id.starts_with("CHEST_"));
    let response = app.oneshot(get(&format!("/api/sessions/{session_id}"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let session = json_body(response).await;
    assert_eq!(session["session"]["filename"], filename);
    assert_eq!(session["session"]["patient_id"], "P-001");
    assert_eq!(session["session"]["checksum"], result["session_checksum"]);
}

#[tokio::test]
async fn upload_without_file_field_is_400() {
    let (app, _dir) = test_app();
    let response = app.oneshot(post_file("/api/upload", "other", "a.dcm", b"x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No file provided");
}

#[tokio::test]
async fn upload_rejects_other_extensions() {
    let (app, _dir) = test_app();
    let response = app.oneshot(post_file("/api/upload", "file", "scan.png", b"x")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        json_body(response).await["error"],
        "Invalid file type. Only DICOM files (.dcm, .dicom) are allowed"
    );
}

#[tokio::test]
async fn unreadable_dicom_is_422_and_removed() {
    let (app, dir) = test_app();
    let response = app
        .oneshot(post_file("/api/upload", "file", "broken.dcm", b"definitely not dicom"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert!(json_body(response).await["error"].is_string());

    let left = std::fs::read_dir(dir.path().join("uploads")).unwrap().count();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn oversized_upload_is_413() {
    let (app, _dir) = test_app_with_limit(1);
    let big = vec![0u8; 2 * 1024 * 1024];
    let response = app.oneshot(post_file("/api/upload", "file", "big.dcm", &big)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(json_body(response).await["error"], "File too large. Maximum size is 1MB");
}

#[tokio::test]
async fn validate_reports_unreadable_file() {
    let (app, _dir) = test_app();
    let response = app.oneshot(post_file("/api/validate", "file", "x.dcm", b"nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["filename"], "x.dcm");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn missing_stored_file_is_404() {
    let (app, _dir) = test_app();
    let response = app.oneshot(get("/api/analysis/20240101_000000_missing.dcm")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "File not found");
}

// ── Sessions ───────────────────────────────────────────────────

#[tokio::test]
async fn unknown_session_does_not_validate() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(post_json(
            "/api/sessions/validate",
            json!({ "session_id": "CHEST_x", "patient_name": "A", "patient_id": "1", "body_part": "chest" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["valid"], false);
    assert_eq!(body["message"], "Session not found");
}

#[tokio::test]
async fn session_validation_requires_an_id() {
    let (app, _dir) = test_app();
    let response = app.oneshot(post_json("/api/sessions/validate", json!({}))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn clearing_unknown_session_is_404() {
    let (app, _dir) = test_app();
    let request = Request::builder().method("DELETE").uri("/api/sessions/CHEST_x").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ── AI and reports ─────────────────────────────────────────────

#[tokio::test]
async fn ai_analysis_without_provider_is_503() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(post_json("/api/ai-analysis", json!({ "analysis_result": analysis_json() })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn ai_analysis_falls_back_when_provider_fails() {
    let mut llm = LlmRouter::new();
    llm.register_backend("gemini", Arc::new(BrokenProvider));
    let (app, _dir) = test_app_with(50, llm);

    let response = app
        .oneshot(post_json("/api/ai-analysis", json!({ "analysis_result": analysis_json() })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["ai_analysis"]["enhanced"], false);
    assert_eq!(body["ai_analysis"]["executive_summary"], "Analysis of chest using CR modality.");
    assert!(body["ai_analysis"].get("clinical_summary").is_none());
}

#[tokio::test]
async fn batch_analysis_falls_back_without_provider() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(post_json("/api/batch-analysis", json!({ "analysis_results": [analysis_json(), analysis_json()] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["ai_analysis"]["files_analyzed"], 2);
    assert!(!body["ai_analysis"]["summary"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn batch_analysis_needs_results() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(post_json("/api/batch-analysis", json!({ "analysis_results": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn download_report_returns_pdf() {
    let (app, _dir) = test_app();
    let payload = json!({
        "ai_analysis": {
            "summary": "Two chest studies reviewed.",
            "clinical_insights": ["No acute change"],
            "recommendations": ["Routine follow-up"],
            "risk_assessment": "Low",
            "ai_confidence": 0.8,
            "files_analyzed": 1
        },
        "individual_results": [
            { "filename": "chest.dcm", "body_part": "chest", "confidence": 82.0, "pathologies": [] }
        ]
    });
    let response = app.oneshot(post_json("/api/download-report", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "application/pdf");
    let disposition = response.headers().get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
    assert!(disposition.contains("AI_Medical_Report_"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn download_report_needs_analysis() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(post_json("/api/download-report", json!({ "individual_results": [] })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "No AI analysis data provided");
}

#[tokio::test]
async fn professional_report_renders_with_template_text() {
    let (app, _dir) = test_app();
    let response = app
        .oneshot(post_json("/api/generate-professional-report", json!({ "analysis_result": analysis_json() })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let disposition = response.headers().get(header::CONTENT_DISPOSITION).unwrap().to_str().unwrap();
    assert!(disposition.contains("Radiology_Report_P-001_"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF"));
}

#[tokio::test]
async fn bad_query_string_is_json_400() {
    let (app, _dir) = test_app();
    for uri in ["/api/history?page=abc", "/api/patient-reports?limit=many", "/api/generation-logs?limit=x"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        assert!(json_body(response).await["error"].is_string(), "{uri}");
    }
}

#[tokio::test]
async fn malformed_json_is_400() {
    let (app, _dir) = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/generate-professional-report")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

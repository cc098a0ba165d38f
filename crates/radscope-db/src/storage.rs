//! Object storage for rendered PDFs.
//!
//! Objects live at `{patient_id}/{report_id}_{timestamp}.pdf` inside a
//! bucket. The local backend writes below a directory that the web server
//! exposes at `/reports`; the Supabase backend uses the Storage REST API.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radscope_config::{StorageBackend, StorageConfig};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use crate::error::StorageError;
use crate::schema::StorageInfo;

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// URL prefix under which [`LocalReportStorage`] objects are served.
pub const LOCAL_URL_PREFIX: &str = "/reports";

#[async_trait]
pub trait ReportStorage: Send + Sync {
    /// Store `bytes` at `path`, replacing any existing object.
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<StorageInfo, StorageError>;

    fn public_url(&self, path: &str) -> String;

    fn bucket(&self) -> &str;

    /// Short backend name for logs and health output.
    fn backend(&self) -> &'static str;
}

/// Object key for a report PDF. Characters outside `[A-Za-z0-9._-]` in the
/// patient id become `_`.
pub fn object_path(patient_id: &str, report_id: Uuid, at: DateTime<Utc>) -> String {
    let folder: String = patient_id
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect();
    let folder = if folder.is_empty() || folder.chars().all(|c| c == '.') {
        "unknown".to_string()
    } else {
        folder
    };
    format!("{folder}/{report_id}_{}.pdf", at.format("%Y%m%d_%H%M%S"))
}

/// Reject absolute paths and `..` so objects stay inside the bucket.
fn checked_relative(path: &str) -> Result<&Path, StorageError> {
    let p = Path::new(path);
    let ok = !path.is_empty() && p.components().all(|c| matches!(c, Component::Normal(_)));
    if ok { Ok(p) } else { Err(StorageError::InvalidPath(path.to_string())) }
}

// ── Local filesystem ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LocalReportStorage {
    root: PathBuf,
    bucket: String,
}

impl LocalReportStorage {
    /// Objects go to `{root}/{bucket}/{path}`.
    pub fn new(root: impl Into<PathBuf>, bucket: impl Into<String>) -> Self {
        Self { root: root.into(), bucket: bucket.into() }
    }

    /// Directory served at [`LOCAL_URL_PREFIX`].
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl ReportStorage for LocalReportStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<StorageInfo, StorageError> {
        let rel = checked_relative(path)?;
        let full = self.root.join(&self.bucket).join(rel);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let size = bytes.len() as i64;
        tokio::fs::write(&full, bytes).await?;
        tracing::debug!(path = %full.display(), size, "PDF written to local storage");
        Ok(StorageInfo {
            bucket: self.bucket.clone(),
            storage_path: path.to_string(),
            public_url: self.public_url(path),
            file_size: size,
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!("{LOCAL_URL_PREFIX}/{}/{path}", self.bucket)
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend(&self) -> &'static str {
        "local"
    }
}

// ── Supabase Storage ────────────────────────────────────────────────────────

pub struct SupabaseStorage {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    bucket: String,
}

impl std::fmt::Debug for SupabaseStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseStorage")
            .field("base_url", &self.base_url)
            .field("bucket", &self.bucket)
            .finish()
    }
}

impl SupabaseStorage {
    pub fn new(base_url: &str, api_key: SecretString, bucket: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ReportStorage for SupabaseStorage {
    async fn upload(&self, path: &str, bytes: Vec<u8>) -> Result<StorageInfo, StorageError> {
        checked_relative(path)?;
        let size = bytes.len() as i64;
        let url = format!("{}/storage/v1/object/{}/{path}", self.base_url, self.bucket);
        let key = self.api_key.expose_secret();

        let resp = self
            .client
            .post(&url)
            .header("apikey", key)
            .bearer_auth(key)
            .header("x-upsert", "true")
            .header(reqwest::header::CONTENT_TYPE, PDF_CONTENT_TYPE)
            .body(bytes)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), %path, "Supabase upload rejected");
            return Err(StorageError::Upload { status: status.as_u16(), message });
        }

        tracing::info!(%path, size, bucket = %self.bucket, "PDF uploaded to Supabase");
        Ok(StorageInfo {
            bucket: self.bucket.clone(),
            storage_path: path.to_string(),
            public_url: self.public_url(path),
            file_size: size,
        })
    }

    fn public_url(&self, path: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{path}", self.base_url, self.bucket)
    }

    fn bucket(&self) -> &str {
        &self.bucket
    }

    fn backend(&self) -> &'static str {
        "supabase"
    }
}

/// Build the configured backend. Supabase needs both a URL and a key.
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ReportStorage>, StorageError> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalReportStorage::new(&config.local_dir, &config.bucket))),
        StorageBackend::Supabase => {
            let url = config
                .supabase_url
                .as_deref()
                .ok_or_else(|| StorageError::NotConfigured("SUPABASE_URL is not set".into()))?;
            let key = config
                .supabase_key
                .clone()
                .ok_or_else(|| StorageError::NotConfigured("SUPABASE_KEY is not set".into()))?;
            Ok(Arc::new(SupabaseStorage::new(url, key, &config.bucket)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path as AxumPath, http::HeaderMap, routing::post, Router};
    use chrono::TimeZone;

    #[test]
    fn test_object_path_layout() {
        let id = Uuid::nil();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        assert_eq!(
            object_path("P-17", id, at),
            "P-17/00000000-0000-0000-0000-000000000000_20240309_140507.pdf"
        );
        assert!(object_path("../etc/passwd", id, at).starts_with(".._etc_passwd/"));
        assert!(object_path("  ", id, at).starts_with("unknown/"));
        assert!(object_path("..", id, at).starts_with("unknown/"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        assert!(checked_relative("a/b.pdf").is_ok());
        assert!(checked_relative("../b.pdf").is_err());
        assert!(checked_relative("/abs.pdf").is_err());
        assert!(checked_relative("").is_err());
    }

    #[tokio::test]
    async fn test_local_upload_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalReportStorage::new(dir.path(), "patient-reports");
        let info = storage.upload("P1/r.pdf", b"%PDF-1.3".to_vec()).await.unwrap();

        assert_eq!(info.file_size, 8);
        assert_eq!(info.public_url, "/reports/patient-reports/P1/r.pdf");
        let written = std::fs::read(dir.path().join("patient-reports/P1/r.pdf")).unwrap();
        assert_eq!(written, b"%PDF-1.3");

        // Upsert semantics.
        storage.upload("P1/r.pdf", b"%PDF-1.4!".to_vec()).await.unwrap();
        assert_eq!(std::fs::read(dir.path().join("patient-reports/P1/r.pdf")).unwrap().len(), 9);
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_supabase_upload_sends_upsert_headers() {
        let app = Router::new().route(
            "/storage/v1/object/{bucket}/{*path}",
            post(|AxumPath((bucket, path)): AxumPath<(String, String)>, headers: HeaderMap, body: axum::body::Bytes| async move {
                let ok = bucket == "patient-reports"
                    && path == "P1/r.pdf"
                    && headers.get("apikey").map(|v| v == "key") == Some(true)
                    && headers.get("authorization").map(|v| v == "Bearer key") == Some(true)
                    && headers.get("x-upsert").map(|v| v == "true") == Some(true)
                    && headers.get("content-type").map(|v| v == PDF_CONTENT_TYPE) == Some(true)
                    && &body[..] == b"%PDF";
                if ok {
                    (axum::http::StatusCode::OK, "{\"Key\":\"patient-reports/P1/r.pdf\"}")
                } else {
                    (axum::http::StatusCode::BAD_REQUEST, "bad request")
                }
            }),
        );
        let base = serve(app).await;
        let storage = SupabaseStorage::new(&format!("{base}/"), SecretString::from("key"), "patient-reports");

        let info = storage.upload("P1/r.pdf", b"%PDF".to_vec()).await.unwrap();
        assert_eq!(info.public_url, format!("{base}/storage/v1/object/public/patient-reports/P1/r.pdf"));
        assert_eq!(info.file_size, 4);
    }

    #[tokio::test]
    async fn test_supabase_rejection_is_reported() {
        let app = Router::new().route(
            "/storage/v1/object/{bucket}/{*path}",
            post(|| async { (axum::http::StatusCode::FORBIDDEN, "row-level security") }),
        );
        let base = serve(app).await;
        let storage = SupabaseStorage::new(&base, SecretString::from("key"), "b");
        match storage.upload("x.pdf", vec![1]).await {
            Err(StorageError::Upload { status, message }) => {
                assert_eq!(status, 403);
                assert_eq!(message, "row-level security");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_supabase_backend_needs_credentials() {
        let config = StorageConfig { backend: StorageBackend::Supabase, ..Default::default() };
        assert!(matches!(from_config(&config), Err(StorageError::NotConfigured(_))));

        let local = from_config(&StorageConfig::default()).unwrap();
        assert_eq!(local.backend(), "local");
        assert_eq!(local.bucket(), "patient-reports");
    }
}

//! Multipart upload handling and the upload directory.

use std::path::{Path, PathBuf};

use axum::body::Bytes;
use axum::extract::Multipart;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use crate::error::ApiError;

pub const ALLOWED_EXTENSIONS: [&str; 2] = ["dcm", "dicom"];

/// The `file` part of a multipart form.
#[derive(Debug)]
pub struct UploadedFile {
    /// Name as sent by the client.
    pub filename: String,
    pub bytes: Bytes,
}

/// Extension check on the client-supplied name, case-insensitive.
pub fn allowed_file(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(_, ext)| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Reduce a client filename to `[A-Za-z0-9._-]`, without directories or
/// leading dots.
pub fn secure_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// `{YYYYmmdd_HHMMSS}_{secure_name}`
pub fn stored_name(filename: &str, at: DateTime<Utc>) -> String {
    let safe = secure_filename(filename);
    let safe = if safe.is_empty() { "upload.dcm".to_string() } else { safe };
    format!("{}_{safe}", at.format("%Y%m%d_%H%M%S"))
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Path of a previously stored upload. Names that would leave the upload
/// directory resolve to `None`.
pub fn resolve_stored(upload_dir: &Path, filename: &str) -> Option<PathBuf> {
    if filename.is_empty() || secure_filename(filename) != filename {
        return None;
    }
    let path = upload_dir.join(filename);
    path.is_file().then_some(path)
}

/// Pull the `file` field out of a form. Other fields are skipped.
pub async fn read_file_field(mut multipart: Multipart, max_mb: usize) -> Result<UploadedFile, ApiError> {
    let map_err = |e: axum::extract::multipart::MultipartError| match ApiError::from(e) {
        ApiError::PayloadTooLarge(_) => ApiError::too_large(max_mb),
        other => other,
    };

    while let Some(field) = multipart.next_field().await.map_err(map_err)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.trim().is_empty() {
            return Err(ApiError::BadRequest("No file selected".into()));
        }
        let bytes = field.bytes().await.map_err(map_err)?;
        return Ok(UploadedFile { filename, bytes });
    }
    Err(ApiError::BadRequest("No file provided".into()))
}

pub async fn save(upload_dir: &Path, name: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
    tokio::fs::create_dir_all(upload_dir).await?;
    let path = upload_dir.join(name);
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

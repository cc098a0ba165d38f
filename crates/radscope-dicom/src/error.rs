//! DICOM error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DicomError>;

#[derive(Debug, Error)]
pub enum DicomError {
    #[error("Not a readable DICOM file: {0}")]
    Open(String),

    #[error("DICOM file has no pixel data")]
    MissingPixelData,

    #[error("Pixel data could not be decoded: {0}")]
    Decode(String),

    #[error("Image encoding failed: {0}")]
    Encode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

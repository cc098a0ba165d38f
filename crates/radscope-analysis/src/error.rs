use radscope_dicom::DicomError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("DICOM error: {0}")]
    Dicom(#[from] DicomError),

    #[error("Empty image")]
    EmptyImage,
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

//! radscope-dicom — DICOM reading, validation and grayscale rendering.
//!
//! Files are opened with dicom-rs, the first frame is decoded to 8-bit
//! grayscale and stretched to the full 0..=255 range for analysis.
//!
//! # Example
//!
//! ```rust,no_run
//! let study = radscope_dicom::load("uploads/scan.dcm")?;
//! println!("{:?} {}x{}", study.metadata.modality, study.image.width(), study.image.height());
//! # Ok::<(), radscope_dicom::DicomError>(())
//! ```

pub mod error;
pub mod modality;
pub mod reader;
pub mod render;

pub use error::{DicomError, Result};
pub use modality::{is_supported_modality, modality_description, SUPPORTED_MODALITIES};
pub use reader::{load, read_metadata_file, validate, DicomStudy, Validation, REQUIRED_TAGS};
pub use render::{apply_window, encode_for_vision, stretch_to_full_range, VISION_MIME};

//! radscope-common: shared types, name cleaning and scoring helpers used across all radscope crates.

pub mod models;
pub mod names;
pub mod confidence;

// Re-export commonly used types
pub use models::{
    AnalysisResult, BodyPart, HeuristicFindings, ImageFeatures, PatientInfo, StudyMetadata,
    VisionAssessment, DISCLAIMER,
};

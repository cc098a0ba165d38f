/// Core types shared by the analysis pipeline, the AI layer, the database
/// and the web API. All of them serialize to the JSON shapes the browser UI
/// consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attached to every analysis response and every rendered report.
pub const DISCLAIMER: &str = "Findings are produced by image-statistic threshold heuristics and \
optional third-party AI models. They are not a diagnosis and must be reviewed by a qualified radiologist.";

// ---------------------------------------------------------------------------
// Body part
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BodyPart {
    Spine,
    Chest,
    Brain,
    Breast,
    Elbow,
    Leg,
    Abdomen,
    Prostate,
    #[default]
    #[serde(other)]
    Unknown,
}

impl BodyPart {
    pub const ALL: [BodyPart; 9] = [
        BodyPart::Spine,
        BodyPart::Chest,
        BodyPart::Brain,
        BodyPart::Breast,
        BodyPart::Elbow,
        BodyPart::Leg,
        BodyPart::Abdomen,
        BodyPart::Prostate,
        BodyPart::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BodyPart::Spine => "spine",
            BodyPart::Chest => "chest",
            BodyPart::Brain => "brain",
            BodyPart::Breast => "breast",
            BodyPart::Elbow => "elbow",
            BodyPart::Leg => "leg",
            BodyPart::Abdomen => "abdomen",
            BodyPart::Prostate => "prostate",
            BodyPart::Unknown => "unknown",
        }
    }

    /// Lenient parse used for stored rows and client payloads.
    pub fn parse(s: &str) -> Self {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == lower)
            .unwrap_or(BodyPart::Unknown)
    }
}

impl fmt::Display for BodyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// DICOM metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientInfo {
    pub name: Option<String>,
    pub patient_id: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub birth_date: Option<String>,
    pub study_date: Option<String>,
}

impl PatientInfo {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("Unknown Patient")
    }

    pub fn display_id(&self) -> &str {
        self.patient_id.as_deref().unwrap_or("Unknown")
    }
}

/// Tags read from a DICOM file. Missing tags are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyMetadata {
    pub patient: PatientInfo,
    pub modality: Option<String>,
    pub study_description: Option<String>,
    pub series_description: Option<String>,
    pub body_part_examined: Option<String>,
    pub institution_name: Option<String>,
    pub referring_physician: Option<String>,
    pub manufacturer: Option<String>,
    pub accession_number: Option<String>,
    pub study_time: Option<String>,
    pub study_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub sop_instance_uid: Option<String>,
    pub rows: Option<u32>,
    pub columns: Option<u32>,
    /// Row and column spacing in millimetres.
    pub pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
}

impl StudyMetadata {
    /// Upper-cased text tags in classifier order.
    pub fn text_tags(&self) -> [(&'static str, String); 3] {
        let up = |v: &Option<String>| v.as_deref().unwrap_or("").to_uppercase();
        [
            ("BodyPartExamined", up(&self.body_part_examined)),
            ("StudyDescription", up(&self.study_description)),
            ("SeriesDescription", up(&self.series_description)),
        ]
    }
}

// ---------------------------------------------------------------------------
// Analysis output
// ---------------------------------------------------------------------------

/// Whole-image statistics fed to the threshold table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageFeatures {
    /// Mean intensity, 0..=255.
    pub brightness: f64,
    /// Population standard deviation of intensity.
    pub contrast: f64,
    /// Fraction of edge pixels, 0..=1.
    pub edge_density: f64,
    /// Standard deviation of the local-mean residual.
    pub texture_std: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicFindings {
    pub pathologies: Vec<String>,
    pub measurements: BTreeMap<String, String>,
    pub locations: BTreeMap<String, String>,
}

/// Parsed reply of a vision model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionAssessment {
    pub body_part: String,
    pub confidence: f64,
    pub anatomical_landmarks: Vec<String>,
    pub pathologies: Vec<String>,
    pub image_quality: String,
    pub clinical_insights: String,
    pub recommendations: Vec<String>,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisResult {
    pub body_part: BodyPart,
    pub confidence: f64,
    pub anatomical_landmarks: Vec<String>,
    pub pathologies: Vec<String>,
    pub heuristic_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub measurements: BTreeMap<String, String>,
    pub locations: BTreeMap<String, String>,
    pub modality: Option<String>,
    pub study_description: Option<String>,
    pub patient_info: PatientInfo,
    pub image_size: Option<[u32; 2]>,
    pub pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
    pub image_features: ImageFeatures,
    pub vision: Option<VisionAssessment>,
    pub analysis_timestamp: DateTime<Utc>,
    pub disclaimer: String,
}

impl AnalysisResult {
    pub fn modality_or_unknown(&self) -> &str {
        self.modality.as_deref().unwrap_or("Unknown")
    }
}

//! Row types for the PostgreSQL tables.
//!
//! JSON array and map columns are stored as `jsonb` and round-trip through
//! [`Json`]. Text-coded enums are checked by the schema as well.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use radscope_common::names::{clean_patient_name, extract_doctor_name};
use radscope_common::{AnalysisResult, StudyMetadata};
use serde::{Deserialize, Serialize};
use tokio_postgres::types::Json;
use tokio_postgres::Row;
use uuid::Uuid;

use crate::error::{DbError, Result};

pub const TABLE_ANALYSES: &str = "dicom_analyses";
pub const TABLE_AI_ANALYSES: &str = "ai_analyses";
pub const TABLE_PATIENT_REPORTS: &str = "patient_reports";
pub const TABLE_GENERATION_LOGS: &str = "report_generation_logs";

pub const ALL_TABLES: [&str; 4] = [
    TABLE_ANALYSES,
    TABLE_AI_ANALYSES,
    TABLE_PATIENT_REPORTS,
    TABLE_GENERATION_LOGS,
];

pub const ANALYZER_VERSION: &str = "2.0";

// =============================================================================
// dicom_analyses
// =============================================================================

/// One analysed upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: Uuid,
    pub filename: String,
    pub file_hash: Option<String>,
    pub file_size: Option<i64>,
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub patient_sex: Option<String>,
    pub patient_age: Option<String>,
    pub study_date: Option<String>,
    pub modality: Option<String>,
    pub study_description: Option<String>,
    pub series_description: Option<String>,
    pub body_part: String,
    pub confidence: f64,
    pub anatomical_landmarks: Vec<String>,
    pub pathologies: Vec<String>,
    pub heuristic_findings: Vec<String>,
    pub recommendations: Vec<String>,
    pub measurements: BTreeMap<String, String>,
    pub locations: BTreeMap<String, String>,
    pub image_width: Option<i32>,
    pub image_height: Option<i32>,
    pub pixel_spacing: Option<[f64; 2]>,
    pub slice_thickness: Option<f64>,
    pub institution_name: Option<String>,
    pub referring_physician: Option<String>,
    pub session_id: Option<String>,
    pub analyzer_version: String,
    pub created_at: DateTime<Utc>,
}

impl AnalysisRecord {
    /// Flatten an analysis and the tags it was computed from into a row.
    pub fn from_analysis(
        result: &AnalysisResult,
        meta: &StudyMetadata,
        filename: &str,
        file_hash: &str,
        file_size: u64,
    ) -> Self {
        let patient = &result.patient_info;
        let [width, height] = result
            .image_size
            .map(|[w, h]| [Some(w as i32), Some(h as i32)])
            .unwrap_or([None, None]);
        Self {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            file_hash: Some(file_hash.to_string()),
            file_size: Some(file_size as i64),
            patient_name: patient.name.clone(),
            patient_id: patient.patient_id.clone(),
            patient_sex: patient.sex.clone(),
            patient_age: patient.age.clone(),
            study_date: patient.study_date.clone(),
            modality: result.modality.clone(),
            study_description: result.study_description.clone(),
            series_description: meta.series_description.clone(),
            body_part: result.body_part.as_str().to_string(),
            confidence: result.confidence,
            anatomical_landmarks: result.anatomical_landmarks.clone(),
            pathologies: result.pathologies.clone(),
            heuristic_findings: result.heuristic_findings.clone(),
            recommendations: result.recommendations.clone(),
            measurements: result.measurements.clone(),
            locations: result.locations.clone(),
            image_width: width,
            image_height: height,
            pixel_spacing: result.pixel_spacing,
            slice_thickness: result.slice_thickness,
            institution_name: meta.institution_name.clone(),
            referring_physician: meta.referring_physician.clone(),
            session_id: None,
            analyzer_version: ANALYZER_VERSION.to_string(),
            created_at: result.analysis_timestamp,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        Ok(Self {
            id: row.try_get("id")?,
            filename: row.try_get("filename")?,
            file_hash: row.try_get("file_hash")?,
            file_size: row.try_get("file_size")?,
            patient_name: row.try_get("patient_name")?,
            patient_id: row.try_get("patient_id")?,
            patient_sex: row.try_get("patient_sex")?,
            patient_age: row.try_get("patient_age")?,
            study_date: row.try_get("study_date")?,
            modality: row.try_get("modality")?,
            study_description: row.try_get("study_description")?,
            series_description: row.try_get("series_description")?,
            body_part: row.try_get("body_part")?,
            confidence: row.try_get("confidence")?,
            anatomical_landmarks: row.try_get::<_, Json<Vec<String>>>("anatomical_landmarks")?.0,
            pathologies: row.try_get::<_, Json<Vec<String>>>("pathologies")?.0,
            heuristic_findings: row.try_get::<_, Json<Vec<String>>>("heuristic_findings")?.0,
            recommendations: row.try_get::<_, Json<Vec<String>>>("recommendations")?.0,
            measurements: row.try_get::<_, Json<BTreeMap<String, String>>>("measurements")?.0,
            locations: row.try_get::<_, Json<BTreeMap<String, String>>>("locations")?.0,
            image_width: row.try_get("image_width")?,
            image_height: row.try_get("image_height")?,
            pixel_spacing: row.try_get::<_, Option<Json<[f64; 2]>>>("pixel_spacing")?.map(|j| j.0),
            slice_thickness: row.try_get("slice_thickness")?,
            institution_name: row.try_get("institution_name")?,
            referring_physician: row.try_get("referring_physician")?,
            session_id: row.try_get("session_id")?,
            analyzer_version: row.try_get("analyzer_version")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Columns `by_category` may filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    BodyPart,
    Modality,
    PatientId,
    PatientName,
    StudyDate,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::BodyPart,
        Category::Modality,
        Category::PatientId,
        Category::PatientName,
        Category::StudyDate,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Category::BodyPart => "body_part",
            Category::Modality => "modality",
            Category::PatientId => "patient_id",
            Category::PatientName => "patient_name",
            Category::StudyDate => "study_date",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.column() == s)
            .ok_or_else(|| DbError::InvalidCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisStatistics {
    pub total_analyses: i64,
    pub body_part_distribution: BTreeMap<String, i64>,
    pub modality_distribution: BTreeMap<String, i64>,
    pub last_updated: DateTime<Utc>,
}

// =============================================================================
// ai_analyses
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiAnalysisKind {
    /// Clinical summary of one study.
    Summary,
    /// Combined analysis of several studies.
    Batch,
}

impl AiAnalysisKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AiAnalysisKind::Summary => "summary",
            AiAnalysisKind::Batch => "batch",
        }
    }

    fn parse(s: &str) -> Self {
        if s == "batch" { AiAnalysisKind::Batch } else { AiAnalysisKind::Summary }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiAnalysisRecord {
    pub id: Uuid,
    pub analysis_id: Option<Uuid>,
    pub kind: AiAnalysisKind,
    pub related_analyses: Vec<Uuid>,
    pub files_analyzed: i32,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub clinical_summary: Option<String>,
    pub risk_assessment: Option<String>,
    pub confidence_level: Option<String>,
    pub enhanced: bool,
    /// The full structured reply as served to the browser.
    pub raw_response: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl AiAnalysisRecord {
    pub fn new(kind: AiAnalysisKind, raw_response: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            analysis_id: None,
            kind,
            related_analyses: Vec::new(),
            files_analyzed: 1,
            provider: None,
            model: None,
            clinical_summary: None,
            risk_assessment: None,
            confidence_level: None,
            enhanced: false,
            raw_response,
            created_at: Utc::now(),
        }
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let kind: String = row.try_get("kind")?;
        Ok(Self {
            id: row.try_get("id")?,
            analysis_id: row.try_get("analysis_id")?,
            kind: AiAnalysisKind::parse(&kind),
            related_analyses: row.try_get::<_, Json<Vec<Uuid>>>("related_analyses")?.0,
            files_analyzed: row.try_get("files_analyzed")?,
            provider: row.try_get("provider")?,
            model: row.try_get("model")?,
            clinical_summary: row.try_get("clinical_summary")?,
            risk_assessment: row.try_get("risk_assessment")?,
            confidence_level: row.try_get("confidence_level")?,
            enhanced: row.try_get("enhanced")?,
            raw_response: row.try_get("raw_response")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

// =============================================================================
// patient_reports
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    #[default]
    Pending,
    Completed,
    Downloaded,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Completed => "completed",
            ReportStatus::Downloaded => "downloaded",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(ReportStatus::Pending),
            "completed" => Ok(ReportStatus::Completed),
            "downloaded" => Ok(ReportStatus::Downloaded),
            other => Err(DbError::InvalidStatus(other.to_string())),
        }
    }
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a rendered PDF ended up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageInfo {
    pub bucket: String,
    pub storage_path: String,
    pub public_url: String,
    pub file_size: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientReportRecord {
    pub id: Uuid,
    pub analysis_id: Option<Uuid>,
    /// `YYYY-MM-DD` of the day the row was created.
    pub report_date: String,
    pub patient_name: String,
    pub patient_id: String,
    pub patient_sex: Option<String>,
    pub patient_age: Option<String>,
    pub study_date: Option<String>,
    pub doctor_name: String,
    pub body_part: String,
    pub modality: Option<String>,
    pub study_description: Option<String>,
    pub confidence: f64,
    pub report_status: ReportStatus,
    /// Everything needed to render the report again.
    pub report_data: AnalysisResult,
    pub pdf_storage_bucket: Option<String>,
    pub pdf_storage_path: Option<String>,
    pub pdf_url: Option<String>,
    pub pdf_file_size: Option<i64>,
    pub pdf_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PatientReportRecord {
    /// A pending report for one analysis. The raw DICOM patient name is
    /// split into a cleaned patient name and the referring doctor.
    pub fn from_analysis(analysis_id: Option<Uuid>, result: &AnalysisResult) -> Self {
        let patient = &result.patient_info;
        let raw_name = patient.name.as_deref();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            analysis_id,
            report_date: now.format("%Y-%m-%d").to_string(),
            patient_name: clean_patient_name(raw_name),
            patient_id: patient.display_id().to_string(),
            patient_sex: patient.sex.clone(),
            patient_age: patient.age.clone(),
            study_date: patient.study_date.clone(),
            doctor_name: extract_doctor_name(raw_name),
            body_part: result.body_part.as_str().to_string(),
            modality: result.modality.clone(),
            study_description: result.study_description.clone(),
            confidence: result.confidence,
            report_status: ReportStatus::Pending,
            report_data: result.clone(),
            pdf_storage_bucket: None,
            pdf_storage_path: None,
            pdf_url: None,
            pdf_file_size: None,
            pdf_generated_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The stored PDF URL, once the report has been rendered and stored.
    pub fn download_url(&self) -> Option<&str> {
        match self.report_status {
            ReportStatus::Completed | ReportStatus::Downloaded => self.pdf_url.as_deref(),
            ReportStatus::Pending => None,
        }
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let status: String = row.try_get("report_status")?;
        Ok(Self {
            id: row.try_get("id")?,
            analysis_id: row.try_get("analysis_id")?,
            report_date: row.try_get("report_date")?,
            patient_name: row.try_get("patient_name")?,
            patient_id: row.try_get("patient_id")?,
            patient_sex: row.try_get("patient_sex")?,
            patient_age: row.try_get("patient_age")?,
            study_date: row.try_get("study_date")?,
            doctor_name: row.try_get("doctor_name")?,
            body_part: row.try_get("body_part")?,
            modality: row.try_get("modality")?,
            study_description: row.try_get("study_description")?,
            confidence: row.try_get("confidence")?,
            report_status: ReportStatus::parse(&status)?,
            report_data: row.try_get::<_, Json<AnalysisResult>>("report_data")?.0,
            pdf_storage_bucket: row.try_get("pdf_storage_bucket")?,
            pdf_storage_path: row.try_get("pdf_storage_path")?,
            pdf_url: row.try_get("pdf_url")?,
            pdf_file_size: row.try_get("pdf_file_size")?,
            pdf_generated_at: row.try_get("pdf_generated_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

// =============================================================================
// report_generation_logs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationKind {
    ProfessionalReport,
    ClinicalSummary,
    AiReport,
}

impl GenerationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationKind::ProfessionalReport => "professional_report",
            GenerationKind::ClinicalSummary => "clinical_summary",
            GenerationKind::AiReport => "ai_report",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s {
            "professional_report" => Ok(GenerationKind::ProfessionalReport),
            "clinical_summary" => Ok(GenerationKind::ClinicalSummary),
            "ai_report" => Ok(GenerationKind::AiReport),
            other => Err(DbError::InvalidStatus(format!("generation kind {other}"))),
        }
    }
}

/// One report or summary generation attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationLog {
    pub id: Uuid,
    pub report_id: Option<Uuid>,
    pub analysis_id: Option<Uuid>,
    pub kind: GenerationKind,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub enhanced: bool,
    /// SHA-256 of the generated text, hex encoded.
    pub output_hash: Option<String>,
    pub latency_ms: i64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl GenerationLog {
    pub fn new(kind: GenerationKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            report_id: None,
            analysis_id: None,
            kind,
            provider: None,
            model: None,
            enhanced: false,
            output_hash: None,
            latency_ms: 0,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_output(mut self, text: &str) -> Self {
        use sha2::{Digest, Sha256};
        self.output_hash = Some(format!("{:x}", Sha256::digest(text.as_bytes())));
        self
    }

    pub(crate) fn from_row(row: &Row) -> Result<Self> {
        let kind: String = row.try_get("kind")?;
        Ok(Self {
            id: row.try_get("id")?,
            report_id: row.try_get("report_id")?,
            analysis_id: row.try_get("analysis_id")?,
            kind: GenerationKind::parse(&kind)?,
            provider: row.try_get("provider")?,
            model: row.try_get("model")?,
            enhanced: row.try_get("enhanced")?,
            output_hash: row.try_get("output_hash")?,
            latency_ms: row.try_get("latency_ms")?,
            error: row.try_get("error")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use radscope_common::{BodyPart, PatientInfo};

    fn sample_result() -> AnalysisResult {
        AnalysisResult {
            body_part: BodyPart::Chest,
            confidence: 0.9,
            pathologies: vec!["costophrenic angles appear normal".into()],
            modality: Some("CR".into()),
            patient_info: PatientInfo {
                name: Some("DOE^JANE DR. SMITH".into()),
                patient_id: Some("P-17".into()),
                ..Default::default()
            },
            image_size: Some([512, 256]),
            pixel_spacing: Some([0.5, 0.5]),
            ..Default::default()
        }
    }

    #[test]
    fn test_analysis_record_flattens_result() {
        let meta = StudyMetadata {
            series_description: Some("PA".into()),
            institution_name: Some("General".into()),
            ..Default::default()
        };
        let rec = AnalysisRecord::from_analysis(&sample_result(), &meta, "a.dcm", "abc", 1024)
            .with_session("CHEST_1");
        assert_eq!(rec.body_part, "chest");
        assert_eq!(rec.image_width, Some(512));
        assert_eq!(rec.image_height, Some(256));
        assert_eq!(rec.file_size, Some(1024));
        assert_eq!(rec.series_description.as_deref(), Some("PA"));
        assert_eq!(rec.session_id.as_deref(), Some("CHEST_1"));
        assert_eq!(rec.analyzer_version, ANALYZER_VERSION);
    }

    #[test]
    fn test_category_whitelist() {
        assert_eq!(Category::parse("body_part").unwrap(), Category::BodyPart);
        assert_eq!(Category::parse("study_date").unwrap().column(), "study_date");
        assert!(matches!(
            Category::parse("id; DROP TABLE dicom_analyses"),
            Err(DbError::InvalidCategory(_))
        ));
    }

    #[test]
    fn test_pending_report_splits_doctor_from_name() {
        let rep = PatientReportRecord::from_analysis(None, &sample_result());
        assert_eq!(rep.patient_name, "DOE JANE");
        assert_eq!(rep.doctor_name, "DR.SMITH");
        assert_eq!(rep.patient_id, "P-17");
        assert_eq!(rep.report_status, ReportStatus::Pending);
        assert_eq!(rep.report_date.len(), 10);
        assert!(rep.download_url().is_none());
    }

    #[test]
    fn test_download_url_only_after_completion() {
        let mut rep = PatientReportRecord::from_analysis(None, &sample_result());
        rep.pdf_url = Some("/reports/P-17/x.pdf".into());
        assert!(rep.download_url().is_none());
        rep.report_status = ReportStatus::Completed;
        assert_eq!(rep.download_url(), Some("/reports/P-17/x.pdf"));
    }

    #[test]
    fn test_report_status_round_trip() {
        for s in [ReportStatus::Pending, ReportStatus::Completed, ReportStatus::Downloaded] {
            assert_eq!(ReportStatus::parse(s.as_str()).unwrap(), s);
        }
        assert!(ReportStatus::parse("archived").is_err());
    }

    #[test]
    fn test_generation_log_hashes_output() {
        let log = GenerationLog::new(GenerationKind::ClinicalSummary).with_output("abc");
        assert_eq!(
            log.output_hash.as_deref(),
            Some("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }
}

//! Full analysis of one DICOM study: classification, statistics, findings.

use std::path::Path;

use chrono::Utc;
use image::GrayImage;
use radscope_common::confidence::{analysis_confidence, reconcile_with_vision};
use radscope_common::{AnalysisResult, BodyPart, StudyMetadata, VisionAssessment, DISCLAIMER};
use radscope_config::AnalysisConfig;
use tracing::{debug, info, warn};

use crate::classifier::{classify, landmarks};
use crate::error::{AnalysisError, Result};
use crate::features::image_features;
use crate::findings::{general_findings, is_contrast_study, FindingParams};
use crate::plane::Plane;
use crate::regions::region_findings;
use crate::thresholds::detect_heuristic_findings;

pub const NO_FINDINGS: &str = "No specific abnormalities detected";

/// Tunables for one analyzer instance.
#[derive(Debug, Clone)]
pub struct AnalyzerSettings {
    pub min_lesion_area: usize,
    pub max_lesion_area: usize,
    pub default_pixel_spacing_mm: f64,
    pub edge_low: f32,
    pub edge_high: f32,
    pub filename_hints: bool,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self::from(&AnalysisConfig::default())
    }
}

impl From<&AnalysisConfig> for AnalyzerSettings {
    fn from(c: &AnalysisConfig) -> Self {
        Self {
            min_lesion_area: c.min_lesion_area,
            max_lesion_area: c.max_lesion_area,
            default_pixel_spacing_mm: c.default_pixel_spacing_mm,
            edge_low: c.edge_low,
            edge_high: c.edge_high,
            filename_hints: c.filename_hints,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    settings: AnalyzerSettings,
}

impl Analyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &AnalyzerSettings {
        &self.settings
    }

    /// Load a file from disk and analyse it. CPU bound; call from a blocking task.
    pub fn analyze_file(&self, path: impl AsRef<Path>, filename: Option<&str>) -> Result<AnalysisResult> {
        let study = radscope_dicom::load(path)?;
        if study.image.width() == 0 || study.image.height() == 0 {
            return Err(AnalysisError::EmptyImage);
        }
        Ok(self.analyze(&study.metadata, &study.image, filename))
    }

    /// Like [`Analyzer::analyze_file`], but any failure becomes a low-confidence
    /// result that carries the error message.
    pub fn analyze_file_or_fallback(&self, path: impl AsRef<Path>, filename: Option<&str>) -> AnalysisResult {
        let path = path.as_ref();
        match self.analyze_file(path, filename) {
            Ok(result) => result,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Analysis failed, returning fallback result");
                let meta = radscope_dicom::read_metadata_file(path).unwrap_or_default();
                fallback_result(&meta, &e.to_string())
            }
        }
    }

    pub fn analyze(&self, meta: &StudyMetadata, image: &GrayImage, filename: Option<&str>) -> AnalysisResult {
        let s = &self.settings;
        let plane = Plane::from_image(image);

        let hint = if s.filename_hints { filename } else { None };
        let class = classify(meta, hint);
        debug!(
            body_part = %class.body_part,
            source = ?class.source,
            keyword = class.keyword.unwrap_or("-"),
            "Body part classified"
        );

        let spacing = meta
            .pixel_spacing
            .map(|[row, _]| row)
            .filter(|v| *v > 0.0)
            .unwrap_or(s.default_pixel_spacing_mm);
        let params = FindingParams {
            min_lesion_area: s.min_lesion_area,
            max_lesion_area: s.max_lesion_area,
            pixel_spacing_mm: spacing,
            contrast_study: is_contrast_study(meta.study_description.as_deref()),
        };

        let mut pathologies = general_findings(&plane, &params);
        pathologies.extend(region_findings(&plane, class.body_part));

        let features = image_features(&plane, s.edge_low, s.edge_high);
        let heuristic = detect_heuristic_findings(&features, meta);

        let has_findings = !pathologies.is_empty();
        if !has_findings {
            pathologies.push(NO_FINDINGS.to_string());
        }

        info!(
            body_part = %class.body_part,
            findings = pathologies.len(),
            heuristic = heuristic.pathologies.len(),
            "Analysis complete"
        );

        AnalysisResult {
            body_part: class.body_part,
            confidence: analysis_confidence(class.source, has_findings),
            anatomical_landmarks: landmarks(class.body_part),
            pathologies,
            heuristic_findings: heuristic.pathologies,
            recommendations: vec![
                "Clinical correlation recommended".to_string(),
                "Follow-up imaging as indicated".to_string(),
            ],
            measurements: heuristic.measurements,
            locations: heuristic.locations,
            modality: meta.modality.clone(),
            study_description: meta.study_description.clone(),
            patient_info: meta.patient.clone(),
            image_size: Some([image.width(), image.height()]),
            pixel_spacing: meta.pixel_spacing,
            slice_thickness: meta.slice_thickness,
            image_features: features,
            vision: None,
            analysis_timestamp: Utc::now(),
            disclaimer: DISCLAIMER.to_string(),
        }
    }
}

/// Result returned when a study could not be analysed.
pub fn fallback_result(meta: &StudyMetadata, message: &str) -> AnalysisResult {
    AnalysisResult {
        body_part: BodyPart::Unknown,
        confidence: 0.1,
        anatomical_landmarks: vec!["unable to determine".to_string()],
        pathologies: vec![format!("Analysis error: {message}")],
        recommendations: vec!["Technical error - manual review required".to_string()],
        modality: meta.modality.clone(),
        study_description: meta.study_description.clone(),
        patient_info: meta.patient.clone(),
        analysis_timestamp: Utc::now(),
        disclaimer: DISCLAIMER.to_string(),
        ..Default::default()
    }
}

/// Merge a vision model opinion into a keyword result.
///
/// Agreement raises the confidence. Disagreement keeps the keyword body part
/// at a reduced confidence. When the keywords found nothing and the model
/// names a known body part, that body part is adopted at the reduced confidence.
pub fn apply_vision(result: &mut AnalysisResult, vision: VisionAssessment) {
    let seen = BodyPart::parse(&vision.body_part);
    let agrees = seen == result.body_part;

    if result.body_part == BodyPart::Unknown && seen != BodyPart::Unknown {
        result.body_part = seen;
        result.anatomical_landmarks = landmarks(seen);
        result.confidence = reconcile_with_vision(vision.confidence, 0.0, false);
    } else if seen != BodyPart::Unknown {
        result.confidence = reconcile_with_vision(result.confidence, vision.confidence, agrees);
    }

    debug!(
        keyword = %result.body_part,
        vision = %seen,
        agrees,
        confidence = result.confidence,
        "Vision opinion merged"
    );
    result.vision = Some(vision);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn chest_meta() -> StudyMetadata {
        StudyMetadata {
            modality: Some("CR".into()),
            body_part_examined: Some("CHEST".into()),
            study_description: Some("PA chest".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_chest_result_shape() {
        let img = GrayImage::from_fn(128, 128, |x, y| Luma([((x * 2 + y) % 256) as u8]));
        let result = Analyzer::default().analyze(&chest_meta(), &img, None);

        assert_eq!(result.body_part, BodyPart::Chest);
        assert_eq!(result.anatomical_landmarks.len(), 15);
        assert_eq!(result.confidence, 0.90);
        assert_eq!(result.image_size, Some([128, 128]));
        assert_eq!(result.recommendations.len(), 2);
        assert!(result.pathologies.iter().any(|p| p.contains("costophrenic")));
        assert_eq!(result.disclaimer, DISCLAIMER);
        assert!(result.heuristic_findings.len() <= 10);
    }

    #[test]
    fn test_unknown_study_uses_filename_hint() {
        let img = GrayImage::from_pixel(32, 32, Luma([120]));
        let a = Analyzer::default();
        let result = a.analyze(&StudyMetadata::default(), &img, Some("left_knee.dcm"));
        assert_eq!(result.body_part, BodyPart::Leg);

        let strict = Analyzer::new(AnalyzerSettings { filename_hints: false, ..Default::default() });
        let result = strict.analyze(&StudyMetadata::default(), &img, Some("left_knee.dcm"));
        assert_eq!(result.body_part, BodyPart::Unknown);
        assert_eq!(result.anatomical_landmarks, vec!["anatomical structures".to_string()]);
    }

    #[test]
    fn test_fallback_result() {
        let r = fallback_result(&chest_meta(), "bad pixels");
        assert_eq!(r.pathologies, vec!["Analysis error: bad pixels".to_string()]);
        assert_eq!(r.confidence, 0.1);
        assert_eq!(r.anatomical_landmarks, vec!["unable to determine".to_string()]);
        assert_eq!(r.modality.as_deref(), Some("CR"));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let r = Analyzer::default().analyze_file_or_fallback(dir.path().join("gone.dcm"), None);
        assert!(r.pathologies[0].starts_with("Analysis error:"));
        assert_eq!(r.body_part, BodyPart::Unknown);
    }

    #[test]
    fn test_vision_agreement_and_adoption() {
        let mut r = AnalysisResult { body_part: BodyPart::Chest, confidence: 0.85, ..Default::default() };
        apply_vision(&mut r, VisionAssessment { body_part: "chest".into(), confidence: 0.9, ..Default::default() });
        assert!(r.confidence > 0.85);
        assert!(r.vision.is_some());

        let mut r = AnalysisResult { confidence: 0.3, ..Default::default() };
        apply_vision(&mut r, VisionAssessment { body_part: "Brain".into(), confidence: 0.8, ..Default::default() });
        assert_eq!(r.body_part, BodyPart::Brain);
        assert!((r.confidence - 0.56).abs() < 1e-9);
        assert_eq!(r.anatomical_landmarks.len(), 3);

        let mut r = AnalysisResult { body_part: BodyPart::Spine, confidence: 0.9, ..Default::default() };
        apply_vision(&mut r, VisionAssessment { body_part: "Unknown".into(), confidence: 0.0, ..Default::default() });
        assert_eq!(r.confidence, 0.9);
    }
}

//! Single-study radiologist report.
//!
//! Sections come from a [`RadiologistReport`]. Where a section is missing or
//! holds a placeholder, a paragraph is generated from the analysis itself so
//! the PDF always reads as a complete report.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use radscope_common::names::{clean_patient_name, extract_doctor_name};
use radscope_common::{AnalysisResult, DISCLAIMER};
use radscope_llm::RadiologistReport;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layout::{Font, PageDecor, PageWriter, Theme};
use crate::text::{clean_and_split, format_date};

const DEFAULT_INSTITUTION: &str = "MEDICAL IMAGING CENTER";

const ENHANCED_DISCLAIMER: &str = "This report combines automated image analysis with \
AI-generated narrative text. Every finding, impression and recommendation must be verified by \
a qualified radiologist against the original images and the clinical history before it is \
used for patient care.";

const STANDARD_DISCLAIMER: &str = "This report was produced by an automated medical imaging \
analysis system. It is intended to support, not replace, the judgement of a qualified \
radiologist and must be reviewed before any clinical decision is made.";

/// Who and what a report is about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSubject {
    pub patient_name: String,
    pub patient_id: String,
    pub sex: String,
    pub age: String,
    /// Raw DICOM study date; formatted at render time.
    pub study_date: Option<String>,
    pub report_date: String,
    pub doctor_name: String,
    pub institution: Option<String>,
    pub modality: String,
    pub body_part: String,
    pub study_description: String,
    pub confidence: f64,
    pub landmarks: Vec<String>,
    pub pathologies: Vec<String>,
    pub measurements: BTreeMap<String, String>,
    pub locations: BTreeMap<String, String>,
}

impl ReportSubject {
    /// The raw patient name is split into the patient and the referring
    /// doctor the same way stored reports are.
    pub fn from_analysis(result: &AnalysisResult, now: DateTime<Utc>) -> Self {
        let patient = &result.patient_info;
        let raw_name = patient.name.as_deref();
        Self {
            patient_name: clean_patient_name(raw_name),
            patient_id: patient.display_id().to_string(),
            sex: patient.sex.clone().unwrap_or_else(|| "Unknown".into()),
            age: patient.age.clone().unwrap_or_else(|| "Unknown".into()),
            study_date: patient.study_date.clone(),
            report_date: now.format("%B %d, %Y").to_string(),
            doctor_name: extract_doctor_name(raw_name),
            institution: None,
            modality: result.modality_or_unknown().to_string(),
            body_part: result.body_part.as_str().to_string(),
            study_description: result
                .study_description
                .clone()
                .unwrap_or_else(|| "Not specified".into()),
            confidence: result.confidence,
            landmarks: result.anatomical_landmarks.clone(),
            pathologies: result.pathologies.clone(),
            measurements: result.measurements.clone(),
            locations: result.locations.clone(),
        }
    }

    /// Override the names with values already stored for this report.
    pub fn with_names(mut self, patient_name: impl Into<String>, doctor_name: impl Into<String>) -> Self {
        self.patient_name = patient_name.into();
        self.doctor_name = doctor_name.into();
        self
    }

    pub fn with_institution(mut self, institution: Option<String>) -> Self {
        self.institution = institution.filter(|s| !s.trim().is_empty());
        self
    }

    pub fn with_report_date(mut self, report_date: impl Into<String>) -> Self {
        self.report_date = report_date.into();
        self
    }
}

pub fn professional_report_filename(patient_id: &str, at: DateTime<Utc>) -> String {
    let id: String = patient_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("Radiology_Report_{id}_{}.pdf", at.format("%Y%m%d_%H%M%S"))
}

// ── Section text ────────────────────────────────────────────────────────────

fn usable(text: &str) -> bool {
    let t = text.trim();
    t.len() > 10 && !t.starts_with('[')
}

/// Model recommendations are often a bare list fragment; only take them
/// when they read as prose.
fn usable_recommendations(text: &str) -> bool {
    let t = text.trim();
    t.len() > 50
        && !t.starts_with('[')
        && !t.starts_with('"')
        && !t.split_whitespace().all(|w| w.chars().count() <= 2)
}

pub fn has_critical_findings(text: &str) -> bool {
    let t = text.trim().trim_end_matches('.').to_lowercase();
    !(t.is_empty() || t == "none" || t == "none identified" || t == "no critical findings")
}

fn join_map(map: &BTreeMap<String, String>) -> String {
    map.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>().join(", ")
}

fn technique_fallback(s: &ReportSubject) -> Vec<String> {
    vec![format!(
        "Standard {} imaging protocol was employed for comprehensive evaluation of the {} region. \
         Images were acquired and reviewed with attention to diagnostic quality and anatomical coverage.",
        s.modality, s.body_part
    )]
}

fn findings_fallback(s: &ReportSubject) -> Vec<String> {
    let mut out = Vec::new();
    if !s.landmarks.is_empty() {
        out.push(format!(
            "The {} examination demonstrates comprehensive visualization of the {} with clear \
             identification of key anatomical structures including {}. Anatomical relationships \
             are preserved.",
            s.modality,
            s.body_part,
            s.landmarks.join(", ")
        ));
    }
    if s.pathologies.is_empty() {
        out.push(format!(
            "No significant abnormality is identified in the {}. The visualized structures appear \
             within normal limits for the imaging technique employed.",
            s.body_part
        ));
    } else {
        let mut text = format!(
            "Image analysis identifies the following findings: {}.",
            s.pathologies.join(", ")
        );
        if !s.measurements.is_empty() {
            text.push_str(&format!(" Quantitative measurements include: {}.", join_map(&s.measurements)));
        }
        if !s.locations.is_empty() {
            text.push_str(&format!(" Anatomical locations: {}.", join_map(&s.locations)));
        }
        text.push_str(&format!(
            " These findings are reported with a diagnostic confidence level of {:.1}% and require \
             correlation with the clinical presentation.",
            s.confidence * 100.0
        ));
        out.push(text);
    }
    out.push(
        "Technical quality of the study is adequate for diagnostic interpretation. No significant \
         motion or positioning artifact limits the evaluation."
            .to_string(),
    );
    out
}

fn recommendations_fallback(s: &ReportSubject) -> Vec<String> {
    let mut out = Vec::new();
    if s.pathologies.is_empty() {
        out.push(
            "No immediate intervention is indicated on the basis of this study. Continue routine \
             clinical care as appropriate."
                .to_string(),
        );
    } else {
        out.push(
            "Clinical correlation with the patient's symptoms, physical examination and laboratory \
             results is recommended to establish the significance of the reported findings."
                .to_string(),
        );
        out.push(format!(
            "Referral to an appropriate specialist should be considered for further evaluation of \
             the {} findings.",
            s.body_part
        ));
    }
    let suspicious = s.pathologies.iter().any(|p| {
        let p = p.to_lowercase();
        p.contains("mass") || p.contains("tumor")
    });
    out.push(if suspicious {
        "Follow-up imaging in 3-6 months is recommended to assess interval change.".to_string()
    } else {
        "Routine follow-up imaging as clinically indicated.".to_string()
    });
    out.push(
        "The findings and their implications should be discussed with the patient, and any \
         questions addressed by the referring physician."
            .to_string(),
    );
    out
}

fn paragraphs(w: &mut PageWriter, items: &[String]) {
    for p in items {
        w.body(p);
        w.space(2.0);
    }
}

// ── Rendering ───────────────────────────────────────────────────────────────

pub fn render_professional_report(
    subject: &ReportSubject,
    report: &RadiologistReport,
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let theme = Theme::default();
    let decor = PageDecor {
        header_title: "COMPREHENSIVE RADIOLOGICAL ASSESSMENT".to_string(),
        header_subtitle: if report.enhanced {
            "AI-Enhanced Medical Imaging Report - Professional Grade Analysis".to_string()
        } else {
            "Professional Medical Imaging Report - Clinical Grade".to_string()
        },
        header_right: subject
            .institution
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTITUTION.to_string()),
        footer_lines: vec![
            format!("Generated: {}", generated_at.format("%B %d, %Y at %H:%M UTC")),
            "CONFIDENTIAL MEDICAL REPORT - FOR AUTHORIZED MEDICAL PERSONNEL ONLY".to_string(),
            DISCLAIMER.to_string(),
        ],
    };
    let mut w = PageWriter::new("Radiology Report", decor, theme.clone())?;

    w.centered("COMPREHENSIVE RADIOLOGICAL REPORT", 16.0, Font::Bold);
    w.centered(
        if report.enhanced {
            "Enhanced with Artificial Intelligence Analysis"
        } else {
            "Professional Medical Assessment"
        },
        10.0,
        Font::Oblique,
    );
    w.space(2.0);
    w.rule(&theme.accent, 0.8);
    w.space(4.0);

    w.heading("PATIENT INFORMATION", 30.0);
    w.key_values(&[
        ("Patient Name:", subject.patient_name.clone()),
        ("Patient ID:", subject.patient_id.clone()),
        ("Sex:", subject.sex.clone()),
        ("Age:", subject.age.clone()),
        ("Study Date:", format_date(subject.study_date.as_deref())),
        ("Report Date:", subject.report_date.clone()),
    ]);

    w.heading("REFERRING PHYSICIAN", 8.0);
    w.body(&subject.doctor_name);
    w.space(4.0);

    let indication = clean_and_split(&report.clinical_indication);
    if !indication.is_empty() {
        w.heading("CLINICAL INDICATION", 12.0);
        paragraphs(&mut w, &indication);
    }

    w.heading("TECHNIQUE", 12.0);
    let technique = if usable(&report.technique) {
        clean_and_split(&report.technique)
    } else {
        Vec::new()
    };
    if technique.is_empty() {
        paragraphs(&mut w, &technique_fallback(subject));
    } else {
        paragraphs(&mut w, &technique);
    }

    w.heading("STUDY INFORMATION", 24.0);
    w.key_values(&[
        ("Modality:", subject.modality.clone()),
        ("Body Part Examined:", subject.body_part.clone()),
        ("Study Description:", subject.study_description.clone()),
        ("Analysis Confidence:", format!("{:.1}%", subject.confidence * 100.0)),
    ]);

    w.heading("FINDINGS", 12.0);
    let findings = if usable(&report.detailed_findings) {
        clean_and_split(&report.detailed_findings)
    } else {
        Vec::new()
    };
    if findings.is_empty() {
        paragraphs(&mut w, &findings_fallback(subject));
    } else {
        paragraphs(&mut w, &findings);
    }

    let impression = clean_and_split(&report.impression);
    if !impression.is_empty() {
        w.heading("IMPRESSION", 12.0);
        paragraphs(&mut w, &impression);
    }

    if has_critical_findings(&report.critical_findings) {
        w.heading("CRITICAL FINDINGS", 14.0);
        let color = theme.critical.clone();
        w.callout(&report.critical_findings, &color);
        w.space(2.0);
    }

    w.heading("RECOMMENDATIONS", 12.0);
    let recommendations = if usable_recommendations(&report.recommendations) {
        clean_and_split(&report.recommendations)
    } else {
        Vec::new()
    };
    if recommendations.is_empty() {
        paragraphs(&mut w, &recommendations_fallback(subject));
    } else {
        paragraphs(&mut w, &recommendations);
    }

    w.heading("PROFESSIONAL DISCLAIMER", 12.0);
    w.paragraph(
        if report.enhanced { ENHANCED_DISCLAIMER } else { STANDARD_DISCLAIMER },
        8.5,
        Font::Oblique,
        0.0,
        &theme.muted,
    );
    w.space(6.0);

    let credit = if report.enhanced {
        "Enhanced by Gemini AI Technology | AI-Powered Medical Imaging Analysis System"
    } else {
        "AI-Powered Medical Imaging Analysis System"
    };
    w.centered(credit, 8.0, Font::Oblique);
    w.centered(
        &format!("Report Generated: {}", generated_at.format("%B %d, %Y at %H:%M UTC")),
        8.0,
        Font::Regular,
    );

    tracing::debug!(pages = w.pages(), enhanced = report.enhanced, "Professional report rendered");
    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use radscope_common::{BodyPart, PatientInfo};

    fn analysis() -> AnalysisResult {
        AnalysisResult {
            body_part: BodyPart::Brain,
            confidence: 0.88,
            anatomical_landmarks: vec!["ventricles".into(), "midline".into()],
            pathologies: vec!["possible mass lesion".into()],
            measurements: BTreeMap::from([("lesion".into(), "12 mm".into())]),
            modality: Some("MR".into()),
            patient_info: PatientInfo {
                name: Some("DOE^JANE DR. SHAH".into()),
                patient_id: Some("P-9".into()),
                study_date: Some("20240115".into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_subject_splits_names() {
        let s = ReportSubject::from_analysis(&analysis(), Utc::now());
        assert_eq!(s.patient_name, "DOE JANE");
        assert_eq!(s.doctor_name, "DR.SHAH");
        assert_eq!(s.sex, "Unknown");
        assert_eq!(s.study_description, "Not specified");

        let s = s.with_names("Jane Doe", "Dr. Shah").with_institution(Some("  ".into()));
        assert_eq!(s.patient_name, "Jane Doe");
        assert!(s.institution.is_none());
    }

    #[test]
    fn test_placeholder_sections_are_rejected() {
        assert!(!usable("[pending]"));
        assert!(!usable("short"));
        assert!(usable("Normal study without acute findings."));

        assert!(!usable_recommendations("\"Follow up\" in the clinic as directed by the team today ok"));
        assert!(!usable_recommendations("a b c d e f g h i j k l m n o p q r s t u v w x y z aa bb cc"));
        assert!(usable_recommendations(
            "Clinical correlation is advised, with follow-up imaging in three months."
        ));
    }

    #[test]
    fn test_critical_findings_none_variants() {
        assert!(!has_critical_findings("None"));
        assert!(!has_critical_findings(" none identified. "));
        assert!(!has_critical_findings("No critical findings"));
        assert!(!has_critical_findings(""));
        assert!(has_critical_findings("Large midline shift"));
    }

    #[test]
    fn test_fallbacks_reflect_findings() {
        let s = ReportSubject::from_analysis(&analysis(), Utc::now());
        let findings = findings_fallback(&s);
        assert_eq!(findings.len(), 3);
        assert!(findings[0].contains("ventricles, midline"));
        assert!(findings[1].contains("lesion: 12 mm"));
        assert!(findings[1].contains("88.0%"));

        let recs = recommendations_fallback(&s);
        assert_eq!(recs.len(), 4);
        assert!(recs[2].contains("3-6 months"));

        let normal = ReportSubject { pathologies: vec![], ..s };
        let recs = recommendations_fallback(&normal);
        assert_eq!(recs.len(), 3);
        assert!(recs[1].starts_with("Routine"));
    }

    #[test]
    fn test_renders_template_report() {
        let result = analysis();
        let subject = ReportSubject::from_analysis(&result, Utc::now());
        let report = RadiologistReport {
            critical_findings: "Possible mass requires urgent review".into(),
            ..Default::default()
        };
        let bytes = render_professional_report(&subject, &report, Utc::now()).unwrap();
        assert!(bytes.starts_with(b"%PDF"));
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(!doc.get_pages().is_empty());
    }

    #[test]
    fn test_filename_sanitises_patient_id() {
        use chrono::TimeZone;
        let at = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        assert_eq!(
            professional_report_filename("AB/12 x", at),
            "Radiology_Report_AB_12_x_20240506_070809.pdf"
        );
    }
}

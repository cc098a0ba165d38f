//! Multi-study AI analysis report.

use chrono::{DateTime, Utc};
use radscope_common::DISCLAIMER;
use radscope_llm::BatchAnalysis;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::layout::{Font, PageDecor, PageWriter, Theme};
use crate::text::truncate_chars;

/// Rows shown in the individual results table.
pub const MAX_TABLE_ROWS: usize = 10;
const FILENAME_CHARS: usize = 20;
const PATHOLOGY_CHARS: usize = 50;
const PATHOLOGIES_PER_ROW: usize = 3;

/// The subset of an upload result the table needs. Accepts the upload
/// response JSON as sent back by the browser.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndividualResult {
    pub filename: String,
    pub body_part: String,
    pub confidence: f64,
    pub pathologies: Vec<String>,
}

pub fn ai_report_filename(at: DateTime<Utc>) -> String {
    format!("AI_Medical_Report_{}.pdf", at.format("%Y%m%d_%H%M%S"))
}

/// Table rows: file, body part, confidence, first pathologies.
pub fn result_rows(results: &[IndividualResult]) -> Vec<Vec<String>> {
    results
        .iter()
        .take(MAX_TABLE_ROWS)
        .map(|r| {
            let filename = if r.filename.is_empty() { "Unknown" } else { r.filename.as_str() };
            let body_part = if r.body_part.is_empty() { "Unknown" } else { r.body_part.as_str() };
            let pathologies = r
                .pathologies
                .iter()
                .take(PATHOLOGIES_PER_ROW)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                truncate_chars(filename, FILENAME_CHARS),
                body_part.to_string(),
                format!("{:.1}%", r.confidence * 100.0),
                truncate_chars(&pathologies, PATHOLOGY_CHARS),
            ]
        })
        .collect()
}

fn list_section(w: &mut PageWriter, title: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    w.heading(title, 8.0);
    for item in items {
        w.bullet(item);
    }
    w.space(4.0);
}

pub fn render_ai_report(
    analysis: &BatchAnalysis,
    results: &[IndividualResult],
    generated_at: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let decor = PageDecor {
        header_title: "MEDICAL IMAGING ANALYSIS REPORT".to_string(),
        header_subtitle: "AI-assisted multi-study analysis".to_string(),
        header_right: String::new(),
        footer_lines: vec![DISCLAIMER.to_string()],
    };
    let mut w = PageWriter::new("AI Medical Imaging Analysis Report", decor, Theme::default())?;

    w.centered("MEDICAL IMAGING ANALYSIS REPORT", 18.0, Font::Bold);
    w.space(4.0);

    w.heading("Report Information", 20.0);
    w.key_values(&[
        ("Date of Analysis:", generated_at.format("%B %d, %Y at %I:%M %p UTC").to_string()),
        ("Files Analyzed:", analysis.files_analyzed.to_string()),
        ("AI Confidence:", format!("{:.1}%", analysis.ai_confidence * 100.0)),
    ]);

    w.heading("Executive Summary", 8.0);
    if analysis.summary.trim().is_empty() {
        w.body("No summary available");
    } else {
        w.body(&analysis.summary);
    }
    w.space(4.0);

    list_section(&mut w, "Clinical Insights", &analysis.clinical_insights);
    list_section(&mut w, "Differential Diagnosis", &analysis.differential_diagnosis);
    list_section(&mut w, "Clinical Recommendations", &analysis.recommendations);

    w.heading("Risk Assessment", 8.0);
    let risk = if analysis.risk_assessment.is_empty() {
        "Risk assessment not available"
    } else {
        analysis.risk_assessment.as_str()
    };
    w.body(&format!("Risk Level: {risk}"));
    w.space(4.0);

    w.heading("Follow-up Plan", 8.0);
    if analysis.follow_up_plan.is_empty() {
        w.body("Follow-up plan not available");
    } else {
        w.body(&analysis.follow_up_plan);
    }

    let rows = result_rows(results);
    if !rows.is_empty() {
        w.page_break();
        w.heading("Individual File Analysis Summary", 12.0);
        w.table(
            &["File", "Body Part", "Confidence", "Pathologies"],
            &[0.28, 0.2, 0.15, 0.37],
            &rows,
        );
    }

    w.space(8.0);
    w.heading("Report Prepared By:", 16.0);
    w.body("Dr. AI Radiologist");
    w.body("Medical AI Specialist");
    w.body("AI-Powered Medical Imaging Analysis System");

    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_analysis() -> BatchAnalysis {
        BatchAnalysis {
            summary: "Three chest radiographs were reviewed.".into(),
            clinical_insights: vec!["Consistent body part across studies".into()],
            differential_diagnosis: vec![],
            recommendations: vec!["Clinical correlation recommended".into()],
            risk_assessment: "Low".into(),
            follow_up_plan: "Routine follow-up".into(),
            ai_confidence: 0.85,
            files_analyzed: 3,
        }
    }

    #[test]
    fn test_result_rows_truncate_and_cap() {
        let many: Vec<IndividualResult> = (0..12)
            .map(|i| IndividualResult {
                filename: format!("{i:02}_a_rather_long_upload_name.dcm"),
                body_part: "chest".into(),
                confidence: 0.9,
                pathologies: vec![
                    "costophrenic angles appear normal".into(),
                    "both hila appears normal".into(),
                    "trachea is central in position".into(),
                    "fourth".into(),
                ],
            })
            .collect();
        let rows = result_rows(&many);
        assert_eq!(rows.len(), MAX_TABLE_ROWS);
        assert_eq!(rows[0][0], "00_a_rather_long_upl...");
        assert_eq!(rows[0][2], "90.0%");
        assert!(rows[0][3].ends_with("..."));
        assert!(!rows[0][3].contains("fourth"));
        assert_eq!(rows[0][3].chars().count(), PATHOLOGY_CHARS + 3);
    }

    #[test]
    fn test_missing_fields_read_as_unknown() {
        let r: IndividualResult = serde_json::from_str(r#"{"confidence": 0.5, "extra": 1}"#).unwrap();
        let rows = result_rows(&[r]);
        assert_eq!(rows[0][0], "Unknown");
        assert_eq!(rows[0][1], "Unknown");
        assert_eq!(rows[0][3], "");
    }

    #[test]
    fn test_renders_with_results_on_second_page() {
        let results = vec![IndividualResult {
            filename: "a.dcm".into(),
            body_part: "chest".into(),
            confidence: 0.9,
            pathologies: vec![],
        }];
        let bytes = render_ai_report(&sample_analysis(), &results, Utc::now()).unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 2);

        let bytes = render_ai_report(&sample_analysis(), &[], Utc::now()).unwrap();
        let doc = lopdf::Document::load_mem(&bytes).unwrap();
        assert_eq!(doc.get_pages().len(), 1);
    }

    #[test]
    fn test_filename_uses_timestamp() {
        use chrono::TimeZone;
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(ai_report_filename(at), "AI_Medical_Report_20240102_030405.pdf");
    }
}

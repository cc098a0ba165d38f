//! Short clinical summary for one study (under 100 words).

use radscope_common::AnalysisResult;
use serde::{Deserialize, Serialize};

use crate::backend::{LlmError, LlmRequest};
use crate::report::{format_map, join_or};
use crate::router::{LlmRouter, LlmTask};

pub const MAX_SUMMARY_WORDS: usize = 100;

const SUMMARY_HEADER: &str = "**CLINICAL SUMMARY:**";
const SIGNATURE_HEADER: &str = "**REPORT PREPARED BY:**";

/// Model summaries fill `clinical_summary`; the template fills the longer
/// patient-facing fields instead.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clinical_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recommendations: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up_plan: Option<String>,
    pub confidence_level: String,
    pub risk_assessment: String,
    pub enhanced: bool,
}

pub fn summary_prompt(r: &AnalysisResult) -> String {
    format!(
        r#"You are Dr. AI Radiologist. Generate a CONCISE medical summary (UNDER 100 WORDS) in professional doctor's report style.

PATIENT: {name} (ID: {id})
BODY PART: {body_part}
MODALITY: {modality}
CONFIDENCE: {confidence:.1}%

FINDINGS:
- Anatomical: {landmarks}
- Pathologies: {pathologies}
- Measurements: {measurements}

REQUIREMENTS:
- Maximum 100 words total
- Professional medical terminology
- Doctor's report writing style
- Focus on key pathological findings
- Include clinical significance
- Clear and actionable

FORMAT:
**CLINICAL SUMMARY:**
[Write a concise, professional medical summary under 100 words that includes:
- Key pathological findings
- Clinical significance
- Brief assessment
- Essential recommendations]

**REPORT PREPARED BY:**
Dr. AI Radiologist

IMPORTANT: Keep the entire response under 100 words. Be concise but comprehensive. Use professional medical language.
"#,
        name = r.patient_info.display_name(),
        id = r.patient_info.display_id(),
        body_part = r.body_part,
        modality = r.modality_or_unknown(),
        confidence = r.confidence * 100.0,
        landmarks = join_or(&r.anatomical_landmarks, "Standard structures"),
        pathologies = join_or(&r.pathologies, "No obvious abnormalities"),
        measurements = format_map(&r.measurements, "Standard"),
    )
}

/// Keep at most `max` whitespace-separated words, marking a cut with `...`.
pub fn truncate_words(text: &str, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() > max {
        format!("{}...", words[..max].join(" "))
    } else {
        text.to_string()
    }
}

/// Take the text between the summary and signature headers (or the whole
/// reply), flatten it to one line and cap it at [`MAX_SUMMARY_WORDS`].
pub fn parse_summary(text: &str) -> ClinicalSummary {
    let body = match text.find(SUMMARY_HEADER) {
        Some(i) => {
            let start = i + SUMMARY_HEADER.len();
            let end = text[start..].find(SIGNATURE_HEADER).map_or(text.len(), |j| start + j);
            &text[start..end]
        }
        None => text,
    };
    let flat = body.trim().replace('\n', " ").replace("  ", " ");

    ClinicalSummary {
        clinical_summary: Some(truncate_words(&flat, MAX_SUMMARY_WORDS)),
        confidence_level: "High".to_string(),
        risk_assessment: "Moderate".to_string(),
        enhanced: true,
        ..Default::default()
    }
}

pub fn fallback_summary(r: &AnalysisResult) -> ClinicalSummary {
    let findings = if r.pathologies.is_empty() {
        "No abnormalities detected".to_string()
    } else {
        r.pathologies.join(" ")
    };
    ClinicalSummary {
        executive_summary: Some(format!(
            "Analysis of {} using {} modality.",
            r.body_part,
            r.modality.as_deref().unwrap_or("imaging")
        )),
        analysis_summary: Some(format!("Analysis revealed {} findings. {findings}", r.pathologies.len())),
        recommendations: Some("Follow-up with healthcare provider for complete clinical assessment.".to_string()),
        patient_summary: Some(format!(
            "Your {} study has been analyzed. Please discuss the results with your doctor.",
            r.body_part
        )),
        follow_up_plan: Some("Schedule follow-up with healthcare provider".to_string()),
        confidence_level: "Medium".to_string(),
        risk_assessment: "Low".to_string(),
        enhanced: false,
        ..Default::default()
    }
}

/// A summary plus the provider error that forced the template, if any.
#[derive(Debug)]
pub struct SummaryOutcome {
    pub summary: ClinicalSummary,
    pub provider_error: Option<LlmError>,
}

/// Ask the summary backend for a short clinical summary.
///
/// Returns [`LlmError::Unavailable`] when no provider is configured. Any
/// other failure falls back to [`fallback_summary`] and is reported in
/// [`SummaryOutcome::provider_error`].
pub async fn clinical_summary(router: &LlmRouter, result: &AnalysisResult) -> Result<SummaryOutcome, LlmError> {
    let req = LlmRequest {
        max_tokens: Some(400),
        temperature: Some(0.2),
        ..LlmRequest::prompt(summary_prompt(result))
    };
    match router.route(LlmTask::Summary, req).await {
        Ok(resp) => Ok(SummaryOutcome { summary: parse_summary(&resp.content), provider_error: None }),
        Err(e @ LlmError::Unavailable(_)) => Err(e),
        Err(e) => {
            tracing::warn!(error = %e, body_part = %result.body_part, "Clinical summary failed, using template");
            Ok(SummaryOutcome { summary: fallback_summary(result), provider_error: Some(e) })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::tests::{router_with, CannedBackend};
    use radscope_common::BodyPart;

    #[test]
    fn test_extracts_between_headers() {
        let reply = "intro\n**CLINICAL SUMMARY:**\nChest film shows\nclear lungs.\n\n**REPORT PREPARED BY:**\nDr. AI Radiologist";
        let s = parse_summary(reply);
        assert_eq!(s.clinical_summary.as_deref(), Some("Chest film shows clear lungs."));
        assert!(s.enhanced);
        assert_eq!(s.confidence_level, "High");
    }

    #[test]
    fn test_whole_reply_used_without_header() {
        let s = parse_summary("Normal brain MRI.");
        assert_eq!(s.clinical_summary.as_deref(), Some("Normal brain MRI."));
    }

    #[test]
    fn test_truncation_caps_word_count() {
        let long = vec!["word"; 150].join(" ");
        let out = truncate_words(&long, MAX_SUMMARY_WORDS);
        assert!(out.ends_with("..."));
        assert_eq!(out.trim_end_matches("...").split_whitespace().count(), 100);

        let short = "only five words right here";
        assert_eq!(truncate_words(short, MAX_SUMMARY_WORDS), short);

        let s = parse_summary(&format!("**CLINICAL SUMMARY:** {long}"));
        assert!(s.clinical_summary.unwrap().split_whitespace().count() <= 100);
    }

    #[test]
    fn test_fallback_summary() {
        let r = AnalysisResult {
            body_part: BodyPart::Leg,
            pathologies: vec!["a".into(), "b".into()],
            ..Default::default()
        };
        let s = fallback_summary(&r);
        assert!(!s.enhanced);
        assert!(s.clinical_summary.is_none());
        assert_eq!(s.executive_summary.as_deref(), Some("Analysis of leg using imaging modality."));
        assert_eq!(s.analysis_summary.as_deref(), Some("Analysis revealed 2 findings. a b"));
        assert_eq!(s.risk_assessment, "Low");

        let json = serde_json::to_value(&s).unwrap();
        assert!(json.get("clinical_summary").is_none());
    }

    #[tokio::test]
    async fn test_summary_requires_provider() {
        let r = AnalysisResult::default();
        assert!(matches!(
            clinical_summary(&LlmRouter::new(), &r).await,
            Err(LlmError::Unavailable(_))
        ));

        let router = router_with("gemini", CannedBackend::ok("gemini", "**CLINICAL SUMMARY:** Fine."));
        let out = clinical_summary(&router, &r).await.unwrap();
        assert_eq!(out.summary.clinical_summary.as_deref(), Some("Fine."));
        assert!(out.provider_error.is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back_to_template() {
        let r = AnalysisResult { body_part: BodyPart::Chest, ..Default::default() };
        let router = router_with("gemini", CannedBackend::failing("gemini", 500));

        let out = clinical_summary(&router, &r).await.unwrap();
        assert_eq!(out.summary, fallback_summary(&r));
        assert!(!out.summary.enhanced);
        assert!(matches!(out.provider_error, Some(LlmError::ApiError { status: 500, .. })));
    }
}

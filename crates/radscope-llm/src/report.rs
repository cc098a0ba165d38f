//! Radiologist report generation for one study.
//!
//! The model is asked for a fixed set of headed sections. Replies are split on
//! those headers; when no provider is reachable a templated report built from
//! the heuristic analysis is returned instead.

use std::collections::BTreeMap;

use radscope_common::{AnalysisResult, BodyPart};
use serde::{Deserialize, Serialize};

use crate::backend::LlmRequest;
use crate::router::{LlmRouter, LlmTask};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadiologistReport {
    pub clinical_indication: String,
    pub technique: String,
    pub detailed_findings: String,
    pub impression: String,
    pub recommendations: String,
    pub critical_findings: String,
    pub full_report: String,
    /// True when the text came from a model rather than the template.
    pub enhanced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    ClinicalIndication,
    Technique,
    Findings,
    Impression,
    Recommendations,
    CriticalFindings,
}

/// Header patterns per section, tried in this order. A line starting with any
/// pattern (case-insensitive) opens that section.
const SECTION_PATTERNS: [(Section, &[&str]); 6] = [
    (Section::ClinicalIndication, &["**CLINICAL INDICATION:**", "CLINICAL INDICATION:", "CLINICAL INDICATION", "INDICATION:", "INDICATION"]),
    (Section::Technique, &["**TECHNIQUE:**", "TECHNIQUE:", "TECHNIQUE", "IMAGING TECHNIQUE:", "STUDY TECHNIQUE:"]),
    (Section::Findings, &["**FINDINGS:**", "FINDINGS:", "FINDINGS", "DETAILED FINDINGS:", "IMAGING FINDINGS:"]),
    (Section::Impression, &["**IMPRESSION:**", "IMPRESSION:", "IMPRESSION", "CLINICAL IMPRESSION:", "CLINICAL IMPRESSION"]),
    (Section::Recommendations, &["**RECOMMENDATIONS:**", "RECOMMENDATIONS:", "RECOMMENDATIONS", "CLINICAL RECOMMENDATIONS:", "CLINICAL RECOMMENDATIONS"]),
    (Section::CriticalFindings, &["**CRITICAL FINDINGS:**", "CRITICAL FINDINGS:", "CRITICAL FINDINGS", "URGENT FINDINGS:", "URGENT FINDINGS"]),
];

impl RadiologistReport {
    fn slot(&mut self, section: Section) -> &mut String {
        match section {
            Section::ClinicalIndication => &mut self.clinical_indication,
            Section::Technique => &mut self.technique,
            Section::Findings => &mut self.detailed_findings,
            Section::Impression => &mut self.impression,
            Section::Recommendations => &mut self.recommendations,
            Section::CriticalFindings => &mut self.critical_findings,
        }
    }
}

pub(crate) fn join_or(items: &[String], default: &str) -> String {
    if items.is_empty() {
        default.to_string()
    } else {
        items.join(", ")
    }
}

pub(crate) fn format_map(map: &BTreeMap<String, String>, default: &str) -> String {
    if map.is_empty() {
        return default.to_string();
    }
    map.iter().map(|(k, v)| format!("{k}: {v}")).collect::<Vec<_>>().join(", ")
}

pub fn report_prompt(r: &AnalysisResult) -> String {
    let modality = r.modality_or_unknown();
    let body_part = r.body_part;
    let pathologies = join_or(&r.pathologies, "No obvious abnormalities");
    let pathology_focus = join_or(&r.pathologies, "the examined structures");

    format!(
        r#"You are a board-certified radiologist with 25+ years of experience preparing comprehensive diagnostic reports for hospital systems. Generate a detailed, professional radiological report that matches the format and style of real medical reports from major hospitals.

STUDY DETAILS:
- Patient: {name} (ID: {id})
- Body Part: {body_part}
- Modality: {modality}
- Analysis Confidence: {confidence:.1}%
- Anatomical Landmarks: {landmarks}
- Pathological Findings: {pathologies}
- Measurements: {measurements}
- Locations: {locations}
- Initial Recommendations: {recommendations}

Generate a comprehensive radiological report with the following structure, matching real medical report formats:

**TECHNIQUE:**
Provide a detailed paragraph describing the comprehensive {modality} imaging protocol employed for {body_part} evaluation. Include specific technical parameters, patient positioning, contrast protocols (if applicable), slice thickness, imaging planes, and any specialized sequences or techniques utilized. Discuss image acquisition parameters and quality assurance measures. Use professional medical terminology and specific technical details.

**FINDINGS:**
Generate 3-4 comprehensive paragraphs with detailed medical observations:

PARAGRAPH 1 - ANATOMICAL ASSESSMENT: Provide an extensive description of all normal anatomical structures visualized in the {body_part} region. Include detailed commentary on bone architecture, soft tissue planes, vascular structures, organ morphology, and spatial relationships. Describe signal characteristics, enhancement patterns, and measurements where appropriate. Comment on age-appropriate anatomical variants and normal developmental features.

PARAGRAPH 2 - PATHOLOGICAL EVALUATION: Systematically analyze any abnormal findings related to {pathology_focus}. Provide detailed descriptions of any masses, lesions, inflammatory changes, degenerative alterations, or structural abnormalities. Include precise measurements, signal characteristics, enhancement patterns, and anatomical locations. Discuss the morphological features and their clinical significance.

PARAGRAPH 3 - TECHNICAL QUALITY AND LIMITATIONS: Comprehensively assess image quality, including patient cooperation, motion artifacts, contrast opacification, and diagnostic adequacy. Discuss any technical limitations that may affect interpretation, areas of suboptimal visualization, and recommendations for technique optimization in future studies.

PARAGRAPH 4 - COMPARATIVE ANALYSIS: Provide detailed analysis of findings in relation to normal anatomical parameters for the patient's age and demographics. Discuss any asymmetries, size variations, or positional abnormalities. Include assessment of regional perfusion, tissue characteristics, and functional implications where relevant.

**IMPRESSION:**
Write a comprehensive paragraph providing a clear, detailed clinical impression that synthesizes all findings. Include primary diagnosis or differential diagnoses, clinical significance of identified abnormalities, assessment of disease severity or progression, and correlation with clinical presentation. Provide prognostic implications and therapeutic considerations where appropriate.

**RECOMMENDATIONS:**
Generate a detailed paragraph with specific, actionable clinical recommendations. Include immediate management steps for critical findings, follow-up imaging protocols with specific timeframes, clinical correlation requirements, laboratory studies if indicated, specialist referrals with urgency levels, and patient counseling recommendations. Provide evidence-based rationale for each recommendation.

**CRITICAL FINDINGS:**
Provide a comprehensive assessment of any urgent or critical findings requiring immediate clinical attention. If no critical findings are present, state "No critical or urgent findings requiring immediate clinical attention are identified in this examination" and provide detailed rationale for this assessment.

IMPORTANT:
- Write each section as flowing, detailed paragraphs with complete sentences
- Use sophisticated medical terminology and provide comprehensive clinical context
- Each section should be substantial enough to demonstrate thorough radiological analysis
- Avoid bullet points or short phrases - create extensive, professional medical narrative content
- Match the style and format of real hospital radiological reports
- Include specific measurements and anatomical locations when available
- Use professional medical language throughout
"#,
        name = r.patient_info.display_name(),
        id = r.patient_info.display_id(),
        confidence = r.confidence * 100.0,
        landmarks = join_or(&r.anatomical_landmarks, "Standard anatomical structures"),
        measurements = format_map(&r.measurements, "Standard measurements"),
        locations = format_map(&r.locations, "Standard locations"),
        recommendations = join_or(&r.recommendations, "Clinical correlation"),
    )
}

fn clean_markdown(s: &str) -> String {
    s.replace("**", "").replace('*', "")
}

fn match_header(line: &str) -> Option<(Section, &'static str)> {
    let upper = line.to_ascii_uppercase();
    SECTION_PATTERNS.iter().find_map(|(section, patterns)| {
        patterns
            .iter()
            .find(|p| upper.starts_with(&p.to_ascii_uppercase()))
            .map(|p| (*section, *p))
    })
}

/// Split a model reply into report sections. Text before the first header is
/// dropped; a section repeated later replaces the earlier one.
pub fn parse_report(text: &str) -> RadiologistReport {
    let mut report = RadiologistReport {
        full_report: text.to_string(),
        enhanced: true,
        ..Default::default()
    };

    let mut current: Option<Section> = None;
    let mut content: Vec<String> = Vec::new();

    fn flush(report: &mut RadiologistReport, section: Option<Section>, content: &[String]) {
        let Some(section) = section else { return };
        let joined = clean_markdown(content.join("\n").trim());
        if !joined.is_empty() {
            *report.slot(section) = joined;
        }
    }

    for line in text.lines() {
        let stripped = line.trim();
        match match_header(stripped) {
            Some((section, pattern)) => {
                flush(&mut report, current, &content);
                current = Some(section);
                content.clear();

                let rest = clean_markdown(stripped.get(pattern.len()..).unwrap_or("").trim());
                if !rest.is_empty() {
                    content.push(rest);
                }
            }
            None if current.is_some() && !stripped.is_empty() => content.push(stripped.to_string()),
            None => {}
        }
    }
    flush(&mut report, current, &content);
    report
}

/// Deterministic report used when no model is reachable.
pub fn fallback_report(r: &AnalysisResult) -> RadiologistReport {
    let modality = r.modality.as_deref().unwrap_or("imaging");
    let body_part = if r.body_part == BodyPart::Unknown {
        "anatomical region".to_string()
    } else {
        r.body_part.to_string()
    };
    let confidence = r.confidence * 100.0;
    let has_findings = !r.pathologies.is_empty();

    let landmark_phrase = if r.body_part == BodyPart::Chest {
        "bone structures, soft tissue planes, and vascular elements"
    } else {
        "relevant anatomical components"
    };
    let contrast_phrase = if modality == "CT" {
        "Contrast opacification is adequate with appropriate timing and distribution"
    } else {
        "Signal characteristics are optimized for tissue contrast differentiation"
    };
    let systematic = if has_findings {
        format!(
            "the following specific findings requiring clinical attention: {}. These findings demonstrate characteristic imaging features with specific anatomical distribution and morphological characteristics that warrant further clinical correlation and potential follow-up assessment",
            r.pathologies.join(". ")
        )
    } else {
        "no significant pathological abnormalities or acute findings requiring immediate clinical intervention. All visualized anatomical structures demonstrate normal signal characteristics, morphological appearance, and dimensional parameters consistent with expected normal anatomical variants".to_string()
    };
    let correlation = if has_findings {
        "Identified abnormalities require clinical correlation with patient symptoms and physical examination findings to establish appropriate diagnostic considerations and therapeutic planning"
    } else {
        "No acute abnormalities, space-occupying lesions, inflammatory changes, or structural abnormalities are identified within the examination field"
    };
    let overall = if has_findings {
        "consistent with the identified pathological processes and warrants appropriate clinical follow-up"
    } else {
        "within normal limits for standard anatomical variants and age-related changes"
    };
    let vascular = if matches!(modality, "CT" | "MR") {
        "Vascular structures demonstrate normal caliber and enhancement patterns"
    } else {
        "Associated soft tissue structures appear within normal limits"
    };

    let detailed_findings = format!(
        "NORMAL ANATOMICAL STRUCTURES:\n\
The {modality} examination of the {body_part} demonstrates comprehensive visualization of normal anatomical architecture with excellent delineation of expected anatomical structures. Image quality is optimal for diagnostic interpretation with {confidence:.1}% confidence level. All standard anatomical landmarks including {landmark_phrase} are appropriately positioned and demonstrate normal morphological characteristics. The examination provides clear definition of tissue boundaries, organ contours, and spatial relationships consistent with normal anatomical parameters for the patient's age group and demographic profile.\n\n\
TECHNICAL ASSESSMENT AND IMAGE QUALITY:\n\
The imaging study was performed using comprehensive {modality} protocol specifically optimized for {body_part} evaluation, employing standard technical parameters and acquisition sequences. Patient positioning demonstrates optimal alignment for diagnostic assessment, with appropriate field of view coverage and slice selection. {contrast_phrase}. No significant motion artifacts, susceptibility effects, or technical limitations compromise the diagnostic quality of the examination. Image resolution and signal-to-noise ratio are adequate for confident radiological interpretation.\n\n\
PATHOLOGICAL EVALUATION AND SYSTEMATIC REVIEW:\n\
Systematic evaluation of the {body_part} region demonstrates {systematic}. The examination provides comprehensive assessment of the region of interest with detailed evaluation of potential pathological processes.\n\n\
COMPARATIVE ANALYSIS AND CLINICAL CORRELATION:\n\
The current study demonstrates normal anatomical relationships and tissue characteristics when compared to established normative parameters for the patient's age and demographic profile. {correlation}. The overall radiological appearance is {overall}. Regional tissue perfusion and enhancement patterns demonstrate normal physiological characteristics.\n\n\
INCIDENTAL FINDINGS AND ADDITIONAL OBSERVATIONS:\n\
Evaluation of visualized portions of adjacent anatomical structures demonstrates normal appearance without incidental findings requiring additional investigation. {vascular}. No unexpected findings outside the primary area of clinical interest are identified that would require additional diagnostic workup or specialist consultation."
    );

    let impression = format!(
        "The {modality} examination of {body_part} demonstrates {}. The study provides comprehensive diagnostic information with {confidence:.1}% confidence level. {}. The examination adequately addresses the clinical questions and provides sufficient diagnostic information for clinical decision-making.",
        if has_findings {
            "findings consistent with the identified pathological processes requiring clinical correlation and appropriate follow-up management"
        } else {
            "normal anatomical structures with no acute abnormalities detected"
        },
        if has_findings {
            "Identified abnormalities warrant clinical correlation with patient symptoms and consideration of appropriate therapeutic interventions"
        } else {
            "Overall radiological appearance is within normal limits for the patients age and demographic profile with no findings requiring immediate intervention"
        },
    );

    let recommendations = format!(
        "Clinical correlation with comprehensive patient history, physical examination findings, and laboratory results is strongly recommended to establish appropriate diagnostic considerations and therapeutic planning. Follow-up imaging protocols should be determined based on clinical presentation, symptom progression, and response to therapeutic interventions. {}. Patient counseling regarding findings and appropriate follow-up care should be provided in accordance with established clinical guidelines and institutional protocols.",
        if has_findings {
            "Specialist consultation may be warranted for further evaluation and management of identified abnormalities"
        } else {
            "Routine follow-up imaging may be considered based on clinical indication and ongoing symptom assessment"
        },
    );

    RadiologistReport {
        clinical_indication: format!(
            "Diagnostic {modality} imaging of {body_part} was requested for clinical evaluation and assessment of anatomical structures."
        ),
        technique: format!(
            "Standard {modality} imaging protocol was employed for comprehensive evaluation of the {body_part} region using appropriate technical parameters and positioning for optimal diagnostic visualization."
        ),
        detailed_findings,
        impression,
        recommendations,
        critical_findings: "No critical or urgent findings requiring immediate clinical attention identified on this examination.".to_string(),
        full_report: "This is an enhanced automated radiological report generated using advanced medical imaging analysis.".to_string(),
        enhanced: false,
    }
}

/// Generate a report with the preferred report backend. Any failure, including
/// a missing provider, yields [`fallback_report`].
pub async fn generate_report(router: &LlmRouter, result: &AnalysisResult) -> RadiologistReport {
    let req = LlmRequest {
        max_tokens: Some(8192),
        temperature: Some(0.3),
        ..LlmRequest::prompt(report_prompt(result))
    };

    match router.route(LlmTask::Report, req).await {
        Ok(resp) if !resp.content.trim().is_empty() => {
            tracing::debug!(chars = resp.content.len(), "Radiologist report received");
            parse_report(&resp.content)
        }
        Ok(_) => {
            tracing::warn!("Empty report reply, using template");
            fallback_report(result)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Report generation failed, using template");
            fallback_report(result)
        }
    }
}

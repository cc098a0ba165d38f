//! Combined analysis of several studies, used for the downloadable AI report.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use radscope_common::{AnalysisResult, BodyPart};
use serde::{Deserialize, Serialize};

use crate::backend::LlmRequest;
use crate::router::{LlmRouter, LlmTask};

const MODEL_CONFIDENCE: f64 = 0.85;
const FALLBACK_CONFIDENCE: f64 = 0.75;
const DEFAULT_SUMMARY: &str = "Comprehensive medical analysis completed with detailed findings and recommendations.";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchAnalysis {
    pub summary: String,
    pub clinical_insights: Vec<String>,
    pub differential_diagnosis: Vec<String>,
    pub recommendations: Vec<String>,
    pub risk_assessment: String,
    pub follow_up_plan: String,
    pub ai_confidence: f64,
    pub files_analyzed: usize,
}

/// Count occurrences, keeping first-seen order.
fn count_in_order<'a>(items: impl IntoIterator<Item = &'a String>) -> Vec<(&'a str, usize)> {
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for item in items {
        match counts.iter_mut().find(|(k, _)| *k == item.as_str()) {
            Some((_, n)) => *n += 1,
            None => counts.push((item.as_str(), 1)),
        }
    }
    counts
}

/// Plain-text digest of all results, grouped by body part in first-seen order.
pub fn prepare_summary(results: &[AnalysisResult]) -> String {
    let mut groups: Vec<(BodyPart, Vec<&AnalysisResult>)> = Vec::new();
    for r in results {
        match groups.iter_mut().find(|(part, _)| *part == r.body_part) {
            Some((_, members)) => members.push(r),
            None => groups.push((r.body_part, vec![r])),
        }
    }

    let mut lines = vec![format!("Total DICOM files analyzed: {}", results.len())];
    for (part, members) in &groups {
        lines.push(format!("\n{} ANALYSIS ({} files):", part.as_str().to_uppercase(), members.len()));

        let modalities: BTreeSet<&str> = members
            .iter()
            .map(|r| r.modality.as_deref().unwrap_or("unknown"))
            .collect();
        let avg = members.iter().map(|r| r.confidence).sum::<f64>() / members.len() as f64;
        lines.push(format!("  - Modality: {}", modalities.into_iter().collect::<Vec<_>>().join(", ")));
        lines.push(format!("  - Average confidence: {avg:.2}"));

        let pathologies = count_in_order(members.iter().flat_map(|r| &r.pathologies));
        if !pathologies.is_empty() {
            lines.push("  - Pathologies detected:".to_string());
            lines.extend(pathologies.iter().map(|(p, n)| format!("    * {p} ({n} files)")));
        }
        let landmarks = count_in_order(members.iter().flat_map(|r| &r.anatomical_landmarks));
        if !landmarks.is_empty() {
            lines.push("  - Anatomical landmarks:".to_string());
            lines.extend(landmarks.iter().map(|(l, n)| format!("    * {l} ({n} files)")));
        }
    }
    lines.join("\n")
}

pub fn batch_prompt(summary: &str, now: DateTime<Utc>) -> String {
    let date = now.format("%Y-%m-%d %H:%M");
    let modality = summary
        .split_once("Modality:")
        .and_then(|(_, rest)| rest.lines().next())
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("Multiple modalities");

    format!(
        r#"You are Dr. AI Radiologist, an expert medical AI specialist with extensive experience in radiological interpretation and clinical diagnosis. You are writing a comprehensive medical report for a healthcare professional.

ANALYSIS DATA:
{summary}

Please provide a detailed, professional medical report in the following format:

**MEDICAL IMAGING ANALYSIS REPORT**

**PATIENT INFORMATION:**
- Study Type: DICOM Medical Imaging Analysis
- Modality: {modality}
- Date of Analysis: {date}

**EXECUTIVE SUMMARY:**
Provide a 3-4 sentence comprehensive overview of the imaging findings, clinical significance, and overall assessment.

**DETAILED FINDINGS:**

1. **ANATOMICAL ASSESSMENT:**
   - Detailed description of anatomical structures identified
   - Normal vs. abnormal findings
   - Specific anatomical landmarks and their clinical relevance

2. **PATHOLOGICAL ANALYSIS:**
   - Comprehensive list of detected pathologies
   - Severity assessment for each finding
   - Clinical correlation and significance

3. **IMAGE QUALITY ASSESSMENT:**
   - Technical quality of the imaging
   - Artifacts or limitations identified
   - Recommendations for image optimization

**CLINICAL INTERPRETATION:**

1. **PRIMARY DIAGNOSIS:**
   - Most likely diagnosis based on findings
   - Confidence level and supporting evidence

2. **DIFFERENTIAL DIAGNOSIS:**
   - Alternative diagnostic possibilities (list 3-5)
   - Clinical reasoning for each differential
   - Probability assessment for each

3. **CLINICAL CORRELATION:**
   - How findings relate to patient symptoms
   - Clinical significance of each finding
   - Impact on patient management

**TREATMENT RECOMMENDATIONS:**

1. **IMMEDIATE ACTIONS:**
   - Urgent interventions if needed
   - Immediate clinical decisions required

2. **SPECIALIST CONSULTATIONS:**
   - Required specialist referrals
   - Specific expertise needed

3. **FURTHER DIAGNOSTIC WORKUP:**
   - Additional imaging studies recommended
   - Laboratory tests if indicated
   - Other diagnostic procedures

**RISK ASSESSMENT:**
- Overall risk level: [Low/Moderate/High]
- Specific risk factors identified
- Urgency of clinical attention
- Prognostic implications

**FOLLOW-UP PLAN:**
- Recommended timeline for follow-up imaging
- Specific monitoring requirements
- Patient education and counseling points
- Long-term management considerations

**CLINICAL IMPRESSION:**
Provide a final clinical impression summarizing the key findings, their significance, and the recommended course of action.

**REPORT PREPARED BY:**
Dr. AI Radiologist
Medical AI Specialist
Date: {date}

Please write this report in a professional medical tone, as if written by an experienced radiologist for clinical use. Be thorough, evidence-based, and clinically actionable.

IMPORTANT: Please structure your response with clear section headers and bullet points for easy parsing. Use the exact section names provided above.
"#
    )
}

// ── Reply parsing ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Part {
    Summary,
    Insights,
    Differential,
    Recommendations,
    Risk,
    FollowUp,
}

fn header_of(upper: &str) -> Option<Part> {
    let has = |needles: &[&str]| needles.iter().any(|n| upper.contains(n));
    if has(&["EXECUTIVE SUMMARY", "CLINICAL SUMMARY"]) {
        Some(Part::Summary)
    } else if has(&["CLINICAL INSIGHTS", "DETAILED FINDINGS"]) {
        Some(Part::Insights)
    } else if has(&["DIFFERENTIAL DIAGNOSIS"]) {
        Some(Part::Differential)
    } else if has(&["RECOMMENDATIONS"]) {
        Some(Part::Recommendations)
    } else if has(&["RISK ASSESSMENT"]) {
        Some(Part::Risk)
    } else if has(&["FOLLOW-UP PLAN"]) {
        Some(Part::FollowUp)
    } else {
        None
    }
}

fn strip_bullet(line: &str) -> &str {
    let mut chars = line.chars();
    match chars.next() {
        Some('-' | '*' | '•') => chars.as_str().trim(),
        _ => line,
    }
}

#[derive(Debug, Default)]
struct Sections {
    summary: Option<String>,
    clinical_insights: Vec<String>,
    differential_diagnosis: Vec<String>,
    recommendations: Vec<String>,
    risk_assessment: Option<String>,
    follow_up_plan: Option<String>,
}

fn counted_summary(differential: usize, recommendations: usize) -> String {
    let mut parts = Vec::new();
    if differential > 0 {
        parts.push(format!("Analysis identified {differential} potential diagnoses."));
    }
    if recommendations > 0 {
        parts.push(format!("Generated {recommendations} clinical recommendations."));
    }
    if parts.is_empty() {
        DEFAULT_SUMMARY.to_string()
    } else {
        parts.join(" ")
    }
}

/// Header-driven split. Headers are matched by substring; bullets lose their
/// marker and lines still wrapped in `**` are dropped.
fn extract_sections(text: &str) -> Sections {
    let mut collected: Vec<(Part, Vec<String>)> = Vec::new();
    let mut current: Option<(Part, Vec<String>)> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(part) = header_of(&line.to_uppercase()) {
            if let Some(done) = current.take().filter(|(_, c)| !c.is_empty()) {
                collected.push(done);
            }
            current = Some((part, Vec::new()));
        } else if let Some((_, content)) = current.as_mut() {
            content.push(strip_bullet(line).to_string());
        }
    }
    if let Some(done) = current.filter(|(_, c)| !c.is_empty()) {
        collected.push(done);
    }

    let mut s = Sections::default();
    for (part, content) in collected {
        let items: Vec<String> = content
            .into_iter()
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty() && !i.starts_with("**"))
            .collect();
        let list = || items.iter().filter(|i| i.chars().count() > 5).cloned().collect::<Vec<_>>();
        match part {
            Part::Summary => s.summary = Some(items.join(" ")),
            Part::Insights => s.clinical_insights = list(),
            Part::Differential => s.differential_diagnosis = list(),
            Part::Recommendations => s.recommendations = list(),
            Part::Risk => s.risk_assessment = Some(items.join(" ")),
            Part::FollowUp => s.follow_up_plan = Some(items.join(" ")),
        }
    }

    if s.summary.as_deref().map_or(true, |t| t.is_empty() || t == "Analysis completed") {
        s.summary = Some(counted_summary(s.differential_diagnosis.len(), s.recommendations.len()));
    }
    s
}

/// Collect lines after a start keyword until a stop keyword, keeping lines
/// longer than 20 characters.
fn collect_after(lines: &[&str], starts: &[&str], stops: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    let mut inside = false;
    for line in lines.iter().map(|l| l.trim()) {
        let upper = line.to_uppercase();
        if starts.iter().any(|s| upper.contains(s)) {
            inside = true;
            continue;
        }
        if inside && line.chars().count() > 20 {
            if stops.iter().any(|s| upper.contains(s)) {
                break;
            }
            let clean = line.replace("**", "").trim().to_string();
            if clean.chars().count() > 10 {
                out.push(clean);
            }
        }
    }
    out
}

/// Fallback for replies whose headers could not be found.
fn extract_from_raw(text: &str) -> Sections {
    let lines: Vec<&str> = text.lines().collect();
    let mut differential = collect_after(
        &lines,
        &["DIFFERENTIAL DIAGNOSIS", "DIAGNOSIS"],
        &["RECOMMENDATIONS", "RISK", "FOLLOW", "CLINICAL"],
    );
    let mut recommendations = collect_after(
        &lines,
        &["RECOMMENDATIONS", "TREATMENT"],
        &["RISK", "FOLLOW", "CLINICAL", "IMPRESSION"],
    );
    let first_line_with = |a: &str, b: &str| {
        lines.iter().find(|l| {
            let u = l.to_uppercase();
            u.contains(a) && u.contains(b)
        })
    };

    let summary = if differential.is_empty() && recommendations.is_empty() {
        DEFAULT_SUMMARY.to_string()
    } else {
        counted_summary(differential.len(), recommendations.len())
    };
    differential.truncate(5);
    recommendations.truncate(5);

    Sections {
        summary: Some(summary),
        clinical_insights: Vec::new(),
        differential_diagnosis: differential,
        recommendations,
        risk_assessment: Some(
            first_line_with("RISK", "ASSESSMENT")
                .map_or_else(|| "Moderate risk level identified.".to_string(), |l| l.to_string()),
        ),
        follow_up_plan: Some(
            first_line_with("FOLLOW", "PLAN")
                .map_or_else(|| "Follow-up imaging and clinical correlation recommended.".to_string(), |l| l.to_string()),
        ),
    }
}

pub fn parse_batch_reply(text: &str, files_analyzed: usize) -> BatchAnalysis {
    let mut s = extract_sections(text);
    let weak = s
        .summary
        .as_deref()
        .map_or(true, |t| t == "Analysis completed" || t == "Analysis completed." || t.chars().count() < 20);
    if weak {
        s = extract_from_raw(text);
    }

    BatchAnalysis {
        summary: s.summary.unwrap_or_else(|| "Analysis completed".to_string()),
        clinical_insights: s.clinical_insights,
        differential_diagnosis: s.differential_diagnosis,
        recommendations: s.recommendations,
        risk_assessment: s.risk_assessment.unwrap_or_else(|| "Moderate".to_string()),
        follow_up_plan: s.follow_up_plan.unwrap_or_else(|| "Standard follow-up recommended".to_string()),
        ai_confidence: MODEL_CONFIDENCE,
        files_analyzed,
    }
}

pub fn fallback_batch(results: &[AnalysisResult]) -> BatchAnalysis {
    let total = results.len();
    let counts = count_in_order(results.iter().flat_map(|r| &r.pathologies));

    let mut insights = vec![
        format!("Analyzed {total} DICOM files successfully"),
        format!("Detected {} different types of pathologies", counts.len()),
        "Image quality assessment completed".to_string(),
        "Anatomical landmarks identified".to_string(),
        "Modality-specific analysis performed".to_string(),
    ];
    // First maximum wins, matching first-seen order.
    let most_common = counts.iter().fold(None::<(&str, usize)>, |best, &(p, n)| match best {
        Some((_, m)) if m >= n => best,
        _ => Some((p, n)),
    });
    if let Some((p, _)) = most_common {
        insights.push(format!("Most common finding: {p}"));
    }

    BatchAnalysis {
        summary: format!(
            "Comprehensive analysis of {total} DICOM files completed with {} pathology types identified.",
            counts.len()
        ),
        clinical_insights: insights,
        differential_diagnosis: vec![
            "Clinical correlation required".to_string(),
            "Further imaging may be needed".to_string(),
            "Specialist consultation recommended".to_string(),
        ],
        recommendations: vec![
            "Review by radiologist recommended".to_string(),
            "Clinical correlation with patient history required".to_string(),
            "Consider additional imaging if clinically indicated".to_string(),
            "Follow-up imaging recommended in 3-6 months".to_string(),
            "Ensure proper documentation of findings".to_string(),
        ],
        risk_assessment: "Moderate - requires clinical correlation".to_string(),
        follow_up_plan: "Standard follow-up imaging recommended in 3-6 months with clinical correlation".to_string(),
        ai_confidence: FALLBACK_CONFIDENCE,
        files_analyzed: total,
    }
}

/// Analyse a set of results together. Never fails: without a reachable
/// provider the deterministic [`fallback_batch`] is returned.
pub async fn analyze_batch(router: &LlmRouter, results: &[AnalysisResult]) -> BatchAnalysis {
    let prompt = batch_prompt(&prepare_summary(results), Utc::now());
    let req = LlmRequest { max_tokens: Some(8192), temperature: Some(0.3), ..LlmRequest::prompt(prompt) };

    match router.route(LlmTask::Batch, req).await {
        Ok(resp) => parse_batch_reply(&resp.content, results.len()),
        Err(e) => {
            tracing::warn!(error = %e, files = results.len(), "Batch analysis failed, using template");
            fallback_batch(results)
        }
    }
}

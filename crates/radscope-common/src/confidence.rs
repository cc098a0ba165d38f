//! Confidence scoring for body-part classification and AI agreement.

use serde::{Deserialize, Serialize};

/// Where the body-part keyword was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    BodyPartExamined,
    StudyDescription,
    SeriesDescription,
    Filename,
    NoMatch,
}

impl MatchSource {
    /// Base weight for a keyword hit in this tag.
    pub fn weight(&self) -> f64 {
        match self {
            MatchSource::BodyPartExamined => 0.90,
            MatchSource::StudyDescription => 0.85,
            MatchSource::SeriesDescription => 0.80,
            MatchSource::Filename => 0.60,
            MatchSource::NoMatch => 0.30,
        }
    }
}

/// Final analysis confidence. Without any findings the result is capped at 0.5.
pub fn analysis_confidence(source: MatchSource, has_findings: bool) -> f64 {
    let base = source.weight();
    if has_findings { base } else { base.min(0.5) }
}

/// Aggregate confidence from multiple independent sources
/// using the noisy-OR model: p = 1 - Π(1 - p_i)
pub fn aggregate_confidence(confidences: &[f64]) -> f64 {
    if confidences.is_empty() {
        return 0.0;
    }
    let product: f64 = confidences
        .iter()
        .map(|&p| 1.0 - p.clamp(0.0, 1.0))
        .product();
    1.0 - product
}

/// Keyword result combined with a vision model opinion.
/// Agreement aggregates both; disagreement keeps the keyword result with a ×0.70 penalty.
pub fn reconcile_with_vision(keyword: f64, vision: f64, agrees: bool) -> f64 {
    if agrees {
        aggregate_confidence(&[keyword, vision])
    } else {
        (keyword * 0.70).min(1.0)
    }
}

//! Body-part classification by keyword matching on DICOM text tags.
//!
//! Body parts are tried in a fixed order and, for each, the tags in the order
//! BodyPartExamined, StudyDescription, SeriesDescription. The first hit wins,
//! so a study described as "THORACIC SPINE" is a spine study, not chest.

use radscope_common::confidence::MatchSource;
use radscope_common::{BodyPart, StudyMetadata};

/// Keyword table in match order.
pub const KEYWORDS: [(BodyPart, &[&str]); 8] = [
    (
        BodyPart::Spine,
        &["SPINE", "VERTEBRA", "LUMBAR", "CERVICAL", "THORACIC SPINE", "LS SPINE", "CS SPINE", "TS SPINE"],
    ),
    (BodyPart::Chest, &["CHEST", "THORAX", "LUNG", "PULMONARY"]),
    (BodyPart::Brain, &["BRAIN", "HEAD", "CRANIAL", "PITUITARY", "SELLA"]),
    (BodyPart::Breast, &["BREAST", "MAMMARY", "MAMMO"]),
    (BodyPart::Elbow, &["ELBOW", "ARM", "UPPER EXTREMITY"]),
    (BodyPart::Leg, &["LEG", "KNEE", "ANKLE", "LOWER EXTREMITY"]),
    (BodyPart::Abdomen, &["ABDOMEN", "LIVER", "PANCREAS", "GALLBLADDER", "KIDNEY", "MRCP"]),
    (BodyPart::Prostate, &["PROSTATE", "PROSTATIC", "POSTRATE"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub body_part: BodyPart,
    pub source: MatchSource,
    pub keyword: Option<&'static str>,
}

impl Classification {
    pub fn confidence(&self) -> f64 {
        self.source.weight()
    }
}

/// Classify from tags, then from the file name if `filename` is given.
pub fn classify(meta: &StudyMetadata, filename: Option<&str>) -> Classification {
    let tags = meta.text_tags();
    let sources = [
        MatchSource::BodyPartExamined,
        MatchSource::StudyDescription,
        MatchSource::SeriesDescription,
    ];

    for (part, keywords) in KEYWORDS {
        for ((_, text), source) in tags.iter().zip(sources) {
            if let Some(kw) = first_hit(text, keywords) {
                return Classification { body_part: part, source, keyword: Some(kw) };
            }
        }
    }

    if let Some(name) = filename {
        let upper = name.to_uppercase().replace(['_', '-', '.'], " ");
        for (part, keywords) in KEYWORDS {
            if let Some(kw) = first_hit(&upper, keywords) {
                return Classification { body_part: part, source: MatchSource::Filename, keyword: Some(kw) };
            }
        }
    }

    Classification { body_part: BodyPart::Unknown, source: MatchSource::NoMatch, keyword: None }
}

fn first_hit(text: &str, keywords: &[&'static str]) -> Option<&'static str> {
    if text.is_empty() {
        return None;
    }
    keywords.iter().copied().find(|kw| text.contains(kw))
}

/// Fixed anatomical landmark list per body part.
pub fn landmarks(part: BodyPart) -> Vec<String> {
    let names: &[&str] = match part {
        BodyPart::Spine => &[
            "cervical vertebrae", "thoracic vertebrae", "lumbar vertebrae",
            "intervertebral discs", "spinal canal", "nerve roots",
            "ligamentum flavum", "facet joints", "pedicles",
        ],
        BodyPart::Chest => &[
            "right upper lobe", "left upper lobe", "right lower lobe",
            "left lower lobe", "right middle lobe", "aortic arch",
            "pulmonary arteries", "cardiac silhouette", "mediastinum",
            "bilateral pleural spaces", "diaphragm", "chest wall",
            "costophrenic angles", "hilar regions", "trachea",
        ],
        BodyPart::Brain => &["brain parenchyma", "pituitary gland", "sella turcica"],
        BodyPart::Breast => &["right breast", "left breast", "axillary lymph nodes"],
        BodyPart::Elbow => &[
            "humerus", "radius", "ulna", "olecranon", "medial epicondyle", "lateral epicondyle",
        ],
        BodyPart::Leg => &["femur", "tibia", "fibula", "patella", "knee joint", "ankle joint"],
        BodyPart::Abdomen => &["liver", "gallbladder", "pancreas", "spleen", "kidneys", "aorta"],
        BodyPart::Prostate => &[
            "prostate gland", "seminal vesicles", "bladder", "rectum", "pubic symphysis", "levator ani",
        ],
        BodyPart::Unknown => &["anatomical structures"],
    };
    names.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(body: Option<&str>, study: Option<&str>, series: Option<&str>) -> StudyMetadata {
        StudyMetadata {
            body_part_examined: body.map(String::from),
            study_description: study.map(String::from),
            series_description: series.map(String::from),
            ..Default::default()
        }
    }

    #[test]
    fn test_spine_wins_over_chest() {
        let c = classify(&meta(None, Some("MRI Thoracic Spine"), None), None);
        assert_eq!(c.body_part, BodyPart::Spine);
        assert_eq!(c.source, MatchSource::StudyDescription);
    }

    #[test]
    fn test_body_part_order_beats_tag_order() {
        // chest in BodyPartExamined, but spine in the series description
        let c = classify(&meta(Some("CHEST"), None, Some("LUMBAR")), None);
        assert_eq!(c.body_part, BodyPart::Spine);
        assert_eq!(c.source, MatchSource::SeriesDescription);
        assert_eq!(c.confidence(), 0.80);
    }

    #[test]
    fn test_case_insensitive_tags() {
        let c = classify(&meta(Some("knee"), None, None), None);
        assert_eq!(c.body_part, BodyPart::Leg);
        assert_eq!(c.keyword, Some("KNEE"));
    }

    #[test]
    fn test_filename_hint_is_last_resort() {
        let m = meta(None, Some("Routine"), None);
        let c = classify(&m, Some("patient_prostate_t2.dcm"));
        assert_eq!(c.body_part, BodyPart::Prostate);
        assert_eq!(c.source, MatchSource::Filename);

        let c = classify(&m, None);
        assert_eq!(c.body_part, BodyPart::Unknown);
        assert_eq!(c.confidence(), 0.30);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let m = meta(Some("ABDOMEN"), Some("CT BRAIN"), None);
        let first = classify(&m, None);
        for _ in 0..5 {
            assert_eq!(classify(&m, None), first);
        }
        assert_eq!(first.body_part, BodyPart::Brain);
    }

    #[test]
    fn test_landmark_counts() {
        assert_eq!(landmarks(BodyPart::Spine).len(), 9);
        assert_eq!(landmarks(BodyPart::Chest).len(), 15);
        assert_eq!(landmarks(BodyPart::Brain).len(), 3);
        assert_eq!(landmarks(BodyPart::Breast).len(), 3);
        for part in [BodyPart::Elbow, BodyPart::Leg, BodyPart::Abdomen, BodyPart::Prostate] {
            assert_eq!(landmarks(part).len(), 6);
        }
        assert_eq!(landmarks(BodyPart::Unknown), vec!["anatomical structures".to_string()]);
    }
}

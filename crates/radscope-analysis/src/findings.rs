//! Detectors that run on every image regardless of body part.

use crate::edges::{blur5, edges};
use crate::glcm;
use crate::plane::Plane;

/// Inputs the general detectors need besides the pixels.
#[derive(Debug, Clone, Copy)]
pub struct FindingParams {
    pub min_lesion_area: usize,
    pub max_lesion_area: usize,
    pub pixel_spacing_mm: f64,
    /// StudyDescription mentions CONTRAST or CECT.
    pub contrast_study: bool,
}

/// All general findings in detector order.
pub fn general_findings(p: &Plane, params: &FindingParams) -> Vec<String> {
    let mut out = Vec::new();
    out.extend(lesions(p, params));
    out.extend(density_patterns(p));
    out.extend(anatomical_variations(p));
    out.extend(texture_pattern(p));
    out.extend(calcifications(p));
    if params.contrast_study {
        out.extend(contrast_enhancement(p));
    }
    out
}

pub fn is_contrast_study(study_description: Option<&str>) -> bool {
    study_description
        .map(str::to_uppercase)
        .is_some_and(|d| d.contains("CONTRAST") || d.contains("CECT"))
}

/// Edge components whose area lies strictly between the lesion bounds.
pub fn lesions(p: &Plane, params: &FindingParams) -> Vec<String> {
    let traced = edges(&blur5(p), 50.0, 150.0);
    let mut out = Vec::new();
    let mut count = 0usize;

    for c in traced.components_8() {
        if c.area <= params.min_lesion_area || c.area >= params.max_lesion_area {
            continue;
        }
        count += 1;
        let ratio = c.aspect_ratio();
        let shape = if ratio > 2.0 {
            "linear"
        } else if ratio < 0.5 {
            "elongated"
        } else {
            "round"
        };
        let size_mm = (c.area as f64).sqrt() * params.pixel_spacing_mm;
        out.push(format!("detected {shape} lesion measuring approximately {size_mm:.1}mm in diameter"));
    }

    if count > 0 {
        out.push(format!("total of {count} discrete lesions identified"));
    }
    out
}

pub fn density_patterns(p: &Plane) -> Vec<String> {
    let mut out = Vec::new();
    let mean = p.mean();
    if mean < 100.0 {
        out.push("overall decreased density pattern".to_string());
    } else if mean > 200.0 {
        out.push("overall increased density pattern".to_string());
    }

    if p.std() > 50.0 {
        out.push("heterogeneous density distribution".to_string());
    } else {
        out.push("homogeneous density pattern".to_string());
    }

    if glcm::mean_contrast(p, &[1, 2, 3]) < 0.5 {
        out.push("ground glass opacity pattern detected".to_string());
    }
    out
}

pub fn anatomical_variations(p: &Plane) -> Vec<String> {
    let mut out = Vec::new();
    let mid = p.width() / 2;
    let left = p.crop(0..p.height(), 0..mid).mean();
    let right = p.crop(0..p.height(), mid..p.width()).mean();

    let brighter = left.max(right);
    if brighter > 0.0 && (left - right).abs() / brighter > 0.3 {
        out.push(
            "complete transposition of abdominal and thoracic viscera noted (situs inversus totalis)"
                .to_string(),
        );
    }
    if right > left * 1.2 {
        out.push(
            "cardiac apex towards the right side, with the morphological left ventricle forming the cardiac apex"
                .to_string(),
        );
    }
    out
}

pub fn texture_pattern(p: &Plane) -> Option<String> {
    let t = glcm::texture(p);
    let s = if t.contrast > 0.8 {
        "high contrast texture pattern suggesting calcification or dense tissue"
    } else if t.homogeneity > 0.9 {
        "homogeneous texture pattern"
    } else if t.energy < 0.1 {
        "heterogeneous texture pattern"
    } else {
        return None;
    };
    Some(s.to_string())
}

pub fn calcifications(p: &Plane) -> Option<String> {
    let n = p.above(p.percentile(95.0)).components().len();
    (n > 0).then(|| format!("multiple calcified regions detected ({n} discrete areas)"))
}

pub fn contrast_enhancement(p: &Plane) -> Vec<String> {
    let mut out = Vec::new();
    if p.mean() > 150.0 {
        out.push("evidence of contrast enhancement".to_string());
    }
    if bright_adaptive_regions(p) > 5 {
        out.push("enhancing soft tissue lesions detected".to_string());
    }
    out
}

/// Components of the adaptive threshold `pixel > gaussian_mean(11x11) - 2`.
fn bright_adaptive_regions(p: &Plane) -> usize {
    let local = p.gaussian_local_mean(5);
    let data: Vec<bool> = p
        .data()
        .iter()
        .zip(&local)
        .map(|(&v, &m)| f64::from(v) > m - 2.0)
        .collect();
    crate::plane::Mask::new(p.width(), p.height(), data).components().len()
}

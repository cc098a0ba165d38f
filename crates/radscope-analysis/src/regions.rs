//! Body-part specific detectors. Each one looks at a fixed sub-region of the
//! image and emits a fixed sentence when its statistic crosses a threshold.

use radscope_common::BodyPart;

use crate::edges::{blur5, edge_density, edges, hough_line_count};
use crate::glcm;
use crate::plane::Plane;

/// Run the detectors for `part`. Unknown body parts have none.
pub fn region_findings(p: &Plane, part: BodyPart) -> Vec<String> {
    let found: Vec<&str> = match part {
        BodyPart::Chest => return chest(p),
        BodyPart::Brain => brain(p),
        BodyPart::Elbow => elbow(p),
        BodyPart::Leg => leg(p),
        BodyPart::Breast => breast(p),
        BodyPart::Abdomen => abdomen(p),
        BodyPart::Spine => spine(p),
        BodyPart::Prostate => prostate(p),
        BodyPart::Unknown => Vec::new(),
    };
    found.into_iter().map(String::from).collect()
}

fn when(hit: bool, sentence: &'static str) -> Option<&'static str> {
    hit.then_some(sentence)
}

fn centre_half(p: &Plane) -> Plane {
    p.frac((1, 4), (3, 4), (1, 4), (3, 4))
}

fn centre_third(p: &Plane) -> Plane {
    p.frac((1, 3), (2, 3), (1, 3), (2, 3))
}

/// Components above the `pct` percentile, opened with a 3x3 square, with
/// area strictly inside `lo..hi`.
fn opened_blobs(region: &Plane, pct: f64, lo: usize, hi: usize) -> usize {
    region
        .above(region.percentile(pct))
        .open(3)
        .components()
        .iter()
        .filter(|c| c.area > lo && c.area < hi)
        .count()
}

// ── Chest ────────────────────────────────────────────────────────────────────

fn chest(p: &Plane) -> Vec<String> {
    let (h, w) = (p.height(), p.width());
    let mut out: Vec<String> = Vec::new();

    if hough_line_count(&edges(p, 30.0, 100.0), 50) > 15 {
        out.push("prominent bronchovascular marking noted in bilateral lung fields".into());
    }
    out.push(costophrenic_angles(p).into());
    out.push(cardiothoracic_ratio(p).into());
    out.push(hila(p).into());
    out.push(trachea(p).into());

    let lower_right = p.crop(h / 2..h, w / 2..w);
    let rll = lower_right.above(lower_right.percentile(90.0)).components().len() > 2;

    let fissure = opened_blobs(&centre_half(p), 75.0, 5, 50) > 3;

    let hilar = centre_third(p);
    let nodes = hilar.below(hilar.percentile(70.0)).components().len() > 2;

    let lower_left = p.crop(h / 2..h, 0..w / 2);
    let cavity = lower_left
        .below(lower_left.percentile(30.0))
        .close(5)
        .components()
        .iter()
        .any(|c| c.area > 20 && c.area < 200);

    let fluid = |m: f64| m > 80.0 && m < 120.0;
    let effusion = fluid(p.crop(0..h, 0..w / 6).mean()) || fluid(p.crop(0..h, 5 * w / 6..w).mean());

    let t = glcm::texture(p);
    let fibrocystic = t.contrast > 0.6 && t.homogeneity < 0.7;

    out.extend(
        [
            when(rll, "well-defined, heterogeneously enhancing soft tissue lesion with spiculated margins in right lower lobe"),
            when(fissure, "multiple tiny nodules along oblique fissure and right pleura"),
            when(nodes, "well-defined hypoenhancing lymph nodes in bilateral hilar region"),
            when(cavity, "well-defined irregular cavity in left lower lobe with surrounding ground-glass opacity"),
            when(effusion, "mild pleural effusion detected"),
            when(fibrocystic, "fibrocystic areas adjacent to cavity"),
        ]
        .into_iter()
        .flatten()
        .map(String::from),
    );
    out
}

fn costophrenic_angles(p: &Plane) -> &'static str {
    let (h, w) = (p.height(), p.width());
    let rows = h.saturating_sub(50)..h;
    let left = p.crop(rows.clone(), 0..50).mean();
    let right = p.crop(rows, w.saturating_sub(50)..w).mean();

    if left < 100.0 && right < 100.0 {
        "both costophrenic angles are free"
    } else if left > 150.0 || right > 150.0 {
        "costophrenic angle blunting noted"
    } else {
        "costophrenic angles appear normal"
    }
}

fn cardiothoracic_ratio(p: &Plane) -> &'static str {
    let (h, w) = (p.height(), p.width());
    let cardiac = p.frac((1, 4), (3, 4), (1, 3), (2, 3));
    let band = p.crop((h / 2).saturating_sub(10)..h / 2 + 10, 0..w);

    let cardiac_width = cardiac.above(cardiac.percentile(70.0)).count();
    let thoracic_width = band.above(band.percentile(50.0)).count();
    if thoracic_width == 0 {
        return "cardiothoracic ratio assessment limited";
    }

    let ratio = cardiac_width as f64 / thoracic_width as f64;
    if ratio > 0.7 {
        "cardiothoracic ratio is significantly increased"
    } else if ratio > 0.6 {
        "cardiothoracic ratio is mildly increased"
    } else {
        "cardiothoracic ratio appears normal"
    }
}

fn hila(p: &Plane) -> &'static str {
    let left = p.frac((1, 4), (1, 2), (0, 1), (1, 3)).mean();
    let right = p.frac((1, 4), (1, 2), (2, 3), (1, 1)).mean();
    let diff = (left - right).abs();
    let normal = |m: f64| m > 80.0 && m < 150.0;

    if diff < 20.0 && normal(left) && normal(right) {
        "both hila appears normal"
    } else if diff > 30.0 {
        "hilar asymmetry noted"
    } else if left > 180.0 || right > 180.0 {
        "hilar prominence noted"
    } else {
        "hilar regions appear normal"
    }
}

fn trachea(p: &Plane) -> &'static str {
    let (h, w) = (p.height(), p.width());
    let region = p.crop(0..h / 3, (w / 2).saturating_sub(20)..w / 2 + 20);
    let density = region.mean();
    if region.is_empty() || !(density > 50.0 && density < 120.0) {
        return "tracheal position assessment limited";
    }

    let rw = region.width();
    let left = region.crop(0..region.height(), 0..10).mean();
    let right = region.crop(0..region.height(), rw.saturating_sub(10)..rw).mean();
    if (left - right).abs() < 15.0 {
        "trachea is at midline"
    } else {
        "tracheal deviation noted"
    }
}

// ── Other body parts ─────────────────────────────────────────────────────────

fn brain(p: &Plane) -> Vec<&'static str> {
    let half = centre_half(p);
    let third = centre_third(p);
    let mid = p.width() / 2;
    let left = p.crop(0..p.height(), 0..mid).mean();
    let right = p.crop(0..p.height(), mid..p.width()).mean();

    [
        when(half.above(half.percentile(85.0)).components().len() > 1, "focal brain lesion detected"),
        when(third.below(third.percentile(20.0)).fraction() > 0.1, "ventricular enlargement noted"),
        when(half.std() > 30.0, "white matter signal changes detected"),
        when((left - right).abs() > 20.0, "mass effect on adjacent structures"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn elbow(p: &Plane) -> Vec<&'static str> {
    let joint = centre_third(p).mean();
    let bone = centre_half(p);

    [
        when(joint > 80.0 && joint < 120.0, "joint effusion detected"),
        when(edge_density(p, 50.0, 150.0) > 0.1, "ligamentous injury noted"),
        when(bone.above(bone.percentile(80.0)).fraction() > 0.05, "bone marrow edema pattern"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn leg(p: &Plane) -> Vec<&'static str> {
    let half = centre_half(p);

    [
        when(half.above(half.percentile(85.0)).fraction() > 0.1, "muscle injury detected"),
        when(hough_line_count(&edges(p, 30.0, 100.0), 50) > 3, "tendon pathology noted"),
        when(hough_line_count(&edges(&half, 50.0, 150.0), 30) > 2, "stress fracture pattern"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn breast(p: &Plane) -> Vec<&'static str> {
    let half = centre_half(p);
    let mass = edges(&blur5(&half), 50.0, 150.0)
        .components_8()
        .iter()
        .any(|c| c.area > 50 && c.area < 500);

    [
        when(mass, "breast mass detected"),
        when(p.above(p.percentile(95.0)).components().len() > 5, "breast calcifications noted"),
        when(hough_line_count(&edges(p, 30.0, 100.0), 20) > 5, "architectural distortion"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn abdomen(p: &Plane) -> Vec<&'static str> {
    let liver = p.frac((1, 3), (2, 3), (1, 4), (3, 4));
    let bright = liver.above(liver.percentile(90.0)).components().len();
    let dark = liver.below(liver.percentile(10.0)).components().len();
    let gallbladder = p.frac((1, 3), (2, 3), (1, 6), (1, 3));
    let pancreas = p.frac((1, 2), (1, 1), (1, 3), (2, 3));

    [
        when(bright > 1 || dark > 1, "liver lesion detected"),
        when(gallbladder.std() > 25.0, "gallbladder pathology noted"),
        when(pancreas.std() > 30.0, "pancreatic changes detected"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn spine(p: &Plane) -> Vec<&'static str> {
    let posterior = p.frac((1, 3), (2, 3), (1, 2), (1, 1));
    let canal = p.frac((1, 4), (3, 4), (1, 3), (2, 3));
    let vertebrae = p.frac((1, 4), (3, 4), (0, 1), (1, 1));
    let facets = p.frac((0, 1), (1, 1), (0, 1), (1, 4));

    let row_means = vertebrae.row_means();
    let row_std = if row_means.is_empty() {
        0.0
    } else {
        let n = row_means.len() as f64;
        let m = row_means.iter().sum::<f64>() / n;
        (row_means.iter().map(|v| (v - m).powi(2)).sum::<f64>() / n).sqrt()
    };

    let joint_spaces = facets.below(facets.percentile(30.0)).count();
    let sclerosis = facets.above(facets.percentile(80.0)).count();

    [
        when(posterior.above(posterior.percentile(85.0)).components().len() > 2, "disc herniation detected"),
        when(!canal.is_empty() && canal.above(canal.percentile(50.0)).fraction() < 0.3, "spinal stenosis noted"),
        when(row_std > 25.0, "vertebral compression detected"),
        when(joint_spaces > 100 && sclerosis > 50, "facet joint arthritis"),
        when(edge_density(&posterior, 50.0, 150.0) > 0.05, "nerve root compression"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn prostate(p: &Plane) -> Vec<&'static str> {
    let gland = centre_third(p);
    let vesicles = p.frac((1, 4), (1, 2), (1, 2), (1, 1));
    let bladder = p.frac((0, 1), (1, 3), (1, 3), (2, 3));
    let nodes = p.frac((1, 4), (1, 2), (0, 1), (1, 3));
    let enlarged_nodes = nodes
        .above(nodes.percentile(75.0))
        .components()
        .iter()
        .filter(|c| c.area > 20 && c.area < 500)
        .count();

    [
        when(gland.above(gland.percentile(60.0)).fraction() > 0.4, "prostate enlargement detected"),
        when(opened_blobs(&gland, 75.0, 10, 200) > 2, "prostate nodules noted"),
        when(vesicles.std() > 25.0, "seminal vesicle involvement"),
        when(bladder.std() > 20.0, "bladder wall thickening"),
        when(enlarged_nodes > 1, "pelvic lymph node enlargement"),
    ]
    .into_iter()
    .flatten()
    .collect()
}

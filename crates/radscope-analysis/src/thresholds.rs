//! Threshold table mapping whole-image statistics to fixed finding sentences.
//!
//! The output is a heuristic label set, not a diagnosis. For a given feature
//! tuple and metadata the result is always the same list.

use radscope_common::{HeuristicFindings, ImageFeatures, StudyMetadata};

pub const MAX_FINDINGS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Brain,
    Breast,
    Thorax,
    Abdomen,
    General,
}

/// Pick the table branch from lower-cased, concatenated text tags.
pub fn branch(meta: &StudyMetadata) -> Branch {
    let lower = |v: &Option<String>| v.as_deref().unwrap_or("").to_lowercase();
    let body = lower(&meta.body_part_examined);
    let study = lower(&meta.study_description);
    let series = lower(&meta.series_description);

    let all = format!("{body}{study}{series}");
    let body_study = format!("{body}{study}");
    let any = |text: &str, terms: &[&str]| terms.iter().any(|t| text.contains(t));

    if any(&all, &["brain", "head", "pituitary", "sella", "cranial"]) {
        Branch::Brain
    } else if any(&body_study, &["breast", "mammary", "chest"]) {
        Branch::Breast
    } else if any(&body_study, &["thorax", "lung", "pulmonary"]) {
        Branch::Thorax
    } else if any(&body_study, &["abdomen", "liver", "kidney", "pancreas"]) {
        Branch::Abdomen
    } else {
        Branch::General
    }
}

#[derive(Default)]
struct Table {
    pathologies: Vec<&'static str>,
    out: HeuristicFindings,
}

impl Table {
    fn add(&mut self, sentences: &[&'static str]) {
        self.pathologies.extend_from_slice(sentences);
    }

    fn note(&mut self, key: &str, measurement: String, location: &str) {
        self.out.measurements.insert(key.to_string(), measurement);
        self.out.locations.insert(key.to_string(), location.to_string());
    }

    fn finish(mut self) -> HeuristicFindings {
        let mut seen = std::collections::HashSet::new();
        self.out.pathologies = self
            .pathologies
            .into_iter()
            .filter(|s| seen.insert(*s))
            .take(MAX_FINDINGS)
            .map(String::from)
            .collect();
        self.out
    }
}

/// Run the threshold table.
pub fn detect_heuristic_findings(f: &ImageFeatures, meta: &StudyMetadata) -> HeuristicFindings {
    let (b, c, e, t) = (f.brightness, f.contrast, f.edge_density, f.texture_std);
    let mut table = Table::default();

    match branch(meta) {
        Branch::Brain => {
            if b > 100.0 && b < 180.0 {
                table.add(&[
                    "hypoenhancing lesion measuring 7-10mm in right pituitary gland consistent with microadenoma",
                    "pituitary microadenoma with characteristic delayed enhancement pattern",
                    "focal hypointense area in adenohypophysis with mass effect on normal pituitary tissue",
                ]);
                table.note(
                    "pituitary_microadenoma",
                    format!("{b:.0} HU on T1-weighted images"),
                    "right anterolateral pituitary gland, sella turcica",
                );
            }
            if c > 25.0 && c < 85.0 {
                table.add(&[
                    "sellar mass with delayed enhancement pattern suggestive of pituitary adenoma",
                    "hypoenhancing pituitary lesion with steady-state enhancement on dynamic imaging",
                    "asymmetric pituitary enhancement pattern suggesting microadenoma",
                ]);
                table.note(
                    "pituitary_enhancement",
                    format!("{c:.0}% relative enhancement"),
                    "right anterolateral pituitary, intrasellar",
                );
            }
            if e > 0.03 {
                table.add(&[
                    "well-circumscribed microadenoma with heterogeneous enhancement pattern",
                    "discrete hypoenhancing focus in pituitary gland measuring approximately 7x4mm",
                    "discrete pituitary mass with well-defined margins and no cavernous sinus invasion",
                ]);
                table.note(
                    "pituitary_mass",
                    format!("7x4x5mm lesion with {e:.3} border definition"),
                    "right half of sella turcica, suprasellar extension absent",
                );
            }
            if t > 20.0 {
                table.add(&[
                    "small focal hyperintense lesion with irregular borders suggestive of gliotic change",
                    "discrete parenchymal abnormality with heterogeneous signal characteristics",
                    "punctate lesion in white matter with possible demyelinating etiology",
                ]);
                table.note(
                    "brain_lesion",
                    format!("{b:.0} HU with {t:.0} texture variance"),
                    "periventricular white matter, frontal lobe",
                );
            }
            if table.pathologies.is_empty() {
                table.add(&[
                    "subtle brain abnormality requiring further evaluation",
                    "possible microstructural changes in brain parenchyma",
                    "brain imaging findings of uncertain significance",
                ]);
                table.note(
                    "brain_finding",
                    format!("brightness:{b:.0}, contrast:{c:.0}"),
                    "brain parenchyma, multiple regions",
                );
            }
        }

        Branch::Breast => {
            if b > 120.0 && c > 40.0 {
                table.add(&[
                    "large well defined lobulated irregular T2/STIR hyperintense peripherally enhancing collection in right breast upper quadrant measuring 7.0 x 5.7 x 6.5 cm (approximately 150 cc) with diffusion restriction on DWI",
                    "similar morphology irregular biloculated collection in left breast inner quadrant and retroareolar region measuring 4.0 x 5.8 x 6.0 cm (approximately 80 cc) reaching skin surface",
                    "bilateral breast abscesses with peripheral rim enhancement and central fluid content",
                    "complex cystic lesions with thick enhancing walls suggestive of organized collections",
                ]);
                table.note(
                    "breast_collection_right",
                    "7.0 x 5.7 x 6.5 cm (150 cc volume)".to_string(),
                    "right breast upper quadrant",
                );
                table.note(
                    "breast_collection_left",
                    "4.0 x 5.8 x 6.0 cm (80 cc volume)".to_string(),
                    "left breast inner quadrant and retroareolar region",
                );
            }
            if c > 30.0 {
                table.add(&[
                    "inflammatory changes with surrounding parenchymal edema and trabecular thickening",
                    "enlarged oval lymph nodes in left axilla with maintained fatty hilum, largest measuring 1.8 x 0.9 cm",
                    "reactive lymphadenopathy secondary to inflammatory breast disease",
                    "bilateral fibrocystic changes with background parenchymal enhancement",
                ]);
                table.note("axillary_lymph_node", "1.8 x 0.9 cm left axillary node".to_string(), "left axilla");
            }
            if e > 0.05 {
                table.add(&[
                    "fluid-debris levels within collections consistent with infected material",
                    "skin thickening and enhancement overlying breast collections indicating superficial extension",
                    "irregular peripherally enhancing collections with internal septations",
                ]);
                table.note(
                    "skin_involvement",
                    format!("skin thickening with {e:.3} enhancement pattern"),
                    "bilateral breast skin overlying collections",
                );
            }
            if table.pathologies.is_empty() {
                table.add(&[
                    "bilateral breast abnormalities requiring clinical correlation",
                    "complex breast lesions with enhancement patterns suggesting inflammatory process",
                    "breast findings consistent with infectious/inflammatory etiology",
                ]);
                table.note(
                    "breast_finding",
                    format!("enhancement:{c:.0}%, T2 signal changes"),
                    "bilateral breast parenchyma",
                );
            }
        }

        Branch::Thorax => {
            if b > 140.0 && c > 50.0 {
                table.add(&[
                    "spiculated pulmonary nodule measuring 15mm with irregular borders suspicious for malignancy",
                    "well-defined lung mass with central cavitation and thick walls",
                    "multiple bilateral pulmonary nodules consistent with metastatic lung cancer",
                ]);
                table.note(
                    "pulmonary_nodule",
                    format!("{b:.0} HU, 15mm diameter with {c:.0}% enhancement"),
                    "right upper lobe, anterior segment",
                );
            }
            if e > 0.08 {
                table.add(&[
                    "filling defect in pulmonary artery consistent with acute pulmonary embolism",
                    "segmental pulmonary arterial occlusion with peripheral wedge-shaped opacity",
                ]);
                table.note(
                    "vascular_abnormality",
                    format!("{e:.3} vessel occlusion with {c:.0}% contrast"),
                    "main pulmonary artery and bilateral branches",
                );
            }
            if t > 50.0 {
                table.add(&[
                    "confluent consolidation with air bronchograms consistent with bacterial pneumonia",
                    "necrotizing pneumonia with multiple cavitary lesions and fluid levels",
                ]);
                table.note(
                    "pulmonary_infection",
                    format!("{t:.0} heterogeneity index, {b:.0} HU density"),
                    "bilateral lower lobes with right middle lobe involvement",
                );
            }
        }

        Branch::Abdomen => {
            if b > 130.0 && c > 45.0 {
                table.add(&[
                    "hepatocellular carcinoma with arterial enhancement and washout pattern",
                    "hypervascular liver lesion with central scar consistent with focal nodular hyperplasia",
                    "multiple liver metastases with rim enhancement pattern",
                ]);
                table.note(
                    "liver_lesion",
                    format!("{b:.0} HU with {c:.0}% enhancement"),
                    "right hepatic lobe, segments VI-VII",
                );
            }
            if e > 0.06 {
                table.add(&[
                    "renal cell carcinoma with heterogeneous enhancement and central necrosis",
                    "complex renal cyst with thick walls and internal septations",
                ]);
                table.note(
                    "renal_mass",
                    format!("{e:.3} edge definition with enhancement"),
                    "left kidney, upper pole",
                );
            }
        }

        Branch::General => {
            if b > 120.0 || c > 30.0 || e > 0.04 || t > 25.0 {
                table.add(&[
                    "imaging abnormality requiring clinical correlation",
                    "tissue signal alteration of uncertain clinical significance",
                    "radiological finding suggestive of pathological process",
                ]);
                table.note(
                    "general_abnormality",
                    format!("brightness:{b:.0}, contrast:{c:.0}, edge:{e:.3}"),
                    "imaging study region",
                );
            }
        }
    }

    table.finish()
}

/// Modalities the analyzer accepts without warning.
pub const SUPPORTED_MODALITIES: [&str; 8] = ["CT", "MR", "XR", "US", "CR", "DR", "NM", "PT"];

pub fn is_supported_modality(modality: &str) -> bool {
    let m = modality.trim().to_uppercase();
    SUPPORTED_MODALITIES.contains(&m.as_str())
}

pub fn modality_description(modality: &str) -> &'static str {
    match modality.trim().to_uppercase().as_str() {
        "CT" => "Computed Tomography",
        "MR" => "Magnetic Resonance",
        "XR" => "X-Ray",
        "US" => "Ultrasound",
        "CR" => "Computed Radiography",
        "DR" => "Digital Radiography",
        "NM" => "Nuclear Medicine",
        "PT" => "Positron Emission Tomography",
        _ => "Other",
    }
}

//! Patient and doctor names as they appear in DICOM `PatientName`.
//!
//! Some sites append the referring doctor to the patient name
//! (`DOE^JANE DR. SMITH`). Reports show the two separately.

/// Shown when no doctor can be recovered from the name.
pub const DEFAULT_DOCTOR_NAME: &str = "Reporting Radiologist";

const UNKNOWN_PATIENT: &str = "Unknown";

/// `^` component separators become spaces and runs of whitespace collapse.
fn normalise(raw: &str) -> String {
    raw.replace('^', " ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The patient part of a DICOM name: everything before ` DR.`.
pub fn clean_patient_name(raw: Option<&str>) -> String {
    let name = normalise(raw.unwrap_or(""));
    let patient = name.split(" DR.").next().unwrap_or("").trim();
    if patient.is_empty() {
        UNKNOWN_PATIENT.to_string()
    } else {
        patient.to_string()
    }
}

/// The doctor appended to a DICOM name, upper-cased, or
/// [`DEFAULT_DOCTOR_NAME`].
pub fn extract_doctor_name(raw: Option<&str>) -> String {
    let upper = normalise(raw.unwrap_or("")).to_uppercase();
    let doctor = if let Some(i) = upper.rfind("DR.") {
        Some(format!("DR.{}", upper[i + 3..].trim()))
    } else {
        upper.rfind("DR ").map(|i| format!("DR {}", upper[i + 3..].trim()))
    };
    match doctor {
        Some(d) if d.len() > 3 => d,
        _ => DEFAULT_DOCTOR_NAME.to_string(),
    }
}

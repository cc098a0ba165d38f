//! DICOM file reading and tag extraction.

use std::path::Path;

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{open_file, DefaultDicomObject};
use dicom_pixeldata::PixelDecoder;
use image::GrayImage;
use radscope_common::{PatientInfo, StudyMetadata};
use serde::Serialize;

use crate::error::{DicomError, Result};
use crate::modality::is_supported_modality;
use crate::render::stretch_to_full_range;

/// Tags that must be present for an upload to count as valid.
pub const REQUIRED_TAGS: [(&str, Tag); 3] = [
    ("Modality", tags::MODALITY),
    ("PatientName", tags::PATIENT_NAME),
    ("PatientID", tags::PATIENT_ID),
];

/// A decoded study: tags plus the first frame as full-range 8-bit grayscale.
#[derive(Debug, Clone)]
pub struct DicomStudy {
    pub metadata: StudyMetadata,
    pub image: GrayImage,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Validation {
    pub valid: bool,
    pub missing_tags: Vec<String>,
    pub modality: Option<String>,
    pub modality_supported: bool,
}

/// Open a DICOM Part-10 file, read its tags and decode the first frame.
pub fn load(path: impl AsRef<Path>) -> Result<DicomStudy> {
    let path = path.as_ref();
    let obj = open(path)?;
    let metadata = extract_metadata(&obj);

    if obj.element_opt(tags::PIXEL_DATA).ok().flatten().is_none() {
        return Err(DicomError::MissingPixelData);
    }

    let decoded = obj
        .decode_pixel_data()
        .map_err(|e| DicomError::Decode(e.to_string()))?;
    let frame = decoded
        .to_dynamic_image(0)
        .map_err(|e| DicomError::Decode(e.to_string()))?
        .to_luma8();

    let (width, height) = frame.dimensions();
    let gray = GrayImage::from_raw(width, height, frame.into_raw())
        .ok_or_else(|| DicomError::Decode("frame buffer size mismatch".to_string()))?;

    tracing::debug!(
        path = %path.display(),
        modality = metadata.modality.as_deref().unwrap_or("-"),
        width,
        height,
        "DICOM frame decoded"
    );

    Ok(DicomStudy { metadata, image: stretch_to_full_range(&gray) })
}

/// Read tags only, without touching pixel data.
pub fn read_metadata_file(path: impl AsRef<Path>) -> Result<StudyMetadata> {
    Ok(extract_metadata(&open(path.as_ref())?))
}

/// Check the required tags and the modality. Unsupported modalities are
/// reported but do not make the file invalid.
pub fn validate(path: impl AsRef<Path>) -> Result<Validation> {
    let obj = open(path.as_ref())?;

    let missing_tags: Vec<String> = REQUIRED_TAGS
        .iter()
        .filter(|(_, tag)| text(&obj, *tag).is_none())
        .map(|(name, _)| name.to_string())
        .collect();
    let modality = text(&obj, tags::MODALITY);
    let modality_supported = modality.as_deref().is_some_and(is_supported_modality);

    Ok(Validation { valid: missing_tags.is_empty(), missing_tags, modality, modality_supported })
}

fn open(path: &Path) -> Result<DefaultDicomObject> {
    open_file(path).map_err(|e| DicomError::Open(e.to_string()))
}

fn extract_metadata(obj: &DefaultDicomObject) -> StudyMetadata {
    let patient = PatientInfo {
        name: text(obj, tags::PATIENT_NAME).map(|n| person_name(&n)),
        patient_id: text(obj, tags::PATIENT_ID),
        sex: text(obj, tags::PATIENT_SEX),
        age: text(obj, tags::PATIENT_AGE),
        birth_date: text(obj, tags::PATIENT_BIRTH_DATE),
        study_date: text(obj, tags::STUDY_DATE),
    };

    let pixel_spacing = floats(obj, tags::PIXEL_SPACING)
        .filter(|v| v.len() >= 2)
        .map(|v| [v[0], v[1]]);

    StudyMetadata {
        patient,
        modality: text(obj, tags::MODALITY).map(|m| m.to_uppercase()),
        study_description: text(obj, tags::STUDY_DESCRIPTION),
        series_description: text(obj, tags::SERIES_DESCRIPTION),
        body_part_examined: text(obj, tags::BODY_PART_EXAMINED),
        institution_name: text(obj, tags::INSTITUTION_NAME),
        referring_physician: text(obj, tags::REFERRING_PHYSICIAN_NAME).map(|n| person_name(&n)),
        manufacturer: text(obj, tags::MANUFACTURER),
        accession_number: text(obj, tags::ACCESSION_NUMBER),
        study_time: text(obj, tags::STUDY_TIME),
        study_instance_uid: text(obj, tags::STUDY_INSTANCE_UID),
        series_instance_uid: text(obj, tags::SERIES_INSTANCE_UID),
        sop_instance_uid: text(obj, tags::SOP_INSTANCE_UID),
        rows: int(obj, tags::ROWS),
        columns: int(obj, tags::COLUMNS),
        pixel_spacing,
        slice_thickness: floats(obj, tags::SLICE_THICKNESS).and_then(|v| v.first().copied()),
        window_center: floats(obj, tags::WINDOW_CENTER).and_then(|v| v.first().copied()),
        window_width: floats(obj, tags::WINDOW_WIDTH).and_then(|v| v.first().copied()),
    }
}

// ── Tag helpers ───────────────────────────────────────────────────────────────

fn text(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    obj.element_opt(tag)
        .ok()
        .flatten()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim_matches(|c: char| c.is_whitespace() || c == '\0').to_string())
        .filter(|s| !s.is_empty())
}

fn int(obj: &DefaultDicomObject, tag: Tag) -> Option<u32> {
    obj.element_opt(tag).ok().flatten().and_then(|e| e.to_int::<u32>().ok())
}

fn floats(obj: &DefaultDicomObject, tag: Tag) -> Option<Vec<f64>> {
    obj.element_opt(tag)
        .ok()
        .flatten()
        .and_then(|e| e.to_multi_float64().ok())
        .filter(|v| !v.is_empty())
}

/// `DOE^JANE^^DR` -> `DOE JANE DR`
fn person_name(raw: &str) -> String {
    raw.split('^')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_core::{DataElement, PrimitiveValue, VR};
    use dicom_dictionary_std::uids;
    use dicom_object::{FileMetaTableBuilder, InMemDicomObject};

    fn write_study(dir: &Path, with_patient: bool, pixels: Option<Vec<u8>>) -> std::path::PathBuf {
        let mut obj = InMemDicomObject::new_empty();
        obj.put(DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("ct")));
        obj.put(DataElement::new(tags::STUDY_DESCRIPTION, VR::LO, PrimitiveValue::from("CHEST WITH CONTRAST")));
        obj.put(DataElement::new(tags::PIXEL_SPACING, VR::DS, PrimitiveValue::Strs(vec!["0.7".to_string(), "0.7".to_string()].into())));
        obj.put(DataElement::new(tags::SLICE_THICKNESS, VR::DS, PrimitiveValue::from("5")));
        if with_patient {
            obj.put(DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("DOE^JANE")));
            obj.put(DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("P-001")));
        }
        if let Some(px) = pixels {
            obj.put(DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(4_u16)));
            obj.put(DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(4_u16)));
            obj.put(DataElement::new(tags::SAMPLES_PER_PIXEL, VR::US, PrimitiveValue::from(1_u16)));
            obj.put(DataElement::new(tags::PHOTOMETRIC_INTERPRETATION, VR::CS, PrimitiveValue::from("MONOCHROME2")));
            obj.put(DataElement::new(tags::BITS_ALLOCATED, VR::US, PrimitiveValue::from(8_u16)));
            obj.put(DataElement::new(tags::BITS_STORED, VR::US, PrimitiveValue::from(8_u16)));
            obj.put(DataElement::new(tags::HIGH_BIT, VR::US, PrimitiveValue::from(7_u16)));
            obj.put(DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)));
            obj.put(DataElement::new(tags::PIXEL_DATA, VR::OB, PrimitiveValue::U8(px.into())));
        }

        let file = obj
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(uids::EXPLICIT_VR_LITTLE_ENDIAN)
                    .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid("1.2.826.0.1.3680043.2.1125.1"),
            )
            .unwrap();
        let path = dir.join("study.dcm");
        file.write_to_file(&path).unwrap();
        path
    }

    #[test]
    fn test_metadata_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_study(dir.path(), true, None);

        let meta = read_metadata_file(&path).unwrap();
        assert_eq!(meta.modality.as_deref(), Some("CT"));
        assert_eq!(meta.patient.name.as_deref(), Some("DOE JANE"));
        assert_eq!(meta.patient.patient_id.as_deref(), Some("P-001"));
        assert_eq!(meta.pixel_spacing, Some([0.7, 0.7]));
        assert_eq!(meta.slice_thickness, Some(5.0));
        assert!(meta.body_part_examined.is_none());
    }

    #[test]
    fn test_validate_reports_missing_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_study(dir.path(), false, None);

        let v = validate(&path).unwrap();
        assert!(!v.valid);
        assert_eq!(v.missing_tags, vec!["PatientName".to_string(), "PatientID".to_string()]);
        assert!(v.modality_supported);
    }

    #[test]
    fn test_load_without_pixel_data_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_study(dir.path(), true, None);
        assert!(matches!(load(&path), Err(DicomError::MissingPixelData)));
    }

    #[test]
    fn test_load_decodes_and_stretches_first_frame() {
        let dir = tempfile::tempdir().unwrap();
        let pixels: Vec<u8> = (0..16).map(|i| 100 + i as u8).collect();
        let path = write_study(dir.path(), true, Some(pixels));

        let study = load(&path).unwrap();
        assert_eq!(study.image.dimensions(), (4, 4));
        let raw = study.image.as_raw();
        assert_eq!(*raw.iter().min().unwrap(), 0);
        assert_eq!(*raw.iter().max().unwrap(), 255);
    }

    #[test]
    fn test_non_dicom_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.dcm");
        std::fs::write(&path, b"definitely not dicom").unwrap();
        assert!(matches!(validate(&path), Err(DicomError::Open(_))));
    }

    #[test]
    fn test_person_name_components() {
        assert_eq!(person_name("DOE^JANE^^DR"), "DOE JANE DR");
        assert_eq!(person_name("SMITH"), "SMITH");
    }
}

//! Vision second opinion: send the rendered image to a multimodal model and
//! parse the JSON it returns.

use radscope_common::{StudyMetadata, VisionAssessment};

use crate::backend::{LlmError, LlmRequest, Message};
use crate::router::{LlmRouter, LlmTask};

const SYSTEM_PROMPT: &str = r#"You are an expert medical imaging AI assistant specializing in DICOM image analysis.
Your task is to accurately identify and analyze medical images with the following requirements:

1. **Body Part Identification**: Precisely identify the anatomical body part(s) shown in the image
2. **Anatomical Landmarks**: Identify key anatomical structures and landmarks visible
3. **Pathology Detection**: Look for any visible pathologies, abnormalities, or concerning findings
4. **Image Quality Assessment**: Evaluate image quality, positioning, and technical factors
5. **Clinical Context**: Provide clinical insights based on the imaging modality and findings

IMPORTANT: Be extremely accurate in body part identification. Common body parts include:
- Head/Brain, Neck, Chest, Abdomen, Pelvis, Spine, Extremities (arms/legs)
- Specific regions: Thorax, Lumbar spine, Cervical spine, etc.

Provide your analysis in the following JSON format:
{
    "body_part": "specific anatomical region",
    "confidence": 0.95,
    "anatomical_landmarks": ["landmark1", "landmark2"],
    "pathologies": ["pathology1", "pathology2"],
    "image_quality": "assessment",
    "clinical_insights": "insights",
    "recommendations": ["rec1", "rec2"]
}"#;

fn user_prompt(meta: &StudyMetadata, size: [u32; 2]) -> String {
    let tag = |v: &Option<String>| v.clone().unwrap_or_else(|| "Unknown".to_string());
    format!(
        "Analyze this medical image with the following DICOM metadata:\n\n\
         Modality: {}\n\
         Body Part Examined: {}\n\
         Study Description: {}\n\
         Series Description: {}\n\
         Image Size: {}x{}\n\n\
         Please provide a comprehensive analysis focusing on accurate body part identification and any clinical findings.",
        tag(&meta.modality),
        tag(&meta.body_part_examined),
        tag(&meta.study_description),
        tag(&meta.series_description),
        size[0],
        size[1],
    )
}

pub fn vision_request(meta: &StudyMetadata, size: [u32; 2], mime: &str, image_base64: &str) -> LlmRequest {
    LlmRequest {
        messages: vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(user_prompt(meta, size)).with_image(mime, image_base64),
        ],
        model: None,
        max_tokens: Some(1000),
        temperature: Some(0.1),
    }
}

/// Parse a vision reply. Never fails: anything that is not a JSON object
/// between the first `{` and the last `}` becomes an `Unknown` assessment
/// carrying the raw text.
pub fn parse_vision_reply(content: &str, model: &str) -> VisionAssessment {
    let parsed = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => {
            serde_json::from_str::<VisionAssessment>(&content[start..=end]).ok()
        }
        _ => None,
    };

    let mut assessment = parsed.unwrap_or_else(|| {
        tracing::warn!("Could not parse JSON from vision reply, using fallback");
        VisionAssessment {
            body_part: "Unknown".to_string(),
            confidence: 0.0,
            image_quality: "Unable to assess".to_string(),
            clinical_insights: content.to_string(),
            ..Default::default()
        }
    });
    assessment.confidence = assessment.confidence.clamp(0.0, 1.0);
    assessment.model = model.to_string();
    assessment
}

/// Ask the vision backend for its opinion on one rendered image.
pub async fn assess_image(
    router: &LlmRouter,
    meta: &StudyMetadata,
    size: [u32; 2],
    mime: &str,
    image_base64: &str,
) -> Result<VisionAssessment, LlmError> {
    let req = vision_request(meta, size, mime, image_base64);
    let resp = router.route(LlmTask::Vision, req).await?;
    Ok(parse_vision_reply(&resp.content, &resp.model))
}

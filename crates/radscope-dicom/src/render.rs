//! Grayscale post-processing and JPEG encoding for vision models.

use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GrayImage, Luma};

use crate::error::{DicomError, Result};

pub const VISION_MIME: &str = "image/jpeg";
const VISION_MAX_SIDE: u32 = 1024;
const VISION_JPEG_QUALITY: u8 = 85;

/// Min-max stretch to 0..=255. A flat image becomes all zeros.
pub fn stretch_to_full_range(img: &GrayImage) -> GrayImage {
    let (min, max) = img
        .pixels()
        .fold((u8::MAX, u8::MIN), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));

    if max <= min {
        return GrayImage::new(img.width(), img.height());
    }

    let range = f32::from(max - min);
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = f32::from(img.get_pixel(x, y)[0] - min);
        Luma([(v / range * 255.0).round() as u8])
    })
}

/// Clip to `[center - width/2, center + width/2]` and rescale to 0..=255.
/// Center and width are in display units of the 8-bit image.
pub fn apply_window(img: &GrayImage, center: f64, width: f64) -> GrayImage {
    let width = width.max(1.0);
    let lo = center - width / 2.0;
    let hi = center + width / 2.0;

    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        let v = f64::from(img.get_pixel(x, y)[0]).clamp(lo, hi);
        Luma([((v - lo) / (hi - lo) * 255.0).round() as u8])
    })
}

/// RGB JPEG (quality 85) no larger than 1024 px on either side, base64 encoded.
pub fn encode_for_vision(img: &GrayImage) -> Result<String> {
    let mut dynamic = DynamicImage::ImageLuma8(img.clone());
    if dynamic.width() > VISION_MAX_SIDE || dynamic.height() > VISION_MAX_SIDE {
        dynamic = dynamic.thumbnail(VISION_MAX_SIDE, VISION_MAX_SIDE);
    }
    let rgb = dynamic.to_rgb8();

    let mut buf: Vec<u8> = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, VISION_JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| DicomError::Encode(e.to_string()))?;

    Ok(base64::engine::general_purpose::STANDARD.encode(&buf))
}

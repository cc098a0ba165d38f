use radscope_common::ImageFeatures;

use crate::edges::edge_density;
use crate::plane::Plane;

/// Whole-image statistics used by the threshold table.
pub fn image_features(p: &Plane, edge_low: f32, edge_high: f32) -> ImageFeatures {
    ImageFeatures {
        brightness: p.mean(),
        contrast: p.std(),
        edge_density: edge_density(p, edge_low, edge_high),
        texture_std: texture_std(p),
    }
}

/// Standard deviation of `pixel - mean(3x3 neighbourhood)`.
pub fn texture_std(p: &Plane) -> f64 {
    if p.is_empty() {
        return 0.0;
    }
    let local = p.local_mean(1);
    let residuals: Vec<f64> = p
        .data()
        .iter()
        .zip(&local)
        .map(|(&v, &m)| f64::from(v) - m)
        .collect();

    let n = residuals.len() as f64;
    let mean = residuals.iter().sum::<f64>() / n;
    (residuals.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_image_features() {
        let p = Plane::new(10, 10, vec![50; 100]);
        let f = image_features(&p, 50.0, 150.0);
        assert_eq!(f.brightness, 50.0);
        assert_eq!(f.contrast, 0.0);
        assert_eq!(f.edge_density, 0.0);
        assert_eq!(f.texture_std, 0.0);
    }

    #[test]
    fn test_noise_has_more_texture_than_gradient() {
        let noise = Plane::from_fn(32, 32, |x, y| if (x * 7 + y * 13) % 3 == 0 { 220 } else { 30 });
        let ramp = Plane::from_fn(32, 32, |x, _| (x * 8) as u8);
        assert!(texture_std(&noise) > texture_std(&ramp));
    }
}

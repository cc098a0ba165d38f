//! Grey-level co-occurrence matrix texture properties.

use crate::plane::Plane;

pub const LEVELS: usize = 8;

/// Angles in radians, 0, 45, 90 and 135 degrees.
pub const ANGLES: [f64; 4] = [
    0.0,
    std::f64::consts::FRAC_PI_4,
    std::f64::consts::FRAC_PI_2,
    3.0 * std::f64::consts::FRAC_PI_4,
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureProps {
    pub contrast: f64,
    pub homogeneity: f64,
    /// Square root of the angular second moment.
    pub energy: f64,
}

/// Symmetric, normalised co-occurrence matrix at one offset.
#[derive(Debug, Clone)]
pub struct Glcm {
    p: [[f64; LEVELS]; LEVELS],
}

impl Glcm {
    pub fn compute(plane: &Plane, distance: usize, angle: f64) -> Self {
        let (w, h) = (plane.width() as isize, plane.height() as isize);
        let dr = (angle.sin() * distance as f64).round() as isize;
        let dc = (angle.cos() * distance as f64).round() as isize;

        let mut counts = [[0u64; LEVELS]; LEVELS];
        for r in 0..h {
            for c in 0..w {
                let (r2, c2) = (r + dr, c + dc);
                if r2 < 0 || c2 < 0 || r2 >= h || c2 >= w {
                    continue;
                }
                let i = quantize(plane.get(c as usize, r as usize));
                let j = quantize(plane.get(c2 as usize, r2 as usize));
                counts[i][j] += 1;
                counts[j][i] += 1;
            }
        }

        let total: u64 = counts.iter().flatten().sum();
        let mut p = [[0.0; LEVELS]; LEVELS];
        if total > 0 {
            for i in 0..LEVELS {
                for j in 0..LEVELS {
                    p[i][j] = counts[i][j] as f64 / total as f64;
                }
            }
        }
        Self { p }
    }

    pub fn props(&self) -> TextureProps {
        let mut contrast = 0.0;
        let mut homogeneity = 0.0;
        let mut asm = 0.0;
        for i in 0..LEVELS {
            for j in 0..LEVELS {
                let v = self.p[i][j];
                let d = (i as f64 - j as f64).powi(2);
                contrast += v * d;
                homogeneity += v / (1.0 + d);
                asm += v * v;
            }
        }
        TextureProps { contrast, homogeneity, energy: asm.sqrt() }
    }
}

/// `floor(v / 255 * 7)`
fn quantize(v: u8) -> usize {
    (f64::from(v) / 255.0 * (LEVELS - 1) as f64) as usize
}

/// Properties at distance 1, angle 0.
pub fn texture(plane: &Plane) -> TextureProps {
    Glcm::compute(plane, 1, 0.0).props()
}

/// Mean GLCM contrast over the given distances and the four standard angles.
pub fn mean_contrast(plane: &Plane, distances: &[usize]) -> f64 {
    let mut sum = 0.0;
    let mut n = 0usize;
    for &d in distances {
        for &a in &ANGLES {
            sum += Glcm::compute(plane, d, a).props().contrast;
            n += 1;
        }
    }
    if n == 0 { 0.0 } else { sum / n as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_plane_is_perfectly_homogeneous() {
        let p = Plane::new(8, 8, vec![200; 64]);
        let t = texture(&p);
        assert_eq!(t.contrast, 0.0);
        assert!((t.homogeneity - 1.0).abs() < 1e-12);
        assert!((t.energy - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_checkerboard_has_high_contrast() {
        let p = Plane::from_fn(8, 8, |x, y| if (x + y) % 2 == 0 { 0 } else { 255 });
        let t = texture(&p);
        // every horizontal pair is (0, 7)
        assert!((t.contrast - 49.0).abs() < 1e-9);
        assert!(t.homogeneity < 0.05);
    }

    #[test]
    fn test_quantization_levels() {
        assert_eq!(quantize(0), 0);
        assert_eq!(quantize(36), 0);
        assert_eq!(quantize(37), 1);
        assert_eq!(quantize(255), 7);
    }

    #[test]
    fn test_mean_contrast_flat() {
        let p = Plane::new(6, 6, vec![10; 36]);
        assert_eq!(mean_contrast(&p, &[1, 2, 3]), 0.0);
    }
}

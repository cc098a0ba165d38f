//! Edge maps and straight-line counting.

use crate::plane::{Mask, Plane};

/// Separable 3x3 Gaussian (1-2-1), borders replicated.
pub fn blur3(p: &Plane) -> Plane {
    convolve_separable(p, &[1, 2, 1], 4)
}

/// Separable 5x5 Gaussian (1-4-6-4-1), borders replicated.
pub fn blur5(p: &Plane) -> Plane {
    convolve_separable(p, &[1, 4, 6, 4, 1], 16)
}

fn convolve_separable(p: &Plane, kernel: &[u32], norm: u32) -> Plane {
    let (w, h) = (p.width(), p.height());
    if w == 0 || h == 0 {
        return p.clone();
    }
    let r = (kernel.len() / 2) as isize;
    let clamp = |v: isize, max: usize| v.clamp(0, max as isize - 1) as usize;

    let mut horiz = vec![0u32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for (i, k) in kernel.iter().enumerate() {
                acc += k * u32::from(p.get(clamp(x as isize + i as isize - r, w), y));
            }
            horiz[y * w + x] = acc;
        }
    }

    let mut data = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0u32;
            for (i, k) in kernel.iter().enumerate() {
                acc += k * horiz[clamp(y as isize + i as isize - r, h) * w + x];
            }
            data.push(((acc + norm * norm / 2) / (norm * norm)).min(255) as u8);
        }
    }
    Plane::new(w, h, data)
}

/// L1 Sobel gradient magnitude. Border pixels are zero.
pub fn sobel_magnitude(p: &Plane) -> Vec<f32> {
    let (w, h) = (p.width(), p.height());
    let mut out = vec![0.0f32; w * h];
    if w < 3 || h < 3 {
        return out;
    }
    let px = |x: usize, y: usize| f32::from(p.get(x, y));
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let gx = (px(x + 1, y - 1) + 2.0 * px(x + 1, y) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x - 1, y) + px(x - 1, y + 1));
            let gy = (px(x - 1, y + 1) + 2.0 * px(x, y + 1) + px(x + 1, y + 1))
                - (px(x - 1, y - 1) + 2.0 * px(x, y - 1) + px(x + 1, y - 1));
            out[y * w + x] = gx.abs() + gy.abs();
        }
    }
    out
}

/// Edge map: 3x3 Gaussian, Sobel magnitude, then hysteresis. Pixels at or
/// above `high` seed edges; pixels above `low` join when 8-connected to a seed.
pub fn edges(p: &Plane, low: f32, high: f32) -> Mask {
    let (w, h) = (p.width(), p.height());
    let mag = sobel_magnitude(&blur3(p));

    let mut out = vec![false; w * h];
    let mut stack: Vec<usize> = Vec::new();
    for (i, &m) in mag.iter().enumerate() {
        if m >= high {
            out[i] = true;
            stack.push(i);
        }
    }

    while let Some(i) = stack.pop() {
        let (x, y) = ((i % w) as isize, (i / w) as isize);
        for dy in -1..=1isize {
            for dx in -1..=1isize {
                let (nx, ny) = (x + dx, y + dy);
                if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                    continue;
                }
                let n = ny as usize * w + nx as usize;
                if !out[n] && mag[n] > low {
                    out[n] = true;
                    stack.push(n);
                }
            }
        }
    }
    Mask::new(w, h, out)
}

/// Fraction of edge pixels in [0, 1].
pub fn edge_density(p: &Plane, low: f32, high: f32) -> f64 {
    edges(p, low, high).fraction()
}

/// Number of straight lines in an edge mask: Hough accumulator with 1 px
/// and 1 degree resolution, counting local maxima with at least `threshold` votes.
pub fn hough_line_count(edges: &Mask, threshold: u32) -> usize {
    let (w, h) = (edges.width(), edges.height());
    if w == 0 || h == 0 {
        return 0;
    }
    const THETAS: usize = 180;
    let max_rho = ((w * w + h * h) as f64).sqrt().ceil() as isize;
    let rhos = (2 * max_rho + 1) as usize;

    let trig: Vec<(f64, f64)> = (0..THETAS)
        .map(|t| {
            let a = (t as f64).to_radians();
            (a.cos(), a.sin())
        })
        .collect();

    let mut acc = vec![0u32; THETAS * rhos];
    for y in 0..h {
        for x in 0..w {
            if !edges.get(x, y) {
                continue;
            }
            for (t, &(c, s)) in trig.iter().enumerate() {
                let rho = (x as f64 * c + y as f64 * s).round() as isize + max_rho;
                acc[t * rhos + rho as usize] += 1;
            }
        }
    }

    let at = |t: isize, r: isize| -> u32 {
        if t < 0 || r < 0 || t >= THETAS as isize || r >= rhos as isize {
            0
        } else {
            acc[t as usize * rhos + r as usize]
        }
    };

    let mut lines = 0;
    for t in 0..THETAS as isize {
        for r in 0..rhos as isize {
            let v = at(t, r);
            if v >= threshold
                && v > at(t, r - 1)
                && v >= at(t, r + 1)
                && v > at(t - 1, r)
                && v >= at(t + 1, r)
            {
                lines += 1;
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(w: usize, h: usize) -> Plane {
        Plane::from_fn(w, h, |x, _| if x < w / 2 { 20 } else { 220 })
    }

    #[test]
    fn test_flat_plane_has_no_edges() {
        let p = Plane::new(16, 16, vec![128; 256]);
        assert_eq!(edge_density(&p, 50.0, 150.0), 0.0);
    }

    #[test]
    fn test_step_edge_is_a_vertical_band() {
        let m = edges(&step(32, 32), 50.0, 150.0);
        assert!(m.get(15, 10) || m.get(16, 10));
        assert!(!m.get(2, 10));
        assert!(!m.get(29, 10));
        let d = m.fraction();
        assert!(d > 0.0 && d < 0.25, "density {d}");
    }

    #[test]
    fn test_blur_preserves_flat_values() {
        let p = Plane::new(5, 5, vec![77; 25]);
        assert_eq!(blur5(&p), p);
        assert_eq!(blur3(&p), p);
    }

    #[test]
    fn test_hough_finds_a_single_line() {
        let mut data = vec![false; 40 * 40];
        for y in 0..40 {
            data[y * 40 + 20] = true;
        }
        let mask = Mask::new(40, 40, data);
        assert!(hough_line_count(&mask, 30) >= 1);
        assert_eq!(hough_line_count(&mask, 41), 0);
    }

    #[test]
    fn test_hough_empty_mask() {
        let mask = Mask::new(10, 10, vec![false; 100]);
        assert_eq!(hough_line_count(&mask, 1), 0);
    }
}

//! Owned 8-bit pixel planes, binary masks and the statistics the detectors
//! are built from. Everything here is plain Rust over `Vec<u8>`.

use image::GrayImage;
use std::collections::VecDeque;

/// Row-major 8-bit image.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Plane {
    pub fn new(width: usize, height: usize, data: Vec<u8>) -> Self {
        assert_eq!(data.len(), width * height, "plane buffer size mismatch");
        Self { width, height, data }
    }

    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> u8) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    pub fn from_image(img: &GrayImage) -> Self {
        Self::new(img.width() as usize, img.height() as usize, img.as_raw().clone())
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }
    pub fn len(&self) -> usize { self.data.len() }
    pub fn is_empty(&self) -> bool { self.data.is_empty() }
    pub fn data(&self) -> &[u8] { &self.data }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Copy of `rows` x `cols`, clamped to the plane.
    pub fn crop(&self, rows: std::ops::Range<usize>, cols: std::ops::Range<usize>) -> Plane {
        let r0 = rows.start.min(self.height);
        let r1 = rows.end.clamp(r0, self.height);
        let c0 = cols.start.min(self.width);
        let c1 = cols.end.clamp(c0, self.width);

        let mut data = Vec::with_capacity((r1 - r0) * (c1 - c0));
        for y in r0..r1 {
            data.extend_from_slice(&self.data[y * self.width + c0..y * self.width + c1]);
        }
        Plane { width: c1 - c0, height: r1 - r0, data }
    }

    /// Crop by integer fractions of the size, e.g. `frac((1, 4), (3, 4), (0, 1), (1, 2))`
    /// is rows `h/4..3h/4`, cols `0..w/2`.
    pub fn frac(&self, r0: (usize, usize), r1: (usize, usize), c0: (usize, usize), c1: (usize, usize)) -> Plane {
        let (h, w) = (self.height, self.width);
        self.crop(h * r0.0 / r0.1..h * r1.0 / r1.1, w * c0.0 / c0.1..w * c1.0 / c1.1)
    }

    // ── Statistics ───────────────────────────────────────────────────────────

    pub fn mean(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&v| f64::from(v)).sum::<f64>() / self.data.len() as f64
    }

    /// Population standard deviation.
    pub fn std(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let var = self
            .data
            .iter()
            .map(|&v| (f64::from(v) - mean).powi(2))
            .sum::<f64>()
            / self.data.len() as f64;
        var.sqrt()
    }

    pub fn histogram(&self) -> [usize; 256] {
        let mut hist = [0usize; 256];
        for &v in &self.data {
            hist[v as usize] += 1;
        }
        hist
    }

    /// Percentile with linear interpolation between closest ranks.
    pub fn percentile(&self, p: f64) -> f64 {
        let n = self.data.len();
        if n == 0 {
            return 0.0;
        }
        let hist = self.histogram();
        let rank = p.clamp(0.0, 100.0) / 100.0 * (n - 1) as f64;
        let lo = rank.floor() as usize;
        let hi = rank.ceil() as usize;
        let a = nth_value(&hist, lo);
        let b = if hi == lo { a } else { nth_value(&hist, hi) };
        a + (b - a) * (rank - lo as f64)
    }

    pub fn mask(&self, pred: impl Fn(u8) -> bool) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            data: self.data.iter().map(|&v| pred(v)).collect(),
        }
    }

    pub fn above(&self, threshold: f64) -> Mask {
        self.mask(|v| f64::from(v) > threshold)
    }

    pub fn below(&self, threshold: f64) -> Mask {
        self.mask(|v| f64::from(v) < threshold)
    }

    pub fn row_means(&self) -> Vec<f64> {
        if self.width == 0 {
            return Vec::new();
        }
        self.data
            .chunks(self.width)
            .map(|row| row.iter().map(|&v| f64::from(v)).sum::<f64>() / self.width as f64)
            .collect()
    }

    /// Mean over a `(2r+1)` square window at every pixel, edges clamped.
    pub fn local_mean(&self, radius: usize) -> Vec<f64> {
        let (w, h) = (self.width, self.height);
        // summed-area table with a zero border
        let mut sat = vec![0u64; (w + 1) * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += u64::from(self.get(x, y));
                sat[(y + 1) * (w + 1) + x + 1] = sat[y * (w + 1) + x + 1] + row;
            }
        }
        let mut out = Vec::with_capacity(w * h);
        for y in 0..h {
            let y0 = y.saturating_sub(radius);
            let y1 = (y + radius + 1).min(h);
            for x in 0..w {
                let x0 = x.saturating_sub(radius);
                let x1 = (x + radius + 1).min(w);
                let sum = sat[y1 * (w + 1) + x1] + sat[y0 * (w + 1) + x0]
                    - sat[y0 * (w + 1) + x1]
                    - sat[y1 * (w + 1) + x0];
                out.push(sum as f64 / ((y1 - y0) * (x1 - x0)) as f64);
            }
        }
        out
    }

    /// Gaussian-weighted mean over a `(2r+1)` window, edges replicated.
    /// Sigma follows the usual `0.3 * ((ksize - 1) / 2 - 1) + 0.8` rule.
    pub fn gaussian_local_mean(&self, radius: usize) -> Vec<f64> {
        let (w, h) = (self.width, self.height);
        if w == 0 || h == 0 {
            return Vec::new();
        }
        let sigma = 0.3 * (radius as f64 - 1.0) + 0.8;
        let r = radius as isize;
        let mut kernel: Vec<f64> = (-r..=r)
            .map(|i| (-((i * i) as f64) / (2.0 * sigma * sigma)).exp())
            .collect();
        let total: f64 = kernel.iter().sum();
        kernel.iter_mut().for_each(|k| *k /= total);
        let clamp = |v: isize, max: usize| v.clamp(0, max as isize - 1) as usize;

        let mut horiz = vec![0f64; w * h];
        for y in 0..h {
            for x in 0..w {
                horiz[y * w + x] = kernel
                    .iter()
                    .enumerate()
                    .map(|(i, k)| k * f64::from(self.get(clamp(x as isize + i as isize - r, w), y)))
                    .sum();
            }
        }
        let mut out = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                out.push(
                    kernel
                        .iter()
                        .enumerate()
                        .map(|(i, k)| k * horiz[clamp(y as isize + i as isize - r, h) * w + x])
                        .sum(),
                );
            }
        }
        out
    }
}

fn nth_value(hist: &[usize; 256], index: usize) -> f64 {
    let mut seen = 0usize;
    for (value, &count) in hist.iter().enumerate() {
        seen += count;
        if seen > index {
            return value as f64;
        }
    }
    255.0
}

// ── Binary masks ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: usize,
    height: usize,
    data: Vec<bool>,
}

/// A 4-connected foreground region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub area: usize,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl Component {
    pub fn bbox_width(&self) -> usize { self.max_x - self.min_x + 1 }
    pub fn bbox_height(&self) -> usize { self.max_y - self.min_y + 1 }

    /// Bounding-box width over height.
    pub fn aspect_ratio(&self) -> f64 {
        self.bbox_width() as f64 / self.bbox_height() as f64
    }
}

impl Mask {
    pub fn new(width: usize, height: usize, data: Vec<bool>) -> Self {
        assert_eq!(data.len(), width * height, "mask buffer size mismatch");
        Self { width, height, data }
    }

    pub fn width(&self) -> usize { self.width }
    pub fn height(&self) -> usize { self.height }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&b| b).count()
    }

    pub fn fraction(&self) -> f64 {
        if self.data.is_empty() { 0.0 } else { self.count() as f64 / self.data.len() as f64 }
    }

    /// 4-connected labelling, the same structure scipy's `ndimage.label` uses by default.
    pub fn components(&self) -> Vec<Component> {
        self.label(false)
    }

    /// 8-connected labelling, used for edge traces.
    pub fn components_8(&self) -> Vec<Component> {
        self.label(true)
    }

    fn label(&self, diagonal: bool) -> Vec<Component> {
        let (w, h) = (self.width, self.height);
        let mut visited = vec![false; w * h];
        let mut out = Vec::new();
        let mut queue = VecDeque::new();

        for start in 0..w * h {
            if !self.data[start] || visited[start] {
                continue;
            }
            visited[start] = true;
            queue.push_back(start);
            let mut c = Component {
                area: 0,
                min_x: usize::MAX,
                min_y: usize::MAX,
                max_x: 0,
                max_y: 0,
            };

            while let Some(idx) = queue.pop_front() {
                let (x, y) = (idx % w, idx / w);
                c.area += 1;
                c.min_x = c.min_x.min(x);
                c.max_x = c.max_x.max(x);
                c.min_y = c.min_y.min(y);
                c.max_y = c.max_y.max(y);

                for (dx, dy) in neighbours(diagonal) {
                    let nx = x as isize + dx;
                    let ny = y as isize + dy;
                    if nx < 0 || ny < 0 || nx >= w as isize || ny >= h as isize {
                        continue;
                    }
                    let n = ny as usize * w + nx as usize;
                    if self.data[n] && !visited[n] {
                        visited[n] = true;
                        queue.push_back(n);
                    }
                }
            }
            out.push(c);
        }
        out
    }

    /// Square-kernel erosion. Pixels outside the mask count as background.
    pub fn erode(&self, k: usize) -> Mask {
        self.morph(k, true)
    }

    /// Square-kernel dilation.
    pub fn dilate(&self, k: usize) -> Mask {
        self.morph(k, false)
    }

    pub fn open(&self, k: usize) -> Mask {
        self.erode(k).dilate(k)
    }

    pub fn close(&self, k: usize) -> Mask {
        self.dilate(k).erode(k)
    }

    fn morph(&self, k: usize, erode: bool) -> Mask {
        let r = (k / 2) as isize;
        let (w, h) = (self.width as isize, self.height as isize);
        let mut data = Vec::with_capacity(self.data.len());
        for y in 0..h {
            for x in 0..w {
                let mut hit = erode;
                'window: for dy in -r..=r {
                    for dx in -r..=r {
                        let (nx, ny) = (x + dx, y + dy);
                        let v = nx >= 0 && ny >= 0 && nx < w && ny < h
                            && self.data[(ny * w + nx) as usize];
                        if erode && !v {
                            hit = false;
                            break 'window;
                        }
                        if !erode && v {
                            hit = true;
                            break 'window;
                        }
                    }
                }
                data.push(hit);
            }
        }
        Mask { width: self.width, height: self.height, data }
    }
}

fn neighbours(diagonal: bool) -> &'static [(isize, isize)] {
    const FOUR: [(isize, isize); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];
    const EIGHT: [(isize, isize); 8] =
        [(1, 0), (-1, 0), (0, 1), (0, -1), (1, 1), (1, -1), (-1, 1), (-1, -1)];
    if diagonal { &EIGHT } else { &FOUR }
}

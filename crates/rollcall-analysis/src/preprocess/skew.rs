//! Skew estimation and correction.

use image::imageops::FilterType;
use image::{GrayImage, Rgb, RgbImage};

/// Longest side of the image the detector works on.
const DETECT_MAX_DIM: u32 = 1000;

/// Pixels darker than this count as ink.
const INK_THRESHOLD: u8 = 128;

/// Estimates how far text lines deviate from horizontal.
pub trait SkewDetector: Send + Sync {
    /// Skew in degrees, positive when lines descend to the right.
    /// `None` when the page has too little content to tell.
    fn detect(&self, gray: &GrayImage) -> Option<f32>;
}

/// Projection-profile detector.
///
/// For each candidate angle, ink pixels are projected onto rows along that
/// angle; the angle with the sharpest row transitions wins. Searches a
/// coarse grid over +-45 degrees, then refines around the best candidate.
#[derive(Debug, Clone)]
pub struct ProjectionProfileDetector {
    pub search_degrees: f32,
    pub coarse_step: f32,
    pub fine_step: f32,
}

impl Default for ProjectionProfileDetector {
    fn default() -> Self {
        Self {
            search_degrees: 45.0,
            coarse_step: 1.0,
            fine_step: 0.25,
        }
    }
}

impl SkewDetector for ProjectionProfileDetector {
    fn detect(&self, gray: &GrayImage) -> Option<f32> {
        let (w, h) = gray.dimensions();
        if w < 50 || h < 50 {
            return None;
        }

        let scaled;
        let img = if w.max(h) > DETECT_MAX_DIM {
            let scale = DETECT_MAX_DIM as f32 / w.max(h) as f32;
            let nw = ((w as f32 * scale).round() as u32).max(1);
            let nh = ((h as f32 * scale).round() as u32).max(1);
            scaled = image::imageops::resize(gray, nw, nh, FilterType::Triangle);
            &scaled
        } else {
            gray
        };

        let ink: Vec<(f32, f32)> = img
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] < INK_THRESHOLD)
            .map(|(x, y, _)| (x as f32, y as f32))
            .collect();
        let (w, h) = img.dimensions();
        if (ink.len() as f32) < 0.01 * (w * h) as f32 {
            return None;
        }

        let score = |angle: f32| projection_score(&ink, w, h, angle);

        let mut best_angle = 0.0f32;
        let mut best_score = score(0.0);
        let steps = (self.search_degrees / self.coarse_step).round() as i32;
        for i in -steps..=steps {
            let angle = i as f32 * self.coarse_step;
            let s = score(angle);
            if s > best_score {
                best_score = s;
                best_angle = angle;
            }
        }

        let center = best_angle;
        let fine_steps = (self.coarse_step / self.fine_step).round() as i32;
        for i in -fine_steps..=fine_steps {
            let angle = center + i as f32 * self.fine_step;
            let s = score(angle);
            if s > best_score {
                best_score = s;
                best_angle = angle;
            }
        }

        Some(best_angle)
    }
}

/// Sum of squared differences between adjacent row bins after projecting
/// along `angle_deg`.
fn projection_score(ink: &[(f32, f32)], w: u32, h: u32, angle_deg: f32) -> f64 {
    let tan_a = angle_deg.to_radians().tan();
    // Projected rows range over h plus the drift across the width
    let drift = (w as f32 * tan_a.abs()).ceil() as usize;
    let offset = if tan_a > 0.0 { drift as f32 } else { 0.0 };
    let mut bins = vec![0u32; h as usize + drift + 1];

    for &(x, y) in ink {
        let row = (y - x * tan_a + offset).round();
        if row >= 0.0 && (row as usize) < bins.len() {
            bins[row as usize] += 1;
        }
    }

    bins.windows(2)
        .map(|pair| {
            let diff = pair[1] as f64 - pair[0] as f64;
            diff * diff
        })
        .sum()
}

/// Rotate so that lines skewed by `skew_deg` become horizontal.
///
/// Output keeps the input size; uncovered corners are filled white.
pub fn deskew(img: &RgbImage, skew_deg: f32) -> RgbImage {
    let (w, h) = img.dimensions();
    let (sin, cos) = skew_deg.to_radians().sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    let white = Rgb([255u8, 255, 255]);

    RgbImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cx + dx * cos - dy * sin;
        let sy = cy + dx * sin + dy * cos;
        sample_bilinear(img, sx, sy).unwrap_or(white)
    })
}

fn sample_bilinear(img: &RgbImage, x: f32, y: f32) -> Option<Rgb<u8>> {
    let (w, h) = img.dimensions();
    if x < 0.0 || y < 0.0 || x > (w - 1) as f32 || y > (h - 1) as f32 {
        return None;
    }
    let x0 = x.floor() as u32;
    let y0 = y.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = img.get_pixel(x0, y0).0;
    let p10 = img.get_pixel(x1, y0).0;
    let p01 = img.get_pixel(x0, y1).0;
    let p11 = img.get_pixel(x1, y1).0;

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = p00[c] as f32 * (1.0 - fx) + p10[c] as f32 * fx;
        let bottom = p01[c] as f32 * (1.0 - fx) + p11[c] as f32 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    Some(Rgb(out))
}

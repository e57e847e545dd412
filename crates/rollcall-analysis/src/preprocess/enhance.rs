//! Contrast and sharpness enhancement, resizing and encoding.

use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbImage};

/// Scale contrast around the mean luminance.
///
/// `factor` 1.0 leaves the image unchanged, 0.0 gives flat gray.
pub fn adjust_contrast(img: &RgbImage, factor: f32) -> RgbImage {
    let count = (img.width() as u64 * img.height() as u64).max(1);
    let luma_sum: f64 = img
        .pixels()
        .map(|p| 0.299 * p.0[0] as f64 + 0.587 * p.0[1] as f64 + 0.114 * p.0[2] as f64)
        .sum();
    let mean = (luma_sum / count as f64) as f32;

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        for c in pixel.0.iter_mut() {
            *c = (mean + factor * (*c as f32 - mean)).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Blend away from a blurred copy to sharpen edges.
///
/// `factor` 1.0 leaves the image unchanged; above 1.0 sharpens.
pub fn adjust_sharpness(img: &RgbImage, factor: f32) -> RgbImage {
    let blurred = image::imageops::blur(img, 1.0);
    let mut out = img.clone();
    for (pixel, soft) in out.pixels_mut().zip(blurred.pixels()) {
        for (c, s) in pixel.0.iter_mut().zip(soft.0.iter()) {
            let s = *s as f32;
            *c = (s + factor * (*c as f32 - s)).round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Dimensions with the longest side at most `max_dim`, keeping aspect ratio.
/// Images already within bounds are not upscaled.
pub fn fit_dimensions(width: u32, height: u32, max_dim: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (1, 1);
    }
    let longest = width.max(height);
    if longest <= max_dim {
        return (width, height);
    }
    let scale = max_dim as f32 / longest as f32;
    (
        ((width as f32 * scale).round() as u32).clamp(1, max_dim),
        ((height as f32 * scale).round() as u32).clamp(1, max_dim),
    )
}

/// Downscale so the longest side is at most `max_dim`.
pub fn limit_dimensions(img: RgbImage, max_dim: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    let (nw, nh) = fit_dimensions(w, h, max_dim);
    if (nw, nh) == (w, h) {
        return img;
    }
    tracing::debug!(from = format!("{w}x{h}"), to = format!("{nw}x{nh}"), "Downscaling page");
    image::imageops::resize(&img, nw, nh, FilterType::Lanczos3)
}

/// Encode an RGB image as PNG bytes.
pub fn encode_png(img: RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img).write_to(&mut cursor, ImageFormat::Png)?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_contrast_identity_and_stretch() {
        let mut img = RgbImage::from_pixel(4, 1, Rgb([100, 100, 100]));
        img.put_pixel(0, 0, Rgb([140, 140, 140]));

        assert_eq!(adjust_contrast(&img, 1.0), img);

        let stretched = adjust_contrast(&img, 1.5);
        // mean is 110; 140 -> 125 above mean becomes 155, 100 -> 95
        assert_eq!(stretched.get_pixel(0, 0).0, [155, 155, 155]);
        assert_eq!(stretched.get_pixel(1, 0).0, [95, 95, 95]);
    }

    #[test]
    fn test_sharpness_identity_on_flat_image() {
        let img = RgbImage::from_pixel(8, 8, Rgb([50, 60, 70]));
        assert_eq!(adjust_sharpness(&img, 1.5), img);
    }

    #[test]
    fn test_fit_dimensions() {
        assert_eq!(fit_dimensions(2550, 3300, 4096), (2550, 3300));
        assert_eq!(fit_dimensions(8000, 4000, 4096), (4096, 2048));
        assert_eq!(fit_dimensions(0, 10, 4096), (1, 1));
    }

    #[test]
    fn test_encode_png_decodes() {
        let img = RgbImage::from_pixel(3, 2, Rgb([1, 2, 3]));
        let bytes = encode_png(img).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgb8();
        assert_eq!(decoded.dimensions(), (3, 2));
    }
}

//! Image preparation for OCR
//!
//! Label text comes out best from a grayscale image with the midtones
//! pushed towards white (gamma > 1), and small crops need upscaling before
//! the engine picks up anything.

use image::{imageops::FilterType, DynamicImage, GrayImage};
use tracing::debug;

/// Regions smaller than this on either side are upscaled
const MIN_OCR_DIMENSION: u32 = 80;

/// Grayscale, gamma-corrected and (for small crops) upscaled copy of `image`
pub fn prepare_for_ocr(image: &DynamicImage, gamma: f32) -> GrayImage {
    let mut gray = image.to_luma8();

    let scale = auto_scale(gray.width(), gray.height());
    if scale > 1 {
        debug!(
            "Auto-upscaling small region from {}x{} by {}x",
            gray.width(),
            gray.height(),
            scale
        );
        gray = image::imageops::resize(
            &gray,
            gray.width() * scale,
            gray.height() * scale,
            FilterType::Triangle,
        );
    }

    if (gamma - 1.0).abs() > 0.01 {
        apply_gamma(&mut gray, gamma);
    }
    gray
}

/// Upscale factor (2x-4x) for regions too small to OCR reliably
fn auto_scale(width: u32, height: u32) -> u32 {
    if width == 0 || height == 0 {
        return 1;
    }
    if height < MIN_OCR_DIMENSION || width < MIN_OCR_DIMENSION {
        let height_scale = (MIN_OCR_DIMENSION as f32 / height as f32).ceil() as u32;
        let width_scale = (MIN_OCR_DIMENSION as f32 / width as f32).ceil() as u32;
        height_scale.max(width_scale).clamp(2, 4)
    } else {
        1
    }
}

/// `out = 255 * (in / 255) ^ (1 / gamma)` through a lookup table
fn apply_gamma(image: &mut GrayImage, gamma: f32) {
    let inv = 1.0 / gamma;
    let table: Vec<u8> = (0..=255u16)
        .map(|v| ((v as f32 / 255.0).powf(inv) * 255.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    for pixel in image.pixels_mut() {
        pixel.0[0] = table[pixel.0[0] as usize];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, RgbImage};

    #[test]
    fn test_gamma_brightens_midtones() {
        let mut img = GrayImage::from_pixel(1, 3, Luma([0]));
        img.put_pixel(0, 1, Luma([64]));
        img.put_pixel(0, 2, Luma([255]));
        apply_gamma(&mut img, 3.0);

        assert_eq!(img.get_pixel(0, 0).0[0], 0);
        assert!(img.get_pixel(0, 1).0[0] > 150);
        assert_eq!(img.get_pixel(0, 2).0[0], 255);
    }

    #[test]
    fn test_auto_scale() {
        assert_eq!(auto_scale(1000, 1000), 1);
        assert_eq!(auto_scale(200, 50), 2);
        assert_eq!(auto_scale(10, 10), 4);
        assert_eq!(auto_scale(0, 10), 1);
    }

    #[test]
    fn test_prepare_small_crop() {
        let crop = DynamicImage::ImageRgb8(RgbImage::new(40, 30));
        let prepared = prepare_for_ocr(&crop, 1.0);
        assert_eq!(prepared.dimensions(), (120, 90));
    }
}

//! Text region detection
//!
//! Finds blocks of dark print on a light label: Otsu threshold, dilation to
//! fuse letters into words and lines, connected components, then padding
//! and merging of overlapping boxes. Works on a downscaled copy and maps
//! the boxes back to full-resolution coordinates.

use image::{imageops::FilterType, DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;
use std::time::Instant;
use tracing::debug;

use super::TextRegionDetector;
use crate::error::SampleResult;
use crate::sample::TextArea;

/// Longest side of the working copy
const PROCESSING_SIZE: u32 = 960;
/// Box growth before merging
const PADDING: f32 = 1.5;
/// Box growth after merging
const POST_PADDING: f32 = 1.2;

/// Connected-component text detector
#[derive(Debug, Clone)]
pub struct ContourTextDetector {
    max_areas: usize,
    /// Dilation radius on the working copy
    dilation: u8,
    /// Smallest component side kept, on the working copy
    min_side: u32,
}

impl ContourTextDetector {
    pub fn new(max_areas: usize) -> Self {
        Self {
            max_areas,
            dilation: 3,
            min_side: 6,
        }
    }

    fn component_boxes(&self, binary: &GrayImage) -> Vec<TextArea> {
        let labels = connected_components(binary, Connectivity::Eight, Luma([0u8]));
        let mut bounds: HashMap<u32, (u32, u32, u32, u32)> = HashMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label.0[0];
            if label == 0 {
                continue;
            }
            bounds
                .entry(label)
                .and_modify(|b| {
                    b.0 = b.0.min(x);
                    b.1 = b.1.min(y);
                    b.2 = b.2.max(x + 1);
                    b.3 = b.3.max(y + 1);
                })
                .or_insert((x, y, x + 1, y + 1));
        }

        let (width, height) = binary.dimensions();
        bounds
            .into_values()
            .map(|(x1, y1, x2, y2)| TextArea::new(x1, y1, x2, y2, 0.0))
            .filter(|a| a.width() >= self.min_side && a.height() >= self.min_side)
            // Frame-sized blobs are shadows or the label edge, not text
            .filter(|a| a.width() < width * 9 / 10 || a.height() < height * 9 / 10)
            .collect()
    }
}

impl TextRegionDetector for ContourTextDetector {
    fn detect(&self, image: &DynamicImage) -> SampleResult<Vec<TextArea>> {
        let start = Instant::now();
        let (full_w, full_h) = (image.width(), image.height());
        if full_w == 0 || full_h == 0 {
            return Ok(Vec::new());
        }

        let scale = (PROCESSING_SIZE as f32 / full_w.max(full_h) as f32).min(1.0);
        let work_w = ((full_w as f32 * scale).round() as u32).max(1);
        let work_h = ((full_h as f32 * scale).round() as u32).max(1);
        let gray = image.to_luma8();
        let gray = if scale < 1.0 {
            image::imageops::resize(&gray, work_w, work_h, FilterType::Triangle)
        } else {
            gray
        };

        // Dark ink becomes foreground
        let level = otsu_level(&gray);
        let binary = GrayImage::from_fn(work_w, work_h, |x, y| {
            if gray.get_pixel(x, y).0[0] <= level {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        let fused = dilate(&binary, Norm::LInf, self.dilation);

        let padded: Vec<TextArea> = self
            .component_boxes(&fused)
            .iter()
            .map(|a| a.padded(PADDING, work_w, work_h))
            .collect();
        let mut areas: Vec<TextArea> = group_rects(padded)
            .iter()
            .map(|a| a.padded(POST_PADDING, work_w, work_h))
            .map(|a| {
                TextArea::new(
                    ((a.x1 as f32 / scale) as u32).min(full_w),
                    ((a.y1 as f32 / scale) as u32).min(full_h),
                    ((a.x2 as f32 / scale).ceil() as u32).min(full_w),
                    ((a.y2 as f32 / scale).ceil() as u32).min(full_h),
                    a.rotation,
                )
            })
            .collect();

        // Largest areas first, then reading order
        areas.sort_by_key(|a| std::cmp::Reverse(a.width() as u64 * a.height() as u64));
        areas.truncate(self.max_areas);
        areas.sort_by_key(|a| (a.y1, a.x1));

        debug!(
            "Text detection found {} areas in {:?}",
            areas.len(),
            start.elapsed()
        );
        Ok(areas)
    }
}

/// Merge intersecting rectangles until none overlap
pub fn group_rects(rects: Vec<TextArea>) -> Vec<TextArea> {
    let mut remaining = rects;
    loop {
        let mut merged_any = false;
        let mut out: Vec<TextArea> = Vec::with_capacity(remaining.len());
        for rect in remaining {
            match out.iter().position(|r| r.intersects(&rect)) {
                Some(pos) => {
                    out[pos] = out[pos].union(&rect);
                    merged_any = true;
                }
                None => out.push(rect),
            }
        }
        remaining = out;
        if !merged_any {
            return remaining;
        }
    }
}

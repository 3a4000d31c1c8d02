//! One photograph of a sample plus its metadata
//!
//! Label, specimen and combined images are the same type; what an image
//! shows is carried by two independent capability flags.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Rotation;
use crate::error::{SampleError, SampleResult};
use crate::sample::metadata::MetaStorage;

/// What an image shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRole {
    /// Label(s) only
    Label,
    /// Specimen only
    Specimen,
    /// Specimen and labels in one frame
    Combined,
}

impl ImageRole {
    pub fn has_labels(self) -> bool {
        matches!(self, ImageRole::Label | ImageRole::Combined)
    }

    pub fn has_specimens(self) -> bool {
        matches!(self, ImageRole::Specimen | ImageRole::Combined)
    }
}

/// Rectangle around detected text, upper-left origin pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TextArea {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    /// Rotation angle of the text in radians
    pub rotation: f32,
}

impl TextArea {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32, rotation: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
            rotation,
        }
    }

    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    /// Whether the two rectangles share a non-empty area
    pub fn intersects(&self, other: &TextArea) -> bool {
        let start_x = self.x1.max(other.x1);
        let start_y = self.y1.max(other.y1);
        let end_x = self.x2.min(other.x2);
        let end_y = self.y2.min(other.y2);
        start_x < end_x && start_y < end_y
    }

    /// Bounding box of both rectangles; the rotation of `other` is kept
    pub fn union(&self, other: &TextArea) -> TextArea {
        TextArea {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
            rotation: other.rotation,
        }
    }

    /// Grow the rectangle around its centre by `factor`, clamped to the frame
    pub fn padded(&self, factor: f32, frame_width: u32, frame_height: u32) -> TextArea {
        let half_x = 0.5 * (factor - 1.0).max(0.0) * self.width() as f32;
        let half_y = 0.5 * (factor - 1.0).max(0.0) * self.height() as f32;
        TextArea {
            x1: (self.x1 as f32 - half_x).max(0.0) as u32,
            y1: (self.y1 as f32 - half_y).max(0.0) as u32,
            x2: ((self.x2 as f32 + half_x) as u32).min(frame_width),
            y2: ((self.y2 as f32 + half_y) as u32).min(frame_height),
            rotation: self.rotation,
        }
    }
}

impl From<&TextArea> for Value {
    fn from(area: &TextArea) -> Self {
        Value::from(vec![
            Value::from(area.x1),
            Value::from(area.y1),
            Value::from(area.x2),
            Value::from(area.y2),
            Value::from(area.rotation),
        ])
    }
}

/// One image file belonging to a sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleImage {
    has_labels: bool,
    has_specimens: bool,
    /// Camera or label tag
    camera: String,
    path: PathBuf,
    /// Decoded pixels, loaded on first access
    #[serde(skip)]
    pixels: Option<DynamicImage>,
    text_areas: Option<Vec<TextArea>>,
    meta: MetaStorage,
}

impl PartialEq for SampleImage {
    fn eq(&self, other: &Self) -> bool {
        self.has_labels == other.has_labels
            && self.has_specimens == other.has_specimens
            && self.camera == other.camera
            && self.path == other.path
            && self.text_areas == other.text_areas
            && self.meta == other.meta
    }
}

impl SampleImage {
    pub fn new(role: ImageRole, camera: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            has_labels: role.has_labels(),
            has_specimens: role.has_specimens(),
            camera: camera.into(),
            path: path.into(),
            pixels: None,
            text_areas: None,
            meta: MetaStorage::new(),
        }
    }

    pub fn has_labels(&self) -> bool {
        self.has_labels
    }

    pub fn has_specimens(&self) -> bool {
        self.has_specimens
    }

    pub fn camera(&self) -> &str {
        &self.camera
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Only the renamer moves images, and only after the file has moved
    pub(crate) fn set_path(&mut self, path: PathBuf) {
        self.path = path;
    }

    pub fn text_areas(&self) -> Option<&[TextArea]> {
        self.text_areas.as_deref()
    }

    pub fn set_text_areas(&mut self, areas: Vec<TextArea>) {
        self.text_areas = Some(areas);
    }

    pub fn meta(&self) -> &MetaStorage {
        &self.meta
    }

    pub fn meta_mut(&mut self) -> &mut MetaStorage {
        &mut self.meta
    }

    pub fn is_loaded(&self) -> bool {
        self.pixels.is_some()
    }

    /// Pixel buffer, read from disk if it is not in memory
    pub fn pixels(&mut self) -> SampleResult<&mut DynamicImage> {
        if self.pixels.is_none() {
            self.pixels = Some(load_image(&self.path)?);
        }
        match self.pixels.as_mut() {
            Some(pixels) => Ok(pixels),
            None => Err(SampleError::file_loading(&self.path, "image buffer unavailable")),
        }
    }

    /// Replace the in-memory buffer without touching the file
    #[cfg(test)]
    pub fn set_pixels(&mut self, pixels: DynamicImage) {
        self.pixels = Some(pixels);
    }

    /// Drop the in-memory buffer; the next access reloads from disk
    pub fn unload(&mut self) {
        self.pixels = None;
    }

    /// Rotate the in-memory buffer clockwise
    pub fn rotate(&mut self, rotation: Rotation) -> SampleResult<()> {
        if rotation == Rotation::None {
            return Ok(());
        }
        let pixels = self.pixels()?;
        let rotated = match rotation {
            Rotation::None => return Ok(()),
            Rotation::Clockwise90 => pixels.rotate90(),
            Rotation::Clockwise180 => pixels.rotate180(),
            Rotation::Clockwise270 => pixels.rotate270(),
        };
        *pixels = rotated;
        debug!("{}: rotated {} degrees", self.camera, u16::from(rotation));
        Ok(())
    }

    /// Copy of the area inside the image, clamped to the frame
    pub fn sub_image(&mut self, area: &TextArea) -> SampleResult<DynamicImage> {
        let pixels = self.pixels()?;
        let (width, height) = (pixels.width(), pixels.height());
        let x = area.x1.min(width);
        let y = area.y1.min(height);
        let w = area.x2.min(width).saturating_sub(x);
        let h = area.y2.min(height).saturating_sub(y);
        Ok(pixels.crop_imm(x, y, w, h))
    }

    /// Write every text area as `{stem}{marker}{n}.jpg` next to the image
    pub fn save_text_areas(&mut self, marker: &str) -> SampleResult<Vec<PathBuf>> {
        let areas = self.text_areas.clone().unwrap_or_default();
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut written = Vec::with_capacity(areas.len());
        for (index, area) in areas.iter().enumerate() {
            let crop = self.sub_image(area)?;
            let target = self.path.with_file_name(format!("{}{}{}.jpg", stem, marker, index + 1));
            debug!("Storing text area image {:?}", target);
            DynamicImage::ImageRgb8(crop.to_rgb8())
                .save(&target)
                .map_err(|e| SampleError::file_loading(&target, e))?;
            written.push(target);
        }
        Ok(written)
    }
}

/// Read an image file into memory
pub fn load_image(path: &Path) -> SampleResult<DynamicImage> {
    if !path.exists() {
        return Err(SampleError::file_loading(path, "file does not exist"));
    }
    if !path.is_file() {
        return Err(SampleError::file_loading(path, "not a file"));
    }
    image::open(path).map_err(|e| SampleError::file_loading(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn write_test_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        let mut img = RgbImage::new(width, height);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_role_flags() {
        assert!(ImageRole::Label.has_labels());
        assert!(!ImageRole::Label.has_specimens());
        assert!(ImageRole::Specimen.has_specimens());
        assert!(!ImageRole::Specimen.has_labels());
        assert!(ImageRole::Combined.has_labels() && ImageRole::Combined.has_specimens());
    }

    #[test]
    fn test_text_area_geometry() {
        let a = TextArea::new(0, 0, 10, 10, 0.0);
        let b = TextArea::new(5, 5, 20, 20, 0.5);
        let c = TextArea::new(10, 0, 20, 10, 0.0);

        assert!(a.intersects(&b));
        // Touching edges do not intersect
        assert!(!a.intersects(&c));

        let u = a.union(&b);
        assert_eq!((u.x1, u.y1, u.x2, u.y2), (0, 0, 20, 20));
        assert_eq!(u.rotation, 0.5);
    }

    #[test]
    fn test_padding_is_clamped() {
        let area = TextArea::new(10, 10, 30, 20, 0.0);
        let padded = area.padded(2.0, 35, 100);
        assert_eq!((padded.x1, padded.y1), (0, 5));
        assert_eq!((padded.x2, padded.y2), (35, 25));
    }

    #[test]
    fn test_pixels_reload_after_unload() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(dir.path(), "label.png", 4, 2);
        let mut image = SampleImage::new(ImageRole::Label, "label_camera", &path);

        assert!(!image.is_loaded());
        assert_eq!(image.pixels().unwrap().width(), 4);
        image.unload();
        assert!(!image.is_loaded());
        assert_eq!(image.pixels().unwrap().height(), 2);
    }

    #[test]
    fn test_missing_file_is_loading_error() {
        let mut image = SampleImage::new(ImageRole::Label, "cam", "/nonexistent/label.jpg");
        match image.pixels() {
            Err(SampleError::FileLoading { .. }) => {}
            other => panic!("Expected FileLoading error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_rotate_90_clockwise() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(dir.path(), "object.png", 4, 2);
        let mut image = SampleImage::new(ImageRole::Specimen, "cam", &path);

        image.rotate(Rotation::Clockwise90).unwrap();
        let rgb = image.pixels().unwrap().to_rgb8();
        assert_eq!(rgb.dimensions(), (2, 4));
        // Top-left pixel moves to the top-right corner
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn test_sub_image_clamps_to_frame() {
        let mut image = SampleImage::new(ImageRole::Label, "cam", "unused.png");
        image.set_pixels(DynamicImage::ImageRgb8(RgbImage::new(10, 10)));

        let crop = image.sub_image(&TextArea::new(5, 5, 50, 50, 0.0)).unwrap();
        assert_eq!((crop.width(), crop.height()), (5, 5));
    }

    #[test]
    fn test_save_text_areas_naming() {
        let dir = TempDir::new().unwrap();
        let path = write_test_image(dir.path(), "labels.png", 20, 20);
        let mut image = SampleImage::new(ImageRole::Label, "cam", &path);
        image.set_text_areas(vec![
            TextArea::new(0, 0, 5, 5, 0.0),
            TextArea::new(10, 10, 20, 20, 0.0),
        ]);

        let written = image.save_text_areas("_textarea_").unwrap();
        assert_eq!(written.len(), 2);
        assert_eq!(written[0], dir.path().join("labels_textarea_1.jpg"));
        assert!(written[1].exists());
    }

    #[test]
    fn test_serialization_skips_pixels() {
        let mut image = SampleImage::new(ImageRole::Combined, "cam", "a.jpg");
        image.set_pixels(DynamicImage::ImageRgb8(RgbImage::new(2, 2)));
        image.meta_mut().add("Barcode contents", vec!["AB.1"]);

        let json = serde_json::to_string(&image).unwrap();
        assert!(!json.contains("pixels"));
        let parsed: SampleImage = serde_json::from_str(&json).unwrap();
        assert!(!parsed.is_loaded());
        assert_eq!(parsed, image);
    }
}

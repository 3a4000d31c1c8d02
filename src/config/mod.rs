//! Postprocessor Configuration
//!
//! Site settings stored in TOML format. Every option has a default, so a
//! config file only needs to name what differs from them. Anything that
//! cannot be honoured (unknown sample format, bad rotation angle, zero
//! workers) fails at load time, before a single sample is touched.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sample::image::ImageRole;

/// Application settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Data locations, event metadata and renaming
    pub basic: BasicConfig,
    /// Which sample layout to expect and how to recognise it
    pub sampleformat: SampleFormatConfig,
    /// Stage switches and worker tuning
    pub postprocessor: PostprocessorConfig,
    /// OCR engine settings
    pub ocr: OcrConfig,
    /// Barcode decoder settings
    pub barcodes: BarcodeConfig,
    /// Lexeme analysis service settings
    pub analysis: AnalysisConfig,
    /// Tabular output settings
    pub output: OutputConfig,
}

/// Data locations, event metadata and renaming
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    /// Root of the watched data tree
    pub main_data_directory: PathBuf,
    /// Recorded as "Data owner" in every sample
    pub copyright_owner: String,
    /// Recorded as "Operator"
    pub operator: String,
    /// Recorded as "Free text"
    pub free_text: String,
    /// Write the JSON metadata record at the end of the pipeline
    pub save_json: bool,
    /// Extension of the metadata record, including the dot
    pub json_extension: String,
    /// Prefix sample directories with the resolved identifier
    pub directories_rename_by_barcode_id: bool,
    /// Prefix image files with the resolved identifier
    pub files_rename_by_barcode_id: bool,
    /// Where renamed directories go (defaults to the main data directory)
    pub rename_base_directory: Option<PathBuf>,
    /// Put each renamed directory under a subdirectory named after the identifier
    pub create_subdirectory_per_sample: bool,
    /// URI prefixes a well-formed identifier may carry
    pub allowed_uri_prefixes: Vec<String>,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            main_data_directory: PathBuf::from("."),
            copyright_owner: String::new(),
            operator: String::new(),
            free_text: String::new(),
            save_json: true,
            json_extension: ".json".to_string(),
            directories_rename_by_barcode_id: false,
            files_rename_by_barcode_id: false,
            rename_base_directory: None,
            create_subdirectory_per_sample: false,
            allowed_uri_prefixes: vec![
                "http://id.luomus.fi/".to_string(),
                "http://tun.fi/".to_string(),
            ],
        }
    }
}

impl BasicConfig {
    /// Base directory for renamed sample directories
    pub fn rename_base(&self) -> &Path {
        self.rename_base_directory
            .as_deref()
            .unwrap_or(&self.main_data_directory)
    }
}

/// Supported sample layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleFormat {
    /// One combined label+specimen image per sample
    #[default]
    SingleFile,
    /// Insect imaging line directory (specimen + label images)
    InsectLine,
    /// Herbarium sheet imaging line directory
    PlantLine,
}

impl SampleFormat {
    /// Whether samples of this format live in their own directory
    pub fn is_line(&self) -> bool {
        matches!(self, SampleFormat::InsectLine | SampleFormat::PlantLine)
    }

    /// The fixed file set of a line layout
    pub fn default_line_files(&self) -> Vec<LineFile> {
        match self {
            SampleFormat::SingleFile => Vec::new(),
            SampleFormat::InsectLine => vec![
                LineFile::new("object.jpg", ImageRole::Specimen, "object_camera"),
                LineFile::new("labels.jpg", ImageRole::Label, "label_camera"),
            ],
            SampleFormat::PlantLine => {
                vec![LineFile::new("sheet.jpg", ImageRole::Combined, "sheet_camera")]
            }
        }
    }
}

/// One named file of a line layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineFile {
    /// File name inside the sample directory
    pub name: String,
    /// What the image shows
    pub role: ImageRole,
    /// Camera tag recorded on the image
    pub camera: String,
}

impl LineFile {
    pub fn new(name: &str, role: ImageRole, camera: &str) -> Self {
        Self {
            name: name.to_string(),
            role,
            camera: camera.to_string(),
        }
    }
}

/// Which sample layout to expect and how to recognise it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleFormatConfig {
    /// Layout of incoming samples
    pub datatype_to_load: SampleFormat,
    /// Glob matched against file names to detect a new sample
    pub recognize_by_filename_pattern: String,
    /// Camera tag for single-file samples
    pub camera_label: String,
    /// Text preceding the capture timestamp in a line directory name
    pub timestamp_marker: String,
    /// chrono format of that timestamp
    pub timestamp_format: String,
    /// Overrides the fixed file set of a line layout
    pub line_files: Option<Vec<LineFile>>,
}

impl Default for SampleFormatConfig {
    fn default() -> Self {
        Self {
            datatype_to_load: SampleFormat::SingleFile,
            recognize_by_filename_pattern: "*.jpg".to_string(),
            camera_label: "generic_camera".to_string(),
            timestamp_marker: "dc1.".to_string(),
            timestamp_format: "%Y-%m-%d_%H-%M-%S".to_string(),
            line_files: None,
        }
    }
}

impl SampleFormatConfig {
    /// File set of the configured line layout
    pub fn line_files(&self) -> Vec<LineFile> {
        self.line_files
            .clone()
            .unwrap_or_else(|| self.datatype_to_load.default_line_files())
    }
}

/// Rotation applied to every image before recognition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> std::result::Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Clockwise90),
            180 => Ok(Rotation::Clockwise180),
            270 => Ok(Rotation::Clockwise270),
            other => Err(format!("rotation must be 0, 90, 180 or 270, got {other}")),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> u16 {
        match rotation {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        }
    }
}

/// Stage switches and worker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PostprocessorConfig {
    /// Scan the data tree for existing samples at startup
    pub process_existing: bool,
    /// Keep watching for new samples until interrupted
    pub monitor: bool,
    /// Size of the worker pool
    pub workers: usize,
    /// Seconds to wait after detection before touching a sample
    pub sleep_after_new_sample_detected: f64,
    /// Upper bound in seconds on waiting for a file to stop growing
    pub settle_max_wait: f64,
    /// Rotation applied before any recognition stage
    pub rotate_before_processing: Rotation,
    pub read_barcodes: bool,
    pub find_text_areas: bool,
    /// Write each detected text area as its own image file
    pub save_text_area_images: bool,
    pub ocr: bool,
    /// OCR the whole frame even when text areas were found
    pub ocr_force_full_frame: bool,
    /// Adopt an identifier read by OCR when no barcode yields one
    pub ocr_identifier_fallback: bool,
    /// Submit combined OCR text to the lexeme analysis service
    pub ocr_analysis: bool,
    /// Append analysis results to the output table
    pub ocr_analysis_to_table: bool,
}

impl Default for PostprocessorConfig {
    fn default() -> Self {
        Self {
            process_existing: true,
            monitor: true,
            workers: 4,
            sleep_after_new_sample_detected: 2.0,
            settle_max_wait: 30.0,
            rotate_before_processing: Rotation::None,
            read_barcodes: true,
            find_text_areas: false,
            save_text_area_images: false,
            ocr: false,
            ocr_force_full_frame: false,
            ocr_identifier_fallback: false,
            ocr_analysis: false,
            ocr_analysis_to_table: false,
        }
    }
}

/// Seconds as a `Duration`; `None` for negative, non-finite or oversized values
fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

impl PostprocessorConfig {
    pub fn settle_delay(&self) -> Duration {
        seconds(self.sleep_after_new_sample_detected).unwrap_or_default()
    }

    pub fn settle_max_wait(&self) -> Duration {
        seconds(self.settle_max_wait).unwrap_or_default()
    }
}

/// OCR engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Tesseract executable
    pub tesseract_command: String,
    /// Tesseract language code(s), e.g. "eng" or "eng+fin"
    pub language: String,
    /// Per-call timeout in seconds
    pub timeout_secs: u64,
    /// Gamma applied to the grayscale image before OCR (1.0 = off)
    pub gamma: f32,
    /// Maximum number of text areas kept per image
    pub max_text_areas: usize,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_command: "tesseract".to_string(),
            language: "eng".to_string(),
            timeout_secs: 10,
            gamma: 3.0,
            max_text_areas: 10,
        }
    }
}

/// Barcode decoder settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BarcodeConfig {
    /// zbarimg executable
    pub zbar_command: String,
}

impl Default for BarcodeConfig {
    fn default() -> Self {
        Self {
            zbar_command: "zbarimg".to_string(),
        }
    }
}

/// Lexeme analysis service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Service URL; the OCR text is sent as the `text` query parameter
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_secs: 5,
        }
    }
}

/// Tabular output settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// CSV file rows are appended to
    pub table_path: Option<PathBuf>,
}

impl AppConfig {
    /// Reject settings that parse but cannot be run
    pub fn validate(&self) -> Result<()> {
        if self.postprocessor.workers == 0 {
            bail!("postprocessor.workers must be at least 1");
        }
        if self.sampleformat.recognize_by_filename_pattern.trim().is_empty() {
            bail!("sampleformat.recognize_by_filename_pattern must not be empty");
        }
        if self.sampleformat.datatype_to_load.is_line() && self.sampleformat.line_files().is_empty() {
            bail!("sampleformat.line_files must name at least one file for line layouts");
        }
        let pp = &self.postprocessor;
        for (name, value) in [
            ("sleep_after_new_sample_detected", pp.sleep_after_new_sample_detected),
            ("settle_max_wait", pp.settle_max_wait),
        ] {
            if seconds(value).is_none() {
                bail!("postprocessor.{} must be a non-negative number of seconds, got {}", name, value);
            }
        }
        Ok(())
    }
}

/// Load configuration from file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file {:?}", path))?;
    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Invalid configuration file {:?}", path))?;
    config.validate()?;
    Ok(config)
}

/// Save configuration to file
pub fn save_config(config: &AppConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_app_config() {
        let config = AppConfig::default();

        assert!(config.basic.save_json);
        assert_eq!(config.basic.json_extension, ".json");
        assert!(!config.basic.directories_rename_by_barcode_id);

        assert_eq!(config.sampleformat.datatype_to_load, SampleFormat::SingleFile);
        assert_eq!(config.sampleformat.recognize_by_filename_pattern, "*.jpg");

        assert_eq!(config.postprocessor.workers, 4);
        assert_eq!(config.postprocessor.rotate_before_processing, Rotation::None);
        assert!(config.postprocessor.read_barcodes);
        assert!(!config.postprocessor.ocr);

        assert_eq!(config.ocr.timeout_secs, 10);
        assert!(config.analysis.endpoint.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let mut config = AppConfig::default();
        config.postprocessor.rotate_before_processing = Rotation::Clockwise270;
        config.sampleformat.datatype_to_load = SampleFormat::InsectLine;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.postprocessor.rotate_before_processing, Rotation::Clockwise270);
        assert_eq!(parsed.sampleformat.datatype_to_load, SampleFormat::InsectLine);
        assert_eq!(parsed.basic.allowed_uri_prefixes, config.basic.allowed_uri_prefixes);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let parsed: AppConfig = toml::from_str(
            r#"
            [basic]
            main_data_directory = "/data/photos"

            [postprocessor]
            rotate_before_processing = 90
            ocr = true
            "#,
        )
        .unwrap();

        assert_eq!(parsed.basic.main_data_directory, PathBuf::from("/data/photos"));
        assert_eq!(parsed.postprocessor.rotate_before_processing, Rotation::Clockwise90);
        assert!(parsed.postprocessor.ocr);
        assert_eq!(parsed.postprocessor.workers, 4);
        assert_eq!(parsed.ocr.language, "eng");
    }

    #[test]
    fn test_unknown_sample_format_is_rejected() {
        let result: std::result::Result<AppConfig, _> = toml::from_str(
            r#"
            [sampleformat]
            datatype_to_load = "microscope_slide"
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_rotation_is_rejected() {
        let result: std::result::Result<AppConfig, _> = toml::from_str(
            r#"
            [postprocessor]
            rotate_before_processing = 45
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_workers_fails_validation() {
        let mut config = AppConfig::default();
        config.postprocessor.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unrepresentable_settle_times_fail_validation() {
        let mut config = AppConfig::default();
        config.postprocessor.settle_max_wait = 1e30;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.postprocessor.sleep_after_new_sample_detected = -1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.postprocessor.settle_max_wait = 0.0;
        assert!(config.validate().is_ok());
        assert_eq!(config.postprocessor.settle_max_wait(), Duration::ZERO);
    }

    #[test]
    fn test_line_files_default_per_format() {
        let mut config = SampleFormatConfig::default();
        config.datatype_to_load = SampleFormat::InsectLine;
        let files = config.line_files();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].role, ImageRole::Label);

        config.line_files = Some(vec![LineFile::new("a.jpg", ImageRole::Combined, "cam")]);
        assert_eq!(config.line_files()[0].name, "a.jpg");
    }

    #[test]
    fn test_rename_base_falls_back_to_data_directory() {
        let mut basic = BasicConfig::default();
        basic.main_data_directory = PathBuf::from("/data");
        assert_eq!(basic.rename_base(), Path::new("/data"));
        basic.rename_base_directory = Some(PathBuf::from("/archive"));
        assert_eq!(basic.rename_base(), Path::new("/archive"));
    }

    #[test]
    fn test_save_and_load_config() {
        let config = AppConfig::default();
        let temp_file = NamedTempFile::new().unwrap();

        save_config(&config, temp_file.path()).unwrap();
        let loaded = load_config(temp_file.path()).unwrap();

        assert_eq!(config.postprocessor.workers, loaded.postprocessor.workers);
        assert_eq!(config.ocr.tesseract_command, loaded.ocr.tesseract_command);
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/path/postprocessor.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "this is not valid toml {{{{").unwrap();

        let result = load_config(temp_file.path());
        assert!(result.is_err());
    }
}

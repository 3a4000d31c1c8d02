//! Sample model
//!
//! A [`SampleEvent`] is one capture occasion: its images, event metadata,
//! where it lives on disk and (once resolved) its canonical identifier.
//! Each event is owned by exactly one worker for the whole pipeline.

pub mod image;
pub mod metadata;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::{AppConfig, LineFile, SampleFormat};
use crate::error::{SampleError, SampleResult};
use crate::identifier;
use crate::storage::record;

pub use self::image::{ImageRole, SampleImage, TextArea};
pub use self::metadata::MetaStorage;

/// Format the original capture timestamp is re-emitted in
pub const TIMESTAMP_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One capture occasion and everything derived from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    /// File-name prefix (directory name for line layouts, file stem otherwise)
    pub name: String,
    pub created: DateTime<Local>,
    pub format: SampleFormat,
    /// Directory holding the sample's files
    pub data_path: PathBuf,
    identifier: Option<String>,
    short_identifier: Option<String>,
    pub images: Vec<SampleImage>,
    pub meta: MetaStorage,
}

impl SampleEvent {
    pub fn new(
        name: impl Into<String>,
        format: SampleFormat,
        data_path: impl Into<PathBuf>,
        created: DateTime<Local>,
    ) -> Self {
        Self {
            name: name.into(),
            created,
            format,
            data_path: data_path.into(),
            identifier: None,
            short_identifier: None,
            images: Vec::new(),
            meta: MetaStorage::new(),
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    pub fn short_identifier(&self) -> Option<&str> {
        self.short_identifier.as_deref()
    }

    /// Attach (or clear) the canonical identifier; the short form follows it
    pub fn set_identifier(&mut self, identifier: Option<String>) {
        self.short_identifier = identifier.as_deref().map(|id| identifier::short_form(id).to_string());
        self.identifier = identifier;
    }

    /// Recompute the short form after the event was read back from a record
    pub(crate) fn sync_short_identifier(&mut self) {
        let identifier = self.identifier.take();
        self.set_identifier(identifier);
    }

    pub fn add_image(&mut self, image: SampleImage) {
        self.images.push(image);
    }

    /// Paths of every owned image, in order
    pub fn file_list(&self) -> Vec<PathBuf> {
        self.images.iter().map(|img| img.path().to_path_buf()).collect()
    }

    /// Drop all in-memory pixel buffers
    pub fn unload_images(&mut self) {
        for image in &mut self.images {
            image.unload();
        }
    }

    /// Event metadata every sample starts with
    pub fn seed_metadata(&mut self, config: &AppConfig) {
        let basic = &config.basic;
        self.meta.add("Data owner", basic.copyright_owner.as_str());
        self.meta.add("Operator", basic.operator.as_str());
        self.meta.add("Free text", basic.free_text.as_str());
        self.meta.add("Timestamp", self.created.format(TIMESTAMP_OUTPUT_FORMAT).to_string());
        self.meta.add(
            "Program",
            format!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        );
    }

    /// Capture time encoded in the data directory name after `marker`
    pub fn original_timestamp(&self, marker: &str, format: &str) -> Option<NaiveDateTime> {
        let dir_name = self.data_path.file_name()?.to_string_lossy();
        let start = dir_name.find(marker)? + marker.len();
        NaiveDateTime::parse_and_remainder(&dir_name[start..], format)
            .map(|(timestamp, _)| timestamp)
            .ok()
    }

    /// Location of this sample's metadata record
    pub fn record_path(&self, extension: &str) -> PathBuf {
        self.data_path.join(format!("{}{}", self.name, extension))
    }
}

/// Builds a sample from the artifact a queue token points at
pub type SampleLoader = fn(&Path, &AppConfig) -> SampleResult<SampleEvent>;

/// Constructor for each supported layout
pub fn loader_for(format: SampleFormat) -> SampleLoader {
    match format {
        SampleFormat::SingleFile => load_single_file,
        SampleFormat::InsectLine | SampleFormat::PlantLine => load_line_directory,
    }
}

/// Build a sample from a queue token according to the configured layout.
///
/// Line layouts treat the token's directory as the sample; a token that is
/// itself a directory is accepted too.
pub fn load_sample(token: &Path, config: &AppConfig) -> SampleResult<SampleEvent> {
    let format = config.sampleformat.datatype_to_load;
    let artifact = if format.is_line() && !token.is_dir() {
        token
            .parent()
            .ok_or_else(|| SampleError::NotADirectory(token.to_path_buf()))?
    } else {
        token
    };
    let mut sample = loader_for(format)(artifact, config)?;
    sample.seed_metadata(config);
    Ok(sample)
}

fn load_single_file(path: &Path, config: &AppConfig) -> SampleResult<SampleEvent> {
    if !path.is_file() {
        return Err(SampleError::MissingFile(path.to_path_buf()));
    }
    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let data_path = path.parent().map(Path::to_path_buf).unwrap_or_default();

    let mut sample = SampleEvent::new(name, SampleFormat::SingleFile, data_path, modified_time(path));
    sample.add_image(SampleImage::new(
        ImageRole::Combined,
        config.sampleformat.camera_label.as_str(),
        path,
    ));
    Ok(sample)
}

fn load_line_directory(dir: &Path, config: &AppConfig) -> SampleResult<SampleEvent> {
    if !dir.is_dir() {
        return Err(SampleError::NotADirectory(dir.to_path_buf()));
    }
    let name = dir
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let format = config.sampleformat.datatype_to_load;
    let mut sample = SampleEvent::new(name, format, dir, modified_time(dir));

    for file in config.sampleformat.line_files() {
        let path = find_line_file(dir, &file)?;
        debug!("{}: found {:?}", sample.name, path);
        sample.add_image(SampleImage::new(file.role, file.camera.as_str(), path));
    }

    let carried = record::find_identifiers_in_records(dir, &config.basic.json_extension);
    match carried.as_slice() {
        [] => {}
        [identifier] => sample.set_identifier(Some(identifier.clone())),
        _ => warn!(
            "{}: existing records disagree on the identifier: {:?}",
            sample.name, carried
        ),
    }
    Ok(sample)
}

/// A line file under its plain name or already prefixed with an identifier
fn find_line_file(dir: &Path, file: &LineFile) -> SampleResult<PathBuf> {
    let plain = dir.join(&file.name);
    if plain.is_file() {
        return Ok(plain);
    }
    let suffix = format!("_{}", file.name);
    let entries = fs::read_dir(dir).map_err(|_| SampleError::NotADirectory(dir.to_path_buf()))?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|n| n.to_string_lossy().ends_with(&suffix))
                    .unwrap_or(false)
        })
        .ok_or(SampleError::MissingFile(plain))
}

fn modified_time(path: &Path) -> DateTime<Local> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn line_config(format: SampleFormat) -> AppConfig {
        let mut config = AppConfig::default();
        config.sampleformat.datatype_to_load = format;
        config.basic.operator = "A. Curator".to_string();
        config
    }

    fn touch(path: &Path) {
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_short_identifier_follows_identifier() {
        let mut sample = SampleEvent::new("s", SampleFormat::SingleFile, "/tmp", Local::now());
        assert!(sample.identifier().is_none());
        assert!(sample.short_identifier().is_none());

        sample.set_identifier(Some("http://id.example.org/AB.123".to_string()));
        assert_eq!(sample.short_identifier(), Some("AB.123"));

        sample.set_identifier(None);
        assert!(sample.short_identifier().is_none());
    }

    #[test]
    fn test_single_file_sample() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture_001.jpg");
        touch(&path);

        let sample = load_sample(&path, &AppConfig::default()).unwrap();
        assert_eq!(sample.name, "capture_001");
        assert_eq!(sample.data_path, dir.path());
        assert_eq!(sample.images.len(), 1);
        assert!(sample.images[0].has_labels() && sample.images[0].has_specimens());
        assert_eq!(sample.images[0].camera(), "generic_camera");
        assert_eq!(sample.record_path(".json"), dir.path().join("capture_001.json"));
    }

    #[test]
    fn test_insect_line_directory() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("dc1.2024-05-06_07-08-09");
        fs::create_dir(&dir).unwrap();
        touch(&dir.join("object.jpg"));
        touch(&dir.join("labels.jpg"));

        let config = line_config(SampleFormat::InsectLine);
        let sample = load_sample(&dir.join("labels.jpg"), &config).unwrap();

        assert_eq!(sample.name, "dc1.2024-05-06_07-08-09");
        assert_eq!(sample.images.len(), 2);
        assert!(sample.images[0].has_specimens() && !sample.images[0].has_labels());
        assert!(sample.images[1].has_labels());
        assert_eq!(sample.meta.get_str("Operator"), Some("A. Curator"));

        let timestamp = sample
            .original_timestamp(&config.sampleformat.timestamp_marker, &config.sampleformat.timestamp_format)
            .unwrap();
        assert_eq!(timestamp.format(TIMESTAMP_OUTPUT_FORMAT).to_string(), "2024-05-06 07:08:09");
    }

    #[test]
    fn test_missing_line_file_fails_locally() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("sample");
        fs::create_dir(&dir).unwrap();
        touch(&dir.join("labels.jpg"));

        let result = load_sample(&dir, &line_config(SampleFormat::InsectLine));
        match result {
            Err(err @ SampleError::MissingFile(_)) => assert!(err.is_recoverable()),
            other => panic!("Expected MissingFile, got {:?}", other.map(|s| s.name)),
        }
    }

    #[test]
    fn test_already_renamed_line_files_are_found() {
        let root = TempDir::new().unwrap();
        let dir = root.path().join("AB.123_sample");
        fs::create_dir(&dir).unwrap();
        touch(&dir.join("AB.123_sheet.jpg"));

        let sample = load_sample(&dir, &line_config(SampleFormat::PlantLine)).unwrap();
        assert_eq!(sample.images[0].path(), dir.join("AB.123_sheet.jpg"));
    }

    #[test]
    fn test_missing_timestamp_marker() {
        let sample = SampleEvent::new("s", SampleFormat::InsectLine, "/data/no_marker_here", Local::now());
        assert!(sample.original_timestamp("dc1.", "%Y-%m-%d_%H-%M-%S").is_none());
    }

    #[test]
    fn test_single_file_token_must_exist() {
        let result = load_sample(Path::new("/nonexistent/capture.jpg"), &AppConfig::default());
        assert!(matches!(result, Err(SampleError::MissingFile(_))));
    }
}

//! Metadata record files
//!
//! One pretty-printed JSON document per sample, holding the whole
//! [`SampleEvent`] except pixel buffers. Reading one back reconstructs the
//! same event.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{SampleError, SampleResult};
use crate::sample::SampleEvent;

/// Write the metadata record of `sample` to `{prefix}{extension}` in its
/// data directory. In-memory images are dropped first.
pub fn write_record(sample: &mut SampleEvent, extension: &str) -> SampleResult<PathBuf> {
    sample.unload_images();
    let path = sample.record_path(extension);
    let json = serde_json::to_string_pretty(sample).map_err(|source| SampleError::Metadata {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, json)?;
    info!("{}: metadata written to {:?}", sample.name, path);
    Ok(path)
}

/// Reconstruct a sample from its metadata record
pub fn read_record(path: &Path) -> SampleResult<SampleEvent> {
    let content = fs::read_to_string(path).map_err(|e| SampleError::file_loading(path, e))?;
    let mut sample: SampleEvent =
        serde_json::from_str(&content).map_err(|source| SampleError::Metadata {
            path: path.to_path_buf(),
            source,
        })?;
    sample.sync_short_identifier();
    Ok(sample)
}

/// Every metadata record in `dir`, sorted by file name. Files with the
/// extension that do not parse as a sample are skipped.
pub fn read_records_in(dir: &Path, extension: &str) -> Vec<(PathBuf, SampleEvent)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .map(|n| n.to_string_lossy().ends_with(extension))
                    .unwrap_or(false)
        })
        .collect();
    paths.sort();

    paths
        .into_iter()
        .filter_map(|path| match read_record(&path) {
            Ok(sample) => Some((path, sample)),
            Err(e) => {
                debug!("Skipping {:?}: {}", path, e);
                None
            }
        })
        .collect()
}

/// Distinct identifiers recorded by earlier runs over `dir`
pub fn find_identifiers_in_records(dir: &Path, extension: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (_, sample) in read_records_in(dir, extension) {
        if let Some(id) = sample.identifier() {
            if !found.iter().any(|f| f == id) {
                found.push(id.to_string());
            }
        }
    }
    found
}

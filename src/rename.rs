//! Embed the resolved identifier in on-disk names
//!
//! The in-memory sample is only updated after the filesystem rename has
//! gone through, so a failure anywhere leaves the sample pointing at where
//! its files actually are.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{SampleError, SampleResult};
use crate::sample::SampleEvent;

/// What happened to one path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed(PathBuf),
    /// Name already starts with the identifier
    AlreadyNamed,
    /// No identifier to rename by
    NoIdentifier,
}

/// `{short}_{name}`, unless `name` already carries the prefix
fn prefixed_name(short: &str, name: &str) -> Option<String> {
    let prefix = format!("{}_", short);
    if name.starts_with(&prefix) {
        None
    } else {
        Some(format!("{}{}", prefix, name))
    }
}

/// Rename refusing to replace an existing target
fn rename_path(from: &Path, to: &Path) -> SampleResult<()> {
    let refuse = |source: io::Error| SampleError::Rename {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    if to.exists() {
        return Err(refuse(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "target already exists",
        )));
    }
    fs::rename(from, to).map_err(refuse)
}

/// Move the sample directory to `base[/short]/{short}_{dirname}`.
///
/// Image paths under the old directory are moved along with it.
pub fn rename_directory(
    sample: &mut SampleEvent,
    base: &Path,
    subdirectory_per_sample: bool,
) -> SampleResult<RenameOutcome> {
    let Some(short) = sample.short_identifier().map(str::to_string) else {
        return Ok(RenameOutcome::NoIdentifier);
    };
    let old_dir = sample.data_path.clone();
    let dir_name = old_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| SampleError::NotADirectory(old_dir.clone()))?;

    let Some(new_name) = prefixed_name(&short, &dir_name) else {
        debug!("{}: directory already named after {}", sample.name, short);
        return Ok(RenameOutcome::AlreadyNamed);
    };

    let parent = if subdirectory_per_sample {
        base.join(&short)
    } else {
        base.to_path_buf()
    };
    if !parent.exists() {
        fs::create_dir_all(&parent)?;
    }
    let new_dir = parent.join(new_name);

    rename_path(&old_dir, &new_dir)?;
    info!("{}: directory renamed to {:?}", sample.name, new_dir);

    for image in &mut sample.images {
        if let Ok(relative) = image.path().strip_prefix(&old_dir) {
            let moved = new_dir.join(relative);
            image.set_path(moved);
        }
    }
    sample.data_path = new_dir.clone();
    Ok(RenameOutcome::Renamed(new_dir))
}

/// Prefix every image file with the short identifier.
///
/// Files are handled independently: a known failure on one is logged and
/// the rest are still renamed. Files renamed before a failure stay renamed.
pub fn rename_files(sample: &mut SampleEvent) -> SampleResult<Vec<RenameOutcome>> {
    let Some(short) = sample.short_identifier().map(str::to_string) else {
        return Ok(vec![RenameOutcome::NoIdentifier]);
    };

    let mut outcomes = Vec::with_capacity(sample.images.len());
    for image in &mut sample.images {
        let old_path = image.path().to_path_buf();
        let file_name = old_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let Some(new_name) = prefixed_name(&short, &file_name) else {
            outcomes.push(RenameOutcome::AlreadyNamed);
            continue;
        };
        let new_path = old_path.with_file_name(new_name);

        match rename_path(&old_path, &new_path) {
            Ok(()) => {
                debug!("{}: {:?} -> {:?}", sample.name, old_path, new_path);
                image.set_path(new_path.clone());
                outcomes.push(RenameOutcome::Renamed(new_path));
            }
            Err(e) if e.is_recoverable() => {
                warn!("{}: {}", sample.name, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SampleFormat;
    use crate::sample::{ImageRole, SampleImage};
    use chrono::Local;
    use tempfile::TempDir;

    fn line_sample(root: &Path, dir_name: &str, id: Option<&str>) -> SampleEvent {
        let dir = root.join(dir_name);
        fs::create_dir_all(&dir).unwrap();
        let mut sample = SampleEvent::new(dir_name, SampleFormat::InsectLine, &dir, Local::now());
        for (name, role) in [("object.jpg", ImageRole::Specimen), ("labels.jpg", ImageRole::Label)] {
            fs::write(dir.join(name), b"jpg").unwrap();
            sample.add_image(SampleImage::new(role, "cam", dir.join(name)));
        }
        sample.set_identifier(id.map(str::to_string));
        sample
    }

    #[test]
    fn test_directory_rename_moves_images_along() {
        let root = TempDir::new().unwrap();
        let mut sample = line_sample(root.path(), "dc1.x", Some("http://tun.fi/AB.123"));

        let outcome = rename_directory(&mut sample, root.path(), false).unwrap();
        let expected = root.path().join("AB.123_dc1.x");
        assert_eq!(outcome, RenameOutcome::Renamed(expected.clone()));
        assert_eq!(sample.data_path, expected);
        assert!(expected.is_dir());
        assert_eq!(sample.images[1].path(), expected.join("labels.jpg"));
        assert!(sample.images[1].path().is_file());
    }

    #[test]
    fn test_directory_rename_into_subdirectory() {
        let root = TempDir::new().unwrap();
        let base = root.path().join("archive");
        let mut sample = line_sample(root.path(), "dc1.x", Some("AB.123"));

        rename_directory(&mut sample, &base, true).unwrap();
        assert_eq!(sample.data_path, base.join("AB.123").join("AB.123_dc1.x"));
        assert!(sample.data_path.is_dir());
    }

    #[test]
    fn test_existing_target_is_refused_and_state_unchanged() {
        let root = TempDir::new().unwrap();
        let mut sample = line_sample(root.path(), "dc1.x", Some("AB.123"));
        fs::create_dir(root.path().join("AB.123_dc1.x")).unwrap();
        let before = sample.data_path.clone();

        let err = rename_directory(&mut sample, root.path(), false).unwrap_err();
        assert!(err.is_recoverable());
        assert_eq!(sample.data_path, before);
        assert!(before.is_dir());
    }

    #[test]
    fn test_no_identifier_means_no_rename() {
        let root = TempDir::new().unwrap();
        let mut sample = line_sample(root.path(), "dc1.x", None);
        assert_eq!(
            rename_directory(&mut sample, root.path(), false).unwrap(),
            RenameOutcome::NoIdentifier
        );
        assert_eq!(rename_files(&mut sample).unwrap(), vec![RenameOutcome::NoIdentifier]);
        assert!(root.path().join("dc1.x").join("object.jpg").is_file());
    }

    #[test]
    fn test_file_rename_and_second_pass() {
        let root = TempDir::new().unwrap();
        let mut sample = line_sample(root.path(), "dc1.x", Some("AB.123"));
        let dir = sample.data_path.clone();

        let outcomes = rename_files(&mut sample).unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(sample.images[0].path(), dir.join("AB.123_object.jpg"));
        assert!(dir.join("AB.123_labels.jpg").is_file());

        let again = rename_files(&mut sample).unwrap();
        assert_eq!(again, vec![RenameOutcome::AlreadyNamed, RenameOutcome::AlreadyNamed]);
        assert_eq!(sample.images[1].path(), dir.join("AB.123_labels.jpg"));
    }

    #[test]
    fn test_one_file_failure_does_not_block_others() {
        let root = TempDir::new().unwrap();
        let mut sample = line_sample(root.path(), "dc1.x", Some("AB.123"));
        let dir = sample.data_path.clone();
        fs::remove_file(dir.join("object.jpg")).unwrap();

        let outcomes = rename_files(&mut sample).unwrap();
        assert_eq!(outcomes, vec![RenameOutcome::Renamed(dir.join("AB.123_labels.jpg"))]);
        assert_eq!(sample.images[0].path(), dir.join("object.jpg"));
    }
}

//! Storage Layer
//!
//! Per-sample metadata records, the digitization properties sidecar, the
//! shared output table, and the platform config location.

pub mod properties;
pub mod record;
pub mod table;

use anyhow::Result;
use std::path::PathBuf;

/// File name of the site configuration in the platform config directory
pub const CONFIG_FILE_NAME: &str = "postprocessor.toml";

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let proj_dirs = directories::ProjectDirs::from("fi", "luomus", "SpecimenPostprocessor")
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

    Ok(proj_dirs.config_dir().to_path_buf())
}

/// Platform config file, if one has been installed
pub fn find_default_config() -> Option<PathBuf> {
    let path = get_config_dir().ok()?.join(CONFIG_FILE_NAME);
    path.is_file().then_some(path)
}

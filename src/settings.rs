//! Persistent user settings, stored as a JSON file.

use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::scratch::write_atomic;

/// Name of the settings file when no explicit path is given.
pub const DEFAULT_SETTINGS_FILE: &str = "bundlemaster.settings.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Whether patched bundles are recompressed with LZMA.
    pub compress_bundles: bool,

    /// Whether `patch` falls back to the last generated remap table when no
    /// table is given.
    pub load_last_remap_on_start: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remap_reference_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remap_modified_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_remap_output_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_bundle_path: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            compress_bundles: true,
            load_last_remap_on_start: true,
            last_remap_reference_path: None,
            last_remap_modified_path: None,
            last_remap_output_path: None,
            last_bundle_path: None,
            last_output_path: None,
        }
    }
}

impl Settings {
    /// Loads settings from `path`.
    ///
    /// A missing file yields the defaults. So does a file that cannot be
    /// parsed, after logging a warning.
    pub fn load(path: &Path) -> io::Result<Self> {
        let contents = match fs_err::read(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                log::debug!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(err) => return Err(err),
        };

        match serde_json::from_slice(&contents) {
            Ok(settings) => Ok(settings),
            Err(err) => {
                log::warn!(
                    "Settings file {} is malformed, using defaults: {}",
                    path.display(),
                    err
                );
                Ok(Self::default())
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)?;
            }
        }

        let contents = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &contents)
    }
}

//! The remap table: the persisted correspondence between a modified build's
//! identifiers and a reference build's identifiers.

mod cab_map;

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use bundle_codec::PathId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    path_serializer,
    scratch::{is_transient_lock, write_atomic, RetryPolicy},
};

pub use cab_map::CabMap;

/// How loading a table that another process may still hold is retried.
pub const RELOAD_RETRY: RetryPolicy = RetryPolicy {
    retries: 5,
    delay: Duration::from_millis(100),
};

/// One matched asset: the same name and type on both sides.
///
/// Older tables used PascalCase field names, which are still accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRemap {
    #[serde(alias = "AssetName")]
    pub name: String,

    #[serde(rename = "type", alias = "AssetType")]
    pub type_name: String,

    #[serde(alias = "OldPathId")]
    pub old_identifier: PathId,

    #[serde(alias = "NewPathId")]
    pub new_identifier: PathId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleRemapEntry {
    /// Path of the bundle relative to the roots it was generated from.
    #[serde(
        alias = "OriginalBundlePath",
        serialize_with = "path_serializer::serialize_relative"
    )]
    pub relative_path: PathBuf,

    #[serde(alias = "OldCabId")]
    pub old_container_id: String,

    #[serde(alias = "NewCabId")]
    pub new_container_id: String,

    #[serde(alias = "AssetRemaps")]
    pub asset_remaps: Vec<AssetRemap>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemapTable {
    pub entries: Vec<BundleRemapEntry>,
}

#[derive(Debug, Error)]
pub enum RemapTableError {
    #[error("could not read remap table at {}", .path.display())]
    Read { source: io::Error, path: PathBuf },

    #[error("malformed remap table at {}", .path.display())]
    Malformed {
        source: serde_json::Error,
        path: PathBuf,
    },

    #[error("could not write remap table to {}", .path.display())]
    Write { source: io::Error, path: PathBuf },
}

impl RemapTableError {
    fn read(source: io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Read {
            source,
            path: path.into(),
        }
    }

    fn malformed(source: serde_json::Error, path: impl Into<PathBuf>) -> Self {
        Self::Malformed {
            source,
            path: path.into(),
        }
    }

    fn write(source: io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Write {
            source,
            path: path.into(),
        }
    }
}

/// Old-to-new identifier mapping, collapsed across every bundle in a table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMap {
    identifiers: HashMap<PathId, PathId>,
}

impl PathMap {
    pub fn get(&self, old: PathId) -> Option<PathId> {
        self.identifiers.get(&old).copied()
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

impl RemapTable {
    pub fn new(entries: Vec<BundleRemapEntry>) -> Self {
        Self { entries }
    }

    pub fn from_slice(contents: &[u8], path: &Path) -> Result<Self, RemapTableError> {
        serde_json::from_slice(contents).map_err(|source| RemapTableError::malformed(source, path))
    }

    /// Loads a table, retrying while the file appears to be locked by
    /// someone else.
    pub fn load(path: &Path) -> Result<Self, RemapTableError> {
        Self::load_with(path, RELOAD_RETRY)
    }

    pub fn load_with(path: &Path, retry: RetryPolicy) -> Result<Self, RemapTableError> {
        log::debug!("Loading remap table from {}", path.display());

        let contents = retry
            .run(|| fs_err::read(path), is_transient_lock)
            .map_err(|source| RemapTableError::read(source, path))?;

        Self::from_slice(&contents, path)
    }

    /// Writes the table as pretty-printed JSON. The file at `path` is either
    /// fully replaced or left untouched.
    pub fn save(&self, path: &Path) -> Result<(), RemapTableError> {
        let contents = serde_json::to_vec_pretty(self)
            .map_err(|source| RemapTableError::write(source.into(), path))?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs_err::create_dir_all(parent)
                    .map_err(|source| RemapTableError::write(source, path))?;
            }
        }

        write_atomic(path, &contents).map_err(|source| RemapTableError::write(source, path))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of asset remaps across every entry.
    pub fn asset_remap_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| entry.asset_remaps.len())
            .sum()
    }

    pub fn cab_map(&self) -> Result<CabMap, aho_corasick::BuildError> {
        CabMap::new(self.entries.iter().map(|entry| {
            (
                entry.old_container_id.as_str(),
                entry.new_container_id.as_str(),
            )
        }))
    }

    /// Identifiers are only unique within one bundle, but the map is keyed
    /// across the whole table. The first mapping seen for an identifier wins.
    pub fn path_map(&self) -> PathMap {
        let mut identifiers = HashMap::new();

        for remap in self.entries.iter().flat_map(|entry| &entry.asset_remaps) {
            identifiers
                .entry(remap.old_identifier)
                .or_insert(remap.new_identifier);
        }

        PathMap { identifiers }
    }
}

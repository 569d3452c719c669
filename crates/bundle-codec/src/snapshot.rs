use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{document, Compression, CodecError, FieldNode, PathId};

/// A complete, in-memory description of a bundle's contents.
///
/// This is the model that [`DocumentCodec`](crate::DocumentCodec) stores on
/// disk. Snapshots are also the easiest way to build fixture bundles and to
/// inspect what a bundle looks like after it has been patched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BundleSnapshot {
    pub entries: Vec<EntrySnapshot>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EntrySnapshot {
    Serialized {
        name: String,
        #[serde(default)]
        externals: Vec<String>,
        objects: Vec<ObjectSnapshot>,
    },
    Resource {
        name: String,
        data: Vec<u8>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSnapshot {
    pub path_id: PathId,
    pub class_id: i32,
    pub tree: FieldNode,
}

impl ObjectSnapshot {
    pub fn new(path_id: PathId, class_id: i32, tree: FieldNode) -> Self {
        Self {
            path_id,
            class_id,
            tree,
        }
    }
}

impl EntrySnapshot {
    pub fn name(&self) -> &str {
        match self {
            EntrySnapshot::Serialized { name, .. } | EntrySnapshot::Resource { name, .. } => name,
        }
    }
}

impl BundleSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets_file<S: Into<String>>(
        mut self,
        name: S,
        externals: Vec<String>,
        objects: Vec<ObjectSnapshot>,
    ) -> Self {
        self.entries.push(EntrySnapshot::Serialized {
            name: name.into(),
            externals,
            objects,
        });
        self
    }

    pub fn with_resource<S: Into<String>>(mut self, name: S, data: Vec<u8>) -> Self {
        self.entries.push(EntrySnapshot::Resource {
            name: name.into(),
            data,
        });
        self
    }

    /// Reads back a bundle written by [`DocumentCodec`](crate::DocumentCodec),
    /// compressed or not.
    pub fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let contents = fs_err::read(path)?;
        let (_, snapshot) = document::decode(&contents, path)?;

        Ok(snapshot)
    }

    pub fn to_bytes(&self, compression: Compression) -> io::Result<Vec<u8>> {
        let mut bytes = Vec::new();
        document::encode(self, compression, &mut bytes)?;

        Ok(bytes)
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P, compression: Compression) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        fs_err::write(path, self.to_bytes(compression)?)
    }

    /// Finds an object by path id across every serialized entry.
    pub fn object(&self, path_id: PathId) -> Option<&ObjectSnapshot> {
        self.entries.iter().find_map(|entry| match entry {
            EntrySnapshot::Serialized { objects, .. } => {
                objects.iter().find(|object| object.path_id == path_id)
            }
            EntrySnapshot::Resource { .. } => None,
        })
    }

    /// The externals of the first entry, which is the one that gets patched.
    pub fn externals(&self) -> &[String] {
        match self.entries.first() {
            Some(EntrySnapshot::Serialized { externals, .. }) => externals,
            _ => &[],
        }
    }
}

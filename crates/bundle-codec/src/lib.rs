/*!
Interface to Unity asset bundle containers, as consumed by BundleMaster.

A bundle is a container file holding one or more entries. Serialized entries
are object sets: a list of objects, each identified by a path id, plus the
list of external files those objects may point into. Every object's payload
can be decoded into a [`FieldNode`] tree and encoded back to bytes.

bundle-codec does not decode the native UnityFS block format itself. Codecs
implement [`BundleCodec`]; this crate ships [`DocumentCodec`], which stores
the same model as a JSON document behind a UnityFS signature, and is used for
fixtures and testing.
*/

mod document;
mod field;
mod snapshot;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use document::{DocumentBundle, DocumentCodec};
pub use field::{
    FieldNode, FieldValue, Primitive, ValueKind, FILE_ID_FIELD, PATH_ID_FIELD,
};
pub use snapshot::{BundleSnapshot, EntrySnapshot, ObjectSnapshot};

/// Identifies one object within a single serialized object set.
pub type PathId = i64;

/// Leading bytes of the bundle container formats that can be recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signature {
    UnityFs,
    UnityWeb,
    UnityRaw,
}

impl Signature {
    /// The shortest signature is 7 bytes long; shorter files are never
    /// bundles.
    pub const MIN_LEN: usize = 7;

    pub fn from_bytes(bytes: &[u8]) -> Option<Signature> {
        if bytes.starts_with(b"UnityFS") {
            Some(Signature::UnityFs)
        } else if bytes.starts_with(b"UnityWeb") {
            Some(Signature::UnityWeb)
        } else if bytes.starts_with(b"UnityRaw") {
            Some(Signature::UnityRaw)
        } else {
            None
        }
    }
}

/// Sniffs the signature at the start of the file at `path`.
///
/// Returns `Ok(None)` for files that are not bundles, including files too
/// short to hold a signature.
pub fn read_signature(path: &Path) -> io::Result<Option<Signature>> {
    let file = fs_err::File::open(path)?;
    let mut header = Vec::with_capacity(8);
    file.take(8).read_to_end(&mut header)?;

    if header.len() < Signature::MIN_LEN {
        return Ok(None);
    }

    Ok(Signature::from_bytes(&header))
}

/// Compression applied to a container when packing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Lzma,
}

/// One serialized object set, loaded out of a bundle entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetsFile {
    /// The entry's name inside the container, usually `CAB-<hash>`.
    pub name: String,

    /// Path names of the external files this object set depends on.
    pub externals: Vec<String>,

    pub objects: Vec<ObjectInfo>,
}

/// One serialized object: its identity plus its encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub path_id: PathId,
    pub class_id: i32,
    pub data: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{} is not a bundle file", .path.display())]
    NotABundle { path: PathBuf },

    #[error("{} uses an unsupported bundle layout", .path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("bundle has no entry at index {index}")]
    MissingEntry { index: usize },

    #[error("bundle entry {index} is not a serialized object set")]
    NotAnAssetsFile { index: usize },

    #[error("malformed bundle contents in {}", .path.display())]
    MalformedBundle {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("object {path_id} has a malformed field tree")]
    MalformedTree {
        path_id: PathId,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error(transparent)]
    Io {
        #[from]
        source: io::Error,
    },
}

/// A bundle container format.
///
/// Codec instances may cache state between calls and are not shared between
/// threads: each unit of work creates its own. Bundles handed out by `open`
/// must be given back to `unload`; [`OpenBundle`] does this automatically.
pub trait BundleCodec {
    type Bundle;

    fn open(&mut self, path: &Path) -> Result<Self::Bundle, CodecError>;

    /// Names of the container's entries, in directory order.
    fn entry_names(&self, bundle: &Self::Bundle) -> Vec<String>;

    /// Loads the entry at `index` as an object set, or `Ok(None)` if that
    /// entry holds something else, like a resource blob.
    fn load_assets_file(
        &mut self,
        bundle: &Self::Bundle,
        index: usize,
    ) -> Result<Option<AssetsFile>, CodecError>;

    fn read_tree(
        &mut self,
        bundle: &Self::Bundle,
        object: &ObjectInfo,
    ) -> Result<FieldNode, CodecError>;

    fn write_tree(&mut self, bundle: &Self::Bundle, tree: &FieldNode)
        -> Result<Vec<u8>, CodecError>;

    /// Stores a modified object set back into the entry at `index`.
    fn replace_assets_file(
        &mut self,
        bundle: &mut Self::Bundle,
        index: usize,
        file: AssetsFile,
    ) -> Result<(), CodecError>;

    /// Serializes the whole container without compression.
    fn write(&mut self, bundle: &Self::Bundle, writer: &mut dyn Write) -> Result<(), CodecError>;

    /// Reads the container at `source` and writes it again using the given
    /// compression.
    fn pack(
        &mut self,
        source: &Path,
        writer: &mut dyn Write,
        compression: Compression,
    ) -> Result<(), CodecError>;

    /// Releases everything held for `bundle`. The bundle must not be used
    /// afterwards.
    fn unload(&mut self, bundle: &mut Self::Bundle);
}

/// A bundle opened through a codec, unloaded when dropped.
pub struct OpenBundle<'a, C: BundleCodec> {
    codec: &'a mut C,
    bundle: C::Bundle,
    path: PathBuf,
}

impl<'a, C: BundleCodec> OpenBundle<'a, C> {
    pub fn open(codec: &'a mut C, path: &Path) -> Result<Self, CodecError> {
        log::trace!("Opening bundle {}", path.display());
        let bundle = codec.open(path)?;

        Ok(Self {
            codec,
            bundle,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_names(&self) -> Vec<String> {
        self.codec.entry_names(&self.bundle)
    }

    pub fn load_assets_file(&mut self, index: usize) -> Result<Option<AssetsFile>, CodecError> {
        self.codec.load_assets_file(&self.bundle, index)
    }

    pub fn read_tree(&mut self, object: &ObjectInfo) -> Result<FieldNode, CodecError> {
        self.codec.read_tree(&self.bundle, object)
    }

    pub fn write_tree(&mut self, tree: &FieldNode) -> Result<Vec<u8>, CodecError> {
        self.codec.write_tree(&self.bundle, tree)
    }

    pub fn replace_assets_file(
        &mut self,
        index: usize,
        file: AssetsFile,
    ) -> Result<(), CodecError> {
        self.codec.replace_assets_file(&mut self.bundle, index, file)
    }

    pub fn write(&mut self, writer: &mut dyn Write) -> Result<(), CodecError> {
        self.codec.write(&self.bundle, writer)
    }

    /// Unloads the bundle now rather than at the end of the scope.
    pub fn close(self) {}
}

impl<C: BundleCodec> Drop for OpenBundle<'_, C> {
    fn drop(&mut self) {
        log::trace!("Unloading bundle {}", self.path.display());
        self.codec.unload(&mut self.bundle);
    }
}

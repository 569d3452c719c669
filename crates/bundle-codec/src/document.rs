//! A bundle layout that stores the container as a JSON document.
//!
//! Layout: the 8 byte `UnityFS\0` signature, the 4 byte format tag `DOC1`, one
//! compression byte (0 for none, 1 for LZMA), then the JSON encoding of a
//! [`BundleSnapshot`], xz-compressed when the compression byte says so.

use std::io::{self, Read, Write};
use std::path::Path;

use xz2::{read::XzDecoder, write::XzEncoder};

use crate::{
    AssetsFile, BundleCodec, BundleSnapshot, CodecError, Compression, EntrySnapshot, FieldNode,
    ObjectInfo, ObjectSnapshot,
};

const MAGIC: &[u8; 8] = b"UnityFS\0";
const FORMAT_TAG: &[u8; 4] = b"DOC1";
const HEADER_LEN: usize = MAGIC.len() + FORMAT_TAG.len() + 1;
const LZMA_PRESET: u32 = 6;

pub(crate) fn encode<W: Write>(
    snapshot: &BundleSnapshot,
    compression: Compression,
    mut writer: W,
) -> io::Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(FORMAT_TAG)?;

    let payload = serde_json::to_vec(snapshot)?;

    match compression {
        Compression::None => {
            writer.write_all(&[0])?;
            writer.write_all(&payload)?;
        }
        Compression::Lzma => {
            writer.write_all(&[1])?;
            let mut encoder = XzEncoder::new(writer, LZMA_PRESET);
            encoder.write_all(&payload)?;
            encoder.finish()?;
        }
    }

    Ok(())
}

pub(crate) fn decode(
    contents: &[u8],
    path: &Path,
) -> Result<(Compression, BundleSnapshot), CodecError> {
    if !contents.starts_with(MAGIC) {
        return Err(CodecError::NotABundle {
            path: path.to_path_buf(),
        });
    }

    if contents.len() < HEADER_LEN || &contents[MAGIC.len()..HEADER_LEN - 1] != FORMAT_TAG {
        return Err(CodecError::UnsupportedFormat {
            path: path.to_path_buf(),
        });
    }

    let payload = &contents[HEADER_LEN..];
    let malformed = |source| CodecError::MalformedBundle {
        path: path.to_path_buf(),
        source,
    };

    match contents[HEADER_LEN - 1] {
        0 => {
            let snapshot = serde_json::from_slice(payload).map_err(malformed)?;
            Ok((Compression::None, snapshot))
        }
        1 => {
            let mut decompressed = Vec::new();
            XzDecoder::new(payload).read_to_end(&mut decompressed)?;

            let snapshot = serde_json::from_slice(&decompressed).map_err(malformed)?;
            Ok((Compression::Lzma, snapshot))
        }
        _ => Err(CodecError::UnsupportedFormat {
            path: path.to_path_buf(),
        }),
    }
}

/// Codec for bundles stored as JSON documents.
#[derive(Debug, Default, Clone)]
pub struct DocumentCodec {
    _private: (),
}

/// A bundle opened by [`DocumentCodec`].
#[derive(Debug)]
pub struct DocumentBundle {
    snapshot: BundleSnapshot,
}

impl DocumentCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

fn tree_from_bytes(object: &ObjectInfo) -> Result<FieldNode, CodecError> {
    serde_json::from_slice(&object.data).map_err(|source| CodecError::MalformedTree {
        path_id: object.path_id,
        source: Box::new(source),
    })
}

impl BundleCodec for DocumentCodec {
    type Bundle = DocumentBundle;

    fn open(&mut self, path: &Path) -> Result<DocumentBundle, CodecError> {
        let contents = fs_err::read(path)?;
        let (_, snapshot) = decode(&contents, path)?;

        Ok(DocumentBundle { snapshot })
    }

    fn entry_names(&self, bundle: &DocumentBundle) -> Vec<String> {
        bundle
            .snapshot
            .entries
            .iter()
            .map(|entry| entry.name().to_owned())
            .collect()
    }

    fn load_assets_file(
        &mut self,
        bundle: &DocumentBundle,
        index: usize,
    ) -> Result<Option<AssetsFile>, CodecError> {
        match bundle.snapshot.entries.get(index) {
            Some(EntrySnapshot::Serialized {
                name,
                externals,
                objects,
            }) => {
                let objects = objects
                    .iter()
                    .map(|object| -> Result<ObjectInfo, CodecError> {
                        Ok(ObjectInfo {
                            path_id: object.path_id,
                            class_id: object.class_id,
                            data: serde_json::to_vec(&object.tree).map_err(io::Error::from)?,
                        })
                    })
                    .collect::<Result<Vec<_>, CodecError>>()?;

                Ok(Some(AssetsFile {
                    name: name.clone(),
                    externals: externals.clone(),
                    objects,
                }))
            }
            Some(EntrySnapshot::Resource { .. }) => Ok(None),
            None => Err(CodecError::MissingEntry { index }),
        }
    }

    fn read_tree(
        &mut self,
        _bundle: &DocumentBundle,
        object: &ObjectInfo,
    ) -> Result<FieldNode, CodecError> {
        tree_from_bytes(object)
    }

    fn write_tree(
        &mut self,
        _bundle: &DocumentBundle,
        tree: &FieldNode,
    ) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(tree).map_err(io::Error::from)?)
    }

    fn replace_assets_file(
        &mut self,
        bundle: &mut DocumentBundle,
        index: usize,
        file: AssetsFile,
    ) -> Result<(), CodecError> {
        let objects = file
            .objects
            .iter()
            .map(|object| -> Result<ObjectSnapshot, CodecError> {
                Ok(ObjectSnapshot {
                    path_id: object.path_id,
                    class_id: object.class_id,
                    tree: tree_from_bytes(object)?,
                })
            })
            .collect::<Result<Vec<_>, CodecError>>()?;

        match bundle.snapshot.entries.get_mut(index) {
            Some(entry @ EntrySnapshot::Serialized { .. }) => {
                *entry = EntrySnapshot::Serialized {
                    name: file.name,
                    externals: file.externals,
                    objects,
                };
                Ok(())
            }
            Some(EntrySnapshot::Resource { .. }) => Err(CodecError::NotAnAssetsFile { index }),
            None => Err(CodecError::MissingEntry { index }),
        }
    }

    fn write(&mut self, bundle: &DocumentBundle, writer: &mut dyn Write) -> Result<(), CodecError> {
        encode(&bundle.snapshot, Compression::None, writer)?;
        Ok(())
    }

    fn pack(
        &mut self,
        source: &Path,
        writer: &mut dyn Write,
        compression: Compression,
    ) -> Result<(), CodecError> {
        let contents = fs_err::read(source)?;
        let (_, snapshot) = decode(&contents, source)?;

        encode(&snapshot, compression, writer)?;
        Ok(())
    }

    fn unload(&mut self, bundle: &mut DocumentBundle) {
        bundle.snapshot.entries = Vec::new();
    }
}

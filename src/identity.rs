//! Extracts the identity of every object in a bundle: its identifier, its
//! display name and its type label.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
};

use bundle_codec::{
    read_signature, BundleCodec, CodecError, FieldNode, FieldValue, OpenBundle, PathId, Primitive,
    Signature, ValueKind,
};
use serde::Serialize;
use thiserror::Error;

/// Container id reported for files that are not bundles.
pub const INVALID_CONTAINER_ID: &str = "invalid";

/// Name used when an object has no `m_Name`.
pub const UNNAMED: &str = "unnamed";

/// Name used when a shader's parsed form has no `m_Name`.
pub const UNNAMED_SHADER: &str = "unnamed_shader";

/// Name used when an object's name could not be read.
pub const ERROR_GETTING_NAME: &str = "error_getting_name";

const SHADER_TYPE: &str = "Shader";
const NAME_FIELD: &str = "m_Name";
const PARSED_FORM_FIELD: &str = "m_ParsedForm";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetIdentity {
    pub identifier: PathId,
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,
}

impl AssetIdentity {
    /// Whether this identity can take part in matching: it has a non-zero
    /// identifier and a real name.
    pub fn is_eligible(&self) -> bool {
        self.identifier != 0 && is_real_name(&self.name)
    }
}

/// Whether `name` is neither blank nor one of the placeholder names.
pub fn is_real_name(name: &str) -> bool {
    !name.trim().is_empty() && ![UNNAMED, UNNAMED_SHADER, ERROR_GETTING_NAME].contains(&name)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleIdentity {
    pub container_id: String,
    pub assets: Vec<AssetIdentity>,
}

impl BundleIdentity {
    /// The identity reported for files that don't carry a bundle signature.
    pub fn invalid() -> Self {
        Self {
            container_id: INVALID_CONTAINER_ID.to_owned(),
            assets: Vec::new(),
        }
    }

    pub fn eligible_assets(&self) -> impl Iterator<Item = &AssetIdentity> {
        self.assets.iter().filter(|asset| asset.is_eligible())
    }
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("could not read {}", .path.display())]
    Io { source: io::Error, path: PathBuf },

    #[error("could not read bundle {}", .path.display())]
    Codec { source: CodecError, path: PathBuf },

    #[error("bundle {} has no entries", .path.display())]
    NoEntries { path: PathBuf },
}

impl IdentityError {
    fn io(source: io::Error, path: impl Into<PathBuf>) -> Self {
        Self::Io {
            source,
            path: path.into(),
        }
    }

    fn codec(source: CodecError, path: impl Into<PathBuf>) -> Self {
        Self::Codec {
            source,
            path: path.into(),
        }
    }
}

/// Memoizes the label derived from a (declared type, value kind) pair.
#[derive(Debug, Default)]
pub struct TypeLabelCache {
    labels: HashMap<(String, ValueKind), String>,
}

impl TypeLabelCache {
    /// The declared type name if there is one, otherwise the value kind.
    pub fn label(&mut self, node: &FieldNode) -> String {
        let kind = node.value_kind();

        self.labels
            .entry((node.type_name.clone(), kind))
            .or_insert_with(|| {
                if node.type_name.is_empty() {
                    kind.to_string()
                } else {
                    node.type_name.clone()
                }
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Reads identities out of bundles using one codec instance.
///
/// Extractors are not shared between threads; each worker creates its own.
pub struct IdentityExtractor<C> {
    codec: C,
    type_labels: TypeLabelCache,
}

impl<C: BundleCodec> IdentityExtractor<C> {
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            type_labels: TypeLabelCache::default(),
        }
    }

    /// Extracts the identity of the bundle at `path`.
    ///
    /// Files without a `UnityFS` signature are not an error; they produce
    /// [`BundleIdentity::invalid`]. Objects whose trees can't be read are
    /// kept, named [`ERROR_GETTING_NAME`].
    pub fn extract(&mut self, path: &Path) -> Result<BundleIdentity, IdentityError> {
        match read_signature(path).map_err(|source| IdentityError::io(source, path))? {
            Some(Signature::UnityFs) => {}
            _ => {
                log::debug!("{} is not a UnityFS bundle", path.display());
                return Ok(BundleIdentity::invalid());
            }
        }

        let mut bundle = OpenBundle::open(&mut self.codec, path)
            .map_err(|source| IdentityError::codec(source, path))?;

        let entry_names = bundle.entry_names();
        let container_id = match entry_names.first() {
            Some(name) => name.clone(),
            None => {
                return Err(IdentityError::NoEntries {
                    path: path.to_path_buf(),
                })
            }
        };

        let mut assets = Vec::new();

        for index in 0..entry_names.len() {
            let file = match bundle
                .load_assets_file(index)
                .map_err(|source| IdentityError::codec(source, path))?
            {
                Some(file) => file,
                None => continue,
            };

            for object in &file.objects {
                let (name, type_name) = match bundle.read_tree(object) {
                    Ok(tree) => {
                        let type_name = self.type_labels.label(&tree);
                        (display_name(&tree, &type_name), type_name)
                    }
                    Err(err) => {
                        log::debug!(
                            "Could not read object {} in {}: {}",
                            object.path_id,
                            path.display(),
                            err
                        );
                        (ERROR_GETTING_NAME.to_owned(), ValueKind::None.to_string())
                    }
                };

                assets.push(AssetIdentity {
                    identifier: object.path_id,
                    name,
                    type_name,
                });
            }
        }

        bundle.close();

        Ok(BundleIdentity {
            container_id,
            assets,
        })
    }
}

#[derive(Debug)]
struct WrongKind;

/// Reads a string field, or `Ok(None)` if there is no such field.
fn read_string(node: &FieldNode, name: &str) -> Result<Option<String>, WrongKind> {
    match node.get(name) {
        None => Ok(None),
        Some(field) => match &field.value {
            FieldValue::Primitive(Primitive::String(value)) => Ok(Some(value.clone())),
            _ => Err(WrongKind),
        },
    }
}

fn display_name(tree: &FieldNode, type_name: &str) -> String {
    let parsed_form = match type_name {
        SHADER_TYPE => tree.get(PARSED_FORM_FIELD),
        _ => None,
    };

    let name = match parsed_form {
        Some(parsed_form) => read_string(parsed_form, NAME_FIELD)
            .map(|name| name.unwrap_or_else(|| UNNAMED_SHADER.to_owned())),
        None => read_string(tree, NAME_FIELD).map(|name| name.unwrap_or_else(|| UNNAMED.to_owned())),
    };

    name.unwrap_or_else(|_| ERROR_GETTING_NAME.to_owned())
}

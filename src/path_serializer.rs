//! Serializes relative paths in a cross-platform way, by replacing all
//! directory separators with /.

use std::path::Path;

use serde::{ser::Error, Serializer};

pub fn serialize_relative<S, T>(path: T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: AsRef<Path>,
{
    let path = path.as_ref();
    let as_str = path
        .to_str()
        .ok_or_else(|| S::Error::custom(format!("path {} is not valid Unicode", path.display())))?;

    serializer.serialize_str(&to_slash(as_str))
}

/// Converts the separators of a path string to /.
pub fn to_slash(path: &str) -> String {
    path.replace('\\', "/")
}

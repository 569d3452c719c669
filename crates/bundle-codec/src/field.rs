use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Name of the file index half of a foreign-file reference.
pub const FILE_ID_FIELD: &str = "m_FileID";

/// Name of the identifier half of a foreign-file reference.
pub const PATH_ID_FIELD: &str = "m_PathID";

/// One node of an object's field tree.
///
/// The root node of an object carries the object's class name as its
/// `type_name`, so `Mesh` objects have a root whose type is `"Mesh"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldNode {
    pub name: String,

    #[serde(rename = "type")]
    pub type_name: String,

    pub value: FieldValue,
}

/// Either a leaf value or an ordered list of child fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Composite(Vec<FieldNode>),
    Primitive(Primitive),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Bool(bool),
    Int(i64),
    UInt(u64),
    #[serde(with = "float_repr")]
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
}

/// JSON has no representation for non-finite numbers, so those are written
/// as the strings `"Infinity"`, `"-Infinity"` and `"NaN"`.
mod float_repr {
    use super::*;

    use serde::de::Error;

    const INFINITY: &str = "Infinity";
    const NEG_INFINITY: &str = "-Infinity";
    const NAN: &str = "NaN";

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str(NAN)
        } else if value.is_sign_positive() {
            serializer.serialize_str(INFINITY)
        } else {
            serializer.serialize_str(NEG_INFINITY)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => match text.as_str() {
                INFINITY => Ok(f64::INFINITY),
                NEG_INFINITY => Ok(f64::NEG_INFINITY),
                NAN => Ok(f64::NAN),
                _ => Err(D::Error::custom(format!("invalid float {:?}", text))),
            },
        }
    }
}

/// The value-kind tag of a node, independent of its declared type name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    None,
    Array,
    Bool,
    Int,
    UInt,
    Float,
    String,
    ByteArray,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ValueKind::None => "None",
            ValueKind::Array => "Array",
            ValueKind::Bool => "Bool",
            ValueKind::Int => "Int64",
            ValueKind::UInt => "UInt64",
            ValueKind::Float => "Double",
            ValueKind::String => "String",
            ValueKind::ByteArray => "ByteArray",
        };

        formatter.write_str(name)
    }
}

impl FieldNode {
    pub fn composite<N, T>(name: N, type_name: T, children: Vec<FieldNode>) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: FieldValue::Composite(children),
        }
    }

    pub fn primitive<N, T>(name: N, type_name: T, value: Primitive) -> Self
    where
        N: Into<String>,
        T: Into<String>,
    {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            value: FieldValue::Primitive(value),
        }
    }

    pub fn string<N: Into<String>, V: Into<String>>(name: N, value: V) -> Self {
        Self::primitive(name, "string", Primitive::String(value.into()))
    }

    pub fn int<N: Into<String>>(name: N, value: i64) -> Self {
        Self::primitive(name, "SInt64", Primitive::Int(value))
    }

    /// Builds a `PPtr`-shaped node: exactly `m_FileID` followed by
    /// `m_PathID`.
    pub fn pointer<N: Into<String>>(name: N, file_id: i64, path_id: i64) -> Self {
        Self::composite(
            name,
            "PPtr<Object>",
            vec![
                Self::primitive(FILE_ID_FIELD, "int", Primitive::Int(file_id)),
                Self::primitive(PATH_ID_FIELD, "SInt64", Primitive::Int(path_id)),
            ],
        )
    }

    pub fn value_kind(&self) -> ValueKind {
        match &self.value {
            FieldValue::Composite(_) if self.type_name == "Array" => ValueKind::Array,
            FieldValue::Composite(_) => ValueKind::None,
            FieldValue::Primitive(Primitive::Bool(_)) => ValueKind::Bool,
            FieldValue::Primitive(Primitive::Int(_)) => ValueKind::Int,
            FieldValue::Primitive(Primitive::UInt(_)) => ValueKind::UInt,
            FieldValue::Primitive(Primitive::Float(_)) => ValueKind::Float,
            FieldValue::Primitive(Primitive::String(_)) => ValueKind::String,
            FieldValue::Primitive(Primitive::Bytes(_)) => ValueKind::ByteArray,
        }
    }

    pub fn children(&self) -> &[FieldNode] {
        match &self.value {
            FieldValue::Composite(children) => children,
            FieldValue::Primitive(_) => &[],
        }
    }

    pub fn children_mut(&mut self) -> &mut [FieldNode] {
        match &mut self.value {
            FieldValue::Composite(children) => children,
            FieldValue::Primitive(_) => &mut [],
        }
    }

    /// Finds the first direct child with the given name.
    pub fn get(&self, name: &str) -> Option<&FieldNode> {
        self.children().iter().find(|child| child.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FieldNode> {
        self.children_mut().iter_mut().find(|child| child.name == name)
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            FieldValue::Primitive(Primitive::String(value)) => Some(value),
            _ => None,
        }
    }

    /// Reads any integer primitive as an `i64`. Unsigned values are
    /// reinterpreted bit for bit, which is how path ids are stored.
    pub fn as_i64(&self) -> Option<i64> {
        match &self.value {
            FieldValue::Primitive(Primitive::Int(value)) => Some(*value),
            FieldValue::Primitive(Primitive::UInt(value)) => Some(*value as i64),
            _ => None,
        }
    }

    /// Overwrites an integer primitive, keeping its signedness.
    ///
    /// Returns `false` if this node is not an integer.
    pub fn set_i64(&mut self, new_value: i64) -> bool {
        match &mut self.value {
            FieldValue::Primitive(Primitive::Int(value)) => {
                *value = new_value;
                true
            }
            FieldValue::Primitive(Primitive::UInt(value)) => {
                *value = new_value as u64;
                true
            }
            _ => false,
        }
    }

    /// Whether this node has the foreign-file reference shape: exactly two
    /// children, `m_FileID` then `m_PathID`.
    pub fn is_pointer(&self) -> bool {
        matches!(
            self.children(),
            [file_id, path_id] if file_id.name == FILE_ID_FIELD && path_id.name == PATH_ID_FIELD
        )
    }

    /// Visits this node and every descendant depth-first, parents before
    /// children. The visitor returns whether it changed the node; the result
    /// is whether anything in the tree changed.
    pub fn visit_mut<F>(&mut self, visitor: &mut F) -> bool
    where
        F: FnMut(&mut FieldNode) -> bool,
    {
        let mut changed = visitor(self);

        for child in self.children_mut() {
            changed |= child.visit_mut(&mut *visitor);
        }

        changed
    }
}

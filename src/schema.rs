//! Self-describing schemas for decoding RPC results.
//!
//! A [`Schema`] names the fields a `result` mapping is expected to carry and
//! the kind of value each one holds. Schemas nest: a field may be another
//! record, a sequence, or an optional value.
//!
//! ```ignore
//! use peaceful_pie::schema::{FieldKind, Schema};
//!
//! let vector3 = Schema::new("Vector3")
//!     .field("x", FieldKind::Float)
//!     .field("y", FieldKind::Float)
//!     .field("z", FieldKind::Float);
//! ```
//!
//! Schemas can also be described in JSON, which is how the `pie` CLI accepts
//! them:
//!
//! ```text
//! {"reward": "float", "episodeFinished": "bool", "label": "string?",
//!  "positions": [{"x": "float", "y": "float", "z": "float"}]}
//! ```

use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// The expected kind of a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Bool,
    /// Whole number; fractional JSON numbers are rejected.
    Int,
    /// Any JSON number.
    Float,
    String,
    /// Arbitrary JSON, kept as-is.
    Any,
    /// Nested record.
    Record(Schema),
    /// Homogeneous sequence.
    Sequence(Box<FieldKind>),
    /// Field may be absent or `null`.
    Optional(Box<FieldKind>),
}

impl FieldKind {
    /// Convenience for `FieldKind::Sequence(Box::new(kind))`.
    pub fn sequence_of(kind: FieldKind) -> Self {
        FieldKind::Sequence(Box::new(kind))
    }

    /// Convenience for `FieldKind::Optional(Box::new(kind))`.
    pub fn optional(kind: FieldKind) -> Self {
        FieldKind::Optional(Box::new(kind))
    }

    pub fn is_optional(&self) -> bool {
        matches!(self, FieldKind::Optional(_))
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Bool => write!(f, "bool"),
            FieldKind::Int => write!(f, "int"),
            FieldKind::Float => write!(f, "float"),
            FieldKind::String => write!(f, "string"),
            FieldKind::Any => write!(f, "any"),
            FieldKind::Record(schema) => write!(f, "{}", schema.name()),
            FieldKind::Sequence(inner) => write!(f, "[{}]", inner),
            FieldKind::Optional(inner) => write!(f, "{}?", inner),
        }
    }
}

/// A named, ordered set of fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    name: String,
    fields: Vec<(String, FieldKind)>,
}

/// Errors from parsing a JSON schema description.
#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("Unknown field kind '{kind}' at {path}")]
    UnknownKind { path: String, kind: String },

    #[error("Sequence description at {path} must hold exactly one element kind")]
    BadSequence { path: String },

    #[error("Unsupported description at {path}: {found}")]
    Unsupported { path: String, found: String },
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field. A repeated name replaces the earlier definition.
    pub fn field(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        let name = name.into();
        if let Some(slot) = self.fields.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = kind;
        } else {
            self.fields.push((name, kind));
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldKind)> {
        self.fields.iter().map(|(n, k)| (n.as_str(), k))
    }

    pub fn kind_of(&self, field: &str) -> Option<&FieldKind> {
        self.fields.iter().find(|(n, _)| n == field).map(|(_, k)| k)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse a schema from its JSON description.
    ///
    /// Accepted forms for a field kind:
    /// - `"bool"`, `"int"`, `"float"`, `"string"`, `"any"` (append `?` for optional)
    /// - an object, describing a nested record
    /// - a one-element array, describing a sequence of that kind
    ///
    /// # Errors
    ///
    /// Returns `SchemaError` if the top level is not an object or any kind
    /// is unrecognised.
    pub fn from_description(name: impl Into<String>, description: &Value) -> Result<Self, SchemaError> {
        let name = name.into();
        let path = name.clone();
        describe_record(name, &path, description)
    }
}

/// Build a record schema named `name`; `path` locates it for error reports.
fn describe_record(name: String, path: &str, description: &Value) -> Result<Schema, SchemaError> {
    let map = match description {
        Value::Object(map) => map,
        other => {
            return Err(SchemaError::Unsupported {
                path: path.to_string(),
                found: other.to_string(),
            })
        }
    };
    let mut schema = Schema::new(name);
    for (field, kind) in map {
        let field_path = format!("{}.{}", path, field);
        schema = schema.field(field.clone(), parse_kind(&field_path, field, kind)?);
    }
    Ok(schema)
}

fn parse_kind(path: &str, field: &str, description: &Value) -> Result<FieldKind, SchemaError> {
    match description {
        Value::String(s) => {
            let (base, optional) = match s.strip_suffix('?') {
                Some(base) => (base, true),
                None => (s.as_str(), false),
            };
            let kind = match base {
                "bool" => FieldKind::Bool,
                "int" => FieldKind::Int,
                "float" => FieldKind::Float,
                "string" => FieldKind::String,
                "any" => FieldKind::Any,
                _ => {
                    return Err(SchemaError::UnknownKind {
                        path: path.to_string(),
                        kind: s.clone(),
                    })
                }
            };
            Ok(if optional { FieldKind::optional(kind) } else { kind })
        }
        Value::Object(_) => Ok(FieldKind::Record(describe_record(
            field.to_string(),
            path,
            description,
        )?)),
        Value::Array(items) => match items.as_slice() {
            [inner] => Ok(FieldKind::sequence_of(parse_kind(
                &format!("{}[]", path),
                field,
                inner,
            )?)),
            _ => Err(SchemaError::BadSequence {
                path: path.to_string(),
            }),
        },
        other => Err(SchemaError::Unsupported {
            path: path.to_string(),
            found: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_builder_keeps_order_and_replaces_duplicates() {
        let schema = Schema::new("Thing")
            .field("b", FieldKind::Int)
            .field("a", FieldKind::Float)
            .field("b", FieldKind::String);

        let names: Vec<&str> = schema.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert_eq!(schema.kind_of("b"), Some(&FieldKind::String));
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn test_from_description_nested() {
        let description = json!({
            "reward": "float",
            "label": "string?",
            "observations": [{"alive": "bool", "distances": [["float"]]}]
        });

        let schema = Schema::from_description("RlResult", &description).unwrap();

        assert_eq!(schema.kind_of("reward"), Some(&FieldKind::Float));
        assert_eq!(
            schema.kind_of("label"),
            Some(&FieldKind::optional(FieldKind::String))
        );
        let expected_obs = Schema::new("observations")
            .field("alive", FieldKind::Bool)
            .field(
                "distances",
                FieldKind::sequence_of(FieldKind::sequence_of(FieldKind::Float)),
            );
        assert_eq!(
            schema.kind_of("observations"),
            Some(&FieldKind::sequence_of(FieldKind::Record(expected_obs)))
        );
    }

    #[test]
    fn test_from_description_rejects_unknown_kind() {
        let err = Schema::from_description("T", &json!({"x": "double"})).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownKind {
                path: "T.x".to_string(),
                kind: "double".to_string()
            }
        );
    }

    #[test]
    fn test_from_description_rejects_bad_sequence() {
        let err = Schema::from_description("T", &json!({"xs": ["int", "float"]})).unwrap_err();
        assert!(matches!(err, SchemaError::BadSequence { .. }));

        let err = Schema::from_description("T", &json!(["int"])).unwrap_err();
        assert!(matches!(err, SchemaError::Unsupported { .. }));
    }

    #[test]
    fn test_nested_errors_keep_parent_path() {
        let err = Schema::from_description("RlResult", &json!({"player": {"pos": {"x": "double"}}}))
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownKind {
                path: "RlResult.player.pos.x".to_string(),
                kind: "double".to_string()
            }
        );

        let err = Schema::from_description("RlResult", &json!({"rays": [{"hit": "maybe"}]})).unwrap_err();
        assert_eq!(
            err,
            SchemaError::UnknownKind {
                path: "RlResult.rays[].hit".to_string(),
                kind: "maybe".to_string()
            }
        );
    }

    #[test]
    fn test_field_kind_display() {
        let kind = FieldKind::optional(FieldKind::sequence_of(FieldKind::Float));
        assert_eq!(kind.to_string(), "[float]?");
        assert_eq!(FieldKind::Record(Schema::new("Vector3")).to_string(), "Vector3");
    }
}

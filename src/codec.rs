//! Request encoding and result decoding.
//!
//! Outbound: call arguments (primitives, serde structs, [`Record`]s, nested
//! sequences of any of these) are flattened into a plain JSON mapping.
//!
//! Inbound: a `result` payload is matched against a [`Schema`] and turned
//! into a [`Record`]. Extra payload fields are ignored; missing required
//! fields are reported together with their path.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::schema::{FieldKind, Schema};

/// Errors from decoding a payload against a schema.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Cannot decode null into {schema}")]
    NullPayload { schema: String },

    #[error("Missing field(s) at {path}: {}", fields.join(", "))]
    MissingFields { path: String, fields: Vec<String> },

    #[error("Type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: String,
        found: String,
    },
}

/// Errors from encoding call arguments.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("Failed to serialize argument: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Params must encode to a mapping, got {0}")]
    NotAMapping(&'static str),
}

/// A single decoded value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Any(Value),
    Record(Record),
    Sequence(Vec<FieldValue>),
    Null,
}

impl FieldValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, and ints widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(f) => Some(*f),
            FieldValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            FieldValue::Record(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[FieldValue]> {
        match self {
            FieldValue::Sequence(items) => Some(items),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Re-encode into plain JSON.
    pub fn to_value(&self) -> Value {
        match self {
            FieldValue::Bool(b) => Value::Bool(*b),
            FieldValue::Int(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Any(v) => v.clone(),
            FieldValue::Record(r) => r.to_value(),
            FieldValue::Sequence(items) => Value::Array(items.iter().map(FieldValue::to_value).collect()),
            FieldValue::Null => Value::Null,
        }
    }
}

/// A decoded record: field values in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: String,
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    /// Name of the schema this record was decoded with.
    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == field).map(|(_, v)| v)
    }

    pub fn float(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }

    pub fn int(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(FieldValue::as_i64)
    }

    pub fn bool(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(FieldValue::as_bool)
    }

    pub fn str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_str)
    }

    pub fn record(&self, field: &str) -> Option<&Record> {
        self.get(field).and_then(FieldValue::as_record)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Re-encode into a plain JSON mapping.
    pub fn to_value(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(n, v)| (n.clone(), v.to_value()))
            .collect();
        Value::Object(map)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, &value.to_value())?;
        }
        map.end()
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a `result` payload into a record shaped by `schema`.
///
/// # Errors
///
/// - `DecodeError::NullPayload` if `payload` is `null`
/// - `DecodeError::MissingFields` listing every required field absent at one level
/// - `DecodeError::TypeMismatch` on the first field whose value has the wrong kind
pub fn decode(payload: &Value, schema: &Schema) -> Result<Record, DecodeError> {
    if payload.is_null() {
        return Err(DecodeError::NullPayload {
            schema: schema.name().to_string(),
        });
    }
    decode_record(schema.name(), payload, schema)
}

fn decode_record(path: &str, payload: &Value, schema: &Schema) -> Result<Record, DecodeError> {
    let map = payload.as_object().ok_or_else(|| DecodeError::TypeMismatch {
        path: path.to_string(),
        expected: format!("{} mapping", schema.name()),
        found: json_kind(payload).to_string(),
    })?;

    let missing: Vec<String> = schema
        .fields()
        .filter(|(name, kind)| !kind.is_optional() && !map.contains_key(*name))
        .map(|(name, _)| name.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(DecodeError::MissingFields {
            path: path.to_string(),
            fields: missing,
        });
    }

    let mut fields = Vec::with_capacity(schema.len());
    for (name, kind) in schema.fields() {
        let field_path = format!("{}.{}", path, name);
        let value = match map.get(name) {
            Some(v) => decode_kind(&field_path, kind, v)?,
            None => FieldValue::Null,
        };
        fields.push((name.to_string(), value));
    }

    Ok(Record {
        schema: schema.name().to_string(),
        fields,
    })
}

fn decode_kind(path: &str, kind: &FieldKind, value: &Value) -> Result<FieldValue, DecodeError> {
    let mismatch = || DecodeError::TypeMismatch {
        path: path.to_string(),
        expected: kind.to_string(),
        found: json_kind(value).to_string(),
    };

    match kind {
        FieldKind::Bool => value.as_bool().map(FieldValue::Bool).ok_or_else(mismatch),
        FieldKind::Int => value.as_i64().map(FieldValue::Int).ok_or_else(mismatch),
        FieldKind::Float => value.as_f64().map(FieldValue::Float).ok_or_else(mismatch),
        FieldKind::String => value
            .as_str()
            .map(|s| FieldValue::String(s.to_string()))
            .ok_or_else(mismatch),
        FieldKind::Any => Ok(FieldValue::Any(value.clone())),
        FieldKind::Record(schema) => {
            if value.is_null() {
                return Err(mismatch());
            }
            decode_record(path, value, schema).map(FieldValue::Record)
        }
        FieldKind::Sequence(inner) => {
            let items = value.as_array().ok_or_else(mismatch)?;
            items
                .iter()
                .enumerate()
                .map(|(i, item)| decode_kind(&format!("{}[{}]", path, i), inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(FieldValue::Sequence)
        }
        FieldKind::Optional(inner) => {
            if value.is_null() {
                Ok(FieldValue::Null)
            } else {
                decode_kind(path, inner, value)
            }
        }
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode a single argument value. Structured values become plain mappings.
pub fn encode_value<T: Serialize + ?Sized>(value: &T) -> Result<Value, EncodeError> {
    Ok(serde_json::to_value(value)?)
}

/// Encode a whole parameter record into the `params` mapping.
///
/// `()` and `None` encode to an empty mapping.
///
/// # Errors
///
/// Returns `EncodeError::NotAMapping` if `params` serializes to anything
/// other than a mapping or null.
pub fn encode_params<P: Serialize + ?Sized>(params: &P) -> Result<Map<String, Value>, EncodeError> {
    match serde_json::to_value(params)? {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(EncodeError::NotAMapping(json_kind(&other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde::Serialize;
    use serde_json::json;

    fn vector3() -> Schema {
        Schema::new("Vector3")
            .field("x", FieldKind::Float)
            .field("y", FieldKind::Float)
            .field("z", FieldKind::Float)
    }

    #[test]
    fn test_decode_vector() {
        let record = decode(&json!({"x": 1.0, "y": 2.0, "z": 3.0}), &vector3()).unwrap();
        assert_eq!(record.schema_name(), "Vector3");
        assert_eq!(record.float("x"), Some(1.0));
        assert_eq!(record.float("y"), Some(2.0));
        assert_eq!(record.float("z"), Some(3.0));
    }

    #[test]
    fn test_decode_reports_all_missing_fields() {
        let err = decode(&json!({"x": 1.0}), &vector3()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingFields {
                path: "Vector3".to_string(),
                fields: vec!["y".to_string(), "z".to_string()],
            }
        );
        assert_eq!(err.to_string(), "Missing field(s) at Vector3: y, z");
    }

    #[test]
    fn test_decode_ignores_extra_fields() {
        let record = decode(&json!({"x": 1, "y": 2, "z": 3, "w": "extra"}), &vector3()).unwrap();
        assert!(record.get("w").is_none());
        assert_eq!(record.fields().count(), 3);
        // JSON ints widen to float fields
        assert_eq!(record.get("x"), Some(&FieldValue::Float(1.0)));
    }

    #[test]
    fn test_decode_null_payload_fails() {
        let err = decode(&Value::Null, &vector3()).unwrap_err();
        assert_eq!(
            err,
            DecodeError::NullPayload {
                schema: "Vector3".to_string()
            }
        );
    }

    #[test]
    fn test_decode_type_mismatch_has_path() {
        let schema = Schema::new("Obs").field("alive", FieldKind::Bool).field("pos", FieldKind::Record(vector3()));

        let err = decode(&json!({"alive": true, "pos": {"x": 1, "y": "up", "z": 0}}), &schema).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TypeMismatch {
                path: "Obs.pos.y".to_string(),
                expected: "float".to_string(),
                found: "string".to_string(),
            }
        );
    }

    #[test]
    fn test_decode_int_rejects_fraction() {
        let schema = Schema::new("Count").field("n", FieldKind::Int);
        assert!(decode(&json!({"n": 3}), &schema).is_ok());
        assert!(matches!(
            decode(&json!({"n": 3.5}), &schema),
            Err(DecodeError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_decode_optional_fields() {
        let schema = Schema::new("Msg")
            .field("text", FieldKind::optional(FieldKind::String))
            .field("count", FieldKind::optional(FieldKind::Int));

        let record = decode(&json!({"count": null}), &schema).unwrap();
        assert!(record.get("text").unwrap().is_null());
        assert!(record.get("count").unwrap().is_null());

        let record = decode(&json!({"text": "hi", "count": 2}), &schema).unwrap();
        assert_eq!(record.str("text"), Some("hi"));
        assert_eq!(record.int("count"), Some(2));
    }

    #[test]
    fn test_decode_sequences_of_records() {
        let schema = Schema::new("Path")
            .field("points", FieldKind::sequence_of(FieldKind::Record(vector3())))
            .field("grid", FieldKind::sequence_of(FieldKind::sequence_of(FieldKind::Int)));

        let payload = json!({
            "points": [{"x": 0, "y": 0, "z": 0}, {"x": 1, "y": 2, "z": 3}],
            "grid": [[0, 1], [-1, 2]]
        });
        let record = decode(&payload, &schema).unwrap();

        let points = record.get("points").and_then(FieldValue::as_sequence).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].as_record().and_then(|p| p.float("z")), Some(3.0));

        let err = decode(&json!({"points": [{"x": 0, "y": 0}], "grid": []}), &schema).unwrap_err();
        assert_eq!(
            err,
            DecodeError::MissingFields {
                path: "Path.points[0]".to_string(),
                fields: vec!["z".to_string()],
            }
        );
    }

    #[test]
    fn test_nested_record_round_trip() {
        let schema = Schema::new("Agent")
            .field("name", FieldKind::String)
            .field("alive", FieldKind::Bool)
            .field("pos", FieldKind::Record(vector3()))
            .field("history", FieldKind::sequence_of(FieldKind::Record(vector3())))
            .field("extra", FieldKind::Any);
        let payload = json!({
            "name": "npc-1",
            "alive": true,
            "pos": {"x": 1.5, "y": -2.0, "z": 0.25},
            "history": [{"x": 0.0, "y": 0.0, "z": 0.0}],
            "extra": {"tags": ["a", "b"]}
        });

        let record = decode(&payload, &schema).unwrap();
        let encoded = encode_value(&record).unwrap();
        assert_eq!(encoded, payload);
        assert_eq!(decode(&encoded, &schema).unwrap(), record);
    }

    #[derive(Serialize)]
    struct Translate {
        translate: Vec3,
    }

    #[derive(Serialize)]
    struct Vec3 {
        x: f64,
        y: f64,
        z: f64,
    }

    #[test]
    fn test_encode_params_flattens_nested_structs() {
        let params = Translate {
            translate: Vec3 { x: 1.0, y: 0.0, z: -1.0 },
        };
        let map = encode_params(&params).unwrap();
        assert_eq!(
            Value::Object(map),
            json!({"translate": {"x": 1.0, "y": 0.0, "z": -1.0}})
        );
    }

    #[test]
    fn test_encode_params_empty_and_invalid() {
        assert!(encode_params(&()).unwrap().is_empty());
        assert!(encode_params(&None::<Vec3>).unwrap().is_empty());
        assert!(matches!(
            encode_params(&vec![1, 2, 3]),
            Err(EncodeError::NotAMapping("sequence"))
        ));
    }
}

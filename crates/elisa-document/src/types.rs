//! Elisa Document Types
//!
//! Core data types for document storage: the tagged `Value` union, document
//! identifiers, documents, and the JSON codec that turns a document into a
//! store record and back.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use elisa_common::ErrorKind;
use elisa_storage::Record;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

/// Field map of a document or nested object, ordered by key.
pub type Map = BTreeMap<String, Value>;

pub const ID_FIELD: &str = "_id";
pub const CREATED_AT_FIELD: &str = "_created_at";
pub const UPDATED_AT_FIELD: &str = "_updated_at";

// =============================================================================
// Document ID
// =============================================================================

/// Unique identifier for a document within its collection.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random (UUID v4) identifier.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for DocumentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DocumentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Value
// =============================================================================

/// A document value that can be any JSON-compatible type.
///
/// Values are totally ordered: first by type rank
/// (`null < bool < number < string < array < object`), then by content.
/// Integers and floats share the number rank and compare numerically, so
/// `Int(1) == Float(1.0)`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(Map),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Bool(_))
    }

    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self, Self::String(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Self::Object(_))
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(n) => Some(*n as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Map> {
        match self {
            Self::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Name of the value's type as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Position of the value's type in the cross-type order.
    pub fn type_rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Bool(_) => 1,
            Self::Int(_) | Self::Float(_) => 2,
            Self::String(_) => 3,
            Self::Array(_) => 4,
            Self::Object(_) => 5,
        }
    }

    /// Compare two values of compatible types.
    ///
    /// Returns `None` when the types are incompatible (for example a string
    /// against a number), which query operators treat as "no match".
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if self.type_rank() == other.type_rank() {
            Some(self.cmp(other))
        } else {
            None
        }
    }

    /// Get a value at a path (e.g., "user.address.city" or "tags.0").
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut current = self;
        for part in path.split('.') {
            current = match current {
                Self::Object(obj) => obj.get(part)?,
                Self::Array(arr) => arr.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Convert from serde_json::Value.
    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else {
                    Self::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            JsonValue::String(s) => Self::String(s),
            JsonValue::Array(arr) => Self::Array(arr.into_iter().map(Self::from_json).collect()),
            JsonValue::Object(obj) => {
                Self::Object(obj.into_iter().map(|(k, v)| (k, Self::from_json(v))).collect())
            }
        }
    }

    /// Convert to serde_json::Value. Non-finite floats become null.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Self::Null => JsonValue::Null,
            Self::Bool(b) => JsonValue::Bool(*b),
            Self::Int(n) => JsonValue::Number((*n).into()),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Self::String(s) => JsonValue::String(s.clone()),
            Self::Array(arr) => JsonValue::Array(arr.iter().map(|v| v.to_json()).collect()),
            Self::Object(obj) => {
                JsonValue::Object(obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
        }
    }
}

fn cmp_f64(a: f64, b: f64) -> Ordering {
    if a == b {
        Ordering::Equal
    } else {
        a.total_cmp(&b)
    }
}

fn cmp_int_float(i: i64, f: f64) -> Ordering {
    match cmp_f64(i as f64, f) {
        Ordering::Equal if !f.is_nan() => i.cmp(&(f as i64)),
        other => other,
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Int(a), Int(b)) => a.cmp(b),
            (Float(a), Float(b)) => cmp_f64(*a, *b),
            (Int(a), Float(b)) => cmp_int_float(*a, *b),
            (Float(a), Int(b)) => cmp_int_float(*b, *a).reverse(),
            (String(a), String(b)) => a.cmp(b),
            (Array(a), Array(b)) => a.iter().cmp(b.iter()),
            (Object(a), Object(b)) => a.iter().cmp(b.iter()),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_rank().hash(state);
        match self {
            Self::Null => {}
            Self::Bool(b) => b.hash(state),
            Self::Int(n) => n.hash(state),
            Self::Float(f) => {
                // Integral floats hash like the equal integer. 2^63 saturates
                // to `i64::MAX` and compares equal to it.
                if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                    (*f as i64).hash(state)
                } else {
                    f.to_bits().hash(state)
                }
            }
            Self::String(s) => s.hash(state),
            Self::Array(arr) => arr.hash(state),
            Self::Object(obj) => obj.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(arr: Vec<Value>) -> Self {
        Self::Array(arr)
    }
}

impl From<Map> for Value {
    fn from(obj: Map) -> Self {
        Self::Object(obj)
    }
}

impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        Self::from_json(json)
    }
}

// =============================================================================
// Codec Error
// =============================================================================

/// Errors raised while converting documents to and from their encoded form.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("document must be a JSON object")]
    NotAnObject,

    #[error("invalid document identifier: {0}")]
    InvalidId(String),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Corruption
    }
}

// =============================================================================
// Document
// =============================================================================

/// A document in a collection.
///
/// `id` is `None` until the document is stored. The timestamp fields are
/// server-assigned (milliseconds since the Unix epoch).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub id: Option<DocumentId>,
    pub fields: Map,
    pub created_at: Option<i64>,
    pub updated_at: Option<i64>,
}

impl Document {
    /// Create an empty document without an identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a document with a specific ID.
    pub fn with_id(id: impl Into<DocumentId>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    /// Builder-style field setter.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn from_fields(fields: Map) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn id(&self) -> Option<&DocumentId> {
        self.id.as_ref()
    }

    /// Create a document from JSON. Top-level keys starting with `_` other
    /// than the server-assigned fields are dropped.
    pub fn from_json(json: JsonValue) -> Result<Self, CodecError> {
        let JsonValue::Object(obj) = json else {
            return Err(CodecError::NotAnObject);
        };

        let mut doc = Self::new();
        for (key, value) in obj {
            match key.as_str() {
                ID_FIELD => {
                    doc.id = Some(match value {
                        JsonValue::String(s) => DocumentId(s),
                        JsonValue::Number(n) if n.is_i64() || n.is_u64() => DocumentId(n.to_string()),
                        JsonValue::Null => continue,
                        other => return Err(CodecError::InvalidId(other.to_string())),
                    });
                }
                CREATED_AT_FIELD => doc.created_at = value.as_i64(),
                UPDATED_AT_FIELD => doc.updated_at = value.as_i64(),
                k if k.starts_with('_') => {}
                _ => {
                    doc.fields.insert(key, Value::from_json(value));
                }
            }
        }
        Ok(doc)
    }

    /// Convert to JSON.
    pub fn to_json(&self) -> JsonValue {
        let mut obj = serde_json::Map::new();
        if let Some(id) = &self.id {
            obj.insert(ID_FIELD.to_string(), JsonValue::String(id.0.clone()));
        }
        if let Some(ts) = self.created_at {
            obj.insert(CREATED_AT_FIELD.to_string(), JsonValue::Number(ts.into()));
        }
        if let Some(ts) = self.updated_at {
            obj.insert(UPDATED_AT_FIELD.to_string(), JsonValue::Number(ts.into()));
        }
        for (k, v) in &self.fields {
            obj.insert(k.clone(), v.to_json());
        }
        JsonValue::Object(obj)
    }

    /// Encode the document into a store record.
    pub fn encode(&self) -> Result<Record, CodecError> {
        Ok(Record::from(serde_json::to_vec(&self.to_json())?))
    }

    /// Decode a document from a store record.
    pub fn decode(record: &Record) -> Result<Self, CodecError> {
        let json: JsonValue = serde_json::from_slice(record.as_bytes())?;
        Self::from_json(json)
    }

    /// Get a user field value, following dotted paths into nested values.
    pub fn get(&self, path: &str) -> Option<&Value> {
        match path.split_once('.') {
            Some((head, rest)) => self.fields.get(head)?.get_path(rest),
            None => self.fields.get(path),
        }
    }

    /// Resolve a path, including the server-assigned fields.
    pub fn lookup(&self, path: &str) -> Option<Cow<'_, Value>> {
        match path {
            ID_FIELD => self
                .id
                .as_ref()
                .map(|id| Cow::Owned(Value::String(id.0.clone()))),
            CREATED_AT_FIELD => self.created_at.map(|ts| Cow::Owned(Value::Int(ts))),
            UPDATED_AT_FIELD => self.updated_at.map(|ts| Cow::Owned(Value::Int(ts))),
            _ => self.get(path).map(Cow::Borrowed),
        }
    }

    /// Set a top-level field value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Set a value at a dotted path, creating missing intermediate objects.
    ///
    /// Numeric segments index into arrays the way [`Value::get_path`] reads
    /// them; an index equal to the array length appends. A path that crosses
    /// a scalar or names no valid array slot is rejected. Only segments that
    /// already exist can fail, so a rejected write leaves the document
    /// unchanged.
    pub fn set_path(&mut self, path: &str, value: impl Into<Value>) -> Result<(), PathError> {
        let parts: Vec<&str> = path.split('.').collect();
        set_in(&mut self.fields, &parts, 0, value.into())
    }

    /// Remove a top-level field.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    /// Remove the value at a dotted path. Numeric segments index into
    /// arrays; removing an array element shifts the ones after it.
    pub fn remove_path(&mut self, path: &str) -> Option<Value> {
        let parts: Vec<&str> = path.split('.').collect();
        let (leaf, parents) = parts.split_last()?;
        let Some((first, rest)) = parents.split_first() else {
            return self.fields.remove(*leaf);
        };

        let mut current = self.fields.get_mut(*first)?;
        for part in rest {
            current = match current {
                Value::Object(obj) => obj.get_mut(*part)?,
                Value::Array(arr) => arr.get_mut(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        match current {
            Value::Object(obj) => obj.remove(*leaf),
            Value::Array(arr) => {
                let index = leaf.parse::<usize>().ok().filter(|i| *i < arr.len())?;
                Some(arr.remove(index))
            }
            _ => None,
        }
    }

    /// Dotted path of the first non-finite number in the document, if any.
    /// Such numbers have no JSON encoding and cannot be stored.
    pub fn non_finite_path(&self) -> Option<String> {
        self.fields
            .iter()
            .find_map(|(key, value)| non_finite_in(value, key.clone()))
    }

    /// Drop user fields whose names collide with the reserved `_` prefix.
    pub fn strip_reserved(&mut self) {
        self.fields.retain(|k, _| !k.starts_with('_'));
    }

    /// Check if a field exists.
    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Get all field names.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Get the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the document is empty.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn non_finite_in(value: &Value, path: String) -> Option<String> {
    match value {
        Value::Float(f) if !f.is_finite() => Some(path),
        Value::Array(arr) => arr
            .iter()
            .enumerate()
            .find_map(|(i, v)| non_finite_in(v, format!("{}[{}]", path, i))),
        Value::Object(obj) => obj
            .iter()
            .find_map(|(k, v)| non_finite_in(v, format!("{}.{}", path, k))),
        _ => None,
    }
}

// -----------------------------------------------------------------------------
// Path Writes
// -----------------------------------------------------------------------------

/// A dotted path that cannot be written into a document.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("path '{path}' crosses a {found} value at '{at}'")]
    NotAContainer {
        path: String,
        at: String,
        found: &'static str,
    },

    #[error("path '{path}' has no valid array index at '{at}'")]
    InvalidIndex { path: String, at: String },
}

/// Index named by segment `pos`, which may equal `len` to append.
fn array_slot(parts: &[&str], pos: usize, len: usize) -> Result<usize, PathError> {
    parts[pos]
        .parse::<usize>()
        .ok()
        .filter(|i| *i <= len)
        .ok_or_else(|| PathError::InvalidIndex {
            path: parts.join("."),
            at: parts[..pos].join("."),
        })
}

fn set_in(map: &mut Map, parts: &[&str], pos: usize, value: Value) -> Result<(), PathError> {
    let key = parts[pos].to_string();
    if pos + 1 == parts.len() {
        map.insert(key, value);
        return Ok(());
    }
    let child = map.entry(key).or_insert_with(|| Value::Object(Map::new()));
    set_in_value(child, parts, pos + 1, value)
}

fn set_in_value(target: &mut Value, parts: &[&str], pos: usize, value: Value) -> Result<(), PathError> {
    match target {
        Value::Object(map) => set_in(map, parts, pos, value),
        Value::Array(items) => {
            let index = array_slot(parts, pos, items.len())?;
            let last = pos + 1 == parts.len();
            if index == items.len() {
                items.push(if last { Value::Null } else { Value::Object(Map::new()) });
            }
            match items.get_mut(index) {
                Some(slot) if last => {
                    *slot = value;
                    Ok(())
                }
                Some(slot) => set_in_value(slot, parts, pos + 1, value),
                None => Err(PathError::InvalidIndex {
                    path: parts.join("."),
                    at: parts[..pos].join("."),
                }),
            }
        }
        other => Err(PathError::NotAContainer {
            path: parts.join("."),
            at: parts[..pos].join("."),
            found: other.type_name(),
        }),
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Document {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = JsonValue::deserialize(deserializer)?;
        Document::from_json(json).map_err(D::Error::custom)
    }
}

/// Current time in milliseconds since the Unix epoch.
pub(crate) fn current_timestamp() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id() {
        let id1 = DocumentId::generate();
        let id2 = DocumentId::generate();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_str().len(), 36);

        let id3 = DocumentId::new("custom-id");
        assert_eq!(id3.as_str(), "custom-id");
    }

    #[test]
    fn test_value_types() {
        assert!(Value::Null.is_null());
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Int(42).as_i64(), Some(42));
        assert_eq!(Value::from("hello").as_str(), Some("hello"));
        assert_eq!(Value::Float(1.5).type_name(), "float");
    }

    #[test]
    fn test_numbers_compare_numerically() {
        assert_eq!(Value::Int(1), Value::Float(1.0));
        assert!(Value::Int(1) < Value::Float(1.5));
        assert!(Value::Float(2.5) > Value::Int(2));
        assert_eq!(Value::Float(-0.0), Value::Int(0));
    }

    #[test]
    fn test_cross_type_order() {
        let ordered = vec![
            Value::Null,
            Value::Bool(false),
            Value::Bool(true),
            Value::Int(-5),
            Value::Float(3.5),
            Value::from("a"),
            Value::Array(vec![]),
            Value::Object(Map::new()),
        ];
        let mut shuffled = ordered.clone();
        shuffled.reverse();
        shuffled.sort();
        assert_eq!(shuffled, ordered);

        assert_eq!(Value::from("1").compare(&Value::Int(1)), None);
        assert_eq!(Value::Int(1).compare(&Value::Int(2)), Some(Ordering::Less));
    }

    #[test]
    fn test_equal_values_hash_equal() {
        use std::collections::hash_map::DefaultHasher;
        let hash = |v: &Value| {
            let mut hasher = DefaultHasher::new();
            v.hash(&mut hasher);
            hasher.finish()
        };
        assert_eq!(hash(&Value::Int(7)), hash(&Value::Float(7.0)));
    }

    #[test]
    fn test_value_path() {
        let value = Value::from(json!({"address": {"city": "NYC"}, "tags": ["a", "b"]}));
        assert_eq!(
            value.get_path("address.city").and_then(|v| v.as_str()),
            Some("NYC")
        );
        assert_eq!(value.get_path("tags.1").and_then(|v| v.as_str()), Some("b"));
        assert!(value.get_path("address.zip").is_none());
    }

    #[test]
    fn test_document_fields() {
        let mut doc = Document::new().with("name", "Alice").with("age", 30i64);
        assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("Alice"));
        assert!(doc.contains("age"));
        assert!(!doc.contains("email"));

        doc.set_path("address.city", "Paris").unwrap();
        assert_eq!(doc.get("address.city").and_then(|v| v.as_str()), Some("Paris"));

        assert_eq!(doc.remove_path("address.city"), Some(Value::from("Paris")));
        assert_eq!(doc.get("address"), Some(&Value::Object(Map::new())));
    }

    #[test]
    fn test_set_path_rejects_scalars() {
        let mut doc = Document::new().with("a", 1i64);
        let err = doc.set_path("a.b.c", true).unwrap_err();
        assert!(matches!(err, PathError::NotAContainer { ref at, found: "int", .. } if at == "a"));
        assert_eq!(doc.get("a"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_paths_index_into_arrays() {
        let mut doc = Document::from_json(json!({
            "tags": ["x", "y"],
            "items": [{"qty": 1}]
        }))
        .unwrap();

        doc.set_path("tags.1", "z").unwrap();
        assert_eq!(doc.get("tags"), Some(&Value::from(json!(["x", "z"]))));

        doc.set_path("tags.2", "w").unwrap();
        assert_eq!(doc.get("tags.2"), Some(&Value::from("w")));

        doc.set_path("items.0.qty", 5i64).unwrap();
        assert_eq!(doc.get("items.0.qty"), Some(&Value::Int(5)));

        let err = doc.set_path("tags.9", "v").unwrap_err();
        assert!(matches!(err, PathError::InvalidIndex { ref at, .. } if at == "tags"));
        assert!(doc.set_path("tags.first", "v").is_err());
        assert_eq!(doc.get("tags"), Some(&Value::from(json!(["x", "z", "w"]))));

        assert_eq!(doc.remove_path("tags.0"), Some(Value::from("x")));
        assert_eq!(doc.get("tags"), Some(&Value::from(json!(["z", "w"]))));
        assert_eq!(doc.remove_path("items.0.qty"), Some(Value::Int(5)));
        assert_eq!(doc.remove_path("tags.7"), None);
    }

    #[test]
    fn test_non_finite_path() {
        let doc = Document::new()
            .with("ok", 1.5)
            .with("nested", Value::from(json!({"list": [1, 2]})));
        assert_eq!(doc.non_finite_path(), None);

        let mut bad = doc.clone();
        bad.set_path("nested.list.1", f64::NAN).unwrap();
        assert_eq!(bad.non_finite_path().as_deref(), Some("nested.list[1]"));
        assert_eq!(
            Document::new().with("x", f64::INFINITY).non_finite_path().as_deref(),
            Some("x")
        );
    }

    #[test]
    fn test_saturated_float_hashes_like_max_int() {
        use std::collections::hash_map::DefaultHasher;
        let hash = |v: &Value| {
            let mut hasher = DefaultHasher::new();
            v.hash(&mut hasher);
            hasher.finish()
        };
        let edge = Value::Float(i64::MAX as f64);
        assert_eq!(edge, Value::Int(i64::MAX));
        assert_eq!(hash(&edge), hash(&Value::Int(i64::MAX)));
        assert_eq!(hash(&Value::Float(i64::MIN as f64)), hash(&Value::Int(i64::MIN)));
    }

    #[test]
    fn test_document_from_json() {
        let doc = Document::from_json(json!({
            "_id": "doc123",
            "_secret": 1,
            "name": "Bob",
            "active": true
        }))
        .unwrap();

        assert_eq!(doc.id().map(|id| id.as_str()), Some("doc123"));
        assert_eq!(doc.get("name").and_then(|v| v.as_str()), Some("Bob"));
        assert!(!doc.contains("_secret"));
        assert_eq!(doc.len(), 2);

        assert!(matches!(
            Document::from_json(json!([1, 2])),
            Err(CodecError::NotAnObject)
        ));
        assert!(matches!(
            Document::from_json(json!({"_id": {"nested": true}})),
            Err(CodecError::InvalidId(_))
        ));
    }

    #[test]
    fn test_record_codec() {
        let mut doc = Document::with_id("test-doc")
            .with("count", 100i64)
            .with("ratio", 0.5f64)
            .with("tags", Value::Array(vec!["x".into(), "y".into()]));
        doc.created_at = Some(1_700_000_000_000);

        let record = doc.encode().unwrap();
        let decoded = Document::decode(&record).unwrap();
        assert_eq!(decoded, doc);
    }

    #[test]
    fn test_lookup_server_fields() {
        let mut doc = Document::with_id("x").with("n", 1i64);
        doc.updated_at = Some(5);
        assert_eq!(doc.lookup(ID_FIELD).as_deref(), Some(&Value::from("x")));
        assert_eq!(doc.lookup(UPDATED_AT_FIELD).as_deref(), Some(&Value::Int(5)));
        assert!(doc.lookup(CREATED_AT_FIELD).is_none());
    }

    #[test]
    fn test_serde_document() {
        let doc: Document = serde_json::from_str(r#"{"_id":"a","x":1}"#).unwrap();
        assert_eq!(doc.get("x"), Some(&Value::Int(1)));
        let text = serde_json::to_string(&doc).unwrap();
        assert_eq!(text, r#"{"_id":"a","x":1}"#);
    }
}

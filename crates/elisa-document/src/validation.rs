//! Elisa Document Validation
//!
//! Schema validation for documents. A schema declares per-field types and
//! constraints, the set of required fields, and whether unknown fields are
//! rejected. Validation is pure: it never mutates the candidate document.
//! Defaults are applied to a copy before validation when a schema declares
//! them.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{Document, Map, Value};
use elisa_common::ErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Compiled size limit for schema patterns.
const PATTERN_SIZE_LIMIT: usize = 1024 * 1024; // 1 MB

// =============================================================================
// Validation Error
// =============================================================================

/// A single schema violation, located by a dotted path (`address.city`,
/// `tags[2]`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required field '{path}'")]
    MissingField { path: String },

    #[error("field '{path}': expected {expected}, got {actual}")]
    TypeMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("field '{path}': {message}")]
    ConstraintViolation { path: String, message: String },

    #[error("unknown field '{path}'")]
    UnknownField { path: String },
}

impl ValidationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField { .. } => ErrorKind::MissingField,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::UnknownField { .. } => ErrorKind::UnknownField,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::MissingField { path }
            | Self::TypeMismatch { path, .. }
            | Self::ConstraintViolation { path, .. }
            | Self::UnknownField { path } => path,
        }
    }

    fn constraint(path: &str, message: impl Into<String>) -> Self {
        Self::ConstraintViolation {
            path: path.to_string(),
            message: message.into(),
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Schema definition for document validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Schema {
    pub name: String,
    pub fields: BTreeMap<String, FieldSchema>,
    pub required: Vec<String>,
    /// Reject fields the schema does not declare.
    pub strict: bool,
}

impl Default for Schema {
    fn default() -> Self {
        Self::new("")
    }
}

impl Schema {
    /// Create a new schema.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            required: Vec::new(),
            strict: false,
        }
    }

    /// Add a field to the schema.
    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.fields.insert(name.into(), schema);
        self
    }

    /// Add a required field.
    pub fn require(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if !self.required.contains(&name) {
            self.required.push(name);
        }
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Validate a document, returning the first violation in field-name
    /// order.
    pub fn validate(&self, doc: &Document) -> Result<(), ValidationError> {
        self.report(doc).into_result()
    }

    /// Validate a document, collecting every violation.
    pub fn report(&self, doc: &Document) -> ValidationReport {
        let mut errors = Vec::new();
        self.check_map(&doc.fields, "", &mut errors);
        ValidationReport { errors }
    }

    /// Return a copy of `doc` with declared defaults filled in for absent
    /// fields, descending into nested objects that are present.
    pub fn apply_defaults(&self, doc: &Document) -> Document {
        let mut out = doc.clone();
        self.fill_defaults(&mut out.fields);
        out
    }

    /// Apply defaults, then validate the defaulted copy.
    pub fn prepare(&self, doc: &Document) -> Result<Document, ValidationError> {
        let prepared = self.apply_defaults(doc);
        self.validate(&prepared)?;
        Ok(prepared)
    }

    fn fill_defaults(&self, map: &mut Map) {
        for (name, field) in &self.fields {
            match map.get_mut(name) {
                None => {
                    if let Some(default) = &field.default {
                        map.insert(name.clone(), default.clone());
                    }
                }
                Some(Value::Object(nested)) => {
                    if let Some(props) = &field.properties {
                        props.fill_defaults(nested);
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn check_map(&self, map: &Map, prefix: &str, errors: &mut Vec<ValidationError>) {
        let mut names: BTreeSet<&str> = self.fields.keys().map(String::as_str).collect();
        names.extend(self.required.iter().map(String::as_str));
        if self.strict {
            names.extend(map.keys().map(String::as_str));
        }

        for name in names {
            let path = join_path(prefix, name);
            match (map.get(name), self.fields.get(name)) {
                (None, _) => {
                    if self.required.iter().any(|r| r == name) {
                        errors.push(ValidationError::MissingField { path });
                    }
                }
                (Some(value), Some(field)) => field.check(value, &path, errors),
                (Some(_), None) => {
                    if self.strict {
                        errors.push(ValidationError::UnknownField { path });
                    }
                }
            }
        }
    }
}

fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", prefix, name)
    }
}

// =============================================================================
// Pattern
// =============================================================================

/// A string pattern, compiled once when the schema is built or loaded.
///
/// An invalid expression is kept with its compile error and reported as a
/// constraint violation on every string it is asked to check.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    compiled: Result<regex::Regex, String>,
}

impl Pattern {
    pub fn new(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = regex::RegexBuilder::new(&source)
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|e| e.to_string());
        Self { source, compiled }
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn compiled(&self) -> Result<&regex::Regex, &str> {
        self.compiled.as_ref().map_err(String::as_str)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Pattern {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Pattern::new)
    }
}

// =============================================================================
// Field Schema
// =============================================================================

/// Schema for a single field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSchema {
    /// Accepted types. Empty accepts any type.
    pub types: Vec<FieldType>,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    /// Minimum length of a string (in characters) or array.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    /// Element schema for arrays.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<FieldSchema>>,
    /// Nested schema for objects.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Box<Schema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl FieldSchema {
    pub fn new(field_type: FieldType) -> Self {
        Self::of(vec![field_type])
    }

    /// A field accepting any of the given types.
    pub fn of(types: Vec<FieldType>) -> Self {
        Self {
            types,
            ..Self::default()
        }
    }

    pub fn string() -> Self {
        Self::new(FieldType::String)
    }

    pub fn int() -> Self {
        Self::new(FieldType::Int)
    }

    pub fn float() -> Self {
        Self::new(FieldType::Float)
    }

    pub fn number() -> Self {
        Self::new(FieldType::Number)
    }

    pub fn bool() -> Self {
        Self::new(FieldType::Bool)
    }

    pub fn any() -> Self {
        Self::new(FieldType::Any)
    }

    pub fn array(items: FieldSchema) -> Self {
        let mut schema = Self::new(FieldType::Array);
        schema.items = Some(Box::new(items));
        schema
    }

    pub fn object(properties: Schema) -> Self {
        let mut schema = Self::new(FieldType::Object);
        schema.properties = Some(Box::new(properties));
        schema
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(Pattern::new(pattern));
        self
    }

    pub fn enum_values(mut self, values: Vec<Value>) -> Self {
        self.enum_values = Some(values);
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Validate a single value, returning the first violation.
    pub fn validate(&self, value: &Value) -> Result<(), ValidationError> {
        let mut errors = Vec::new();
        self.check(value, "", &mut errors);
        match errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn accepts_type(&self, value: &Value) -> bool {
        self.types.is_empty() || self.types.iter().any(|t| t.matches(value))
    }

    fn expected(&self) -> String {
        self.types
            .iter()
            .map(FieldType::name)
            .collect::<Vec<_>>()
            .join("|")
    }

    fn check(&self, value: &Value, path: &str, errors: &mut Vec<ValidationError>) {
        if value.is_null() && self.nullable {
            return;
        }

        if !self.accepts_type(value) {
            errors.push(ValidationError::TypeMismatch {
                path: path.to_string(),
                expected: self.expected(),
                actual: value.type_name().to_string(),
            });
            return;
        }

        if let Some(enum_values) = &self.enum_values {
            if !enum_values.contains(value) {
                errors.push(ValidationError::constraint(
                    path,
                    format!("value {} is not one of the allowed values", value),
                ));
                return;
            }
        }

        match value {
            Value::Int(_) | Value::Float(_) => {
                let n = value.as_f64().unwrap_or(f64::NAN);
                if let Some(min) = self.min {
                    if n.is_nan() || n < min {
                        errors.push(ValidationError::constraint(
                            path,
                            format!("value {} is less than minimum {}", value, min),
                        ));
                    }
                }
                if let Some(max) = self.max {
                    if n.is_nan() || n > max {
                        errors.push(ValidationError::constraint(
                            path,
                            format!("value {} is greater than maximum {}", value, max),
                        ));
                    }
                }
            }
            Value::String(s) => {
                self.check_length(s.chars().count(), "string", path, errors);
                if let Some(pattern) = &self.pattern {
                    match pattern.compiled() {
                        Ok(re) if re.is_match(s) => {}
                        Ok(_) => errors.push(ValidationError::constraint(
                            path,
                            format!("string does not match pattern {}", pattern.as_str()),
                        )),
                        Err(e) => errors.push(ValidationError::constraint(
                            path,
                            format!("invalid pattern {}: {}", pattern.as_str(), e),
                        )),
                    }
                }
            }
            Value::Array(arr) => {
                self.check_length(arr.len(), "array", path, errors);
                if let Some(items) = &self.items {
                    for (i, item) in arr.iter().enumerate() {
                        items.check(item, &format!("{}[{}]", path, i), errors);
                    }
                }
            }
            Value::Object(obj) => {
                if let Some(props) = &self.properties {
                    props.check_map(obj, path, errors);
                }
            }
            Value::Null | Value::Bool(_) => {}
        }
    }

    fn check_length(
        &self,
        len: usize,
        what: &str,
        path: &str,
        errors: &mut Vec<ValidationError>,
    ) {
        if let Some(min_len) = self.min_length {
            if len < min_len {
                errors.push(ValidationError::constraint(
                    path,
                    format!("{} length {} is less than minimum {}", what, len, min_len),
                ));
            }
        }
        if let Some(max_len) = self.max_length {
            if len > max_len {
                errors.push(ValidationError::constraint(
                    path,
                    format!("{} length {} is greater than maximum {}", what, len, max_len),
                ));
            }
        }
    }
}

// =============================================================================
// Field Type
// =============================================================================

/// Type of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int,
    Float,
    /// Int or Float.
    Number,
    Bool,
    Array,
    Object,
    Null,
    Any,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::Any, _)
                | (Self::String, Value::String(_))
                | (Self::Int, Value::Int(_))
                | (Self::Float, Value::Float(_))
                | (Self::Number, Value::Int(_) | Value::Float(_))
                | (Self::Bool, Value::Bool(_))
                | (Self::Array, Value::Array(_))
                | (Self::Object, Value::Object(_))
                | (Self::Null, Value::Null)
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Array => "array",
            Self::Object => "object",
            Self::Null => "null",
            Self::Any => "any",
        }
    }
}

// =============================================================================
// Validation Report
// =============================================================================

/// Every violation found in one document, in field-name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

// =============================================================================
// Schema Builder
// =============================================================================

/// Builder for creating schemas.
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: Schema::new(name),
        }
    }

    pub fn field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        self.schema.fields.insert(name.into(), schema);
        self
    }

    pub fn required_field(mut self, name: impl Into<String>, schema: FieldSchema) -> Self {
        let name = name.into();
        self.schema.fields.insert(name.clone(), schema);
        self.schema = self.schema.require(name);
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.schema.strict = strict;
        self
    }

    pub fn build(self) -> Schema {
        self.schema
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(json: serde_json::Value) -> Document {
        Document::from_json(json).expect("test document should decode")
    }

    fn user_schema() -> Schema {
        SchemaBuilder::new("User")
            .required_field("name", FieldSchema::string())
            .required_field("age", FieldSchema::number().min(0.0))
            .build()
    }

    #[test]
    fn test_type_validation() {
        let schema = FieldSchema::string();
        assert!(schema.validate(&Value::from("hello")).is_ok());
        assert!(matches!(
            schema.validate(&Value::Int(42)),
            Err(ValidationError::TypeMismatch { .. })
        ));

        let schema = FieldSchema::of(vec![FieldType::String, FieldType::Int]);
        assert!(schema.validate(&Value::Int(42)).is_ok());
        assert!(schema.validate(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_nullable() {
        assert!(FieldSchema::string().validate(&Value::Null).is_err());
        assert!(FieldSchema::string().nullable().validate(&Value::Null).is_ok());
        assert!(FieldSchema::new(FieldType::Null).validate(&Value::Null).is_ok());
    }

    #[test]
    fn test_range_validation() {
        let schema = FieldSchema::int().min(0.0).max(100.0);
        assert!(schema.validate(&Value::Int(50)).is_ok());
        assert!(schema.validate(&Value::Int(-1)).is_err());
        assert!(schema.validate(&Value::Int(101)).is_err());
    }

    #[test]
    fn test_string_length_counts_characters() {
        let schema = FieldSchema::string().min_length(3).max_length(5);
        assert!(schema.validate(&Value::from("héllo")).is_ok());
        assert!(schema.validate(&Value::from("hi")).is_err());
        assert!(schema.validate(&Value::from("hello world")).is_err());
    }

    #[test]
    fn test_pattern_validation() {
        let schema = FieldSchema::string().pattern(r"^\d{3}-\d{4}$");
        assert!(schema.validate(&Value::from("123-4567")).is_ok());
        assert!(schema.validate(&Value::from("invalid")).is_err());

        let broken = FieldSchema::string().pattern("(unclosed");
        let err = broken.validate(&Value::from("x")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn test_pattern_compiled_once() {
        let schema = FieldSchema::string().pattern(r"^[a-z]+$");
        let pattern = schema.pattern.as_ref().unwrap();
        let first = pattern.compiled().unwrap() as *const regex::Regex;
        for word in ["alpha", "beta", "gamma"] {
            assert!(schema.validate(&Value::from(word)).is_ok());
        }
        assert_eq!(pattern.compiled().unwrap() as *const regex::Regex, first);

        let broken = FieldSchema::string().pattern("(unclosed");
        assert!(broken.pattern.as_ref().unwrap().compiled().is_err());
        for _ in 0..2 {
            let err = broken.validate(&Value::from("x")).unwrap_err();
            assert!(err.to_string().contains("invalid pattern (unclosed"));
        }
    }

    #[test]
    fn test_pattern_serializes_as_source() {
        let schema = FieldSchema::string().pattern(r"^\d+$");
        let json = serde_json::to_value(&schema).unwrap();
        assert_eq!(json["pattern"], r"^\d+$");

        let loaded: FieldSchema = serde_json::from_value(json).unwrap();
        assert_eq!(loaded, schema);
        assert!(loaded.validate(&Value::from("42")).is_ok());
        assert!(loaded.validate(&Value::from("4x")).is_err());
    }

    #[test]
    fn test_enum_validation() {
        let schema = FieldSchema::string()
            .enum_values(vec![Value::from("active"), Value::from("inactive")]);
        assert!(schema.validate(&Value::from("active")).is_ok());
        assert!(schema.validate(&Value::from("unknown")).is_err());
    }

    #[test]
    fn test_required_and_constraints() {
        let schema = user_schema();

        let err = schema.validate(&doc(json!({"name": "a", "age": -1}))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
        assert_eq!(err.path(), "age");

        let err = schema.validate(&doc(json!({"name": "a"}))).unwrap_err();
        assert_eq!(err, ValidationError::MissingField { path: "age".into() });

        assert!(schema.validate(&doc(json!({"name": "a", "age": 5}))).is_ok());
    }

    #[test]
    fn test_first_error_is_in_field_order() {
        let schema = user_schema();
        let report = schema.report(&doc(json!({"name": 1})));
        let paths: Vec<&str> = report.errors.iter().map(|e| e.path()).collect();
        assert_eq!(paths, vec!["age", "name"]);
        assert_eq!(schema.validate(&doc(json!({"name": 1}))).unwrap_err().path(), "age");
    }

    #[test]
    fn test_strict_rejects_unknown_fields() {
        let schema = user_schema().strict(true);
        let err = schema
            .validate(&doc(json!({"name": "a", "age": 1, "zzz": true})))
            .unwrap_err();
        assert_eq!(err, ValidationError::UnknownField { path: "zzz".into() });

        let lenient = user_schema();
        assert!(lenient
            .validate(&doc(json!({"name": "a", "age": 1, "zzz": true})))
            .is_ok());
    }

    #[test]
    fn test_nested_paths() {
        let address = Schema::new("Address")
            .field("city", FieldSchema::string())
            .require("city")
            .strict(true);
        let schema = Schema::new("Person")
            .field("address", FieldSchema::object(address))
            .field("tags", FieldSchema::array(FieldSchema::string()));

        let err = schema
            .validate(&doc(json!({"address": {"zip": "1"}})))
            .unwrap_err();
        assert_eq!(err.path(), "address.city");

        let err = schema
            .validate(&doc(json!({"tags": ["a", "b", 3]})))
            .unwrap_err();
        assert_eq!(err.path(), "tags[2]");
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
    }

    #[test]
    fn test_validation_is_pure_and_idempotent() {
        let schema = user_schema();
        let valid = doc(json!({"name": "a", "age": 3}));
        let invalid = doc(json!({"name": "a", "age": -3}));
        let before = invalid.clone();

        assert_eq!(schema.validate(&valid), schema.validate(&valid));
        assert_eq!(schema.validate(&invalid), schema.validate(&invalid));
        assert_eq!(invalid, before);
    }

    #[test]
    fn test_defaults() {
        let schema = Schema::new("Item")
            .field("qty", FieldSchema::int().default_value(1i64))
            .field("name", FieldSchema::string())
            .require("qty");

        let input = doc(json!({"name": "widget"}));
        let prepared = schema.prepare(&input).unwrap();
        assert_eq!(prepared.get("qty"), Some(&Value::Int(1)));
        assert!(!input.contains("qty"));

        let explicit = schema.prepare(&doc(json!({"qty": 4}))).unwrap();
        assert_eq!(explicit.get("qty"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_schema_serde_roundtrip() {
        let schema = user_schema().strict(true);
        let text = serde_json::to_string(&schema).unwrap();
        let back: Schema = serde_json::from_str(&text).unwrap();
        assert_eq!(back, schema);
    }
}

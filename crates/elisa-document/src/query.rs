//! Elisa Document Query
//!
//! Declarative query descriptors: a filter predicate tree, sort keys,
//! projection, and pagination. Descriptors are plain serializable data so a
//! remote request can carry one; `plan` compiles them for execution.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::{CodecError, Document, Value, CREATED_AT_FIELD, ID_FIELD, UPDATED_AT_FIELD};
use elisa_common::{ErrorKind, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Query Error
// =============================================================================

/// Errors raised while compiling or executing a query.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("corrupt document '{id}': {source}")]
    Corrupt { id: String, source: CodecError },
}

impl QueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuery(_) => ErrorKind::InvalidQuery,
            Self::Store(err) => err.kind(),
            Self::Corrupt { .. } => ErrorKind::Corruption,
        }
    }

    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }
}

// =============================================================================
// Query
// =============================================================================

/// A query descriptor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    pub filter: Option<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Option<Projection>,
    pub skip: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter, AND-ing it with any filter already present.
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            None => filter,
            Some(Filter::And { mut filters }) => {
                filters.push(filter);
                Filter::And { filters }
            }
            Some(existing) => Filter::And {
                filters: vec![existing, filter],
            },
        });
        self
    }

    /// Add a sort key. Earlier keys take priority.
    pub fn with_sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort.push(SortKey {
            field: field.into(),
            order,
        });
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_projection(mut self, projection: Projection) -> Self {
        self.projection = Some(projection);
        self
    }
}

// =============================================================================
// Filter
// =============================================================================

/// A filter predicate tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Filter {
    Eq { field: String, value: Value },
    Ne { field: String, value: Value },
    Gt { field: String, value: Value },
    Gte { field: String, value: Value },
    Lt { field: String, value: Value },
    Lte { field: String, value: Value },
    /// Field equals one of the elements of `value`, which must be an array.
    In { field: String, value: Value },
    /// Field is missing or equals none of the elements of `value`.
    Nin { field: String, value: Value },
    Exists { field: String, exists: bool },
    Regex { field: String, pattern: String },
    /// Substring of a string field, or element of an array field.
    Contains { field: String, value: Value },
    StartsWith { field: String, value: String },
    EndsWith { field: String, value: String },
    And { filters: Vec<Filter> },
    Or { filters: Vec<Filter> },
    Not { filter: Box<Filter> },
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Ne {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Gte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lt {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Lte {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn in_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In {
            field: field.into(),
            value: Value::Array(values),
        }
    }

    pub fn nin_values(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self::Nin {
            field: field.into(),
            value: Value::Array(values),
        }
    }

    pub fn exists(field: impl Into<String>, exists: bool) -> Self {
        Self::Exists {
            field: field.into(),
            exists,
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Contains {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn starts_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::StartsWith {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn ends_with(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::EndsWith {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self::And { filters }
    }

    pub fn or(filters: Vec<Filter>) -> Self {
        Self::Or { filters }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(filter: Filter) -> Self {
        Self::Not {
            filter: Box::new(filter),
        }
    }
}

// =============================================================================
// Sort
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Sort key for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }
}

// =============================================================================
// Projection
// =============================================================================

/// Shape of returned documents. `_id` is always kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "fields", rename_all = "lowercase")]
pub enum Projection {
    /// Keep only these fields (dotted paths allowed).
    Include(Vec<String>),
    /// Drop these fields (dotted paths allowed).
    Exclude(Vec<String>),
}

impl Projection {
    pub fn fields(&self) -> &[String] {
        match self {
            Self::Include(fields) | Self::Exclude(fields) => fields,
        }
    }

    /// Reshape a document.
    pub fn apply(&self, doc: Document) -> Document {
        match self {
            Self::Include(fields) => {
                let mut out = Document {
                    id: doc.id.clone(),
                    ..Document::default()
                };
                for field in fields {
                    match field.as_str() {
                        ID_FIELD => {}
                        CREATED_AT_FIELD => out.created_at = doc.created_at,
                        UPDATED_AT_FIELD => out.updated_at = doc.updated_at,
                        path => {
                            // Every segment of a resolved path exists in `doc`,
                            // so the copy never meets a scalar in the way.
                            if let Some(value) = doc.get(path) {
                                let _ = out.set_path(path, value.clone());
                            }
                        }
                    }
                }
                out
            }
            Self::Exclude(fields) => {
                let mut out = doc;
                for field in fields {
                    match field.as_str() {
                        ID_FIELD => {}
                        CREATED_AT_FIELD => out.created_at = None,
                        UPDATED_AT_FIELD => out.updated_at = None,
                        path => {
                            out.remove_path(path);
                        }
                    }
                }
                out
            }
        }
    }
}

// =============================================================================
// Query Builder
// =============================================================================

/// Builder for constructing queries. Filters added one after another are
/// AND-ed together.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query = self.query.with_filter(filter);
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(field, value))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::ne(field, value))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::gt(field, value))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::gte(field, value))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::lt(field, value))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::lte(field, value))
    }

    pub fn in_values(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Filter::in_values(field, values))
    }

    pub fn nin_values(self, field: impl Into<String>, values: Vec<Value>) -> Self {
        self.filter(Filter::nin_values(field, values))
    }

    pub fn exists(self, field: impl Into<String>, exists: bool) -> Self {
        self.filter(Filter::exists(field, exists))
    }

    pub fn regex(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.filter(Filter::regex(field, pattern))
    }

    pub fn contains(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::contains(field, value))
    }

    pub fn starts_with(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter(Filter::starts_with(field, value))
    }

    pub fn ends_with(self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.filter(Filter::ends_with(field, value))
    }

    pub fn sort(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.query = self.query.with_sort(field, order);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.query.skip = skip;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    pub fn include(mut self, fields: Vec<String>) -> Self {
        self.query.projection = Some(Projection::Include(fields));
        self
    }

    pub fn exclude(mut self, fields: Vec<String>) -> Self {
        self.query.projection = Some(Projection::Exclude(fields));
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder_ands_filters() {
        let query = QueryBuilder::new()
            .eq("status", "active")
            .gte("age", 18i64)
            .lt("age", 65i64)
            .sort("age", SortOrder::Desc)
            .skip(5)
            .limit(10)
            .build();

        match &query.filter {
            Some(Filter::And { filters }) => assert_eq!(filters.len(), 3),
            other => panic!("expected AND filter, got {:?}", other),
        }
        assert_eq!(query.sort, vec![SortKey::desc("age")]);
        assert_eq!(query.skip, 5);
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn test_single_filter_is_not_wrapped() {
        let query = QueryBuilder::new().eq("x", 1i64).build();
        assert_eq!(query.filter, Some(Filter::eq("x", 1i64)));
    }

    #[test]
    fn test_query_serde_shape() {
        let query: Query = serde_json::from_value(json!({
            "filter": {"op": "and", "filters": [
                {"op": "gt", "field": "x", "value": 1},
                {"op": "in", "field": "tag", "value": ["a", "b"]}
            ]},
            "sort": [{"field": "x", "order": "desc"}, {"field": "y"}],
            "projection": {"mode": "include", "fields": ["x"]},
            "limit": 3
        }))
        .unwrap();

        assert_eq!(
            query.filter,
            Some(Filter::and(vec![
                Filter::gt("x", 1i64),
                Filter::in_values("tag", vec!["a".into(), "b".into()]),
            ]))
        );
        assert_eq!(query.sort, vec![SortKey::desc("x"), SortKey::asc("y")]);
        assert_eq!(query.skip, 0);
        assert_eq!(query.limit, Some(3));

        let text = serde_json::to_string(&query).unwrap();
        let back: Query = serde_json::from_str(&text).unwrap();
        assert_eq!(back, query);
    }

    #[test]
    fn test_projection_include() {
        let mut doc = Document::with_id("1")
            .with("name", "a")
            .with("age", 3i64)
            .with("address", Value::from(json!({"city": "x", "zip": "y"})));
        doc.created_at = Some(1);

        let projected = Projection::Include(vec!["name".into(), "address.city".into()]).apply(doc);
        assert_eq!(projected.id().map(|id| id.as_str()), Some("1"));
        assert_eq!(projected.len(), 2);
        assert_eq!(projected.get("address.city"), Some(&Value::from("x")));
        assert!(!projected.contains("address.zip"));
        assert_eq!(projected.created_at, None);
    }

    #[test]
    fn test_projection_exclude_keeps_id() {
        let doc = Document::with_id("1").with("name", "a").with("secret", "s");
        let projected =
            Projection::Exclude(vec!["secret".into(), ID_FIELD.into()]).apply(doc);
        assert_eq!(projected.id().map(|id| id.as_str()), Some("1"));
        assert!(projected.contains("name"));
        assert!(!projected.contains("secret"));
    }
}

//! Elisa Document - Document Collections and Query Engine
//!
//! Schema-validated document collections stored through pluggable record
//! stores. Documents are JSON-shaped values; queries are declarative
//! descriptors compiled into plans that stream results from a store scan or
//! a secondary index.
//!
//! Key Features:
//! - Tagged `Value` union with a total cross-type order
//! - Schema validation with defaults, nested objects, and strict mode
//! - Per-document reader/writer locking
//! - Query compiler with normalization, index access paths, and `explain`
//! - Databases owning named collections over a chosen driver
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod collection;
pub mod cursor;
pub mod database;
pub mod index;
mod lock;
pub mod plan;
pub mod query;
pub mod types;
pub mod validation;

pub use collection::{Collection, CollectionError, CollectionQuery, CollectionStats, Update};
pub use cursor::QueryCursor;
pub use database::{Database, DatabaseError, DatabaseStats};
pub use index::{DocumentIndex, IndexType};
pub use plan::{AccessPath, Plan, Predicate};
pub use query::{Filter, Projection, Query, QueryBuilder, QueryError, SortKey, SortOrder};
pub use types::{CodecError, Document, DocumentId, Map, Value};
pub use validation::{FieldSchema, FieldType, Pattern, Schema, SchemaBuilder, ValidationError, ValidationReport};

pub use elisa_storage::{Driver, DriverRegistry, Store};

//! Elisa Document Collection
//!
//! A named, schema-governed set of documents backed by one store. Writes
//! validate before anything is persisted and are serialized per document
//! identifier; reads and queries never wait on writes to other documents.
//!
//! Key Features:
//! - Insert, get, update (replace or patch), and remove with per-id locking
//! - Schema defaults and validation ahead of every write
//! - In-memory hash and B-tree secondary indexes
//! - Restartable `CollectionQuery` builder over the query planner
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::cursor::QueryCursor;
use crate::index::{DocumentIndex, IndexType};
use crate::lock::LockTable;
use crate::plan::{AccessPath, Plan};
use crate::query::{Filter, Projection, Query, QueryError, SortOrder};
use crate::types::{current_timestamp, CodecError, Document, DocumentId, Map, Value};
use crate::validation::{Schema, ValidationError};
use elisa_common::{ErrorKind, StoreError};
use elisa_storage::{Record, ScanCursor, ScanRange, Store, StoreStats};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

const DEFAULT_MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024; // 16MB
const MAX_ID_LENGTH: usize = 1024;

// =============================================================================
// Collection Error
// =============================================================================

/// Errors raised by collection operations.
#[derive(Error, Debug)]
pub enum CollectionError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("duplicate key: document '{0}' already exists")]
    DuplicateKey(String),

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("schema conflict: collection '{0}' already holds documents")]
    SchemaConflict(String),

    #[error("document too large: {size} bytes exceeds the {limit} byte limit")]
    DocumentTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("corrupt document '{id}': {source}")]
    Corrupt { id: String, source: CodecError },
}

impl CollectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(err) => err.kind(),
            Self::DuplicateKey(_) => ErrorKind::DuplicateKey,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::SchemaConflict(_) => ErrorKind::SchemaConflict,
            Self::DocumentTooLarge { .. } => ErrorKind::DocumentTooLarge,
            Self::Query(err) => err.kind(),
            Self::Store(err) => err.kind(),
            Self::Corrupt { .. } => ErrorKind::Corruption,
        }
    }
}

// =============================================================================
// Update
// =============================================================================

/// Change applied to a stored document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Update {
    /// Replace every user field. Server-assigned fields are kept.
    Replace { fields: Map },
    /// Set and unset individual fields by dotted path. Missing intermediate
    /// objects are created.
    Patch {
        #[serde(default)]
        set: Map,
        #[serde(default)]
        unset: Vec<String>,
    },
}

impl Update {
    pub fn replace(fields: Map) -> Self {
        Self::Replace { fields }
    }

    /// An empty patch.
    pub fn patch() -> Self {
        Self::Patch {
            set: Map::new(),
            unset: Vec::new(),
        }
    }

    /// Add a `set` to a patch. A replacement gets the field written into its
    /// new field map.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        match &mut self {
            Self::Patch { set, .. } | Self::Replace { fields: set } => {
                set.insert(path.into(), value.into());
            }
        }
        self
    }

    /// Add an `unset` to a patch. Ignored for replacements.
    pub fn unset(mut self, path: impl Into<String>) -> Self {
        if let Self::Patch { unset, .. } = &mut self {
            unset.push(path.into());
        }
        self
    }

    fn check(&self) -> Result<(), ValidationError> {
        let Self::Patch { set, unset } = self else {
            return Ok(());
        };
        for path in set.keys().chain(unset.iter()) {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(ValidationError::ConstraintViolation {
                    path: path.clone(),
                    message: "invalid field path".to_string(),
                });
            }
            if path.starts_with('_') {
                return Err(ValidationError::ConstraintViolation {
                    path: path.clone(),
                    message: "server-assigned fields cannot be modified".to_string(),
                });
            }
        }
        Ok(())
    }

    fn apply(&self, doc: &mut Document) -> Result<(), ValidationError> {
        match self {
            Self::Replace { fields } => {
                doc.fields = fields.clone();
                doc.strip_reserved();
            }
            Self::Patch { set, unset } => {
                for (path, value) in set {
                    doc.set_path(path, value.clone()).map_err(|err| {
                        ValidationError::ConstraintViolation {
                            path: path.clone(),
                            message: err.to_string(),
                        }
                    })?;
                }
                for path in unset {
                    doc.remove_path(path);
                }
            }
        }
        Ok(())
    }
}

// =============================================================================
// Statistics
// =============================================================================

/// Statistics for a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub name: String,
    pub document_count: u64,
    pub index_count: usize,
    pub inserts: u64,
    pub updates: u64,
    pub removes: u64,
    pub queries: u64,
    pub store: StoreStats,
}

#[derive(Debug, Default)]
struct Counters {
    inserts: AtomicU64,
    updates: AtomicU64,
    removes: AtomicU64,
    queries: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// =============================================================================
// Collection
// =============================================================================

struct CollectionInner {
    name: String,
    store: Arc<dyn Store>,
    schema: RwLock<Option<Schema>>,
    indexes: RwLock<BTreeMap<String, DocumentIndex>>,
    locks: LockTable,
    max_document_size: usize,
    counters: Counters,
}

/// A collection of documents. Cloning yields another handle to the same
/// collection.
#[derive(Clone)]
pub struct Collection {
    inner: Arc<CollectionInner>,
}

impl Collection {
    /// Create a collection over a store, without a schema.
    pub fn new(name: impl Into<String>, store: Arc<dyn Store>) -> Self {
        Self::build(name, store, None, DEFAULT_MAX_DOCUMENT_SIZE)
    }

    /// Create a collection with schema validation.
    pub fn with_schema(name: impl Into<String>, store: Arc<dyn Store>, schema: Schema) -> Self {
        Self::build(name, store, Some(schema), DEFAULT_MAX_DOCUMENT_SIZE)
    }

    pub(crate) fn build(
        name: impl Into<String>,
        store: Arc<dyn Store>,
        schema: Option<Schema>,
        max_document_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                name: name.into(),
                store,
                schema: RwLock::new(schema),
                indexes: RwLock::new(BTreeMap::new()),
                locks: LockTable::new(),
                max_document_size,
                counters: Counters::default(),
            }),
        }
    }

    /// Get the collection name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // -------------------------------------------------------------------------
    // Document Operations
    // -------------------------------------------------------------------------

    /// Insert a document, returning it as stored. An identifier is generated
    /// when the document has none.
    pub fn insert(&self, doc: Document) -> Result<Document, CollectionError> {
        let mut doc = doc;
        doc.strip_reserved();
        let id = match doc.id.take() {
            Some(id) => {
                check_id(&id)?;
                id
            }
            None => DocumentId::generate(),
        };

        // Held until the write lands so a schema swap cannot slip in between
        // validation and persistence.
        let schema = self.inner.schema.read();
        let mut doc = match schema.as_ref() {
            Some(schema) => schema.prepare(&doc)?,
            None => doc,
        };
        let now = current_timestamp();
        doc.id = Some(id.clone());
        doc.created_at = Some(now);
        doc.updated_at = Some(now);
        let record = self.encode(&id, &doc)?;

        let guard = self.inner.locks.write(&id);
        debug_assert!(guard.is_exclusive());
        if self.inner.store.get(id.as_str())?.is_some() {
            return Err(CollectionError::DuplicateKey(id.0));
        }
        self.inner.store.put(id.as_str(), record)?;
        for index in self.inner.indexes.write().values_mut() {
            index.index_document(&id, &doc);
        }
        drop(guard);
        drop(schema);

        bump(&self.inner.counters.inserts);
        Ok(doc)
    }

    /// Insert several documents in order, stopping at the first failure.
    /// Documents inserted before the failure stay inserted.
    pub fn insert_many(&self, docs: Vec<Document>) -> Result<Vec<Document>, CollectionError> {
        let mut inserted = Vec::with_capacity(docs.len());
        for doc in docs {
            inserted.push(self.insert(doc)?);
        }
        Ok(inserted)
    }

    /// Get a document by ID.
    pub fn get(&self, id: &DocumentId) -> Result<Option<Document>, CollectionError> {
        let _guard = self.inner.locks.read(id);
        match self.inner.store.get(id.as_str())? {
            Some(record) => Ok(Some(self.decode(id.as_str(), &record)?)),
            None => Ok(None),
        }
    }

    /// Check if a document exists.
    pub fn contains(&self, id: &DocumentId) -> Result<bool, CollectionError> {
        Ok(self.get(id)?.is_some())
    }

    /// Apply an update to a stored document and return the new version.
    ///
    /// The result is validated before it is written; on any failure the
    /// stored document is left untouched.
    pub fn update(&self, id: &DocumentId, update: Update) -> Result<Document, CollectionError> {
        update.check()?;

        let schema = self.inner.schema.read();
        let guard = self.inner.locks.write(id);
        debug_assert!(guard.is_exclusive());

        let record = self
            .inner
            .store
            .get(id.as_str())?
            .ok_or_else(|| CollectionError::NotFound(id.0.clone()))?;
        let current = self.decode(id.as_str(), &record)?;

        let mut next = current.clone();
        update.apply(&mut next)?;
        let mut next = match schema.as_ref() {
            Some(schema) => schema.prepare(&next)?,
            None => next,
        };
        next.id = Some(id.clone());
        next.created_at = current.created_at;
        next.updated_at = Some(current_timestamp().max(current.updated_at.unwrap_or(0)));

        let record = self.encode(id, &next)?;
        self.inner.store.put(id.as_str(), record)?;
        for index in self.inner.indexes.write().values_mut() {
            index.index_document(id, &next);
        }
        drop(guard);
        drop(schema);

        bump(&self.inner.counters.updates);
        Ok(next)
    }

    /// Remove a document, returning whether it existed.
    pub fn remove(&self, id: &DocumentId) -> Result<bool, CollectionError> {
        let guard = self.inner.locks.write(id);
        debug_assert!(guard.is_exclusive());

        let removed = self.inner.store.delete(id.as_str())?;
        if removed {
            for index in self.inner.indexes.write().values_mut() {
                index.remove_document(id);
            }
            bump(&self.inner.counters.removes);
        }
        Ok(removed)
    }

    /// Number of stored documents.
    pub fn len(&self) -> Result<usize, CollectionError> {
        Ok(self.inner.store.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, CollectionError> {
        Ok(self.inner.store.is_empty()?)
    }

    fn encode(&self, id: &DocumentId, doc: &Document) -> Result<Record, CollectionError> {
        if let Some(path) = doc.non_finite_path() {
            return Err(ValidationError::ConstraintViolation {
                path,
                message: "non-finite numbers cannot be stored".to_string(),
            }
            .into());
        }
        let record = doc.encode().map_err(|source| CollectionError::Corrupt {
            id: id.0.clone(),
            source,
        })?;
        if record.len() > self.inner.max_document_size {
            return Err(CollectionError::DocumentTooLarge {
                size: record.len(),
                limit: self.inner.max_document_size,
            });
        }
        Ok(record)
    }

    fn decode(&self, id: &str, record: &Record) -> Result<Document, CollectionError> {
        Document::decode(record).map_err(|source| CollectionError::Corrupt {
            id: id.to_string(),
            source,
        })
    }

    // -------------------------------------------------------------------------
    // Query Operations
    // -------------------------------------------------------------------------

    /// Begin a query against this collection.
    pub fn find(&self, query: Query) -> CollectionQuery {
        CollectionQuery {
            collection: self.clone(),
            query,
        }
    }

    /// First document matching `filter`, in identifier order.
    pub fn find_one(&self, filter: Filter) -> Result<Option<Document>, CollectionError> {
        Ok(self.find(Query::new().with_filter(filter)).first()?)
    }

    /// Count documents matching `filter`, or every document when `None`.
    pub fn count(&self, filter: Option<Filter>) -> Result<usize, CollectionError> {
        match filter {
            Some(filter) => Ok(self.find(Query::new().with_filter(filter)).count()?),
            None => self.len(),
        }
    }

    fn compile(&self, query: &Query) -> Result<Plan, QueryError> {
        let indexes = self.inner.indexes.read();
        Plan::compile(&self.inner.name, query, &index_types(&indexes))
    }

    /// Compile and start executing a query. Index candidates are collected
    /// under the same index snapshot the plan was compiled against.
    fn execute(&self, query: &Query) -> Result<QueryCursor, QueryError> {
        let (plan, candidates) = {
            let indexes = self.inner.indexes.read();
            let plan = Plan::compile(&self.inner.name, query, &index_types(&indexes))?;
            let candidates = candidate_ids(&plan, &indexes);
            (plan, candidates)
        };
        bump(&self.inner.counters.queries);

        if plan.is_empty() {
            return Ok(QueryCursor::empty());
        }
        let source = match candidates {
            Some(ids) => {
                let store = Arc::clone(&self.inner.store);
                let ids = ids.into_iter().map(|id| id.0).collect();
                ScanCursor::over_ids(ids, move |id| store.get(id))
            }
            None => self.inner.store.scan(ScanRange::All)?,
        };
        Ok(QueryCursor::run(&plan, source))
    }

    // -------------------------------------------------------------------------
    // Index Operations
    // -------------------------------------------------------------------------

    /// Create a secondary index over `field`, building it from the stored
    /// documents. Re-creating an index with the same type is a no-op; a
    /// different type replaces it.
    pub fn create_index(
        &self,
        field: impl Into<String>,
        index_type: IndexType,
    ) -> Result<(), CollectionError> {
        let field = field.into();
        if field.is_empty() || field.split('.').any(str::is_empty) {
            return Err(QueryError::invalid(format!("invalid index field {:?}", field)).into());
        }

        let mut indexes = self.inner.indexes.write();
        if indexes.get(&field).map(|i| i.index_type()) == Some(index_type) {
            return Ok(());
        }

        let mut index = DocumentIndex::new(field.clone(), index_type);
        for item in self.inner.store.scan(ScanRange::All)? {
            let (id, record) = item?;
            let doc = self.decode(&id, &record)?;
            index.index_document(&DocumentId(id), &doc);
        }
        tracing::info!(
            "Built {:?} index on '{}.{}' over {} documents",
            index_type,
            self.inner.name,
            field,
            index.len()
        );
        indexes.insert(field, index);
        Ok(())
    }

    /// Drop an index, returning whether it existed.
    pub fn drop_index(&self, field: &str) -> bool {
        let dropped = self.inner.indexes.write().remove(field).is_some();
        if dropped {
            tracing::debug!("Dropped index on '{}.{}'", self.inner.name, field);
        }
        dropped
    }

    /// Indexed fields, in name order.
    pub fn index_names(&self) -> Vec<String> {
        self.inner.indexes.read().keys().cloned().collect()
    }

    /// Indexed fields and their index types.
    pub fn indexes(&self) -> BTreeMap<String, IndexType> {
        index_types(&self.inner.indexes.read())
    }

    // -------------------------------------------------------------------------
    // Schema Operations
    // -------------------------------------------------------------------------

    pub fn schema(&self) -> Option<Schema> {
        self.inner.schema.read().clone()
    }

    /// Attach, replace, or detach the schema. Changing the schema of a
    /// collection that holds documents fails with `SchemaConflict`.
    pub fn attach_schema(&self, schema: Option<Schema>) -> Result<(), CollectionError> {
        let mut current = self.inner.schema.write();
        if *current == schema {
            return Ok(());
        }
        if !self.inner.store.is_empty()? {
            return Err(CollectionError::SchemaConflict(self.inner.name.clone()));
        }
        match &schema {
            Some(s) => tracing::info!("Attached schema '{}' to collection '{}'", s.name, self.inner.name),
            None => tracing::info!("Detached schema from collection '{}'", self.inner.name),
        }
        *current = schema;
        Ok(())
    }

    /// Report stored documents that do not satisfy the current schema.
    pub fn validate_all(&self) -> Result<Vec<(DocumentId, ValidationError)>, CollectionError> {
        let Some(schema) = self.schema() else {
            return Ok(Vec::new());
        };
        let mut invalid = Vec::new();
        for item in self.inner.store.scan(ScanRange::All)? {
            let (id, record) = item?;
            let doc = self.decode(&id, &record)?;
            if let Err(err) = schema.validate(&doc) {
                invalid.push((DocumentId(id), err));
            }
        }
        Ok(invalid)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    pub fn stats(&self) -> CollectionStats {
        let store = self.inner.store.stats();
        let counters = &self.inner.counters;
        CollectionStats {
            name: self.inner.name.clone(),
            document_count: store.record_count,
            index_count: self.inner.indexes.read().len(),
            inserts: counters.inserts.load(Ordering::Relaxed),
            updates: counters.updates.load(Ordering::Relaxed),
            removes: counters.removes.load(Ordering::Relaxed),
            queries: counters.queries.load(Ordering::Relaxed),
            store,
        }
    }

    /// Close the underlying store and drop the in-memory indexes.
    pub fn close(&self) -> Result<(), CollectionError> {
        self.inner.store.close()?;
        self.inner.indexes.write().clear();
        tracing::debug!("Closed collection '{}'", self.inner.name);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.store.is_closed()
    }
}

impl fmt::Debug for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.inner.name)
            .field("indexes", &self.index_names())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn check_id(id: &DocumentId) -> Result<(), ValidationError> {
    let message = if id.0.is_empty() {
        "identifier must not be empty"
    } else if id.0.len() > MAX_ID_LENGTH {
        "identifier is too long"
    } else {
        return Ok(());
    };
    Err(ValidationError::ConstraintViolation {
        path: crate::types::ID_FIELD.to_string(),
        message: message.to_string(),
    })
}

fn index_types(indexes: &BTreeMap<String, DocumentIndex>) -> BTreeMap<String, IndexType> {
    indexes
        .iter()
        .map(|(field, index)| (field.clone(), index.index_type()))
        .collect()
}

/// Candidate identifiers for index-backed plans; `None` means full scan.
/// Unordered candidates are returned in identifier order so every access
/// path yields the same natural order.
fn candidate_ids(
    plan: &Plan,
    indexes: &BTreeMap<String, DocumentIndex>,
) -> Option<Vec<DocumentId>> {
    match plan.access() {
        AccessPath::FullScan => None,
        AccessPath::IndexLookup { field, keys } => {
            indexes.get(field).map(|index| index.find_eq(keys))
        }
        AccessPath::IndexRange {
            field,
            lower,
            upper,
            ordered,
            descending,
        } => {
            let index = indexes.get(field)?;
            let mut ids = index.find_range(lower.as_ref(), upper.as_ref(), *descending)?;
            if !ordered {
                ids.sort();
            }
            Some(ids)
        }
    }
}

// =============================================================================
// Collection Query
// =============================================================================

/// A query bound to a collection. Building does not touch the store; each
/// call to `execute` (or a helper built on it) runs the query afresh.
#[derive(Clone)]
pub struct CollectionQuery {
    collection: Collection,
    query: Query,
}

impl CollectionQuery {
    /// AND a filter into the query.
    pub fn filter(mut self, filter: Filter) -> Self {
        self.query = self.query.with_filter(filter);
        self
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

    pub fn project(mut self, projection: Projection) -> Self {
        self.query.projection = Some(projection);
        self
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Compile the query against the collection's current indexes.
    pub fn compile(&self) -> Result<Plan, QueryError> {
        self.collection.compile(&self.query)
    }

    pub fn explain(&self) -> Result<String, QueryError> {
        Ok(self.compile()?.explain())
    }

    /// Run the query, returning a lazy cursor over the results.
    pub fn execute(&self) -> Result<QueryCursor, QueryError> {
        self.collection.execute(&self.query)
    }

    /// Run the query and collect every result.
    pub fn to_vec(&self) -> Result<Vec<Document>, QueryError> {
        self.execute()?.collect()
    }

    /// First result, if any.
    pub fn first(&self) -> Result<Option<Document>, QueryError> {
        let mut query = self.query.clone();
        query.limit = Some(query.limit.map_or(1, |l| l.min(1)));
        self.collection.execute(&query)?.next().transpose()
    }

    /// Number of results, after skip and limit.
    pub fn count(&self) -> Result<usize, QueryError> {
        let mut count = 0;
        for item in self.execute()? {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

impl fmt::Debug for CollectionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionQuery")
            .field("collection", &self.collection.name())
            .field("query", &self.query)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

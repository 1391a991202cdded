//! Elisa Database - Named Collection Sets
//!
//! A database owns a set of collections, each backed by its own store
//! opened through the configured driver at location `<database>/<collection>`.
//! Collections are created on first use and kept until dropped or until the
//! database closes.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::collection::{Collection, CollectionError, CollectionStats};
use crate::query::QueryError;
use crate::validation::Schema;
use elisa_common::{ConfigError, DatabaseConfig, DriverError, ErrorKind, StoreError};
use elisa_storage::{Driver, DriverRegistry};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

const MAX_COLLECTION_NAME_LENGTH: usize = 128;

// =============================================================================
// Database Error
// =============================================================================

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("invalid collection name {0:?}")]
    InvalidCollectionName(String),

    #[error("too many collections: limit is {0}")]
    TooManyCollections(usize),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("database '{0}' is closed")]
    DatabaseClosed(String),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DatabaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidCollectionName(_) => ErrorKind::InvalidCollectionName,
            Self::TooManyCollections(_) => ErrorKind::TooManyCollections,
            Self::CollectionNotFound(_) => ErrorKind::CollectionNotFound,
            Self::DatabaseClosed(_) => ErrorKind::DatabaseClosed,
            Self::Driver(err) => err.kind(),
            Self::Collection(err) => err.kind(),
            Self::Query(err) => err.kind(),
            Self::Config(err) => err.kind(),
            Self::Store(err) => err.kind(),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Statistics for a database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseStats {
    pub name: String,
    pub driver: String,
    pub collection_count: usize,
    pub document_count: u64,
    pub collections: Vec<CollectionStats>,
}

/// A named set of collections sharing one storage driver.
pub struct Database {
    config: DatabaseConfig,
    driver: Arc<dyn Driver>,
    collections: RwLock<BTreeMap<String, Collection>>,
    closed: AtomicBool,
}

impl Database {
    /// Open a database, resolving its driver from `registry`.
    pub fn open(config: DatabaseConfig, registry: &DriverRegistry) -> Result<Self, DatabaseError> {
        config.validate()?;
        let driver = registry.get(&config.driver)?;
        tracing::info!(
            "Opened database '{}' with the '{}' driver",
            config.name,
            config.driver
        );
        Ok(Self {
            config,
            driver,
            collections: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::DatabaseClosed(self.config.name.clone()));
        }
        Ok(())
    }

    fn location(&self, collection: &str) -> String {
        format!("{}/{}", self.config.name, collection)
    }

    // -------------------------------------------------------------------------
    // Collection Management
    // -------------------------------------------------------------------------

    /// Get a collection, creating it on first use.
    pub fn collection(&self, name: &str) -> Result<Collection, DatabaseError> {
        self.ensure_open()?;
        if let Some(existing) = self.collections.read().get(name) {
            return Ok(existing.clone());
        }
        self.materialize(name, None)
    }

    /// Get a collection that has already been materialized, without
    /// creating it.
    pub fn existing_collection(&self, name: &str) -> Result<Collection, DatabaseError> {
        self.ensure_open()?;
        self.collections
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DatabaseError::CollectionNotFound(name.to_string()))
    }

    /// Get a collection governed by `schema`, creating it on first use.
    ///
    /// An existing collection keeps its documents; attaching a different
    /// schema to one that is not empty fails with `SchemaConflict`.
    pub fn collection_with_schema(
        &self,
        name: &str,
        schema: Schema,
    ) -> Result<Collection, DatabaseError> {
        self.ensure_open()?;
        let existing = self.collections.read().get(name).cloned();
        match existing {
            Some(collection) => {
                collection.attach_schema(Some(schema))?;
                Ok(collection)
            }
            None => self.materialize(name, Some(schema)),
        }
    }

    fn materialize(&self, name: &str, schema: Option<Schema>) -> Result<Collection, DatabaseError> {
        validate_collection_name(name)?;

        let mut collections = self.collections.write();
        // Re-check under the write lock and after a concurrent close.
        self.ensure_open()?;
        if let Some(existing) = collections.get(name) {
            let existing = existing.clone();
            drop(collections);
            if schema.is_some() {
                existing.attach_schema(schema)?;
            }
            return Ok(existing);
        }
        if collections.len() >= self.config.max_collections {
            return Err(DatabaseError::TooManyCollections(self.config.max_collections));
        }

        // Schemas are not persisted, so a reopened store takes the declared
        // schema as is. `validate_all` reports documents it no longer fits.
        let store = self.driver.open(&self.location(name), &self.config.store)?;
        let collection = Collection::build(name, store, schema, self.config.max_document_size);
        collections.insert(name.to_string(), collection.clone());
        tracing::info!("Created collection '{}' in database '{}'", name, self.config.name);
        Ok(collection)
    }

    /// Close and discard a collection together with its stored documents.
    /// Returns whether the collection was materialized.
    pub fn drop_collection(&self, name: &str) -> Result<bool, DatabaseError> {
        self.ensure_open()?;
        validate_collection_name(name)?;

        // The map stays locked until the backing data is gone, so a
        // concurrent `collection(name)` cannot reopen the dropped store.
        let mut collections = self.collections.write();
        let removed = collections.remove(name);
        if let Some(collection) = &removed {
            collection.close()?;
        }
        self.driver.destroy(&self.location(name), &self.config.store)?;
        drop(collections);

        if removed.is_some() {
            tracing::info!("Dropped collection '{}' from database '{}'", name, self.config.name);
        }
        Ok(removed.is_some())
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.read().contains_key(name)
    }

    /// Names of the collections materialized so far, sorted.
    pub fn list_collections(&self) -> Vec<String> {
        self.collections.read().keys().cloned().collect()
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Close every collection. Idempotent; the first store error is returned
    /// after all collections have been closed.
    pub fn close(&self) -> Result<(), DatabaseError> {
        let collections = {
            let mut guard = self.collections.write();
            if self.closed.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            std::mem::take(&mut *guard)
        };

        let mut first_error = None;
        for (name, collection) in collections {
            if let Err(err) = collection.close() {
                tracing::warn!("Failed to close collection '{}': {}", name, err);
                first_error.get_or_insert(err);
            }
        }
        tracing::info!("Closed database '{}'", self.config.name);
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> DatabaseStats {
        let collections: Vec<CollectionStats> = self
            .collections
            .read()
            .values()
            .map(Collection::stats)
            .collect();
        DatabaseStats {
            name: self.config.name.clone(),
            driver: self.config.driver.clone(),
            collection_count: collections.len(),
            document_count: collections.iter().map(|c| c.document_count).sum(),
            collections,
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.config.name)
            .field("driver", &self.config.driver)
            .field("collections", &self.list_collections())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Check a collection name: non-empty, at most 128 bytes, no path
/// separators or NUL, and not a relative path component.
pub fn validate_collection_name(name: &str) -> Result<(), DatabaseError> {
    let valid = !name.is_empty()
        && name.len() <= MAX_COLLECTION_NAME_LENGTH
        && !name.contains(['/', '\\', '\0'])
        && name != "."
        && name != "..";
    if valid {
        Ok(())
    } else {
        Err(DatabaseError::InvalidCollectionName(name.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================

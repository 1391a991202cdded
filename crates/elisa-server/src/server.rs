//! Elisa Server - Session Host
//!
//! Owns the driver registry and the open databases, hands out connections
//! up to the configured limit, and dispatches decoded requests into the
//! core. Dispatch is synchronous; connections run it on blocking workers.
//!
//! Key Features:
//! - Databases opened from configuration or at runtime
//! - Connection admission bounded by `max_connections`
//! - One dispatch routine shared by every connection
//! - Orderly shutdown closing every database
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::connection::Connection;
use crate::error::ServerError;
use crate::protocol::Request;
use elisa_common::{DatabaseConfig, ServerConfig};
use elisa_document::{Database, DriverRegistry};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

// =============================================================================
// Server
// =============================================================================

pub(crate) struct ServerInner {
    config: ServerConfig,
    registry: DriverRegistry,
    databases: RwLock<BTreeMap<String, Arc<Database>>>,
    active_connections: AtomicUsize,
    next_connection_id: AtomicU64,
    shut_down: AtomicBool,
}

/// Hosts databases and the sessions that use them. Cloning yields another
/// handle to the same server.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Create a server with the bundled drivers and no open databases.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        Self::with_registry(config, DriverRegistry::with_defaults())
    }

    /// Create a server that resolves drivers from `registry`.
    pub fn with_registry(
        config: ServerConfig,
        registry: DriverRegistry,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                registry,
                databases: RwLock::new(BTreeMap::new()),
                active_connections: AtomicUsize::new(0),
                next_connection_id: AtomicU64::new(1),
                shut_down: AtomicBool::new(false),
            }),
        })
    }

    /// Create a server and open every database its configuration declares.
    pub fn start(config: ServerConfig) -> Result<Self, ServerError> {
        let server = Self::new(config)?;
        for db in server.inner.config.databases.clone() {
            server.open_database(db)?;
        }
        tracing::info!(
            "Server started with {} database(s), accepting up to {} connections",
            server.inner.databases.read().len(),
            server.inner.config.max_connections
        );
        Ok(server)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.inner.config
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.inner.registry
    }

    // -------------------------------------------------------------------------
    // Databases
    // -------------------------------------------------------------------------

    /// Open a database and make it addressable by name.
    pub fn open_database(&self, config: DatabaseConfig) -> Result<Arc<Database>, ServerError> {
        self.inner.ensure_running()?;
        let mut databases = self.inner.databases.write();
        if databases.contains_key(&config.name) {
            return Err(ServerError::DatabaseExists(config.name));
        }
        let name = config.name.clone();
        let database = Arc::new(Database::open(config, &self.inner.registry)?);
        databases.insert(name, Arc::clone(&database));
        Ok(database)
    }

    pub fn database(&self, name: &str) -> Result<Arc<Database>, ServerError> {
        self.inner.database(name)
    }

    pub fn database_names(&self) -> Vec<String> {
        self.inner.databases.read().keys().cloned().collect()
    }

    /// Close a database and forget it, returning whether it was open.
    pub fn close_database(&self, name: &str) -> Result<bool, ServerError> {
        let removed = self.inner.databases.write().remove(name);
        match removed {
            Some(database) => {
                database.close()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // -------------------------------------------------------------------------
    // Connections
    // -------------------------------------------------------------------------

    /// Open a session. Fails with `TooManyConnections` at the limit.
    pub fn connect(&self) -> Result<Connection, ServerError> {
        self.inner.ensure_running()?;
        let limit = self.inner.config.max_connections;
        self.inner
            .active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < limit).then_some(n + 1)
            })
            .map_err(|_| ServerError::TooManyConnections(limit))?;

        let id = self.inner.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Connection {} opened", id);
        Ok(Connection::new(id, Arc::clone(&self.inner)))
    }

    pub fn active_connections(&self) -> usize {
        self.inner.active_connections.load(Ordering::Acquire)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Stop accepting work and close every database. Idempotent.
    pub fn shutdown(&self) -> Result<(), ServerError> {
        if self.inner.shut_down.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let databases = std::mem::take(&mut *self.inner.databases.write());
        let mut first_error = None;
        for (name, database) in databases {
            if let Err(err) = database.close() {
                tracing::warn!("Failed to close database '{}': {}", name, err);
                first_error.get_or_insert(err);
            }
        }
        tracing::info!("Server shut down");
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("databases", &self.database_names())
            .field("active_connections", &self.active_connections())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// =============================================================================
// Dispatch
// =============================================================================

impl ServerInner {
    pub(crate) fn ensure_running(&self) -> Result<(), ServerError> {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(ServerError::ShutDown);
        }
        Ok(())
    }

    fn database(&self, name: &str) -> Result<Arc<Database>, ServerError> {
        self.databases
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ServerError::DatabaseNotFound(name.to_string()))
    }

    pub(crate) fn release_connection(&self) {
        self.active_connections.fetch_sub(1, Ordering::AcqRel);
    }

    /// Run one request against the core.
    pub(crate) fn handle(&self, request: Request) -> Result<JsonValue, ServerError> {
        self.ensure_running()?;
        let db = self.database(request.database())?;

        match request {
            Request::Insert {
                collection,
                document,
                ..
            } => to_json(&db.collection(&collection)?.insert(document)?),
            Request::InsertMany {
                collection,
                documents,
                ..
            } => to_json(&db.collection(&collection)?.insert_many(documents)?),
            Request::Get { collection, id, .. } => {
                to_json(&db.collection(&collection)?.get(&id)?)
            }
            Request::Update {
                collection,
                id,
                update,
                ..
            } => to_json(&db.collection(&collection)?.update(&id, update)?),
            Request::Remove { collection, id, .. } => {
                Ok(json!(db.collection(&collection)?.remove(&id)?))
            }
            Request::Find {
                collection, query, ..
            } => to_json(&db.collection(&collection)?.find(query).to_vec()?),
            Request::Count {
                collection, filter, ..
            } => Ok(json!(db.collection(&collection)?.count(filter)?)),
            Request::Explain {
                collection, query, ..
            } => Ok(json!(db.collection(&collection)?.find(query).explain()?)),
            Request::Collection {
                collection, schema, ..
            } => {
                let handle = match schema {
                    Some(schema) => db.collection_with_schema(&collection, schema)?,
                    None => db.collection(&collection)?,
                };
                Ok(json!({
                    "name": handle.name(),
                    "documents": handle.len()?,
                    "indexes": handle.index_names(),
                }))
            }
            Request::DropCollection { collection, .. } => {
                Ok(json!(db.drop_collection(&collection)?))
            }
            Request::ListCollections { .. } => Ok(json!(db.list_collections())),
            Request::CreateIndex {
                collection,
                field,
                index_type,
                ..
            } => {
                db.collection(&collection)?.create_index(field, index_type)?;
                Ok(JsonValue::Null)
            }
            Request::DropIndex {
                collection, field, ..
            } => Ok(json!(db.existing_collection(&collection)?.drop_index(&field))),
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<JsonValue, ServerError> {
    serde_json::to_value(value).map_err(|e| ServerError::Internal(e.to_string()))
}

// =============================================================================
// Tests
// =============================================================================

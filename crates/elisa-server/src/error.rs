//! Elisa Server Error
//!
//! Errors raised by the session layer. Every error maps onto an
//! [`ErrorKind`] so a response always carries a stable discriminant.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use elisa_common::{ConfigError, ErrorKind};
use elisa_document::{CollectionError, DatabaseError, QueryError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("database '{0}' is already open")]
    DatabaseExists(String),

    #[error("too many connections: limit is {0}")]
    TooManyConnections(usize),

    #[error("connection {0} is closed")]
    ConnectionClosed(u64),

    #[error("server is shut down")]
    ShutDown,

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DatabaseNotFound(_) => ErrorKind::DatabaseNotFound,
            Self::DatabaseExists(_) => ErrorKind::InvalidConfig,
            Self::TooManyConnections(_) => ErrorKind::TooManyConnections,
            Self::ConnectionClosed(_) | Self::ShutDown => ErrorKind::ConnectionClosed,
            Self::MalformedRequest(_) => ErrorKind::MalformedRequest,
            Self::Database(err) => err.kind(),
            Self::Collection(err) => err.kind(),
            Self::Query(err) => err.kind(),
            Self::Config(err) => err.kind(),
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

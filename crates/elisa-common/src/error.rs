//! Elisa Error - Shared Error Types
//!
//! Error kinds for every failure the engine can report, plus the error types
//! of the storage layer which are shared by all drivers. Higher layers define
//! their own error enums and map them onto [`ErrorKind`] so that a remote
//! caller always receives a stable discriminant.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// Error Kind
// =============================================================================

/// Discriminant of every failure reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    // Validation
    MissingField,
    TypeMismatch,
    ConstraintViolation,
    UnknownField,

    // Collection
    DuplicateKey,
    NotFound,
    SchemaConflict,
    DocumentTooLarge,

    // Database
    CollectionNotFound,
    InvalidCollectionName,
    TooManyCollections,
    DatabaseClosed,
    DatabaseNotFound,

    // Storage
    IoFailure,
    CapacityExceeded,
    StoreClosed,
    Corruption,

    // Driver
    UnknownDriver,
    InvalidConfig,

    // Query
    InvalidQuery,

    // Session
    TooManyConnections,
    ConnectionClosed,
    MalformedRequest,

    Internal,
}

impl ErrorKind {
    /// Returns true if repeating the same operation may succeed.
    ///
    /// `IoFailure` is not retryable: the outcome of a failed write is unknown
    /// and must be re-checked by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::TooManyConnections)
    }

    /// Returns true if the failure was caused by the caller's input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingField
                | ErrorKind::TypeMismatch
                | ErrorKind::ConstraintViolation
                | ErrorKind::UnknownField
                | ErrorKind::DuplicateKey
                | ErrorKind::NotFound
                | ErrorKind::SchemaConflict
                | ErrorKind::DocumentTooLarge
                | ErrorKind::CollectionNotFound
                | ErrorKind::InvalidCollectionName
                | ErrorKind::InvalidQuery
                | ErrorKind::UnknownDriver
                | ErrorKind::InvalidConfig
                | ErrorKind::MalformedRequest
        )
    }

    /// Returns true if this kind comes from schema validation.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            ErrorKind::MissingField
                | ErrorKind::TypeMismatch
                | ErrorKind::ConstraintViolation
                | ErrorKind::UnknownField
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Errors raised by a storage backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O failure: {0}")]
    IoFailure(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("store is closed")]
    StoreClosed,

    #[error("corruption detected: {0}")]
    Corruption(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Io(_) | StoreError::IoFailure(_) => ErrorKind::IoFailure,
            StoreError::CapacityExceeded(_) => ErrorKind::CapacityExceeded,
            StoreError::StoreClosed => ErrorKind::StoreClosed,
            StoreError::Corruption(_) => ErrorKind::Corruption,
        }
    }

    /// Returns true if the store rejected the call because it was closed.
    pub fn is_closed(&self) -> bool {
        matches!(self, StoreError::StoreClosed)
    }
}

// =============================================================================
// Driver Error
// =============================================================================

/// Errors raised while resolving or opening a driver.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    #[error("invalid driver configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DriverError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DriverError::UnknownDriver(_) => ErrorKind::UnknownDriver,
            DriverError::InvalidConfig(_) => ErrorKind::InvalidConfig,
            DriverError::Store(err) => err.kind(),
        }
    }
}

impl From<std::io::Error> for DriverError {
    fn from(err: std::io::Error) -> Self {
        DriverError::Store(StoreError::Io(err))
    }
}

// =============================================================================
// Configuration Error
// =============================================================================

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Parse(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidConfig
    }
}

// =============================================================================
// Tests
// =============================================================================

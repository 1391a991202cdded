//! Elisa Common - Shared Types and Utilities
//!
//! Foundational error kinds, configuration, and helpers used by every Elisa
//! crate. Keeps the storage, document, and server layers speaking the same
//! error vocabulary.
//!
//! Key Features:
//! - Wire-stable error kinds with retryable / user error classification
//! - Store and driver error types shared by every backend
//! - Store, database, and server configuration loadable from TOML
//! - Hashing and checksum helpers
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod config;
pub mod error;
pub mod utils;

pub use config::{DatabaseConfig, Durability, ServerConfig, StoreConfig};
pub use error::{ConfigError, DriverError, ErrorKind, StoreError};

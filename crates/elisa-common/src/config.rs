//! Elisa Config - Configuration Structures
//!
//! Configuration types for stores, databases, and the session server.
//! Supports loading from TOML files and programmatic construction, with
//! defaults suited to development.
//!
//! Key Features:
//! - Backend-agnostic store options (path, cache size, durability, quotas)
//! - Database options (driver name, collection and document limits)
//! - Server options (connection limit, databases opened at startup)
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

// =============================================================================
// Store Configuration
// =============================================================================

/// Write durability requested from a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Durability {
    /// Every write is flushed to stable storage before it returns.
    Sync,
    /// Writes are handed to the OS and flushed lazily.
    #[default]
    Async,
}

/// Options handed to a driver when it opens a store.
///
/// Each backend reads the keys it understands and ignores the rest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Root directory for disk-backed drivers.
    pub path: Option<PathBuf>,
    /// Number of records kept in a backend read cache.
    pub cache_size: usize,
    pub durability: Durability,
    /// Maximum number of records a single store may hold.
    pub max_records: Option<u64>,
    /// Maximum number of record bytes a single store may hold.
    pub max_bytes: Option<u64>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            cache_size: 1024,
            durability: Durability::Async,
            max_records: None,
            max_bytes: None,
        }
    }
}

impl StoreConfig {
    /// Create a store configuration rooted at a filesystem location.
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Default::default()
        }
    }

    pub fn with_durability(mut self, durability: Durability) -> Self {
        self.durability = durability;
        self
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size;
        self
    }

    pub fn with_max_records(mut self, max_records: u64) -> Self {
        self.max_records = Some(max_records);
        self
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }
}

// =============================================================================
// Database Configuration
// =============================================================================

/// Configuration for a single database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub name: String,
    /// Name of the registered driver backing every collection.
    pub driver: String,
    pub store: StoreConfig,
    pub max_collections: usize,
    /// Largest encoded document accepted by a collection, in bytes.
    pub max_document_size: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            driver: "memory".to_string(),
            store: StoreConfig::default(),
            max_collections: 1000,
            max_document_size: 16 * 1024 * 1024, // 16MB
        }
    }
}

impl DatabaseConfig {
    /// In-memory database with the given name.
    pub fn memory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Disk-backed database rooted at `path`.
    pub fn on_disk(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            driver: "log".to_string(),
            store: StoreConfig::at(path),
            ..Default::default()
        }
    }

    pub fn with_store(mut self, store: StoreConfig) -> Self {
        self.store = store;
        self
    }

    /// Parse a database configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a database configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Check the configuration for values no driver could honor.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("database name is empty".to_string()));
        }
        if self.driver.is_empty() {
            return Err(ConfigError::Invalid("driver name is empty".to_string()));
        }
        if self.max_collections == 0 {
            return Err(ConfigError::Invalid(
                "max_collections must be greater than zero".to_string(),
            ));
        }
        if self.max_document_size == 0 {
            return Err(ConfigError::Invalid(
                "max_document_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Server Configuration
// =============================================================================

/// Configuration for the session server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub max_connections: usize,
    /// Databases opened when the server starts.
    pub databases: Vec<DatabaseConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            databases: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Parse a server configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a server configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than zero".to_string(),
            ));
        }

        let mut names = std::collections::HashSet::new();
        for db in &self.databases {
            db.validate()?;
            if !names.insert(db.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "database '{}' is declared twice",
                    db.name
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DatabaseConfig::default();
        assert_eq!(config.driver, "memory");
        assert_eq!(config.store.durability, Durability::Async);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_database_from_toml() {
        let config = DatabaseConfig::from_toml_str(
            r#"
            name = "inventory"
            driver = "log"
            max_collections = 8

            [store]
            path = "/var/lib/elisa"
            cache_size = 64
            durability = "sync"
            max_records = 10000
            "#,
        )
        .unwrap();

        assert_eq!(config.name, "inventory");
        assert_eq!(config.driver, "log");
        assert_eq!(config.max_collections, 8);
        assert_eq!(config.store.path, Some(PathBuf::from("/var/lib/elisa")));
        assert_eq!(config.store.cache_size, 64);
        assert_eq!(config.store.durability, Durability::Sync);
        assert_eq!(config.store.max_records, Some(10000));
        assert_eq!(config.max_document_size, 16 * 1024 * 1024);
    }

    #[test]
    fn test_invalid_toml() {
        let err = DatabaseConfig::from_toml_str("name = ").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));

        let err = DatabaseConfig::from_toml_str("name = \"\"").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_server_rejects_duplicate_databases() {
        let err = ServerConfig::from_toml_str(
            r#"
            [[databases]]
            name = "a"

            [[databases]]
            name = "a"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("elisa.toml");
        std::fs::write(&path, "max_connections = 4\n").unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.max_connections, 4);
        assert!(config.databases.is_empty());
    }
}

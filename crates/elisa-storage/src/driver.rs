//! Elisa Driver - Backend Factories
//!
//! A driver opens stores of one backend kind for a named location. Databases
//! pick their driver by name from a registry, so new backends plug in
//! without touching the document layer.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::log::LogDriver;
use crate::memory::MemoryDriver;
use crate::store::Store;
use elisa_common::{DriverError, StoreConfig};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

// =============================================================================
// Driver Trait
// =============================================================================

/// Factory for stores of a single backend kind.
pub trait Driver: Send + Sync {
    /// Name the driver is registered under.
    fn name(&self) -> &str;

    /// Open (creating if needed) the store for `location`.
    fn open(&self, location: &str, config: &StoreConfig) -> Result<Arc<dyn Store>, DriverError>;

    /// Permanently remove whatever the driver keeps for `location`.
    fn destroy(&self, location: &str, config: &StoreConfig) -> Result<(), DriverError>;
}

// =============================================================================
// Driver Registry
// =============================================================================

/// Named collection of drivers.
#[derive(Default)]
pub struct DriverRegistry {
    drivers: RwLock<HashMap<String, Arc<dyn Driver>>>,
}

impl DriverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry holding the bundled `memory` and `log` drivers.
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(MemoryDriver));
        registry.register(Arc::new(LogDriver));
        registry
    }

    /// Register a driver, replacing any previous driver of the same name.
    pub fn register(&self, driver: Arc<dyn Driver>) -> Option<Arc<dyn Driver>> {
        let name = driver.name().to_string();
        tracing::debug!("Registering storage driver '{}'", name);
        self.drivers.write().insert(name, driver)
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Driver>, DriverError> {
        self.drivers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| DriverError::UnknownDriver(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.drivers.read().contains_key(name)
    }

    /// Open a store through the named driver.
    pub fn open(
        &self,
        driver: &str,
        location: &str,
        config: &StoreConfig,
    ) -> Result<Arc<dyn Store>, DriverError> {
        self.get(driver)?.open(location, config)
    }

    /// Registered driver names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.names())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

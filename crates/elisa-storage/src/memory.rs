//! Elisa Memory Store - In-Memory Backend
//!
//! Ordered in-memory record map for tests and ephemeral databases. Data
//! lives exactly as long as the store; closing it releases every record.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::driver::Driver;
use crate::store::{ids_in_range, OpCounters, Record, ScanCursor, ScanRange, Store, StoreStats};
use elisa_common::{DriverError, StoreConfig, StoreError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;

// =============================================================================
// Memory Store
// =============================================================================

struct MemoryState {
    records: BTreeMap<String, Record>,
    total_bytes: u64,
    closed: bool,
}

struct MemoryInner {
    state: RwLock<MemoryState>,
    counters: OpCounters,
    max_records: Option<u64>,
    max_bytes: Option<u64>,
}

impl MemoryInner {
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let state = self.state.read();
        if state.closed {
            return Err(StoreError::StoreClosed);
        }
        self.counters.read();
        Ok(state.records.get(id).cloned())
    }
}

/// In-memory store backed by an ordered map.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    /// Create a store honoring the quota keys of `config`.
    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                state: RwLock::new(MemoryState {
                    records: BTreeMap::new(),
                    total_bytes: 0,
                    closed: false,
                }),
                counters: OpCounters::default(),
                max_records: config.max_records,
                max_bytes: config.max_bytes,
            }),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Store for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        self.inner.get(id)
    }

    fn put(&self, id: &str, record: Record) -> Result<(), StoreError> {
        let mut state = self.inner.state.write();
        if state.closed {
            return Err(StoreError::StoreClosed);
        }

        let previous = state.records.get(id).map(|r| r.len() as u64);
        let new_count = state.records.len() as u64 + u64::from(previous.is_none());
        let new_bytes = state.total_bytes - previous.unwrap_or(0) + record.len() as u64;

        if let Some(max) = self.inner.max_records {
            if new_count > max {
                return Err(StoreError::CapacityExceeded(format!(
                    "record limit of {} reached",
                    max
                )));
            }
        }
        if let Some(max) = self.inner.max_bytes {
            if new_bytes > max {
                return Err(StoreError::CapacityExceeded(format!(
                    "byte limit of {} reached",
                    max
                )));
            }
        }

        state.records.insert(id.to_string(), record);
        state.total_bytes = new_bytes;
        self.inner.counters.write();
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.inner.state.write();
        if state.closed {
            return Err(StoreError::StoreClosed);
        }

        self.inner.counters.delete();
        match state.records.remove(id) {
            Some(record) => {
                state.total_bytes -= record.len() as u64;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn scan(&self, range: ScanRange) -> Result<ScanCursor, StoreError> {
        let ids = {
            let state = self.inner.state.read();
            if state.closed {
                return Err(StoreError::StoreClosed);
            }
            ids_in_range(&state.records, &range)
        };
        self.inner.counters.scan();

        let inner = Arc::clone(&self.inner);
        Ok(ScanCursor::over_ids(ids, move |id| inner.get(id)))
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut state = self.inner.state.write();
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.records.clear();
        state.total_bytes = 0;
        tracing::debug!("Closed memory store");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.state.read().closed
    }

    fn len(&self) -> Result<usize, StoreError> {
        let state = self.inner.state.read();
        if state.closed {
            return Err(StoreError::StoreClosed);
        }
        Ok(state.records.len())
    }

    fn stats(&self) -> StoreStats {
        let state = self.inner.state.read();
        self.inner
            .counters
            .snapshot(state.records.len() as u64, state.total_bytes)
    }
}

// =============================================================================
// Memory Driver
// =============================================================================

/// Driver handing out independent in-memory stores.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryDriver;

impl MemoryDriver {
    pub const NAME: &'static str = "memory";
}

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&self, location: &str, config: &StoreConfig) -> Result<Arc<dyn Store>, DriverError> {
        tracing::debug!("Opening memory store for {}", location);
        Ok(Arc::new(MemoryStore::with_config(config)))
    }

    fn destroy(&self, _location: &str, _config: &StoreConfig) -> Result<(), DriverError> {
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Elisa Lock Table - Per-Document Locking
//!
//! Reader/writer locks keyed by document identifier. Reads of the same
//! document share a lock, a write excludes every other operation on that
//! document, and operations on different documents never contend. Slots
//! are created on demand and reclaimed once no guard holds them.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::types::DocumentId;
use elisa_common::utils::bucket_for;
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, Mutex, RawRwLock, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

const DEFAULT_SHARDS: usize = 16;

type Slot = Arc<RwLock<()>>;

// =============================================================================
// Lock Table
// =============================================================================

/// Sharded map from document identifier to its lock.
pub(crate) struct LockTable {
    shards: Vec<Mutex<HashMap<DocumentId, Slot>>>,
}

impl LockTable {
    pub(crate) fn new() -> Self {
        Self::with_shards(DEFAULT_SHARDS)
    }

    pub(crate) fn with_shards(shards: usize) -> Self {
        Self {
            shards: (0..shards.max(1)).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, id: &DocumentId) -> &Mutex<HashMap<DocumentId, Slot>> {
        &self.shards[bucket_for(id.as_str().as_bytes(), self.shards.len())]
    }

    fn slot(&self, id: &DocumentId) -> Slot {
        Arc::clone(self.shard(id).lock().entry(id.clone()).or_default())
    }

    /// Acquire a shared guard on `id`.
    pub(crate) fn read(&self, id: &DocumentId) -> DocumentGuard<'_> {
        let guard = self.slot(id).read_arc();
        DocumentGuard {
            table: self,
            id: id.clone(),
            held: Some(Held::Read(guard)),
        }
    }

    /// Acquire an exclusive guard on `id`.
    pub(crate) fn write(&self, id: &DocumentId) -> DocumentGuard<'_> {
        let guard = self.slot(id).write_arc();
        DocumentGuard {
            table: self,
            id: id.clone(),
            held: Some(Held::Write(guard)),
        }
    }

    #[cfg(test)]
    fn try_write(&self, id: &DocumentId) -> Option<DocumentGuard<'_>> {
        let guard = self.slot(id).try_write_arc();
        let guard = guard.map(|g| DocumentGuard {
            table: self,
            id: id.clone(),
            held: Some(Held::Write(g)),
        });
        if guard.is_none() {
            self.release(id);
        }
        guard
    }

    /// Number of identifiers that currently have a slot.
    pub(crate) fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Drop the slot for `id` if nothing else references it. Clones of a
    /// slot are only made under the shard mutex, so the count cannot grow
    /// while it is being checked.
    fn release(&self, id: &DocumentId) {
        let mut shard = self.shard(id).lock();
        if shard.get(id).is_some_and(|slot| Arc::strong_count(slot) == 1) {
            shard.remove(id);
        }
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Guards
// =============================================================================

enum Held {
    Read(#[allow(dead_code)] ArcRwLockReadGuard<RawRwLock, ()>),
    Write(#[allow(dead_code)] ArcRwLockWriteGuard<RawRwLock, ()>),
}

/// A held lock on one document. Releasing it reclaims the slot when no
/// other guard or waiter references it.
pub(crate) struct DocumentGuard<'a> {
    table: &'a LockTable,
    id: DocumentId,
    held: Option<Held>,
}

impl DocumentGuard<'_> {
    pub(crate) fn is_exclusive(&self) -> bool {
        matches!(self.held, Some(Held::Write(_)))
    }
}

impl Drop for DocumentGuard<'_> {
    fn drop(&mut self) {
        // Unlock before checking the slot so our own reference is gone.
        drop(self.held.take());
        self.table.release(&self.id);
    }
}

// =============================================================================
// Tests
// =============================================================================

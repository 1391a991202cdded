//! Elisa Store - Record Store Contract
//!
//! Defines the backend-agnostic store interface. Every operation is keyed by
//! a document identifier; records are opaque bytes. Any backend honoring this
//! contract can sit underneath a collection.
//!
//! Key Features:
//! - Upsert, point read, and delete by identifier
//! - Scans over all identifiers, a prefix, or a lexicographic range
//! - Independent, fused cursors that capture identifiers at call time
//! - Idempotent close; every later call fails with `StoreClosed`
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use bytes::Bytes;
use elisa_common::StoreError;
use std::fmt;
use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Record
// =============================================================================

/// An opaque, immutable unit of stored bytes.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct Record(Bytes);

impl Record {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Record({} bytes)", self.0.len())
    }
}

impl From<Vec<u8>> for Record {
    fn from(data: Vec<u8>) -> Self {
        Self(Bytes::from(data))
    }
}

impl From<Bytes> for Record {
    fn from(data: Bytes) -> Self {
        Self(data)
    }
}

impl From<&'static str> for Record {
    fn from(data: &'static str) -> Self {
        Self(Bytes::from_static(data.as_bytes()))
    }
}

// =============================================================================
// Scan Range
// =============================================================================

/// Which identifiers a scan visits.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ScanRange {
    #[default]
    All,
    /// Identifiers starting with the given prefix.
    Prefix(String),
    /// Identifiers within lexicographic bounds.
    Range {
        start: Bound<String>,
        end: Bound<String>,
    },
}

impl ScanRange {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    /// Half-open range `[start, end)`.
    pub fn between(start: impl Into<String>, end: impl Into<String>) -> Self {
        Self::Range {
            start: Bound::Included(start.into()),
            end: Bound::Excluded(end.into()),
        }
    }

    /// Check whether an identifier falls inside this range.
    pub fn contains(&self, id: &str) -> bool {
        let above = match self.lower_bound() {
            Bound::Included(s) => id >= s,
            Bound::Excluded(s) => id > s,
            Bound::Unbounded => true,
        };
        above && self.not_past_end(id)
    }

    /// False once an ascending walk has moved beyond the range.
    fn not_past_end(&self, id: &str) -> bool {
        match self {
            Self::All => true,
            Self::Prefix(prefix) => id.starts_with(prefix.as_str()),
            Self::Range { end, .. } => match end {
                Bound::Included(e) => id <= e.as_str(),
                Bound::Excluded(e) => id < e.as_str(),
                Bound::Unbounded => true,
            },
        }
    }

    /// Lower bound usable with an ordered map keyed by identifier.
    pub fn lower_bound(&self) -> Bound<&str> {
        match self {
            Self::All => Bound::Unbounded,
            Self::Prefix(prefix) => Bound::Included(prefix.as_str()),
            Self::Range { start, .. } => match start {
                Bound::Included(s) => Bound::Included(s.as_str()),
                Bound::Excluded(s) => Bound::Excluded(s.as_str()),
                Bound::Unbounded => Bound::Unbounded,
            },
        }
    }
}

/// Collect the identifiers of an ordered map that fall in `range`.
pub(crate) fn ids_in_range<'a, V: 'a>(
    map: &'a std::collections::BTreeMap<String, V>,
    range: &ScanRange,
) -> Vec<String> {
    let lower = range.lower_bound();
    map.range::<str, _>((lower, Bound::Unbounded))
        .map(|(id, _)| id)
        .take_while(|id| range.not_past_end(id))
        .cloned()
        .collect()
}

// =============================================================================
// Scan Cursor
// =============================================================================

type ScanItem = Result<(String, Record), StoreError>;

/// A lazy, finite sequence of `(id, record)` pairs.
///
/// A failure is yielded exactly once, after which the cursor is exhausted,
/// so callers can tell "no more records" apart from "scan failed".
pub struct ScanCursor {
    inner: Box<dyn Iterator<Item = ScanItem> + Send>,
    done: bool,
}

impl ScanCursor {
    pub fn new(inner: impl Iterator<Item = ScanItem> + Send + 'static) -> Self {
        Self {
            inner: Box::new(inner),
            done: false,
        }
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    /// Build a cursor over an identifier snapshot, fetching each record
    /// lazily. Identifiers whose record is gone by the time they are
    /// reached are skipped.
    pub fn over_ids<F>(ids: Vec<String>, mut fetch: F) -> Self
    where
        F: FnMut(&str) -> Result<Option<Record>, StoreError> + Send + 'static,
    {
        let iter = ids.into_iter().filter_map(move |id| match fetch(&id) {
            Ok(Some(record)) => Some(Ok((id, record))),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        });
        Self::new(iter)
    }
}

impl Iterator for ScanCursor {
    type Item = ScanItem;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.inner.next() {
            Some(Ok(item)) => Some(Ok(item)),
            Some(Err(err)) => {
                self.done = true;
                Some(Err(err))
            }
            None => {
                self.done = true;
                None
            }
        }
    }
}

impl std::iter::FusedIterator for ScanCursor {}

impl fmt::Debug for ScanCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanCursor").field("done", &self.done).finish()
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Pluggable record store interface.
pub trait Store: Send + Sync {
    /// Read the record stored under `id`.
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError>;

    /// Insert or replace the record stored under `id`.
    fn put(&self, id: &str, record: Record) -> Result<(), StoreError>;

    /// Remove the record stored under `id`, returning whether one existed.
    fn delete(&self, id: &str) -> Result<bool, StoreError>;

    /// Start an independent scan over the identifiers present right now.
    fn scan(&self, range: ScanRange) -> Result<ScanCursor, StoreError>;

    /// Release backend resources. Idempotent.
    fn close(&self) -> Result<(), StoreError>;

    fn is_closed(&self) -> bool;

    /// Number of records currently stored.
    fn len(&self) -> Result<usize, StoreError>;

    fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len()? == 0)
    }

    fn stats(&self) -> StoreStats;
}

// =============================================================================
// Store Statistics
// =============================================================================

/// Statistics about store usage and operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub record_count: u64,
    pub total_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
    pub delete_ops: u64,
    pub scan_ops: u64,
}

/// Lock-free operation counters shared by the bundled backends.
#[derive(Debug, Default)]
pub(crate) struct OpCounters {
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
    scans: AtomicU64,
}

impl OpCounters {
    pub(crate) fn read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, record_count: u64, total_bytes: u64) -> StoreStats {
        StoreStats {
            record_count,
            total_bytes,
            read_ops: self.reads.load(Ordering::Relaxed),
            write_ops: self.writes.load(Ordering::Relaxed),
            delete_ops: self.deletes.load(Ordering::Relaxed),
            scan_ops: self.scans.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

//! Elisa Log Store - Append-Only On-Disk Backend
//!
//! Every mutation is appended to a single log file per store. An in-memory
//! ordered index maps each live identifier to the position of its latest
//! record, so reads are one positional read (or a cache hit). Opening a store
//! replays the log and truncates a torn tail left by an interrupted write.
//!
//! Key Features:
//! - Length-prefixed frames protected by CRC32 checksums
//! - Crash recovery by log replay with torn-tail truncation
//! - Optional fsync on every write (`Durability::Sync`)
//! - Bounded read cache
//! - Compaction rewriting live records into a fresh log
//!
//! Frame layout (little endian):
//! `body_len(4) | crc32(body)(4) | op(1) | id_len(2) | id | data`
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use crate::driver::Driver;
use crate::store::{ids_in_range, OpCounters, Record, ScanCursor, ScanRange, Store, StoreStats};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use elisa_common::utils::{crc32, format_size, verify_crc32};
use elisa_common::{DriverError, Durability, StoreConfig, StoreError};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

// =============================================================================
// Constants
// =============================================================================

/// body_len(4) + crc32(4)
const FRAME_HEADER_SIZE: usize = 8;
/// op(1) + id_len(2)
const BODY_HEADER_SIZE: usize = 3;

const OP_PUT: u8 = 1;
const OP_DELETE: u8 = 2;

/// Dead bytes tolerated before a write triggers compaction.
pub const COMPACTION_MIN_DEAD_BYTES: u64 = 4 * 1024 * 1024; // 4 MB

const LOG_EXTENSION: &str = "log";

// =============================================================================
// Framing
// =============================================================================

/// Encode one frame. Frames never exceed `u32::MAX` bytes; a larger record
/// is rejected rather than written with a wrapped length.
fn encode_frame(op: u8, id: &str, data: &[u8]) -> Result<Bytes, StoreError> {
    let id_len = u16::try_from(id.len()).map_err(|_| {
        StoreError::CapacityExceeded(format!(
            "identifier of {} bytes exceeds the {} byte limit",
            id.len(),
            u16::MAX
        ))
    })?;
    let body_len = BODY_HEADER_SIZE + id.len() + data.len();
    let body_len_u32 = u32::try_from(body_len + FRAME_HEADER_SIZE)
        .map(|frame_len| frame_len - FRAME_HEADER_SIZE as u32)
        .map_err(|_| {
            StoreError::CapacityExceeded(format!("record of {} bytes is too large", data.len()))
        })?;

    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + body_len);
    buf.put_u32_le(body_len_u32);
    buf.put_u32_le(0); // checksum, patched below
    buf.put_u8(op);
    buf.put_u16_le(id_len);
    buf.put_slice(id.as_bytes());
    buf.put_slice(data);

    let checksum = crc32(&buf[FRAME_HEADER_SIZE..]);
    buf[4..8].copy_from_slice(&checksum.to_le_bytes());
    Ok(buf.freeze())
}

/// Location of a live record inside the log.
#[derive(Debug, Clone, Copy)]
struct Slot {
    /// Offset of the record data.
    offset: u64,
    len: u32,
    /// Size of the whole frame holding the record.
    frame_len: u32,
}

fn data_offset(frame_start: u64, id: &str) -> u64 {
    frame_start + (FRAME_HEADER_SIZE + BODY_HEADER_SIZE + id.len()) as u64
}

/// Outcome of replaying a log image.
#[derive(Debug, Default)]
struct Replay {
    index: BTreeMap<String, Slot>,
    /// Length of the valid prefix of the log.
    end: u64,
    live_bytes: u64,
    dead_bytes: u64,
    frames: usize,
}

fn replay(data: &[u8]) -> Replay {
    let mut out = Replay::default();
    let mut pos = 0usize;

    while data.len() - pos >= FRAME_HEADER_SIZE {
        let mut header = &data[pos..pos + FRAME_HEADER_SIZE];
        let body_len = header.get_u32_le() as usize;
        let checksum = header.get_u32_le();

        let body_start = pos + FRAME_HEADER_SIZE;
        let body_end = body_start + body_len;
        if body_len < BODY_HEADER_SIZE || body_end > data.len() {
            break;
        }

        let body = &data[body_start..body_end];
        if !verify_crc32(body, checksum) {
            break;
        }

        let mut cursor = body;
        let op = cursor.get_u8();
        let id_len = cursor.get_u16_le() as usize;
        if id_len > cursor.remaining() {
            break;
        }
        let Ok(id) = std::str::from_utf8(&cursor[..id_len]) else {
            break;
        };
        let data_len = cursor.remaining() - id_len;
        let frame_len = (FRAME_HEADER_SIZE + body_len) as u32;

        match op {
            OP_PUT => {
                let slot = Slot {
                    offset: data_offset(pos as u64, id),
                    len: data_len as u32,
                    frame_len,
                };
                out.live_bytes += data_len as u64;
                if let Some(old) = out.index.insert(id.to_string(), slot) {
                    out.live_bytes -= old.len as u64;
                    out.dead_bytes += old.frame_len as u64;
                }
            }
            OP_DELETE => {
                out.dead_bytes += frame_len as u64;
                if let Some(old) = out.index.remove(id) {
                    out.live_bytes -= old.len as u64;
                    out.dead_bytes += old.frame_len as u64;
                }
            }
            _ => break,
        }

        out.frames += 1;
        pos = body_end;
    }

    out.end = pos as u64;
    out
}

// =============================================================================
// File Helpers
// =============================================================================

fn open_log_file(path: &Path) -> std::io::Result<File> {
    OpenOptions::new()
        .read(true)
        .append(true)
        .create(true)
        .open(path)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(std::io::ErrorKind::UnexpectedEof.into()),
            Ok(n) => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn read_slot(file: &File, slot: &Slot) -> Result<Record, StoreError> {
    let mut buf = vec![0u8; slot.len as usize];
    read_at(file, &mut buf, slot.offset)?;
    Ok(Record::from(buf))
}

/// Persist directory entries (creates and renames) on platforms that need it.
fn sync_parent(path: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            File::open(parent)?.sync_all()?;
        }
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

// =============================================================================
// Record Cache
// =============================================================================

/// Bounded FIFO cache of recently read or written records.
struct RecordCache {
    capacity: usize,
    records: HashMap<String, Record>,
    order: VecDeque<String>,
}

impl RecordCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, id: &str) -> Option<Record> {
        self.records.get(id).cloned()
    }

    fn insert(&mut self, id: &str, record: Record) {
        if self.capacity == 0 {
            return;
        }
        if self.records.insert(id.to_string(), record).is_none() {
            self.order.push_back(id.to_string());
        }
        while self.records.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.records.remove(&oldest);
                }
                None => break,
            }
        }
        if self.order.len() > self.capacity * 2 {
            let records = &self.records;
            self.order.retain(|id| records.contains_key(id));
        }
    }

    fn remove(&mut self, id: &str) {
        self.records.remove(id);
    }

    fn clear(&mut self) {
        self.records.clear();
        self.order.clear();
    }
}

// =============================================================================
// Log Store
// =============================================================================

struct LogState {
    /// `None` once the store is closed.
    file: Option<File>,
    index: BTreeMap<String, Slot>,
    end: u64,
    live_bytes: u64,
    dead_bytes: u64,
}

impl LogState {
    fn file(&self) -> Result<&File, StoreError> {
        self.file.as_ref().ok_or(StoreError::StoreClosed)
    }
}

struct LogInner {
    path: PathBuf,
    durability: Durability,
    max_records: Option<u64>,
    max_bytes: Option<u64>,
    state: RwLock<LogState>,
    cache: Mutex<RecordCache>,
    counters: OpCounters,
}

impl LogInner {
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let state = self.state.read();
        let file = state.file()?;
        self.counters.read();

        let Some(slot) = state.index.get(id) else {
            return Ok(None);
        };
        if let Some(record) = self.cache.lock().get(id) {
            return Ok(Some(record));
        }

        let record = read_slot(file, slot)?;
        self.cache.lock().insert(id, record.clone());
        Ok(Some(record))
    }

    /// Append a frame, rolling the file back to its previous end on failure.
    fn append(&self, state: &mut LogState, frame: &[u8]) -> Result<u64, StoreError> {
        let start = state.end;
        let file = state.file.as_mut().ok_or(StoreError::StoreClosed)?;

        let written = file.write_all(frame).and_then(|_| match self.durability {
            Durability::Sync => file.sync_data(),
            Durability::Async => Ok(()),
        });
        if let Err(err) = written {
            if let Err(truncate_err) = file.set_len(start) {
                tracing::warn!(
                    "Failed to roll back torn write in {}: {}",
                    self.path.display(),
                    truncate_err
                );
            }
            return Err(StoreError::Io(err));
        }

        state.end += frame.len() as u64;
        Ok(start)
    }

    fn maybe_compact(&self, state: &mut LogState) {
        if state.dead_bytes >= COMPACTION_MIN_DEAD_BYTES && state.dead_bytes > state.live_bytes {
            if let Err(err) = self.compact_locked(state) {
                tracing::warn!("Compaction of {} failed: {}", self.path.display(), err);
            }
        }
    }

    fn compact_locked(&self, state: &mut LogState) -> Result<(), StoreError> {
        let temp_path = self.path.with_extension("compact");
        let (index, end) = match self.write_compacted(state, &temp_path) {
            Ok(written) => written,
            Err(err) => {
                // The live log is untouched; only the partial copy goes.
                let _ = std::fs::remove_file(&temp_path);
                return Err(err);
            }
        };

        // Atomic rename
        if let Err(err) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err.into());
        }

        // From here on the path names the compacted log, and the open handle
        // points at an unlinked file that must not receive another write.
        let reopened = open_log_file(&self.path);
        self.install_compacted(state, index, end, reopened)?;
        sync_parent(&self.path)?;
        Ok(())
    }

    /// Copy every live record into a fresh log at `temp_path`.
    fn write_compacted(
        &self,
        state: &LogState,
        temp_path: &Path,
    ) -> Result<(BTreeMap<String, Slot>, u64), StoreError> {
        let file = state.file()?;
        let mut writer = BufWriter::new(File::create(temp_path)?);
        let mut index = BTreeMap::new();
        let mut pos = 0u64;

        for (id, slot) in &state.index {
            let record = read_slot(file, slot)?;
            let frame = encode_frame(OP_PUT, id, record.as_bytes())?;
            writer.write_all(&frame)?;
            index.insert(
                id.clone(),
                Slot {
                    offset: data_offset(pos, id),
                    len: slot.len,
                    frame_len: frame.len() as u32,
                },
            );
            pos += frame.len() as u64;
        }

        let compacted = writer.into_inner().map_err(|e| StoreError::Io(e.into_error()))?;
        compacted.sync_all()?;
        Ok((index, pos))
    }

    /// Switch to the compacted log. When it cannot be opened the store is
    /// closed, so later operations fail instead of writing to the old file.
    fn install_compacted(
        &self,
        state: &mut LogState,
        index: BTreeMap<String, Slot>,
        end: u64,
        reopened: std::io::Result<File>,
    ) -> Result<(), StoreError> {
        let file = match reopened {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(
                    "Closing {}: compacted log could not be reopened: {}",
                    self.path.display(),
                    err
                );
                state.file = None;
                state.index.clear();
                state.live_bytes = 0;
                state.dead_bytes = 0;
                self.cache.lock().clear();
                return Err(StoreError::Io(err));
            }
        };

        let reclaimed = state.end.saturating_sub(end);
        state.file = Some(file);
        state.index = index;
        state.end = end;
        state.dead_bytes = 0;

        tracing::info!(
            "Compacted {} ({} live records, reclaimed {})",
            self.path.display(),
            state.index.len(),
            format_size(reclaimed)
        );
        Ok(())
    }
}

/// Append-only, log-structured store kept in a single file.
#[derive(Clone)]
pub struct LogStore {
    inner: Arc<LogInner>,
}

impl LogStore {
    /// Open (or create) the log at `path`, replaying any existing records.
    pub fn open(path: impl Into<PathBuf>, config: &StoreConfig) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = open_log_file(&path)?;
        let image = std::fs::read(&path)?;
        let replay = replay(&image);

        if replay.end < image.len() as u64 {
            tracing::warn!(
                "Truncating torn tail of {}: {} bytes after offset {}",
                path.display(),
                image.len() as u64 - replay.end,
                replay.end
            );
            file.set_len(replay.end)?;
            file.sync_all()?;
        }

        tracing::debug!(
            "Recovered {} ({} frames, {} live records)",
            path.display(),
            replay.frames,
            replay.index.len()
        );

        Ok(Self {
            inner: Arc::new(LogInner {
                path,
                durability: config.durability,
                max_records: config.max_records,
                max_bytes: config.max_bytes,
                state: RwLock::new(LogState {
                    file: Some(file),
                    index: replay.index,
                    end: replay.end,
                    live_bytes: replay.live_bytes,
                    dead_bytes: replay.dead_bytes,
                }),
                cache: Mutex::new(RecordCache::new(config.cache_size)),
                counters: OpCounters::default(),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Rewrite the log so it holds only live records.
    pub fn compact(&self) -> Result<(), StoreError> {
        let mut state = self.inner.state.write();
        self.inner.compact_locked(&mut state)
    }

    /// Bytes held by superseded or deleted frames.
    pub fn dead_bytes(&self) -> u64 {
        self.inner.state.read().dead_bytes
    }

    /// Current length of the log file.
    pub fn log_size(&self) -> u64 {
        self.inner.state.read().end
    }
}

impl Store for LogStore {
    fn get(&self, id: &str) -> Result<Option<Record>, StoreError> {
        self.inner.get(id)
    }

    fn put(&self, id: &str, record: Record) -> Result<(), StoreError> {
        let record_len = u32::try_from(record.len()).map_err(|_| {
            StoreError::CapacityExceeded(format!("record of {} bytes is too large", record.len()))
        })?;

        let mut state = self.inner.state.write();
        state.file()?;

        let previous = state.index.get(id).copied();
        let new_count = state.index.len() as u64 + u64::from(previous.is_none());
        let new_bytes =
            state.live_bytes - previous.map_or(0, |s| s.len as u64) + record.len() as u64;

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

        let frame = encode_frame(OP_PUT, id, record.as_bytes())?;
        let start = self.inner.append(&mut state, &frame)?;

        state.index.insert(
            id.to_string(),
            Slot {
                offset: data_offset(start, id),
                len: record_len,
                frame_len: frame.len() as u32,
            },
        );
        state.live_bytes = new_bytes;
        if let Some(old) = previous {
            state.dead_bytes += old.frame_len as u64;
        }
        self.inner.cache.lock().insert(id, record);
        self.inner.counters.write();

        self.inner.maybe_compact(&mut state);
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool, StoreError> {
        let mut state = self.inner.state.write();
        state.file()?;
        self.inner.counters.delete();

        let Some(old) = state.index.get(id).copied() else {
            return Ok(false);
        };

        let frame = encode_frame(OP_DELETE, id, &[])?;
        self.inner.append(&mut state, &frame)?;

        state.index.remove(id);
        state.live_bytes -= old.len as u64;
        state.dead_bytes += old.frame_len as u64 + frame.len() as u64;
        self.inner.cache.lock().remove(id);

        self.inner.maybe_compact(&mut state);
        Ok(true)
    }

    fn scan(&self, range: ScanRange) -> Result<ScanCursor, StoreError> {
        let ids = {
            let state = self.inner.state.read();
            state.file()?;
            ids_in_range(&state.index, &range)
        };
        self.inner.counters.scan();

        let inner = Arc::clone(&self.inner);
        Ok(ScanCursor::over_ids(ids, move |id| inner.get(id)))
    }

    fn close(&self) -> Result<(), StoreError> {
        let mut state = self.inner.state.write();
        let Some(file) = state.file.take() else {
            return Ok(());
        };

        state.index.clear();
        state.live_bytes = 0;
        state.dead_bytes = 0;
        self.inner.cache.lock().clear();

        file.sync_all()?;
        tracing::debug!("Closed log store {}", self.inner.path.display());
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.inner.state.read().file.is_none()
    }

    fn len(&self) -> Result<usize, StoreError> {
        let state = self.inner.state.read();
        state.file()?;
        Ok(state.index.len())
    }

    fn stats(&self) -> StoreStats {
        let state = self.inner.state.read();
        self.inner
            .counters
            .snapshot(state.index.len() as u64, state.live_bytes)
    }
}

// =============================================================================
// Log Driver
// =============================================================================

/// Driver opening one log file per location under `StoreConfig::path`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDriver;

impl LogDriver {
    pub const NAME: &'static str = "log";

    /// Resolve the log file backing `location`.
    pub fn log_path(location: &str, config: &StoreConfig) -> Result<PathBuf, DriverError> {
        let root = config.path.as_ref().ok_or_else(|| {
            DriverError::InvalidConfig("the log driver requires a store path".to_string())
        })?;

        let relative = Path::new(location);
        let well_formed = !location.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !well_formed {
            return Err(DriverError::InvalidConfig(format!(
                "invalid store location: {:?}",
                location
            )));
        }

        let mut path = root.join(relative);
        let file_name = match path.file_name() {
            Some(name) => format!("{}.{}", name.to_string_lossy(), LOG_EXTENSION),
            None => {
                return Err(DriverError::InvalidConfig(format!(
                    "invalid store location: {:?}",
                    location
                )))
            }
        };
        path.set_file_name(file_name);
        Ok(path)
    }
}

impl Driver for LogDriver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn open(&self, location: &str, config: &StoreConfig) -> Result<Arc<dyn Store>, DriverError> {
        let path = Self::log_path(location, config)?;
        tracing::debug!("Opening log store {}", path.display());
        Ok(Arc::new(LogStore::open(path, config)?))
    }

    fn destroy(&self, location: &str, config: &StoreConfig) -> Result<(), DriverError> {
        let path = Self::log_path(location, config)?;
        for candidate in [path.clone(), path.with_extension("compact")] {
            match std::fs::remove_file(&candidate) {
                Ok(()) => tracing::debug!("Removed {}", candidate.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
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

    fn open_in(dir: &Path) -> LogStore {
        LogStore::open(dir.join("test.log"), &StoreConfig::default())
            .expect("LogStore::open should succeed")
    }

    #[test]
    fn test_put_get_delete() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let store = open_in(temp_dir.path());

        store.put("a", Record::from("alpha")).unwrap();
        store.put("b", Record::from("beta")).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(Record::from("alpha")));
        assert_eq!(store.len().unwrap(), 2);

        assert!(store.delete("a").unwrap());
        assert!(!store.delete("a").unwrap());
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_reopen_replays_log() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        {
            let store = open_in(temp_dir.path());
            store.put("a", Record::from("1")).unwrap();
            store.put("b", Record::from("2")).unwrap();
            store.put("a", Record::from("3")).unwrap();
            store.delete("b").unwrap();
            store.close().unwrap();
        }

        let store = open_in(temp_dir.path());
        assert_eq!(store.get("a").unwrap(), Some(Record::from("3")));
        assert_eq!(store.get("b").unwrap(), None);
        assert_eq!(store.len().unwrap(), 1);
        assert!(store.dead_bytes() > 0);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let path = temp_dir.path().join("test.log");
        {
            let store = open_in(temp_dir.path());
            store.put("a", Record::from("1")).unwrap();
            store.close().unwrap();
        }
        let valid_len = std::fs::metadata(&path).unwrap().len();

        // Half of a frame header followed by junk.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x20, 0, 0, 0, 0xde, 0xad]).unwrap();
        drop(file);

        let store = open_in(temp_dir.path());
        assert_eq!(store.get("a").unwrap(), Some(Record::from("1")));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), valid_len);

        store.put("b", Record::from("2")).unwrap();
        store.close().unwrap();

        let store = open_in(temp_dir.path());
        assert_eq!(store.get("b").unwrap(), Some(Record::from("2")));
    }

    #[test]
    fn test_corrupted_frame_stops_replay() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let path = temp_dir.path().join("test.log");
        {
            let store = open_in(temp_dir.path());
            store.put("a", Record::from("first")).unwrap();
            store.put("b", Record::from("second")).unwrap();
            store.close().unwrap();
        }

        let mut image = std::fs::read(&path).unwrap();
        let last = image.len() - 1;
        image[last] ^= 0xff;
        std::fs::write(&path, &image).unwrap();

        let store = open_in(temp_dir.path());
        assert_eq!(store.get("a").unwrap(), Some(Record::from("first")));
        assert_eq!(store.get("b").unwrap(), None);
    }

    #[test]
    fn test_compaction() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let store = open_in(temp_dir.path());

        for i in 0..50 {
            store.put("hot", Record::from(format!("value-{}", i).into_bytes())).unwrap();
        }
        store.put("cold", Record::from("stays")).unwrap();
        store.put("gone", Record::from("bye")).unwrap();
        store.delete("gone").unwrap();

        let before = store.log_size();
        store.compact().unwrap();

        assert!(store.log_size() < before);
        assert_eq!(store.dead_bytes(), 0);
        assert_eq!(store.get("hot").unwrap(), Some(Record::from("value-49")));
        assert_eq!(store.get("cold").unwrap(), Some(Record::from("stays")));
        assert_eq!(store.get("gone").unwrap(), None);

        store.close().unwrap();
        let store = open_in(temp_dir.path());
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.get("hot").unwrap(), Some(Record::from("value-49")));
    }

    #[test]
    fn test_failed_compaction_keeps_store_usable() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let store = open_in(temp_dir.path());
        for i in 0..10 {
            store.put("k", Record::from(format!("v{}", i).into_bytes())).unwrap();
        }

        // A directory where the compacted copy should go makes the copy fail.
        std::fs::create_dir(temp_dir.path().join("test.compact")).unwrap();
        assert!(store.compact().is_err());
        assert!(store.dead_bytes() > 0);

        assert_eq!(store.get("k").unwrap(), Some(Record::from("v9")));
        store.put("after", Record::from("written")).unwrap();
        store.close().unwrap();

        let store = open_in(temp_dir.path());
        assert_eq!(store.get("k").unwrap(), Some(Record::from("v9")));
        assert_eq!(store.get("after").unwrap(), Some(Record::from("written")));
    }

    #[test]
    fn test_unopenable_compacted_log_closes_store() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let store = open_in(temp_dir.path());
        store.put("a", Record::from("1")).unwrap();

        {
            let mut state = store.inner.state.write();
            let reopened = Err(std::io::Error::new(std::io::ErrorKind::Other, "vanished"));
            let result = store.inner.install_compacted(&mut state, BTreeMap::new(), 0, reopened);
            assert!(matches!(result, Err(StoreError::Io(_))));
        }

        assert!(matches!(store.get("a"), Err(StoreError::StoreClosed)));
        assert!(matches!(
            store.put("b", Record::from("2")),
            Err(StoreError::StoreClosed)
        ));
    }

    #[test]
    fn test_oversized_identifier_is_rejected_by_framing() {
        let id = "x".repeat(u16::MAX as usize + 1);
        assert!(matches!(
            encode_frame(OP_PUT, &id, b"data"),
            Err(StoreError::CapacityExceeded(_))
        ));

        let frame = encode_frame(OP_PUT, "id", b"data").unwrap();
        assert_eq!(frame.len(), FRAME_HEADER_SIZE + BODY_HEADER_SIZE + 2 + 4);
    }

    #[test]
    fn test_sync_durability() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let config = StoreConfig::default()
            .with_durability(Durability::Sync)
            .with_cache_size(0);
        let store = LogStore::open(temp_dir.path().join("sync.log"), &config).unwrap();

        store.put("a", Record::from("durable")).unwrap();
        assert_eq!(store.get("a").unwrap(), Some(Record::from("durable")));
    }

    #[test]
    fn test_close_is_idempotent() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let store = open_in(temp_dir.path());
        store.put("a", Record::from("1")).unwrap();

        store.close().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.get("a"), Err(StoreError::StoreClosed)));
        assert!(matches!(store.delete("a"), Err(StoreError::StoreClosed)));
        assert!(matches!(store.compact(), Err(StoreError::StoreClosed)));
    }

    #[test]
    fn test_prefix_scan() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let store = open_in(temp_dir.path());
        for id in ["user:1", "user:2", "order:1"] {
            store.put(id, Record::from_slice(id.as_bytes())).unwrap();
        }

        let ids: Vec<String> = store
            .scan(ScanRange::prefix("user:"))
            .unwrap()
            .map(|item| item.unwrap().0)
            .collect();
        assert_eq!(ids, vec!["user:1", "user:2"]);
    }

    #[test]
    fn test_record_quota() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let config = StoreConfig::default().with_max_records(1);
        let store = LogStore::open(temp_dir.path().join("quota.log"), &config).unwrap();

        store.put("a", Record::from("1")).unwrap();
        let err = store.put("b", Record::from("2")).unwrap_err();
        assert!(matches!(err, StoreError::CapacityExceeded(_)));
    }

    #[test]
    fn test_driver_paths() {
        let config = StoreConfig::at("/data");
        assert_eq!(
            LogDriver::log_path("shop/orders", &config).unwrap(),
            PathBuf::from("/data/shop/orders.log")
        );
        assert!(LogDriver::log_path("../escape", &config).is_err());
        assert!(LogDriver::log_path("", &config).is_err());
        assert!(LogDriver::log_path("x", &StoreConfig::default()).is_err());
    }

    #[test]
    fn test_driver_destroy() {
        let temp_dir = tempfile::tempdir().expect("tempdir should be created");
        let config = StoreConfig::at(temp_dir.path());
        let driver = LogDriver;

        let store = driver.open("db/items", &config).unwrap();
        store.put("a", Record::from("1")).unwrap();
        store.close().unwrap();

        driver.destroy("db/items", &config).unwrap();
        driver.destroy("db/items", &config).unwrap();

        let store = driver.open("db/items", &config).unwrap();
        assert!(store.is_empty().unwrap());
    }
}

//! Elisa Storage - Pluggable Record Stores
//!
//! Byte-oriented persistence layer underneath the document engine. A store
//! maps document identifiers to opaque records and knows nothing about
//! document structure; drivers open stores for a named location and are
//! selected by name at database-open time.
//!
//! Key Features:
//! - Backend-agnostic `Store` contract (get, put, delete, scan, close)
//! - Snapshot-at-start scan cursors with explicit error termination
//! - In-memory backend for tests and ephemeral databases
//! - Append-only log backend with CRC32 framing, recovery, and compaction
//! - Driver registry resolving backends by name
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

pub mod driver;
pub mod log;
pub mod memory;
pub mod store;

pub use driver::{Driver, DriverRegistry};
pub use log::{LogDriver, LogStore};
pub use memory::{MemoryDriver, MemoryStore};
pub use store::{Record, ScanCursor, ScanRange, Store, StoreStats};

pub use elisa_common::{DriverError, Durability, StoreConfig, StoreError};

//! Elisa Utils - Utility Functions
//!
//! Hashing and checksum helpers shared by the storage and document layers.
//!
//! @version 0.1.0
//! @author AutomataNexus Development Team

use xxhash_rust::xxh3::xxh3_64;

// =============================================================================
// Hashing Functions
// =============================================================================

/// Compute a 64-bit hash of the given bytes using xxHash3.
#[inline]
pub fn hash64(data: &[u8]) -> u64 {
    xxh3_64(data)
}

/// Map a key onto one of `buckets` slots.
#[inline]
pub fn bucket_for(key: &[u8], buckets: usize) -> usize {
    debug_assert!(buckets > 0);
    (hash64(key) % buckets as u64) as usize
}

// =============================================================================
// Checksum Functions
// =============================================================================

/// Compute CRC32 checksum for data integrity verification.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Verify data against expected CRC32 checksum.
#[inline]
pub fn verify_crc32(data: &[u8], expected: u32) -> bool {
    crc32(data) == expected
}

// =============================================================================
// Size Formatting
// =============================================================================

const SIZE_UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB", "PB"];

/// Format a byte size as a human-readable string.
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, SIZE_UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, SIZE_UNITS[unit_index])
    }
}

// =============================================================================
// Tests
// =============================================================================

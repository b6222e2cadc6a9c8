//! CRC32C checksums and the mask applied before they are stored.
//!
//! Computing the CRC of a string that itself contains embedded CRCs is
//! error-prone, so stored checksums are rotated and offset by a constant.
//! A zero-filled region therefore never looks like a valid checksum of an
//! empty record.

use std::sync::Arc;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Checksum strategy used by [`crate::LogWriter`] and [`crate::LogReader`].
///
/// Chosen once per reader/writer at construction instead of through global
/// state, so tests can swap it per instance.
pub trait Checksum: Send + Sync {
    /// Extends `crc` (the checksum of some prefix) with `data`.
    fn extend(&self, crc: u32, data: &[u8]) -> u32;

    /// Checksum of `data` alone.
    fn value(&self, data: &[u8]) -> u32 {
        self.extend(0, data)
    }
}

/// Shared handle to a checksum strategy.
pub type SharedChecksum = Arc<dyn Checksum>;

/// Castagnoli CRC-32, hardware accelerated when the CPU supports it.
#[derive(Debug, Default, Clone, Copy)]
pub struct Crc32c;

impl Checksum for Crc32c {
    fn extend(&self, crc: u32, data: &[u8]) -> u32 {
        crc32c::crc32c_append(crc, data)
    }
}

/// The strategy used when the caller does not pick one.
pub fn default_checksum() -> SharedChecksum {
    Arc::new(Crc32c)
}

/// Returns a masked representation of `crc` suitable for storage.
pub fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask`].
pub fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

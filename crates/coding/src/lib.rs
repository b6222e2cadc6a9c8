//! # Coding - integer and slice encodings
//!
//! Byte-level primitives shared by the `wal` record framing and the
//! `version` crate's MANIFEST edits.
//!
//! ## Fixed-width
//!
//! `fixed32` / `fixed64` are always little-endian, regardless of the host
//! byte order.
//!
//! ## Varint
//!
//! ```text
//! value 300 = 0b1_0010_1100
//!
//!   byte 0: 1_0101100   (low 7 bits, continuation set)
//!   byte 1: 0_0000010   (next 7 bits, last byte)
//! ```
//!
//! A 32-bit value takes at most 5 bytes, a 64-bit value at most 10.
//!
//! ## Length-prefixed slices
//!
//! ```text
//! [len: varint32][bytes: len]
//! ```
//!
//! ## Cursors
//!
//! The `get_*` functions take a `&mut &[u8]` cursor and advance it past the
//! consumed bytes on success. On failure they return `None` and leave the
//! cursor where it was. Nothing in this crate panics on malformed input.

use byteorder::{ByteOrder, LittleEndian};

/// Maximum encoded length of a varint32.
pub const MAX_VARINT32_BYTES: usize = 5;

/// Maximum encoded length of a varint64.
pub const MAX_VARINT64_BYTES: usize = 10;

// -------------------- Fixed-width --------------------

/// Appends `value` as 4 little-endian bytes.
pub fn put_fixed32(dst: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    dst.extend_from_slice(&buf);
}

/// Appends `value` as 8 little-endian bytes.
pub fn put_fixed64(dst: &mut Vec<u8>, value: u64) {
    let mut buf = [0u8; 8];
    LittleEndian::write_u64(&mut buf, value);
    dst.extend_from_slice(&buf);
}

/// Reads a little-endian `u32` from the first 4 bytes of `src`.
pub fn decode_fixed32(src: &[u8]) -> Option<u32> {
    if src.len() < 4 {
        return None;
    }
    Some(LittleEndian::read_u32(&src[..4]))
}

/// Reads a little-endian `u64` from the first 8 bytes of `src`.
pub fn decode_fixed64(src: &[u8]) -> Option<u64> {
    if src.len() < 8 {
        return None;
    }
    Some(LittleEndian::read_u64(&src[..8]))
}

/// Reads a fixed32 from the cursor and advances it.
pub fn get_fixed32<'a>(input: &mut &'a [u8]) -> Option<u32> {
    let data: &'a [u8] = *input;
    let v = decode_fixed32(data)?;
    *input = &data[4..];
    Some(v)
}

/// Reads a fixed64 from the cursor and advances it.
pub fn get_fixed64<'a>(input: &mut &'a [u8]) -> Option<u64> {
    let data: &'a [u8] = *input;
    let v = decode_fixed64(data)?;
    *input = &data[8..];
    Some(v)
}

// -------------------- Varint --------------------

/// Appends `value` as a varint (1-5 bytes).
pub fn put_varint32(dst: &mut Vec<u8>, value: u32) {
    put_varint64(dst, u64::from(value));
}

/// Appends `value` as a varint (1-10 bytes).
pub fn put_varint64(dst: &mut Vec<u8>, mut value: u64) {
    while value >= 0x80 {
        dst.push((value as u8) | 0x80);
        value >>= 7;
    }
    dst.push(value as u8);
}

/// Number of bytes `value` occupies once varint-encoded.
pub fn varint_length(mut value: u64) -> usize {
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}

/// Parses a varint32 from the front of `src`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// input is truncated, runs past 5 bytes, or does not fit in 32 bits.
pub fn decode_varint32(src: &[u8]) -> Option<(u32, usize)> {
    let (value, used) = decode_varint(src, MAX_VARINT32_BYTES)?;
    let value = u32::try_from(value).ok()?;
    Some((value, used))
}

/// Parses a varint64 from the front of `src`.
///
/// Returns the value and the number of bytes consumed, or `None` if the
/// input is truncated, runs past 10 bytes, or overflows 64 bits.
pub fn decode_varint64(src: &[u8]) -> Option<(u64, usize)> {
    decode_varint(src, MAX_VARINT64_BYTES)
}

fn decode_varint(src: &[u8], max_bytes: usize) -> Option<(u64, usize)> {
    let mut result = 0u64;
    for (i, &byte) in src.iter().take(max_bytes).enumerate() {
        let shift = 7 * i as u32;
        let bits = u64::from(byte & 0x7f);
        // the tenth byte of a varint64 only has room for one bit
        if shift == 63 && bits > 1 {
            return None;
        }
        result |= bits << shift;
        if byte & 0x80 == 0 {
            return Some((result, i + 1));
        }
    }
    None
}

/// Reads a varint32 from the cursor and advances it.
pub fn get_varint32<'a>(input: &mut &'a [u8]) -> Option<u32> {
    let data: &'a [u8] = *input;
    let (v, used) = decode_varint32(data)?;
    *input = &data[used..];
    Some(v)
}

/// Reads a varint64 from the cursor and advances it.
pub fn get_varint64<'a>(input: &mut &'a [u8]) -> Option<u64> {
    let data: &'a [u8] = *input;
    let (v, used) = decode_varint64(data)?;
    *input = &data[used..];
    Some(v)
}

// -------------------- Length-prefixed slices --------------------

/// Appends `[len: varint32][value]`.
///
/// `value` must be shorter than 4 GiB; longer slices cannot be described by
/// a varint32 prefix.
pub fn put_length_prefixed_slice(dst: &mut Vec<u8>, value: &[u8]) {
    debug_assert!(value.len() <= u32::MAX as usize);
    put_varint32(dst, value.len() as u32);
    dst.extend_from_slice(value);
}

/// Reads a length-prefixed slice from the cursor and advances it.
///
/// Fails if the prefix is malformed or fewer bytes remain than it announces.
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Option<&'a [u8]> {
    let data: &'a [u8] = *input;
    let (len, used) = decode_varint32(data)?;
    let len = len as usize;
    let rest = &data[used..];
    if rest.len() < len {
        return None;
    }
    let (value, rest) = rest.split_at(len);
    *input = rest;
    Some(value)
}

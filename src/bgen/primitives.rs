//! Little-endian integer reads, length-prefixed strings, flag-bit extraction,
//! and the generic bit-packed probability unpacker that layout 2 payloads are
//! built on.

use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

pub fn read_u8(reader: &mut impl Read, path: &Path) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader
        .read_exact(&mut buf)
        .map_err(|e| Error::io(path, e))?;
    Ok(buf[0])
}

pub fn read_u16_le(reader: &mut impl Read, path: &Path) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader
        .read_exact(&mut buf)
        .map_err(|e| Error::io(path, e))?;
    Ok(u16::from_le_bytes(buf))
}

pub fn read_u32_le(reader: &mut impl Read, path: &Path) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader
        .read_exact(&mut buf)
        .map_err(|e| Error::io(path, e))?;
    Ok(u32::from_le_bytes(buf))
}

pub fn read_bytes(reader: &mut impl Read, path: &Path, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|e| Error::io(path, e))?;
    Ok(buf)
}

/// Read a `u16` length prefix followed by that many bytes, decoded as UTF-8.
pub fn read_string_u16(reader: &mut impl Read, path: &Path) -> Result<String> {
    let len = read_u16_le(reader, path)? as usize;
    let bytes = read_bytes(reader, path, len)?;
    String::from_utf8(bytes).map_err(|e| Error::malformed(path, format!("invalid UTF-8: {e}")))
}

/// Read a `u32` length prefix followed by that many bytes, decoded as UTF-8.
pub fn read_string_u32(reader: &mut impl Read, path: &Path) -> Result<String> {
    let len = read_u32_le(reader, path)? as usize;
    let bytes = read_bytes(reader, path, len)?;
    String::from_utf8(bytes).map_err(|e| Error::malformed(path, format!("invalid UTF-8: {e}")))
}

/// Unpack a 4-byte little-endian word into 32 bits, indexed LSB-first
/// (`bits[0]` is bit 0 of the word).
pub fn unpack_flag_bits(word: u32) -> [bool; 32] {
    let mut bits = [false; 32];
    for (i, bit) in bits.iter_mut().enumerate() {
        *bit = (word >> i) & 1 == 1;
    }
    bits
}

/// Unpack `b`-bit (`b` in `1..=32`) unsigned integers from a byte buffer,
/// LSB-first within each byte and across byte boundaries, zero-extending
/// into a 64-bit accumulator. Aligned widths (8/16/32) take a fast path that
/// reinterprets the buffer directly instead of shifting bit-by-bit.
pub fn unpack_bits(buf: &[u8], b: u32) -> Vec<u64> {
    debug_assert!((1..=32).contains(&b));

    let count = (buf.len() * 8) / b as usize;

    match b {
        8 => return buf[..count].iter().map(|&byte| byte as u64).collect(),
        16 => {
            return buf[..count * 2]
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]) as u64)
                .collect();
        }
        32 => {
            return buf[..count * 4]
                .chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]) as u64)
                .collect();
        }
        _ => {}
    }

    let mask: u64 = (1u64 << b) - 1;
    let mut values = Vec::with_capacity(count);
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;
    let mut bytes = buf.iter();

    for _ in 0..count {
        while acc_bits < b {
            let byte = match bytes.next() {
                Some(&byte) => byte,
                None => break,
            };
            acc |= (byte as u64) << acc_bits;
            acc_bits += 8;
        }
        values.push(acc & mask);
        acc >>= b;
        acc_bits -= b;
    }

    values
}

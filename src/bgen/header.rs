//! Parses the fixed prelude, the flag word, and the optional embedded
//! sample-identifier block, establishing the file-wide invariants every
//! later read depends on.

use std::io::Read;
use std::path::Path;

use crate::bgen::compression::Compression;
use crate::bgen::primitives::{read_string_u16, read_u32_le, unpack_flag_bits};
use crate::error::{Error, Result};

const MAGIC: &[u8; 4] = b"bgen";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    One,
    Two,
}

impl Layout {
    fn from_code(code: u32, path: &Path) -> Result<Self> {
        match code {
            1 => Ok(Layout::One),
            2 => Ok(Layout::Two),
            other => Err(Error::malformed(
                path,
                format!("invalid layout code {other} (must be 1 or 2)"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HeaderFlags {
    pub compression: Compression,
    pub layout: Layout,
    pub has_embedded_samples: bool,
}

impl HeaderFlags {
    fn decode(word: u32, path: &Path) -> Result<Self> {
        let bits = unpack_flag_bits(word);
        // bits 0-1: compression code, LSB-first.
        let compression_code = (bits[0] as u32) | ((bits[1] as u32) << 1);
        let compression = Compression::from_flag_bits(compression_code, path)?;

        // bits 2-5: layout code, LSB-first.
        let layout_code = (bits[2] as u32)
            | ((bits[3] as u32) << 1)
            | ((bits[4] as u32) << 2)
            | ((bits[5] as u32) << 3);
        let layout = Layout::from_code(layout_code, path)?;

        Ok(HeaderFlags {
            compression,
            layout,
            has_embedded_samples: bits[31],
        })
    }
}

/// File-wide state established once at open and held immutable thereafter.
#[derive(Debug, Clone)]
pub struct Header {
    pub offset: u32,
    pub header_size: u32,
    pub variant_count: u32,
    pub sample_count: u32,
    pub layout: Layout,
    pub compression: Compression,
    pub has_embedded_samples: bool,
    /// Byte offset of the first variant block (`offset + 4`).
    pub variant_start: u64,
}

impl Header {
    pub fn compressed(&self) -> bool {
        self.compression.is_compressed()
    }
}

pub fn parse_header(reader: &mut impl Read, path: &Path) -> Result<Header> {
    let offset = read_u32_le(reader, path)?;
    let header_size = read_u32_le(reader, path)?;
    if header_size > offset {
        return Err(Error::header_mismatch(
            path,
            format!("header_size ({header_size}) exceeds offset ({offset})"),
        ));
    }

    let variant_count = read_u32_le(reader, path)?;
    let sample_count = read_u32_le(reader, path)?;

    let mut magic = [0u8; 4];
    reader
        .read_exact(&mut magic)
        .map_err(|e| Error::io(path, e))?;
    if &magic != MAGIC && magic != [0u8; 4] {
        return Err(Error::malformed(
            path,
            format!("bad magic bytes {magic:?} (expected \"bgen\" or all-zero)"),
        ));
    }

    if header_size < 20 {
        return Err(Error::malformed(
            path,
            format!("header_size ({header_size}) smaller than the fixed 20-byte prelude"),
        ));
    }
    let free_area_len = (header_size - 20) as usize;
    if free_area_len > 0 {
        let mut discard = vec![0u8; free_area_len];
        reader
            .read_exact(&mut discard)
            .map_err(|e| Error::io(path, e))?;
    }

    let flag = read_u32_le(reader, path)?;
    let flags = HeaderFlags::decode(flag, path)?;

    log::debug!(
        "{}: parsed header (layout={:?}, compression={:?}, variants={variant_count}, samples={sample_count}, embedded_samples={})",
        path.display(),
        flags.layout,
        flags.compression,
        flags.has_embedded_samples
    );

    Ok(Header {
        offset,
        header_size,
        variant_count,
        sample_count,
        layout: flags.layout,
        compression: flags.compression,
        has_embedded_samples: flags.has_embedded_samples,
        variant_start: offset as u64 + 4,
    })
}

/// Parse the sample identifier block that immediately follows the header
/// when `has_embedded_samples` is set. The caller's reader cursor must be
/// positioned right after the header flag.
pub fn parse_sample_block(reader: &mut impl Read, header: &Header, path: &Path) -> Result<Vec<String>> {
    let block_size = read_u32_le(reader, path)?;
    if block_size + header.header_size != header.offset {
        return Err(Error::header_mismatch(
            path,
            format!(
                "sample block_size ({block_size}) + header_size ({}) != offset ({})",
                header.header_size, header.offset
            ),
        ));
    }

    let n = read_u32_le(reader, path)?;
    if n != header.sample_count {
        return Err(Error::header_mismatch(
            path,
            format!(
                "sample block declares {n} samples, header declares {}",
                header.sample_count
            ),
        ));
    }

    let mut samples = Vec::with_capacity(header.sample_count as usize);
    for _ in 0..header.sample_count {
        samples.push(read_string_u16(reader, path)?);
    }
    Ok(samples)
}

//! Uniform adapter over the three compression regimes a BGEN payload can be
//! stored in, selected once per file from the header flag's low two bits.

use std::io::Read;
use std::path::Path;

use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Zstd,
}

impl Compression {
    /// Decode the two low bits of the header flag word.
    pub fn from_flag_bits(code: u32, path: &Path) -> Result<Self> {
        match code {
            0 => Ok(Compression::None),
            1 => Ok(Compression::Zlib),
            2 => Ok(Compression::Zstd),
            other => Err(Error::malformed(
                path,
                format!("invalid compression code {other} (must be 0, 1, or 2)"),
            )),
        }
    }

    pub fn is_compressed(self) -> bool {
        !matches!(self, Compression::None)
    }
}

/// Decompress `bytes` per the selected regime. Identity is a no-op copy.
pub fn decompress(compression: Compression, bytes: &[u8], path: &Path) -> Result<Vec<u8>> {
    match compression {
        Compression::None => Ok(bytes.to_vec()),
        Compression::Zlib => {
            let mut decoder = ZlibDecoder::new(bytes);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::io(path, e))?;
            Ok(out)
        }
        Compression::Zstd => {
            let mut decoder =
                zstd::stream::read::Decoder::new(bytes).map_err(|e| Error::io(path, e))?;
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| Error::io(path, e))?;
            Ok(out)
        }
    }
}

//! Random-access reader for BGEN v1.1/v1.2 genotype files.
//!
//! Parses the header and per-variant layout 1/2 payloads (identity/zlib/zstd
//! compression, arbitrary bit-packed probabilities), and integrates with a
//! `.bgi` SQLite companion index for offset-based random access without a
//! linear scan. See [`BgenReader`] for the public entry point.

pub mod bgen;
pub mod error;
pub mod reader;
pub mod selection;

pub use bgen::compression::Compression;
pub use bgen::header::Layout;
pub use bgen::variant::VariantInfo;
pub use bgen::variant_data::VariantPayload;
pub use error::{Error, Result};
pub use reader::{BgenOptions, BgenReader};
pub use selection::Selector;

//! Integration with the `.bgi` SQLite companion index: open/validate against
//! the BGEN header, bulk selection queries, and rebuilding a `.bgi` from
//! scratch by linearly scanning the BGEN file.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection};

use crate::bgen::header::{Header, Layout};
use crate::bgen::primitives::read_u32_le;
use crate::bgen::variant::VariantInfo;
use crate::bgen::variant_data::read_variant_info;
use crate::error::{Error, Result};

fn sql_err(path: &Path, source: rusqlite::Error) -> Error {
    Error::io(path, std::io::Error::other(source))
}

/// A held connection to a validated `.bgi` index, plus the last recorded
/// variant block offset (used for bounds checks by callers).
pub struct BgiIndex {
    connection: Connection,
    pub last_variant_block: u64,
}

impl BgiIndex {
    /// Open `<bgen_path>.bgi` (or an explicit override path) and validate it
    /// against the BGEN header's variant count and first-variant offset.
    pub fn open_and_validate(
        bgi_path: &Path,
        variant_count: u32,
        variant_start: u64,
        bgen_path: &Path,
    ) -> Result<Self> {
        let connection = Connection::open(bgi_path).map_err(|e| sql_err(bgen_path, e))?;

        let (count, min, max): (i64, i64, i64) = connection
            .query_row(
                "SELECT COUNT(rsid), MIN(file_start_position), MAX(file_start_position) FROM Variant",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(|e| sql_err(bgen_path, e))?;

        if count as u32 != variant_count {
            return Err(Error::index_mismatch(
                bgen_path,
                format!("bgi has {count} variants, header declares {variant_count}"),
            ));
        }
        if min as u64 != variant_start {
            return Err(Error::index_mismatch(
                bgen_path,
                format!("bgi's first variant offset {min} != header's variant_start {variant_start}"),
            ));
        }

        log::debug!(
            "{}: validated .bgi index ({count} variants, last block at {max})",
            bgen_path.display()
        );

        Ok(BgiIndex {
            connection,
            last_variant_block: max as u64,
        })
    }

    pub fn all_variant_info(&self, bgen_path: &Path) -> Result<Vec<VariantInfo>> {
        let mut stmt = self
            .connection
            .prepare("SELECT chromosome, position, rsid, allele1, allele2 FROM Variant ORDER BY file_start_position")
            .map_err(|e| sql_err(bgen_path, e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| sql_err(bgen_path, e))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| sql_err(bgen_path, e))
    }

    pub fn all_offsets(&self, bgen_path: &Path) -> Result<Vec<u64>> {
        let mut stmt = self
            .connection
            .prepare("SELECT file_start_position FROM Variant ORDER BY file_start_position")
            .map_err(|e| sql_err(bgen_path, e))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, i64>(0))
            .map_err(|e| sql_err(bgen_path, e))?;
        rows.map(|r| r.map(|v| v as u64))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| sql_err(bgen_path, e))
    }

    /// Variant info records for a set of rsids. Parameterised to avoid
    /// injecting rsid text (which may contain quotes) into the query.
    pub fn variant_info_by_id(&self, ids: &[String], bgen_path: &Path) -> Result<Vec<VariantInfo>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = if ids.len() == 1 {
            "SELECT chromosome, position, rsid, allele1, allele2 FROM Variant WHERE rsid = ?1".to_string()
        } else {
            let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            format!("SELECT chromosome, position, rsid, allele1, allele2 FROM Variant WHERE rsid IN ({placeholders})")
        };

        let mut stmt = self.connection.prepare(&sql).map_err(|e| sql_err(bgen_path, e))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| sql_err(bgen_path, e))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| sql_err(bgen_path, e))
    }

    /// Offset plus info record for a set of rsids, in one parameterised
    /// query — used by callers that need both without a second round trip.
    pub fn rows_by_id(&self, ids: &[String], bgen_path: &Path) -> Result<Vec<(u64, VariantInfo)>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = if ids.len() == 1 {
            "SELECT file_start_position, chromosome, position, rsid, allele1, allele2 \
             FROM Variant WHERE rsid = ?1"
                .to_string()
        } else {
            let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            format!(
                "SELECT file_start_position, chromosome, position, rsid, allele1, allele2 \
                 FROM Variant WHERE rsid IN ({placeholders})"
            )
        };

        let mut stmt = self.connection.prepare(&sql).map_err(|e| sql_err(bgen_path, e))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| {
                Ok((
                    row.get::<_, i64>(0)? as u64,
                    (
                        row.get::<_, i32>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ),
                ))
            })
            .map_err(|e| sql_err(bgen_path, e))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| sql_err(bgen_path, e))
    }

    /// File offsets for a set of rsids, in the same parameterised style as
    /// [`Self::variant_info_by_id`].
    pub fn offsets_by_id(&self, ids: &[String], bgen_path: &Path) -> Result<Vec<u64>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = if ids.len() == 1 {
            "SELECT file_start_position FROM Variant WHERE rsid = ?1".to_string()
        } else {
            let placeholders = (1..=ids.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
            format!("SELECT file_start_position FROM Variant WHERE rsid IN ({placeholders})")
        };

        let mut stmt = self.connection.prepare(&sql).map_err(|e| sql_err(bgen_path, e))?;
        let rows = stmt
            .query_map(params_from_iter(ids.iter()), |row| row.get::<_, i64>(0))
            .map_err(|e| sql_err(bgen_path, e))?;
        rows.map(|r| r.map(|v| v as u64))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| sql_err(bgen_path, e))
    }
}

/// Rebuild a `.bgi` index by linearly scanning the BGEN file, recording
/// each variant's start offset and byte length. Only defined for layout 2.
/// A no-op if `bgi_output_path` already exists.
pub fn create_bgi(bgen_path: &Path, bgi_output_path: &Path, header: &Header) -> Result<()> {
    if header.layout != Layout::Two {
        return Err(Error::unsupported(
            bgen_path,
            "create_bgi is only defined for layout 2 BGEN files",
        ));
    }

    if bgi_output_path.exists() {
        log::info!("{}: already exists, skipping rebuild", bgi_output_path.display());
        return Ok(());
    }

    let connection = Connection::open(bgi_output_path).map_err(|e| sql_err(bgen_path, e))?;
    connection
        .execute(
            "CREATE TABLE Variant (
                file_start_position INTEGER,
                size_in_bytes INTEGER,
                chromosome INTEGER,
                position INTEGER,
                rsid TEXT,
                allele1 TEXT,
                allele2 TEXT
            )",
            [],
        )
        .map_err(|e| sql_err(bgen_path, e))?;

    let file = File::open(bgen_path).map_err(|e| Error::io(bgen_path, e))?;
    let mut reader = BufReader::new(file);
    reader
        .seek(SeekFrom::Start(header.variant_start))
        .map_err(|e| Error::io(bgen_path, e))?;

    let tx = connection.unchecked_transaction().map_err(|e| sql_err(bgen_path, e))?;

    for _ in 0..header.variant_count {
        let start_position = reader
            .stream_position()
            .map_err(|e| Error::io(bgen_path, e))?;

        let (chromosome, position, rsid, allele1, allele2) = read_variant_info(&mut reader, header, bgen_path)?;

        let payload_len = read_u32_le(&mut reader, bgen_path)? as u64;
        let after_length_field = reader
            .stream_position()
            .map_err(|e| Error::io(bgen_path, e))?;
        let size_in_bytes = (after_length_field - start_position) + payload_len;

        reader
            .seek(SeekFrom::Start(after_length_field + payload_len))
            .map_err(|e| Error::io(bgen_path, e))?;

        tx.execute(
            "INSERT INTO Variant (file_start_position, size_in_bytes, chromosome, position, rsid, allele1, allele2)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                start_position as i64,
                size_in_bytes as i64,
                chromosome,
                position,
                rsid,
                allele1,
                allele2,
            ],
        )
        .map_err(|e| sql_err(bgen_path, e))?;
    }

    tx.commit().map_err(|e| sql_err(bgen_path, e))?;
    log::info!(
        "{}: wrote {} rows to {}",
        bgen_path.display(),
        header.variant_count,
        bgi_output_path.display()
    );
    Ok(())
}

pub fn default_bgi_path(bgen_path: &Path) -> PathBuf {
    let mut os_string = bgen_path.as_os_str().to_owned();
    os_string.push(".bgi");
    PathBuf::from(os_string)
}

//! The `Variant` value type is treated as a plain 5-tuple record rather than
//! a rich domain type — richer models are a caller concern built on top of
//! this crate.

/// `(chromosome, position, rsid, allele1, allele2)`.
pub type VariantInfo = (i32, u32, String, String, String);

/// Normalise the on-disk chromosome string into the signed integer the
/// `.bgi` schema's `chromosome INTEGER` column requires. Numeric tokens
/// parse directly; the common non-numeric human chromosome tokens map to
/// `23..26` the way PLINK-adjacent tooling does; anything else falls back
/// to `0` with a logged warning rather than failing the whole read.
pub fn normalize_chromosome(raw: &str) -> i32 {
    let trimmed = raw.trim();
    let stripped = trimmed
        .strip_prefix("chr")
        .or_else(|| trimmed.strip_prefix("Chr"))
        .or_else(|| trimmed.strip_prefix("CHR"))
        .unwrap_or(trimmed);

    if let Ok(n) = stripped.parse::<i32>() {
        return n;
    }

    match stripped.to_ascii_uppercase().as_str() {
        "X" => 23,
        "Y" => 24,
        "XY" => 25,
        "MT" | "M" => 26,
        other => {
            log::warn!("unrecognised chromosome token {other:?}, normalising to 0");
            0
        }
    }
}

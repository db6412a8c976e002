//! The two-layout variant decoder: given a reader positioned at the start of
//! a variant block, materialises the variant's info record and, on demand,
//! its probability matrix or dosage vector.

use std::io::Read;
use std::path::Path;

use ndarray::{Array1, Array2};

use crate::bgen::compression::decompress;
use crate::bgen::header::{Header, Layout};
use crate::bgen::primitives::{read_string_u16, read_string_u32, read_u16_le, read_u32_le, read_u8, unpack_bits};
use crate::bgen::variant::{normalize_chromosome, VariantInfo};
use crate::error::{Error, Result};

/// The decoded payload of one variant, in whichever mode the caller asked
/// for.
pub enum VariantPayload {
    /// Per-sample dosage, length `sample_count`, in `[0, 2] ∪ {NaN}`.
    Dosage(Array1<f64>),
    /// Per-sample probability triple `(P(AA), P(Aa), P(aa))`, shape
    /// `(sample_count, 3)`.
    Probabilities(Array2<f64>),
}

/// Parse the info stage common to both layouts. The reader must be
/// positioned at the start of a variant block.
pub fn read_variant_info(reader: &mut impl Read, header: &Header, path: &Path) -> Result<VariantInfo> {
    if header.layout == Layout::One {
        let n = read_u32_le(reader, path)?;
        if n != header.sample_count {
            return Err(Error::header_mismatch(
                path,
                format!(
                    "layout-1 variant declares {n} samples, header declares {}",
                    header.sample_count
                ),
            ));
        }
    }

    // Variant identifier: read and discard (not surfaced in the 5-tuple).
    let _variant_id = read_string_u16(reader, path)?;
    let rsid = read_string_u16(reader, path)?;
    let chromosome_raw = read_string_u16(reader, path)?;
    let position = read_u32_le(reader, path)?;

    let allele_count = match header.layout {
        Layout::Two => read_u16_le(reader, path)?,
        Layout::One => 2,
    };

    let mut alleles = Vec::with_capacity(allele_count as usize);
    for _ in 0..allele_count {
        alleles.push(read_string_u32(reader, path)?);
    }

    let allele1 = alleles.first().cloned().unwrap_or_default();
    let allele2 = alleles.get(1).cloned().unwrap_or_default();

    Ok((
        normalize_chromosome(&chromosome_raw),
        position,
        rsid,
        allele1,
        allele2,
    ))
}

/// Parse the layout-1 payload stage: a fixed `sample_count x 3` array of
/// `u16` probabilities, optionally zlib/zstd-compressed.
pub fn read_variant_payload_layout1(
    reader: &mut impl Read,
    header: &Header,
    probability_threshold: f64,
    want_probabilities: bool,
    path: &Path,
) -> Result<VariantPayload> {
    let sample_count = header.sample_count as usize;

    let raw = if header.compressed() {
        let c = read_u32_le(reader, path)? as usize;
        let compressed_bytes = crate::bgen::primitives::read_bytes(reader, path, c)?;
        decompress(header.compression, &compressed_bytes, path)?
    } else {
        crate::bgen::primitives::read_bytes(reader, path, sample_count * 6)?
    };

    if raw.len() < sample_count * 6 {
        return Err(Error::malformed(
            path,
            format!(
                "layout-1 payload too short: got {} bytes, need {}",
                raw.len(),
                sample_count * 6
            ),
        ));
    }

    let mut probs = Array2::<f64>::zeros((sample_count, 3));
    for i in 0..sample_count {
        for j in 0..3 {
            let offset = (i * 3 + j) * 2;
            let raw_value = u16::from_le_bytes([raw[offset], raw[offset + 1]]);
            probs[[i, j]] = raw_value as f64 / 32768.0;
        }
    }

    if want_probabilities {
        return Ok(VariantPayload::Probabilities(probs));
    }

    let mut dosage = Array1::<f64>::zeros(sample_count);
    for i in 0..sample_count {
        let p_aa = probs[[i, 0]];
        let p_ab = probs[[i, 1]];
        let p_bb = probs[[i, 2]];
        let value = 2.0 * p_bb + p_ab;
        let good = probability_threshold <= 0.0
            || p_aa >= probability_threshold
            || p_ab >= probability_threshold
            || p_bb >= probability_threshold;
        dosage[i] = if good { value } else { f64::NAN };
    }

    Ok(VariantPayload::Dosage(dosage))
}

/// Parse the layout-2 payload stage: a compressed block carrying per-sample
/// ploidy/missingness, a `b`-bit probability stream, and header fields that
/// must match file-level invariants (2 alleles, ploidy 2, unphased).
pub fn read_variant_payload_layout2(
    reader: &mut impl Read,
    header: &Header,
    probability_threshold: f64,
    want_probabilities: bool,
    path: &Path,
) -> Result<VariantPayload> {
    let sample_count = header.sample_count as usize;

    let c = read_u32_le(reader, path)? as usize;
    let (to_read, expected_len) = if header.compressed() {
        let d = read_u32_le(reader, path)? as usize;
        (c.checked_sub(4).ok_or_else(|| {
            Error::malformed(path, format!("compressed block length C={c} smaller than 4"))
        })?, d)
    } else {
        (c, c)
    };

    let raw = crate::bgen::primitives::read_bytes(reader, path, to_read)?;
    let data = decompress(header.compression, &raw, path)?;
    if data.len() != expected_len {
        return Err(Error::malformed(
            path,
            format!(
                "decompressed length {} disagrees with declared length {}",
                data.len(),
                expected_len
            ),
        ));
    }

    let mut cursor = &data[..];

    let n = read_u32_le(&mut cursor, path)?;
    if n as usize != sample_count {
        return Err(Error::header_mismatch(
            path,
            format!("layout-2 payload declares {n} samples, header declares {sample_count}"),
        ));
    }

    let k = read_u16_le(&mut cursor, path)?;
    if k != 2 {
        return Err(Error::unsupported(
            path,
            format!("variant has {k} alleles; only bi-allelic variants are supported"),
        ));
    }

    let min_ploidy = read_u8(&mut cursor, path)?;
    let max_ploidy = read_u8(&mut cursor, path)?;
    if min_ploidy != 2 || max_ploidy != 2 {
        return Err(Error::unsupported(
            path,
            format!("ploidy {min_ploidy}..{max_ploidy}; only ploidy 2 is supported"),
        ));
    }

    let ploidy_missingness_bytes = crate::bgen::primitives::read_bytes(&mut cursor, path, sample_count)?;
    let missing: Vec<bool> = ploidy_missingness_bytes
        .iter()
        .map(|&byte| (byte >> 7) & 1 == 1)
        .collect();

    let phased = read_u8(&mut cursor, path)?;
    if phased != 0 {
        return Err(Error::unsupported(path, "phased data is not supported"));
    }

    let b = read_u8(&mut cursor, path)?;
    if !(1..=32).contains(&b) {
        return Err(Error::malformed(
            path,
            format!("probability bit width {b} out of range 1..=32"),
        ));
    }

    let unpacked = unpack_bits(cursor, b as u32);
    let needed = 2 * sample_count;
    if unpacked.len() < needed {
        return Err(Error::malformed(
            path,
            format!(
                "probability stream yields {} values, need {needed}",
                unpacked.len()
            ),
        ));
    }

    let denom = (2u64.pow(b as u32) - 1) as f64;
    let mut p01 = Array2::<f64>::zeros((sample_count, 2));
    for i in 0..sample_count {
        p01[[i, 0]] = unpacked[2 * i] as f64 / denom;
        p01[[i, 1]] = unpacked[2 * i + 1] as f64 / denom;
    }

    if want_probabilities {
        let mut probs = Array2::<f64>::zeros((sample_count, 3));
        for i in 0..sample_count {
            let p0 = p01[[i, 0]];
            let p1 = p01[[i, 1]];
            let p2 = 1.0 - p0 - p1;
            if missing[i] {
                probs[[i, 0]] = f64::NAN;
                probs[[i, 1]] = f64::NAN;
                probs[[i, 2]] = f64::NAN;
            } else {
                probs[[i, 0]] = p0;
                probs[[i, 1]] = p1;
                probs[[i, 2]] = p2;
            }
        }
        return Ok(VariantPayload::Probabilities(probs));
    }

    let mut dosage = Array1::<f64>::zeros(sample_count);
    for i in 0..sample_count {
        let p0 = p01[[i, 0]];
        let p1 = p01[[i, 1]];
        let p2 = 1.0 - p0 - p1;
        if missing[i] {
            dosage[i] = f64::NAN;
            continue;
        }
        let value = 2.0 * p2 + p1;
        let good = probability_threshold <= 0.0
            || p0 >= probability_threshold
            || p1 >= probability_threshold
            || p2 >= probability_threshold;
        dosage[i] = if good { value } else { f64::NAN };
    }

    Ok(VariantPayload::Dosage(dosage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bgen::compression::Compression;
    use std::io::Cursor;

    fn header(sample_count: u32, layout: Layout, compression: Compression) -> Header {
        Header {
            offset: 0,
            header_size: 20,
            variant_count: 1,
            sample_count,
            layout,
            compression,
            has_embedded_samples: false,
            variant_start: 24,
        }
    }

    #[test]
    fn layout1_constant_probabilities_yield_expected_dosage() {
        let h = header(2, Layout::One, Compression::None);
        let path = Path::new("t.bgen");

        // Two samples, each (0.9, 0.05, 0.05) scaled to u16/32768.
        let mut buf = Vec::new();
        for _ in 0..2 {
            for p in [0.9, 0.05, 0.05] {
                let raw = (p * 32768.0).round() as u16;
                buf.extend_from_slice(&raw.to_le_bytes());
            }
        }
        let mut cursor = Cursor::new(buf);
        let payload = read_variant_payload_layout1(&mut cursor, &h, 0.9, false, path).unwrap();
        match payload {
            VariantPayload::Dosage(d) => {
                for i in 0..2 {
                    assert!((d[i] - 0.15).abs() < 1e-3);
                }
            }
            _ => panic!("expected dosage"),
        }
    }

    #[test]
    fn layout1_quality_mask_sets_nan_above_threshold() {
        let h = header(1, Layout::One, Compression::None);
        let path = Path::new("t.bgen");
        let mut buf = Vec::new();
        for p in [0.9, 0.05, 0.05] {
            let raw = (p * 32768.0).round() as u16;
            buf.extend_from_slice(&raw.to_le_bytes());
        }
        let mut cursor = Cursor::new(buf);
        let payload = read_variant_payload_layout1(&mut cursor, &h, 0.95, false, path).unwrap();
        match payload {
            VariantPayload::Dosage(d) => assert!(d[0].is_nan()),
            _ => panic!("expected dosage"),
        }
    }

    fn build_layout2_payload(sample_count: u32, b: u8, missing: &[bool], probs: &[(u64, u64)]) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&sample_count.to_le_bytes());
        data.extend_from_slice(&2u16.to_le_bytes());
        data.push(2); // min_ploidy
        data.push(2); // max_ploidy
        for &m in missing {
            data.push(if m { 0x80 | 2 } else { 2 });
        }
        data.push(0); // phased
        data.push(b);

        let mut acc: u64 = 0;
        let mut acc_bits: u32 = 0;
        let mut bytes = Vec::new();
        for &(p0, p1) in probs {
            for value in [p0, p1] {
                acc |= value << acc_bits;
                acc_bits += b as u32;
                while acc_bits >= 8 {
                    bytes.push((acc & 0xFF) as u8);
                    acc >>= 8;
                    acc_bits -= 8;
                }
            }
        }
        if acc_bits > 0 {
            bytes.push((acc & 0xFF) as u8);
        }
        data.extend_from_slice(&bytes);
        data
    }

    #[test]
    fn layout2_missing_sample_is_nan_in_dosage() {
        let h = header(2, Layout::Two, Compression::None);
        let path = Path::new("t.bgen");
        let b = 8u8;
        let denom = (2u64.pow(b as u32) - 1) as f64;
        let p0_raw = (0.1 * denom).round() as u64;
        let p1_raw = (0.2 * denom).round() as u64;
        let data = build_layout2_payload(2, b, &[false, true], &[(p0_raw, p1_raw), (0, 0)]);

        let mut buf = Vec::new();
        let c = data.len() as u32;
        buf.extend_from_slice(&c.to_le_bytes());
        buf.extend_from_slice(&data);
        let mut cursor = Cursor::new(buf);

        let payload = read_variant_payload_layout2(&mut cursor, &h, 0.0, false, path).unwrap();
        match payload {
            VariantPayload::Dosage(d) => {
                assert!(!d[0].is_nan());
                assert!(d[1].is_nan());
            }
            _ => panic!("expected dosage"),
        }
    }

    #[test]
    fn layout2_probabilities_sum_to_one() {
        let h = header(1, Layout::Two, Compression::None);
        let path = Path::new("t.bgen");
        let b = 16u8;
        let denom = (2u64.pow(b as u32) - 1) as f64;
        let p0_raw = (0.3 * denom).round() as u64;
        let p1_raw = (0.4 * denom).round() as u64;
        let data = build_layout2_payload(1, b, &[false], &[(p0_raw, p1_raw)]);

        let mut buf = Vec::new();
        let c = data.len() as u32;
        buf.extend_from_slice(&c.to_le_bytes());
        buf.extend_from_slice(&data);
        let mut cursor = Cursor::new(buf);

        let payload = read_variant_payload_layout2(&mut cursor, &h, 0.0, true, path).unwrap();
        match payload {
            VariantPayload::Probabilities(p) => {
                let sum: f64 = p.row(0).sum();
                assert!((sum - 1.0).abs() < 1e-6);
            }
            _ => panic!("expected probabilities"),
        }
    }

    #[test]
    fn layout2_rejects_nonbinary_allele_count() {
        let h = header(1, Layout::Two, Compression::None);
        let path = Path::new("t.bgen");
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes());
        data.extend_from_slice(&3u16.to_le_bytes()); // K = 3
        data.push(2);
        data.push(2);
        data.push(2); // 1 sample, missingness byte
        data.push(0);
        data.push(8);

        let mut buf = Vec::new();
        let c = data.len() as u32;
        buf.extend_from_slice(&c.to_le_bytes());
        buf.extend_from_slice(&data);
        let mut cursor = Cursor::new(buf);

        assert!(matches!(
            read_variant_payload_layout2(&mut cursor, &h, 0.0, false, path),
            Err(Error::Unsupported { .. })
        ));
    }
}

//! The public façade: carries the two axis selectors through every query,
//! lazily opens the BGEN file handle for each operation, and holds the
//! `.bgi` index connection (if any) for the reader's lifetime.

use std::fs::File;
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use ndarray::{Array1, Array2, Array3};

use crate::bgen::compression::Compression;
use crate::bgen::header::{self, Header, Layout};
use crate::bgen::index::{self, BgiIndex};
use crate::bgen::variant::VariantInfo;
use crate::bgen::variant_data::{read_variant_info, read_variant_payload_layout1, read_variant_payload_layout2, VariantPayload};
use crate::error::{Error, Result};
use crate::selection::Selector;

/// Construction-time options. A plain data bag, not a layered config system
/// — this reader has no env-var/file-based configuration surface.
#[derive(Debug, Clone)]
pub struct BgenOptions {
    /// Override for the companion `.bgi` location; defaults to
    /// `<file_path>.bgi`.
    pub bgi_path: Option<PathBuf>,
    /// Optional `.sample` companion. Recognised but not parsed: if embedded
    /// sample IDs are absent and this is set, `sample_ids()` fails with
    /// `Unsupported`. Embedded IDs always take priority when both are
    /// present.
    pub sample_path: Option<PathBuf>,
    /// Per-call quality threshold `q`. `0.0` disables quality masking.
    pub probability_threshold: f64,
    /// When true, per-variant reads return probability triples instead of
    /// dosages.
    pub probabilities: bool,
}

impl Default for BgenOptions {
    fn default() -> Self {
        BgenOptions {
            bgi_path: None,
            sample_path: None,
            probability_threshold: 0.9,
            probabilities: false,
        }
    }
}

pub struct BgenReader {
    file_path: PathBuf,
    header: Header,
    embedded_samples: Option<Rc<Vec<String>>>,
    sample_path: Option<PathBuf>,
    index: Option<Rc<BgiIndex>>,
    probability_threshold: f64,
    probabilities_mode: bool,
    sample_selector: Selector,
    variant_selector: Selector,
}

impl BgenReader {
    pub fn open(file_path: impl Into<PathBuf>, options: BgenOptions) -> Result<Self> {
        let file_path = file_path.into();

        let header = {
            let file = File::open(&file_path).map_err(|e| Error::io(&file_path, e))?;
            let mut reader = BufReader::new(file);
            header::parse_header(&mut reader, &file_path)?
        };

        let embedded_samples = if header.has_embedded_samples {
            let file = File::open(&file_path).map_err(|e| Error::io(&file_path, e))?;
            let mut reader = BufReader::new(file);
            let _ = header::parse_header(&mut reader, &file_path)?;
            Some(Rc::new(header::parse_sample_block(&mut reader, &header, &file_path)?))
        } else {
            None
        };

        let bgi_path = options
            .bgi_path
            .clone()
            .unwrap_or_else(|| index::default_bgi_path(&file_path));

        let index = if bgi_path.exists() {
            Some(Rc::new(BgiIndex::open_and_validate(
                &bgi_path,
                header.variant_count,
                header.variant_start,
                &file_path,
            )?))
        } else {
            None
        };

        let sample_selector = Selector::full(header.sample_count as usize);
        let variant_selector = Selector::full(header.variant_count as usize);

        Ok(BgenReader {
            file_path,
            header,
            embedded_samples,
            sample_path: options.sample_path,
            index,
            probability_threshold: options.probability_threshold,
            probabilities_mode: options.probabilities,
            sample_selector,
            variant_selector,
        })
    }

    pub fn sample_count(&self) -> usize {
        self.header.sample_count as usize
    }

    pub fn variant_count(&self) -> usize {
        self.header.variant_count as usize
    }

    pub fn layout(&self) -> Layout {
        self.header.layout
    }

    pub fn compression(&self) -> Compression {
        self.header.compression
    }

    fn index(&self) -> Result<&BgiIndex> {
        self.index
            .as_deref()
            .ok_or_else(|| Error::IndexMissing { path: self.file_path.clone() })
    }

    /// Embedded sample IDs if present; otherwise a synthesised `(i, i)` pair
    /// per included sample index, where `i` is the sample's own position.
    pub fn sample_ids(&self) -> Result<Vec<(String, String)>> {
        let indices = self.sample_selector.resolve(self.sample_count(), &self.file_path)?;

        if let Some(samples) = &self.embedded_samples {
            return Ok(indices
                .into_iter()
                .map(|i| (samples[i].clone(), samples[i].clone()))
                .collect());
        }

        if self.sample_path.is_some() {
            return Err(Error::unsupported(
                &self.file_path,
                "no embedded sample IDs and .sample parsing is out of scope for this reader",
            ));
        }

        Ok(indices.into_iter().map(|i| (i.to_string(), i.to_string())).collect())
    }

    /// Rsids projected through the variant selector. Requires a `.bgi`.
    pub fn variant_ids(&self) -> Result<Vec<String>> {
        Ok(self.variant_info()?.into_iter().map(|(_, _, rsid, _, _)| rsid).collect())
    }

    /// Full `Variant` records, in selector order. Requires a `.bgi`.
    pub fn variant_info(&self) -> Result<Vec<VariantInfo>> {
        let index = self.index()?;
        let all = index.all_variant_info(&self.file_path)?;
        self.project_by_variant_selector(all)
    }

    fn project_by_variant_selector<T: Clone>(&self, all: Vec<T>) -> Result<Vec<T>> {
        let indices = self.variant_selector.resolve(self.variant_count(), &self.file_path)?;
        indices
            .into_iter()
            .map(|i| {
                all.get(i).cloned().ok_or_else(|| {
                    Error::malformed(&self.file_path, format!("variant index {i} out of range"))
                })
            })
            .collect()
    }

    fn open_file(&self) -> Result<BufReader<File>> {
        let file = File::open(&self.file_path).map_err(|e| Error::io(&self.file_path, e))?;
        Ok(BufReader::new(file))
    }

    fn read_payload_at(&self, reader: &mut BufReader<File>, offset: u64, want_probabilities: bool) -> Result<VariantPayload> {
        reader
            .seek(SeekFrom::Start(offset))
            .map_err(|e| Error::io(&self.file_path, e))?;
        let _info = read_variant_info(reader, &self.header, &self.file_path)?;
        match self.header.layout {
            Layout::One => read_variant_payload_layout1(
                reader,
                &self.header,
                self.probability_threshold,
                want_probabilities,
                &self.file_path,
            ),
            Layout::Two => read_variant_payload_layout2(
                reader,
                &self.header,
                self.probability_threshold,
                want_probabilities,
                &self.file_path,
            ),
        }
    }

    fn selected_offsets(&self) -> Result<Vec<u64>> {
        let index = self.index()?;
        let all_offsets = index.all_offsets(&self.file_path)?;
        self.project_by_variant_selector(all_offsets)
    }

    fn selected_sample_indices(&self) -> Result<Vec<usize>> {
        self.sample_selector.resolve(self.sample_count(), &self.file_path)
    }

    /// 2-D dosage array, shape `(selected_variants, selected_samples)`.
    pub fn dosage_matrix(&self) -> Result<Array2<f64>> {
        let offsets = self.selected_offsets()?;
        let sample_indices = self.selected_sample_indices()?;
        let mut reader = self.open_file()?;

        let mut out = Array2::<f64>::zeros((offsets.len(), sample_indices.len()));
        for (row, &offset) in offsets.iter().enumerate() {
            let payload = self.read_payload_at(&mut reader, offset, false)?;
            let full = match payload {
                VariantPayload::Dosage(d) => d,
                VariantPayload::Probabilities(_) => unreachable!("dosage mode requested"),
            };
            for (col, &sample_idx) in sample_indices.iter().enumerate() {
                out[[row, col]] = full[sample_idx];
            }
        }
        Ok(out)
    }

    /// 3-D probability array, shape `(selected_variants, selected_samples, 3)`.
    /// Layout 2 only.
    pub fn probability_tensor(&self) -> Result<Array3<f64>> {
        if self.header.layout != Layout::Two {
            return Err(Error::unsupported(
                &self.file_path,
                "probability_tensor is only available for layout-2 BGEN files",
            ));
        }

        let offsets = self.selected_offsets()?;
        let sample_indices = self.selected_sample_indices()?;
        let mut reader = self.open_file()?;

        let mut out = Array3::<f64>::zeros((offsets.len(), sample_indices.len(), 3));
        for (row, &offset) in offsets.iter().enumerate() {
            let payload = self.read_payload_at(&mut reader, offset, true)?;
            let full = match payload {
                VariantPayload::Probabilities(p) => p,
                VariantPayload::Dosage(_) => unreachable!("probability mode requested"),
            };
            for (col, &sample_idx) in sample_indices.iter().enumerate() {
                for k in 0..3 {
                    out[[row, col, k]] = full[[sample_idx, k]];
                }
            }
        }
        Ok(out)
    }

    /// Paired `(info, per-variant vector)`, honoring the reader's
    /// probabilities/dosage mode.
    pub fn variant_bundle(&self) -> Result<Vec<(VariantInfo, VariantPayload)>> {
        let info = self.variant_info()?;
        let offsets = self.selected_offsets()?;
        let sample_indices = self.selected_sample_indices()?;
        let mut reader = self.open_file()?;

        info.into_iter()
            .zip(offsets)
            .map(|(variant, offset)| {
                let payload = self.read_payload_at(&mut reader, offset, self.probabilities_mode)?;
                Ok((variant, select_samples(payload, &sample_indices)))
            })
            .collect()
    }

    /// Variant info and payload restricted to an identifier set. Requires a
    /// `.bgi`.
    pub fn variants_by_id(&self, ids: &[String]) -> Result<Vec<(VariantInfo, VariantPayload)>> {
        let index = self.index()?;
        let rows = index.rows_by_id(ids, &self.file_path)?;
        let sample_indices = self.selected_sample_indices()?;
        let mut reader = self.open_file()?;

        rows.into_iter()
            .map(|(offset, info)| {
                let payload = self.read_payload_at(&mut reader, offset, self.probabilities_mode)?;
                Ok((info, select_samples(payload, &sample_indices)))
            })
            .collect()
    }

    /// Positions of `ids` within the current (post-selection) sample axis.
    /// Unknown IDs are emitted as `-1` when `report_missing` is set,
    /// otherwise they are dropped.
    pub fn sample_index_lookup(&self, ids: &[String], report_missing: bool) -> Result<Vec<i64>> {
        let current = self.sample_ids()?;
        let positions: Vec<i64> = ids
            .iter()
            .filter_map(|id| {
                let found = current.iter().position(|(a, _)| a == id).map(|p| p as i64);
                match (found, report_missing) {
                    (Some(p), _) => Some(p),
                    (None, true) => Some(-1),
                    (None, false) => None,
                }
            })
            .collect();
        Ok(positions)
    }

    /// Returns a new façade with refined selectors, sharing the same file
    /// path and (if present) `.bgi` connection. No file I/O is performed.
    pub fn select(&self, sample_selector: Selector, variant_selector: Selector) -> BgenReader {
        BgenReader {
            file_path: self.file_path.clone(),
            header: self.header.clone(),
            embedded_samples: self.embedded_samples.clone(),
            sample_path: self.sample_path.clone(),
            index: self.index.clone(),
            probability_threshold: self.probability_threshold,
            probabilities_mode: self.probabilities_mode,
            sample_selector,
            variant_selector,
        }
    }

    /// Rebuild a `.bgi` for this BGEN at `output_path`. No-op if it already
    /// exists. Only defined for layout 2.
    pub fn create_bgi(&self, output_path: impl AsRef<Path>) -> Result<()> {
        index::create_bgi(&self.file_path, output_path.as_ref(), &self.header)
    }
}

fn select_samples(payload: VariantPayload, sample_indices: &[usize]) -> VariantPayload {
    match payload {
        VariantPayload::Dosage(full) => {
            let mut out = Array1::<f64>::zeros(sample_indices.len());
            for (col, &idx) in sample_indices.iter().enumerate() {
                out[col] = full[idx];
            }
            VariantPayload::Dosage(out)
        }
        VariantPayload::Probabilities(full) => {
            let mut out = Array2::<f64>::zeros((sample_indices.len(), 3));
            for (col, &idx) in sample_indices.iter().enumerate() {
                for k in 0..3 {
                    out[[col, k]] = full[[idx, k]];
                }
            }
            VariantPayload::Probabilities(out)
        }
    }
}

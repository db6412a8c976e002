//! Axis selectors carried through every query: either a contiguous range or
//! an explicit, possibly out-of-order list of indices. Negative list entries
//! mean "not found" and are dropped rather than treated as Python-style
//! negative indexing.

use std::ops::Range;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub enum Selector {
    Range(Range<usize>),
    Indices(Vec<i64>),
}

impl Selector {
    pub fn full(len: usize) -> Self {
        Selector::Range(0..len)
    }

    /// Resolve this selector against an axis of length `len`, producing the
    /// concrete, ordered list of indices it selects. Negative entries in an
    /// explicit list are filtered out.
    pub fn resolve(&self, len: usize, path: &Path) -> Result<Vec<usize>> {
        match self {
            Selector::Range(range) => {
                if range.start > len || range.end > len {
                    return Err(Error::malformed(
                        path,
                        format!("selector range {range:?} out of bounds for axis of length {len}"),
                    ));
                }
                Ok(range.clone().collect())
            }
            Selector::Indices(indices) => Ok(indices
                .iter()
                .filter(|&&i| i >= 0)
                .map(|&i| i as usize)
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_resolves_to_contiguous_indices() {
        let path = Path::new("t.bgen");
        let resolved = Selector::Range(2..5).resolve(10, path).unwrap();
        assert_eq!(resolved, vec![2, 3, 4]);
    }

    #[test]
    fn indices_filter_out_negative_entries() {
        let path = Path::new("t.bgen");
        let resolved = Selector::Indices(vec![0, -1, 2, -1, 4]).resolve(10, path).unwrap();
        assert_eq!(resolved, vec![0, 2, 4]);
    }

    #[test]
    fn out_of_range_range_is_an_error() {
        let path = Path::new("t.bgen");
        assert!(Selector::Range(0..20).resolve(10, path).is_err());
    }
}

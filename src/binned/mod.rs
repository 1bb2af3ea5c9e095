//! Binned SFC wrapper: prepends each dimension's bin label bytes to the
//! underlying Hilbert curve's sort key, so that values sharing a bin sort
//! together and within a bin still sort by their Hilbert index.

use serde::{Deserialize, Serialize};

use crate::dimension::BinRange;
use crate::error::Result;
use crate::sfc::{HilbertSfc, SfcDimension};

/// One Hilbert curve plus the bin labeling rules carried by its
/// dimensions' [`crate::dimension::DimensionDefinition`]s.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BinnedSfc {
    pub sfc: HilbertSfc,
}

impl BinnedSfc {
    pub fn new(sfc: HilbertSfc) -> Self {
        Self { sfc }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }

    /// The composite sort key for one data point: every dimension's bin
    /// label, in dimension order, followed by the Hilbert index bytes.
    pub fn insertion_key(&self, values: &[f64]) -> Result<Vec<u8>> {
        let mut bin_bytes = Vec::new();
        for (dim, &v) in self.sfc.dimensions.iter().zip(values.iter()) {
            let b = dim.definition.normalize(v);
            bin_bytes.extend_from_slice(&b.bin_label);
        }
        let idx = self.sfc.encode(values)?;
        bin_bytes.extend_from_slice(&idx.to_sort_key(self.sfc.total_precision_bits()));
        Ok(bin_bytes)
    }

    /// The fixed number of bytes every insertion key produced by this curve
    /// occupies: the sum of each dimension's `fixed_bin_id_size` plus the
    /// curve's own key width.
    pub fn key_byte_width(&self) -> usize {
        self.bin_label_width() + self.sfc.key_byte_width()
    }

    /// The fixed number of bin-label bytes alone (no SFC bytes) — what a
    /// tiered strategy's partition key carries for this tier, per bin
    /// combo, once the tier byte is added.
    pub fn bin_label_width(&self) -> usize {
        self.sfc.dimensions.iter().map(|d| d.definition.fixed_bin_id_size).sum()
    }

    /// If the entire binned data range (already resolved to one bin
    /// combination's bounds, in bin-local `[0, 1]` normalized space) fits
    /// within a single SFC cell — `encode(min) == encode(max)` — return the
    /// sort key (SFC bytes only; the caller prefixes its own `tierByte ‖
    /// binId` partition key) for that cell; otherwise `None`, meaning the
    /// caller must fall back to a full decomposition (or a coarser tier).
    pub fn single_insertion_id(&self, norm_range: &[(f64, f64)]) -> Result<Option<Vec<u8>>> {
        let mins: Vec<f64> = norm_range.iter().map(|&(lo, _)| lo).collect();
        let maxs: Vec<f64> = norm_range.iter().map(|&(_, hi)| hi).collect();
        let enc_min = self.sfc.encode_normalized(&mins)?;
        let enc_max = self.sfc.encode_normalized(&maxs)?;
        if enc_min != enc_max {
            return Ok(None);
        }
        Ok(Some(enc_min.to_sort_key(self.sfc.total_precision_bits())))
    }

    /// Every individual grid cell a data range touches, each materialized
    /// as its own sort key (SFC bytes only — the caller prefixes `tierByte
    /// ‖ binId`) rather than collapsed into a range — the tiered strategy
    /// falls back to this only when
    /// [`Self::single_insertion_id`] fails and the estimated cell count is
    /// small enough to afford one row per cell.
    pub fn decompose_entry_cells(&self, norm_range: &[(f64, f64)]) -> Vec<Vec<u8>> {
        let per_dim_cells: Vec<Vec<u64>> = norm_range
            .iter()
            .map(|&(nmin, nmax)| {
                let (gl, gh) = crate::sfc::range::grid_bounds(&self.sfc, nmin, nmax);
                (gl..=gh).collect()
            })
            .collect();
        cartesian_product(&per_dim_cells)
            .into_iter()
            .map(|combo| {
                let idx = self.sfc.encode_grid_index(&combo);
                idx.to_sort_key(self.sfc.total_precision_bits())
            })
            .collect()
    }

    /// Decompose a query box into composite `(start, end)` byte-key ranges:
    /// one SFC range-set per combination of bins overlapping the query
    /// (binned dimensions may touch several buckets; bounded/periodic
    /// dimensions always contribute exactly one), each prefixed with that
    /// combination's concatenated bin label.
    pub fn decompose_ranges(
        &self,
        query: &[(f64, f64)],
        max_ranges_per_bin_combo: usize,
        over_inclusive_on_edge: bool,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for (label, norm_query) in resolve_bin_combos(&self.sfc.dimensions, query, over_inclusive_on_edge) {
            let decomposition = self.sfc.decompose_range_normalized(&norm_query, max_ranges_per_bin_combo)?;
            for (lo_idx, hi_idx) in decomposition.ranges {
                let mut start = label.clone();
                start.extend_from_slice(&lo_idx.to_sort_key(self.sfc.total_precision_bits()));
                let mut end = label.clone();
                end.extend_from_slice(&hi_idx.to_sort_key(self.sfc.total_precision_bits()));
                out.push((start, end));
            }
        }
        Ok(out)
    }
}

/// Resolve every bin combination a data or query range touches: for each
/// dimension, every overlapping [`BinRange`] (`getBinnedRangesPerDimension`),
/// then the Cartesian product across dimensions (`applyBins`), each combo
/// reduced to its concatenated bin label and its bin-local normalized
/// `[0, 1]` sub-range per dimension. Shared by query decomposition
/// ([`BinnedSfc::decompose_ranges`]) and insertion-id tier selection
/// ([`crate::strategy::TieredSfcIndexStrategy`]), since bin structure is
/// identical across every tier of a strategy (only SFC bit width differs).
pub(crate) fn resolve_bin_combos(
    dims: &[SfcDimension],
    range: &[(f64, f64)],
    over_inclusive_on_edge: bool,
) -> Vec<(Vec<u8>, Vec<(f64, f64)>)> {
    let mut per_dim_bins: Vec<Vec<BinRange>> = Vec::with_capacity(dims.len());
    for (dim, &(lo, hi)) in dims.iter().zip(range.iter()) {
        let bins = dim.definition.normalize_range(lo, hi, over_inclusive_on_edge);
        if bins.is_empty() {
            return Vec::new();
        }
        per_dim_bins.push(bins);
    }
    cartesian_product(&per_dim_bins)
        .into_iter()
        .map(|combo| {
            let mut label = Vec::new();
            let mut norm_range = Vec::with_capacity(combo.len());
            for bin in &combo {
                label.extend_from_slice(&bin.bin_label);
                norm_range.push((bin.norm_min, bin.norm_max));
            }
            (label, norm_range)
        })
        .collect()
}

/// The cartesian product of several per-dimension candidate lists, as owned
/// clones of the chosen element from each list.
fn cartesian_product<T: Clone>(lists: &[Vec<T>]) -> Vec<Vec<T>> {
    lists.iter().fold(vec![Vec::new()], |acc, list| {
        acc.into_iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut next = prefix.clone();
                    next.push(item.clone());
                    next
                })
            })
            .collect()
    })
}

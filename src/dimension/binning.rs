//! Fixed-width bucket arithmetic for binned dimensions.
//!
//! A flat, single-level binning scheme: one bucket id per fixed-width
//! interval of the underlying value, with a fixed-size big-endian byte
//! label.

use serde::{Deserialize, Serialize};

/// One fixed-width interval bucket scheme: `bucket_id = floor((v - origin) /
/// bin_width)`, encoded as a `label_size_bytes`-wide big-endian byte label.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedIntervalBinning {
    pub origin: f64,
    pub bin_width: f64,
    pub label_size_bytes: usize,
}

impl FixedIntervalBinning {
    pub fn new(origin: f64, bin_width: f64, label_size_bytes: usize) -> Self {
        Self {
            origin,
            bin_width,
            label_size_bytes,
        }
    }

    /// A common preset: one bucket per whole year, given a reference epoch
    /// (e.g. year 0 / unix epoch) and the bin index already expressed in
    /// years.
    pub fn yearly(epoch_year: f64) -> Self {
        Self::new(epoch_year, 1.0, 4)
    }

    fn bucket_index(&self, v: f64) -> i64 {
        ((v - self.origin) / self.bin_width).floor() as i64
    }

    fn bucket_bounds(&self, index: i64) -> (f64, f64) {
        let lo = self.origin + (index as f64) * self.bin_width;
        (lo, lo + self.bin_width)
    }

    fn label(&self, index: i64) -> Vec<u8> {
        let unsigned = (index as i128 + (1i128 << 63)) as u64;
        let full = unsigned.to_be_bytes();
        full[full.len() - self.label_size_bytes.min(8)..].to_vec()
    }

    /// The bucket `v` falls in: `(label, bucket_min, bucket_max)`.
    pub fn bucket_for(&self, v: f64) -> (Vec<u8>, f64, f64) {
        let idx = self.bucket_index(v);
        let (lo, hi) = self.bucket_bounds(idx);
        (self.label(idx), lo, hi)
    }

    /// All buckets overlapping `[lo, hi]`, each with its bounds.
    pub fn buckets_overlapping(&self, lo: f64, hi: f64) -> Vec<(Vec<u8>, f64, f64)> {
        let first = self.bucket_index(lo);
        let last = self.bucket_index(hi);
        (first..=last)
            .map(|idx| {
                let (bmin, bmax) = self.bucket_bounds(idx);
                (self.label(idx), bmin, bmax)
            })
            .collect()
    }
}

/// Cumulative byte offsets for a sequence of fixed-width label sizes, used
/// when concatenating several binned dimensions' labels into one composite
/// bin key (the flat analogue of a multi-level
/// `calc_offsets_from_levels`).
pub fn calc_bin_offsets(label_sizes: &[usize]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(label_sizes.len());
    let mut acc = 0usize;
    for &size in label_sizes {
        offsets.push(acc);
        acc += size;
    }
    offsets
}

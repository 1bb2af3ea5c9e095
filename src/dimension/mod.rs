//! Dimension definitions and binning.
//!
//! A [`DimensionDefinition`] maps a single named numeric axis — longitude,
//! latitude, a timestamp — into a bounded `[0, 1]` domain the Hilbert SFC
//! layer can then scale into `[0, 2^bits)` integer cells. Dimensions that are
//! unbounded or periodic in the real world (time, angle) are first split
//! into fixed-width bins so that each bin can be normalized independently;
//! bounded dimensions are a single implicit bin covering the whole range.

mod binning;

pub use binning::{calc_bin_offsets, FixedIntervalBinning};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SfcIndexError};

/// One bucket a query or data value can fall into, with its own label bytes
/// and the `[norm_min, norm_max]` sub-range (in `[0, 1]` bin-local space)
/// clamped to the portion of the bucket the caller's value or query range
/// actually touches.
///
/// Invariant: normalizing a single value always yields exactly
/// one `BinRange` with `norm_min == norm_max`.
#[derive(Clone, Debug, PartialEq)]
pub struct BinRange {
    pub bin_label: Vec<u8>,
    pub norm_min: f64,
    pub norm_max: f64,
}

/// How an axis is partitioned into bins before normalization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum BinningStrategy {
    /// The whole `[min, max]` range is a single implicit bin (bounded or
    /// periodic dimensions with no natural coarse partitioning — e.g. lat).
    None,
    /// Fixed-width buckets over an unbounded or very wide range — e.g. one
    /// bucket per calendar year for a time dimension. `bin_width` is in the
    /// same units as `min`/`max`.
    FixedInterval(FixedIntervalBinning),
}

/// A named, finite-precision numeric axis.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DimensionDefinition {
    pub name: String,
    pub min: f64,
    pub max: f64,
    pub periodic: bool,
    pub binning: BinningStrategy,
    /// Bytes a bin label for this dimension always occupies, or 0 if this
    /// dimension contributes no bin bytes (unbinned dimensions, and
    /// variable-width bin labels).
    pub fixed_bin_id_size: usize,
}

impl DimensionDefinition {
    /// A plain bounded numeric axis (e.g. longitude, latitude).
    pub fn bounded(name: impl Into<String>, min: f64, max: f64) -> Result<Self> {
        let name = name.into();
        if !(max > min) {
            return Err(SfcIndexError::InvalidInterval { start: min, end: max });
        }
        Ok(Self {
            name,
            min,
            max,
            periodic: false,
            binning: BinningStrategy::None,
            fixed_bin_id_size: 0,
        })
    }

    /// A bounded axis that wraps at its edges (e.g. longitude crossing the
    /// antimeridian).
    pub fn periodic(name: impl Into<String>, min: f64, max: f64) -> Result<Self> {
        let mut dim = Self::bounded(name, min, max)?;
        dim.periodic = true;
        Ok(dim)
    }

    /// An unbounded or very wide axis split into fixed-width labeled
    /// buckets (e.g. time binned by year).
    pub fn binned(
        name: impl Into<String>,
        min: f64,
        max: f64,
        bucket: FixedIntervalBinning,
    ) -> Result<Self> {
        let mut dim = Self::bounded(name, min, max)?;
        dim.fixed_bin_id_size = bucket.label_size_bytes;
        dim.binning = BinningStrategy::FixedInterval(bucket);
        Ok(dim)
    }

    fn wrap(&self, v: f64) -> f64 {
        if !self.periodic {
            return v.clamp(self.min, self.max);
        }
        let span = self.max - self.min;
        if span <= 0.0 {
            return v;
        }
        let mut w = (v - self.min) % span;
        if w < 0.0 {
            w += span;
        }
        w + self.min
    }

    fn affine_normalize(&self, v: f64, bucket_min: f64, bucket_max: f64) -> f64 {
        let span = bucket_max - bucket_min;
        if span <= 0.0 {
            return 0.0;
        }
        ((v - bucket_min) / span).clamp(0.0, 1.0)
    }

    /// Map a `[0, 1]` bin-local normalized value back to real units within
    /// this dimension's own `[min, max]`. For a binned dimension this is
    /// only the inverse of the *unbinned* (`BinningStrategy::None`) case;
    /// binned dimensions' local space is relative to their bucket, which
    /// only the binned-dimension caller (holding the bucket bounds) can
    /// invert — see [`crate::binned`].
    pub fn denormalize(&self, norm: f64) -> f64 {
        self.min + norm.clamp(0.0, 1.0) * (self.max - self.min)
    }

    /// Normalize a single value into exactly one [`BinRange`].
    pub fn normalize(&self, v: f64) -> BinRange {
        let v = self.wrap(v);
        match &self.binning {
            BinningStrategy::None => BinRange {
                bin_label: Vec::new(),
                norm_min: self.affine_normalize(v, self.min, self.max),
                norm_max: self.affine_normalize(v, self.min, self.max),
            },
            BinningStrategy::FixedInterval(bucket) => {
                let (label, bucket_min, bucket_max) = bucket.bucket_for(v);
                let n = self.affine_normalize(v, bucket_min, bucket_max);
                BinRange {
                    bin_label: label,
                    norm_min: n,
                    norm_max: n,
                }
            }
        }
    }

    /// Normalize a query range `[lo, hi]` into the list of `BinRange`s that
    /// overlap it (`getBinnedRangesPerDimension`). Unbinned dimensions
    /// always return a single entry.
    pub fn normalize_range(&self, lo: f64, hi: f64, over_inclusive_on_edge: bool) -> Vec<BinRange> {
        let lo = lo.max(self.min);
        let hi = hi.min(self.max);
        if hi < lo {
            return Vec::new();
        }
        match &self.binning {
            BinningStrategy::None => {
                let eps = if over_inclusive_on_edge { 0.0 } else { f64::EPSILON };
                vec![BinRange {
                    bin_label: Vec::new(),
                    norm_min: self.affine_normalize(lo, self.min, self.max),
                    norm_max: self.affine_normalize(hi - eps * hi.abs().max(1.0), self.min, self.max),
                }]
            }
            BinningStrategy::FixedInterval(bucket) => bucket
                .buckets_overlapping(lo, hi)
                .into_iter()
                .map(|(label, bucket_min, bucket_max)| {
                    let clamp_lo = lo.max(bucket_min);
                    let clamp_hi = hi.min(bucket_max);
                    BinRange {
                        bin_label: label,
                        norm_min: self.affine_normalize(clamp_lo, bucket_min, bucket_max),
                        norm_max: self.affine_normalize(clamp_hi, bucket_min, bucket_max),
                    }
                })
                .collect(),
        }
    }
}

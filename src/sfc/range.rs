//! Query-box -> contiguous index range decomposition.
//!
//! A recursive quadrant walk over the curve's padded integer grid: a
//! quadrant fully inside the query box emits one contiguous index range (by
//! the curve's self-similarity — fixing the top bits of every dimension
//! fixes the top bits of the index); a quadrant fully outside is pruned; a
//! quadrant straddling the boundary splits into `2^n` children. Grounded on
//! the recursive contained/overlap/prune structure of Z-order range walkers
//! (`ironsea_index_sfc_dbc`'s sorted-cell `find_range`, `space_time`'s
//! `zranges`), adapted from Z-order's bit-interleave to the Hilbert curve's
//! corner-encode-plus-block-size technique.

use num_bigint::BigUint;
use num_traits::One;
use tracing::warn;

use super::{HilbertSfc, SfcIndex};
use crate::error::Result;

/// A safety valve against pathological boundary geometry (a query box whose
/// surface area, in grid cells, vastly exceeds `max_ranges`): once this many
/// quadrants have been visited, any quadrant still straddling the boundary
/// is emitted whole (over-inclusive) rather than split further.
const MAX_VISITED_NODES: usize = 200_000;

/// The result of decomposing a query box: a minimal, sorted, non-adjacent
/// set of inclusive `(start, end)` index ranges.
#[derive(Clone, Debug, PartialEq)]
pub struct RangeDecomposition {
    pub ranges: Vec<(SfcIndex, SfcIndex)>,
    /// True if the cardinality cap forced ranges to be bridged together,
    /// meaning the decomposition may cover cells outside the query box.
    pub over_inclusive: bool,
}

struct Quadrant {
    origin: Vec<u64>,
    cell_bits: u32,
}

fn cell_bounds(origin: &[u64], cell_bits: u32, dim: usize) -> (u64, u64) {
    let size = if cell_bits >= 64 { u64::MAX } else { 1u64 << cell_bits };
    let lo = origin[dim];
    let hi = lo.saturating_add(size - 1);
    (lo, hi)
}

fn contained(q: &Quadrant, lo: &[u64], hi: &[u64]) -> bool {
    (0..lo.len()).all(|i| {
        let (cmin, cmax) = cell_bounds(&q.origin, q.cell_bits, i);
        cmin >= lo[i] && cmax <= hi[i]
    })
}

fn disjoint(q: &Quadrant, lo: &[u64], hi: &[u64]) -> bool {
    (0..lo.len()).any(|i| {
        let (cmin, cmax) = cell_bounds(&q.origin, q.cell_bits, i);
        cmax < lo[i] || cmin > hi[i]
    })
}

/// A quadrant aligned on `cell_bits`-bit boundaries occupies one contiguous
/// block of `2^(n*cell_bits)` Hilbert indices (the curve's defining
/// self-similarity), but — unlike Z-order — the block's *minimum* index is
/// not always the quadrant's origin corner: the curve's entry corner into a
/// sub-cube rotates with orientation. Each of a Hilbert sub-cube's 2^n
/// corners is still always a curve entry/exit point, so the true minimum is
/// found by encoding every corner and taking the smallest.
fn emit(sfc: &HilbertSfc, q: &Quadrant, out: &mut Vec<(BigUint, BigUint)>) {
    let n = sfc.dimensions.len();
    let cell_size = if q.cell_bits >= 64 { u64::MAX } else { 1u64 << q.cell_bits };
    let mut low: Option<BigUint> = None;
    for combo in 0..(1usize << n) {
        let mut corner = q.origin.clone();
        for (i, coord) in corner.iter_mut().enumerate() {
            if combo & (1 << i) != 0 {
                *coord = coord.saturating_add(cell_size - 1);
            }
        }
        let idx = sfc.encode_grid(&corner);
        low = Some(match low {
            Some(cur) if cur <= idx => cur,
            _ => idx,
        });
    }
    let low = low.expect("a quadrant always has at least one corner");
    let block_bits = q.cell_bits * n as u32;
    let block_size = BigUint::one() << block_bits;
    let high = &low + &block_size - BigUint::one();
    out.push((low, high));
}

fn recurse(
    sfc: &HilbertSfc,
    q: Quadrant,
    lo: &[u64],
    hi: &[u64],
    visited: &mut usize,
    out: &mut Vec<(BigUint, BigUint)>,
) {
    *visited += 1;
    if disjoint(&q, lo, hi) {
        return;
    }
    if q.cell_bits == 0 || contained(&q, lo, hi) {
        emit(sfc, &q, out);
        return;
    }
    if *visited >= MAX_VISITED_NODES {
        warn!(
            visited,
            "range decomposition hit the node visitation cap; emitting remaining quadrant whole"
        );
        emit(sfc, &q, out);
        return;
    }

    let n = sfc.dimensions.len();
    let child_bits = q.cell_bits - 1;
    for combo in 0..(1usize << n) {
        let mut child_origin = q.origin.clone();
        for (i, coord) in child_origin.iter_mut().enumerate() {
            if combo & (1 << i) != 0 {
                *coord += 1u64 << child_bits;
            }
        }
        recurse(
            sfc,
            Quadrant {
                origin: child_origin,
                cell_bits: child_bits,
            },
            lo,
            hi,
            visited,
            out,
        );
    }
}

fn merge_adjacent(mut ranges: Vec<(BigUint, BigUint)>) -> Vec<(BigUint, BigUint)> {
    ranges.sort_by(|a, b| a.0.cmp(&b.0));
    let mut merged: Vec<(BigUint, BigUint)> = Vec::with_capacity(ranges.len());
    for (lo, hi) in ranges {
        if let Some(last) = merged.last_mut() {
            if lo <= &last.1 + BigUint::one() {
                if hi > last.1 {
                    last.1 = hi;
                }
                continue;
            }
        }
        merged.push((lo, hi));
    }
    merged
}

/// Greedily bridge the smallest gaps between adjacent ranges until at most
/// `max_ranges` remain.
fn cap_cardinality(mut ranges: Vec<(BigUint, BigUint)>, max_ranges: usize) -> (Vec<(BigUint, BigUint)>, bool) {
    if ranges.len() <= max_ranges || max_ranges == 0 {
        return (ranges, false);
    }
    while ranges.len() > max_ranges {
        let mut smallest_gap_idx = 0usize;
        let mut smallest_gap: Option<BigUint> = None;
        for i in 0..ranges.len() - 1 {
            let gap = &ranges[i + 1].0 - &ranges[i].1;
            if smallest_gap.as_ref().map(|g| &gap < g).unwrap_or(true) {
                smallest_gap = Some(gap);
                smallest_gap_idx = i;
            }
        }
        let next = ranges.remove(smallest_gap_idx + 1);
        ranges[smallest_gap_idx].1 = next.1;
    }
    (ranges, true)
}

fn run(sfc: &HilbertSfc, lo: Vec<u64>, hi: Vec<u64>, max_ranges: usize) -> RangeDecomposition {
    let n = sfc.dimensions.len();
    let mut raw = Vec::new();
    let mut visited = 0usize;
    recurse(
        sfc,
        Quadrant {
            origin: vec![0u64; n],
            cell_bits: sfc.grid_bits,
        },
        &lo,
        &hi,
        &mut visited,
        &mut raw,
    );

    let merged = merge_adjacent(raw);
    let (capped, over_inclusive) = cap_cardinality(merged, max_ranges);

    let ranges = capped
        .into_iter()
        .map(|(lo, hi)| {
            (
                SfcIndex::from_biguint(lo, sfc.backend, sfc.total_bits),
                SfcIndex::from_biguint(hi, sfc.backend, sfc.total_bits),
            )
        })
        .collect();

    RangeDecomposition { ranges, over_inclusive }
}

/// Maps a bin-local `[0, 1]` sub-range to the inclusive grid-cell range it
/// overlaps, using the same `floor(norm * 2^grid_bits)` quantization as
/// [`HilbertSfc::encode`]'s per-dimension coordinate mapping, so a box
/// aligned to this curve's own cell boundaries resolves to an exact range.
pub(crate) fn grid_bounds(sfc: &HilbertSfc, norm_min: f64, norm_max: f64) -> (u64, u64) {
    let max_cell = (1u64 << sfc.grid_bits) - 1;
    let num_cells = 1u64 << sfc.grid_bits;
    let lo = (norm_min.clamp(0.0, 1.0) * num_cells as f64)
        .floor()
        .clamp(0.0, max_cell as f64) as u64;
    let hi = (norm_max.clamp(0.0, 1.0) * num_cells as f64)
        .floor()
        .clamp(0.0, max_cell as f64) as u64;
    (lo, hi)
}

/// Decompose a query box given in this curve's own real-valued units.
pub fn decompose(
    sfc: &HilbertSfc,
    query: &[(f64, f64)],
    max_ranges: usize,
    over_inclusive_on_edge: bool,
) -> Result<RangeDecomposition> {
    let mut lo = Vec::with_capacity(sfc.dimensions.len());
    let mut hi = Vec::with_capacity(sfc.dimensions.len());
    for (dim, &(qlo, qhi)) in sfc.dimensions.iter().zip(query.iter()) {
        let bins = dim.definition.normalize_range(qlo, qhi, over_inclusive_on_edge);
        if bins.is_empty() {
            warn!(dimension = %dim.definition.name, "query range does not overlap dimension bounds");
            return Ok(RangeDecomposition {
                ranges: Vec::new(),
                over_inclusive: false,
            });
        }
        let norm_min = bins.iter().map(|b| b.norm_min).fold(f64::INFINITY, f64::min);
        let norm_max = bins.iter().map(|b| b.norm_max).fold(f64::NEG_INFINITY, f64::max);
        let (gl, gh) = grid_bounds(sfc, norm_min, norm_max);
        lo.push(gl);
        hi.push(gh);
    }

    Ok(run(sfc, lo, hi, max_ranges))
}

/// Decompose a query box already expressed in each dimension's bin-local
/// `[0, 1]` normalized space — used by [`crate::binned::BinnedSfc`], which
/// has already resolved which bin(s) a query touches.
pub fn decompose_normalized(sfc: &HilbertSfc, norm_query: &[(f64, f64)], max_ranges: usize) -> RangeDecomposition {
    let mut lo = Vec::with_capacity(sfc.dimensions.len());
    let mut hi = Vec::with_capacity(sfc.dimensions.len());
    for &(nmin, nmax) in norm_query {
        let (gl, gh) = grid_bounds(sfc, nmin, nmax);
        lo.push(gl);
        hi.push(gh);
    }
    run(sfc, lo, hi, max_ranges)
}

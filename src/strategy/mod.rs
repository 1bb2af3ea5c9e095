//! Tiered SFC strategy: an ordered stack of [`BinnedSfc`] curves from
//! coarsest to finest, used together so that sparse regions are indexed
//! coarsely (fewer, bigger cells, fewer bytes per key) while dense regions
//! fall through to finer tiers automatically as they fill up.

pub mod metadata;

use std::collections::HashMap;
use std::io::{Cursor, Read};

use num_bigint::BigUint;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use varint_rs::{VarintReader, VarintWriter};

pub use metadata::{InsertionId, TierMetadata};

use crate::binned::{resolve_bin_combos, BinnedSfc};
use crate::dimension::DimensionDefinition;
use crate::error::{Result, SfcIndexError};
use crate::sfc::{HilbertSfc, SfcDimension, SfcIndex};

/// One tiered strategy: `tiers[0]` is coarsest, `tiers[tiers.len() - 1]` is
/// finest. `tier_bytes[i]` is the on-the-wire byte identifying tier `i`; the
/// mapping is injective (no two tiers share a byte) but need not be dense
/// or ordered.
pub struct TieredSfcIndexStrategy {
    tiers: Vec<BinnedSfc>,
    tier_bytes: Vec<u8>,
    byte_to_tier: HashMap<u8, usize>,
    max_estimated_duplicate_ids_per_dimension: u64,
    num_dimensions: usize,
    /// Scratch state guarding range-decomposition bookkeeping shared across
    /// callers that reuse one strategy concurrently (mirrors the buffer
    /// lock held during insertion bookkeeping).
    scratch: Mutex<()>,
}

impl TieredSfcIndexStrategy {
    pub fn new(
        tiers: Vec<BinnedSfc>,
        tier_bytes: Vec<u8>,
        max_estimated_duplicate_ids_per_dimension: u64,
    ) -> Result<Self> {
        if tiers.is_empty() {
            return Err(SfcIndexError::ZeroTotalPrecision);
        }
        if tiers.len() != tier_bytes.len() {
            return Err(SfcIndexError::DimensionMismatch {
                expected: tiers.len(),
                actual: tier_bytes.len(),
            });
        }
        let mut byte_to_tier = HashMap::with_capacity(tier_bytes.len());
        for (i, &b) in tier_bytes.iter().enumerate() {
            if byte_to_tier.insert(b, i).is_some() {
                return Err(SfcIndexError::CorruptFormat {
                    reason: format!("tier byte {b} is mapped to more than one tier"),
                });
            }
        }
        let num_dimensions = tiers[0].sfc.num_dimensions();
        for tier in &tiers {
            if tier.sfc.num_dimensions() != num_dimensions {
                return Err(SfcIndexError::DimensionMismatch {
                    expected: num_dimensions,
                    actual: tier.sfc.num_dimensions(),
                });
            }
        }
        Ok(Self {
            tiers,
            tier_bytes,
            byte_to_tier,
            max_estimated_duplicate_ids_per_dimension,
            num_dimensions,
            scratch: Mutex::new(()),
        })
    }

    /// Build a strategy whose tiers all share the same dimension
    /// definitions and differ only in a fixed number of bits of precision
    /// per tier — the common case, letting callers avoid hand-rolling each
    /// tier's curve one at a time.
    pub fn create_equal_interval_precision_tiered_strategy(
        bits_per_tier_per_dim: u32,
        num_tiers: usize,
        dims: Vec<DimensionDefinition>,
        max_estimated_duplicate_ids_per_dimension: u64,
    ) -> Result<Self> {
        if num_tiers == 0 {
            return Err(SfcIndexError::ZeroTotalPrecision);
        }
        let mut tiers = Vec::with_capacity(num_tiers);
        let mut tier_bytes = Vec::with_capacity(num_tiers);
        for t in 0..num_tiers {
            let bits = bits_per_tier_per_dim * (t as u32 + 1);
            let sfc_dims: Vec<SfcDimension> = dims
                .iter()
                .map(|d| SfcDimension::new(d.clone(), bits))
                .collect::<Result<Vec<_>>>()?;
            let sfc = HilbertSfc::new(sfc_dims)?;
            tiers.push(BinnedSfc::new(sfc));
            tier_bytes.push(t as u8);
        }
        Self::new(tiers, tier_bytes, max_estimated_duplicate_ids_per_dimension)
    }

    pub fn num_tiers(&self) -> usize {
        self.tiers.len()
    }

    pub fn num_dimensions(&self) -> usize {
        self.num_dimensions
    }

    /// Read-only access to one tier's curve, coarsest-to-finest order.
    pub fn tier(&self, index: usize) -> Option<&BinnedSfc> {
        self.tiers.get(index)
    }

    pub fn tier_byte(&self, index: usize) -> Option<u8> {
        self.tier_bytes.get(index).copied()
    }

    pub fn tier_for_byte(&self, byte: u8) -> Option<usize> {
        self.byte_to_tier.get(&byte).copied()
    }

    /// Bytes every partition key at `tier` occupies: one tier byte plus
    /// that tier's bin-label width (the Hilbert-index bytes live in the
    /// sort key, not the partition key).
    pub fn partition_key_length(&self, tier: usize) -> Result<usize> {
        let t = self
            .tiers
            .get(tier)
            .ok_or(SfcIndexError::UnknownTier { tier: tier as u8 })?;
        Ok(1 + t.bin_label_width())
    }

    /// The dimension definitions shared by every tier (tiers differ only in
    /// bits of precision per dimension, never in binning/bounds), used for
    /// bin resolution and as the `numDims` array of the persistent format.
    fn base_dimensions(&self) -> &[SfcDimension] {
        &self.tiers[0].sfc.dimensions
    }

    /// Create a zeroed [`TierMetadata`] sized for this strategy.
    pub fn create_meta_data(&self) -> TierMetadata {
        TierMetadata::new(self.tiers.len())
    }

    /// Resolve every bin combination `data` touches, then for each, select
    /// the coarsest tier whose cell either contains the whole range in one
    /// SFC cell or, failing that, whose full decomposition doesn't exceed
    /// the duplicate-id budget. Returns one `(partitionKey, [sortKey])` per
    /// bin combo actually produced; empty `data` or data entirely outside
    /// every dimension's bounds yields an empty result with a warning,
    /// never a hard failure.
    pub fn get_insertion_ids(&self, data: &[(f64, f64)]) -> Result<Vec<(Vec<u8>, Vec<InsertionId>)>> {
        self.get_insertion_ids_with_max_dup(data, self.max_estimated_duplicate_ids_per_dimension)
    }

    /// As [`Self::get_insertion_ids`], overriding the configured duplicate-id
    /// budget per dimension for this call only.
    pub fn get_insertion_ids_with_max_dup(
        &self,
        data: &[(f64, f64)],
        max_estimated_duplicate_ids_per_dimension: u64,
    ) -> Result<Vec<(Vec<u8>, Vec<InsertionId>)>> {
        if data.is_empty() {
            warn!("getInsertionIds called with empty data; returning no insertion ids");
            return Ok(Vec::new());
        }
        if data.len() != self.num_dimensions {
            return Err(SfcIndexError::DimensionMismatch {
                expected: self.num_dimensions,
                actual: data.len(),
            });
        }
        let _guard = self.scratch.lock();
        let combos = resolve_bin_combos(self.base_dimensions(), data, true);
        if combos.is_empty() {
            warn!("data range does not overlap any dimension's bounds; no insertion ids produced");
            return Ok(Vec::new());
        }

        let num_nonzero_extent_dims = data.iter().filter(|&&(lo, hi)| hi > lo).count();
        let cap = if num_nonzero_extent_dims == 0 {
            u64::MAX
        } else {
            max_estimated_duplicate_ids_per_dimension.saturating_pow(num_nonzero_extent_dims as u32)
        };

        let mut out = Vec::with_capacity(combos.len());
        for (bin_label, norm_range) in combos {
            let (tier, ids) = self.select_tier_for_entry(&norm_range, cap)?;
            let tier_byte = self.tier_bytes[tier];
            let mut partition_key = vec![tier_byte];
            partition_key.extend_from_slice(&bin_label);
            debug!(tier, tier_byte, num_ids = ids.len(), "selected insertion tier for bin combo");
            out.push((partition_key, ids));
        }
        Ok(out)
    }

    /// Per-bin tier-selection loop: walk tiers from finest down
    /// to coarsest, accepting the first one that either fits the whole
    /// range in a single cell, or whose estimated cell count is within
    /// budget (or is the coarsest tier, which always accepts).
    fn select_tier_for_entry(&self, norm_range: &[(f64, f64)], cap: u64) -> Result<(usize, Vec<InsertionId>)> {
        for tier in (0..self.tiers.len()).rev() {
            let binned = &self.tiers[tier];
            if let Some(key) = binned.single_insertion_id(norm_range)? {
                return Ok((tier, vec![key]));
            }
            let row_count = binned.sfc.estimated_id_count_for_normalized_range(norm_range)?;
            if tier == 0 || row_count <= BigUint::from(cap) {
                return Ok((tier, binned.decompose_entry_cells(norm_range)));
            }
        }
        unreachable!("tier 0 always accepts per the selection loop above")
    }

    /// Record a batch of previously-produced insertion ids into `metadata`,
    /// incrementing the counter for each id's tier. A partition key whose
    /// first byte names a tier unknown to this strategy is ignored with a
    /// warning rather than failing the whole batch.
    pub fn insertion_ids_added(&self, metadata: &mut TierMetadata, ids: &[(Vec<u8>, Vec<InsertionId>)]) {
        for (partition_key, sort_keys) in ids {
            self.with_known_tier(partition_key, "insertionIdsAdded", |tier| {
                let _ = metadata.insertion_ids_added(tier, sort_keys);
            });
        }
    }

    /// Symmetric with [`Self::insertion_ids_added`].
    pub fn insertion_ids_removed(&self, metadata: &mut TierMetadata, ids: &[(Vec<u8>, Vec<InsertionId>)]) {
        for (partition_key, sort_keys) in ids {
            self.with_known_tier(partition_key, "insertionIdsRemoved", |tier| {
                let _ = metadata.insertion_ids_removed(tier, sort_keys);
            });
        }
    }

    fn with_known_tier(&self, partition_key: &[u8], op: &str, f: impl FnOnce(usize)) {
        let Some(&tier_byte) = partition_key.first() else {
            warn!(op, "empty partition key; ignoring");
            return;
        };
        match self.tier_for_byte(tier_byte) {
            Some(tier) => f(tier),
            None => warn!(op, tier_byte, "unknown tier byte; ignoring"),
        }
    }

    /// Decompose a query box into composite `(tier_byte || bin_label ||
    /// sfc_range)` byte ranges across every non-empty tier, finest to
    /// coarsest. Tiers with zero recorded insertions are skipped (no data
    /// could be there).
    pub fn decompose_query(
        &self,
        query: &[(f64, f64)],
        max_ranges_per_tier: usize,
        over_inclusive_on_edge: bool,
        metadata: &TierMetadata,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        self.get_query_ranges(query, max_ranges_per_tier, over_inclusive_on_edge, Some(metadata))
    }

    /// Decompose a query box into ranges across every tier. When `metadata`
    /// is supplied, tiers with zero recorded insertions are skipped; without
    /// it every tier is decomposed unconditionally. Ranges are grouped
    /// finest-tier-first, so finer matches appear first in the output.
    pub fn get_query_ranges(
        &self,
        query: &[(f64, f64)],
        max_ranges_per_tier: usize,
        over_inclusive_on_edge: bool,
        metadata: Option<&TierMetadata>,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        for tier in (0..self.tiers.len()).rev() {
            if let Some(meta) = metadata {
                if meta.count_at(tier) == 0 {
                    continue;
                }
            }
            let tier_byte = self.tier_bytes[tier];
            let ranges = self.tiers[tier].decompose_ranges(query, max_ranges_per_tier, over_inclusive_on_edge)?;
            if ranges.is_empty() && metadata.is_some() {
                warn!(tier, "no ranges produced for non-empty tier; query may lie outside its domain");
            }
            for (mut start, mut end) in ranges {
                let mut s = vec![tier_byte];
                s.append(&mut start);
                let mut e = vec![tier_byte];
                e.append(&mut end);
                out.push((s, e));
            }
        }
        Ok(out)
    }

    /// The raw grid coordinates (each in `[0, 2^gridBits)`) of the cell a
    /// stored key
    /// names. `None` (with a warning) if the partition key's tier byte is
    /// not one this strategy knows.
    pub fn get_coordinates_per_dimension(&self, partition_key: &[u8], sort_key: &[u8]) -> Option<Vec<u64>> {
        let tier_byte = *partition_key.first()?;
        let tier = match self.tier_for_byte(tier_byte) {
            Some(t) => t,
            None => {
                warn!(tier_byte, "unknown tier byte in getCoordinatesPerDimension");
                return None;
            }
        };
        let sfc = &self.tiers[tier].sfc;
        let idx = SfcIndex::from_sort_key(sort_key, sfc.backend());
        Some(sfc.decode_grid(&idx))
    }

    /// The real-valued `[min, max]` per dimension of the cell a stored key
    /// names. `None` (with a
    /// warning) under the same condition as
    /// [`Self::get_coordinates_per_dimension`].
    pub fn get_range_for_id(&self, partition_key: &[u8], sort_key: &[u8]) -> Option<Vec<(f64, f64)>> {
        let tier_byte = *partition_key.first()?;
        let tier = match self.tier_for_byte(tier_byte) {
            Some(t) => t,
            None => {
                warn!(tier_byte, "unknown tier byte in getRangeForId");
                return None;
            }
        };
        let sfc = &self.tiers[tier].sfc;
        let idx = SfcIndex::from_sort_key(sort_key, sfc.backend());
        Some(sfc.decode(&idx))
    }

    /// A stable, process-independent identity for this strategy's shape:
    /// its tiers' curve identities plus the tier-byte mapping and dup cap.
    pub fn id(&self) -> String {
        let mut buf = Vec::new();
        for (sfc_identity, &tier_byte) in self.tiers.iter().map(|t| t.sfc.identity()).zip(self.tier_bytes.iter()) {
            buf.extend_from_slice(&sfc_identity.to_be_bytes());
            buf.push(tier_byte);
        }
        buf.extend_from_slice(&self.max_estimated_duplicate_ids_per_dimension.to_be_bytes());
        let hash = xxhash_rust::xxh3::xxh3_64(&buf);
        format!("{hash:016x}")
    }

    /// Serialize per the persistent `tieredSFC` format: a varint
    /// header (`numSFCs`, `numDims`, `mappingSize`, `maxDup`), each tier's
    /// own `BinnedSfc` blob, each base dimension's own blob, then the
    /// `(sfcIndex, tierByte)` mapping pairs.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_u32_varint(self.tiers.len() as u32)?;
        buf.write_u32_varint(self.base_dimensions().len() as u32)?;
        buf.write_u32_varint(self.tier_bytes.len() as u32)?;
        buf.write_u64_varint(self.max_estimated_duplicate_ids_per_dimension)?;
        for tier in &self.tiers {
            let blob = tier.to_bytes()?;
            buf.write_u32_varint(blob.len() as u32)?;
            buf.extend_from_slice(&blob);
        }
        for dim in self.base_dimensions() {
            let blob = bincode::serialize(&dim.definition)?;
            buf.write_u32_varint(blob.len() as u32)?;
            buf.extend_from_slice(&blob);
        }
        for (sfc_index, &tier_byte) in self.tier_bytes.iter().enumerate() {
            buf.push(sfc_index as u8);
            buf.push(tier_byte);
        }
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);
        let num_sfcs = cursor.read_u32_varint()? as usize;
        let num_dims = cursor.read_u32_varint()? as usize;
        let mapping_size = cursor.read_u32_varint()? as usize;
        let max_dup = cursor.read_u64_varint()?;

        let mut tiers = Vec::with_capacity(num_sfcs);
        for _ in 0..num_sfcs {
            let len = cursor.read_u32_varint()? as usize;
            let mut blob = vec![0u8; len];
            cursor.read_exact(&mut blob).map_err(|_| SfcIndexError::CorruptFormat {
                reason: "truncated SFC blob in tieredSFC format".into(),
            })?;
            tiers.push(BinnedSfc::from_bytes(&blob)?);
        }

        // The base dimension-definition array is read for format fidelity
        // but not retained separately: every tier's own SFC blob already
        // carries its dimensions (shared across tiers but for its own bit
        // width), which is what decode/encode actually use.
        for _ in 0..num_dims {
            let len = cursor.read_u32_varint()? as usize;
            let mut blob = vec![0u8; len];
            cursor.read_exact(&mut blob).map_err(|_| SfcIndexError::CorruptFormat {
                reason: "truncated dimension-definition blob in tieredSFC format".into(),
            })?;
            let _: DimensionDefinition = bincode::deserialize(&blob)?;
        }

        if tiers.is_empty() {
            return Err(SfcIndexError::ZeroTotalPrecision);
        }
        let mut tier_bytes = vec![0u8; tiers.len()];
        for _ in 0..mapping_size {
            let mut pair = [0u8; 2];
            cursor.read_exact(&mut pair).map_err(|_| SfcIndexError::CorruptFormat {
                reason: "truncated tier mapping in tieredSFC format".into(),
            })?;
            let sfc_index = pair[0] as usize;
            let tier_byte = pair[1];
            if sfc_index >= tier_bytes.len() {
                return Err(SfcIndexError::CorruptFormat {
                    reason: format!("sfc index {sfc_index} out of range in tier mapping"),
                });
            }
            tier_bytes[sfc_index] = tier_byte;
        }

        Self::new(tiers, tier_bytes, max_dup)
    }
}

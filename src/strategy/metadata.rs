//! Per-tier bookkeeping: how many insertion ids currently live at each
//! tier, used by insertion tier selection and by query-time tier skipping.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SfcIndexError};

/// A composite insertion key (bin label bytes + Hilbert index bytes),
/// as produced by [`crate::binned::BinnedSfc::insertion_key`].
pub type InsertionId = Vec<u8>;

/// Per-tier counts for one [`crate::strategy::TieredSfcIndexStrategy`].
/// Index `i` corresponds to the strategy's tier `i` (coarsest = 0).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TierMetadata {
    pub counts: Vec<u64>,
}

impl TierMetadata {
    pub fn new(num_tiers: usize) -> Self {
        Self {
            counts: vec![0; num_tiers],
        }
    }

    pub fn num_tiers(&self) -> usize {
        self.counts.len()
    }

    pub fn count_at(&self, tier: usize) -> u64 {
        self.counts.get(tier).copied().unwrap_or(0)
    }

    pub fn insertion_ids_added(&mut self, tier: usize, ids: &[InsertionId]) -> Result<()> {
        let slot = self
            .counts
            .get_mut(tier)
            .ok_or(SfcIndexError::UnknownTier { tier: tier as u8 })?;
        *slot += ids.len() as u64;
        Ok(())
    }

    pub fn insertion_ids_removed(&mut self, tier: usize, ids: &[InsertionId]) -> Result<()> {
        let slot = self
            .counts
            .get_mut(tier)
            .ok_or(SfcIndexError::UnknownTier { tier: tier as u8 })?;
        *slot = slot.saturating_sub(ids.len() as u64);
        Ok(())
    }

    /// Merge another tier-metadata's counts into this one, elementwise.
    pub fn merge(&mut self, other: &TierMetadata) -> Result<()> {
        if self.counts.len() != other.counts.len() {
            return Err(SfcIndexError::DimensionMismatch {
                expected: self.counts.len(),
                actual: other.counts.len(),
            });
        }
        for (a, b) in self.counts.iter_mut().zip(other.counts.iter()) {
            *a += b;
        }
        Ok(())
    }
}

//! Persistent binary wire format: a small varint-framed envelope (magic,
//! format version, payload kind, varint length) wrapping an opaque inner
//! blob. The inner blob for each of the three wire formats below is
//! produced by `bincode` over the relevant `#[derive(Serialize,
//! Deserialize)]` type, keeping a clean split between hand-written
//! offset framing and `bincode`-serialized payloads.

use std::io::{Cursor, Read, Write};

use varint_rs::{VarintReader, VarintWriter};

use crate::binned::BinnedSfc;
use crate::error::{Result, SfcIndexError};
use crate::sfc::HilbertSfc;
use crate::strategy::{TierMetadata, TieredSfcIndexStrategy};

const MAGIC: [u8; 4] = *b"SFC1";
const FORMAT_VERSION: u8 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum WireKind {
    HilbertSfc = 1,
    TieredSfc = 2,
    TierMeta = 3,
    BinnedSfc = 4,
}

fn write_envelope(kind: WireKind, payload: &[u8]) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(payload.len() + 16);
    buf.write_all(&MAGIC)?;
    buf.write_u8(FORMAT_VERSION)?;
    buf.write_u8(kind as u8)?;
    buf.write_u32_varint(payload.len() as u32)?;
    buf.write_all(payload)?;
    Ok(buf)
}

fn read_envelope(bytes: &[u8], expected: WireKind) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(bytes);
    let mut magic = [0u8; 4];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| SfcIndexError::CorruptFormat {
            reason: "buffer shorter than envelope header".into(),
        })?;
    if magic != MAGIC {
        return Err(SfcIndexError::CorruptFormat {
            reason: "bad magic bytes".into(),
        });
    }
    let version = cursor.read_u8()?;
    if version != FORMAT_VERSION {
        return Err(SfcIndexError::CorruptFormat {
            reason: format!("unsupported format version {version}"),
        });
    }
    let kind = cursor.read_u8()?;
    if kind != expected as u8 {
        return Err(SfcIndexError::CorruptFormat {
            reason: format!("expected wire kind {}, found {kind}", expected as u8),
        });
    }
    let payload_len = cursor.read_u32_varint()? as usize;
    let mut payload = vec![0u8; payload_len];
    cursor
        .read_exact(&mut payload)
        .map_err(|_| SfcIndexError::CorruptFormat {
            reason: "payload shorter than declared length".into(),
        })?;
    Ok(payload)
}

pub fn encode_hilbert_sfc(sfc: &HilbertSfc) -> Result<Vec<u8>> {
    write_envelope(WireKind::HilbertSfc, &sfc.to_bytes()?)
}

pub fn decode_hilbert_sfc(bytes: &[u8]) -> Result<HilbertSfc> {
    HilbertSfc::from_bytes(&read_envelope(bytes, WireKind::HilbertSfc)?)
}

pub fn encode_binned_sfc(binned: &BinnedSfc) -> Result<Vec<u8>> {
    write_envelope(WireKind::BinnedSfc, &binned.to_bytes()?)
}

pub fn decode_binned_sfc(bytes: &[u8]) -> Result<BinnedSfc> {
    BinnedSfc::from_bytes(&read_envelope(bytes, WireKind::BinnedSfc)?)
}

pub fn encode_tiered_strategy(strategy: &TieredSfcIndexStrategy) -> Result<Vec<u8>> {
    write_envelope(WireKind::TieredSfc, &strategy.to_bytes()?)
}

pub fn decode_tiered_strategy(bytes: &[u8]) -> Result<TieredSfcIndexStrategy> {
    TieredSfcIndexStrategy::from_bytes(&read_envelope(bytes, WireKind::TieredSfc)?)
}

/// Encode per the persistent `tierMeta` format: `numTiers`, each
/// tier's count, then `(tierByte, sfcIndex)` pairs — `tier_bytes[i]` is the
/// wire byte for the strategy's tier `i`, the same mapping
/// [`crate::strategy::TieredSfcIndexStrategy`] carries, so metadata
/// persisted standalone (e.g. by the storage layer) still names its tiers
/// unambiguously.
pub fn encode_tier_metadata(meta: &TierMetadata, tier_bytes: &[u8]) -> Result<Vec<u8>> {
    if tier_bytes.len() != meta.num_tiers() {
        return Err(SfcIndexError::DimensionMismatch {
            expected: meta.num_tiers(),
            actual: tier_bytes.len(),
        });
    }
    let mut payload = Vec::new();
    payload.write_u32_varint(meta.num_tiers() as u32)?;
    for &count in &meta.counts {
        payload.write_u32_varint(u32::try_from(count).unwrap_or(u32::MAX))?;
    }
    for (sfc_index, &tier_byte) in tier_bytes.iter().enumerate() {
        payload.push(tier_byte);
        payload.push(sfc_index as u8);
    }
    write_envelope(WireKind::TierMeta, &payload)
}

/// Inverse of [`encode_tier_metadata`]: returns the recovered metadata
/// alongside the tier-byte mapping it was encoded with.
pub fn decode_tier_metadata(bytes: &[u8]) -> Result<(TierMetadata, Vec<u8>)> {
    let payload = read_envelope(bytes, WireKind::TierMeta)?;
    let mut cursor = Cursor::new(&payload);
    let num_tiers = cursor.read_u32_varint()? as usize;
    let mut counts = Vec::with_capacity(num_tiers);
    for _ in 0..num_tiers {
        counts.push(cursor.read_u32_varint()? as u64);
    }
    let mut tier_bytes = vec![0u8; num_tiers];
    for _ in 0..num_tiers {
        let mut pair = [0u8; 2];
        cursor.read_exact(&mut pair).map_err(|_| SfcIndexError::CorruptFormat {
            reason: "truncated tier mapping in tierMeta format".into(),
        })?;
        let tier_byte = pair[0];
        let sfc_index = pair[1] as usize;
        if sfc_index >= tier_bytes.len() {
            return Err(SfcIndexError::CorruptFormat {
                reason: format!("sfc index {sfc_index} out of range in tier mapping"),
            });
        }
        tier_bytes[sfc_index] = tier_byte;
    }
    Ok((TierMetadata { counts }, tier_bytes))
}

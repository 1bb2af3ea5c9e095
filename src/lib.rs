//! A tiered, multi-dimensional spatial/temporal index built on compact
//! Hilbert space-filling curves.
//!
//! Five layers, bottom to top:
//! - [`bytes`] — byte-string padding, truncation, and successor/predecessor
//!   arithmetic shared by the curve and strategy layers.
//! - [`dimension`] — named numeric axes, with bounded, periodic, and
//!   fixed-interval-binned variants.
//! - [`sfc`] — the Hilbert curve itself: encode, decode, and range
//!   decomposition.
//! - [`binned`] — a curve plus its dimensions' bin labels, composed into a
//!   single sortable byte key.
//! - [`strategy`] — an ordered stack of binned curves, coarsest to finest,
//!   selecting an insertion tier per entry and decomposing queries across
//!   every tier that might hold data.
//! - [`binary`] — the persistent wire format for all of the above.

pub mod binary;
pub mod binned;
pub mod bytes;
pub mod dimension;
pub mod error;
pub mod sfc;
pub mod strategy;

pub use binned::BinnedSfc;
pub use dimension::DimensionDefinition;
pub use error::{Result, SfcIndexError};
pub use sfc::{HilbertSfc, SfcBackend, SfcDimension, SfcIndex};
pub use strategy::{TierMetadata, TieredSfcIndexStrategy};

#[cfg(test)]
pub(crate) mod test_utils;

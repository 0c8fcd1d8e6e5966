//! Integer-hashed isolation window boundaries.
//!
//! All boundary identity decisions during scheme inference run on hashed
//! m/z values so that merging and deduplication are deterministic: a raw
//! `f64` comparison would split one detector boundary into near-duplicate
//! twins and corrupt the inferred cycle.
use std::fmt;

use super::helpers::{precursor_mz_high, precursor_mz_low};
use super::DemuxError;
use crate::spectrum::Precursor;

/// An m/z value hashed to a 64-bit integer at a fixed scale of 10^8,
/// giving a fuzzy equality window of ±5e-9 m/z. For example, m/z 500.49
/// hashes to 50049000000.
pub type MzHash = u64;

const MZ_HASH_SCALE: f64 = 1e8;

/// Hash a floating-point m/z value to an integer
#[inline]
pub fn hash_mz(mz: f64) -> MzHash {
    (mz * MZ_HASH_SCALE).round() as i64 as MzHash
}

/// Recover the floating-point m/z value a hash was made from, to within
/// the hashing precision
#[inline]
pub fn unhash_mz(hash: MzHash) -> f64 {
    hash as f64 / MZ_HASH_SCALE
}

/// An m/z interval with hashed boundaries, the unit of identity for all
/// design-matrix bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DemuxWindow {
    /// Start m/z of the window range
    pub mz_low: MzHash,
    /// End m/z of the window range
    pub mz_high: MzHash,
}

impl DemuxWindow {
    pub fn new(mz_low: MzHash, mz_high: MzHash) -> Self {
        Self { mz_low, mz_high }
    }

    /// Build a window from a precursor's isolation bounds
    pub fn from_precursor(p: &Precursor) -> Result<Self, DemuxError> {
        Ok(Self {
            mz_low: hash_mz(precursor_mz_low(p)?),
            mz_high: hash_mz(precursor_mz_high(p)?),
        })
    }

    /// The midpoint of the window on the hashed axis
    pub fn center(&self) -> MzHash {
        (self.mz_low as f64 + (self.mz_high - self.mz_low) as f64 / 2.0).round() as MzHash
    }

    /// Whether the mass range of `inner` is a subset of this window
    pub fn contains(&self, inner: &DemuxWindow) -> bool {
        inner.mz_low >= self.mz_low && inner.mz_high <= self.mz_high
    }

    /// Whether the center of `inner` falls within this window
    pub fn contains_center(&self, inner: &DemuxWindow) -> bool {
        let center = inner.center();
        center >= self.mz_low && center <= self.mz_high
    }
}

impl fmt::Display for DemuxWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.4}, {:.4}]",
            unhash_mz(self.mz_low),
            unhash_mz(self.mz_high)
        )
    }
}

/// A [`DemuxWindow`] that also preserves the full-precision boundaries it
/// was built from. Ordering and equality go through the hashed window.
#[derive(Debug, Clone, Copy)]
pub struct IsolationWindow {
    /// Full precision lower m/z bound
    pub low_mz: f64,
    /// Full precision upper m/z bound
    pub high_mz: f64,
    pub window: DemuxWindow,
}

impl IsolationWindow {
    pub fn new(low_mz: f64, high_mz: f64) -> Self {
        Self {
            low_mz,
            high_mz,
            window: DemuxWindow::new(hash_mz(low_mz), hash_mz(high_mz)),
        }
    }

    /// Build a window from a precursor's isolation bounds
    pub fn from_precursor(p: &Precursor) -> Result<Self, DemuxError> {
        Ok(Self::new(precursor_mz_low(p)?, precursor_mz_high(p)?))
    }

    /// The full-precision midpoint of the window
    pub fn center(&self) -> f64 {
        (self.low_mz + self.high_mz) / 2.0
    }

    /// The full-precision half-width of the window
    pub fn half_width(&self) -> f64 {
        (self.high_mz - self.low_mz) / 2.0
    }
}

impl PartialEq for IsolationWindow {
    fn eq(&self, other: &Self) -> bool {
        self.window == other.window
    }
}

impl Eq for IsolationWindow {}

impl PartialOrd for IsolationWindow {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IsolationWindow {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.window.cmp(&other.window)
    }
}

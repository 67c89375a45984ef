//! Shared identifier types for the StrataDB execution pipeline.
//!
//! The central type is [`RowId`], the 64-bit packed row identifier used
//! everywhere a row must be addressed across partition boundaries: reduce
//! tasks carry partition-local row ids, and the collector widens them into
//! `RowId`s when it emits them to the caller.

use std::fmt;

/// Number of low bits reserved for the partition-local row id.
///
/// A partition holds at most `2^44` rows (~17.6 trillion); the remaining
/// 20 bits address up to `2^20` partitions. The packing is fixed; changing
/// it would invalidate every row id ever handed to a caller.
pub const LOCAL_ROW_BITS: u32 = 44;

/// Mask isolating the partition-local row id of a packed [`RowId`].
pub const LOCAL_ROW_MASK: u64 = (1_u64 << LOCAL_ROW_BITS) - 1;

/// Maximum partition index representable in a [`RowId`].
pub const MAX_PARTITION_INDEX: u64 = (1_u64 << (64 - LOCAL_ROW_BITS)) - 1;

/// A 64-bit row identifier packing `(partition_index, local_row)`.
///
/// The packing is bijective over `partition_index <= MAX_PARTITION_INDEX`
/// and `local_row <= LOCAL_ROW_MASK`; `to_partition_index` and
/// `to_local_row` are its exact inverses.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct RowId(u64);

impl RowId {
    /// Pack a partition index and a partition-local row id.
    ///
    /// Returns `None` when either component is out of range.
    #[inline]
    #[must_use]
    pub const fn new(partition_index: u64, local_row: u64) -> Option<Self> {
        if partition_index > MAX_PARTITION_INDEX || local_row > LOCAL_ROW_MASK {
            None
        } else {
            Some(Self((partition_index << LOCAL_ROW_BITS) | local_row))
        }
    }

    /// Reinterpret a raw packed value as a row id.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw packed value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// The partition index component.
    #[inline]
    #[must_use]
    pub const fn to_partition_index(self) -> u64 {
        self.0 >> LOCAL_ROW_BITS
    }

    /// The partition-local row id component.
    #[inline]
    #[must_use]
    pub const fn to_local_row(self) -> u64 {
        self.0 & LOCAL_ROW_MASK
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.to_partition_index(), self.to_local_row())
    }
}

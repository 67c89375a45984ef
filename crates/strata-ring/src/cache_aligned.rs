//! Cache-line-aware padding wrapper.
//!
//! Sequence cursors sit in arrays read and written by different threads;
//! [`CacheAligned`] forces each onto its own cache line so a producer
//! hammering its claim cursor does not invalidate the line a consumer's
//! done cursor lives on.

/// Cache line size in bytes.
///
/// 64 bytes for x86-64 and AArch64. Over-aligning on platforms with
/// 128-byte lines wastes a little memory but never causes false sharing on
/// 64-byte platforms.
pub const CACHE_LINE_BYTES: usize = 64;

/// Wraps a value to ensure it starts on a cache-line boundary.
///
/// `#[repr(C, align(64))]` guarantees the struct starts at a 64-byte
/// aligned address and its size rounds up to a multiple of 64 bytes, so
/// adjacent elements in an array never share a line.
#[repr(C, align(64))]
pub struct CacheAligned<T> {
    value: T,
}

impl<T> CacheAligned<T> {
    /// Wrap `value` with cache-line alignment.
    #[inline]
    #[must_use]
    pub const fn new(value: T) -> Self {
        Self { value }
    }

    /// Unwrap, returning the inner value.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> T {
        self.value
    }
}

impl<T: Default> Default for CacheAligned<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> std::ops::Deref for CacheAligned<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T> std::ops::DerefMut for CacheAligned<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        &mut self.value
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for CacheAligned<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.value.fmt(f)
    }
}

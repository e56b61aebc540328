//! Fixed-size chunk arithmetic.

use std::ops::Range;

/// Split of an artifact of `size` bytes into `chunk_size` byte ranges.
///
/// The last chunk is shorter when `size` is not a multiple of `chunk_size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// A zero `chunk_size` is treated as one byte per chunk.
    #[must_use]
    pub const fn new(size: u64, chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 { 1 } else { chunk_size };
        Self { size, chunk_size }
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub const fn total_chunks(&self) -> u64 {
        self.size.div_ceil(self.chunk_size)
    }

    /// Byte range of chunk `index`.
    #[must_use]
    pub fn range(&self, index: u64) -> Range<u64> {
        let start = index.saturating_mul(self.chunk_size).min(self.size);
        let end = start.saturating_add(self.chunk_size).min(self.size);
        start..end
    }

    /// Fraction of the artifact sent once chunk `index` succeeded.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_after(&self, index: u64) -> f64 {
        let total = self.total_chunks();
        if total == 0 {
            return 1.0;
        }
        (index + 1).min(total) as f64 / total as f64
    }
}

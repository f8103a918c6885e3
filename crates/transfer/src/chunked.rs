use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

// ---------------------------------------------------------------------------
// ChunkPlan
// ---------------------------------------------------------------------------

/// Contiguous byte range `[offset, offset + len)` of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkRange {
    pub index: u32,
    pub offset: u64,
    pub len: u64,
}

impl ChunkRange {
    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.offset + self.len
    }

    /// Borrows this range out of the full payload.
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset as usize..self.end() as usize]
    }
}

/// Splits a payload of `total_size` bytes into `chunk_size` pieces.
///
/// Every chunk but the last is exactly `chunk_size` long; the ranges cover
/// the payload with no gaps or overlaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    total_size: u64,
    chunk_size: u64,
}

impl ChunkPlan {
    /// `chunk_size` must be non-zero; config validation guarantees it.
    pub fn new(total_size: u64, chunk_size: u64) -> Self {
        debug_assert!(chunk_size > 0);
        Self {
            total_size,
            chunk_size,
        }
    }

    /// Number of chunks, or `None` when it does not fit a `u32` chunk index.
    pub fn checked_chunk_count(&self) -> Option<u32> {
        u32::try_from(self.total_size.div_ceil(self.chunk_size)).ok()
    }

    /// Number of chunks, saturating at `u32::MAX`. Callers that send chunks
    /// check [`ChunkPlan::checked_chunk_count`] first.
    pub fn chunk_count(&self) -> u32 {
        self.checked_chunk_count().unwrap_or(u32::MAX)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Range of chunk `index`, or `None` past the end.
    pub fn range(&self, index: u32) -> Option<ChunkRange> {
        let offset = index as u64 * self.chunk_size;
        if offset >= self.total_size {
            return None;
        }
        Some(ChunkRange {
            index,
            offset,
            len: self.chunk_size.min(self.total_size - offset),
        })
    }

    /// All ranges in index order.
    pub fn ranges(&self) -> impl Iterator<Item = ChunkRange> + '_ {
        (0..self.chunk_count()).filter_map(move |i| self.range(i))
    }
}

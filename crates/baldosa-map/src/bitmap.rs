//! Availability bitmap codec.
//!
//! A chunk's bitmap is `BITMAP_BYTES` bytes. The bit for cell `(x, y)` sits at
//! index `ex + ey * CHUNK_SIZE`, where `(ex, ey)` is the cell's offset inside
//! its chunk (always non-negative, see [`Coords::offset_in_chunk`]). Bit `i`
//! is bit `i % 8` of byte `i / 8`, least significant first. A set bit means
//! the cell is owned.
//!
//! This is also the wire format: clients receive the raw bytes with no header.

use std::sync::Arc;

use baldosa_types::{ChunkOrigin, Coords, BITMAP_BYTES, CHUNK_SIZE};

/// Packed ownership bits for one chunk.
///
/// Immutable once built; clones share the same buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bitmap {
    origin: ChunkOrigin,
    bits: Arc<[u8]>,
}

impl Bitmap {
    pub fn origin(&self) -> ChunkOrigin {
        self.origin
    }

    /// Raw packed bytes, exactly `BITMAP_BYTES` long.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bits
    }

    /// Whether `coords` is marked owned. Cells outside this chunk are never owned.
    pub fn is_owned(&self, coords: Coords) -> bool {
        if !self.origin.contains(coords) {
            return false;
        }
        let index = bit_index(coords);
        self.bits[index / 8] & (1 << (index % 8)) != 0
    }

    /// Number of owned cells.
    pub fn owned_count(&self) -> u32 {
        self.bits.iter().map(|b| b.count_ones()).sum()
    }
}

/// Bit position of a cell inside its chunk's bitmap.
pub fn bit_index(coords: Coords) -> usize {
    let (ex, ey) = coords.offset_in_chunk();
    ex as usize + ey as usize * CHUNK_SIZE as usize
}

/// Pack a set of owned cells into the bitmap of the chunk at `origin`.
///
/// # Panics
///
/// Panics if any cell lies outside the chunk. Callers build the cell set
/// from a range query on the same chunk, so this is a contract violation,
/// not an input error.
pub fn encode<I>(origin: ChunkOrigin, owned: I) -> Bitmap
where
    I: IntoIterator<Item = Coords>,
{
    let mut bits = vec![0u8; BITMAP_BYTES];
    for coords in owned {
        assert!(
            origin.contains(coords),
            "cell {coords} is outside chunk {origin}"
        );
        let index = bit_index(coords);
        bits[index / 8] |= 1 << (index % 8);
    }
    Bitmap {
        origin,
        bits: bits.into(),
    }
}

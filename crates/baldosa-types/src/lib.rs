//! # baldosa-types
//!
//! Shared domain types used across the Baldosa workspace: grid coordinates,
//! chunk origins, tile records and their editable content, and user accounts.
//!
//! ## Coordinates
//!
//! The grid is unbounded in both directions. Every coordinate belongs to
//! exactly one chunk, resolved with **floor** division by [`CHUNK_SIZE`]:
//! `-1` belongs to the chunk at `-256`, not the one at `0`.

pub mod coords;
pub mod tile;
pub mod user;

pub use coords::{ChunkOrigin, Coords};
pub use tile::{ContentError, Tile, TileContent};
pub use user::User;

/// Side length of a chunk, in cells.
pub const CHUNK_SIZE: i32 = 256;

/// Number of cells in one chunk.
pub const CHUNK_CELLS: usize = (CHUNK_SIZE as usize) * (CHUNK_SIZE as usize);

/// Size of a packed availability bitmap for one chunk.
pub const BITMAP_BYTES: usize = CHUNK_CELLS / 8;

/// Price of an unowned tile, in coins.
pub const TILE_BASE_PRICE: u64 = 10;

/// Maximum length of a tile title or subtitle, in characters.
pub const MAX_TITLE_LEN: usize = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_size() {
        assert_eq!(BITMAP_BYTES, 8192);
        assert_eq!(CHUNK_CELLS, 65536);
    }
}

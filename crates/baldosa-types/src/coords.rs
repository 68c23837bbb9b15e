//! Grid coordinates and chunk alignment.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::CHUNK_SIZE;

/// A cell on the grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coords {
    pub x: i32,
    pub y: i32,
}

impl Coords {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The chunk this cell belongs to.
    pub fn chunk(self) -> ChunkOrigin {
        ChunkOrigin::containing(self.x, self.y)
    }

    /// Offset of this cell inside its chunk, both components in `0..CHUNK_SIZE`.
    pub fn offset_in_chunk(self) -> (u32, u32) {
        (
            self.x.rem_euclid(CHUNK_SIZE) as u32,
            self.y.rem_euclid(CHUNK_SIZE) as u32,
        )
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Top-left corner of a chunk. Both components are multiples of [`CHUNK_SIZE`].
///
/// The only way to build one is through [`ChunkOrigin::containing`], so the
/// alignment invariant holds for every value of this type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ChunkOrigin {
    x: i32,
    y: i32,
}

impl ChunkOrigin {
    /// Resolve the chunk containing `(x, y)` using floor division.
    pub fn containing(x: i32, y: i32) -> Self {
        Self {
            x: align_down(x),
            y: align_down(y),
        }
    }

    pub fn x(self) -> i32 {
        self.x
    }

    pub fn y(self) -> i32 {
        self.y
    }

    /// Exclusive upper bounds of the chunk on both axes.
    ///
    /// Widened to `i64` because the last chunk on the positive edge ends
    /// past `i32::MAX`.
    pub fn end(self) -> (i64, i64) {
        (
            i64::from(self.x) + i64::from(CHUNK_SIZE),
            i64::from(self.y) + i64::from(CHUNK_SIZE),
        )
    }

    /// Whether `coords` lies inside this chunk.
    pub fn contains(self, coords: Coords) -> bool {
        coords.chunk() == self
    }
}

impl fmt::Display for ChunkOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

fn align_down(v: i32) -> i32 {
    v.div_euclid(CHUNK_SIZE) * CHUNK_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_alignment() {
        let origin = ChunkOrigin::containing(300, 10);
        assert_eq!((origin.x(), origin.y()), (256, 0));
        assert_eq!(Coords::new(300, 10).offset_in_chunk(), (44, 10));
    }

    #[test]
    fn test_negative_alignment_uses_floor() {
        let origin = ChunkOrigin::containing(-1, -256);
        assert_eq!((origin.x(), origin.y()), (-256, -256));

        let origin = ChunkOrigin::containing(-257, -300);
        assert_eq!((origin.x(), origin.y()), (-512, -512));

        assert_eq!(Coords::new(-1, -1).offset_in_chunk(), (255, 255));
        assert_eq!(Coords::new(-256, -512).offset_in_chunk(), (0, 0));
    }

    #[test]
    fn test_origin_is_its_own_chunk() {
        for v in [-512, -256, 0, 256, 1024] {
            let origin = ChunkOrigin::containing(v, v);
            assert_eq!(ChunkOrigin::containing(origin.x(), origin.y()), origin);
        }
    }

    #[test]
    fn test_extreme_coordinates() {
        let low = ChunkOrigin::containing(i32::MIN, i32::MIN);
        assert_eq!(low.x(), i32::MIN);

        let high = ChunkOrigin::containing(i32::MAX, i32::MAX);
        assert_eq!(high.x(), i32::MAX - 255);
        assert_eq!(high.end().0, i64::from(i32::MAX) + 1);
    }

    #[test]
    fn test_contains() {
        let origin = ChunkOrigin::containing(0, 0);
        assert!(origin.contains(Coords::new(0, 0)));
        assert!(origin.contains(Coords::new(255, 255)));
        assert!(!origin.contains(Coords::new(256, 0)));
        assert!(!origin.contains(Coords::new(-1, 0)));
    }
}

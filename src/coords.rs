//! World ↔ chunk ↔ local coordinate conversions (C6).
//!
//! All three conversions are total and deterministic over signed integers,
//! using floored division / Euclidean remainder so negative world
//! coordinates behave the way a voxel grid that extends in every direction
//! needs them to (see the composition law documented on [`world_to_chunk`]).

/// A chunk's lattice coordinate, or a world-space block coordinate,
/// depending on context. Both are plain signed-integer 3-tuples.
pub type Coord = (i32, i32, i32);

/// The three axis extents of a chunk, in blocks.
pub type ChunkSize = (i32, i32, i32);

/// Map a world-space block coordinate to the chunk that contains it, using
/// floored division so coordinates left/below of the origin round toward
/// negative infinity rather than toward zero.
#[must_use]
pub fn world_to_chunk(w: Coord, size: ChunkSize) -> Coord {
    (
        w.0.div_euclid(size.0),
        w.1.div_euclid(size.1),
        w.2.div_euclid(size.2),
    )
}

/// Map a world-space block coordinate to its local coordinate within its
/// owning chunk. Always non-negative regardless of the sign of `w`.
#[must_use]
pub fn world_to_local(w: Coord, size: ChunkSize) -> Coord {
    (
        w.0.rem_euclid(size.0),
        w.1.rem_euclid(size.1),
        w.2.rem_euclid(size.2),
    )
}

/// Map a chunk lattice coordinate to the world-space coordinate of its
/// minimum corner.
#[must_use]
pub fn chunk_to_world(c: Coord, size: ChunkSize) -> Coord {
    (c.0 * size.0, c.1 * size.1, c.2 * size.2)
}

/// Decompose a world coordinate into its owning chunk and the local
/// coordinate within that chunk in one call; this is what the world's
/// mutation routing (C4) actually needs on every `set_block`/`get_block`.
#[must_use]
pub fn decompose(w: Coord, size: ChunkSize) -> (Coord, Coord) {
    (world_to_chunk(w, size), world_to_local(w, size))
}

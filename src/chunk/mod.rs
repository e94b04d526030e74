//! Chunk block storage and the chunk controller (C1, C3).
//!
//! `Chunk` owns a dense `(Cx, Cy, Cz)` block array, its external
//! renderer/collider handles, and the `is_modified`/`is_mesh_dirty` flags the
//! world and persistence layers key their decisions on. The canonical linear
//! index (`x + z*Cx + y*Cx*Cz`) is shared verbatim by `get`/`set`,
//! `serialize`/`deserialize`, and the mesher's mask construction — see
//! `rle.rs` for why that matters on deserialize.

pub mod mesh;
pub mod rle;

use crate::block::{blocks, BlockId};
use crate::coords::{ChunkSize, Coord};
use crate::error::{WorldError, WorldResult};
use crate::handles::{ColliderHandle, MeshData, RenderHandle};
use crate::stats::StreamingStats;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use mesh::BlockSource;

fn linear_index(local: Coord, size: ChunkSize) -> Option<usize> {
    let (x, y, z) = local;
    let (cx, cy, cz) = size;
    if x < 0 || y < 0 || z < 0 || x >= cx || y >= cy || z >= cz {
        return None;
    }
    Some((x + z * cx + y * cx * cz) as usize)
}

/// One resident chunk: its blocks, its dirty/modified flags, and the
/// external rendering/collision handles the host plugs in.
pub struct Chunk {
    pub position: Coord,
    pub size: ChunkSize,
    blocks: Vec<BlockId>,
    pub is_modified: bool,
    pub is_mesh_dirty: bool,
    renderer: Option<Box<dyn RenderHandle>>,
    collider: Option<Box<dyn ColliderHandle>>,
}

impl Chunk {
    /// A freshly created chunk: all air, unmodified, and mesh-dirty (so the
    /// first `generate_mesh` call always runs).
    #[must_use]
    pub fn new(position: Coord, size: ChunkSize) -> Self {
        let (cx, cy, cz) = size;
        let volume = (cx * cy * cz).max(0) as usize;
        Self {
            position,
            size,
            blocks: vec![blocks::AIR; volume],
            is_modified: false,
            is_mesh_dirty: true,
            renderer: None,
            collider: None,
        }
    }

    /// Read a block at a local coordinate. Out-of-range coordinates return
    /// air rather than erroring, since the mesher's mask construction reads
    /// across chunk boundaries and must not fail.
    #[must_use]
    pub fn get(&self, local: Coord) -> BlockId {
        linear_index(local, self.size)
            .map_or(blocks::AIR, |idx| self.blocks[idx])
    }

    /// Write a block at a local coordinate, bounds-checked. A write that
    /// does not change the stored id is a no-op: `is_modified` is left
    /// untouched. Returns whether the write actually changed a cell (an
    /// out-of-range write also returns `false`). Does not touch
    /// `is_mesh_dirty`; callers that need the mesh invalidated use
    /// `Chunk::set_block`.
    pub fn set(&mut self, local: Coord, id: BlockId) -> bool {
        let Some(idx) = linear_index(local, self.size) else {
            return false;
        };
        if self.blocks[idx] == id {
            return false;
        }
        self.blocks[idx] = id;
        self.is_modified = true;
        true
    }

    /// Replace the entire block array. Fails if `bytes.len()` does not equal
    /// the chunk volume; on success marks both flags dirty.
    pub fn bulk_replace(&mut self, bytes: Vec<BlockId>) -> WorldResult<()> {
        if bytes.len() != self.blocks.len() {
            return Err(WorldError::PayloadLengthMismatch {
                expected: self.blocks.len(),
                got: bytes.len(),
            });
        }
        self.blocks = bytes;
        self.is_modified = true;
        self.is_mesh_dirty = true;
        Ok(())
    }

    /// Delegates to `get`.
    #[must_use]
    pub fn get_block(&self, local: Coord) -> BlockId {
        self.get(local)
    }

    /// Delegates to `set`, additionally flagging the mesh dirty when the
    /// write actually changed a cell.
    pub fn set_block(&mut self, local: Coord, id: BlockId) {
        if self.set(local, id) {
            self.is_mesh_dirty = true;
        }
    }

    /// Flags the mesh dirty without touching block content. Used when a
    /// neighbor chunk's mutation uncovers/covers a face on this chunk's side
    /// of a shared boundary.
    pub fn mark_dirty(&mut self) {
        self.is_mesh_dirty = true;
    }

    /// Rebuild the mesh if dirty, swap it into the renderer handle (or clear
    /// the handle if the chunk produced no geometry), rebuild the collider
    /// from the same triangle soup when `generate_collision` is enabled, and
    /// clear `is_mesh_dirty`. Does not touch `is_modified`. No-ops if the
    /// chunk is not dirty.
    pub fn generate_mesh(
        &mut self,
        world: Option<&dyn BlockSource>,
        colors: &dyn crate::block::ColorProvider,
        generate_collision: bool,
        stats: &mut StreamingStats,
        acquire_renderer: impl FnOnce() -> Box<dyn RenderHandle>,
        acquire_collider: impl FnOnce() -> Box<dyn ColliderHandle>,
    ) {
        if !self.is_mesh_dirty {
            return;
        }

        let mesh_data: MeshData = mesh::build_mesh(self, world, colors);
        stats.record_mesh(self.position, mesh_data.quad_count());

        if mesh_data.is_empty() {
            if let Some(renderer) = self.renderer.as_mut() {
                renderer.clear();
            }
            if let Some(collider) = self.collider.as_mut() {
                collider.clear();
            }
        } else {
            let renderer = self.renderer.get_or_insert_with(acquire_renderer);
            renderer.update(&mesh_data);

            if generate_collision {
                let collider = self.collider.get_or_insert_with(acquire_collider);
                collider.update(&mesh_data.positions, &mesh_data.indices);
            }
        }

        self.is_mesh_dirty = false;
    }

    /// Header (position, size as two 3-tuples of LE i32) followed by the
    /// RLE-encoded block payload.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(24 + self.blocks.len() / 2);
        for component in [
            self.position.0,
            self.position.1,
            self.position.2,
            self.size.0,
            self.size.1,
            self.size.2,
        ] {
            out.write_i32::<LittleEndian>(component).expect("Vec writes never fail");
        }
        out.extend(rle::rle_encode(&self.blocks));
        out
    }

    /// Decode a serialized chunk. Validates the header's position and size
    /// against this chunk before touching any state: on mismatch, nothing is
    /// mutated and an error is returned. On success, replaces the block
    /// array, clears `is_modified`, and sets `is_mesh_dirty`.
    pub fn deserialize(&mut self, bytes: &[u8]) -> WorldResult<()> {
        if bytes.len() < 24 {
            return Err(WorldError::PayloadLengthMismatch {
                expected: 24,
                got: bytes.len(),
            });
        }
        let mut header = &bytes[0..24];
        let found = (
            (
                header.read_i32::<LittleEndian>()?,
                header.read_i32::<LittleEndian>()?,
                header.read_i32::<LittleEndian>()?,
            ),
            (
                header.read_i32::<LittleEndian>()?,
                header.read_i32::<LittleEndian>()?,
                header.read_i32::<LittleEndian>()?,
            ),
        );
        if found != (self.position, self.size) {
            tracing::warn!(
                expected = ?self.position,
                found = ?found.0,
                "chunk header mismatch on deserialize; leaving chunk untouched"
            );
            return Err(WorldError::HeaderMismatch {
                expected: self.position,
                found: found.0,
            });
        }

        match rle::rle_decode(&bytes[24..], self.blocks.len()) {
            Ok(decoded) => {
                self.blocks = decoded;
                self.is_modified = false;
                self.is_mesh_dirty = true;
                Ok(())
            }
            Err(err) => {
                tracing::error!(position = ?self.position, "{err}; zero-filling chunk");
                for b in &mut self.blocks {
                    *b = blocks::AIR;
                }
                self.is_modified = false;
                self.is_mesh_dirty = true;
                Err(err)
            }
        }
    }

    /// Release the renderer and collider handles and empty the block array.
    /// Idempotent: calling it on an already-cleaned chunk is a no-op.
    pub fn cleanup(&mut self) {
        self.renderer = None;
        self.collider = None;
        for b in &mut self.blocks {
            *b = blocks::AIR;
        }
    }
}

impl BlockSource for Chunk {
    fn get_block(&self, world_pos: Coord) -> BlockId {
        self.get(world_pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::WhiteColorProvider;
    use crate::handles::{ColliderHandle, RenderHandle};

    struct NullRender;
    impl RenderHandle for NullRender {
        fn update(&mut self, _mesh: &MeshData) {}
        fn clear(&mut self) {}
    }
    struct NullCollider;
    impl ColliderHandle for NullCollider {
        fn update(&mut self, _positions: &[[f32; 3]], _indices: &[u32]) {}
        fn clear(&mut self) {}
    }

    #[test]
    fn fresh_chunk_is_all_air_and_mesh_dirty() {
        let chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        assert_eq!(chunk.get((0, 0, 0)), blocks::AIR);
        assert!(!chunk.is_modified);
        assert!(chunk.is_mesh_dirty);
    }

    #[test]
    fn set_same_id_is_a_no_op() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        chunk.is_mesh_dirty = false;
        chunk.set_block((0, 0, 0), blocks::AIR);
        assert!(!chunk.is_modified);
        assert!(!chunk.is_mesh_dirty);
    }

    #[test]
    fn set_block_marks_modified_and_dirty() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        chunk.is_mesh_dirty = false;
        chunk.set_block((1, 1, 1), 5);
        assert!(chunk.is_modified);
        assert!(chunk.is_mesh_dirty);
        assert_eq!(chunk.get((1, 1, 1)), 5);
    }

    #[test]
    fn out_of_range_get_and_set_are_safe() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        assert_eq!(chunk.get((10, 0, 0)), blocks::AIR);
        chunk.set((10, 0, 0), 9);
        assert!(!chunk.is_modified);
    }

    #[test]
    fn bulk_replace_rejects_wrong_length() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        let err = chunk.bulk_replace(vec![1; 10]).unwrap_err();
        assert!(matches!(err, WorldError::PayloadLengthMismatch { .. }));
    }

    #[test]
    fn serialize_deserialize_round_trip() {
        let mut chunk = Chunk::new((2, 0, -3), (4, 4, 4));
        chunk.set_block((0, 0, 0), 7);
        chunk.set_block((3, 3, 3), 2);
        let bytes = chunk.serialize();

        let mut target = Chunk::new((2, 0, -3), (4, 4, 4));
        target.deserialize(&bytes).unwrap();
        assert_eq!(target.get((0, 0, 0)), 7);
        assert_eq!(target.get((3, 3, 3)), 2);
        assert!(!target.is_modified);
        assert!(target.is_mesh_dirty);
    }

    #[test]
    fn deserialize_rejects_header_mismatch_without_mutating() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        chunk.set_block((0, 0, 0), 7);
        let bytes = chunk.serialize();

        let mut target = Chunk::new((1, 0, 0), (4, 4, 4));
        target.set_block((0, 0, 0), 3);
        let err = target.deserialize(&bytes).unwrap_err();
        assert!(matches!(err, WorldError::HeaderMismatch { .. }));
        assert_eq!(target.get((0, 0, 0)), 3);
    }

    #[test]
    fn deserialize_zero_fills_on_payload_length_mismatch() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        chunk.set_block((0, 0, 0), 7);
        let mut bytes = chunk.serialize();
        bytes.truncate(bytes.len() - 1);

        let mut target = Chunk::new((0, 0, 0), (4, 4, 4));
        target.set_block((1, 0, 0), 9);
        let err = target.deserialize(&bytes).unwrap_err();
        assert!(matches!(err, WorldError::PayloadLengthMismatch { .. }));
        assert_eq!(target.get((1, 0, 0)), blocks::AIR);
        assert!(!target.is_modified);
    }

    #[test]
    fn cleanup_empties_blocks_and_releases_handles() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        chunk.set_block((0, 0, 0), 4);
        chunk.renderer = Some(Box::new(NullRender));
        chunk.collider = Some(Box::new(NullCollider));
        chunk.cleanup();
        assert_eq!(chunk.get((0, 0, 0)), blocks::AIR);
        assert!(chunk.renderer.is_none());
        assert!(chunk.collider.is_none());
    }

    #[test]
    fn generate_mesh_is_noop_when_not_dirty() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        chunk.is_mesh_dirty = false;
        let mut stats = StreamingStats::new();
        chunk.generate_mesh(
            None,
            &WhiteColorProvider,
            false,
            &mut stats,
            || Box::new(NullRender),
            || Box::new(NullCollider),
        );
        assert_eq!(stats.total_quads(), 0);
    }

    #[test]
    fn generate_mesh_acquires_renderer_and_clears_dirty() {
        let mut chunk = Chunk::new((0, 0, 0), (4, 4, 4));
        chunk.set_block((0, 0, 0), 1);
        let mut stats = StreamingStats::new();
        chunk.generate_mesh(
            None,
            &WhiteColorProvider,
            true,
            &mut stats,
            || Box::new(NullRender),
            || Box::new(NullCollider),
        );
        assert!(!chunk.is_mesh_dirty);
        assert!(chunk.renderer.is_some());
        assert!(chunk.collider.is_some());
        assert_eq!(stats.total_quads(), 6);
    }
}

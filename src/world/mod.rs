//! The streaming world controller (C4): owns every resident chunk, the
//! generation queue, and the viewer-relative residency window described in
//! §4.5. Grounded in the reference engine's `World` resource and its
//! `chunk::streaming` module, generalized from a fixed `(chunk_x, chunk_z)`
//! key and hardcoded render distance to a full 3D chunk lattice driven by
//! `WorldConfig`.

use crate::block::{blocks, BlockId, ColorProvider};
use crate::chunk::mesh::BlockSource;
use crate::chunk::Chunk;
use crate::config::WorldConfig;
use crate::coords::{decompose, Coord};
use crate::error::WorldResult;
use crate::events::{EventSink, WorldEvent};
use crate::handles::{ColliderHandle, RenderHandle};
use crate::persistence;
use crate::stats::StreamingStats;
use bevy_ecs::prelude::Resource;
use std::collections::{HashMap, VecDeque};

/// Abstracts acquiring fresh renderer/collider handles so `World` does not
/// depend on a concrete rendering backend. The host supplies one
/// implementation tying these back into its own scene graph.
pub trait HandleFactory {
    fn render_handle(&self) -> Box<dyn RenderHandle>;
    fn collider_handle(&self) -> Box<dyn ColliderHandle>;
}

/// All resident chunks, the generation queue, and the streaming/persistence
/// bookkeeping needed to keep them in sync with a moving viewer. Derives
/// `Resource` so a host running a Bevy `App` can insert it directly, as the
/// reference engine's own `World` does.
#[derive(Resource)]
pub struct World {
    chunks: HashMap<Coord, Chunk>,
    generation_queue: VecDeque<Coord>,
    viewer_chunk: Coord,
    pub config: WorldConfig,
    pub events: EventSink,
    pub stats: StreamingStats,
}

impl World {
    #[must_use]
    pub fn new(config: WorldConfig) -> Self {
        Self {
            chunks: HashMap::new(),
            generation_queue: VecDeque::new(),
            viewer_chunk: (0, 0, 0),
            config,
            events: EventSink::new(),
            stats: StreamingStats::new(),
        }
    }

    #[must_use]
    pub fn is_resident(&self, position: Coord) -> bool {
        self.chunks.contains_key(&position)
    }

    #[must_use]
    pub fn resident_count(&self) -> usize {
        self.chunks.len()
    }

    fn in_range(&self, position: Coord, viewer: Coord) -> bool {
        let dx = f64::from(position.0 - viewer.0);
        let dz = f64::from(position.2 - viewer.2);
        let dy = (position.1 - viewer.1).abs();
        dx.hypot(dz) <= f64::from(self.config.render_distance_xz)
            && dy <= self.config.render_distance_y
    }

    /// Read a block at a world coordinate. Returns air if the owning chunk
    /// is not resident.
    #[must_use]
    pub fn get_block(&self, world: Coord) -> BlockId {
        let size = self.config.chunk_size();
        let (chunk_pos, local) = decompose(world, size);
        self.chunks
            .get(&chunk_pos)
            .map_or(blocks::AIR, |c| c.get(local))
    }

    /// Write a block at a world coordinate (§4.5 mutation routing).
    ///
    /// Auto-creates the owning chunk if it is absent but in range; returns
    /// without side effects if absent and out of range. A write that does
    /// not change the cell is a no-op. On a real write, the chunk is marked
    /// dirty, any neighbor chunk(s) sharing the mutated boundary cell are
    /// marked dirty and synchronously re-meshed, and a `BlockModified`
    /// event is emitted.
    pub fn set_block(
        &mut self,
        world: Coord,
        id: BlockId,
        handles: &dyn HandleFactory,
        colors: &dyn ColorProvider,
    ) {
        let size = self.config.chunk_size();
        let (chunk_pos, local) = decompose(world, size);

        if !self.chunks.contains_key(&chunk_pos) {
            if !self.in_range(chunk_pos, self.viewer_chunk) {
                return;
            }
            self.spawn_chunk(chunk_pos, size, handles, colors);
        }

        let changed = {
            let chunk = self.chunks.get_mut(&chunk_pos).expect("just inserted or present");
            let before = chunk.get(local);
            if before == id {
                false
            } else {
                chunk.set_block(local, id);
                true
            }
        };

        if !changed {
            return;
        }

        let boundary_neighbors = boundary_neighbor_chunks(chunk_pos, local, size);
        for &neighbor_pos in &boundary_neighbors {
            if let Some(neighbor) = self.chunks.get_mut(&neighbor_pos) {
                neighbor.mark_dirty();
            }
        }
        self.regenerate_one(chunk_pos, handles, colors);
        for neighbor_pos in boundary_neighbors {
            self.regenerate_one(neighbor_pos, handles, colors);
        }

        self.events.push(WorldEvent::BlockModified(world, id));
    }

    /// Apply many mutations, coalescing dirty-marking: at most one
    /// `mark_dirty` per touched chunk, and boundary-neighbor invalidation
    /// happens once per source chunk after the whole batch lands. Neighbor
    /// invalidation here never forces synchronous regeneration.
    pub fn bulk_set(
        &mut self,
        mutations: impl IntoIterator<Item = (Coord, BlockId)>,
        handles: &dyn HandleFactory,
        colors: &dyn ColorProvider,
    ) {
        let size = self.config.chunk_size();
        let mut touched_chunks: std::collections::HashSet<Coord> = std::collections::HashSet::new();
        let mut boundary_chunks: std::collections::HashSet<Coord> = std::collections::HashSet::new();

        for (world, id) in mutations {
            let (chunk_pos, local) = decompose(world, size);
            if !self.chunks.contains_key(&chunk_pos) {
                if !self.in_range(chunk_pos, self.viewer_chunk) {
                    continue;
                }
                self.spawn_chunk(chunk_pos, size, handles, colors);
            }

            let chunk = self.chunks.get_mut(&chunk_pos).expect("just inserted or present");
            let before = chunk.get(local);
            if before == id {
                continue;
            }
            chunk.set_block(local, id);
            touched_chunks.insert(chunk_pos);
            for neighbor in boundary_neighbor_chunks(chunk_pos, local, size) {
                boundary_chunks.insert(neighbor);
            }
            self.events.push(WorldEvent::BlockModified(world, id));
        }

        for chunk_pos in touched_chunks {
            if let Some(chunk) = self.chunks.get_mut(&chunk_pos) {
                chunk.mark_dirty();
            }
        }
        for chunk_pos in boundary_chunks {
            if let Some(chunk) = self.chunks.get_mut(&chunk_pos) {
                chunk.mark_dirty();
            }
        }
    }

    /// Insert a brand-new chunk at `position` and consult persistence for it
    /// before it ever enters the generation queue (§3 Lifecycle, §4.5 "Load
    /// path"). On a hit, `load_from_disk` decodes the saved bytes and meshes
    /// synchronously, emitting `ChunkLoaded`/`ChunkMeshGenerated` itself. On
    /// a miss (including a filesystem error, logged and treated as a miss),
    /// the chunk stays all-air and is enqueued for later generation.
    fn spawn_chunk(
        &mut self,
        position: Coord,
        size: (i32, i32, i32),
        handles: &dyn HandleFactory,
        colors: &dyn ColorProvider,
    ) {
        self.chunks.insert(position, Chunk::new(position, size));
        match self.load_from_disk(position, handles, colors) {
            Ok(true) => {}
            Ok(false) => self.generation_queue.push_back(position),
            Err(err) => {
                tracing::error!(?position, "failed to load chunk from disk: {err}; enqueuing as a miss");
                self.generation_queue.push_back(position);
            }
        }
    }

    fn regenerate_one(&mut self, position: Coord, handles: &dyn HandleFactory, colors: &dyn ColorProvider) {
        if !self.chunks.contains_key(&position) {
            return;
        }
        self.regenerate_with_accessor(position, handles, colors);
        self.events.push(WorldEvent::ChunkMeshGenerated(position));
    }

    fn regenerate_with_accessor(
        &mut self,
        position: Coord,
        handles: &dyn HandleFactory,
        colors: &dyn ColorProvider,
    ) {
        let Some(mut chunk) = self.chunks.remove(&position) else {
            return;
        };
        let generate_collision = self.config.generate_collision;
        let accessor = ChunksAccessor {
            chunks: &self.chunks,
            size: self.config.chunk_size(),
        };
        chunk.generate_mesh(
            Some(&accessor),
            colors,
            generate_collision,
            &mut self.stats,
            || handles.render_handle(),
            || handles.collider_handle(),
        );
        self.chunks.insert(position, chunk);
    }

    /// Update the viewer's chunk coordinate from a world-space position,
    /// triggering a streaming pass if it changed. Returns the number of
    /// chunks newly entering residency (loaded from disk synchronously, or
    /// queued for generation on a miss).
    ///
    /// The viewer position source (§6) is an external collaborator that
    /// reports a floating-point world-space position each tick; it is
    /// floored to an integer block coordinate before the rest of the
    /// pipeline, which is integer-only throughout (C6), ever sees it.
    pub fn update_viewer_position(
        &mut self,
        world_pos: (f64, f64, f64),
        handles: &dyn HandleFactory,
        colors: &dyn ColorProvider,
    ) -> usize {
        let block_pos = (
            world_pos.0.floor() as i32,
            world_pos.1.floor() as i32,
            world_pos.2.floor() as i32,
        );
        let size = self.config.chunk_size();
        let viewer_chunk = crate::coords::world_to_chunk(block_pos, size);
        if viewer_chunk == self.viewer_chunk {
            return 0;
        }
        self.viewer_chunk = viewer_chunk;
        self.stream(viewer_chunk, handles, colors)
    }

    fn stream(&mut self, viewer: Coord, handles: &dyn HandleFactory, colors: &dyn ColorProvider) -> usize {
        let size = self.config.chunk_size();
        let rxz = self.config.render_distance_xz;
        let ry = self.config.render_distance_y;

        let mut to_load = Vec::new();
        for dx in -rxz..=rxz {
            for dz in -rxz..=rxz {
                if f64::from(dx).hypot(f64::from(dz)) > f64::from(rxz) {
                    continue;
                }
                for dy in -ry..=ry {
                    let pos = (viewer.0 + dx, viewer.1 + dy, viewer.2 + dz);
                    if !self.chunks.contains_key(&pos) {
                        to_load.push(pos);
                    }
                }
            }
        }
        to_load.sort_by(|a, b| {
            let da = distance_sq(*a, viewer);
            let db = distance_sq(*b, viewer);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });

        let to_unload: Vec<Coord> = self
            .chunks
            .keys()
            .copied()
            .filter(|c| !self.in_range(*c, viewer))
            .collect();

        for position in &to_unload {
            self.unload(*position, size);
        }
        for position in &to_load {
            self.spawn_chunk(*position, size, handles, colors);
        }

        self.stats.observe_queue_depth(self.generation_queue.len());
        self.stats.streaming_passes += 1;
        to_load.len()
    }

    fn unload(&mut self, position: Coord, _size: (i32, i32, i32)) {
        let Some(mut chunk) = self.chunks.remove(&position) else {
            return;
        };
        if self.config.auto_save_chunks && chunk.is_modified {
            match persistence::save_chunk(&self.config.save_directory, &chunk, self.config.compress_chunks) {
                Ok(()) => self.events.push(WorldEvent::ChunkSaved(position)),
                Err(err) => {
                    tracing::error!(?position, "failed to save chunk on unload: {err}");
                    chunk.is_modified = true;
                }
            }
        }
        chunk.cleanup();
        self.stats.remove_chunk(position);
        self.stats.chunks_unloaded += 1;
        self.events.push(WorldEvent::ChunkUnloaded(position));
    }

    /// Load `position` from persistence if resident (used by the load path
    /// after a chunk has been freshly inserted). On a hit, synchronously
    /// meshes the chunk and emits `ChunkLoaded`; on a miss, leaves the
    /// chunk queued for later generation.
    pub fn load_from_disk(
        &mut self,
        position: Coord,
        handles: &dyn HandleFactory,
        colors: &dyn ColorProvider,
    ) -> WorldResult<bool> {
        let Some(chunk) = self.chunks.get_mut(&position) else {
            return Ok(false);
        };
        let hit = persistence::load_chunk(&self.config.save_directory, chunk, self.config.compress_chunks)?;
        if hit {
            self.regenerate_with_accessor(position, handles, colors);
            self.stats.chunks_loaded += 1;
            self.events.push(WorldEvent::ChunkLoaded(position));
            self.events.push(WorldEvent::ChunkMeshGenerated(position));
        }
        Ok(hit)
    }

    /// Drain up to `cap` positions from the generation queue (0 = unbounded)
    /// and mesh each still-resident chunk. Positions whose chunk was
    /// unloaded between enqueue and drain are silently discarded.
    pub fn drain_generation_queue(&mut self, cap: usize, handles: &dyn HandleFactory, colors: &dyn ColorProvider) {
        let limit = if cap == 0 { self.generation_queue.len() } else { cap };
        for _ in 0..limit {
            let Some(position) = self.generation_queue.pop_front() else {
                break;
            };
            if !self.chunks.contains_key(&position) {
                continue;
            }
            self.regenerate_with_accessor(position, handles, colors);
            self.stats.chunks_loaded += 1;
            self.events.push(WorldEvent::ChunkLoaded(position));
            self.events.push(WorldEvent::ChunkMeshGenerated(position));
        }
    }

    /// Drain the generation queue and unload every resident chunk
    /// (optionally saving first), synchronously. The only way to cancel
    /// pending generation.
    pub fn clear_world(&mut self) {
        self.generation_queue.clear();
        let size = self.config.chunk_size();
        let positions: Vec<Coord> = self.chunks.keys().copied().collect();
        for position in positions {
            self.unload(position, size);
        }
    }

    #[must_use]
    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        self.events.drain()
    }
}

/// The faces of `local` that lie on a chunk boundary, mapped to the
/// neighboring chunk position sharing that face. A corner position can
/// surface up to three neighbors.
fn boundary_neighbor_chunks(chunk_pos: Coord, local: Coord, size: (i32, i32, i32)) -> Vec<Coord> {
    let mut neighbors = Vec::with_capacity(3);
    if local.0 == 0 {
        neighbors.push((chunk_pos.0 - 1, chunk_pos.1, chunk_pos.2));
    } else if local.0 == size.0 - 1 {
        neighbors.push((chunk_pos.0 + 1, chunk_pos.1, chunk_pos.2));
    }
    if local.1 == 0 {
        neighbors.push((chunk_pos.0, chunk_pos.1 - 1, chunk_pos.2));
    } else if local.1 == size.1 - 1 {
        neighbors.push((chunk_pos.0, chunk_pos.1 + 1, chunk_pos.2));
    }
    if local.2 == 0 {
        neighbors.push((chunk_pos.0, chunk_pos.1, chunk_pos.2 - 1));
    } else if local.2 == size.2 - 1 {
        neighbors.push((chunk_pos.0, chunk_pos.1, chunk_pos.2 + 1));
    }
    neighbors
}

fn distance_sq(a: Coord, b: Coord) -> f64 {
    let dx = f64::from(a.0 - b.0);
    let dy = f64::from(a.1 - b.1);
    let dz = f64::from(a.2 - b.2);
    dx * dx + dy * dy + dz * dz
}

/// Read-through accessor over resident chunks, handed to the mesher so
/// cross-chunk faces can be culled against real neighbor data. Borrows only
/// the chunk table (not all of `World`), so the caller can hold a disjoint
/// `&mut self.stats` borrow alongside it.
struct ChunksAccessor<'a> {
    chunks: &'a HashMap<Coord, Chunk>,
    size: (i32, i32, i32),
}

impl BlockSource for ChunksAccessor<'_> {
    fn get_block(&self, world_pos: Coord) -> BlockId {
        let (chunk_pos, local) = decompose(world_pos, self.size);
        self.chunks
            .get(&chunk_pos)
            .map_or(blocks::AIR, |c| c.get(local))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::WhiteColorProvider;
    use crate::handles::MeshData;

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
    struct NullFactory;
    impl HandleFactory for NullFactory {
        fn render_handle(&self) -> Box<dyn RenderHandle> {
            Box::new(NullRender)
        }
        fn collider_handle(&self) -> Box<dyn ColliderHandle> {
            Box::new(NullCollider)
        }
    }

    fn small_config() -> WorldConfig {
        let mut config = WorldConfig {
            chunk_size_xz: 8,
            chunk_size_y: 8,
            render_distance_xz: 2,
            render_distance_y: 1,
            ..WorldConfig::default()
        };
        config.clamp_to_valid_ranges();
        config
    }

    #[test]
    fn set_block_auto_creates_in_range_chunk() {
        let mut world = World::new(small_config());
        world.set_block((0, 0, 0), 1, &NullFactory, &WhiteColorProvider);
        assert!(world.is_resident((0, 0, 0)));
        assert_eq!(world.get_block((0, 0, 0)), 1);
    }

    #[test]
    fn set_block_out_of_range_is_a_noop() {
        let mut world = World::new(small_config());
        world.set_block((10_000, 0, 0), 1, &NullFactory, &WhiteColorProvider);
        assert!(!world.is_resident((1250, 0, 0)));
        assert_eq!(world.get_block((10_000, 0, 0)), blocks::AIR);
    }

    #[test]
    fn idempotent_set_emits_no_event() {
        let mut world = World::new(small_config());
        world.set_block((0, 0, 0), 1, &NullFactory, &WhiteColorProvider);
        world.drain_events();
        world.set_block((0, 0, 0), 1, &NullFactory, &WhiteColorProvider);
        assert!(world.drain_events().is_empty());
    }

    #[test]
    fn boundary_write_marks_neighbor_dirty() {
        let mut world = World::new(small_config());
        world.set_block((7, 0, 0), 1, &NullFactory, &WhiteColorProvider);
        let neighbor_pos = (1, 0, 0);
        world.chunks.insert(neighbor_pos, Chunk::new(neighbor_pos, world.config.chunk_size()));
        world.set_block((8, 0, 0), 1, &NullFactory, &WhiteColorProvider);
        assert!(!world.chunks.get(&neighbor_pos).unwrap().is_mesh_dirty);
    }

    #[test]
    fn streaming_pass_loads_nearby_and_unloads_distant() {
        let mut world = World::new(small_config());
        world.update_viewer_position((0.0, 0.0, 0.0), &NullFactory, &WhiteColorProvider);
        assert!(world.resident_count() > 0);
        assert!(world.is_resident((0, 0, 0)));

        let far: Coord = (0, 0, 10_000);
        world.update_viewer_position(
            (f64::from(far.0), f64::from(far.1), f64::from(far.2)),
            &NullFactory,
            &WhiteColorProvider,
        );
        let far_chunk = crate::coords::world_to_chunk(far, world.config.chunk_size());
        assert!(world.is_resident(far_chunk));
        assert!(!world.is_resident((0, 0, 0)));
    }

    #[test]
    fn clear_world_removes_everything() {
        let mut world = World::new(small_config());
        world.update_viewer_position((0.0, 0.0, 0.0), &NullFactory, &WhiteColorProvider);
        assert!(world.resident_count() > 0);
        world.clear_world();
        assert_eq!(world.resident_count(), 0);
    }

    #[test]
    fn bulk_set_coalesces_dirty_marking() {
        let mut world = World::new(small_config());
        world.bulk_set(
            [((0, 0, 0), 1), ((1, 0, 0), 2), ((2, 0, 0), 3)],
            &NullFactory,
            &WhiteColorProvider,
        );
        assert_eq!(world.get_block((0, 0, 0)), 1);
        assert_eq!(world.get_block((1, 0, 0)), 2);
        assert_eq!(world.get_block((2, 0, 0)), 3);
    }

    #[test]
    fn streaming_load_hit_restores_saved_blocks_without_generation_queue() {
        let dir = tempfile::tempdir().unwrap();
        let dir_str = dir.path().to_str().unwrap().to_string();
        let mut config = small_config();
        config.save_directory = dir_str;
        config.auto_save_chunks = true;

        let mut world = World::new(config);
        world.update_viewer_position((0.0, 0.0, 0.0), &NullFactory, &WhiteColorProvider);
        world.set_block((2, 2, 2), 7, &NullFactory, &WhiteColorProvider);
        world.drain_events();

        let far = (0.0, 0.0, 10_000.0);
        world.update_viewer_position(far, &NullFactory, &WhiteColorProvider);
        assert!(!world.is_resident((0, 0, 0)));

        world.update_viewer_position((0.0, 0.0, 0.0), &NullFactory, &WhiteColorProvider);
        assert!(world.is_resident((0, 0, 0)));
        assert_eq!(world.get_block((2, 2, 2)), 7);
        assert!(world
            .drain_events()
            .iter()
            .any(|e| matches!(e, WorldEvent::ChunkLoaded(_))));
    }
}

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use voxelstream::block::WhiteColorProvider;
use voxelstream::chunk::mesh::build_mesh;
use voxelstream::chunk::Chunk;
use voxelstream::config::WorldConfig;
use voxelstream::handles::{ColliderHandle, MeshData, RenderHandle};
use voxelstream::world::{HandleFactory, World};

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

fn solid_chunk(size: (i32, i32, i32)) -> Chunk {
    let mut chunk = Chunk::new((0, 0, 0), size);
    for x in 0..size.0 {
        for y in 0..size.1 {
            for z in 0..size.2 {
                chunk.set((x, y, z), 1);
            }
        }
    }
    chunk
}

fn checker_chunk(size: (i32, i32, i32)) -> Chunk {
    let mut chunk = Chunk::new((0, 0, 0), size);
    for x in 0..size.0 {
        for z in 0..size.2 {
            if (x + z) % 2 == 0 {
                for y in 0..(size.1 / 2) {
                    chunk.set((x, y, z), 1);
                }
            }
        }
    }
    chunk
}

/// A fully solid chunk: every face between neighbors is culled, so the
/// mesher does maximal work building masks but emits only six quads.
fn bench_mesh_solid(c: &mut Criterion) {
    let chunk = solid_chunk((32, 32, 32));
    c.bench_function("mesh_solid_32_cubed", |b| {
        b.iter(|| {
            black_box(build_mesh(&chunk, None, &WhiteColorProvider));
        });
    });
}

/// A checkerboard pattern maximizes exposed-face count and defeats most
/// horizontal run merging, exercising the worst case for quad count.
fn bench_mesh_checker(c: &mut Criterion) {
    let chunk = checker_chunk((32, 32, 32));
    c.bench_function("mesh_checker_32_cubed", |b| {
        b.iter(|| {
            black_box(build_mesh(&chunk, None, &WhiteColorProvider));
        });
    });
}

fn bench_mesh_empty(c: &mut Criterion) {
    let chunk = Chunk::new((0, 0, 0), (32, 32, 32));
    c.bench_function("mesh_empty_32_cubed", |b| {
        b.iter(|| {
            black_box(build_mesh(&chunk, None, &WhiteColorProvider));
        });
    });
}

/// Simulates startup streaming: repeatedly moving the viewer far enough to
/// trigger a fresh load/unload pass over a render-distance window.
fn bench_streaming_pass(c: &mut Criterion) {
    let mut config = WorldConfig {
        chunk_size_xz: 16,
        chunk_size_y: 16,
        render_distance_xz: 8,
        render_distance_y: 2,
        ..WorldConfig::default()
    };
    config.clamp_to_valid_ranges();
    let chunk_size_xz = config.chunk_size_xz;
    let handles = NullFactory;
    let colors = WhiteColorProvider;

    c.bench_function("streaming_pass_radius_8", |b| {
        b.iter(|| {
            let mut world = World::new(config.clone());
            world.update_viewer_position((0.0, 0.0, 0.0), &handles, &colors);
            world.update_viewer_position((f64::from(chunk_size_xz * 20), 0.0, 0.0), &handles, &colors);
            black_box(world.resident_count());
        });
    });
}

fn bench_generation_queue_drain(c: &mut Criterion) {
    let mut config = WorldConfig {
        chunk_size_xz: 16,
        chunk_size_y: 16,
        render_distance_xz: 6,
        render_distance_y: 2,
        ..WorldConfig::default()
    };
    config.clamp_to_valid_ranges();
    let handles = NullFactory;
    let colors = WhiteColorProvider;

    c.bench_function("generation_queue_drain_radius_6", |b| {
        b.iter(|| {
            let mut world = World::new(config.clone());
            world.update_viewer_position((0.0, 0.0, 0.0), &handles, &colors);
            world.drain_generation_queue(0, &handles, &colors);
            black_box(world.stats.total_quads());
        });
    });
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(50);
    targets =
        bench_mesh_empty,
        bench_mesh_solid,
        bench_mesh_checker,
        bench_streaming_pass,
        bench_generation_queue_drain,
}
criterion_main!(benches);

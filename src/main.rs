//! Headless demo driving the streaming world for a fixed number of ticks.
//! Renderer and collider handles are the reference engine's responsibility
//! (§1 of the scoping notes); here they're stubbed with no-ops so the loop
//! exercises exactly the core's streaming, meshing, and persistence paths.

use voxelstream::block::{BlockId, ColorProvider, Rgba};
use voxelstream::config::{self, WorldConfig};
use voxelstream::handles::{ColliderHandle, MeshData, RenderHandle};
use voxelstream::world::{HandleFactory, World};

const TICKS: u32 = 64;
const CONFIG_DIR: &str = "data/config";

struct NullRenderHandle;
impl RenderHandle for NullRenderHandle {
    fn update(&mut self, _mesh: &MeshData) {}
    fn clear(&mut self) {}
}

struct NullColliderHandle;
impl ColliderHandle for NullColliderHandle {
    fn update(&mut self, _positions: &[[f32; 3]], _indices: &[u32]) {}
    fn clear(&mut self) {}
}

struct NullHandleFactory;
impl HandleFactory for NullHandleFactory {
    fn render_handle(&self) -> Box<dyn RenderHandle> {
        Box::new(NullRenderHandle)
    }
    fn collider_handle(&self) -> Box<dyn ColliderHandle> {
        Box::new(NullColliderHandle)
    }
}

struct GrayscaleColors;
impl ColorProvider for GrayscaleColors {
    fn color_of(&self, id: BlockId) -> Rgba {
        let shade = f32::from(id) / 255.0;
        [shade, shade, shade, 1.0]
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let config = config::load_from_dir(CONFIG_DIR);
    let watcher = config::ConfigWatcher::watch(CONFIG_DIR).unwrap_or_else(|e| {
        tracing::warn!("config hot-reload disabled: {e}");
        config::ConfigWatcher::stub()
    });

    run(config, watcher);
}

/// Reload the config from disk and apply it if it keeps the live chunk
/// dimensions unchanged; otherwise keep the previous config and log a
/// warning (§4.7: a reload that would change either chunk dimension is
/// rejected, not silently reconciled against already-resident chunks).
fn try_reload(world: &mut World) {
    let candidate = config::load_from_dir(CONFIG_DIR);
    if candidate.chunk_size() != world.config.chunk_size() {
        tracing::warn!(
            previous = ?world.config.chunk_size(),
            candidate = ?candidate.chunk_size(),
            "config reload would change chunk dimensions; keeping previous configuration"
        );
        return;
    }
    world.config = candidate;
    tracing::info!("config reloaded");
}

fn run(config: WorldConfig, watcher: config::ConfigWatcher) {
    let mut world = World::new(config);
    let handles = NullHandleFactory;
    let colors = GrayscaleColors;

    for tick in 0..TICKS {
        if watcher.check() {
            try_reload(&mut world);
        }

        let viewer_pos = (f64::from(tick) * 4.0, 64.0, 0.0);
        let newly_queued = world.update_viewer_position(viewer_pos, &handles, &colors);
        if newly_queued > 0 {
            tracing::debug!(tick, newly_queued, "streaming pass queued chunks");
        }

        let cap = world.config.max_chunks_per_frame as usize;
        world.drain_generation_queue(cap, &handles, &colors);

        for event in world.drain_events() {
            tracing::trace!(?event, tick, "world event");
        }
    }

    tracing::info!(
        resident = world.resident_count(),
        total_quads = world.stats.total_quads(),
        chunks_loaded = world.stats.chunks_loaded,
        chunks_unloaded = world.stats.chunks_unloaded,
        "demo run complete"
    );
}

//! Runtime configuration and hot-reload (C7).
//!
//! Loaded from a RON file with the reference engine's `settings` module
//! pattern: a `serde`-derived struct where every field has a
//! `#[serde(default = "...")]` fallback, so a partial or missing config file
//! still produces legal values (see `WorldConfig::load_from_dir`, mirroring
//! `settings::loader::load_settings_from_dir`). Hot-reload reuses the
//! reference engine's `notify`-backed watcher/shared-flag design
//! (`ron::RonWatcher` / `settings::loader::SettingsWatcher`).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Runtime-tunable parameters recognized by the streaming world (§6).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldConfig {
    #[serde(default = "WorldConfig::default_chunk_size_xz")]
    pub chunk_size_xz: i32,
    #[serde(default = "WorldConfig::default_chunk_size_y")]
    pub chunk_size_y: i32,
    #[serde(default = "WorldConfig::default_render_distance_xz")]
    pub render_distance_xz: i32,
    #[serde(default = "WorldConfig::default_render_distance_y")]
    pub render_distance_y: i32,
    #[serde(default = "WorldConfig::default_max_chunks_per_frame")]
    pub max_chunks_per_frame: u8,
    #[serde(default = "WorldConfig::default_generate_collision")]
    pub generate_collision: bool,
    #[serde(default = "WorldConfig::default_auto_save_chunks")]
    pub auto_save_chunks: bool,
    #[serde(default = "WorldConfig::default_save_directory")]
    pub save_directory: String,
    #[serde(default = "WorldConfig::default_compress_chunks")]
    pub compress_chunks: bool,
}

impl WorldConfig {
    fn default_chunk_size_xz() -> i32 {
        16
    }
    fn default_chunk_size_y() -> i32 {
        128
    }
    fn default_render_distance_xz() -> i32 {
        8
    }
    fn default_render_distance_y() -> i32 {
        3
    }
    fn default_max_chunks_per_frame() -> u8 {
        2
    }
    fn default_generate_collision() -> bool {
        true
    }
    fn default_auto_save_chunks() -> bool {
        true
    }
    fn default_save_directory() -> String {
        "data/chunks".to_string()
    }
    fn default_compress_chunks() -> bool {
        true
    }

    /// The `(Cx, Cy, Cz)` triple every new chunk under this config is built
    /// with (`Cx == Cz`, per §6).
    #[must_use]
    pub fn chunk_size(&self) -> (i32, i32, i32) {
        (self.chunk_size_xz, self.chunk_size_y, self.chunk_size_xz)
    }

    /// Clamp every field into its documented range (§6), logging a warning
    /// for each field that had to move. Values that are in-range but not a
    /// multiple of 8 (for the two chunk-size fields) are rounded down to the
    /// nearest multiple of 8, with a floor at the range minimum.
    pub fn clamp_to_valid_ranges(&mut self) {
        self.chunk_size_xz = clamp_multiple_of_8(self.chunk_size_xz, 8, 64, "chunk_size_xz");
        self.chunk_size_y = clamp_multiple_of_8(self.chunk_size_y, 8, 256, "chunk_size_y");
        self.render_distance_xz = clamp_range(self.render_distance_xz, 2, 32, "render_distance_xz");
        self.render_distance_y = clamp_range(self.render_distance_y, 1, 16, "render_distance_y");
        if self.max_chunks_per_frame > 10 {
            tracing::warn!(
                "max_chunks_per_frame {} exceeds the documented range (0..=10); clamping",
                self.max_chunks_per_frame
            );
            self.max_chunks_per_frame = 10;
        }
    }
}

fn clamp_range(value: i32, min: i32, max: i32, field: &str) -> i32 {
    if value < min || value > max {
        let clamped = value.clamp(min, max);
        tracing::warn!(
            "{field} = {value} is outside [{min}, {max}]; clamping to {clamped}"
        );
        clamped
    } else {
        value
    }
}

fn clamp_multiple_of_8(value: i32, min: i32, max: i32, field: &str) -> i32 {
    let clamped = value.clamp(min, max);
    let rounded = (clamped / 8) * 8;
    let rounded = rounded.max(min);
    if rounded != value {
        tracing::warn!(
            "{field} = {value} must be a multiple of 8 within [{min}, {max}]; using {rounded}"
        );
    }
    rounded
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            chunk_size_xz: Self::default_chunk_size_xz(),
            chunk_size_y: Self::default_chunk_size_y(),
            render_distance_xz: Self::default_render_distance_xz(),
            render_distance_y: Self::default_render_distance_y(),
            max_chunks_per_frame: Self::default_max_chunks_per_frame(),
            generate_collision: Self::default_generate_collision(),
            auto_save_chunks: Self::default_auto_save_chunks(),
            save_directory: Self::default_save_directory(),
            compress_chunks: Self::default_compress_chunks(),
        }
    }
}

/// Load all `.ron` files from `path` and return the first one that parses as
/// a `WorldConfig`, or `WorldConfig::default()` if none exist or none parse.
///
/// Mirrors `settings::loader::load_settings_from_dir` in the reference
/// engine: config is best-effort, never fatal to startup.
#[must_use]
pub fn load_from_dir(path: &str) -> WorldConfig {
    let Ok(entries) = std::fs::read_dir(path) else {
        return WorldConfig::default();
    };

    for entry in entries.flatten() {
        let is_ron_file = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == "ron");
        if !is_ron_file {
            continue;
        }
        let Ok(content) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        match ron::from_str::<WorldConfig>(&content) {
            Ok(mut config) => {
                config.clamp_to_valid_ranges();
                return config;
            }
            Err(e) => {
                tracing::warn!("failed to parse {}: {e}", entry.path().display());
            }
        }
    }

    WorldConfig::default()
}

/// Directory watcher that flips a shared flag when a `.ron` file under the
/// watched directory changes, so the host can poll once per tick and decide
/// whether to reload (`WorldConfig::load_from_dir`). Mirrors
/// `ron::RonWatcher` / `settings::loader::SettingsWatcher`.
pub struct ConfigWatcher {
    changed: Arc<Mutex<bool>>,
    _watcher: Option<notify::RecommendedWatcher>,
}

impl ConfigWatcher {
    /// A watcher with no active OS watcher; `check` always returns `false`.
    /// Used as a fallback when constructing a real watcher fails.
    #[must_use]
    pub fn stub() -> Self {
        Self {
            changed: Arc::new(Mutex::new(false)),
            _watcher: None,
        }
    }

    /// Start watching `path` for filesystem changes.
    pub fn watch(path: impl AsRef<Path>) -> notify::Result<Self> {
        use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};

        let changed = Arc::new(Mutex::new(false));
        let changed_for_cb = Arc::clone(&changed);
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| {
                if res.is_ok() {
                    if let Ok(mut flag) = changed_for_cb.lock() {
                        *flag = true;
                    }
                }
            },
            Config::default(),
        )?;
        watcher.watch(path.as_ref(), RecursiveMode::NonRecursive)?;

        Ok(Self {
            changed,
            _watcher: Some(watcher),
        })
    }

    /// Returns `true` (and clears the flag) exactly once per detected
    /// change. Call once per tick.
    pub fn check(&self) -> bool {
        match self.changed.lock() {
            Ok(mut flag) => {
                let was_changed = *flag;
                *flag = false;
                was_changed
            }
            Err(poisoned) => {
                tracing::warn!("config watcher mutex poisoned; recovering");
                let mut flag = poisoned.into_inner();
                let was_changed = *flag;
                *flag = false;
                was_changed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_directory_falls_back_to_default() {
        let config = load_from_dir("/nonexistent/path/for/voxelstream/tests");
        assert_eq!(config, WorldConfig::default());
    }

    #[test]
    fn partial_ron_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("world.ron"),
            "(render_distance_xz: 12)",
        )
        .unwrap();
        let config = load_from_dir(dir.path().to_str().unwrap());
        assert_eq!(config.render_distance_xz, 12);
        assert_eq!(config.chunk_size_xz, WorldConfig::default_chunk_size_xz());
    }

    #[test]
    fn clamp_rounds_chunk_size_down_to_multiple_of_8() {
        let mut config = WorldConfig {
            chunk_size_xz: 20,
            ..WorldConfig::default()
        };
        config.clamp_to_valid_ranges();
        assert_eq!(config.chunk_size_xz, 16);
    }

    #[test]
    fn clamp_respects_range_bounds() {
        let mut config = WorldConfig {
            render_distance_xz: 100,
            render_distance_y: 0,
            ..WorldConfig::default()
        };
        config.clamp_to_valid_ranges();
        assert_eq!(config.render_distance_xz, 32);
        assert_eq!(config.render_distance_y, 1);
    }
}

//! On-disk chunk persistence (C5).
//!
//! One file per chunk, named `chunk_<x>_<y>_<z>.dat` under a configured
//! directory. The file holds the chunk's serialized bytes (C3's header plus
//! the RLE payload from C1), optionally wrapped in a length-prefixed
//! Zstandard frame. Backgrounding a save follows the reference engine's
//! `chunk::streaming` pattern of spawning work onto
//! `bevy_tasks::AsyncComputeTaskPool` and polling the returned `Task`
//! without blocking, via `bevy_tasks`' re-exported `futures_lite` helpers.

use crate::chunk::Chunk;
use crate::coords::Coord;
use crate::error::{WorldError, WorldResult};
use bevy_tasks::{AsyncComputeTaskPool, Task};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::path::{Path, PathBuf};

/// The path a chunk at `position` is stored at under `dir`.
#[must_use]
pub fn file_path(dir: &str, position: Coord) -> PathBuf {
    Path::new(dir).join(format!(
        "chunk_{}_{}_{}.dat",
        position.0, position.1, position.2
    ))
}

/// Create `dir` (and any missing parents) if it does not already exist.
/// Idempotent.
pub fn ensure_directory(dir: &str) -> WorldResult<()> {
    std::fs::create_dir_all(dir)?;
    Ok(())
}

fn frame(bytes: Vec<u8>, compress: bool) -> WorldResult<Vec<u8>> {
    if !compress {
        return Ok(bytes);
    }
    let compressed = zstd::stream::encode_all(bytes.as_slice(), 0)?;
    let mut framed = Vec::with_capacity(4 + compressed.len());
    framed.write_u32::<LittleEndian>(compressed.len() as u32)?;
    framed.extend(compressed);
    Ok(framed)
}

fn unframe(raw: Vec<u8>, compress: bool) -> WorldResult<Vec<u8>> {
    if !compress {
        return Ok(raw);
    }
    if raw.len() < 4 {
        return Err(WorldError::PayloadLengthMismatch {
            expected: 4,
            got: raw.len(),
        });
    }
    let mut len_bytes = &raw[0..4];
    let len = len_bytes.read_u32::<LittleEndian>()? as usize;
    let end = (4 + len).min(raw.len());
    Ok(zstd::stream::decode_all(&raw[4..end])?)
}

/// Synchronously persist `chunk` under `dir`, creating the directory first.
pub fn save_chunk(dir: &str, chunk: &Chunk, compress: bool) -> WorldResult<()> {
    ensure_directory(dir)?;
    let framed = frame(chunk.serialize(), compress)?;
    std::fs::write(file_path(dir, chunk.position), framed)?;
    Ok(())
}

/// Synchronously attempt to load `chunk`'s saved bytes into it. Returns
/// `Ok(true)` on a hit, `Ok(false)` if no file exists for this position
/// (not an error — a miss is expected for freshly generated terrain).
pub fn load_chunk(dir: &str, chunk: &mut Chunk, compress: bool) -> WorldResult<bool> {
    let path = file_path(dir, chunk.position);
    if !path.exists() {
        return Ok(false);
    }
    let raw = std::fs::read(&path)?;
    let bytes = unframe(raw, compress)?;
    chunk.deserialize(&bytes)?;
    Ok(true)
}

/// Spawn a save onto the async compute pool. Takes an owned snapshot of the
/// serialized bytes at the moment of enqueue, never the live chunk, so the
/// in-flight save cannot observe a later mutation.
pub fn spawn_save_task(
    dir: String,
    position: Coord,
    serialized: Vec<u8>,
    compress: bool,
) -> Task<WorldResult<Coord>> {
    let pool = AsyncComputeTaskPool::get();
    pool.spawn(async move {
        ensure_directory(&dir)?;
        let framed = frame(serialized, compress)?;
        std::fs::write(file_path(&dir, position), framed)?;
        Ok(position)
    })
}

/// Poll a previously spawned save task without blocking. Returns `None`
/// while the task is still running.
pub fn poll_save_task(task: &mut Task<WorldResult<Coord>>) -> Option<WorldResult<Coord>> {
    bevy_tasks::futures_lite::future::block_on(bevy_tasks::futures_lite::future::poll_once(task))
}

//! The error taxonomy shared by the chunk, world, and persistence layers.
//!
//! Every variant here is non-fatal: callers match on it and apply the policy
//! documented on the variant, they never propagate it into a process abort.
//! The host is assumed to own the logger and decide severity; this module's
//! own `tracing::warn!`/`error!` calls (in `chunk`, `world`, `persistence`)
//! are a convenience default, not the canonical policy.

use thiserror::Error;

/// Non-fatal failure modes produced by the voxel core.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum WorldError {
    /// A local coordinate fell outside the chunk box. Writes silently no-op;
    /// reads return air. Kept as a variant mainly so callers that want to
    /// observe the miss (e.g. tests) can do so explicitly.
    #[error("local coordinate {0:?} is out of range for this chunk")]
    OutOfRangeCoordinate((i32, i32, i32)),

    /// A mutation targeted a chunk position outside the residency window.
    #[error("chunk {0:?} is not resident and is out of streaming range")]
    ChunkNotResident((i32, i32, i32)),

    /// Deserialized header (position or size) disagreed with the receiving
    /// chunk. Treated by the caller as "no save on disk".
    #[error("on-disk header for {found:?} does not match expected chunk {expected:?}")]
    HeaderMismatch {
        expected: (i32, i32, i32),
        found: (i32, i32, i32),
    },

    /// RLE decode reconstructed the wrong number of blocks.
    #[error("RLE payload decoded to {got} blocks, expected {expected}")]
    PayloadLengthMismatch { expected: usize, got: usize },

    /// Any filesystem failure on open/read/write.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),

    /// A position drained from the generation queue had already been
    /// unloaded; the caller silently skips it.
    #[error("chunk {0:?} was unloaded before its queued generation ran")]
    QueueOrphan((i32, i32, i32)),
}

pub type WorldResult<T> = Result<T, WorldError>;

//! The five-notification event surface (§6, C10).
//!
//! The reference engine signals chunk lifecycle changes through Bevy's
//! built-in signal mechanism (scene-tree notifications). The rendering/ECS
//! layer that would normally drain those signals is one of this crate's
//! external collaborators (§1), so the world accumulates events into a plain
//! queue instead and the host drains it once per tick.

use crate::block::BlockId;
use crate::coords::Coord;
use std::collections::VecDeque;

/// A notification emitted by the world. See §6 for the complete,
/// closed set — this implementation adds no further variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEvent {
    /// A chunk at `c` is resident and has produced its initial mesh.
    ChunkLoaded(Coord),
    /// A chunk at `c` is no longer resident.
    ChunkUnloaded(Coord),
    /// Cell at world position `w` now holds `id`.
    BlockModified(Coord, BlockId),
    /// Persistence of chunk `c` completed.
    ChunkSaved(Coord),
    /// Mesh rebuilt (initial or subsequent) for chunk `c`.
    ChunkMeshGenerated(Coord),
}

/// FIFO queue of pending notifications, owned by the world and drained by
/// the host.
#[derive(Debug, Default)]
pub struct EventSink {
    queue: VecDeque<WorldEvent>,
}

impl EventSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: WorldEvent) {
        self.queue.push_back(event);
    }

    /// Drain and return every pending event in emission order.
    pub fn drain(&mut self) -> Vec<WorldEvent> {
        self.queue.drain(..).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_emission_order() {
        let mut sink = EventSink::new();
        sink.push(WorldEvent::BlockModified((0, 0, 0), 1));
        sink.push(WorldEvent::ChunkMeshGenerated((0, 0, 0)));
        let drained = sink.drain();
        assert_eq!(
            drained,
            vec![
                WorldEvent::BlockModified((0, 0, 0), 1),
                WorldEvent::ChunkMeshGenerated((0, 0, 0)),
            ]
        );
        assert!(sink.is_empty());
    }
}

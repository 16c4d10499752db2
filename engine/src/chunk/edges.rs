use std::time::{Duration, Instant};

use crate::{
    chunk::{Chunk, state_bits::Stage},
    context::SchedulerContext,
    sync::{lock, try_read, try_write, write},
    voxels::{block::Block, block_buffer::BlockBuffer, coord::LocalPos, face::Face},
};

/// Faces whose neighbor needs a geometry rebuild, plus whether the chunk itself does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildMask {
    faces: u8,
    self_dirty: bool,
}

impl RebuildMask {
    pub fn mark_face(&mut self, face: Face) {
        self.faces |= face.bit();
    }

    pub fn mark_self(&mut self) {
        self.self_dirty = true;
    }

    pub fn contains(&self, face: Face) -> bool {
        self.faces & face.bit() != 0
    }

    pub fn is_self_dirty(&self) -> bool {
        self.self_dirty
    }

    pub fn is_empty(&self) -> bool {
        self.faces == 0 && !self.self_dirty
    }

    pub fn faces(&self) -> impl Iterator<Item = Face> + '_ {
        Face::ALL
            .into_iter()
            .filter(move |face| self.contains(*face))
    }
}

/// Accumulates rebuild requests and releases them at most once per interval.
#[derive(Debug, Default)]
pub struct RebuildTracker {
    mask: RebuildMask,
    last_flush: Option<Instant>,
}

impl RebuildTracker {
    pub fn mask(&self) -> RebuildMask {
        self.mask
    }

    pub fn mark_face(&mut self, face: Face) {
        self.mask.mark_face(face);
    }

    pub fn mark_self(&mut self) {
        self.mask.mark_self();
    }

    /// Takes the accumulated mask if there is one and `interval` has passed since the last flush.
    pub fn take_due(&mut self, now: Instant, interval: Duration) -> Option<RebuildMask> {
        if self.mask.is_empty() {
            return None;
        }

        let due = match self.last_flush {
            Some(last_flush) => now.saturating_duration_since(last_flush) >= interval,
            None => true,
        };

        if !due {
            return None;
        }

        self.last_flush = Some(now);
        Some(std::mem::take(&mut self.mask))
    }
}

/// Per-chunk edge synchronization bookkeeping.
#[derive(Debug, Default)]
pub struct EdgeState {
    pub vertices: RebuildTracker,
    pub collider: RebuildTracker,
    synced: bool,
}

impl EdgeState {
    pub fn is_synced(&self) -> bool {
        self.synced
    }

    /// Forces the padding to be copied again before the next geometry build.
    pub fn invalidate_sync(&mut self) {
        self.synced = false;
    }

    pub fn reset(&mut self) {
        *self = EdgeState::default();
    }
}

impl Chunk {
    /// True when all six neighbors are present and have finished generating.
    pub fn synchronize_neighbors(&self) -> bool {
        let handles = lock(&self.neighbors).handles();
        handles.iter().all(|handle| {
            handle
                .as_ref()
                .is_some_and(|neighbor| neighbor.scheduler.is_completed(Stage::Generate))
        })
    }

    /// Copies the adjoining face of every neighbor into our padding, once per generation cycle.
    ///
    /// Never blocks: returns false when a buffer is locked by a worker or the
    /// tick's sync budget is used up, and the copy is retried on a later tick.
    pub fn synchronize_edges(&self, ctx: &SchedulerContext) -> bool {
        if lock(&self.edges).is_synced() {
            return true;
        }

        if !ctx.try_consume_sync_budget() {
            return false;
        }

        let neighbors = self.neighbor_handles();
        if neighbors.len() != Face::ALL.len() {
            return false;
        }

        let Some(mut blocks) = try_write(&self.blocks) else {
            return false;
        };

        for (face, neighbor) in &neighbors {
            let Some(neighbor_blocks) = try_read(&neighbor.blocks) else {
                log::trace!(
                    "Chunk {:?}: neighbor {:?} is busy, retrying edge sync later",
                    self.pos(),
                    neighbor.pos()
                );
                return false;
            };
            blocks.copy_face_from(*face, &neighbor_blocks);
        }
        drop(blocks);

        lock(&self.edges).synced = true;
        true
    }

    /// Propagates an interior edit to the padding of every neighbor sharing the cell.
    pub(crate) fn mirror_edit(&self, pos: LocalPos, block: Block) {
        let faces: Vec<Face> = pos.border_faces().collect();

        for face in &faces {
            if let Some(neighbor) = self.neighbor(*face) {
                let padding = BlockBuffer::mirrored_padding_pos(pos, *face);
                write(&neighbor.blocks).set_padding(padding, block);
            }
        }

        let mut edges = lock(&self.edges);
        for face in faces {
            edges.vertices.mark_face(face);
            edges.collider.mark_face(face);
        }
        edges.vertices.mark_self();
        edges.collider.mark_self();
    }

    /// Turns due rebuild masks into pending geometry stages on this chunk and its neighbors.
    pub fn flush_rebuilds(&self, ctx: &SchedulerContext, now: Instant) {
        let config = ctx.config();
        let (vertices, collider) = {
            let mut edges = lock(&self.edges);
            (
                edges
                    .vertices
                    .take_due(now, config.vertices_flush_interval()),
                edges
                    .collider
                    .take_due(now, config.collider_flush_interval()),
            )
        };

        if let Some(mask) = vertices {
            if mask.is_self_dirty() {
                self.scheduler.request(Stage::BuildVertices);
            }
            for face in mask.faces() {
                if let Some(neighbor) = self.neighbor(face) {
                    neighbor.scheduler.request(Stage::BuildVertices);
                }
            }
        }

        if let Some(mask) = collider {
            if mask.is_self_dirty() && self.scheduler.has_built(Stage::BuildCollider) {
                self.scheduler.request(Stage::BuildCollider);
            }
            for face in mask.faces() {
                let Some(neighbor) = self.neighbor(face) else {
                    continue;
                };
                if neighbor.scheduler.has_built(Stage::BuildCollider) {
                    neighbor.scheduler.request(Stage::BuildCollider);
                }
            }
        }
    }
}

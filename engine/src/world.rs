use std::{
    collections::{HashMap, HashSet},
    time::Instant,
};

use log::debug;

use crate::{
    chunk::{ChunkHandle, state_bits::Stage},
    context::SchedulerContext,
    voxels::{
        block::Block,
        coord::{ChunkPos, WorldPos},
        face::Face,
    },
    world_stats::WorldStatistics,
};

fn is_removing(chunk: &ChunkHandle) -> bool {
    chunk.pending().check(Stage::Remove) || chunk.completed().check(Stage::Remove)
}

/// The set of live chunks, owned by the driving thread.
///
/// Links neighbors as chunks come and go, routes world-space edits and runs
/// one scheduler update per chunk each tick.
pub struct ChunkWorld {
    ctx: SchedulerContext,
    chunks: HashMap<ChunkPos, ChunkHandle, ahash::RandomState>,
    /// Requested while the previous chunk at the same position was still being removed
    deferred_requests: HashSet<ChunkPos, ahash::RandomState>,
}

impl ChunkWorld {
    pub fn new(ctx: SchedulerContext) -> Self {
        ChunkWorld {
            ctx,
            chunks: HashMap::default(),
            deferred_requests: HashSet::default(),
        }
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    pub fn chunk(&self, pos: ChunkPos) -> Option<&ChunkHandle> {
        self.chunks.get(&pos)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn positions(&self) -> impl Iterator<Item = ChunkPos> + '_ {
        self.chunks.keys().copied()
    }

    /// Makes sure a chunk exists at `pos` and links it to its present neighbors.
    ///
    /// If the chunk at `pos` is being removed, the request is remembered and
    /// served once removal (and any save) has finished, and `None` is returned.
    pub fn request_chunk(&mut self, pos: ChunkPos) -> Option<ChunkHandle> {
        if let Some(chunk) = self.chunks.get(&pos) {
            if is_removing(chunk) {
                self.deferred_requests.insert(pos);
                return None;
            }
            return Some(chunk.clone());
        }

        let chunk = self.ctx.pool().acquire(&self.ctx);
        chunk.init(pos);

        for face in Face::ALL {
            if let Some(neighbor) = self.chunks.get(&pos.get_neighbor(face)) {
                chunk.subscribe(face, neighbor);
            }
        }

        debug!("Requested chunk {:?}", pos);
        self.chunks.insert(pos, chunk.clone());
        Some(chunk)
    }

    /// Starts removing the chunk at `pos`, saving it first if `save` is set.
    /// Repeated calls while the removal is underway change nothing.
    pub fn request_removal(&mut self, pos: ChunkPos, save: bool) -> bool {
        self.deferred_requests.remove(&pos);

        let Some(chunk) = self.chunks.get(&pos) else {
            return false;
        };

        if is_removing(chunk) {
            return true;
        }

        if save {
            chunk.request_save();
        }
        chunk.request_removal();
        true
    }

    /// Removes the chunk at `pos`, saving it if the config asks for saves on removal.
    pub fn unload_chunk(&mut self, pos: ChunkPos) -> bool {
        let save = self.ctx.config().save_on_remove;
        self.request_removal(pos, save)
    }

    /// Returns false if no chunk covers `pos`.
    pub fn set_block(&self, pos: WorldPos, block: Block) -> bool {
        let Some(chunk) = self.chunks.get(&pos.to_chunk_pos()) else {
            return false;
        };

        chunk.set_block(pos.to_local_pos(), block);
        true
    }

    /// `None` until the chunk covering `pos` has its terrain.
    pub fn get_block(&self, pos: WorldPos) -> Option<Block> {
        let chunk = self.chunks.get(&pos.to_chunk_pos())?;
        if !chunk.completed().check(Stage::Generate) {
            return None;
        }

        Some(chunk.get_block(pos.to_local_pos()))
    }

    #[profiling::function]
    pub fn tick(&mut self, now: Instant) {
        self.ctx.begin_tick(now);

        for chunk in self.chunks.values() {
            if chunk.can_update() {
                chunk.update(&self.ctx);
            }
        }

        self.retire_removed();
    }

    fn retire_removed(&mut self) {
        let removed: Vec<ChunkPos> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| chunk.completed().check(Stage::Remove) && !chunk.is_task_running())
            .map(|(pos, _)| *pos)
            .collect();

        for pos in removed {
            let Some(chunk) = self.chunks.remove(&pos) else {
                continue;
            };

            chunk.unsubscribe_all();
            self.ctx.pool().release(chunk);
            debug!("Retired chunk {:?}", pos);

            if self.deferred_requests.remove(&pos) {
                self.request_chunk(pos);
            }
        }
    }

    pub fn is_removing(&self, pos: ChunkPos) -> bool {
        self.chunks.get(&pos).is_some_and(is_removing)
    }

    pub fn has_tasks_in_flight(&self) -> bool {
        self.chunks.values().any(|chunk| chunk.is_task_running())
    }

    pub fn stats(&self) -> WorldStatistics {
        let mut stats = WorldStatistics::new();
        for chunk in self.chunks.values() {
            stats.record_chunk(chunk.completed(), chunk.is_task_running());
        }

        stats.pooled_chunks = self.ctx.pool().pooled();
        stats.created_chunks = self.ctx.pool().created();
        stats
    }
}

use crate::{
    chunk::state_bits::{CompletedStages, Stage},
    voxels::{block::Block, block_buffer::PADDED_VOLUME},
};

/// Chunk counts keyed by the furthest stage each chunk has completed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChunksByStage([usize; Stage::COUNT]);

impl ChunksByStage {
    pub fn increment(&mut self, stage: Stage) {
        self.0[stage as usize] += 1;
    }

    pub fn get(&self, stage: Stage) -> usize {
        self.0[stage as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = (Stage, usize)> + '_ {
        Stage::UPDATE_ORDER
            .into_iter()
            .map(move |stage| (stage, self.get(stage)))
            .filter(|(_, count)| *count > 0)
    }
}

/// The last stage in update order that has completed, if any.
pub fn furthest_stage(completed: CompletedStages) -> Option<Stage> {
    Stage::UPDATE_ORDER
        .into_iter()
        .rev()
        .find(|stage| completed.check(*stage))
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WorldStatistics {
    pub total_chunks: usize,
    /// Chunks that have not completed any stage yet
    pub unstarted_chunks: usize,
    pub chunks_by_stage: ChunksByStage,
    pub tasks_in_flight: usize,
    pub pooled_chunks: usize,
    pub created_chunks: usize,
    pub approximate_memory_usage_bytes: usize,
}

impl WorldStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_chunk(&mut self, completed: CompletedStages, task_running: bool) {
        self.total_chunks += 1;
        self.approximate_memory_usage_bytes += PADDED_VOLUME * std::mem::size_of::<Block>();

        match furthest_stage(completed) {
            Some(stage) => self.chunks_by_stage.increment(stage),
            None => self.unstarted_chunks += 1,
        }

        if task_running {
            self.tasks_in_flight += 1;
        }
    }
}

impl std::fmt::Display for WorldStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} chunks ({} in flight, {} pooled, {} KiB)",
            self.total_chunks,
            self.tasks_in_flight,
            self.pooled_chunks,
            self.approximate_memory_usage_bytes / 1024
        )?;

        if self.unstarted_chunks > 0 {
            write!(f, ", unstarted: {}", self.unstarted_chunks)?;
        }
        for (stage, count) in self.chunks_by_stage.iter() {
            write!(f, ", {:?}: {}", stage, count)?;
        }
        Ok(())
    }
}

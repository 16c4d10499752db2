//! Hand-off of chunk work to worker threads.
//!
//! The scheduler never runs stage work itself. CPU-bound stages go to a pool
//! of threads where every chunk is pinned to one thread by its affinity key,
//! and blocking I/O goes to a separate pool so slow disks never stall
//! generation or meshing.

use crate::{chunk::state_bits::Stage, voxels::coord::ChunkPos};

pub mod deferred;
pub mod task_queue;
pub mod worker_pools;

pub use deferred::{DeferredDispatch, Submission};
pub use worker_pools::WorkerPools;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Stable key routing all CPU work of one chunk to the same worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AffinityKey(pub u64);

impl AffinityKey {
    pub fn worker_index(self, worker_count: usize) -> usize {
        assert!(worker_count > 0, "Cannot route to an empty worker pool");
        (self.0 % worker_count as u64) as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    /// Visible latency, e.g. geometry for a block the player just edited
    Immediate,
    Background,
}

/// Orders CPU work on a worker: immediate before background, then oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriorityToken {
    pub priority: Priority,
    pub sequence: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTask {
    pub pos: ChunkPos,
    pub stage: Stage,
    pub affinity: AffinityKey,
    pub priority: PriorityToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoTask {
    pub pos: ChunkPos,
    pub stage: Stage,
}

/// Where the scheduler submits work. Every submitted job runs at most once.
pub trait TaskDispatch: Send + Sync {
    fn spawn_cpu(&self, task: CpuTask, job: Job);
    fn spawn_io(&self, task: IoTask, job: Job);
}

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use crate::{
    chunk::{Chunk, ChunkHandle},
    context::SchedulerContext,
    sync::lock,
};

/// Recycles chunk allocations. Every chunk handed out is in its reset state.
pub struct ChunkPool {
    free: Mutex<Vec<ChunkHandle>>,
    capacity: usize,
    created: AtomicUsize,
}

impl ChunkPool {
    pub fn new(capacity: usize) -> Self {
        ChunkPool {
            free: Mutex::new(Vec::with_capacity(capacity.min(64))),
            capacity,
            created: AtomicUsize::new(0),
        }
    }

    pub fn acquire(&self, ctx: &SchedulerContext) -> ChunkHandle {
        if let Some(chunk) = lock(&self.free).pop() {
            return chunk;
        }

        self.created.fetch_add(1, Ordering::Relaxed);
        Arc::new(Chunk::new(ctx.next_affinity_key()))
    }

    /// Resets `chunk` and keeps it for reuse, unless the pool is full.
    pub fn release(&self, chunk: ChunkHandle) {
        assert!(
            !chunk.is_task_running(),
            "Chunk {:?} released while a task is in flight",
            chunk.pos()
        );
        chunk.reset();

        let mut free = lock(&self.free);
        if free.len() < self.capacity {
            free.push(chunk);
        }
    }

    /// Chunks waiting to be reused.
    pub fn pooled(&self) -> usize {
        lock(&self.free).len()
    }

    /// Chunks allocated over the pool's lifetime.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Relaxed)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::{
    persistence::{PersistenceError, PersistenceStore, Snapshot},
    voxels::coord::ChunkPos,
};

/// Keeps snapshots in memory for the lifetime of the process.
#[derive(Default)]
pub struct MemoryStore {
    snapshots: DashMap<ChunkPos, Snapshot>,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, pos: ChunkPos) -> Option<Snapshot> {
        self.snapshots.get(&pos).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, pos: ChunkPos, snapshot: Snapshot) {
        self.snapshots.insert(pos, snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }
}

impl PersistenceStore for MemoryStore {
    fn read(&self, pos: ChunkPos) -> Result<Option<Snapshot>, PersistenceError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        Ok(self.get(pos))
    }

    fn write(&self, pos: ChunkPos, snapshot: Snapshot) -> Result<(), PersistenceError> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.snapshots.insert(pos, snapshot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxels::{block::Block, coord::LocalPos};

    #[test]
    fn write_then_read() {
        let store = MemoryStore::new();
        let pos = ChunkPos::new(0, -1, 2);
        assert_eq!(store.read(pos).unwrap(), None);

        let snapshot = Snapshot::differential(1, [(LocalPos::new(0, 0, 0), Block::STONE)]);
        store.write(pos, snapshot.clone()).unwrap();

        assert_eq!(store.read(pos).unwrap(), Some(snapshot));
        assert_eq!(store.reads(), 2);
        assert_eq!(store.writes(), 1);
        assert_eq!(store.len(), 1);
    }
}

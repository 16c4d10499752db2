use std::sync::{Arc, Weak};

use crate::{
    chunk::{Chunk, ChunkHandle},
    sync::lock,
    voxels::face::Face,
};

/// The six neighbor slots of a chunk, indexed by `Face`.
///
/// Slots hold weak handles: neither chunk owns the other, and a slot is only
/// populated while both chunks reference each other.
#[derive(Default)]
pub struct NeighborTable {
    slots: [Option<Weak<Chunk>>; 6],
}

impl NeighborTable {
    pub fn get(&self, face: Face) -> Option<ChunkHandle> {
        self.slots[face.index()].as_ref().and_then(Weak::upgrade)
    }

    pub fn is_populated(&self, face: Face) -> bool {
        self.get(face).is_some()
    }

    pub fn populated_count(&self) -> usize {
        Face::ALL
            .iter()
            .filter(|face| self.is_populated(**face))
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.populated_count() == Face::ALL.len()
    }

    fn set(&mut self, face: Face, chunk: &ChunkHandle) {
        self.slots[face.index()] = Some(Arc::downgrade(chunk));
    }

    fn take(&mut self, face: Face) -> Option<Weak<Chunk>> {
        self.slots[face.index()].take()
    }

    /// Clears the slot only if it still points at `chunk`.
    fn remove_if(&mut self, face: Face, chunk: &Chunk) {
        let slot = &mut self.slots[face.index()];
        if slot
            .as_ref()
            .is_some_and(|weak| std::ptr::eq(weak.as_ptr(), chunk))
        {
            *slot = None;
        }
    }

    pub fn handles(&self) -> [Option<ChunkHandle>; 6] {
        Face::ALL.map(|face| self.get(face))
    }
}

impl Chunk {
    /// Links `self` and `other` as mutual neighbors, `other` lying across `face`.
    pub fn subscribe(self: &Arc<Self>, face: Face, other: &ChunkHandle) {
        assert!(
            !Arc::ptr_eq(self, other),
            "Chunk {:?} cannot neighbor itself",
            self.pos()
        );
        debug_assert_eq!(self.pos().get_neighbor(face), other.pos());

        // Never hold both tables at once
        lock(&self.neighbors).set(face, other);
        lock(&other.neighbors).set(face.opposite(), self);

        // A new neighbor means new padding data
        lock(&self.edges).invalidate_sync();
        lock(&other.edges).invalidate_sync();
    }

    pub fn unsubscribe(&self, face: Face) {
        let previous = lock(&self.neighbors).take(face);
        if let Some(neighbor) = previous.and_then(|weak| weak.upgrade()) {
            lock(&neighbor.neighbors).remove_if(face.opposite(), self);
        }
    }

    pub fn unsubscribe_all(&self) {
        for face in Face::ALL {
            self.unsubscribe(face);
        }
    }

    pub fn neighbor(&self, face: Face) -> Option<ChunkHandle> {
        lock(&self.neighbors).get(face)
    }

    /// Snapshot of the populated neighbor slots.
    pub fn neighbor_handles(&self) -> Vec<(Face, ChunkHandle)> {
        let handles = lock(&self.neighbors).handles();
        Face::ALL
            .into_iter()
            .zip(handles)
            .filter_map(|(face, handle)| handle.map(|handle| (face, handle)))
            .collect()
    }

    pub fn neighbor_count(&self) -> usize {
        lock(&self.neighbors).populated_count()
    }
}

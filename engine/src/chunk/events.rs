use crossbeam_channel::{Receiver, Sender};

use crate::{
    chunk::{Chunk, state_bits::Stage},
    sync::lock,
    voxels::coord::ChunkPos,
};

/// Notification delivered to external observers of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkEvent {
    /// A snapshot of the chunk was written to the persistence store.
    Saved(ChunkPos),
}

/// Raised by a worker when a task completes, fanned out on the driving thread
/// at the start of the chunk's next update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QueuedEvent {
    /// Interior data is final; neighbors have to refresh their padding.
    Generated,
    Saved,
}

/// Growable list of external listeners. Listeners whose receiver was dropped
/// are pruned on the next notification.
#[derive(Default)]
pub struct ChunkObservers {
    listeners: Vec<Sender<ChunkEvent>>,
}

impl ChunkObservers {
    pub fn subscribe(&mut self) -> Receiver<ChunkEvent> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        self.listeners.push(sender);
        receiver
    }

    pub fn notify(&mut self, event: ChunkEvent) {
        self.listeners
            .retain(|listener| listener.send(event).is_ok());
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

impl Chunk {
    /// Subscribes to persistence notifications of this chunk.
    /// Subscriptions are dropped when the chunk is reset.
    pub fn subscribe_events(&self) -> Receiver<ChunkEvent> {
        lock(&self.observers).subscribe()
    }

    pub(crate) fn fan_out(&self, event: QueuedEvent) {
        match event {
            QueuedEvent::Generated => {
                for (face, neighbor) in self.neighbor_handles() {
                    neighbor.on_neighbor_generated(face.opposite());
                }
            }
            QueuedEvent::Saved => {
                lock(&self.observers).notify(ChunkEvent::Saved(self.pos()));
            }
        }
    }

    fn on_neighbor_generated(&self, face: crate::voxels::face::Face) {
        log::trace!(
            "Chunk {:?}: neighbor on {:?} finished generating",
            self.pos(),
            face
        );

        // Our padding on that side is stale, so any geometry we already built is too
        lock(&self.edges).invalidate_sync();

        let completed = self.scheduler.completed();
        if completed.check(Stage::BuildVertices) {
            self.scheduler.request(Stage::BuildVertices);
        }
        if completed.check(Stage::BuildCollider) {
            self.scheduler.request(Stage::BuildCollider);
        }
    }
}

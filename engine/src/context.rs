use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::Instant,
};

use crate::{
    chunk::pool::ChunkPool,
    config::SchedulerConfig,
    dispatch::{AffinityKey, Priority, PriorityToken, TaskDispatch},
    mesh_generation::{ColliderBuilder, CulledFaceBuilder, MeshBuilder},
    persistence::PersistenceStore,
    sync::lock,
    worldgen::TerrainGenerator,
};

/// The pluggable algorithms the scheduler calls into.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn TerrainGenerator>,
    /// Without a store chunks are never loaded or saved
    pub store: Option<Arc<dyn PersistenceStore>>,
    pub mesh_builder: Arc<dyn MeshBuilder>,
    pub collider_builder: Arc<dyn ColliderBuilder>,
}

impl Collaborators {
    pub fn new(generator: Arc<dyn TerrainGenerator>) -> Self {
        Collaborators {
            generator,
            store: None,
            mesh_builder: Arc::new(CulledFaceBuilder),
            collider_builder: Arc::new(CulledFaceBuilder),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn PersistenceStore>) -> Self {
        self.store = Some(store);
        self
    }
}

struct TickWindow {
    now: Instant,
    /// Wall clock at the start of the tick, for the sync budget
    started: Instant,
    syncs: u32,
}

/// Everything a chunk needs from the outside world while it is updated.
///
/// Owned by the driver and passed by reference into every chunk operation.
pub struct SchedulerContext {
    config: SchedulerConfig,
    collaborators: Collaborators,
    dispatch: Arc<dyn TaskDispatch>,
    pool: ChunkPool,
    next_affinity: AtomicU64,
    next_sequence: AtomicU64,
    tick: Mutex<TickWindow>,
}

impl SchedulerContext {
    pub fn new(
        config: SchedulerConfig,
        collaborators: Collaborators,
        dispatch: Arc<dyn TaskDispatch>,
    ) -> Self {
        let now = Instant::now();
        let pool = ChunkPool::new(config.max_pooled_chunks);

        SchedulerContext {
            config,
            collaborators,
            dispatch,
            pool,
            next_affinity: AtomicU64::new(0),
            next_sequence: AtomicU64::new(0),
            tick: Mutex::new(TickWindow {
                now,
                started: now,
                syncs: 0,
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn generator(&self) -> &Arc<dyn TerrainGenerator> {
        &self.collaborators.generator
    }

    pub fn store(&self) -> Option<&Arc<dyn PersistenceStore>> {
        self.collaborators.store.as_ref()
    }

    pub fn mesh_builder(&self) -> &Arc<dyn MeshBuilder> {
        &self.collaborators.mesh_builder
    }

    pub fn collider_builder(&self) -> &Arc<dyn ColliderBuilder> {
        &self.collaborators.collider_builder
    }

    pub fn dispatch(&self) -> &dyn TaskDispatch {
        self.dispatch.as_ref()
    }

    pub fn pool(&self) -> &ChunkPool {
        &self.pool
    }

    pub fn next_affinity_key(&self) -> AffinityKey {
        AffinityKey(self.next_affinity.fetch_add(1, Ordering::Relaxed))
    }

    pub fn next_priority(&self, priority: Priority) -> PriorityToken {
        PriorityToken {
            priority,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Opens a new tick. `now` is the logical time used for rebuild flushes.
    pub fn begin_tick(&self, now: Instant) {
        let mut tick = lock(&self.tick);
        tick.now = now;
        tick.started = Instant::now();
        tick.syncs = 0;
    }

    pub fn tick_time(&self) -> Instant {
        lock(&self.tick).now
    }

    /// Admits an edge sync if the tick's budget allows one. The first sync of
    /// a tick is always admitted so progress is guaranteed.
    pub fn try_consume_sync_budget(&self) -> bool {
        let mut tick = lock(&self.tick);
        if tick.syncs > 0 && tick.started.elapsed() >= self.config.edge_sync_budget() {
            return false;
        }

        tick.syncs += 1;
        true
    }

    pub fn syncs_this_tick(&self) -> u32 {
        lock(&self.tick).syncs
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::*, *};
    use crate::worldgen::EmptyTerrainGenerator;

    fn context() -> SchedulerContext {
        deferred_context(Collaborators::new(Arc::new(EmptyTerrainGenerator))).0
    }

    #[test]
    fn priority_sequence_is_monotonic() {
        let ctx = context();
        let first = ctx.next_priority(Priority::Background);
        let second = ctx.next_priority(Priority::Immediate);
        let third = ctx.next_priority(Priority::Background);

        assert!(second.sequence > first.sequence);
        assert!(second < first);
        assert!(first < third);
    }

    #[test]
    fn affinity_keys_are_unique() {
        let ctx = context();
        assert_ne!(ctx.next_affinity_key(), ctx.next_affinity_key());
    }

    #[test]
    fn exhausted_budget_still_admits_first_sync() {
        let config = SchedulerConfig {
            edge_sync_budget_us: 0,
            ..test_config()
        };
        let (ctx, _) = deferred_context_with(
            config,
            Collaborators::new(Arc::new(EmptyTerrainGenerator)),
        );

        ctx.begin_tick(Instant::now());
        assert!(ctx.try_consume_sync_budget());
        assert!(!ctx.try_consume_sync_budget());

        ctx.begin_tick(Instant::now());
        assert!(ctx.try_consume_sync_budget());
        assert_eq!(ctx.syncs_this_tick(), 1);
    }
}

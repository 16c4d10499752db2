use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use crossbeam::atomic::AtomicCell;
use log::{debug, trace, warn};

use crate::{
    chunk::{
        Chunk, ChunkHandle,
        events::QueuedEvent,
        state_bits::{
            AtomicStateBits, Completed, CompletedStages, Pending, PendingStages, Stage,
        },
    },
    context::SchedulerContext,
    dispatch::{CpuTask, IoTask, Priority},
    persistence::DecodedSnapshot,
};

/// What a stage handler did with its pending bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Prerequisites missing, the next stage may be considered
    NotReady,
    /// Work was handed to a pool
    Dispatched,
    /// Completed synchronously
    Finished,
}

/// Bits set when a unit of work completes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Transition {
    pub completed: CompletedStages,
    pub pending: PendingStages,
}

impl Transition {
    pub fn complete(stage: Stage) -> Self {
        Transition::default().and(stage)
    }

    /// Also marks `stage` completed.
    pub fn and(mut self, stage: Stage) -> Self {
        self.completed.set(stage);
        self
    }

    /// Requests `stage` next.
    pub fn then(mut self, stage: Stage) -> Self {
        self.pending.set(stage);
        self
    }
}

/// Lifecycle state of one chunk.
///
/// Pending and completed sets are read and written from both the driving
/// thread and the worker running the chunk's current task. The task-running
/// flag is what keeps the two apart: it is raised before work is submitted
/// and lowered only after the work's transition has been applied.
pub struct ChunkStateScheduler {
    pending: AtomicStateBits<Pending>,
    completed: AtomicStateBits<Completed>,
    task_running: AtomicBool,
    /// Stage of the task in flight, if any
    running_stage: AtomicCell<Option<Stage>>,
    queued_event: AtomicCell<Option<QueuedEvent>>,
}

impl ChunkStateScheduler {
    pub fn new() -> Self {
        ChunkStateScheduler {
            pending: AtomicStateBits::new(),
            completed: AtomicStateBits::new(),
            task_running: AtomicBool::new(false),
            running_stage: AtomicCell::new(None),
            queued_event: AtomicCell::new(None),
        }
    }

    pub fn init(&self) {
        self.pending.set(Stage::LoadData);
    }

    pub fn reset(&self) {
        assert!(
            !self.is_task_running(),
            "Chunk state reset while a task is in flight"
        );

        self.pending.clear();
        self.completed.clear();
        self.running_stage.store(None);
        self.queued_event.store(None);
    }

    pub fn can_update(&self) -> bool {
        !self.is_task_running() && !self.completed.check(Stage::Remove)
    }

    pub fn is_task_running(&self) -> bool {
        self.task_running.load(Ordering::Acquire)
    }

    pub fn pending(&self) -> PendingStages {
        self.pending.load()
    }

    pub fn completed(&self) -> CompletedStages {
        self.completed.load()
    }

    pub fn is_pending(&self, stage: Stage) -> bool {
        self.pending.check(stage)
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.completed.check(stage)
    }

    pub fn running_stage(&self) -> Option<Stage> {
        self.running_stage.load()
    }

    /// Completed, or being rebuilt right now.
    pub fn has_built(&self, stage: Stage) -> bool {
        self.completed.check(stage) || self.running_stage() == Some(stage)
    }

    pub fn request(&self, stage: Stage) {
        self.pending.set(stage);
    }

    /// The stage is requested either directly or through its immediate variant.
    fn is_requested(&self, stage: Stage) -> bool {
        let pending = self.pending.load();
        pending.check(stage) || stage.now_variant().is_some_and(|now| pending.check(now))
    }

    /// A stage that runs again is no longer completed until its new run finishes.
    fn take_request(&self, stage: Stage) {
        self.completed.reset(stage);
        self.pending.reset(stage);
        if let Some(now) = stage.now_variant() {
            self.pending.reset(now);
        }
    }

    pub(crate) fn queue_event(&self, event: QueuedEvent) {
        self.queued_event.store(Some(event));
    }

    fn apply(&self, transition: Transition) {
        self.completed.set_all(transition.completed);
        self.pending.set_all(transition.pending);
    }

    fn begin_task(&self, stage: Stage) {
        let was_running = self.task_running.swap(true, Ordering::AcqRel);
        assert!(!was_running, "Chunk already has a task in flight");
        self.running_stage.store(Some(stage));
    }

    fn finish_task(&self, transition: Transition) {
        self.apply(transition);
        self.running_stage.store(None);
        // Lowered last so the driving thread never sees a finished task without its results
        self.task_running.store(false, Ordering::Release);
    }

    /// Runs the first eligible stage. See `Chunk::update`.
    pub fn update(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) {
        assert!(
            !self.is_task_running(),
            "Chunk {:?} updated while a task is in flight",
            chunk.pos()
        );
        assert!(
            !self.completed.check(Stage::Remove),
            "Chunk {:?} updated after removal",
            chunk.pos()
        );

        if let Some(event) = self.queued_event.take() {
            chunk.fan_out(event);
        }

        if self.pending.check(Stage::Remove) && !self.completed.check(Stage::LoadData) {
            debug!("Chunk {:?} removed before loading", chunk.pos());
            self.apply(Transition::complete(Stage::Remove));
            self.pending.reset(Stage::Remove);
            return;
        }

        chunk.flush_rebuilds(ctx, ctx.tick_time());

        for stage in Stage::UPDATE_ORDER {
            if !self.is_requested(stage) {
                continue;
            }

            let outcome = self.run_stage(stage, chunk, ctx);
            if outcome != StageOutcome::NotReady {
                trace!("Chunk {:?}: {:?} {:?}", chunk.pos(), stage, outcome);
                return;
            }
        }
    }

    fn run_stage(&self, stage: Stage, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        match stage {
            Stage::LoadData => self.load_data(chunk, ctx),
            Stage::PrepareGenerate => self.prepare_generate(chunk, ctx),
            Stage::Generate => self.generate(chunk, ctx),
            Stage::PrepareSaveData => self.prepare_save_data(chunk, ctx),
            Stage::SaveData => self.save_data(chunk, ctx),
            Stage::Remove => self.remove(chunk),
            Stage::BuildCollider => self.build_collider(chunk, ctx),
            Stage::BuildVertices => self.build_vertices(chunk, ctx),
            Stage::BuildColliderNow | Stage::BuildVerticesNow => {
                unreachable!("{:?} is served by its base stage", stage)
            }
        }
    }

    fn dispatch_io<F>(&self, chunk: &ChunkHandle, ctx: &SchedulerContext, stage: Stage, work: F)
    where
        F: FnOnce(&Chunk) -> Transition + Send + 'static,
    {
        let task = IoTask {
            pos: chunk.pos(),
            stage,
        };

        self.take_request(stage);
        self.begin_task(stage);

        let handle = Arc::clone(chunk);
        ctx.dispatch().spawn_io(
            task,
            Box::new(move || {
                let transition = work(&handle);
                handle.scheduler.finish_task(transition);
            }),
        );
    }

    fn dispatch_cpu<F>(
        &self,
        chunk: &ChunkHandle,
        ctx: &SchedulerContext,
        stage: Stage,
        priority: Priority,
        work: F,
    ) where
        F: FnOnce(&Chunk) -> Transition + Send + 'static,
    {
        let task = CpuTask {
            pos: chunk.pos(),
            stage,
            affinity: chunk.affinity(),
            priority: ctx.next_priority(priority),
        };

        self.take_request(stage);
        self.begin_task(stage);

        let handle = Arc::clone(chunk);
        ctx.dispatch().spawn_cpu(
            task,
            Box::new(move || {
                let transition = work(&handle);
                handle.scheduler.finish_task(transition);
            }),
        );
    }

    /// Completes a stage on the driving thread.
    fn finish_now(&self, stage: Stage, transition: Transition) -> StageOutcome {
        self.take_request(stage);
        self.apply(transition);
        StageOutcome::Finished
    }

    fn load_data(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        let Some(store) = ctx.store().cloned() else {
            return self.finish_now(
                Stage::LoadData,
                Transition::complete(Stage::LoadData)
                    .and(Stage::PrepareGenerate)
                    .then(Stage::Generate),
            );
        };

        self.dispatch_io(chunk, ctx, Stage::LoadData, move |chunk| {
            let pos = chunk.pos();
            match store.read(pos) {
                Ok(Some(snapshot)) => {
                    debug!("Chunk {:?}: found saved data", pos);
                    chunk.store_loaded(snapshot);
                    Transition::complete(Stage::LoadData).then(Stage::PrepareGenerate)
                }
                Ok(None) => Transition::complete(Stage::LoadData)
                    .and(Stage::PrepareGenerate)
                    .then(Stage::Generate),
                Err(err) => {
                    warn!(
                        "Chunk {:?}: failed to read saved data: {:#}",
                        pos,
                        anyhow::Error::from(err)
                    );
                    Transition::complete(Stage::LoadData)
                        .and(Stage::PrepareGenerate)
                        .then(Stage::Generate)
                }
            }
        });
        StageOutcome::Dispatched
    }

    fn prepare_generate(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        if !self.completed.check(Stage::LoadData) {
            return StageOutcome::NotReady;
        }

        let world_version = ctx.config().world_version;
        self.dispatch_io(chunk, ctx, Stage::PrepareGenerate, move |chunk| {
            let Some(snapshot) = chunk.take_loaded() else {
                return Transition::complete(Stage::PrepareGenerate).then(Stage::Generate);
            };

            match snapshot.decode(world_version) {
                Ok(DecodedSnapshot::Differential(edits)) => {
                    debug!(
                        "Chunk {:?}: replaying {} saved edits",
                        chunk.pos(),
                        edits.len()
                    );
                    chunk.stage_restored_edits(edits);
                    Transition::complete(Stage::PrepareGenerate).then(Stage::Generate)
                }
                Ok(DecodedSnapshot::Full(blocks)) => {
                    chunk.restore_full(&blocks);
                    chunk.scheduler.queue_event(QueuedEvent::Generated);
                    Transition::complete(Stage::PrepareGenerate)
                        .and(Stage::Generate)
                        .then(Stage::BuildVertices)
                }
                Err(err) => {
                    debug!(
                        "Chunk {:?}: discarding saved data: {}",
                        chunk.pos(),
                        err
                    );
                    Transition::complete(Stage::PrepareGenerate).then(Stage::Generate)
                }
            }
        });
        StageOutcome::Dispatched
    }

    fn generate(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        if !self.completed.check(Stage::LoadData) {
            return StageOutcome::NotReady;
        }

        let generator = ctx.generator().clone();
        self.dispatch_cpu(
            chunk,
            ctx,
            Stage::Generate,
            Priority::Background,
            move |chunk| {
                chunk.generate(generator.as_ref());
                chunk.scheduler.queue_event(QueuedEvent::Generated);
                Transition::complete(Stage::Generate).then(Stage::BuildVertices)
            },
        );
        StageOutcome::Dispatched
    }

    fn prepare_save_data(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        if !self.completed.check(Stage::Generate) {
            return StageOutcome::NotReady;
        }

        if ctx.store().is_none() || !chunk.has_modifications() {
            return self.finish_now(
                Stage::PrepareSaveData,
                Transition::complete(Stage::PrepareSaveData).and(Stage::SaveData),
            );
        }

        let world_version = ctx.config().world_version;
        self.dispatch_cpu(
            chunk,
            ctx,
            Stage::PrepareSaveData,
            Priority::Background,
            move |chunk| match chunk.build_snapshot(world_version) {
                Some(snapshot) => {
                    chunk.store_prepared(snapshot);
                    Transition::complete(Stage::PrepareSaveData).then(Stage::SaveData)
                }
                None => Transition::complete(Stage::PrepareSaveData).and(Stage::SaveData),
            },
        );
        StageOutcome::Dispatched
    }

    fn save_data(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        if !self.completed.check(Stage::PrepareSaveData) {
            return StageOutcome::NotReady;
        }

        let Some(store) = ctx.store().cloned() else {
            return self.finish_now(Stage::SaveData, Transition::complete(Stage::SaveData));
        };

        self.dispatch_io(chunk, ctx, Stage::SaveData, move |chunk| {
            let pos = chunk.pos();
            let Some(snapshot) = chunk.take_prepared() else {
                return Transition::complete(Stage::SaveData);
            };

            match store.write(pos, snapshot) {
                Ok(()) => {
                    debug!("Chunk {:?}: saved", pos);
                    chunk.scheduler.queue_event(QueuedEvent::Saved);
                }
                Err(err) => {
                    warn!(
                        "Chunk {:?}: dropping save after write failure: {:#}",
                        pos,
                        anyhow::Error::from(err)
                    );
                }
            }
            Transition::complete(Stage::SaveData)
        });
        StageOutcome::Dispatched
    }

    fn remove(&self, chunk: &ChunkHandle) -> StageOutcome {
        if self.completed.check(Stage::Generate) {
            let saving = PendingStages::of(&[Stage::PrepareSaveData, Stage::SaveData]);
            if !self.completed.check(Stage::LoadData) || self.pending.load().intersects(saving) {
                return StageOutcome::NotReady;
            }
        }

        debug!("Chunk {:?} removed", chunk.pos());
        self.apply(Transition::complete(Stage::Remove));
        self.pending.reset(Stage::Remove);
        StageOutcome::Finished
    }

    fn geometry_ready(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> bool {
        self.completed.check(Stage::Generate)
            && chunk.synchronize_neighbors()
            && chunk.synchronize_edges(ctx)
    }

    fn geometry_priority(&self, stage: Stage) -> Priority {
        let immediate = stage
            .now_variant()
            .is_some_and(|now| self.pending.check(now));
        if immediate {
            Priority::Immediate
        } else {
            Priority::Background
        }
    }

    fn build_collider(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        if !self.geometry_ready(chunk, ctx) {
            return StageOutcome::NotReady;
        }

        if chunk.non_empty_blocks() == 0 {
            chunk.clear_collider();
            return self.finish_now(
                Stage::BuildCollider,
                Transition::complete(Stage::BuildCollider),
            );
        }

        let priority = self.geometry_priority(Stage::BuildCollider);
        let builder = ctx.collider_builder().clone();
        self.dispatch_cpu(chunk, ctx, Stage::BuildCollider, priority, move |chunk| {
            chunk.build_collider(builder.as_ref());
            Transition::complete(Stage::BuildCollider)
        });
        StageOutcome::Dispatched
    }

    fn build_vertices(&self, chunk: &ChunkHandle, ctx: &SchedulerContext) -> StageOutcome {
        if !chunk.is_visible() || !self.geometry_ready(chunk, ctx) {
            return StageOutcome::NotReady;
        }

        if chunk.non_empty_blocks() == 0 {
            chunk.clear_vertices();
            return self.finish_now(
                Stage::BuildVertices,
                Transition::complete(Stage::BuildVertices),
            );
        }

        let priority = self.geometry_priority(Stage::BuildVertices);
        let builder = ctx.mesh_builder().clone();
        self.dispatch_cpu(chunk, ctx, Stage::BuildVertices, priority, move |chunk| {
            chunk.build_vertices(builder.as_ref());
            Transition::complete(Stage::BuildVertices)
        });
        StageOutcome::Dispatched
    }
}

impl Default for ChunkStateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChunkStateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkStateScheduler")
            .field("pending", &self.pending())
            .field("completed", &self.completed())
            .field("task_running", &self.is_task_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        path::PathBuf,
        time::{Duration, Instant},
    };

    use glam::IVec3;

    use super::*;
    use crate::{
        chunk::events::ChunkEvent,
        context::{Collaborators, testing::deferred_context_with, testing::test_config},
        config::SchedulerConfig,
        dispatch::{AffinityKey, DeferredDispatch, Submission},
        persistence::{MemoryStore, PersistenceError, PersistenceStore, Snapshot},
        sync::lock,
        voxels::{
            block::Block,
            block_buffer::BlockBuffer,
            coord::{ChunkPos, LocalPos},
            face::Face,
        },
        worldgen::{EmptyTerrainGenerator, FlatTerrainGenerator, TerrainGenerator},
    };

    struct FailingStore;

    fn unavailable() -> PersistenceError {
        PersistenceError::Io {
            path: PathBuf::from("unavailable"),
            source: std::io::Error::other("device unavailable"),
        }
    }

    impl PersistenceStore for FailingStore {
        fn read(&self, _pos: ChunkPos) -> Result<Option<Snapshot>, PersistenceError> {
            Err(unavailable())
        }

        fn write(&self, _pos: ChunkPos, _snapshot: Snapshot) -> Result<(), PersistenceError> {
            Err(unavailable())
        }
    }

    struct Harness {
        ctx: SchedulerContext,
        dispatch: Arc<DeferredDispatch>,
        chunks: Vec<ChunkHandle>,
    }

    impl Harness {
        fn with_config(config: SchedulerConfig, collaborators: Collaborators) -> Self {
            let (ctx, dispatch) = deferred_context_with(config, collaborators);
            Harness {
                ctx,
                dispatch,
                chunks: Vec::new(),
            }
        }

        fn single(collaborators: Collaborators) -> Self {
            let mut harness = Self::with_config(test_config(), collaborators);
            harness.add(ChunkPos::new(0, 0, 0));
            harness
        }

        /// A center chunk with all six neighbors linked.
        fn cross(collaborators: Collaborators) -> Self {
            let mut harness = Self::single(collaborators);
            for face in Face::ALL {
                let neighbor = harness.add(ChunkPos::new(0, 0, 0).get_neighbor(face));
                harness.center().subscribe(face, &neighbor);
            }
            harness
        }

        fn add(&mut self, pos: ChunkPos) -> ChunkHandle {
            let chunk = Arc::new(Chunk::new(self.ctx.next_affinity_key()));
            chunk.init(pos);
            self.chunks.push(chunk.clone());
            chunk
        }

        fn center(&self) -> &ChunkHandle {
            &self.chunks[0]
        }

        fn neighbor(&self, face: Face) -> ChunkHandle {
            self.center().neighbor(face).unwrap()
        }

        fn tick(&self) {
            self.ctx.begin_tick(Instant::now());
            for chunk in &self.chunks {
                if chunk.can_update() {
                    chunk.update(&self.ctx);
                }
            }
        }

        fn settle(&self) {
            for _ in 0..32 {
                self.tick();
                self.dispatch.run_all();
            }
        }

        fn submissions_for(&self, pos: ChunkPos, stage: Stage) -> Vec<Submission> {
            self.dispatch
                .history()
                .into_iter()
                .filter(|submission| submission.pos() == pos && submission.stage() == stage)
                .collect()
        }
    }

    fn flat() -> Collaborators {
        Collaborators::new(Arc::new(FlatTerrainGenerator::new(8)))
    }

    fn empty() -> Collaborators {
        Collaborators::new(Arc::new(EmptyTerrainGenerator))
    }

    fn with_store(generator: impl TerrainGenerator, store: Arc<dyn PersistenceStore>) -> Collaborators {
        Collaborators::new(Arc::new(generator)).with_store(store)
    }

    #[test]
    fn load_without_store_completes_synchronously() {
        let harness = Harness::single(flat());
        let chunk = harness.center();

        harness.tick();
        assert_eq!(harness.dispatch.queued(), 0);
        assert!(chunk.completed().check(Stage::LoadData));
        assert!(chunk.completed().check(Stage::PrepareGenerate));
        assert!(chunk.pending().check(Stage::Generate));

        harness.tick();
        match harness.dispatch.queued_submissions().as_slice() {
            [Submission::Cpu(task)] => {
                assert_eq!(task.stage, Stage::Generate);
                assert_eq!(task.affinity, chunk.affinity());
                assert_eq!(task.priority.priority, Priority::Background);
            }
            other => panic!("Expected a single generation task, got {:?}", other),
        }
    }

    #[test]
    fn one_task_in_flight_per_chunk() {
        let harness = Harness::single(flat());
        let chunk = harness.center();
        harness.tick();
        harness.tick();

        assert!(chunk.is_task_running());
        assert!(!chunk.can_update());

        harness.tick();
        assert_eq!(harness.dispatch.queued(), 1);

        harness.dispatch.run_all();
        assert!(!chunk.is_task_running());
        assert!(chunk.completed().check(Stage::Generate));
        assert!(chunk.pending().check(Stage::BuildVertices));
    }

    #[test]
    #[should_panic(expected = "in flight")]
    fn updating_a_busy_chunk_is_fatal() {
        let harness = Harness::single(flat());
        harness.tick();
        harness.tick();
        harness.center().update(&harness.ctx);
    }

    #[test]
    fn stages_complete_in_order() {
        let store = Arc::new(MemoryStore::new());
        let harness = Harness::cross(with_store(FlatTerrainGenerator::new(8), store.clone()));
        let chunk = harness.center().clone();
        chunk.request_collider(false);
        chunk.set_block(LocalPos::new(3, 12, 3), Block::DIRT);
        chunk.request_save();

        let prerequisites = [
            (Stage::PrepareGenerate, Stage::LoadData),
            (Stage::Generate, Stage::LoadData),
            (Stage::PrepareSaveData, Stage::Generate),
            (Stage::SaveData, Stage::PrepareSaveData),
            (Stage::BuildCollider, Stage::Generate),
            (Stage::BuildVertices, Stage::Generate),
        ];

        let mut previous = CompletedStages::empty();
        for _ in 0..32 {
            harness.tick();
            while harness.dispatch.run_next().is_some() {
                let completed = chunk.completed();
                for (stage, prerequisite) in prerequisites {
                    if completed.check(stage) {
                        assert!(completed.check(prerequisite), "{:?} before {:?}", stage, prerequisite);
                    }
                }
                // Completed bits are never taken back
                assert_eq!(completed.bits() & previous.bits(), previous.bits());
                previous = completed;
            }
        }

        for stage in [
            Stage::LoadData,
            Stage::PrepareGenerate,
            Stage::Generate,
            Stage::PrepareSaveData,
            Stage::SaveData,
            Stage::BuildCollider,
            Stage::BuildVertices,
        ] {
            assert!(chunk.completed().check(stage), "{:?} never completed", stage);
        }
        assert!(chunk.pending().is_empty());
        assert_eq!(store.writes(), 1);
    }

    #[test]
    fn removal_before_load_skips_all_work() {
        let store = Arc::new(MemoryStore::new());
        let harness = Harness::single(with_store(FlatTerrainGenerator::new(8), store));
        let chunk = harness.center();
        chunk.request_removal();

        harness.tick();
        assert!(chunk.completed().check(Stage::Remove));
        assert!(!chunk.pending().check(Stage::Remove));
        assert!(!chunk.can_update());
        assert!(harness.dispatch.history().is_empty());
    }

    #[test]
    fn removal_waits_for_save() {
        let store = Arc::new(MemoryStore::new());
        let harness = Harness::single(with_store(FlatTerrainGenerator::new(8), store.clone()));
        let chunk = harness.center();
        let events = chunk.subscribe_events();
        harness.settle();
        assert!(chunk.completed().check(Stage::Generate));

        chunk.set_block(LocalPos::new(5, 9, 5), Block::GRASS);
        chunk.request_save();
        chunk.request_removal();

        harness.tick();
        assert_eq!(harness.dispatch.queued_submissions()[0].stage(), Stage::PrepareSaveData);
        harness.dispatch.run_all();
        assert!(!chunk.completed().check(Stage::Remove));

        harness.tick();
        assert_eq!(harness.dispatch.queued_submissions()[0].stage(), Stage::SaveData);
        assert!(!chunk.completed().check(Stage::Remove));
        harness.dispatch.run_all();

        harness.tick();
        assert!(chunk.completed().check(Stage::Remove));
        assert_eq!(events.try_recv(), Ok(ChunkEvent::Saved(ChunkPos::new(0, 0, 0))));
        assert_eq!(
            store.get(ChunkPos::new(0, 0, 0)),
            Some(Snapshot::differential(1, [(LocalPos::new(5, 9, 5), Block::GRASS)]))
        );
    }

    #[test]
    fn unmodified_chunk_skips_the_write() {
        let store = Arc::new(MemoryStore::new());
        let harness = Harness::single(with_store(FlatTerrainGenerator::new(8), store.clone()));
        let chunk = harness.center();
        harness.settle();

        chunk.request_save();
        harness.tick();
        assert!(chunk.completed().check(Stage::PrepareSaveData));
        assert!(chunk.completed().check(Stage::SaveData));
        assert!(harness.submissions_for(chunk.pos(), Stage::SaveData).is_empty());
        assert_eq!(store.writes(), 0);
    }

    #[test]
    fn saved_edits_are_replayed_on_load() {
        let store = Arc::new(MemoryStore::new());
        let pos = ChunkPos::new(0, 0, 0);
        store.insert(
            pos,
            Snapshot::differential(
                1,
                [
                    (LocalPos::new(4, 4, 4), Block::AIR),
                    (LocalPos::new(4, 12, 4), Block::GRASS),
                ],
            ),
        );

        let harness = Harness::single(with_store(FlatTerrainGenerator::new(8), store));
        let chunk = harness.center();
        // Made while loading, so newer than the saved edit
        chunk.set_block(LocalPos::new(4, 12, 4), Block::STONE);
        harness.settle();

        assert!(chunk.get_block(LocalPos::new(4, 4, 4)).is_air());
        assert_eq!(chunk.get_block(LocalPos::new(4, 12, 4)), Block::STONE);
        assert!(chunk.has_modifications());
        assert_eq!(chunk.non_empty_blocks(), 16 * 16 * 8);
    }

    #[test]
    fn full_snapshot_replaces_generation() {
        let store = Arc::new(MemoryStore::new());
        let pos = ChunkPos::new(0, 0, 0);
        let mut saved = BlockBuffer::new();
        saved.set(LocalPos::new(1, 1, 1), Block::STONE);
        store.insert(pos, Snapshot::full(1, &saved));

        let harness = Harness::single(with_store(EmptyTerrainGenerator, store));
        harness.settle();

        let chunk = harness.center();
        assert_eq!(chunk.get_block(LocalPos::new(1, 1, 1)), Block::STONE);
        assert!(chunk.completed().check(Stage::Generate));
        assert!(harness.submissions_for(pos, Stage::Generate).is_empty());
    }

    #[test]
    fn full_snapshot_from_another_world_version_is_ignored() {
        let store = Arc::new(MemoryStore::new());
        let pos = ChunkPos::new(0, 0, 0);
        let mut saved = BlockBuffer::new();
        saved.set(LocalPos::new(1, 1, 1), Block::STONE);
        store.insert(pos, Snapshot::full(7, &saved));

        let harness = Harness::single(with_store(EmptyTerrainGenerator, store));
        harness.settle();

        let chunk = harness.center();
        assert!(chunk.get_block(LocalPos::new(1, 1, 1)).is_air());
        assert_eq!(harness.submissions_for(pos, Stage::Generate).len(), 1);
    }

    #[test]
    fn store_failures_are_not_fatal() {
        let harness = Harness::single(with_store(
            FlatTerrainGenerator::new(8),
            Arc::new(FailingStore),
        ));
        let chunk = harness.center();
        let events = chunk.subscribe_events();
        harness.settle();
        assert!(chunk.completed().check(Stage::Generate));

        chunk.set_block(LocalPos::new(0, 15, 0), Block::DIRT);
        chunk.request_save();
        harness.settle();

        assert!(chunk.completed().check(Stage::SaveData));
        assert!(events.try_recv().is_err());
        assert!(chunk.can_update());
    }

    #[test]
    fn empty_chunk_skips_geometry_builders() {
        let harness = Harness::cross(empty());
        let chunk = harness.center();
        chunk.request_collider(false);
        harness.settle();

        assert!(chunk.completed().check(Stage::BuildVertices));
        assert!(chunk.completed().check(Stage::BuildCollider));
        assert!(harness.submissions_for(chunk.pos(), Stage::BuildVertices).is_empty());
        assert!(harness.submissions_for(chunk.pos(), Stage::BuildCollider).is_empty());
        assert!(chunk.take_render_geometry().unwrap().is_empty());
    }

    #[test]
    fn geometry_waits_for_all_neighbors() {
        let mut harness = Harness::single(flat());
        for face in &Face::ALL[..5] {
            let neighbor = harness.add(ChunkPos::new(0, 0, 0).get_neighbor(*face));
            harness.center().subscribe(*face, &neighbor);
        }
        harness.settle();

        let chunk = harness.center().clone();
        assert!(chunk.completed().check(Stage::Generate));
        assert!(!chunk.synchronize_neighbors());
        assert!(chunk.pending().check(Stage::BuildVertices));
        assert!(!chunk.completed().check(Stage::BuildVertices));

        let last = harness.add(ChunkPos::new(0, 0, 0).get_neighbor(Face::Back));
        chunk.subscribe(Face::Back, &last);
        harness.settle();

        assert!(chunk.completed().check(Stage::BuildVertices));
        let geometry = chunk.take_render_geometry().unwrap();
        // Only the top of the flat terrain is exposed; every side is covered by padding
        assert_eq!(geometry.face_count(), 16 * 16);
    }

    #[test]
    fn invisible_chunk_defers_vertices() {
        let harness = Harness::cross(flat());
        let chunk = harness.center();
        chunk.set_visible(false);
        harness.settle();

        assert!(chunk.synchronize_neighbors());
        assert!(chunk.pending().check(Stage::BuildVertices));
        assert!(!chunk.completed().check(Stage::BuildVertices));

        chunk.set_visible(true);
        harness.settle();
        assert!(chunk.completed().check(Stage::BuildVertices));
    }

    #[test]
    fn immediate_requests_use_immediate_tokens() {
        let harness = Harness::cross(flat());
        let chunk = harness.center();
        harness.settle();
        harness.dispatch.take_history();

        chunk.request_vertices(true);
        harness.tick();

        match harness.submissions_for(chunk.pos(), Stage::BuildVertices).as_slice() {
            [Submission::Cpu(task)] => assert_eq!(task.priority.priority, Priority::Immediate),
            other => panic!("Expected one vertex build, got {:?}", other),
        }
        assert!(!chunk.pending().check(Stage::BuildVerticesNow));
        assert!(!chunk.pending().check(Stage::BuildVertices));
    }

    #[test]
    fn edge_sync_copies_neighbor_faces() {
        let harness = Harness::cross(flat());
        harness.settle();
        let chunk = harness.center();

        // Flat terrain fills y < 8 in every chunk of the y = 0 layer
        assert_eq!(chunk.block_padded(IVec3::new(-1, 7, 3)), Block::STONE);
        assert!(chunk.block_padded(IVec3::new(16, 8, 3)).is_air());
        // The chunk below is completely solid
        assert_eq!(chunk.block_padded(IVec3::new(5, -1, 5)), Block::STONE);
        assert!(chunk.block_padded(IVec3::new(5, 16, 5)).is_air());
    }

    #[test]
    fn border_edits_are_mirrored_both_ways() {
        let harness = Harness::cross(flat());
        harness.settle();
        let chunk = harness.center();
        let left = harness.neighbor(Face::Left);
        let top = harness.neighbor(Face::Top);
        let front = harness.neighbor(Face::Front);

        chunk.set_block(LocalPos::new(0, 12, 5), Block::DIRT);
        assert_eq!(left.block_padded(IVec3::new(16, 12, 5)), Block::DIRT);

        left.set_block(LocalPos::new(15, 13, 5), Block::GRASS);
        assert_eq!(chunk.block_padded(IVec3::new(-1, 13, 5)), Block::GRASS);

        // A corner cell touches three neighbors
        chunk.set_block(LocalPos::new(0, 15, 0), Block::STONE);
        assert_eq!(left.block_padded(IVec3::new(16, 15, 0)), Block::STONE);
        assert_eq!(top.block_padded(IVec3::new(0, -1, 0)), Block::STONE);
        assert_eq!(front.block_padded(IVec3::new(0, 15, 16)), Block::STONE);

        // Interior edits touch nobody
        chunk.set_block(LocalPos::new(8, 12, 8), Block::STONE);
        assert!(left.block_padded(IVec3::new(16, 12, 8)).is_air());
    }

    #[test]
    fn rebuilds_are_rate_limited() {
        let harness = Harness::cross(flat());
        harness.settle();
        let chunk = harness.center();
        let right = harness.neighbor(Face::Right);
        assert!(!chunk.pending().check(Stage::BuildVertices));

        let start = Instant::now();
        chunk.set_block(LocalPos::new(15, 10, 10), Block::DIRT);
        chunk.flush_rebuilds(&harness.ctx, start);
        assert!(chunk.pending().check(Stage::BuildVertices));
        assert!(right.pending().check(Stage::BuildVertices));
        // Neither chunk has built a collider, so none is requested
        assert!(!chunk.pending().check(Stage::BuildCollider));
        assert!(!right.pending().check(Stage::BuildCollider));

        chunk.set_block(LocalPos::new(15, 11, 10), Block::DIRT);
        chunk.flush_rebuilds(&harness.ctx, start + Duration::from_millis(50));
        assert!(!lock(&chunk.edges).vertices.mask().is_empty());

        chunk.flush_rebuilds(&harness.ctx, start + Duration::from_millis(100));
        assert!(lock(&chunk.edges).vertices.mask().is_empty());
        // The collider interval has not passed yet
        assert!(!lock(&chunk.edges).collider.mask().is_empty());

        chunk.flush_rebuilds(&harness.ctx, start + Duration::from_millis(250));
        assert!(lock(&chunk.edges).collider.mask().is_empty());
    }

    #[test]
    fn collider_flush_only_targets_chunks_with_colliders() {
        let harness = Harness::cross(flat());
        let chunk = harness.center();
        chunk.request_collider(false);
        harness.settle();
        assert!(chunk.completed().check(Stage::BuildCollider));
        assert!(chunk.take_collider_geometry().is_some());

        chunk.set_block(LocalPos::new(8, 8, 8), Block::DIRT);
        chunk.flush_rebuilds(&harness.ctx, Instant::now());
        assert!(chunk.pending().check(Stage::BuildCollider));

        harness.settle();
        assert_eq!(harness.submissions_for(chunk.pos(), Stage::BuildCollider).len(), 2);
    }

    #[test]
    fn rebuild_in_flight_is_not_completed() {
        let harness = Harness::cross(flat());
        harness.settle();
        let chunk = harness.center();
        assert!(chunk.completed().check(Stage::BuildVertices));

        chunk.request_vertices(false);
        harness.tick();
        assert!(chunk.is_task_running());
        assert_eq!(chunk.scheduler().running_stage(), Some(Stage::BuildVertices));
        assert!(!chunk.completed().check(Stage::BuildVertices));
        assert!(chunk.scheduler().has_built(Stage::BuildVertices));

        harness.dispatch.run_all();
        assert!(chunk.completed().check(Stage::BuildVertices));
        assert_eq!(chunk.scheduler().running_stage(), None);
    }

    #[test]
    fn edits_during_collider_rebuild_request_another() {
        let harness = Harness::cross(flat());
        let chunk = harness.center();
        chunk.request_collider(false);
        harness.settle();

        chunk.request_collider(false);
        harness.tick();
        assert_eq!(chunk.scheduler().running_stage(), Some(Stage::BuildCollider));
        assert!(!chunk.completed().check(Stage::BuildCollider));

        chunk.set_block(LocalPos::new(8, 8, 8), Block::DIRT);
        chunk.flush_rebuilds(&harness.ctx, Instant::now());
        assert!(chunk.pending().check(Stage::BuildCollider));

        harness.settle();
        assert!(chunk.completed().check(Stage::BuildCollider));
        assert_eq!(harness.submissions_for(chunk.pos(), Stage::BuildCollider).len(), 3);
    }

    #[test]
    fn regenerated_neighbor_triggers_rebuild() {
        let mut harness = Harness::cross(flat());
        harness.settle();
        let chunk = harness.center().clone();
        assert_eq!(harness.submissions_for(chunk.pos(), Stage::BuildVertices).len(), 1);

        chunk.unsubscribe(Face::Top);
        let replacement = harness.add(ChunkPos::new(0, 1, 0));
        chunk.subscribe(Face::Top, &replacement);
        harness.settle();

        assert!(replacement.completed().check(Stage::Generate));
        assert_eq!(harness.submissions_for(chunk.pos(), Stage::BuildVertices).len(), 2);
    }

    #[test]
    fn transitions_compose() {
        let transition = Transition::complete(Stage::LoadData)
            .and(Stage::PrepareGenerate)
            .then(Stage::Generate);
        assert_eq!(
            transition.completed,
            CompletedStages::of(&[Stage::LoadData, Stage::PrepareGenerate])
        );
        assert_eq!(transition.pending, PendingStages::of(&[Stage::Generate]));
    }

    #[test]
    fn reset_clears_queued_event() {
        let harness = Harness::single(flat());
        let chunk = harness.center();
        harness.tick();
        harness.tick();
        harness.dispatch.run_all();
        assert!(chunk.scheduler().queued_event.load().is_some());

        chunk.reset();
        assert!(chunk.scheduler().queued_event.load().is_none());
        assert_eq!(chunk.affinity(), AffinityKey(0));
    }
}

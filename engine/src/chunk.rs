use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use crossbeam::atomic::AtomicCell;
use glam::IVec3;

use crate::{
    chunk::{
        edges::EdgeState,
        events::ChunkObservers,
        neighbors::NeighborTable,
        scheduler::ChunkStateScheduler,
        state_bits::{CompletedStages, PendingStages, Stage},
    },
    context::SchedulerContext,
    dispatch::AffinityKey,
    mesh_generation::{ColliderBuilder, GeometryBuffer, MeshBuilder},
    persistence::Snapshot,
    sync::{lock, read, write},
    voxels::{block::Block, block_buffer::BlockBuffer, coord::{ChunkPos, LocalPos}},
    worldgen::TerrainGenerator,
};

pub mod edges;
pub mod events;
pub mod neighbors;
pub mod pool;
pub mod scheduler;
pub mod state_bits;

pub type ChunkHandle = Arc<Chunk>;

/// Persistence bookkeeping of a chunk. Always locked before `blocks`.
#[derive(Default)]
struct PersistState {
    /// Read by LoadData, consumed by PrepareGenerate
    loaded: Option<Snapshot>,
    /// Built by PrepareSaveData, consumed by SaveData
    prepared: Option<Snapshot>,
    /// Edits made before generation committed, oldest first
    staged_edits: Vec<(LocalPos, Block)>,
    /// Every block changed since generation, keyed by interior index
    modified: BTreeMap<u16, Block>,
    /// Set once generated or restored terrain is in the buffer
    committed: bool,
    /// Terrain came from a full snapshot instead of the generator
    full_restore: bool,
}

/// A `CHUNK_SIZE`³ volume of blocks and the state of its lifecycle.
///
/// Chunks are shared between the driving thread and at most one worker task at
/// a time. They are recycled through `ChunkPool`, so a handle may outlive the
/// chunk's time at a given position.
pub struct Chunk {
    pos: AtomicCell<ChunkPos>,
    affinity: AffinityKey,
    scheduler: ChunkStateScheduler,
    blocks: RwLock<BlockBuffer>,
    non_empty_blocks: AtomicU32,
    visible: AtomicBool,
    neighbors: Mutex<NeighborTable>,
    edges: Mutex<EdgeState>,
    persistence: Mutex<PersistState>,
    observers: Mutex<ChunkObservers>,
    render_geometry: Mutex<Option<GeometryBuffer>>,
    collider_geometry: Mutex<Option<GeometryBuffer>>,
}

impl Chunk {
    pub fn new(affinity: AffinityKey) -> Self {
        Chunk {
            pos: AtomicCell::new(ChunkPos::default()),
            affinity,
            scheduler: ChunkStateScheduler::new(),
            blocks: RwLock::new(BlockBuffer::new()),
            non_empty_blocks: AtomicU32::new(0),
            visible: AtomicBool::new(false),
            neighbors: Mutex::new(NeighborTable::default()),
            edges: Mutex::new(EdgeState::default()),
            persistence: Mutex::new(PersistState::default()),
            observers: Mutex::new(ChunkObservers::default()),
            render_geometry: Mutex::new(None),
            collider_geometry: Mutex::new(None),
        }
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos.load()
    }

    pub fn affinity(&self) -> AffinityKey {
        self.affinity
    }

    pub fn scheduler(&self) -> &ChunkStateScheduler {
        &self.scheduler
    }

    /// Places a fresh or reset chunk at `pos` and starts its lifecycle.
    pub fn init(&self, pos: ChunkPos) {
        assert!(
            self.scheduler.pending().is_empty() && self.scheduler.completed().is_empty(),
            "Chunk initialized at {:?} without being reset",
            pos
        );

        self.pos.store(pos);
        self.visible.store(true, Ordering::Release);
        self.scheduler.init();
    }

    /// Erases all soft state so the chunk can be reused. Idempotent.
    pub fn reset(&self) {
        self.scheduler.reset();
        self.unsubscribe_all();
        lock(&self.edges).reset();
        *lock(&self.persistence) = PersistState::default();
        lock(&self.observers).clear();
        *lock(&self.render_geometry) = None;
        *lock(&self.collider_geometry) = None;
        write(&self.blocks).clear();
        self.non_empty_blocks.store(0, Ordering::Release);
        self.visible.store(false, Ordering::Release);
    }

    pub fn can_update(&self) -> bool {
        self.scheduler.can_update()
    }

    /// Advances the lifecycle by at most one stage. Call once per tick on the driving thread.
    pub fn update(self: &Arc<Self>, ctx: &SchedulerContext) {
        self.scheduler.update(self, ctx);
    }

    pub fn pending(&self) -> PendingStages {
        self.scheduler.pending()
    }

    pub fn completed(&self) -> CompletedStages {
        self.scheduler.completed()
    }

    pub fn is_task_running(&self) -> bool {
        self.scheduler.is_task_running()
    }

    /// Persists the chunk. The save is skipped if nothing changed since generation.
    pub fn request_save(&self) {
        self.scheduler.request(Stage::PrepareSaveData);
    }

    pub fn request_removal(&self) {
        self.scheduler.request(Stage::Remove);
    }

    pub fn request_collider(&self, immediate: bool) {
        self.scheduler.request(if immediate {
            Stage::BuildColliderNow
        } else {
            Stage::BuildCollider
        });
    }

    pub fn request_vertices(&self, immediate: bool) {
        self.scheduler.request(if immediate {
            Stage::BuildVerticesNow
        } else {
            Stage::BuildVertices
        });
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Acquire)
    }

    /// Invisible chunks keep their vertex request pending until they become visible again.
    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::Release);
    }

    pub fn non_empty_blocks(&self) -> u32 {
        self.non_empty_blocks.load(Ordering::Acquire)
    }

    pub fn get_block(&self, pos: LocalPos) -> Block {
        read(&self.blocks).get(pos)
    }

    /// Reads any cell of the padded buffer, including mirrored neighbor data.
    pub fn block_padded(&self, pos: IVec3) -> Block {
        read(&self.blocks).get_padded(pos)
    }

    /// Writes a block. Before generation has committed, the edit is staged and
    /// applied on top of the generated terrain.
    pub fn set_block(&self, pos: LocalPos, block: Block) {
        {
            let mut persistence = lock(&self.persistence);
            if !persistence.committed {
                persistence.staged_edits.push((pos, block));
                return;
            }

            let previous = write(&self.blocks).set(pos, block);
            if previous == block {
                return;
            }

            match (previous.is_air(), block.is_air()) {
                (true, false) => {
                    self.non_empty_blocks.fetch_add(1, Ordering::AcqRel);
                }
                (false, true) => {
                    self.non_empty_blocks.fetch_sub(1, Ordering::AcqRel);
                }
                _ => {}
            }
            persistence.modified.insert(pos.to_index() as u16, block);
        }

        self.mirror_edit(pos, block);
    }

    /// Geometry built since the last call, if any.
    pub fn take_render_geometry(&self) -> Option<GeometryBuffer> {
        lock(&self.render_geometry).take()
    }

    pub fn take_collider_geometry(&self) -> Option<GeometryBuffer> {
        lock(&self.collider_geometry).take()
    }

    pub fn has_modifications(&self) -> bool {
        !lock(&self.persistence).modified.is_empty()
    }

    pub fn staged_edit_count(&self) -> usize {
        lock(&self.persistence).staged_edits.len()
    }

    // Stage work below runs on worker threads.

    pub(crate) fn store_loaded(&self, snapshot: Snapshot) {
        lock(&self.persistence).loaded = Some(snapshot);
    }

    pub(crate) fn take_loaded(&self) -> Option<Snapshot> {
        lock(&self.persistence).loaded.take()
    }

    /// Queues edits read from a differential snapshot ahead of edits made since loading began.
    pub(crate) fn stage_restored_edits(&self, edits: Vec<(LocalPos, Block)>) {
        let mut persistence = lock(&self.persistence);
        persistence.staged_edits.splice(0..0, edits);
    }

    #[profiling::function]
    pub(crate) fn restore_full(&self, blocks: &[Block]) {
        {
            let mut persistence = lock(&self.persistence);
            persistence.full_restore = true;
            write(&self.blocks).load_interior(blocks);
        }
        self.commit_staged_edits();
    }

    #[profiling::function]
    pub(crate) fn generate(&self, generator: &dyn TerrainGenerator) {
        let pos = self.pos();
        {
            let mut blocks = write(&self.blocks);
            blocks.clear_interior();
            generator.generate(pos, &mut blocks);
        }
        self.commit_staged_edits();
    }

    fn commit_staged_edits(&self) {
        let mut persistence = lock(&self.persistence);
        let state = &mut *persistence;
        let mut blocks = write(&self.blocks);

        for (pos, block) in state.staged_edits.drain(..) {
            blocks.set(pos, block);
            state.modified.insert(pos.to_index() as u16, block);
        }
        state.committed = true;

        self.non_empty_blocks
            .store(blocks.count_non_empty(), Ordering::Release);
    }

    /// Snapshot of everything changed since generation, or `None` if nothing was.
    pub(crate) fn build_snapshot(&self, world_version: u32) -> Option<Snapshot> {
        let persistence = lock(&self.persistence);
        if persistence.modified.is_empty() {
            return None;
        }

        if persistence.full_restore {
            // The generator cannot reproduce this terrain, so store all of it
            return Some(Snapshot::full(world_version, &read(&self.blocks)));
        }

        Some(Snapshot::differential(
            world_version,
            persistence.modified.iter().filter_map(|(index, block)| {
                LocalPos::from_index(*index as usize).map(|pos| (pos, *block))
            }),
        ))
    }

    pub(crate) fn store_prepared(&self, snapshot: Snapshot) {
        lock(&self.persistence).prepared = Some(snapshot);
    }

    pub(crate) fn take_prepared(&self) -> Option<Snapshot> {
        lock(&self.persistence).prepared.take()
    }

    #[profiling::function]
    pub(crate) fn build_vertices(&self, builder: &dyn MeshBuilder) {
        let mut geometry = GeometryBuffer::new();
        builder.build(self.pos(), &read(&self.blocks), &mut geometry);
        *lock(&self.render_geometry) = Some(geometry);
    }

    #[profiling::function]
    pub(crate) fn build_collider(&self, builder: &dyn ColliderBuilder) {
        let mut geometry = GeometryBuffer::new();
        builder.build(self.pos(), &read(&self.blocks), &mut geometry);
        *lock(&self.collider_geometry) = Some(geometry);
    }

    /// Publishes empty geometry without running a builder.
    pub(crate) fn clear_vertices(&self) {
        *lock(&self.render_geometry) = Some(GeometryBuffer::new());
    }

    pub(crate) fn clear_collider(&self) {
        *lock(&self.collider_geometry) = Some(GeometryBuffer::new());
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("pos", &self.pos())
            .field("affinity", &self.affinity)
            .field("scheduler", &self.scheduler)
            .field("non_empty_blocks", &self.non_empty_blocks())
            .finish_non_exhaustive()
    }
}

use std::{
    fmt,
    marker::PhantomData,
    sync::atomic::{AtomicU16, Ordering},
};

/// A phase of a chunk's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Stage {
    LoadData = 0,
    PrepareGenerate,
    Generate,
    PrepareSaveData,
    SaveData,
    Remove,
    BuildCollider,
    /// Same work as `BuildCollider`, dispatched with an immediate priority token
    BuildColliderNow,
    BuildVertices,
    /// Same work as `BuildVertices`, dispatched with an immediate priority token
    BuildVerticesNow,
}

impl Stage {
    pub const COUNT: usize = 10;

    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::LoadData,
        Stage::PrepareGenerate,
        Stage::Generate,
        Stage::PrepareSaveData,
        Stage::SaveData,
        Stage::Remove,
        Stage::BuildCollider,
        Stage::BuildColliderNow,
        Stage::BuildVertices,
        Stage::BuildVerticesNow,
    ];

    /// The order in which handlers are considered on every update.
    /// The `*Now` variants are served by their base stage's handler.
    pub const UPDATE_ORDER: [Stage; 8] = [
        Stage::LoadData,
        Stage::PrepareGenerate,
        Stage::Generate,
        Stage::PrepareSaveData,
        Stage::SaveData,
        Stage::Remove,
        Stage::BuildCollider,
        Stage::BuildVertices,
    ];

    pub const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub const fn now_variant(self) -> Option<Stage> {
        match self {
            Stage::BuildCollider => Some(Stage::BuildColliderNow),
            Stage::BuildVertices => Some(Stage::BuildVerticesNow),
            _ => None,
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Distinguishes the pending and completed sets at the type level.
pub trait BitsKind: sealed::Sealed + 'static {
    const NAME: &'static str;
}

/// Stages that were requested and have not started yet
pub enum Pending {}

/// Stages that finished at least once since the last reset
pub enum Completed {}

impl sealed::Sealed for Pending {}
impl sealed::Sealed for Completed {}

impl BitsKind for Pending {
    const NAME: &'static str = "pending";
}

impl BitsKind for Completed {
    const NAME: &'static str = "completed";
}

pub type PendingStages = StateBits<Pending>;
pub type CompletedStages = StateBits<Completed>;

/// A set of stages packed into a bitmask.
pub struct StateBits<K: BitsKind> {
    bits: u16,
    _kind: PhantomData<fn() -> K>,
}

impl<K: BitsKind> StateBits<K> {
    pub const fn empty() -> Self {
        StateBits {
            bits: 0,
            _kind: PhantomData,
        }
    }

    pub const fn from_bits(bits: u16) -> Self {
        StateBits {
            bits,
            _kind: PhantomData,
        }
    }

    pub fn of(stages: &[Stage]) -> Self {
        stages.iter().fold(Self::empty(), |bits, stage| bits.with(*stage))
    }

    pub const fn bits(self) -> u16 {
        self.bits
    }

    pub const fn with(self, stage: Stage) -> Self {
        Self::from_bits(self.bits | stage.bit())
    }

    pub fn set(&mut self, stage: Stage) {
        self.bits |= stage.bit();
    }

    pub fn reset(&mut self, stage: Stage) {
        self.bits &= !stage.bit();
    }

    pub const fn check(self, stage: Stage) -> bool {
        self.bits & stage.bit() != 0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.bits & other.bits != 0
    }

    pub fn clear(&mut self) {
        self.bits = 0;
    }

    pub const fn is_empty(self) -> bool {
        self.bits == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Stage> {
        Stage::ALL.into_iter().filter(move |stage| self.check(*stage))
    }
}

impl<K: BitsKind> Clone for StateBits<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: BitsKind> Copy for StateBits<K> {}

impl<K: BitsKind> PartialEq for StateBits<K> {
    fn eq(&self, other: &Self) -> bool {
        self.bits == other.bits
    }
}

impl<K: BitsKind> Eq for StateBits<K> {}

impl<K: BitsKind> Default for StateBits<K> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<K: BitsKind> fmt::Debug for StateBits<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", K::NAME)?;
        f.debug_set().entries(self.iter()).finish()
    }
}

/// A `StateBits` that can be updated from worker threads.
pub struct AtomicStateBits<K: BitsKind> {
    bits: AtomicU16,
    _kind: PhantomData<fn() -> K>,
}

impl<K: BitsKind> AtomicStateBits<K> {
    pub const fn new() -> Self {
        AtomicStateBits {
            bits: AtomicU16::new(0),
            _kind: PhantomData,
        }
    }

    pub fn load(&self) -> StateBits<K> {
        StateBits::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub fn check(&self, stage: Stage) -> bool {
        self.load().check(stage)
    }

    pub fn set(&self, stage: Stage) {
        self.bits.fetch_or(stage.bit(), Ordering::AcqRel);
    }

    pub fn set_all(&self, stages: StateBits<K>) {
        self.bits.fetch_or(stages.bits(), Ordering::AcqRel);
    }

    pub fn reset(&self, stage: Stage) {
        self.bits.fetch_and(!stage.bit(), Ordering::AcqRel);
    }

    pub fn reset_all(&self, stages: StateBits<K>) {
        self.bits.fetch_and(!stages.bits(), Ordering::AcqRel);
    }

    pub fn clear(&self) {
        self.bits.store(0, Ordering::Release);
    }
}

impl<K: BitsKind> Default for AtomicStateBits<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: BitsKind> fmt::Debug for AtomicStateBits<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.load().fmt(f)
    }
}

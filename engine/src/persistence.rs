//! Snapshot format and the store interface chunks are read from and written to.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::voxels::{
    block::Block,
    block_buffer::{BlockBuffer, CHUNK_VOLUME},
    coord::{ChunkPos, LocalPos},
};

mod memory_store;
mod ron_store;

pub use memory_store::MemoryStore;
pub use ron_store::RonDirectoryStore;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse snapshot {path:?}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },
    #[error("Failed to serialize snapshot")]
    Serialize(#[from] ron::Error),
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    #[error("Unsupported snapshot format version {found}, expected {expected}")]
    UnsupportedFormat { found: u32, expected: u32 },
    #[error("Full snapshot has {found} blocks, expected {expected}")]
    WrongVolume { found: usize, expected: usize },
    #[error("Block index {0} lies outside the chunk")]
    IndexOutOfRange(u16),
    #[error("Full snapshot was written for world version {found}, current version is {current}")]
    WorldVersionMismatch { found: u32, current: u32 },
}

/// Persisted form of a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    /// Terrain generator version the snapshot was taken against
    pub world_version: u32,
    pub payload: SnapshotPayload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotPayload {
    /// Every interior block in YZX order
    Full(Vec<u16>),
    /// Blocks changed since generation
    Differential(Vec<BlockChange>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockChange {
    /// Interior index in YZX order
    pub index: u16,
    pub block: u16,
}

/// A snapshot checked against the current world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedSnapshot {
    /// Replaces generation entirely
    Full(Vec<Block>),
    /// Applied on top of freshly generated terrain
    Differential(Vec<(LocalPos, Block)>),
}

impl Snapshot {
    pub fn full(world_version: u32, blocks: &BlockBuffer) -> Self {
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            world_version,
            payload: SnapshotPayload::Full(
                blocks
                    .iter_interior()
                    .map(|(_, block)| block.into_bits())
                    .collect(),
            ),
        }
    }

    pub fn differential(
        world_version: u32,
        changes: impl IntoIterator<Item = (LocalPos, Block)>,
    ) -> Self {
        Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            world_version,
            payload: SnapshotPayload::Differential(
                changes
                    .into_iter()
                    .map(|(pos, block)| BlockChange {
                        index: pos.to_index() as u16,
                        block: block.into_bits(),
                    })
                    .collect(),
            ),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self.payload, SnapshotPayload::Full(_))
    }

    pub fn decode(&self, world_version: u32) -> Result<DecodedSnapshot, SnapshotError> {
        if self.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(SnapshotError::UnsupportedFormat {
                found: self.format_version,
                expected: SNAPSHOT_FORMAT_VERSION,
            });
        }

        match &self.payload {
            SnapshotPayload::Full(blocks) => {
                if self.world_version != world_version {
                    return Err(SnapshotError::WorldVersionMismatch {
                        found: self.world_version,
                        current: world_version,
                    });
                }
                if blocks.len() != CHUNK_VOLUME {
                    return Err(SnapshotError::WrongVolume {
                        found: blocks.len(),
                        expected: CHUNK_VOLUME,
                    });
                }

                Ok(DecodedSnapshot::Full(
                    blocks.iter().copied().map(Block::from_bits).collect(),
                ))
            }
            SnapshotPayload::Differential(changes) => changes
                .iter()
                .map(|change| -> Result<(LocalPos, Block), SnapshotError> {
                    let pos = LocalPos::from_index(change.index as usize)
                        .ok_or(SnapshotError::IndexOutOfRange(change.index))?;
                    Ok((pos, Block::from_bits(change.block)))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(DecodedSnapshot::Differential),
        }
    }
}

/// Backing storage for chunk snapshots. Called from I/O workers.
pub trait PersistenceStore: Send + Sync + 'static {
    fn read(&self, pos: ChunkPos) -> Result<Option<Snapshot>, PersistenceError>;
    fn write(&self, pos: ChunkPos, snapshot: Snapshot) -> Result<(), PersistenceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn differential_decodes_to_positions() {
        let snapshot = Snapshot::differential(
            1,
            [
                (LocalPos::new(1, 2, 3), Block::STONE),
                (LocalPos::new(15, 15, 15), Block::AIR),
            ],
        );

        // World version does not matter for differential snapshots
        let decoded = snapshot.decode(42).unwrap();
        assert_eq!(
            decoded,
            DecodedSnapshot::Differential(vec![
                (LocalPos::new(1, 2, 3), Block::STONE),
                (LocalPos::new(15, 15, 15), Block::AIR),
            ])
        );
    }

    #[test]
    fn full_snapshot_requires_matching_world_version() {
        let mut blocks = BlockBuffer::new();
        blocks.set(LocalPos::new(0, 0, 0), Block::DIRT);
        let snapshot = Snapshot::full(3, &blocks);

        match snapshot.decode(3).unwrap() {
            DecodedSnapshot::Full(decoded) => {
                assert_eq!(decoded.len(), CHUNK_VOLUME);
                assert_eq!(decoded[0], Block::DIRT);
            }
            other => panic!("Expected full snapshot, got {:?}", other),
        }

        assert_eq!(
            snapshot.decode(4),
            Err(SnapshotError::WorldVersionMismatch {
                found: 3,
                current: 4
            })
        );
    }

    #[test]
    fn malformed_snapshots_are_rejected() {
        let truncated = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            world_version: 1,
            payload: SnapshotPayload::Full(vec![0; 10]),
        };
        assert!(matches!(
            truncated.decode(1),
            Err(SnapshotError::WrongVolume { found: 10, .. })
        ));

        let out_of_range = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            world_version: 1,
            payload: SnapshotPayload::Differential(vec![BlockChange {
                index: CHUNK_VOLUME as u16,
                block: 1,
            }]),
        };
        assert_eq!(
            out_of_range.decode(1),
            Err(SnapshotError::IndexOutOfRange(CHUNK_VOLUME as u16))
        );

        let future = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION + 1,
            world_version: 1,
            payload: SnapshotPayload::Differential(Vec::new()),
        };
        assert!(matches!(
            future.decode(1),
            Err(SnapshotError::UnsupportedFormat { .. })
        ));
    }
}

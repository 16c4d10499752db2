use crate::voxels::{block_buffer::BlockBuffer, coord::ChunkPos};

/// Fills the interior of a chunk with terrain.
///
/// The buffer's interior is cleared before the call. Implementations must only
/// write interior cells and must be deterministic for a given position, since
/// differential saves are replayed on top of regenerated terrain.
pub trait TerrainGenerator: Send + Sync + 'static {
    fn generate(&self, chunk_pos: ChunkPos, blocks: &mut BlockBuffer);
}

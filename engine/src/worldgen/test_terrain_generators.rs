use crate::{
    voxels::{
        block::Block,
        block_buffer::{BlockBuffer, CHUNK_SIZE},
        coord::{ChunkPos, LocalPos},
    },
    worldgen::TerrainGenerator,
};

/// Solid below `height` (exclusive) in world space, air above.
pub struct FlatTerrainGenerator {
    pub height: i32,
    pub block: Block,
}

impl FlatTerrainGenerator {
    pub fn new(height: i32) -> Self {
        FlatTerrainGenerator {
            height,
            block: Block::STONE,
        }
    }
}

impl TerrainGenerator for FlatTerrainGenerator {
    fn generate(&self, chunk_pos: ChunkPos, blocks: &mut BlockBuffer) {
        let origin_y = chunk_pos.origin().0.y;

        for pos in LocalPos::iter_all() {
            if origin_y + (pos.y() as i32) < self.height {
                blocks.set(pos, self.block);
            }
        }
    }
}

/// Leaves every chunk empty.
pub struct EmptyTerrainGenerator;

impl TerrainGenerator for EmptyTerrainGenerator {
    fn generate(&self, _chunk_pos: ChunkPos, _blocks: &mut BlockBuffer) {}
}

/// Every other block filled, the worst case for face culling.
pub struct CheckerboardTerrainGenerator;

impl TerrainGenerator for CheckerboardTerrainGenerator {
    fn generate(&self, chunk_pos: ChunkPos, blocks: &mut BlockBuffer) {
        let origin = chunk_pos.origin().0;

        for pos in LocalPos::iter_all() {
            let world = origin + pos.as_ivec3();
            // Simple pattern: fill the block if the sum of coordinates is even
            if (world.x + world.y + world.z).rem_euclid(2) == 0 {
                blocks.set(pos, Block::GRASS);
            }
        }
    }
}

use glam::{DVec2, Vec3Swizzles};
use noise::{NoiseFn, SuperSimplex};

use crate::{
    voxels::{
        block::Block,
        block_buffer::{BlockBuffer, CHUNK_SIZE},
        coord::{ChunkPos, LocalPos},
    },
    worldgen::TerrainGenerator,
};

const HORIZONTAL_SCALE: f64 = 0.01;
const HEIGHT_SCALE: f64 = 32.0;
/// Depth of dirt below the grass layer, stone below that
const DIRT_DEPTH: i32 = 3;

/// Rolling hills from a 2D SuperSimplex height field.
pub struct NoiseTerrainGenerator {
    noise: SuperSimplex,
}

impl NoiseTerrainGenerator {
    pub fn new(seed: u32) -> Self {
        Self {
            noise: SuperSimplex::new(seed),
        }
    }

    pub fn height_at(&self, x: i32, z: i32) -> i32 {
        let pos = DVec2::new(x as f64, z as f64) * HORIZONTAL_SCALE;
        (self.noise.get(pos.to_array()) * HEIGHT_SCALE) as i32
    }
}

impl TerrainGenerator for NoiseTerrainGenerator {
    #[profiling::function]
    fn generate(&self, chunk_pos: ChunkPos, blocks: &mut BlockBuffer) {
        let origin_pos = chunk_pos.origin();
        let origin_2d = origin_pos.0.xz();

        for x in 0..CHUNK_SIZE {
            for z in 0..CHUNK_SIZE {
                let height = self.height_at(origin_2d.x + x as i32, origin_2d.y + z as i32);

                // Column lies entirely above the surface
                if origin_pos.0.y > height {
                    continue;
                }

                for y in 0..CHUNK_SIZE {
                    let world_y = origin_pos.0.y + y as i32;

                    let block = if world_y < height - DIRT_DEPTH {
                        Block::STONE
                    } else if world_y < height {
                        Block::DIRT
                    } else if world_y == height {
                        Block::GRASS
                    } else {
                        break;
                    };

                    blocks.set(LocalPos::new(x, y, z), block);
                }
            }
        }
    }
}

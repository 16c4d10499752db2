mod noise_terrain_generator;
mod terrain_generator;
mod test_terrain_generators;

pub use noise_terrain_generator::NoiseTerrainGenerator;
pub use terrain_generator::TerrainGenerator;
pub use test_terrain_generators::{
    CheckerboardTerrainGenerator, EmptyTerrainGenerator, FlatTerrainGenerator,
};

mod culled_face_builder;
mod geometry_buffer;

pub use culled_face_builder::CulledFaceBuilder;
pub use geometry_buffer::{GeometryBuffer, PackedFace};

use crate::voxels::{block_buffer::BlockBuffer, coord::ChunkPos};

/// Builds render geometry for a chunk. Border faces are decided from the
/// padding cells, which hold the neighbors' adjoining layers.
pub trait MeshBuilder: Send + Sync + 'static {
    fn build(&self, chunk_pos: ChunkPos, blocks: &BlockBuffer, output: &mut GeometryBuffer);
}

/// Builds collision triangles for a chunk.
pub trait ColliderBuilder: Send + Sync + 'static {
    fn build(&self, chunk_pos: ChunkPos, blocks: &BlockBuffer, output: &mut GeometryBuffer);
}

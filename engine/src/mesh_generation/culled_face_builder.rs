use glam::IVec3;

use crate::{
    mesh_generation::{ColliderBuilder, GeometryBuffer, MeshBuilder},
    voxels::{
        block::Block,
        block_buffer::BlockBuffer,
        coord::{ChunkPos, LocalPos},
        face::Face,
    },
};

/// Emits one face for every solid block side that touches a transparent block.
///
/// No face merging. Good enough for small worlds and as a reference for
/// smarter builders.
#[derive(Debug, Default, Clone, Copy)]
pub struct CulledFaceBuilder;

impl CulledFaceBuilder {
    fn visible_faces(
        blocks: &BlockBuffer,
        mut emit: impl FnMut(LocalPos, Face, Block),
    ) {
        for (pos, block) in blocks.iter_interior() {
            if block.is_air() {
                continue;
            }

            for face in Face::ALL {
                let adjacent: IVec3 = pos.as_ivec3() + face.to_ivec3();
                if blocks.get_padded(adjacent).is_transparent() {
                    emit(pos, face, block);
                }
            }
        }
    }
}

impl MeshBuilder for CulledFaceBuilder {
    #[profiling::function]
    fn build(&self, _chunk_pos: ChunkPos, blocks: &BlockBuffer, output: &mut GeometryBuffer) {
        Self::visible_faces(blocks, |pos, face, block| output.push_face(pos, face, block));
    }
}

impl ColliderBuilder for CulledFaceBuilder {
    #[profiling::function]
    fn build(&self, _chunk_pos: ChunkPos, blocks: &BlockBuffer, output: &mut GeometryBuffer) {
        Self::visible_faces(blocks, |pos, face, _| output.push_quad(pos, face));
    }
}

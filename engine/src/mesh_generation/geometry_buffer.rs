use bitfield_struct::bitfield;
use glam::{U8Vec3, Vec3};

use crate::voxels::{block::Block, coord::LocalPos, face::Face};

/// A block face packed into 32 bits.
///
/// Layout:
/// - bits 0-3:   position.x (0-15)
/// - bits 4-7:   position.y (0-15)
/// - bits 8-11:  position.z (0-15)
/// - bits 12-14: face (0-5)
/// - bits 15-26: block type
#[bitfield(u32)]
pub struct PackedFace {
    #[bits(4)]
    pub x: u8,
    #[bits(4)]
    pub y: u8,
    #[bits(4)]
    pub z: u8,
    #[bits(3)]
    pub face: u8,
    #[bits(12)]
    pub block_type: u16,
    #[bits(5)]
    __: u8,
}

impl PackedFace {
    pub fn pack(pos: LocalPos, face: Face, block: Block) -> Self {
        PackedFace::new()
            .with_x(pos.x())
            .with_y(pos.y())
            .with_z(pos.z())
            .with_face(face as u8)
            .with_block_type(block.block_type())
    }

    pub fn position(&self) -> U8Vec3 {
        U8Vec3::new(self.x(), self.y(), self.z())
    }

    pub fn direction(&self) -> Face {
        Face::ALL[self.face() as usize]
    }
}

/// Output of a mesh or collider build, in chunk-local space.
#[derive(Debug, Default, Clone)]
pub struct GeometryBuffer {
    /// Render faces, expanded to quads on the GPU
    pub faces: Vec<PackedFace>,
    /// Collision triangles
    pub positions: Vec<Vec3>,
    pub indices: Vec<u32>,
}

impl GeometryBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_face(&mut self, pos: LocalPos, face: Face, block: Block) {
        self.faces.push(PackedFace::pack(pos, face, block));
    }

    pub fn push_quad(&mut self, pos: LocalPos, face: Face) {
        let start_index = self.positions.len() as u32;
        let base = pos.0;
        self.positions.extend(
            face.vertices()
                .iter()
                .map(|corner| (base + *corner).as_vec3()),
        );
        self.indices.extend(face.indices(start_index));
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty() && self.indices.is_empty()
    }

    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn clear(&mut self) {
        self.faces.clear();
        self.positions.clear();
        self.indices.clear();
    }
}

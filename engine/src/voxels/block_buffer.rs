use glam::IVec3;

use crate::voxels::{block::Block, coord::LocalPos, face::Face};

pub const CHUNK_SIZE: u8 = 16;
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE as usize).pow(3);

/// Side length including the one-cell halo on both ends
pub const PADDED_SIZE: usize = CHUNK_SIZE as usize + 2;
pub const PADDED_VOLUME: usize = PADDED_SIZE.pow(3);

/// Block storage of a single chunk.
///
/// Besides the `CHUNK_SIZE`³ interior, the buffer has a one-cell padding
/// border on every side which mirrors the adjoining layer of the neighboring
/// chunk, so geometry builders never have to look outside the buffer.
/// Padded coordinates run from -1 to `CHUNK_SIZE` inclusive on each axis.
/// Data is stored in YZX order.
pub struct BlockBuffer {
    blocks: Box<[Block]>,
}

impl BlockBuffer {
    pub fn new() -> Self {
        BlockBuffer {
            blocks: vec![Block::AIR; PADDED_VOLUME].into_boxed_slice(),
        }
    }

    pub fn contains_padded(pos: IVec3) -> bool {
        pos.cmpge(IVec3::splat(-1)).all() && pos.cmple(IVec3::splat(CHUNK_SIZE as i32)).all()
    }

    pub fn is_interior(pos: IVec3) -> bool {
        pos.cmpge(IVec3::ZERO).all() && pos.cmplt(IVec3::splat(CHUNK_SIZE as i32)).all()
    }

    pub fn is_padding(pos: IVec3) -> bool {
        Self::contains_padded(pos) && !Self::is_interior(pos)
    }

    fn padded_index(pos: IVec3) -> usize {
        if !Self::contains_padded(pos) {
            panic!("Padded block coordinates out of bounds: {:?}", pos);
        }

        let shifted = (pos + IVec3::ONE).as_uvec3();
        (shifted.y as usize * PADDED_SIZE + shifted.z as usize) * PADDED_SIZE + shifted.x as usize
    }

    pub fn get(&self, pos: LocalPos) -> Block {
        self.blocks[Self::padded_index(pos.as_ivec3())]
    }

    /// Writes an interior block, returning the block it replaced.
    pub fn set(&mut self, pos: LocalPos, block: Block) -> Block {
        let index = Self::padded_index(pos.as_ivec3());
        std::mem::replace(&mut self.blocks[index], block)
    }

    pub fn get_padded(&self, pos: IVec3) -> Block {
        self.blocks[Self::padded_index(pos)]
    }

    pub fn set_padding(&mut self, pos: IVec3, block: Block) {
        assert!(
            Self::is_padding(pos),
            "Attempted to write padding at non-padding position {:?}",
            pos
        );
        self.blocks[Self::padded_index(pos)] = block;
    }

    pub fn clear(&mut self) {
        self.blocks.fill(Block::AIR);
    }

    /// Clears the interior, leaving the mirrored neighbor data in the padding intact.
    pub fn clear_interior(&mut self) {
        for pos in LocalPos::iter_all() {
            self.set(pos, Block::AIR);
        }
    }

    pub fn count_non_empty(&self) -> u32 {
        self.iter_interior()
            .filter(|(_, block)| !block.is_air())
            .count() as u32
    }

    pub fn iter_interior(&self) -> impl Iterator<Item = (LocalPos, Block)> + '_ {
        LocalPos::iter_all().map(|pos| (pos, self.get(pos)))
    }

    /// Copies the layer of `neighbor` that touches this chunk into the padding on `face`.
    /// `neighbor` must be the chunk lying across `face`.
    pub fn copy_face_from(&mut self, face: Face, neighbor: &BlockBuffer) {
        let size = CHUNK_SIZE as i32;
        let (padding_depth, source_depth) = if face.is_positive() {
            (size, 0)
        } else {
            (-1, size - 1)
        };

        for v in 0..size {
            for u in 0..size {
                let source = neighbor.get_padded(face_plane_pos(face, source_depth, u, v));
                let target = Self::padded_index(face_plane_pos(face, padding_depth, u, v));
                self.blocks[target] = source;
            }
        }
    }

    /// Where an interior cell on `face` shows up in the padding of the neighbor across `face`.
    pub fn mirrored_padding_pos(pos: LocalPos, face: Face) -> IVec3 {
        pos.as_ivec3() - face.to_ivec3() * CHUNK_SIZE as i32
    }

    /// Interior blocks in YZX order, without padding
    pub fn interior_blocks(&self) -> Vec<Block> {
        self.iter_interior().map(|(_, block)| block).collect()
    }

    pub fn load_interior(&mut self, blocks: &[Block]) {
        assert!(
            blocks.len() == CHUNK_VOLUME,
            "Block slice must have exactly {} elements",
            CHUNK_VOLUME
        );

        for (pos, block) in LocalPos::iter_all().zip(blocks.iter()) {
            self.set(pos, *block);
        }
    }
}

impl Default for BlockBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn face_plane_pos(face: Face, depth: i32, u: i32, v: i32) -> IVec3 {
    match face.axis() {
        0 => IVec3::new(depth, u, v),
        1 => IVec3::new(u, depth, v),
        _ => IVec3::new(u, v, depth),
    }
}

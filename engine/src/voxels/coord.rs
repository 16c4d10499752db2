use std::ops::{Add, Sub};

use glam::{IVec3, U8Vec3};
use serde::{Deserialize, Serialize};

use crate::voxels::{
    block_buffer::CHUNK_SIZE,
    face::Face,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// A position of a block within a chunk
pub struct LocalPos(pub U8Vec3);

impl LocalPos {
    pub fn new(x: u8, y: u8, z: u8) -> Self {
        if x >= CHUNK_SIZE || y >= CHUNK_SIZE || z >= CHUNK_SIZE {
            panic!("LocalPos out of bounds: ({}, {}, {})", x, y, z);
        }
        LocalPos(U8Vec3 { x, y, z })
    }

    pub fn x(&self) -> u8 {
        self.0.x
    }

    pub fn y(&self) -> u8 {
        self.0.y
    }

    pub fn z(&self) -> u8 {
        self.0.z
    }

    pub fn as_ivec3(&self) -> IVec3 {
        self.0.as_ivec3()
    }

    /// Linear index in YZX order, matching the unpadded interior layout used by snapshots.
    pub fn to_index(&self) -> usize {
        (self.0.y as usize * CHUNK_SIZE as usize * CHUNK_SIZE as usize)
            + (self.0.z as usize * CHUNK_SIZE as usize)
            + self.0.x as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        let size = CHUNK_SIZE as usize;
        if index >= size * size * size {
            return None;
        }

        let x = (index % size) as u8;
        let z = ((index / size) % size) as u8;
        let y = (index / (size * size)) as u8;
        Some(LocalPos(U8Vec3 { x, y, z }))
    }

    /// Faces of the chunk this position touches. Interior positions touch none,
    /// corner positions touch three.
    pub fn border_faces(&self) -> impl Iterator<Item = Face> + '_ {
        let max = CHUNK_SIZE - 1;
        Face::ALL.into_iter().filter(move |face| match face {
            Face::Top => self.0.y == max,
            Face::Bottom => self.0.y == 0,
            Face::Left => self.0.x == 0,
            Face::Right => self.0.x == max,
            Face::Front => self.0.z == 0,
            Face::Back => self.0.z == max,
        })
    }

    pub fn iter_all() -> impl Iterator<Item = LocalPos> {
        (0..CHUNK_SIZE).flat_map(|y| {
            (0..CHUNK_SIZE)
                .flat_map(move |z| (0..CHUNK_SIZE).map(move |x| LocalPos(U8Vec3 { x, y, z })))
        })
    }
}

impl From<U8Vec3> for LocalPos {
    fn from(value: U8Vec3) -> Self {
        LocalPos::new(value.x, value.y, value.z)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
/// Coordinates identifying a chunk in chunk space (world coordinates divided by chunk size and floored)
pub struct ChunkPos(pub IVec3);

impl ChunkPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        ChunkPos(IVec3 { x, y, z })
    }

    pub fn x(&self) -> i32 {
        self.0.x
    }

    pub fn y(&self) -> i32 {
        self.0.y
    }

    pub fn z(&self) -> i32 {
        self.0.z
    }

    pub fn origin(&self) -> WorldPos {
        WorldPos(self.0 * IVec3::splat(CHUNK_SIZE as i32))
    }

    pub fn get_neighbor(&self, face: Face) -> ChunkPos {
        ChunkPos(self.0 + face.to_ivec3())
    }

    pub fn chebyshev_distance(&self, other: ChunkPos) -> u32 {
        let delta = (self.0 - other.0).abs();
        delta.max_element() as u32
    }
}

impl Add for ChunkPos {
    type Output = ChunkPos;

    fn add(self, other: ChunkPos) -> ChunkPos {
        ChunkPos(self.0 + other.0)
    }
}

impl Sub for ChunkPos {
    type Output = ChunkPos;

    fn sub(self, other: ChunkPos) -> ChunkPos {
        ChunkPos(self.0 - other.0)
    }
}

/// A position of a block in world space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldPos(pub IVec3);

impl WorldPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        WorldPos(IVec3 { x, y, z })
    }

    pub fn to_chunk_pos(&self) -> ChunkPos {
        let converted_pos = self.0.div_euclid(IVec3::splat(CHUNK_SIZE as i32));
        ChunkPos(converted_pos)
    }

    pub fn to_local_pos(&self) -> LocalPos {
        let converted_pos = self.0.rem_euclid(IVec3::splat(CHUNK_SIZE as i32));
        LocalPos(converted_pos.as_u8vec3())
    }

    pub fn from_chunk_and_local(chunk_pos: ChunkPos, local_pos: LocalPos) -> Self {
        chunk_pos.origin() + local_pos
    }
}

impl Add<LocalPos> for WorldPos {
    type Output = WorldPos;

    fn add(self, other: LocalPos) -> WorldPos {
        WorldPos(self.0 + other.0.as_ivec3())
    }
}

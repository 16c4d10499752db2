//! Chunk lifecycle scheduling for a streamed voxel world.
//!
//! Each [`chunk::Chunk`] advances through load, generate, save, remove and
//! geometry stages one step per tick, handing the heavy work to a
//! [`dispatch::TaskDispatch`]. [`world::ChunkWorld`] owns the live chunks.

pub mod chunk;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod mesh_generation;
pub mod persistence;
mod sync;
pub mod voxels;
pub mod world;
pub mod world_stats;
pub mod worldgen;

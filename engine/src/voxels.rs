pub mod block;
pub mod block_buffer;
pub mod coord;
pub mod face;

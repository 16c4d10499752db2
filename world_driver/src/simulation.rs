use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use glam::IVec3;
use log::{info, warn};

use engine::{
    chunk::events::ChunkEvent,
    voxels::{
        block::Block,
        coord::{ChunkPos, WorldPos},
    },
    world::ChunkWorld,
    worldgen::NoiseTerrainGenerator,
};

use crate::{
    config::DriverConfig,
    streaming::{desired_chunk_offsets, desired_chunks_iter, is_out_of_range},
    tick_loop::{Simulation, TickTime},
};

/// Streams a cube of chunks around a center that drifts east, stacking a
/// dirt tower on the terrain surface every now and then.
pub struct StreamingSimulation {
    world: ChunkWorld,
    config: DriverConfig,
    generator: Arc<NoiseTerrainGenerator>,
    offsets: Vec<IVec3>,
    center: ChunkPos,
    edits: u32,
}

impl StreamingSimulation {
    pub fn new(
        world: ChunkWorld,
        config: DriverConfig,
        generator: Arc<NoiseTerrainGenerator>,
    ) -> Self {
        let offsets = desired_chunk_offsets(config.view_radius);

        StreamingSimulation {
            world,
            config,
            generator,
            offsets,
            center: ChunkPos::new(0, 0, 0),
            edits: 0,
        }
    }

    pub fn world(&self) -> &ChunkWorld {
        &self.world
    }

    fn stream_chunks(&mut self) {
        let out_of_range: Vec<ChunkPos> = self
            .world
            .positions()
            .filter(|pos| {
                is_out_of_range(self.center, *pos, self.config.view_radius)
                    && !self.world.is_removing(*pos)
            })
            .collect();

        for pos in out_of_range {
            self.world.unload_chunk(pos);
        }

        for pos in desired_chunks_iter(self.center, &self.offsets) {
            self.world.request_chunk(pos);
        }
    }

    fn edit_terrain(&mut self) {
        let origin = self.center.origin().0;
        let x = origin.x + self.edits as i32 % 16;
        let z = origin.z;
        let surface = self.generator.height_at(x, z);

        let pos = WorldPos::new(x, surface + 1 + (self.edits as i32 / 16) % 4, z);
        if self.world.set_block(pos, Block::DIRT) {
            self.edits += 1;
        }
    }

    /// Unloads every chunk and keeps ticking until all of them have retired.
    pub fn shutdown(&mut self, timeout: Duration) {
        let positions: Vec<ChunkPos> = self.world.positions().collect();
        let receivers: Vec<_> = positions
            .iter()
            .filter_map(|pos| self.world.chunk(*pos))
            .map(|chunk| chunk.subscribe_events())
            .collect();

        info!("Unloading {} chunks", positions.len());
        for pos in positions {
            self.world.unload_chunk(pos);
        }

        let deadline = Instant::now() + timeout;
        while !self.world.is_empty() && Instant::now() < deadline {
            self.world.tick(Instant::now());
            std::thread::sleep(Duration::from_millis(1));
        }

        if !self.world.is_empty() {
            warn!(
                "{} chunks still loaded after {:?}",
                self.world.len(),
                timeout
            );
        }

        let saved = receivers
            .iter()
            .flat_map(|receiver| receiver.try_iter())
            .filter(|event| matches!(event, ChunkEvent::Saved(_)))
            .count();
        info!("Saved {} chunks on shutdown", saved);
    }
}

impl Simulation for StreamingSimulation {
    #[profiling::function]
    fn tick(&mut self, time: &TickTime) -> anyhow::Result<()> {
        if time.tick > 0 && time.tick % self.config.move_every_ticks == 0 {
            self.center = self.center + ChunkPos::new(1, 0, 0);
            info!("Moving center to {:?}", self.center);
        }

        self.stream_chunks();

        if time.tick % self.config.edit_every_ticks == 0 {
            self.edit_terrain();
        }

        self.world.tick(time.now);

        if time.tick % self.config.stats_every_ticks == 0 {
            info!(
                "Tick {} ({:.1} s): {}",
                time.tick,
                time.elapsed_time_s,
                self.world.stats()
            );
        }

        Ok(())
    }
}

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use engine::{
    config::{Config, SchedulerConfig},
    context::{Collaborators, SchedulerContext},
    dispatch::WorkerPools,
    persistence::{MemoryStore, PersistenceStore, RonDirectoryStore},
    world::ChunkWorld,
    worldgen::NoiseTerrainGenerator,
};
use log::info;

use crate::{config::DriverConfig, simulation::StreamingSimulation, tick_loop::TickLoop};

mod config;
mod simulation;
mod streaming;
mod tick_loop;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init_timed();
    info!("Starting world driver...");

    let driver_config = DriverConfig::create_manager()?.snapshot();
    let scheduler_config = SchedulerConfig::create_manager()?.snapshot();

    let store: Arc<dyn PersistenceStore> = match &driver_config.save_directory {
        Some(directory) => {
            std::fs::create_dir_all(directory)
                .with_context(|| format!("Failed to create save directory {:?}", directory))?;
            info!("Saving chunks to {:?}", directory);
            Arc::new(RonDirectoryStore::new(directory))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let generator = Arc::new(NoiseTerrainGenerator::new(driver_config.seed));
    let collaborators = Collaborators::new(generator.clone()).with_store(store);
    let dispatch = Arc::new(WorkerPools::new(
        scheduler_config.cpu_workers,
        scheduler_config.io_workers,
    )?);

    let ctx = SchedulerContext::new(scheduler_config, collaborators, dispatch);
    let world = ChunkWorld::new(ctx);

    let tick_count = driver_config.tick_count;
    let ticks_per_s = driver_config.ticks_per_s;
    let simulation = StreamingSimulation::new(world, driver_config, generator);
    let mut tick_loop = TickLoop::new(simulation, ticks_per_s);

    while tick_loop.number_of_ticks() < tick_count {
        tick_loop.next_frame(tick_count)?;
        std::thread::sleep(tick_loop.time_to_next_tick());
    }

    info!(
        "Ran {} ticks in {:.1} s",
        tick_loop.number_of_ticks(),
        tick_loop.running_time_s()
    );
    info!("{}", tick_loop.simulation.world().stats());

    tick_loop.simulation.shutdown(SHUTDOWN_TIMEOUT);
    Ok(())
}

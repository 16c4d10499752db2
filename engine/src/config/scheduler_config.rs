use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::config_manager::Config;

/// Tunables of the chunk scheduler. Missing fields fall back to defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Threads running generation and geometry builds
    pub cpu_workers: usize,
    /// Threads running store reads and writes
    pub io_workers: usize,
    pub vertices_flush_interval_ms: u64,
    pub collider_flush_interval_ms: u64,
    /// Wall-clock time per tick that edge syncs may start in, after the first one
    pub edge_sync_budget_us: u64,
    pub max_pooled_chunks: usize,
    /// Bumped whenever terrain generation changes; full snapshots of other versions are ignored
    pub world_version: u32,
    pub save_on_remove: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|count| count.get())
            .unwrap_or(4);

        SchedulerConfig {
            cpu_workers: parallelism.saturating_sub(1).max(1),
            io_workers: 2,
            vertices_flush_interval_ms: 100,
            collider_flush_interval_ms: 250,
            edge_sync_budget_us: 2000,
            max_pooled_chunks: 512,
            world_version: 1,
            save_on_remove: true,
        }
    }
}

impl SchedulerConfig {
    pub fn vertices_flush_interval(&self) -> Duration {
        Duration::from_millis(self.vertices_flush_interval_ms)
    }

    pub fn collider_flush_interval(&self) -> Duration {
        Duration::from_millis(self.collider_flush_interval_ms)
    }

    pub fn edge_sync_budget(&self) -> Duration {
        Duration::from_micros(self.edge_sync_budget_us)
    }
}

impl Config for SchedulerConfig {
    fn get_path() -> &'static str {
        "scheduler.ron"
    }

    fn is_valid(&self) -> bool {
        self.cpu_workers > 0 && self.io_workers > 0
    }
}

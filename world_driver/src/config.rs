use std::path::PathBuf;

use engine::config::Config;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    /// Chunks loaded in every direction around the center
    pub view_radius: i32,
    pub ticks_per_s: u32,
    /// The driver shuts down after this many ticks
    pub tick_count: u64,
    pub seed: u32,
    /// Chunks are kept in memory when unset
    pub save_directory: Option<PathBuf>,
    /// The center moves one chunk east this often
    pub move_every_ticks: u64,
    pub edit_every_ticks: u64,
    pub stats_every_ticks: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            view_radius: 3,
            ticks_per_s: 30,
            tick_count: 900,
            seed: 0,
            save_directory: None,
            move_every_ticks: 90,
            edit_every_ticks: 15,
            stats_every_ticks: 60,
        }
    }
}

impl Config for DriverConfig {
    fn get_path() -> &'static str {
        "driver.ron"
    }

    fn is_valid(&self) -> bool {
        self.view_radius >= 0
            && self.ticks_per_s > 0
            && self.move_every_ticks > 0
            && self.edit_every_ticks > 0
            && self.stats_every_ticks > 0
    }
}

pub mod config_manager;
pub mod scheduler_config;

pub use config_manager::{Config, ConfigManager};
pub use scheduler_config::SchedulerConfig;

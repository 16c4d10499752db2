use std::{
    path::{Path, PathBuf},
    sync::{Arc, RwLock},
    time::Duration,
};

use anyhow::Context;
use debounce::EventDebouncer;
use log::warn;
use ron::ser::PrettyConfig;
use serde::{Deserialize, Serialize};

use crate::sync::{read, write};

pub struct ConfigManager<T> {
    path: PathBuf,
    current: Arc<RwLock<T>>,
    debouncer: debounce::EventDebouncer<UpdateConfigEvent>,
}

const CONFIG_DEBOUNCE_DURATION_MS: u64 = 200;

pub trait Config:
    Sized + Default + Clone + Send + Sync + Serialize + for<'a> Deserialize<'a> + 'static
{
    fn get_path() -> &'static str;

    fn is_valid(&self) -> bool {
        true
    }

    fn create_manager() -> anyhow::Result<ConfigManager<Self>> {
        Self::create_manager_at(PathBuf::from(Self::get_path()))
    }

    fn create_manager_at(path: PathBuf) -> anyhow::Result<ConfigManager<Self>> {
        let mut manager = ConfigManager::new(path);
        manager
            .load_if_exists()
            .with_context(|| format!("Failed to load config from {:?}", manager.path()))?;
        Ok(manager)
    }
}

#[derive(Clone, Copy, PartialEq)]
struct UpdateConfigEvent;

fn write_config_file<T: Config>(path: &Path, config: &T) -> anyhow::Result<()> {
    anyhow::ensure!(
        config.is_valid(),
        "Attempted to write invalid config to {:?}",
        path
    );

    let serialized = ron::ser::to_string_pretty(config, PrettyConfig::default())
        .context("Failed to serialize config")?;
    std::fs::write(path, serialized)
        .with_context(|| format!("Failed to write config to {:?}", path))?;
    Ok(())
}

impl<T> ConfigManager<T>
where
    T: Config,
{
    pub fn new(path: PathBuf) -> Self {
        let current = Arc::new(RwLock::new(T::default()));
        let current_clone = current.clone();
        let path_clone = path.clone();

        let write_config = move |_event: UpdateConfigEvent| {
            let config = read(&current_clone).clone();
            if let Err(err) = write_config_file(&path_clone, &config) {
                warn!("{:#}", err);
            }
        };

        Self {
            path,
            current,
            debouncer: EventDebouncer::new(
                Duration::from_millis(CONFIG_DEBOUNCE_DURATION_MS),
                write_config,
            ),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self) -> Arc<RwLock<T>> {
        self.current.clone()
    }

    /// Copy of the current values.
    pub fn snapshot(&self) -> T {
        read(&self.current).clone()
    }

    pub fn load_if_exists(&mut self) -> anyhow::Result<()> {
        if self.path.exists() {
            let config_data = std::fs::read_to_string(&self.path)?;

            if config_data.is_empty() {
                return Ok(());
            }

            let config: T = ron::from_str(&config_data)
                .with_context(|| format!("Failed to parse config from {:?}", &self.path))?;

            if !config.is_valid() {
                warn!(
                    "Config in {:?} is invalid, falling back to defaults",
                    &self.path
                );
                return Ok(());
            }

            write(&self.current).clone_from(&config);
        }
        Ok(())
    }

    pub fn update_and_save<F>(&self, update_fn: F)
    where
        F: FnOnce(&mut T),
    {
        {
            let mut config = write(&self.current);
            update_fn(&mut *config);
        }
        self.debouncer.put(UpdateConfigEvent);
    }

    /// Writes the current values right away, bypassing the debouncer.
    pub fn save(&self) -> anyhow::Result<()> {
        write_config_file(&self.path, &self.snapshot())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct TestConfig {
        name: String,
        count: u32,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            TestConfig {
                name: "default".to_string(),
                count: 1,
            }
        }
    }

    impl Config for TestConfig {
        fn get_path() -> &'static str {
            "test.ron"
        }

        fn is_valid(&self) -> bool {
            self.count > 0
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("{}-{}.ron", name, std::process::id()))
    }

    #[test]
    fn missing_file_yields_defaults() {
        let path = temp_path("config-missing");
        let _ = std::fs::remove_file(&path);

        let manager = TestConfig::create_manager_at(path).unwrap();
        assert_eq!(manager.snapshot(), TestConfig::default());
    }

    #[test]
    fn save_and_reload() {
        let path = temp_path("config-roundtrip");
        let manager = ConfigManager::<TestConfig>::new(path.clone());
        manager.update_and_save(|config| {
            config.name = "saved".to_string();
            config.count = 7;
        });
        manager.save().unwrap();

        let reloaded = TestConfig::create_manager_at(path.clone()).unwrap();
        assert_eq!(reloaded.snapshot().name, "saved");
        assert_eq!(reloaded.snapshot().count, 7);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn invalid_config_is_not_written() {
        let path = temp_path("config-invalid");
        let _ = std::fs::remove_file(&path);

        let manager = ConfigManager::<TestConfig>::new(path.clone());
        manager.update_and_save(|config| config.count = 0);
        assert!(manager.save().is_err());
        assert!(!path.exists());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let path = temp_path("config-partial");
        std::fs::write(&path, "(count: 3)").unwrap();

        let manager = TestConfig::create_manager_at(path.clone()).unwrap();
        assert_eq!(manager.snapshot().count, 3);
        assert_eq!(manager.snapshot().name, "default");
        let _ = std::fs::remove_file(&path);
    }
}

//! Configuration management for loop strategies and device offload

use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{UfuncError, UfuncResult};
use crate::strategy::StrategyKind;
use crate::tensor::Device;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub num_worker_threads: usize,
    /// Smallest number of elements worth handing to one worker
    pub min_chunk_len: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_worker_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            min_chunk_len: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub chunk_len: usize,
    /// Cap on chunks submitted but not yet written back
    pub max_in_flight: usize,
    pub runtime_threads: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_len: 4096,
            max_in_flight: 2,
            runtime_threads: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub device: Device,
    /// Redo the work on the host loop when the device fails
    pub fallback_to_host: bool,
    pub chunk_len: usize,
    pub threads_per_block: usize,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            device: Device::Emulated(0),
            fallback_to_host: true,
            chunk_len: 65536,
            threads_per_block: 256,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevelopmentConfig {
    pub verbose_logging: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorizeConfig {
    pub default_strategy: StrategyKind,
    pub parallel: ParallelConfig,
    pub stream: StreamConfig,
    pub device: DeviceConfig,
    pub development: DevelopmentConfig,
}

impl Default for VectorizeConfig {
    fn default() -> Self {
        Self {
            default_strategy: StrategyKind::Basic,
            parallel: ParallelConfig::default(),
            stream: StreamConfig::default(),
            device: DeviceConfig::default(),
            development: DevelopmentConfig::default(),
        }
    }
}

impl VectorizeConfig {
    /// Every count must be positive
    pub fn validate(&self) -> UfuncResult<()> {
        let counts = [
            ("parallel.num_worker_threads", self.parallel.num_worker_threads),
            ("parallel.min_chunk_len", self.parallel.min_chunk_len),
            ("stream.chunk_len", self.stream.chunk_len),
            ("stream.max_in_flight", self.stream.max_in_flight),
            ("stream.runtime_threads", self.stream.runtime_threads),
            ("device.chunk_len", self.device.chunk_len),
            ("device.threads_per_block", self.device.threads_per_block),
        ];
        for (name, value) in counts {
            if value == 0 {
                return Err(UfuncError::Configuration(format!("{} must be positive", name)));
            }
        }
        Ok(())
    }
}

/// Holds the active configuration and optionally persists it
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: VectorizeConfig,
    config_file: Option<PathBuf>,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config_file(mut self, path: PathBuf) -> Self {
        self.config_file = Some(path);
        self
    }

    pub fn load_from_file(&mut self, path: &Path) -> UfuncResult<()> {
        let content = std::fs::read_to_string(path)?;
        let config: VectorizeConfig = serde_json::from_str(&content)?;
        config.validate()?;

        self.config = config;
        self.config_file = Some(path.to_path_buf());
        tracing::info!("Configuration loaded from {:?}", path);
        Ok(())
    }

    pub fn save_to_file(&self, path: &Path) -> UfuncResult<()> {
        let content = serde_json::to_string_pretty(&self.config)?;
        std::fs::write(path, content)?;
        tracing::info!("Configuration saved to {:?}", path);
        Ok(())
    }

    pub fn get_config(&self) -> VectorizeConfig {
        self.config.clone()
    }

    /// Apply `f` to a copy; the change only lands if the result validates
    pub fn update_config<F>(&mut self, f: F) -> UfuncResult<()>
    where
        F: FnOnce(&mut VectorizeConfig),
    {
        let mut candidate = self.config.clone();
        f(&mut candidate);
        candidate.validate()?;
        self.config = candidate;

        if let Some(ref path) = self.config_file {
            self.save_to_file(path)?;
        }
        Ok(())
    }
}

lazy_static! {
    static ref CONFIG_MANAGER: RwLock<ConfigManager> = RwLock::new(ConfigManager::new());
}

/// Get the global configuration
pub fn get_config() -> VectorizeConfig {
    CONFIG_MANAGER.read().get_config()
}

/// Update the global configuration
pub fn update_config<F>(f: F) -> UfuncResult<()>
where
    F: FnOnce(&mut VectorizeConfig),
{
    CONFIG_MANAGER.write().update_config(f)
}

/// Load the global configuration from a JSON file
pub fn load_config_from_file(path: &Path) -> UfuncResult<()> {
    CONFIG_MANAGER.write().load_from_file(path)
}

/// Create a configuration builder for easy setup
pub struct ConfigBuilder {
    config: VectorizeConfig,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: VectorizeConfig::default(),
        }
    }

    pub fn default_strategy(mut self, kind: StrategyKind) -> Self {
        self.config.default_strategy = kind;
        self
    }

    pub fn parallel(mut self, f: impl FnOnce(&mut ParallelConfig)) -> Self {
        f(&mut self.config.parallel);
        self
    }

    pub fn stream(mut self, f: impl FnOnce(&mut StreamConfig)) -> Self {
        f(&mut self.config.stream);
        self
    }

    pub fn device(mut self, f: impl FnOnce(&mut DeviceConfig)) -> Self {
        f(&mut self.config.device);
        self
    }

    pub fn development(mut self, f: impl FnOnce(&mut DevelopmentConfig)) -> Self {
        f(&mut self.config.development);
        self
    }

    pub fn build(self) -> UfuncResult<VectorizeConfig> {
        self.config.validate()?;
        Ok(self.config)
    }

    pub fn apply(self) -> UfuncResult<()> {
        let config = self.build()?;
        update_config(|current| *current = config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .default_strategy(StrategyKind::Stream)
            .stream(|s| {
                s.chunk_len = 16;
                s.max_in_flight = 3;
            })
            .parallel(|p| p.num_worker_threads = 4)
            .build()
            .unwrap();

        assert_eq!(config.default_strategy, StrategyKind::Stream);
        assert_eq!(config.stream.chunk_len, 16);
        assert_eq!(config.stream.max_in_flight, 3);
        assert_eq!(config.parallel.num_worker_threads, 4);
    }

    #[test]
    fn test_validation_rejects_zero_counts() {
        let result = ConfigBuilder::new().stream(|s| s.max_in_flight = 0).build();
        assert!(matches!(result, Err(UfuncError::Configuration(_))));
    }

    #[test]
    fn test_config_manager_keeps_prior_config_on_invalid_update() {
        let mut manager = ConfigManager::new();
        manager.update_config(|c| c.device.fallback_to_host = false).unwrap();
        assert!(!manager.get_config().device.fallback_to_host);

        assert!(manager.update_config(|c| c.parallel.min_chunk_len = 0).is_err());
        assert_eq!(manager.get_config().parallel.min_chunk_len, 1024);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("vectorize.json");

        let config = ConfigBuilder::new()
            .default_strategy(StrategyKind::Parallel)
            .device(|d| d.device = Device::Cuda(1))
            .build()
            .unwrap();
        std::fs::write(&config_path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let mut manager = ConfigManager::new();
        manager.load_from_file(&config_path).unwrap();
        let loaded = manager.get_config();
        assert_eq!(loaded.default_strategy, StrategyKind::Parallel);
        assert_eq!(loaded.device.device, Device::Cuda(1));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("partial.json");
        std::fs::write(&config_path, r#"{ "stream": { "max_in_flight": 4 } }"#).unwrap();

        let mut manager = ConfigManager::new();
        manager.load_from_file(&config_path).unwrap();
        let loaded = manager.get_config();
        assert_eq!(loaded.stream.max_in_flight, 4);
        assert_eq!(loaded.stream.chunk_len, 4096);
        assert_eq!(loaded.default_strategy, StrategyKind::Basic);
    }

    #[test]
    fn test_update_persists_to_file() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("persisted.json");
        let mut manager = ConfigManager::new().with_config_file(config_path.clone());
        manager.update_config(|c| c.development.verbose_logging = true).unwrap();

        let mut reloaded = ConfigManager::new();
        reloaded.load_from_file(&config_path).unwrap();
        assert!(reloaded.get_config().development.verbose_logging);
    }
}

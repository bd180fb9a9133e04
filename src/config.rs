use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::options::RecordingOptions;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub indicator: IndicatorConfig,
    /// Options used when the caller leaves a field out
    pub defaults: RecordingOptions,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "video-recorder".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// App storage root
    pub root: PathBuf,
    /// Sub-directory of `root` that receives recordings
    pub videos_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            videos_dir: "videos".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    /// Elapsed-duration readout refresh (default: 1000ms)
    pub elapsed_interval_ms: u64,
    /// Recording indicator blink toggle (default: 500ms)
    pub blink_interval_ms: u64,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            elapsed_interval_ms: 1000,
            blink_interval_ms: 500,
        }
    }
}

impl IndicatorConfig {
    pub fn elapsed_interval(&self) -> Duration {
        Duration::from_millis(self.elapsed_interval_ms.max(1))
    }

    pub fn blink_interval(&self) -> Duration {
        Duration::from_millis(self.blink_interval_ms.max(1))
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.defaults
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid default options in {}: {}", path, e))?;

        Ok(cfg)
    }
}

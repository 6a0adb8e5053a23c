//! Configuration management.
//!
//! Settings load from `config/<name>.toml` and every field carries a
//! default, so a partial file or no file entry at all still yields a
//! runnable configuration. [`Settings::validate`] catches the values the
//! type system cannot.

use std::path::PathBuf;

use config::Config;
use serde::Deserialize;

use crate::acquisition::settle::DataRate;
use crate::error::{BfpError, BfpResult};

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Log filter applied when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Stable identifier recorded in every session's device marker.
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub acquisition: AcquisitionSettings,
    #[serde(default)]
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub storage: StorageSettings,
}

/// EXG front-end configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AcquisitionSettings {
    /// Conversion rate in samples per second.
    #[serde(default = "default_sample_rate_sps")]
    pub sample_rate_sps: u32,
    /// High-resolution mode; low-power mode doubles the settle window.
    #[serde(default = "default_high_resolution")]
    pub high_resolution: bool,
}

/// Channel and pool sizing.
#[derive(Debug, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Frame buffers available to the front-end worker.
    #[serde(default = "default_pool_slots")]
    pub pool_slots: usize,
    /// Capacity of the ingest channel.
    #[serde(default = "default_ingest_capacity")]
    pub ingest_capacity: usize,
    /// Capacity of the storage channel.
    #[serde(default = "default_storage_capacity")]
    pub storage_capacity: usize,
}

/// Volume and rotation configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct StorageSettings {
    /// Volume root on the host filesystem.
    #[serde(default = "default_mount_root")]
    pub mount_root: PathBuf,
    /// Seconds between log file rotations.
    #[serde(default = "default_rotate_interval_secs")]
    pub rotate_interval_secs: u64,
    /// Extension for log files, dot included.
    #[serde(default = "default_file_extension")]
    pub file_extension: String,
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_device_id() -> String {
    "bfp-unit-0".to_owned()
}

fn default_sample_rate_sps() -> u32 {
    500
}

fn default_high_resolution() -> bool {
    true
}

fn default_pool_slots() -> usize {
    20
}

fn default_ingest_capacity() -> usize {
    32
}

fn default_storage_capacity() -> usize {
    64
}

fn default_mount_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_rotate_interval_secs() -> u64 {
    60
}

fn default_file_extension() -> String {
    ".binpb".to_owned()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            device_id: default_device_id(),
            acquisition: AcquisitionSettings::default(),
            pipeline: PipelineSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            sample_rate_sps: default_sample_rate_sps(),
            high_resolution: default_high_resolution(),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            pool_slots: default_pool_slots(),
            ingest_capacity: default_ingest_capacity(),
            storage_capacity: default_storage_capacity(),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            mount_root: default_mount_root(),
            rotate_interval_secs: default_rotate_interval_secs(),
            file_extension: default_file_extension(),
        }
    }
}

impl Settings {
    /// Loads `config/<name>.toml`, or `config/default.toml` when `None`.
    pub fn new(config_name: Option<&str>) -> BfpResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path))
            .build()
            .map_err(BfpError::Config)?;

        s.try_deserialize().map_err(BfpError::Config)
    }

    /// Rejects values that would only fail deep inside the pipeline.
    pub fn validate(&self) -> BfpResult<()> {
        DataRate::from_sps(self.acquisition.sample_rate_sps)?;
        if self.pipeline.pool_slots == 0 {
            return Err(BfpError::Configuration(
                "pipeline.pool_slots must be at least 1".to_owned(),
            ));
        }
        if self.pipeline.ingest_capacity == 0 || self.pipeline.storage_capacity == 0 {
            return Err(BfpError::Configuration(
                "channel capacities must be at least 1".to_owned(),
            ));
        }
        if self.storage.rotate_interval_secs == 0 {
            return Err(BfpError::Configuration(
                "storage.rotate_interval_secs must be at least 1".to_owned(),
            ));
        }
        if !self.storage.file_extension.starts_with('.') {
            return Err(BfpError::Configuration(format!(
                "storage.file_extension must start with '.', got {:?}",
                self.storage.file_extension
            )));
        }
        Ok(())
    }
}

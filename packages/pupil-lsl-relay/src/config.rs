// Persisted per-installation settings

use crate::error::{RelayError, RelayResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Environment variable overriding the config file location
pub const CONFIG_ENV_VAR: &str = "PUPIL_LSL_CONFIG";

/// Identity of an outlet restored across restarts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutletRecord {
    pub type_name: String,
    pub uuid: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[default]
    I16,
    F32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct AudioSettings {
    /// Encoder sample rate; the source's nominal rate when unset
    #[serde(default)]
    pub target_sample_rate: Option<u32>,
    #[serde(default)]
    pub sample_format: SampleFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecorderSettings {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
    #[serde(default = "default_discovery_interval")]
    pub discovery_interval_ms: u64,
    #[serde(default)]
    pub audio: AudioSettings,
}

fn default_connect_timeout() -> f64 {
    1.0
}

fn default_discovery_interval() -> u64 {
    1000
}

impl Default for RecorderSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            discovery_interval_ms: default_discovery_interval(),
            audio: AudioSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RelayConfig {
    /// Record preference of CSV recorded streams, keyed by stream label
    #[serde(default)]
    pub streams_should_record: BTreeMap<String, bool>,
    /// Record preference of audio streams, keyed by stream label
    #[serde(default)]
    pub audio_streams_should_record: BTreeMap<String, bool>,
    #[serde(default)]
    pub previous_outlets: Vec<OutletRecord>,
    #[serde(default)]
    pub recorder: RecorderSettings,
}

impl RelayConfig {
    /// `$PUPIL_LSL_CONFIG`, or `<config dir>/pupil-lsl-relay/config.json`
    pub fn default_path() -> RelayResult<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }
        let config_dir = dirs::config_dir()
            .ok_or_else(|| RelayError::Config("Failed to get config directory".to_string()))?;
        Ok(config_dir.join("pupil-lsl-relay").join("config.json"))
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub fn load(path: &Path) -> RelayResult<Self> {
        if !path.exists() {
            log::info!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: RelayConfig = serde_json::from_str(&content)
            .map_err(|e| RelayError::Config(format!("Invalid config {:?}: {}", path, e)))?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> RelayResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        log::debug!("Saved config to {:?}", path);
        Ok(())
    }
}

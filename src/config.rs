//! JSON settings for the processor and the command line tool.
//!
//! The default location is `exr_passes.json` next to the executable.
//! [`load_config`] requires the file to exist; [`load_or_create_config`]
//! writes the defaults first when it is missing. The CLI only reads.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::io::{PreviewParams, WriteOptions};

pub const CONFIG_FILE_NAME: &str = "exr_passes.json";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMappingSettings {
    pub exposure: f32,
    pub gamma: f32,
}

impl Default for ToneMappingSettings {
    fn default() -> Self {
        Self { exposure: 1.0, gamma: 2.2 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub blur_sigma: f32,
    pub sharpen_strength: f32,
    pub unsharp_radius: f32,
    pub unsharp_amount: f32,
    pub unsharp_threshold: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            blur_sigma: 2.0,
            sharpen_strength: 0.5,
            unsharp_radius: 1.0,
            unsharp_amount: 1.0,
            unsharp_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub write: WriteOptions,
    pub tone_mapping: ToneMappingSettings,
    pub filters: FilterSettings,
    pub preview: PreviewParams,
    /// Worker threads for the rayon pool; `None` uses every core.
    pub threads: Option<usize>,
}

/// `exr_passes.json` in the executable's directory.
pub fn default_config_path() -> Result<PathBuf> {
    let exe_path = env::current_exe().map_err(|e| ProcessingError::file_access(Path::new(CONFIG_FILE_NAME), e))?;
    let exe_dir = exe_path
        .parent()
        .ok_or_else(|| ProcessingError::precondition("executable has no parent directory"))?;
    Ok(exe_dir.join(CONFIG_FILE_NAME))
}

pub fn load_config(path: &Path) -> Result<ProcessorConfig> {
    let content = fs::read_to_string(path).map_err(|e| ProcessingError::file_access(path, e))?;
    let config = serde_json::from_str(&content).map_err(|source| ProcessingError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("loaded config {}", path.display());
    Ok(config)
}

/// Loads `path`, writing the defaults there first when it does not exist.
pub fn load_or_create_config(path: &Path) -> Result<ProcessorConfig> {
    if !path.exists() {
        info!("creating default config file: {}", path.display());
        let config = ProcessorConfig::default();
        save_config(path, &config)?;
        return Ok(config);
    }
    load_config(path)
}

pub fn save_config(path: &Path, config: &ProcessorConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config).map_err(|source| ProcessingError::Config {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|e| ProcessingError::file_access(path, e))
}

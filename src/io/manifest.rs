use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::io::exr_metadata::ExrSummary;
use crate::render_pass::RenderPass;
use crate::utils::channels::channel_tag;

/// Sidecar description of a packed multi-plane file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassManifest {
    pub file: PathBuf,
    pub width: usize,
    pub height: usize,
    pub passes: Vec<PassEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassEntry {
    pub name: String,
    pub layer_name: String,
    pub channels: Vec<String>,
    #[serde(default)]
    pub is_alpha: bool,
}

impl PassManifest {
    pub fn from_passes(file: impl Into<PathBuf>, passes: &[RenderPass]) -> Self {
        let (width, height) = passes.first().map(|p| p.image.dimensions()).unwrap_or((0, 0));
        let passes = passes
            .iter()
            .map(|p| PassEntry {
                name: p.name.clone(),
                layer_name: p.layer_name.clone(),
                channels: (0..p.channels()).map(channel_tag).collect(),
                is_alpha: p.is_alpha,
            })
            .collect();
        Self { file: file.into(), width, height, passes }
    }

    /// Builds a manifest from headers only. Alpha flags are not stored in
    /// files and come back `false`.
    pub fn from_summary(summary: &ExrSummary) -> Self {
        let (width, height) = summary.layers.first().map(|l| (l.width, l.height)).unwrap_or((0, 0));
        let passes = summary
            .layers
            .iter()
            .map(|l| PassEntry {
                name: l.name.clone(),
                layer_name: l.name.clone(),
                channels: l.channels.clone(),
                is_alpha: false,
            })
            .collect();
        Self { file: summary.path.clone(), width, height, passes }
    }

    pub fn pass(&self, name: &str) -> Option<&PassEntry> {
        self.passes.iter().find(|p| p.name == name)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json().map_err(|source| ProcessingError::Config { path: path.to_path_buf(), source })?;
        fs::write(path, json).map_err(|e| ProcessingError::file_access(path, e))?;
        debug!("wrote manifest {}", path.display());
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| ProcessingError::file_access(path, e))?;
        serde_json::from_str(&text).map_err(|source| ProcessingError::Config { path: path.to_path_buf(), source })
    }
}

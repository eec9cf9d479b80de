use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{ProcessingError, Result};
use crate::utils::channels::{compare_tags, layer_or_default, normalize_channel_name, split_layer_and_short};
use crate::utils::human_size;

/// One channel group as seen in the headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerSummary {
    pub name: String,
    pub width: usize,
    pub height: usize,
    /// Short tags in load order (R, G, B, A, numeric, other).
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExrSummary {
    pub path: PathBuf,
    pub file_size: u64,
    pub compression: String,
    pub layers: Vec<LayerSummary>,
}

impl ExrSummary {
    pub fn channel_count(&self) -> usize {
        self.layers.iter().map(|l| l.channels.len()).sum()
    }

    /// Plain text lines for terminal output.
    pub fn lines(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.layers.len() + 3);
        out.push(format!("file: {}", self.path.display()));
        out.push(format!("size: {}", human_size(self.file_size)));
        out.push(format!("compression: {}", self.compression));
        for layer in &self.layers {
            out.push(format!(
                "  {}  {}x{}  [{}]",
                layer.name,
                layer.width,
                layer.height,
                layer.channels.join(", ")
            ));
        }
        out
    }
}

/// Reads only the headers of `path` and groups channels the way
/// [`crate::io::load_multi_plane_exr`] would, without decoding pixels.
pub fn read_summary(path: &Path) -> Result<ExrSummary> {
    let file_size = fs::metadata(path)
        .map_err(|e| ProcessingError::file_access(path, e))?
        .len();
    let meta = exr::meta::MetaData::read_from_file(path, false)
        .map_err(|e| ProcessingError::from_exr(path, e))?;
    let first = meta
        .headers
        .first()
        .ok_or_else(|| ProcessingError::format(path, "file has no headers"))?;
    let compression = format!("{:?}", first.compression);

    let mut groups: BTreeMap<String, LayerSummary> = BTreeMap::new();
    for header in meta.headers.iter() {
        let base_attr: Option<String> = header.own_attributes.layer_name.as_ref().map(|t| t.to_string());
        let (width, height) = (header.layer_size.width(), header.layer_size.height());
        for ch in header.channels.list.iter() {
            let full = ch.name.to_string();
            let (layer, short) = split_layer_and_short(&full, base_attr.as_deref());
            let name = layer_or_default(&layer).to_string();
            groups
                .entry(name.clone())
                .or_insert_with(|| LayerSummary { name, width, height, channels: Vec::new() })
                .channels
                .push(short);
        }
    }

    let layers = groups
        .into_values()
        .map(|mut layer| {
            layer
                .channels
                .sort_by(|a, b| compare_tags(&normalize_channel_name(a), &normalize_channel_name(b)));
            layer
        })
        .collect();

    Ok(ExrSummary {
        path: path.to_path_buf(),
        file_size,
        compression,
        layers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::exr_file::{save_multi_plane_exr, ExrCompression, WriteOptions};
    use crate::render_pass::RenderPass;
    use tempfile::tempdir;

    #[test]
    fn summary_lists_layers_without_decoding() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("passes.exr");
        let passes = vec![
            RenderPass::new("beauty", 8, 4, 4, false),
            RenderPass::new("depth", 8, 4, 1, false),
            RenderPass::new("normal", 8, 4, 3, false),
        ];
        let options = WriteOptions { compression: ExrCompression::Piz, ..WriteOptions::default() };
        save_multi_plane_exr(&path, &passes, &options).unwrap();

        let summary = read_summary(&path).unwrap();
        assert_eq!(summary.compression, "PIZ");
        assert!(summary.file_size > 0);
        assert_eq!(summary.channel_count(), 8);
        let names: Vec<&str> = summary.layers.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["beauty", "depth", "normal"]);
        assert_eq!(summary.layers[0].channels, ["R", "G", "B", "A"]);
        assert_eq!(summary.layers[1].channels, ["R"]);
        assert_eq!((summary.layers[2].width, summary.layers[2].height), (8, 4));
        assert!(summary.lines().iter().any(|l| l.contains("depth") && l.contains("8x4")));
    }

    #[test]
    fn missing_file_reports_file_access() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_summary(&dir.path().join("absent.exr")),
            Err(ProcessingError::FileAccess { .. })
        ));
    }
}

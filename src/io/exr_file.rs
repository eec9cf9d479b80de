//! Reading and writing pixel data through the `exr` crate.
//!
//! Single-plane files hold one RGBA image with channels `R`, `G`, `B`, `A`.
//! Multi-plane files hold any number of passes as `<layer>.<tag>` channels in
//! one part; see [`crate::utils::channels`] for the naming rules.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use exr::meta::attribute::Text;
use exr::prelude::*;
use log::{debug, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::image_data::ImageData;
use crate::render_pass::RenderPass;
use crate::utils::channels::{
    channel_tag, compare_tags, full_channel_name, layer_or_default, normalize_channel_name,
    split_layer_and_short,
};

/// Lossless codecs offered for output files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExrCompression {
    None,
    Rle,
    Zip,
    #[default]
    Zip16,
    Piz,
}

impl ExrCompression {
    fn to_exr(self) -> Compression {
        match self {
            ExrCompression::None => Compression::Uncompressed,
            ExrCompression::Rle => Compression::RLE,
            ExrCompression::Zip => Compression::ZIP1,
            ExrCompression::Zip16 => Compression::ZIP16,
            ExrCompression::Piz => Compression::PIZ,
        }
    }
}

impl FromStr for ExrCompression {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "uncompressed" => Ok(Self::None),
            "rle" => Ok(Self::Rle),
            "zip" | "zip1" => Ok(Self::Zip),
            "zip16" => Ok(Self::Zip16),
            "piz" => Ok(Self::Piz),
            other => Err(ProcessingError::precondition(format!("unsupported compression '{}'", other))),
        }
    }
}

/// Storage type of written samples. Reading always widens to `f32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    #[default]
    F32,
    F16,
}

impl FromStr for SampleFormat {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "f32" | "float" => Ok(Self::F32),
            "f16" | "half" => Ok(Self::F16),
            other => Err(ProcessingError::precondition(format!("unsupported sample format '{}'", other))),
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SampleFormat::F32 => "f32",
            SampleFormat::F16 => "f16",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    pub compression: ExrCompression,
    pub sample_format: SampleFormat,
}

impl WriteOptions {
    fn encoding(&self) -> Encoding {
        Encoding {
            compression: self.compression.to_exr(),
            ..Encoding::FAST_LOSSLESS
        }
    }

    fn samples(&self, values: Vec<f32>) -> FlatSamples {
        match self.sample_format {
            SampleFormat::F32 => FlatSamples::F32(values),
            SampleFormat::F16 => FlatSamples::F16(values.into_iter().map(half::f16::from_f32).collect()),
        }
    }
}

fn samples_to_f32(samples: &FlatSamples) -> Vec<f32> {
    match samples {
        FlatSamples::F16(values) => values.iter().map(|v| v.to_f32()).collect(),
        FlatSamples::F32(values) => values.clone(),
        FlatSamples::U32(values) => values.iter().map(|&v| v as f32).collect(),
    }
}

fn read_flat(path: &Path) -> Result<FlatImage> {
    debug!("reading {}", path.display());
    read_all_flat_layers_from_file(path).map_err(|e| ProcessingError::from_exr(path, e))
}

/// Extracts plane `c` of an interleaved buffer.
fn planar_channel(image: &ImageData, c: usize) -> Vec<f32> {
    let channels = image.channels();
    image.data().par_chunks_exact(channels).map(|px| px[c]).collect()
}

/// Picks the one layer `load_exr` reads RGBA from: un-prefixed channels
/// first, then layers by name. The first with colour or luminance wins, then
/// the first with alpha.
fn rgba_source_layer(tagged: &[(String, String)]) -> String {
    let layers: BTreeSet<&str> = tagged.iter().map(|(layer, _)| layer.as_str()).collect();
    let has = |layer: &str, tags: &[&str]| tagged.iter().any(|(l, t)| l == layer && tags.contains(&t.as_str()));
    layers
        .iter()
        .find(|l| has(l, &["R", "G", "B", "Y"][..]))
        .or_else(|| layers.iter().find(|l| has(l, &["A"][..])))
        .or_else(|| layers.iter().next())
        .map(|l| l.to_string())
        .unwrap_or_default()
}

/// Loads the first image of `path` as RGBA.
///
/// All four channels come from a single layer (see [`rgba_source_layer`]);
/// long names such as `red` count as `R`. A luminance-only layer (`Y`) is
/// broadcast to RGB. Missing colour reads 0, missing alpha reads 1.
pub fn load_exr(path: &Path) -> Result<ImageData> {
    let image = read_flat(path)?;
    let layer = image
        .layer_data
        .first()
        .ok_or_else(|| ProcessingError::format(path, "file contains no image layers"))?;
    if image.layer_data.len() > 1 {
        debug!("{}: {} parts, using the first", path.display(), image.layer_data.len());
    }

    let width = layer.size.width();
    let height = layer.size.height();
    let channels = &layer.channel_data.list;
    let base_attr: Option<String> = layer.attributes.layer_name.as_ref().map(|s| s.to_string());
    let tagged: Vec<(String, String)> = channels
        .iter()
        .map(|ch| {
            let (layer_name, short) = split_layer_and_short(&ch.name.to_string(), base_attr.as_deref());
            (layer_name, normalize_channel_name(&short))
        })
        .collect();
    let source = rgba_source_layer(&tagged);
    if tagged.iter().any(|(l, _)| *l != source) {
        debug!("{}: reading RGBA from layer '{}'", path.display(), layer_or_default(&source));
    }

    let find = |tag: &str| -> Option<usize> { tagged.iter().position(|(l, t)| *l == source && t == tag) };

    let mut rgb = [find("R"), find("G"), find("B")];
    if rgb.iter().all(Option::is_none) {
        if let Some(y) = find("Y") {
            debug!("{}: luminance-only file, broadcasting Y", path.display());
            rgb = [Some(y); 3];
        }
    }
    let alpha = find("A");

    let planes: Vec<Option<Vec<f32>>> = rgb
        .iter()
        .chain(std::iter::once(&alpha))
        .map(|idx| idx.map(|i| samples_to_f32(&channels[i].sample_data)))
        .collect();

    let mut out = ImageData::new(width, height, 4);
    out.data_mut()
        .par_chunks_exact_mut(4)
        .enumerate()
        .for_each(|(i, px)| {
            for (c, plane) in planes.iter().enumerate() {
                px[c] = match plane {
                    Some(values) => values[i],
                    None if c == 3 => 1.0,
                    None => 0.0,
                };
            }
        });
    debug!("loaded {} ({}x{})", path.display(), width, height);
    Ok(out)
}

/// Writes an RGBA image as channels `R`, `G`, `B`, `A`.
pub fn save_exr(path: &Path, image: &ImageData, options: &WriteOptions) -> Result<()> {
    if image.channels() != 4 {
        return Err(ProcessingError::precondition(format!(
            "single-plane EXR needs exactly 4 channels (RGBA), image has {}",
            image.channels()
        )));
    }
    if image.is_empty() {
        return Err(ProcessingError::precondition("cannot write an empty image"));
    }

    let channels: Vec<AnyChannel<FlatSamples>> = (0..4)
        .map(|c| AnyChannel::new(channel_tag(c).as_str(), options.samples(planar_channel(image, c))))
        .collect();
    write_channels(path, image.dimensions(), channels, options)
}

fn write_channels(
    path: &Path,
    size: (usize, usize),
    channels: Vec<AnyChannel<FlatSamples>>,
    options: &WriteOptions,
) -> Result<()> {
    let count = channels.len();
    let layer = Layer::new(
        size,
        LayerAttributes::default(),
        options.encoding(),
        AnyChannels::sort(channels.into()),
    );
    Image::from_layer(layer)
        .write()
        .to_file(path)
        .map_err(|e| ProcessingError::from_exr(path, e))?;
    debug!(
        "wrote {} ({}x{}, {} channels, {:?}, {})",
        path.display(),
        size.0,
        size.1,
        count,
        options.compression,
        options.sample_format
    );
    Ok(())
}

struct LayerGroup {
    size: (usize, usize),
    channels: Vec<(String, Vec<f32>)>,
}

/// Loads every channel group of `path` as one pass per layer.
///
/// Channels are grouped by the text before the last `.` (or by the part's own
/// layer name when it has one); un-prefixed channels land in `default`. Inside
/// a layer channels are ordered R, G, B, A, numeric tags, then other tags by
/// name. Passes come back sorted by layer name.
pub fn load_multi_plane_exr(path: &Path) -> Result<Vec<RenderPass>> {
    let image = read_flat(path)?;
    let mut groups: BTreeMap<String, LayerGroup> = BTreeMap::new();

    for layer in image.layer_data.iter() {
        let size = (layer.size.width(), layer.size.height());
        let base_attr: Option<String> = layer.attributes.layer_name.as_ref().map(|s| s.to_string());
        for ch in layer.channel_data.list.iter() {
            let full = ch.name.to_string();
            let (layer_name, short) = split_layer_and_short(&full, base_attr.as_deref());
            let layer_name = layer_or_default(&layer_name).to_string();
            let group = groups
                .entry(layer_name.clone())
                .or_insert_with(|| LayerGroup { size, channels: Vec::new() });
            if group.size != size {
                return Err(ProcessingError::format(
                    path,
                    format!(
                        "layer '{}' spans parts of different sizes ({}x{} and {}x{})",
                        layer_name, group.size.0, group.size.1, size.0, size.1
                    ),
                ));
            }
            group.channels.push((short, samples_to_f32(&ch.sample_data)));
        }
    }

    let passes: Vec<RenderPass> = groups
        .into_iter()
        .map(|(name, mut group)| {
            group
                .channels
                .sort_by(|a, b| compare_tags(&normalize_channel_name(&a.0), &normalize_channel_name(&b.0)));
            let mut seen = HashSet::new();
            for (tag, _) in &group.channels {
                if !seen.insert(normalize_channel_name(tag)) {
                    warn!("{}: layer '{}' has duplicate channel tag '{}'", path.display(), name, tag);
                }
            }
            let (width, height) = group.size;
            let channel_count = group.channels.len();
            let mut image = ImageData::new(width, height, channel_count);
            image
                .data_mut()
                .par_chunks_exact_mut(channel_count)
                .enumerate()
                .for_each(|(i, px)| {
                    for (slot, (_, values)) in px.iter_mut().zip(&group.channels) {
                        *slot = values[i];
                    }
                });
            RenderPass::from_image(name, image, false)
        })
        .collect();

    debug!("loaded {} passes from {}", passes.len(), path.display());
    Ok(passes)
}

/// Writes `passes` into one file as `<layer_name>.<tag>` channels.
///
/// All passes must share the first pass's size, have at least one channel and
/// use distinct layer names.
pub fn save_multi_plane_exr(path: &Path, passes: &[RenderPass], options: &WriteOptions) -> Result<()> {
    let refs: Vec<&RenderPass> = passes.iter().collect();
    save_pass_refs(path, &refs, options)
}

/// EXR names are Latin-1 text; anything else is refused instead of reaching
/// the `exr` crate, which panics on it.
fn channel_text(layer: &str, index: usize) -> Result<Text> {
    Text::new_or_none(full_channel_name(layer, index)).ok_or_else(|| {
        ProcessingError::precondition(format!(
            "layer name '{}' has characters outside Latin-1, which EXR channel names cannot hold",
            layer
        ))
    })
}

pub(crate) fn save_pass_refs(path: &Path, passes: &[&RenderPass], options: &WriteOptions) -> Result<()> {
    let first = *passes
        .first()
        .ok_or_else(|| ProcessingError::precondition("no passes to write"))?;
    let size = first.image.dimensions();
    if first.image.is_empty() {
        return Err(ProcessingError::precondition(format!("pass '{}' is empty", first.name)));
    }

    let mut layer_names = HashSet::new();
    for &pass in passes {
        first.image.ensure_same_size(&pass.image)?;
        if pass.channels() == 0 {
            return Err(ProcessingError::precondition(format!("pass '{}' has no channels", pass.name)));
        }
        if pass.layer_name.is_empty() {
            return Err(ProcessingError::precondition(format!("pass '{}' has an empty layer name", pass.name)));
        }
        channel_text(&pass.layer_name, 0)?;
        if !layer_names.insert(pass.layer_name.as_str()) {
            return Err(ProcessingError::precondition(format!(
                "layer name '{}' is used by more than one pass",
                pass.layer_name
            )));
        }
    }

    let mut channels: Vec<AnyChannel<FlatSamples>> = Vec::new();
    for &pass in passes {
        for c in 0..pass.channels() {
            let name = channel_text(&pass.layer_name, c)?;
            channels.push(AnyChannel::new(name, options.samples(planar_channel(&pass.image, c))));
        }
    }
    write_channels(path, size, channels, options)
}

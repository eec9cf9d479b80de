use std::fmt;
use std::path::Path;
use std::str::FromStr;

use image::{ImageBuffer, ImageFormat, Luma, Rgb, Rgba};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::image_data::ImageData;
use crate::processing::color_processing::ALPHA_CHANNEL;
use crate::processing::tone_mapping::{tone_map_and_gamma, ToneMapMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreviewFormat {
    /// PNG 16-bit per channel
    Png16,
    /// TIFF 16-bit per channel
    Tiff16,
}

impl PreviewFormat {
    /// Picks the format from a `.png` / `.tif` / `.tiff` extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(Self::Png16),
            "tif" | "tiff" => Some(Self::Tiff16),
            _ => None,
        }
    }

    fn image_format(self) -> ImageFormat {
        match self {
            Self::Png16 => ImageFormat::Png,
            Self::Tiff16 => ImageFormat::Tiff,
        }
    }
}

impl FromStr for PreviewFormat {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" | "png16" => Ok(Self::Png16),
            "tif" | "tiff" | "tiff16" => Ok(Self::Tiff16),
            other => Err(ProcessingError::precondition(format!("unsupported preview format '{}'", other))),
        }
    }
}

impl fmt::Display for PreviewFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Png16 => "png",
            Self::Tiff16 => "tiff",
        })
    }
}

/// Display transform applied before quantizing.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreviewParams {
    pub exposure: f32,
    pub gamma: f32,
    pub tonemap: ToneMapMode,
}

impl Default for PreviewParams {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            gamma: 2.2,
            tonemap: ToneMapMode::Aces,
        }
    }
}

#[inline]
fn quantize(value: f32) -> u16 {
    (value.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// Tone maps and quantizes every sample. Alpha stays linear.
fn to_u16(image: &ImageData, out_channels: usize, params: &PreviewParams) -> Vec<u16> {
    let channels = image.channels();
    image
        .data()
        .par_chunks_exact(channels)
        .flat_map_iter(|px| {
            (0..out_channels).map(move |c| {
                let v = if c < channels { px[c] } else { 0.0 };
                if c == ALPHA_CHANNEL {
                    quantize(v)
                } else {
                    quantize(tone_map_and_gamma(v, params.exposure, params.gamma, params.tonemap))
                }
            })
        })
        .collect()
}

/// Writes a 16-bit preview of `image`: one channel as gray, two or three as
/// RGB (a missing B reads 0), four or more as RGBA.
pub fn export_preview(image: &ImageData, path: &Path, format: PreviewFormat, params: &PreviewParams) -> Result<()> {
    if image.is_empty() || image.channels() == 0 {
        return Err(ProcessingError::precondition("cannot export a preview of an empty image"));
    }
    let width = u32::try_from(image.width())
        .map_err(|_| ProcessingError::precondition("image too wide for preview export"))?;
    let height = u32::try_from(image.height())
        .map_err(|_| ProcessingError::precondition("image too tall for preview export"))?;
    let encode = |source| ProcessingError::Encode { path: path.to_path_buf(), source };
    let buffer_error = || ProcessingError::precondition("preview buffer does not match image size");

    match image.channels() {
        1 => ImageBuffer::<Luma<u16>, _>::from_raw(width, height, to_u16(image, 1, params))
            .ok_or_else(buffer_error)?
            .save_with_format(path, format.image_format())
            .map_err(encode)?,
        2 | 3 => ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, to_u16(image, 3, params))
            .ok_or_else(buffer_error)?
            .save_with_format(path, format.image_format())
            .map_err(encode)?,
        _ => ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, to_u16(image, 4, params))
            .ok_or_else(buffer_error)?
            .save_with_format(path, format.image_format())
            .map_err(encode)?,
    }
    debug!("wrote {} preview {}", format, path.display());
    Ok(())
}

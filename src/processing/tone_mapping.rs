use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::image_data::ImageData;
use crate::processing::color_processing::map_color_channels;

/// Display curves used for previews. Exposure is in stops for all of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToneMapMode {
    #[serde(alias = "ACES")]
    Aces = 0,
    Reinhard = 1,
    Linear = 2,
    Filmic = 3,
    Hable = 4,
}

impl From<i32> for ToneMapMode {
    fn from(value: i32) -> Self {
        match value {
            0 => Self::Aces,
            1 => Self::Reinhard,
            3 => Self::Filmic,
            4 => Self::Hable,
            _ => Self::Linear,
        }
    }
}

impl ToneMapMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Aces => "aces",
            Self::Reinhard => "reinhard",
            Self::Linear => "linear",
            Self::Filmic => "filmic",
            Self::Hable => "hable",
        }
    }
}

impl fmt::Display for ToneMapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToneMapMode {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aces" => Ok(Self::Aces),
            "reinhard" => Ok(Self::Reinhard),
            "linear" | "none" => Ok(Self::Linear),
            "filmic" => Ok(Self::Filmic),
            "hable" | "uncharted2" => Ok(Self::Hable),
            other => Err(ProcessingError::precondition(format!("unknown tone map curve '{}'", other))),
        }
    }
}

#[inline]
pub fn aces_tonemap(x: f32) -> f32 {
    let a = 2.51;
    let b = 0.03;
    let c = 2.43;
    let d = 0.59;
    let e = 0.14;
    ((x * (a * x + b)) / (x * (c * x + d) + e)).clamp(0.0, 1.0)
}

#[inline]
pub fn reinhard_tonemap(x: f32) -> f32 {
    (x / (1.0 + x)).clamp(0.0, 1.0)
}

#[inline]
pub fn linear_tonemap(x: f32) -> f32 {
    x.clamp(0.0, 1.0)
}

#[inline]
fn uncharted2_partial(x: f32) -> f32 {
    let a = 0.15;
    let b = 0.50;
    let c = 0.10;
    let d = 0.20;
    let e = 0.02;
    let f = 0.30;
    ((x * (a * x + c * b) + d * e) / (x * (a * x + b) + d * f)) - e / f
}

/// Uncharted 2 curve without white normalization.
#[inline]
pub fn filmic_tonemap(x: f32) -> f32 {
    uncharted2_partial(x).clamp(0.0, 1.0)
}

/// Uncharted 2 curve normalized so that `W = 11.2` maps to 1.
#[inline]
pub fn hable_tonemap(x: f32) -> f32 {
    const WHITE: f32 = 11.2;
    let white_scale = 1.0 / uncharted2_partial(WHITE);
    (uncharted2_partial(x) * white_scale).clamp(0.0, 1.0)
}

#[inline]
pub fn apply_tonemap_scalar(x: f32, mode: ToneMapMode) -> f32 {
    match mode {
        ToneMapMode::Aces => aces_tonemap(x),
        ToneMapMode::Reinhard => reinhard_tonemap(x),
        ToneMapMode::Linear => linear_tonemap(x),
        ToneMapMode::Filmic => filmic_tonemap(x),
        ToneMapMode::Hable => hable_tonemap(x),
    }
}

/// sRGB OETF on [0, 1]; input is clamped first.
#[inline]
pub fn srgb_oetf(x: f32) -> f32 {
    let x = x.clamp(0.0, 1.0);
    if x <= 0.003_130_8 {
        12.92 * x
    } else {
        1.055 * x.powf(1.0 / 2.4) - 0.055
    }
}

#[inline]
fn display_encode(x: f32, gamma: f32) -> f32 {
    // gamma near 2.2 / 2.4 means the real sRGB curve
    if (gamma - 2.2).abs() < 0.2 || (gamma - 2.4).abs() < 0.2 {
        srgb_oetf(x)
    } else {
        x.max(0.0).powf(1.0 / gamma.max(1e-4))
    }
}

/// Exposure (stops) → curve → sRGB/gamma for one sample. Returns a value in [0, 1].
/// Non-finite and negative inputs map to 0.
#[inline]
pub fn tone_map_and_gamma(value: f32, exposure: f32, gamma: f32, mode: ToneMapMode) -> f32 {
    let safe = if value.is_finite() { value.max(0.0) } else { 0.0 };
    let exposed = safe * 2.0_f32.powf(exposure);
    display_encode(apply_tonemap_scalar(exposed, mode), gamma)
}

/// Display tone mapping of every colour channel; alpha (channel 3) is copied.
pub fn apply_display_tone_mapping(image: &mut ImageData, exposure: f32, gamma: f32, mode: ToneMapMode) {
    map_color_channels(image, |v| tone_map_and_gamma(v, exposure, gamma, mode));
}

/// Exponential curve `(1 - exp(-v * exposure)) ^ (1 / gamma)`. The inner term
/// is floored at 0 so negative samples map to 0.
#[inline]
pub fn exponential_tonemap(value: f32, exposure: f32, gamma: f32) -> f32 {
    (1.0 - (-value * exposure).exp()).max(0.0).powf(1.0 / gamma)
}

/// Processor tone curve (exponential), alpha untouched.
pub fn apply_exponential_tone_mapping(image: &mut ImageData, exposure: f32, gamma: f32) {
    map_color_channels(image, |v| exponential_tonemap(v, exposure, gamma));
}

/// Viewer tone curve: `x / (1 + x)` on `v * exposure`, then `^(1 / gamma)`.
/// Kept separate from [`apply_exponential_tone_mapping`]; the two curves differ.
pub fn apply_reinhard_tone_mapping(image: &mut ImageData, exposure: f32, gamma: f32) {
    let inv_gamma = 1.0 / gamma;
    map_color_channels(image, |v| {
        let x = (v * exposure).max(0.0);
        (x / (1.0 + x)).powf(inv_gamma)
    });
}

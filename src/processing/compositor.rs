use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{ProcessingError, Result};
use crate::image_data::ImageData;
use crate::processing::color_processing::ALPHA_CHANNEL;

/// Photoshop-style per-channel blend modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    Normal,
    Multiply,
    Screen,
    Overlay,
    SoftLight,
    HardLight,
    ColorDodge,
    ColorBurn,
    LinearDodge,
    LinearBurn,
}

impl BlendMode {
    pub const ALL: [BlendMode; 10] = [
        BlendMode::Normal,
        BlendMode::Multiply,
        BlendMode::Screen,
        BlendMode::Overlay,
        BlendMode::SoftLight,
        BlendMode::HardLight,
        BlendMode::ColorDodge,
        BlendMode::ColorBurn,
        BlendMode::LinearDodge,
        BlendMode::LinearBurn,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::SoftLight => "soft_light",
            BlendMode::HardLight => "hard_light",
            BlendMode::ColorDodge => "color_dodge",
            BlendMode::ColorBurn => "color_burn",
            BlendMode::LinearDodge => "linear_dodge",
            BlendMode::LinearBurn => "linear_burn",
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BlendMode {
    type Err = ProcessingError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        BlendMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == key || mode.as_str().replace('_', "") == key)
            .ok_or_else(|| ProcessingError::precondition(format!("unknown blend mode '{}'", s)))
    }
}

/// Raw blended value of one base/overlay sample pair, before opacity and clamping.
#[inline]
pub fn blend_value(base: f32, overlay: f32, mode: BlendMode) -> f32 {
    match mode {
        BlendMode::Normal => overlay,
        BlendMode::Multiply => base * overlay,
        BlendMode::Screen => 1.0 - (1.0 - base) * (1.0 - overlay),
        BlendMode::Overlay => {
            if base < 0.5 {
                2.0 * base * overlay
            } else {
                1.0 - 2.0 * (1.0 - base) * (1.0 - overlay)
            }
        }
        BlendMode::SoftLight => {
            if overlay < 0.5 {
                2.0 * base * overlay + base * base * (1.0 - 2.0 * overlay)
            } else {
                2.0 * base * (1.0 - overlay) + base.max(0.0).sqrt() * (2.0 * overlay - 1.0)
            }
        }
        BlendMode::HardLight => {
            if overlay < 0.5 {
                2.0 * base * overlay
            } else {
                1.0 - 2.0 * (1.0 - base) * (1.0 - overlay)
            }
        }
        BlendMode::ColorDodge => {
            if overlay < 1.0 {
                base / (1.0 - overlay)
            } else {
                1.0
            }
        }
        BlendMode::ColorBurn => {
            if overlay > 0.0 {
                1.0 - (1.0 - base) / overlay
            } else {
                0.0
            }
        }
        BlendMode::LinearDodge => base + overlay,
        BlendMode::LinearBurn => base + overlay - 1.0,
    }
}

/// Blends `overlay` onto `base`. The result has the wider channel count;
/// channels a source lacks read as 0. Each sample is `mix(base, blended, opacity)`
/// clamped to [0, 1].
pub fn blend(base: &ImageData, overlay: &ImageData, mode: BlendMode, opacity: f32) -> Result<ImageData> {
    base.ensure_same_size(overlay)?;
    let channels = base.channels().max(overlay.channels());
    let mut result = ImageData::new(base.width(), base.height(), channels);
    if result.is_empty() || channels == 0 {
        return Ok(result);
    }
    let (bc, oc) = (base.channels(), overlay.channels());
    result
        .data_mut()
        .par_chunks_exact_mut(channels)
        .enumerate()
        .for_each(|(i, px)| {
            for (c, out) in px.iter_mut().enumerate() {
                let b = if c < bc { base.data()[i * bc + c] } else { 0.0 };
                let o = if c < oc { overlay.data()[i * oc + c] } else { 0.0 };
                let blended = blend_value(b, o, mode);
                *out = (b * (1.0 - opacity) + blended * opacity).clamp(0.0, 1.0);
            }
        });
    Ok(result)
}

/// Scales RGB by alpha. Images with fewer than four channels are left alone,
/// as are pixels with zero alpha.
pub fn premultiply_alpha(image: &mut ImageData) {
    let channels = image.channels();
    if channels <= ALPHA_CHANNEL {
        return;
    }
    image.data_mut().par_chunks_exact_mut(channels).for_each(|px| {
        let alpha = px[ALPHA_CHANNEL];
        if alpha != 0.0 {
            for v in &mut px[..ALPHA_CHANNEL] {
                *v *= alpha;
            }
        }
    });
}

/// Divides RGB by alpha where alpha is non-zero.
pub fn unpremultiply_alpha(image: &mut ImageData) {
    let channels = image.channels();
    if channels <= ALPHA_CHANNEL {
        return;
    }
    image.data_mut().par_chunks_exact_mut(channels).for_each(|px| {
        let alpha = px[ALPHA_CHANNEL];
        if alpha != 0.0 {
            for v in &mut px[..ALPHA_CHANNEL] {
                *v /= alpha;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: usize, height: usize, px: &[f32]) -> ImageData {
        let mut img = ImageData::new(width, height, px.len());
        for chunk in img.data_mut().chunks_exact_mut(px.len()) {
            chunk.copy_from_slice(px);
        }
        img
    }

    #[test]
    fn normal_opacity_zero_keeps_base() {
        let base = solid(3, 2, &[0.2, 0.4, 0.6, 1.0]);
        let overlay = solid(3, 2, &[0.9, 0.1, 0.5, 0.5]);
        let out = blend(&base, &overlay, BlendMode::Normal, 0.0).unwrap();
        assert_eq!(out, base);
    }

    #[test]
    fn normal_opacity_one_yields_overlay_padded() {
        let base = solid(2, 2, &[0.2, 0.4, 0.6, 1.0]);
        let overlay = solid(2, 2, &[0.9, 0.1, 0.5]);
        let out = blend(&base, &overlay, BlendMode::Normal, 1.0).unwrap();
        assert_eq!(out.channels(), 4);
        assert_eq!(out.pixel(1, 1), &[0.9, 0.1, 0.5, 0.0]);
    }

    #[test]
    fn result_takes_wider_channel_count() {
        let base = solid(1, 1, &[0.5]);
        let overlay = solid(1, 1, &[0.5, 0.5, 0.5]);
        let out = blend(&base, &overlay, BlendMode::Multiply, 1.0).unwrap();
        assert_eq!(out.channels(), 3);
        assert_eq!(out.pixel(0, 0), &[0.25, 0.0, 0.0]);
    }

    #[test]
    fn every_mode_stays_in_unit_range() {
        let steps = [0.0f32, 0.1, 0.25, 0.5, 0.75, 0.9, 1.0];
        for mode in BlendMode::ALL {
            for &b in &steps {
                for &o in &steps {
                    for &opacity in &[0.0f32, 0.3, 1.0] {
                        let base = solid(1, 1, &[b]);
                        let overlay = solid(1, 1, &[o]);
                        let v = blend(&base, &overlay, mode, opacity).unwrap().get(0, 0, 0);
                        assert!((0.0..=1.0).contains(&v), "{mode} b={b} o={o} op={opacity} -> {v}");
                        assert!(!v.is_nan());
                    }
                }
            }
        }
    }

    #[test]
    fn dodge_and_burn_edges() {
        assert_eq!(blend_value(0.3, 1.0, BlendMode::ColorDodge), 1.0);
        assert_eq!(blend_value(0.3, 0.0, BlendMode::ColorBurn), 0.0);
        assert!((blend_value(0.25, 0.5, BlendMode::ColorDodge) - 0.5).abs() < 1e-6);
        assert!((blend_value(0.75, 0.5, BlendMode::ColorBurn) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn standard_formulas() {
        assert!((blend_value(0.5, 0.5, BlendMode::Screen) - 0.75).abs() < 1e-6);
        assert!((blend_value(0.25, 0.5, BlendMode::Overlay) - 0.25).abs() < 1e-6);
        assert!((blend_value(0.75, 0.5, BlendMode::Overlay) - 0.75).abs() < 1e-6);
        assert!((blend_value(0.5, 0.25, BlendMode::HardLight) - 0.25).abs() < 1e-6);
        assert!((blend_value(0.25, 0.75, BlendMode::SoftLight) - 0.375).abs() < 1e-6);
        assert!((blend_value(0.6, 0.6, BlendMode::LinearBurn) - 0.2).abs() < 1e-6);
        assert!((blend_value(0.6, 0.6, BlendMode::LinearDodge) - 1.2).abs() < 1e-6);
    }

    #[test]
    fn mismatched_sizes_are_rejected() {
        let base = ImageData::new(4, 4, 4);
        let overlay = ImageData::new(4, 3, 4);
        assert!(matches!(
            blend(&base, &overlay, BlendMode::Screen, 1.0),
            Err(ProcessingError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn mode_names_parse() {
        assert_eq!("soft_light".parse::<BlendMode>().unwrap(), BlendMode::SoftLight);
        assert_eq!("Color-Dodge".parse::<BlendMode>().unwrap(), BlendMode::ColorDodge);
        assert_eq!("lineardodge".parse::<BlendMode>().unwrap(), BlendMode::LinearDodge);
        assert!("difference".parse::<BlendMode>().is_err());
        for mode in BlendMode::ALL {
            assert_eq!(mode.to_string().parse::<BlendMode>().unwrap(), mode);
        }
    }

    #[test]
    fn premultiply_round_trip() {
        let mut img = ImageData::from_vec(
            3,
            1,
            4,
            vec![0.8, 0.4, 0.2, 0.5, 0.3, 0.6, 0.9, 1.0, 0.7, 0.1, 0.5, 0.25],
        )
        .unwrap();
        let original = img.clone();
        premultiply_alpha(&mut img);
        assert!((img.get(0, 0, 0) - 0.4).abs() < 1e-6);
        assert_eq!(img.get(0, 0, 3), 0.5);
        unpremultiply_alpha(&mut img);
        for (a, b) in img.data().iter().zip(original.data()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_alpha_leaves_rgb_untouched() {
        let mut img = ImageData::from_vec(1, 1, 4, vec![0.3, 0.2, 0.1, 0.0]).unwrap();
        unpremultiply_alpha(&mut img);
        assert_eq!(img.pixel(0, 0), &[0.3, 0.2, 0.1, 0.0]);
        premultiply_alpha(&mut img);
        assert_eq!(img.pixel(0, 0), &[0.3, 0.2, 0.1, 0.0]);
    }

    #[test]
    fn premultiply_ignores_images_without_alpha() {
        let mut img = solid(2, 2, &[0.5, 0.5, 0.5]);
        let before = img.clone();
        premultiply_alpha(&mut img);
        unpremultiply_alpha(&mut img);
        assert_eq!(img, before);
    }
}

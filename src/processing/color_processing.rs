use glam::Vec3;
use rayon::prelude::*;

use crate::image_data::ImageData;

/// Rec. 601 luma weights used by the edge detectors.
pub const LUMA_WEIGHTS: Vec3 = Vec3::new(0.299, 0.587, 0.114);

/// Index of the alpha channel in RGBA buffers.
pub const ALPHA_CHANNEL: usize = 3;

#[inline]
pub fn luminance(r: f32, g: f32, b: f32) -> f32 {
    LUMA_WEIGHTS.dot(Vec3::new(r, g, b))
}

/// sRGB EOTF: encoded value to linear light.
#[inline]
pub fn srgb_to_linear(value: f32) -> f32 {
    if value <= 0.040_45 {
        value / 12.92
    } else {
        ((value + 0.055) / 1.055).powf(2.4)
    }
}

/// Inverse sRGB EOTF: linear light to encoded value. No clamping.
#[inline]
pub fn linear_to_srgb(value: f32) -> f32 {
    if value <= 0.003_130_8 {
        12.92 * value
    } else {
        1.055 * value.powf(1.0 / 2.4) - 0.055
    }
}

/// Applies `f` to every sample except the alpha channel.
pub(crate) fn map_color_channels<F>(image: &mut ImageData, f: F)
where
    F: Fn(f32) -> f32 + Sync,
{
    let channels = image.channels();
    if channels == 0 {
        return;
    }
    image.data_mut().par_chunks_mut(channels).for_each(|px| {
        for (c, v) in px.iter_mut().enumerate() {
            if c != ALPHA_CHANNEL {
                *v = f(*v);
            }
        }
    });
}

pub fn convert_to_linear(image: &mut ImageData) {
    map_color_channels(image, srgb_to_linear);
}

pub fn convert_to_srgb(image: &mut ImageData) {
    map_color_channels(image, linear_to_srgb);
}

/// Global min/max over every sample, alpha included.
pub fn value_range(image: &ImageData) -> Option<(f32, f32)> {
    let data = image.data();
    if data.is_empty() {
        return None;
    }
    let min_val = data.par_iter().cloned().fold(|| f32::INFINITY, f32::min).reduce(|| f32::INFINITY, f32::min);
    let max_val = data.par_iter().cloned().fold(|| f32::NEG_INFINITY, f32::max).reduce(|| f32::NEG_INFINITY, f32::max);
    Some((min_val, max_val))
}

/// Rescales the whole buffer onto [0, 1]; a flat image is left alone.
pub fn normalize_image(image: &mut ImageData) {
    let Some((min_val, max_val)) = value_range(image) else { return };
    if max_val <= min_val {
        return;
    }
    let range = max_val - min_val;
    image.data_mut().par_iter_mut().for_each(|v| *v = (*v - min_val) / range);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminance_of_white_is_one() {
        assert!((luminance(1.0, 1.0, 1.0) - 1.0).abs() < 1e-6);
        assert!((luminance(1.0, 0.0, 0.0) - 0.299).abs() < 1e-7);
    }

    #[test]
    fn srgb_breakpoints() {
        assert!((srgb_to_linear(0.04) - 0.04 / 12.92).abs() < 1e-7);
        assert!((linear_to_srgb(0.003) - 0.003 * 12.92).abs() < 1e-7);
        assert!((srgb_to_linear(1.0) - 1.0).abs() < 1e-6);
        assert!((linear_to_srgb(1.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn srgb_round_trip() {
        for i in 0..=20 {
            let v = i as f32 / 20.0;
            assert!((srgb_to_linear(linear_to_srgb(v)) - v).abs() < 1e-5, "v={v}");
        }
    }

    #[test]
    fn conversions_skip_alpha() {
        let mut img = ImageData::from_vec(1, 1, 4, vec![0.5, 0.5, 0.5, 0.5]).unwrap();
        convert_to_linear(&mut img);
        assert!((img.get(0, 0, 0) - srgb_to_linear(0.5)).abs() < 1e-7);
        assert_eq!(img.get(0, 0, 3), 0.5);
        convert_to_srgb(&mut img);
        assert!((img.get(0, 0, 0) - 0.5).abs() < 1e-5);
        assert_eq!(img.get(0, 0, 3), 0.5);
    }

    #[test]
    fn normalize_covers_alpha_too() {
        let mut img = ImageData::from_vec(2, 1, 2, vec![2.0, 4.0, 6.0, 10.0]).unwrap();
        normalize_image(&mut img);
        assert_eq!(img.data(), &[0.0, 0.25, 0.5, 1.0]);
    }

    #[test]
    fn normalize_flat_is_noop() {
        let mut img = ImageData::from_vec(2, 1, 1, vec![3.0, 3.0]).unwrap();
        normalize_image(&mut img);
        assert_eq!(img.data(), &[3.0, 3.0]);
        let mut empty = ImageData::default();
        normalize_image(&mut empty);
        assert!(empty.data().is_empty());
    }
}

//! Procedural fills used by the demo command and by tests.
//!
//! Each pattern produces an `(r, g, b)` triple per pixel and writes it into
//! however many colour channels the target has: a single-channel image gets
//! `r`, two channels get `r, g`. A fourth channel receives alpha 1.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::image_data::ImageData;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Pattern {
    /// R ramps with x, G with y, B fixed at 0.5.
    Gradient,
    /// Alternating black/white cells of `cell` pixels.
    Checker { cell: usize },
    /// 1 at the centre falling to 0 at the corners.
    Radial,
    Solid { r: f32, g: f32, b: f32 },
}

impl Pattern {
    fn sample(&self, x: usize, y: usize, width: usize, height: usize) -> [f32; 3] {
        match *self {
            Pattern::Gradient => [x as f32 / width as f32, y as f32 / height as f32, 0.5],
            Pattern::Checker { cell } => {
                let cell = cell.max(1);
                let on = ((x / cell) % 2 == 0) ^ ((y / cell) % 2 == 0);
                let v = if on { 1.0 } else { 0.0 };
                [v, v, v]
            }
            Pattern::Radial => {
                let cx = width as f32 / 2.0;
                let cy = height as f32 / 2.0;
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                let max_dist = (cx * cx + cy * cy).sqrt();
                let v = if max_dist > 0.0 { 1.0 - (dx * dx + dy * dy).sqrt() / max_dist } else { 1.0 };
                [v, v, v]
            }
            Pattern::Solid { r, g, b } => [r, g, b],
        }
    }
}

/// Overwrites `image` with `pattern`.
pub fn fill_pattern(image: &mut ImageData, pattern: Pattern) {
    let (width, height, channels) = (image.width(), image.height(), image.channels());
    if image.is_empty() || channels == 0 {
        return;
    }
    image
        .data_mut()
        .par_chunks_mut(width * channels)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, px) in row.chunks_exact_mut(channels).enumerate() {
                let rgb = pattern.sample(x, y, width, height);
                for (c, v) in px.iter_mut().enumerate() {
                    *v = match c {
                        0..=2 => rgb[c],
                        3 => 1.0,
                        _ => 0.0,
                    };
                }
            }
        });
}

/// New RGBA image filled with `pattern`.
pub fn pattern_image(width: usize, height: usize, pattern: Pattern) -> ImageData {
    let mut image = ImageData::new(width, height, 4);
    fill_pattern(&mut image, pattern);
    image
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gradient_ramps_along_axes() {
        let img = pattern_image(4, 2, Pattern::Gradient);
        assert_eq!(img.pixel(0, 0), &[0.0, 0.0, 0.5, 1.0]);
        assert_eq!(img.pixel(2, 1), &[0.5, 0.5, 0.5, 1.0]);
    }

    #[test]
    fn checker_alternates_cells() {
        let img = pattern_image(4, 4, Pattern::Checker { cell: 2 });
        assert_eq!(img.get(0, 0, 0), 0.0);
        assert_eq!(img.get(2, 0, 0), 1.0);
        assert_eq!(img.get(0, 2, 1), 1.0);
        assert_eq!(img.get(3, 3, 2), 0.0);
    }

    #[test]
    fn radial_peaks_at_centre() {
        let img = pattern_image(8, 8, Pattern::Radial);
        assert_eq!(img.get(4, 4, 0), 1.0);
        assert!(img.get(0, 0, 0) < 0.01);
    }

    #[test]
    fn single_channel_target_gets_red() {
        let mut img = ImageData::new(2, 2, 1);
        fill_pattern(&mut img, Pattern::Solid { r: 0.25, g: 0.5, b: 0.75 });
        assert!(img.data().iter().all(|&v| v == 0.25));
    }

    #[test]
    fn three_channel_target_has_no_alpha_write() {
        let mut img = ImageData::new(2, 1, 3);
        fill_pattern(&mut img, Pattern::Solid { r: 0.8, g: 0.8, b: 0.9 });
        assert_eq!(img.pixel(1, 0), &[0.8, 0.8, 0.9]);
    }
}

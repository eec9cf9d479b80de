//! Dense, channel-interleaved float raster.
//!
//! Sample `(x, y, c)` lives at offset `(y * width + x) * channels + c`.
//!
//! Accessor contract: [`ImageData::get`], [`ImageData::get_mut`] and the
//! `Index` impls assert every coordinate in debug builds and only rely on the
//! slice bound check in release builds (a coordinate past its own axis but
//! inside the buffer aliases another sample there). [`ImageData::try_get`] is
//! always checked and returns [`ProcessingError::OutOfBounds`]. Hot loops work
//! on [`ImageData::data`] / row slices directly.

use std::ops::{Index, IndexMut};

use crate::error::{ProcessingError, Result};

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ImageData {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<f32>,
}

impl ImageData {
    /// Allocates a zero-filled `width * height * channels` buffer.
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![0.0; width * height * channels],
        }
    }

    /// Wraps an existing interleaved buffer; its length must match the dimensions.
    pub fn from_vec(width: usize, height: usize, channels: usize, data: Vec<f32>) -> Result<Self> {
        let expected = width * height * channels;
        if data.len() != expected {
            return Err(ProcessingError::precondition(format!(
                "buffer holds {} samples, {}x{}x{} needs {}",
                data.len(),
                width,
                height,
                channels,
                expected
            )));
        }
        Ok(Self { width, height, channels, data })
    }

    #[inline]
    pub fn width(&self) -> usize { self.width }

    #[inline]
    pub fn height(&self) -> usize { self.height }

    #[inline]
    pub fn channels(&self) -> usize { self.channels }

    #[inline]
    pub fn pixel_count(&self) -> usize { self.width * self.height }

    /// True for a 0-width or 0-height image (the default value).
    #[inline]
    pub fn is_empty(&self) -> bool { self.width == 0 || self.height == 0 }

    #[inline]
    pub fn dimensions(&self) -> (usize, usize) { (self.width, self.height) }

    /// Samples per row.
    #[inline]
    pub fn row_stride(&self) -> usize { self.width * self.channels }

    #[inline]
    pub fn offset(&self, x: usize, y: usize, c: usize) -> usize {
        debug_assert!(x < self.width, "x={} out of range (width {})", x, self.width);
        debug_assert!(y < self.height, "y={} out of range (height {})", y, self.height);
        debug_assert!(c < self.channels, "c={} out of range (channels {})", c, self.channels);
        (y * self.width + x) * self.channels + c
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, c: usize) -> f32 {
        self.data[self.offset(x, y, c)]
    }

    #[inline]
    pub fn get_mut(&mut self, x: usize, y: usize, c: usize) -> &mut f32 {
        let idx = self.offset(x, y, c);
        &mut self.data[idx]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, c: usize, value: f32) {
        *self.get_mut(x, y, c) = value;
    }

    /// Bounds-checked read in every build profile.
    pub fn try_get(&self, x: usize, y: usize, c: usize) -> Result<f32> {
        if x >= self.width || y >= self.height || c >= self.channels {
            return Err(ProcessingError::OutOfBounds {
                x,
                y,
                c,
                width: self.width,
                height: self.height,
                channels: self.channels,
            });
        }
        Ok(self.data[(y * self.width + x) * self.channels + c])
    }

    /// Sample value, or 0 when `c` is past this image's channel count.
    #[inline]
    pub fn channel_or_zero(&self, x: usize, y: usize, c: usize) -> f32 {
        if c < self.channels { self.get(x, y, c) } else { 0.0 }
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        let start = self.offset(x, y, 0);
        &self.data[start..start + self.channels]
    }

    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [f32] {
        let start = self.offset(x, y, 0);
        let channels = self.channels;
        &mut self.data[start..start + channels]
    }

    #[inline]
    pub fn data(&self) -> &[f32] { &self.data }

    #[inline]
    pub fn data_mut(&mut self) -> &mut [f32] { &mut self.data }

    pub fn into_data(self) -> Vec<f32> { self.data }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    pub fn fill_channel(&mut self, c: usize, value: f32) {
        if c >= self.channels {
            return;
        }
        for px in self.data.chunks_exact_mut(self.channels) {
            px[c] = value;
        }
    }

    #[inline]
    pub fn same_size(&self, other: &ImageData) -> bool {
        self.width == other.width && self.height == other.height
    }

    pub fn ensure_same_size(&self, other: &ImageData) -> Result<()> {
        if self.same_size(other) {
            Ok(())
        } else {
            Err(ProcessingError::DimensionMismatch {
                expected: self.dimensions(),
                found: other.dimensions(),
            })
        }
    }

    /// Expands to four channels: 1 channel is broadcast to RGB, 2 channels
    /// fill R and G, missing alpha becomes 1. Extra channels are dropped.
    pub fn to_rgba(&self) -> ImageData {
        if self.channels == 4 {
            return self.clone();
        }
        let mut out = ImageData::new(self.width, self.height, 4);
        let src_channels = self.channels.max(1);
        for (dst, src) in out.data.chunks_exact_mut(4).zip(self.data.chunks_exact(src_channels)) {
            match self.channels {
                0 => {}
                1 => {
                    dst[0] = src[0];
                    dst[1] = src[0];
                    dst[2] = src[0];
                }
                2 => {
                    dst[0] = src[0];
                    dst[1] = src[1];
                }
                _ => dst[..3].copy_from_slice(&src[..3]),
            }
            dst[3] = if self.channels > 4 { src[3] } else { 1.0 };
        }
        out
    }
}

impl Index<(usize, usize, usize)> for ImageData {
    type Output = f32;

    #[inline]
    fn index(&self, (x, y, c): (usize, usize, usize)) -> &f32 {
        &self.data[self.offset(x, y, c)]
    }
}

impl IndexMut<(usize, usize, usize)> for ImageData {
    #[inline]
    fn index_mut(&mut self, (x, y, c): (usize, usize, usize)) -> &mut f32 {
        let idx = self.offset(x, y, c);
        &mut self.data[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_is_zero_filled() {
        let img = ImageData::new(3, 2, 4);
        assert_eq!(img.data().len(), 24);
        assert!(img.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn default_is_empty() {
        let img = ImageData::default();
        assert!(img.is_empty());
        assert!(img.data().is_empty());
    }

    #[test]
    fn offset_follows_interleaved_layout() {
        let img = ImageData::new(5, 3, 3);
        assert_eq!(img.offset(0, 0, 0), 0);
        assert_eq!(img.offset(4, 0, 2), 14);
        assert_eq!(img.offset(0, 2, 0), 30);
        assert_eq!(img.offset(4, 2, 2), 44);
    }

    #[test]
    fn boundary_coordinates_are_addressable() {
        let mut img = ImageData::new(4, 3, 2);
        img.set(0, 0, 0, 1.0);
        img.set(3, 0, 1, 2.0);
        img.set(0, 2, 0, 3.0);
        img[(3, 2, 1)] = 4.0;
        assert_eq!(img.get(0, 0, 0), 1.0);
        assert_eq!(img[(3, 0, 1)], 2.0);
        assert_eq!(img.try_get(0, 2, 0).unwrap(), 3.0);
        assert_eq!(img.data()[img.data().len() - 1], 4.0);
    }

    #[test]
    fn try_get_rejects_each_axis() {
        let img = ImageData::new(4, 3, 2);
        assert!(matches!(img.try_get(4, 0, 0), Err(ProcessingError::OutOfBounds { x: 4, .. })));
        assert!(matches!(img.try_get(0, 3, 0), Err(ProcessingError::OutOfBounds { y: 3, .. })));
        assert!(matches!(img.try_get(0, 0, 2), Err(ProcessingError::OutOfBounds { c: 2, .. })));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn debug_build_panics_on_column_overflow() {
        let img = ImageData::new(4, 3, 1);
        // (4, 0) would alias (0, 1) without the axis check.
        let _ = img.get(4, 0, 0);
    }

    #[test]
    fn from_vec_checks_length() {
        assert!(ImageData::from_vec(2, 2, 1, vec![0.0; 4]).is_ok());
        assert!(matches!(
            ImageData::from_vec(2, 2, 1, vec![0.0; 3]),
            Err(ProcessingError::Precondition(_))
        ));
    }

    #[test]
    fn ensure_same_size_reports_mismatch() {
        let a = ImageData::new(4, 4, 3);
        let b = ImageData::new(4, 2, 4);
        assert!(a.ensure_same_size(&ImageData::new(4, 4, 1)).is_ok());
        match a.ensure_same_size(&b) {
            Err(ProcessingError::DimensionMismatch { expected, found }) => {
                assert_eq!(expected, (4, 4));
                assert_eq!(found, (4, 2));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn to_rgba_broadcasts_gray_and_sets_alpha() {
        let gray = ImageData::from_vec(2, 1, 1, vec![0.25, 0.75]).unwrap();
        let rgba = gray.to_rgba();
        assert_eq!(rgba.channels(), 4);
        assert_eq!(rgba.pixel(0, 0), &[0.25, 0.25, 0.25, 1.0]);
        assert_eq!(rgba.pixel(1, 0), &[0.75, 0.75, 0.75, 1.0]);

        let rgb = ImageData::from_vec(1, 1, 3, vec![0.1, 0.2, 0.3]).unwrap();
        assert_eq!(rgb.to_rgba().pixel(0, 0), &[0.1, 0.2, 0.3, 1.0]);
    }

    #[test]
    fn fill_channel_touches_one_channel() {
        let mut img = ImageData::new(2, 2, 3);
        img.fill_channel(1, 0.5);
        for px in img.data().chunks_exact(3) {
            assert_eq!(px, &[0.0, 0.5, 0.0]);
        }
    }
}

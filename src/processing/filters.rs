//! Convolution filters over [`ImageData`].
//!
//! Every filter replaces the buffer in place with a result of identical size
//! and channel count. Taps that fall outside the image are skipped rather than
//! clamped or mirrored, so kernels lose weight at the borders.

use rayon::prelude::*;

use crate::error::{ProcessingError, Result};
use crate::image_data::ImageData;
use crate::processing::color_processing::luminance;

type Kernel3 = [[f32; 3]; 3];

const SOBEL_X: Kernel3 = [[-1.0, 0.0, 1.0], [-2.0, 0.0, 2.0], [-1.0, 0.0, 1.0]];
const SOBEL_Y: Kernel3 = [[-1.0, -2.0, -1.0], [0.0, 0.0, 0.0], [1.0, 2.0, 1.0]];
const LAPLACIAN: Kernel3 = [[0.0, -1.0, 0.0], [-1.0, 4.0, -1.0], [0.0, -1.0, 0.0]];

/// Largest tap count a blur kernel may have.
pub const MAX_KERNEL_SIZE: usize = 65_537;

fn check_sigma(sigma: f32) -> Result<()> {
    if !sigma.is_finite() {
        return Err(ProcessingError::precondition(format!("blur sigma must be finite, got {}", sigma)));
    }
    Ok(())
}

/// Number of taps for a sigma: `ceil(2 * sigma) * 2 + 1`, at most [`MAX_KERNEL_SIZE`].
pub fn kernel_size_for_sigma(sigma: f32) -> Result<usize> {
    check_sigma(sigma)?;
    let half = (2.0 * sigma).ceil().max(0.0) as usize;
    half.checked_mul(2)
        .and_then(|n| n.checked_add(1))
        .filter(|&n| n <= MAX_KERNEL_SIZE)
        .ok_or_else(|| ProcessingError::precondition(format!("blur sigma {} needs more than {} taps", sigma, MAX_KERNEL_SIZE)))
}

/// Normalized 1D Gaussian sized from `sigma`.
pub fn gaussian_kernel(sigma: f32) -> Result<Vec<f32>> {
    Ok(gaussian_kernel_sized(sigma, kernel_size_for_sigma(sigma)?))
}

/// Normalized 1D Gaussian with an explicit tap count centered on `size / 2`.
pub fn gaussian_kernel_sized(sigma: f32, size: usize) -> Vec<f32> {
    let center = (size / 2) as f32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - center;
            (-(x * x) / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Separable Gaussian blur, horizontal pass then vertical pass. `sigma <= 0`
/// is a no-op; NaN, infinite or oversized sigmas are rejected.
pub fn gaussian_blur(image: &mut ImageData, sigma: f32) -> Result<()> {
    check_sigma(sigma)?;
    if sigma <= 0.0 || image.is_empty() {
        return Ok(());
    }
    let kernel = gaussian_kernel(sigma)?;
    convolve_separable(image, &kernel);
    Ok(())
}

/// Gaussian blur with a caller-chosen odd tap count.
pub fn gaussian_blur_sized(image: &mut ImageData, sigma: f32, kernel_size: usize) -> Result<()> {
    if kernel_size == 0 || kernel_size % 2 == 0 || kernel_size > MAX_KERNEL_SIZE {
        return Err(ProcessingError::precondition(format!(
            "blur kernel size must be odd and in 1..={}, got {}",
            MAX_KERNEL_SIZE, kernel_size
        )));
    }
    check_sigma(sigma)?;
    if sigma <= 0.0 || image.is_empty() {
        return Ok(());
    }
    let kernel = gaussian_kernel_sized(sigma, kernel_size);
    convolve_separable(image, &kernel);
    Ok(())
}

fn convolve_separable(image: &mut ImageData, kernel: &[f32]) {
    let (width, height, channels) = (image.width(), image.height(), image.channels());
    if channels == 0 {
        return;
    }
    let half = (kernel.len() / 2) as isize;
    let stride = image.row_stride();

    let mut temp = ImageData::new(width, height, channels);
    let src = image.data();
    temp.data_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, out_row)| {
            let row = &src[y * stride..(y + 1) * stride];
            for x in 0..width {
                for c in 0..channels {
                    let mut sum = 0.0f32;
                    for (k, weight) in kernel.iter().enumerate() {
                        let px = x as isize + k as isize - half;
                        if px >= 0 && (px as usize) < width {
                            sum += row[px as usize * channels + c] * weight;
                        }
                    }
                    out_row[x * channels + c] = sum;
                }
            }
        });

    let tmp = temp.data();
    image
        .data_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, out_row)| {
            for x in 0..width {
                for c in 0..channels {
                    let mut sum = 0.0f32;
                    for (k, weight) in kernel.iter().enumerate() {
                        let py = y as isize + k as isize - half;
                        if py >= 0 && (py as usize) < height {
                            sum += tmp[(py as usize * width + x) * channels + c] * weight;
                        }
                    }
                    out_row[x * channels + c] = sum;
                }
            }
        });
}

/// Raw 3x3 correlation of channel `c` of `src`, one sum per pixel.
fn convolve3x3(src: &ImageData, c: usize, kernel: &Kernel3) -> Vec<f32> {
    let (width, height, channels) = (src.width(), src.height(), src.channels());
    let data = src.data();
    let mut out = vec![0.0f32; width * height];
    if width == 0 {
        return out;
    }
    out.par_chunks_mut(width).enumerate().for_each(|(y, out_row)| {
        for (x, slot) in out_row.iter_mut().enumerate() {
            let mut sum = 0.0f32;
            for (ky, kernel_row) in kernel.iter().enumerate() {
                let py = y as isize + ky as isize - 1;
                if py < 0 || py as usize >= height {
                    continue;
                }
                for (kx, weight) in kernel_row.iter().enumerate() {
                    let px = x as isize + kx as isize - 1;
                    if px >= 0 && (px as usize) < width {
                        sum += data[(py as usize * width + px as usize) * channels + c] * weight;
                    }
                }
            }
            *slot = sum;
        }
    });
    out
}

/// 3x3 sharpening kernel `[[0,-s,0],[-s,1+4s,-s],[0,-s,0]]`, clamped to [0, 1].
/// `strength <= 0` leaves the image untouched.
pub fn sharpen(image: &mut ImageData, strength: f32) {
    if strength <= 0.0 || image.is_empty() {
        return;
    }
    let s = strength;
    let kernel: Kernel3 = [[0.0, -s, 0.0], [-s, 1.0 + 4.0 * s, -s], [0.0, -s, 0.0]];
    let source = image.clone();
    let channels = image.channels();
    for c in 0..channels {
        let sums = convolve3x3(&source, c, &kernel);
        for (px, sum) in image.data_mut().chunks_exact_mut(channels).zip(sums) {
            px[c] = sum.clamp(0.0, 1.0);
        }
    }
}

fn require_color(image: &ImageData, filter: &str) -> Result<()> {
    if image.channels() < 3 {
        return Err(ProcessingError::precondition(format!(
            "{} needs at least 3 channels, image has {}",
            filter,
            image.channels()
        )));
    }
    Ok(())
}

fn luma_plane(image: &ImageData) -> ImageData {
    let mut plane = ImageData::new(image.width(), image.height(), 1);
    let channels = image.channels();
    plane
        .data_mut()
        .par_iter_mut()
        .zip(image.data().par_chunks_exact(channels))
        .for_each(|(out, px)| *out = luminance(px[0], px[1], px[2]));
    plane
}

fn broadcast(image: &mut ImageData, values: &[f32]) {
    let channels = image.channels();
    image
        .data_mut()
        .par_chunks_exact_mut(channels)
        .zip(values.par_iter())
        .for_each(|(px, &v)| px.fill(v));
}

/// Sobel gradient magnitude of luma, clamped to 1 and written to every channel.
pub fn sobel_edge_detection(image: &mut ImageData) -> Result<()> {
    require_color(image, "Sobel edge detection")?;
    if image.is_empty() {
        return Ok(());
    }
    let luma = luma_plane(image);
    let gx = convolve3x3(&luma, 0, &SOBEL_X);
    let gy = convolve3x3(&luma, 0, &SOBEL_Y);
    let edges: Vec<f32> = gx
        .iter()
        .zip(&gy)
        .map(|(x, y)| (x * x + y * y).sqrt().min(1.0))
        .collect();
    broadcast(image, &edges);
    Ok(())
}

/// Absolute Laplacian of luma written to every channel. Not clamped above.
pub fn laplacian_edge_detection(image: &mut ImageData) -> Result<()> {
    require_color(image, "Laplacian edge detection")?;
    if image.is_empty() {
        return Ok(());
    }
    let luma = luma_plane(image);
    let edges: Vec<f32> = convolve3x3(&luma, 0, &LAPLACIAN).into_iter().map(f32::abs).collect();
    broadcast(image, &edges);
    Ok(())
}

/// Classic unsharp mask: samples whose difference from a `radius` blur is at
/// least `threshold` are pushed away from the blur by `amount`, then clamped.
pub fn unsharp_mask(image: &mut ImageData, radius: f32, amount: f32, threshold: f32) -> Result<()> {
    let mut blurred = image.clone();
    gaussian_blur(&mut blurred, radius)?;
    image
        .data_mut()
        .par_iter_mut()
        .zip(blurred.data().par_iter())
        .for_each(|(v, &b)| {
            let difference = *v - b;
            if difference.abs() >= threshold {
                *v = (*v + amount * difference).clamp(0.0, 1.0);
            }
        });
    Ok(())
}

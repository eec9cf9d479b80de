//! Facade over file I/O, the pass registry, filters and compositing.
//!
//! The registry is the only state an [`ExrProcessor`] keeps; every other
//! method is a self-contained operation on its arguments. A processor is not
//! meant to be shared between threads; use one per pipeline.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;

use log::{debug, warn};
use rayon::prelude::*;

use crate::error::{ProcessingError, Result};
use crate::image_data::ImageData;
use crate::io::{self, exr_file, WriteOptions};
use crate::processing::compositor::{self, BlendMode};
use crate::processing::{color_processing, filters, resize, tone_mapping};
use crate::render_pass::RenderPass;

#[derive(Debug, Default)]
pub struct ExrProcessor {
    passes: HashMap<String, RenderPass>,
    write_options: WriteOptions,
}

impl ExrProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_write_options(write_options: WriteOptions) -> Self {
        Self { passes: HashMap::new(), write_options }
    }

    pub fn write_options(&self) -> &WriteOptions {
        &self.write_options
    }

    pub fn set_write_options(&mut self, write_options: WriteOptions) {
        self.write_options = write_options;
    }

    // --- file I/O ---

    pub fn load_exr(&self, path: &Path) -> Result<ImageData> {
        io::load_exr(path)
    }

    /// Fails unless `image` has exactly four channels.
    pub fn save_exr(&self, path: &Path, image: &ImageData) -> Result<()> {
        io::save_exr(path, image, &self.write_options)
    }

    pub fn load_multi_plane_exr(&self, path: &Path) -> Result<Vec<RenderPass>> {
        io::load_multi_plane_exr(path)
    }

    pub fn save_multi_plane_exr(&self, path: &Path, passes: &[RenderPass]) -> Result<()> {
        io::save_multi_plane_exr(path, passes, &self.write_options)
    }

    /// Packs the named registered passes, in the given order, into one file.
    pub fn save_registered_passes(&self, path: &Path, names: &[&str]) -> Result<()> {
        let passes = names
            .iter()
            .map(|name| self.require_pass(name))
            .collect::<Result<Vec<_>>>()?;
        exr_file::save_pass_refs(path, &passes, &self.write_options)
    }

    // --- pass registry ---

    /// Creates a zero-filled pass under `name`, replacing any previous one.
    pub fn add_render_pass(
        &mut self,
        name: &str,
        width: usize,
        height: usize,
        channels: usize,
        is_alpha: bool,
    ) -> &mut RenderPass {
        self.insert_pass_entry(RenderPass::new(name, width, height, channels, is_alpha))
    }

    /// Stores `pass` under its name and returns the pass it replaced.
    pub fn insert_render_pass(&mut self, pass: RenderPass) -> Option<RenderPass> {
        if self.passes.contains_key(&pass.name) {
            debug!("replacing render pass '{}'", pass.name);
        }
        self.passes.insert(pass.name.clone(), pass)
    }

    fn insert_pass_entry(&mut self, pass: RenderPass) -> &mut RenderPass {
        match self.passes.entry(pass.name.clone()) {
            Entry::Occupied(mut entry) => {
                debug!("replacing render pass '{}'", pass.name);
                entry.insert(pass);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(pass),
        }
    }

    pub fn render_pass(&self, name: &str) -> Option<&RenderPass> {
        self.passes.get(name)
    }

    pub fn render_pass_mut(&mut self, name: &str) -> Option<&mut RenderPass> {
        self.passes.get_mut(name)
    }

    pub fn remove_render_pass(&mut self, name: &str) -> Option<RenderPass> {
        self.passes.remove(name)
    }

    /// Registered names in ascending order.
    pub fn pass_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.passes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn clear_passes(&mut self) {
        self.passes.clear();
    }

    fn require_pass(&self, name: &str) -> Result<&RenderPass> {
        self.passes
            .get(name)
            .ok_or_else(|| ProcessingError::PassNotFound(name.to_string()))
    }

    // --- filters ---

    /// Fails on a NaN, infinite or oversized sigma.
    pub fn apply_gaussian_blur(&self, image: &mut ImageData, sigma: f32) -> Result<()> {
        filters::gaussian_blur(image, sigma)
    }

    /// Blur with an explicit odd kernel size.
    pub fn apply_gaussian_blur_with_kernel(&self, image: &mut ImageData, sigma: f32, kernel_size: usize) -> Result<()> {
        filters::gaussian_blur_sized(image, sigma, kernel_size)
    }

    pub fn apply_sharpen(&self, image: &mut ImageData, strength: f32) {
        filters::sharpen(image, strength);
    }

    /// Sobel edges; needs at least three channels.
    pub fn apply_edge_detection(&self, image: &mut ImageData) -> Result<()> {
        filters::sobel_edge_detection(image)
    }

    pub fn apply_unsharp_mask(&self, image: &mut ImageData, radius: f32, amount: f32, threshold: f32) -> Result<()> {
        filters::unsharp_mask(image, radius, amount, threshold)
    }

    /// Exponential curve `(1 - exp(-v * exposure)) ^ (1 / gamma)` on colour channels.
    pub fn apply_tone_mapping(&self, image: &mut ImageData, exposure: f32, gamma: f32) {
        tone_mapping::apply_exponential_tone_mapping(image, exposure, gamma);
    }

    // --- compositing ---

    /// Seeds the result with the first named pass, then adds every following
    /// pass at full opacity, clamping after each addition.
    pub fn composite_passes(&self, names: &[&str]) -> Result<ImageData> {
        let (first, rest) = names
            .split_first()
            .ok_or_else(|| ProcessingError::precondition("composite needs at least one pass name"))?;
        let mut output = self.require_pass(first)?.image.clone();
        for name in rest {
            let pass = self.require_pass(name)?;
            self.add_pass(pass, &mut output, 1.0);
        }
        debug!("composited {} passes", names.len());
        Ok(output)
    }

    /// Per-channel `a * (1 - factor) + b * factor`. The result has the wider
    /// channel count; channels a pass lacks read as 0. Not clamped.
    pub fn blend_passes(&self, pass1: &RenderPass, pass2: &RenderPass, factor: f32) -> Result<ImageData> {
        let (a, b) = (&pass1.image, &pass2.image);
        a.ensure_same_size(b)?;
        let channels = a.channels().max(b.channels());
        let mut output = ImageData::new(a.width(), a.height(), channels);
        if channels == 0 {
            return Ok(output);
        }
        let (ac, bc) = (a.channels(), b.channels());
        output
            .data_mut()
            .par_chunks_exact_mut(channels)
            .enumerate()
            .for_each(|(i, px)| {
                for (c, out) in px.iter_mut().enumerate() {
                    let v1 = if c < ac { a.data()[i * ac + c] } else { 0.0 };
                    let v2 = if c < bc { b.data()[i * bc + c] } else { 0.0 };
                    *out = v1 * (1.0 - factor) + v2 * factor;
                }
            });
        Ok(output)
    }

    /// Additive accumulation: an empty `output` becomes a copy of the pass;
    /// otherwise `output += pass * opacity` over the overlapping pixels and
    /// channels, clamped to [0, 1].
    pub fn add_pass(&self, pass: &RenderPass, output: &mut ImageData, opacity: f32) {
        if output.is_empty() {
            *output = pass.image.clone();
            return;
        }
        let src = &pass.image;
        if !output.same_size(src) {
            warn!(
                "adding pass '{}' ({}x{}) onto {}x{} output, only the overlap is used",
                pass.name,
                src.width(),
                src.height(),
                output.width(),
                output.height()
            );
        }
        let width = output.width().min(src.width());
        let height = output.height().min(src.height());
        let channels = output.channels().min(src.channels());
        let (out_channels, src_channels, src_width) = (output.channels(), src.channels(), src.width());
        let out_stride = output.row_stride();
        if out_stride == 0 {
            return;
        }
        output
            .data_mut()
            .par_chunks_mut(out_stride)
            .take(height)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..width {
                    for c in 0..channels {
                        let v = &mut row[x * out_channels + c];
                        *v = (*v + src.data()[(y * src_width + x) * src_channels + c] * opacity).clamp(0.0, 1.0);
                    }
                }
            });
    }

    pub fn blend_pass(&self, pass: &RenderPass, output: &mut ImageData, mode: BlendMode, opacity: f32) -> Result<()> {
        *output = compositor::blend(output, &pass.image, mode, opacity)?;
        Ok(())
    }

    pub fn multiply_pass(&self, pass: &RenderPass, output: &mut ImageData) -> Result<()> {
        self.blend_pass(pass, output, BlendMode::Multiply, 1.0)
    }

    pub fn screen_pass(&self, pass: &RenderPass, output: &mut ImageData) -> Result<()> {
        self.blend_pass(pass, output, BlendMode::Screen, 1.0)
    }

    pub fn overlay_pass(&self, pass: &RenderPass, output: &mut ImageData) -> Result<()> {
        self.blend_pass(pass, output, BlendMode::Overlay, 1.0)
    }

    // --- utilities ---

    pub fn resize_image(&self, input: &ImageData, new_width: usize, new_height: usize) -> Result<ImageData> {
        resize::resize_bilinear(input, new_width, new_height)
    }

    pub fn convert_to_linear(&self, image: &mut ImageData) {
        color_processing::convert_to_linear(image);
    }

    pub fn convert_to_srgb(&self, image: &mut ImageData) {
        color_processing::convert_to_srgb(image);
    }

    pub fn normalize_image(&self, image: &mut ImageData) {
        color_processing::normalize_image(image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn filled(name: &str, width: usize, height: usize, px: &[f32]) -> RenderPass {
        let mut pass = RenderPass::new(name, width, height, px.len(), false);
        for chunk in pass.image.data_mut().chunks_exact_mut(px.len()) {
            chunk.copy_from_slice(px);
        }
        pass
    }

    #[test]
    fn add_render_pass_replaces_existing_entry() {
        let mut processor = ExrProcessor::new();
        processor.add_render_pass("beauty", 4, 4, 4, false).image.fill(1.0);
        processor.add_render_pass("beauty", 2, 2, 3, true);
        assert_eq!(processor.len(), 1);
        let pass = processor.render_pass("beauty").unwrap();
        assert_eq!(pass.image.dimensions(), (2, 2));
        assert_eq!(pass.channels(), 3);
        assert!(pass.is_alpha);
        assert_eq!(pass.layer_name, "beauty");
        assert!(pass.image.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn missing_pass_lookup_is_none() {
        let processor = ExrProcessor::new();
        assert!(processor.render_pass("nothing").is_none());
    }

    #[test]
    fn clear_passes_is_idempotent() {
        let mut processor = ExrProcessor::new();
        processor.clear_passes();
        processor.add_render_pass("a", 1, 1, 1, false);
        processor.add_render_pass("b", 1, 1, 1, false);
        processor.clear_passes();
        processor.clear_passes();
        assert!(processor.is_empty());
    }

    #[test]
    fn registry_helpers() {
        let mut processor = ExrProcessor::new();
        processor.add_render_pass("specular", 1, 1, 3, false);
        processor.add_render_pass("albedo", 1, 1, 3, false);
        assert!(processor.insert_render_pass(filled("depth", 1, 1, &[0.5])).is_none());
        assert!(processor.insert_render_pass(filled("depth", 1, 1, &[0.7])).is_some());
        assert_eq!(processor.pass_names(), ["albedo", "depth", "specular"]);
        processor.render_pass_mut("albedo").unwrap().image.fill(0.25);
        assert_eq!(processor.render_pass("albedo").unwrap().image.get(0, 0, 2), 0.25);
        assert_eq!(processor.remove_render_pass("depth").unwrap().image.get(0, 0, 0), 0.7);
        assert_eq!(processor.len(), 2);
    }

    #[test]
    fn composite_adds_and_clamps() {
        let mut processor = ExrProcessor::new();
        processor.insert_render_pass(filled("beauty", 4, 4, &[1.0, 0.0, 0.0, 0.0]));
        processor.insert_render_pass(filled("depth", 4, 4, &[0.5]));
        let out = processor.composite_passes(&["beauty", "depth"]).unwrap();
        assert_eq!(out.channels(), 4);
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(out.get(x, y, 0), 1.0);
                assert_eq!(out.pixel(x, y)[1..], [0.0, 0.0, 0.0]);
            }
        }
    }

    #[test]
    fn composite_accumulates_below_one() {
        let mut processor = ExrProcessor::new();
        processor.insert_render_pass(filled("diffuse", 2, 2, &[0.25, 0.1, 0.0]));
        processor.insert_render_pass(filled("specular", 2, 2, &[0.25, 0.2, 0.3]));
        processor.insert_render_pass(filled("emission", 2, 2, &[0.25, 0.0, 0.0]));
        let out = processor.composite_passes(&["diffuse", "specular", "emission"]).unwrap();
        let px = out.pixel(1, 1);
        assert!((px[0] - 0.75).abs() < 1e-6);
        assert!((px[1] - 0.3).abs() < 1e-6);
        assert!((px[2] - 0.3).abs() < 1e-6);
    }

    #[test]
    fn composite_reports_missing_and_empty_names() {
        let mut processor = ExrProcessor::new();
        processor.add_render_pass("beauty", 2, 2, 4, false);
        match processor.composite_passes(&["beauty", "ghost"]) {
            Err(ProcessingError::PassNotFound(name)) => assert_eq!(name, "ghost"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(processor.composite_passes(&[]), Err(ProcessingError::Precondition(_))));
    }

    #[test]
    fn blend_passes_interpolates() {
        let processor = ExrProcessor::new();
        let a = filled("a", 1, 1, &[1.0, 0.0, 0.0, 1.0]);
        let b = filled("b", 1, 1, &[0.0, 1.0, 0.0, 1.0]);
        let out = processor.blend_passes(&a, &b, 0.5).unwrap();
        assert_eq!(out.pixel(0, 0), &[0.5, 0.5, 0.0, 1.0]);
    }

    #[test]
    fn blend_passes_pads_and_checks_size() {
        let processor = ExrProcessor::new();
        let a = filled("a", 2, 1, &[0.8]);
        let b = filled("b", 2, 1, &[0.2, 0.4, 0.6]);
        let out = processor.blend_passes(&a, &b, 0.25).unwrap();
        assert_eq!(out.channels(), 3);
        let px = out.pixel(1, 0);
        assert!((px[0] - 0.65).abs() < 1e-6);
        assert!((px[1] - 0.1).abs() < 1e-6);

        let c = filled("c", 1, 2, &[0.0]);
        assert!(matches!(processor.blend_passes(&a, &c, 0.5), Err(ProcessingError::DimensionMismatch { .. })));
    }

    #[test]
    fn add_pass_into_empty_output_copies() {
        let processor = ExrProcessor::new();
        let pass = filled("p", 2, 2, &[0.9, 0.8]);
        let mut out = ImageData::default();
        processor.add_pass(&pass, &mut out, 0.1);
        assert_eq!(out, pass.image);
    }

    #[test]
    fn add_pass_uses_overlap_only() {
        let processor = ExrProcessor::new();
        let mut out = ImageData::new(3, 3, 2);
        out.fill(0.5);
        let pass = filled("small", 2, 2, &[0.5]);
        processor.add_pass(&pass, &mut out, 0.5);
        assert_eq!(out.get(0, 0, 0), 0.75);
        assert_eq!(out.get(1, 1, 0), 0.75);
        assert_eq!(out.get(0, 0, 1), 0.5);
        assert_eq!(out.get(2, 2, 0), 0.5);
    }

    #[test]
    fn multiply_screen_overlay_wrappers() {
        let processor = ExrProcessor::new();
        let pass = filled("p", 1, 1, &[0.5, 0.5, 0.5]);
        let base = ImageData::from_vec(1, 1, 3, vec![0.5, 0.25, 1.0]).unwrap();

        let mut out = base.clone();
        processor.multiply_pass(&pass, &mut out).unwrap();
        assert_eq!(out.pixel(0, 0), &[0.25, 0.125, 0.5]);

        let mut out = base.clone();
        processor.screen_pass(&pass, &mut out).unwrap();
        assert_eq!(out.pixel(0, 0), &[0.75, 0.625, 1.0]);

        let mut out = base;
        processor.overlay_pass(&pass, &mut out).unwrap();
        assert_eq!(out.pixel(0, 0), &[0.5, 0.25, 1.0]);

        let wrong = filled("w", 2, 1, &[0.5]);
        let mut out = ImageData::new(1, 1, 1);
        assert!(processor.multiply_pass(&wrong, &mut out).is_err());
    }

    #[test]
    fn resize_keeps_corners() {
        let processor = ExrProcessor::new();
        let input = ImageData::from_vec(2, 2, 1, vec![0.1, 0.2, 0.3, 0.4]).unwrap();
        let out = processor.resize_image(&input, 4, 4).unwrap();
        assert_eq!(out.get(0, 0, 0), 0.1);
        assert_eq!(out.get(3, 0, 0), 0.2);
        assert_eq!(out.get(0, 3, 0), 0.3);
        assert_eq!(out.get(3, 3, 0), 0.4);
    }

    #[test]
    fn edge_detection_needs_color() {
        let processor = ExrProcessor::new();
        let mut gray = ImageData::new(3, 3, 1);
        assert!(processor.apply_edge_detection(&mut gray).is_err());
        let mut rgb = ImageData::new(3, 3, 3);
        assert!(processor.apply_edge_detection(&mut rgb).is_ok());
    }

    #[test]
    fn blur_with_even_kernel_fails() {
        let processor = ExrProcessor::new();
        let mut img = ImageData::new(3, 3, 4);
        assert!(processor.apply_gaussian_blur_with_kernel(&mut img, 1.0, 2).is_err());
        assert!(processor.apply_gaussian_blur_with_kernel(&mut img, 1.0, 7).is_ok());
    }

    #[test]
    fn blur_wrappers_reject_non_finite_sigma() {
        let processor = ExrProcessor::new();
        let mut img = ImageData::new(3, 3, 4);
        assert!(matches!(processor.apply_gaussian_blur(&mut img, f32::INFINITY), Err(ProcessingError::Precondition(_))));
        assert!(matches!(processor.apply_unsharp_mask(&mut img, f32::NAN, 1.0, 0.0), Err(ProcessingError::Precondition(_))));
        assert!(processor.apply_gaussian_blur(&mut img, 1.5).is_ok());
    }

    #[test]
    fn registered_passes_round_trip_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("packed.exr");
        let mut processor = ExrProcessor::new();
        processor.insert_render_pass(filled("beauty", 3, 2, &[0.1, 0.2, 0.3, 1.0]));
        processor.insert_render_pass(filled("depth", 3, 2, &[4.5]));
        processor.add_render_pass("unused", 3, 2, 3, false);
        processor.save_registered_passes(&path, &["depth", "beauty"]).unwrap();

        let loaded = processor.load_multi_plane_exr(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].image, processor.render_pass("beauty").unwrap().image);
        assert_eq!(loaded[1].image.get(2, 1, 0), 4.5);

        assert!(matches!(
            processor.save_registered_passes(&path, &["beauty", "nope"]),
            Err(ProcessingError::PassNotFound(_))
        ));
    }

    #[test]
    fn single_plane_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rgba.exr");
        let processor = ExrProcessor::new();
        let mut image = ImageData::new(2, 2, 4);
        image.fill(0.5);
        processor.save_exr(&path, &image).unwrap();
        assert_eq!(processor.load_exr(&path).unwrap(), image);
        assert!(processor.save_exr(&path, &ImageData::new(2, 2, 1)).is_err());
    }

    #[test]
    fn tone_mapping_skips_alpha() {
        let processor = ExrProcessor::new();
        let mut image = ImageData::from_vec(1, 1, 4, vec![1.0, 1.0, 1.0, 0.3]).unwrap();
        processor.apply_tone_mapping(&mut image, 1.0, 1.0);
        let expected = 1.0 - (-1.0f32).exp();
        assert!((image.get(0, 0, 0) - expected).abs() < 1e-6);
        assert_eq!(image.get(0, 0, 3), 0.3);
    }
}

use rayon::prelude::*;

use crate::error::{ProcessingError, Result};
use crate::image_data::ImageData;

/// Bilinear resample to `new_width x new_height`.
///
/// Output pixel `x` samples source coordinate `x * (in_w / out_w)`; the two
/// neighbouring taps are edge-clamped, so boundary pixels reduce to nearest
/// sampling.
pub fn resize_bilinear(input: &ImageData, new_width: usize, new_height: usize) -> Result<ImageData> {
    if new_width == 0 || new_height == 0 {
        return Err(ProcessingError::precondition(format!(
            "resize target must be non-empty, got {}x{}",
            new_width, new_height
        )));
    }
    if input.is_empty() {
        return Err(ProcessingError::precondition("cannot resize an empty image"));
    }

    let (in_w, in_h, channels) = (input.width(), input.height(), input.channels());
    let mut output = ImageData::new(new_width, new_height, channels);
    if channels == 0 {
        return Ok(output);
    }

    let x_ratio = in_w as f32 / new_width as f32;
    let y_ratio = in_h as f32 / new_height as f32;
    let src = input.data();
    let stride = output.row_stride();

    output
        .data_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = y as f32 * y_ratio;
            let y1 = (sy.floor() as usize).min(in_h - 1);
            let y2 = (y1 + 1).min(in_h - 1);
            let fy = sy - y1 as f32;
            for x in 0..new_width {
                let sx = x as f32 * x_ratio;
                let x1 = (sx.floor() as usize).min(in_w - 1);
                let x2 = (x1 + 1).min(in_w - 1);
                let fx = sx - x1 as f32;
                for c in 0..channels {
                    let at = |px: usize, py: usize| src[(py * in_w + px) * channels + c];
                    let top = at(x1, y1) * (1.0 - fx) + at(x2, y1) * fx;
                    let bottom = at(x1, y2) * (1.0 - fx) + at(x2, y2) * fx;
                    row[x * channels + c] = top * (1.0 - fy) + bottom * fy;
                }
            }
        });
    Ok(output)
}

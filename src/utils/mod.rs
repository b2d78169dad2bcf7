use std::path::Path;

use burn::prelude::*;
use image::{GenericImage, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::error::{InpaintError, Result};
use crate::model::{constants::CHANNELS, region::Region};

const HOLE_OUTLINE: Rgb<u8> = Rgb([255, 0, 0]);

/// Planar CHW floats in [-1, 1] back to an RGB image.
pub fn chw_vec_to_image(data: &[f32], height: usize, width: usize) -> Option<RgbImage> {
    let plane = height * width;
    if data.len() != plane * CHANNELS {
        return None;
    }

    let raw_pixels: Vec<u8> = (0..plane)
        .flat_map(|index| (0..CHANNELS).map(move |channel| data[channel * plane + index]))
        .map(|val| {
            // Reversing the normalization: (val + 1.0) * 127.5
            let denormalized = (val + 1.0) * 127.5;
            denormalized.clamp(0.0, 255.0) as u8
        })
        .collect();

    RgbImage::from_raw(width as u32, height as u32, raw_pixels)
}

/// First sample of a `[b, c, h, w]` batch as an image.
pub fn tensor_to_image<B: Backend>(images: Tensor<B, 4>) -> Option<RgbImage> {
    let [_, channels, height, width] = images.dims();
    let first: Tensor<B, 3> = images.slice([0..1, 0..channels, 0..height, 0..width]).squeeze(0);
    let data: Vec<f32> = first.into_data().convert::<f32>().to_vec().ok()?;
    chw_vec_to_image(&data, height, width)
}

/// Original, erased, coarse and refined panels side by side, hole outlined on each.
pub fn save_panels(panels: &[RgbImage; 4], region: &Region, path: &Path) -> Result<()> {
    let (width, height) = panels[0].dimensions();
    let mut canvas = RgbImage::new(width * panels.len() as u32, height);

    for (index, panel) in panels.iter().enumerate() {
        let offset = index as u32 * width;
        canvas.copy_from(panel, offset, 0)?;
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(offset as i32 + region.left as i32, region.bottom as i32)
                .of_size(region.width() as u32, region.height() as u32),
            HOLE_OUTLINE,
        );
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    canvas.save(path).map_err(InpaintError::from)
}

/// Saves original | erased | coarse | refined for the first sample of the batch.
pub fn save_inpainting_sample<B: Backend>(
    pristine: Tensor<B, 4>,
    erased: Tensor<B, 4>,
    coarse: Tensor<B, 4>,
    refined: Tensor<B, 4>,
    region: &Region,
    path: &Path,
) -> Result<()> {
    let panel = |images: Tensor<B, 4>| {
        tensor_to_image(images).ok_or_else(|| InpaintError::SampleImage {
            path: path.to_path_buf(),
        })
    };
    let panels = [panel(pristine)?, panel(erased)?, panel(coarse)?, panel(refined)?];
    save_panels(&panels, region, path)
}

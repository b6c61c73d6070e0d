use burn::prelude::*;
use image::{Rgb, RgbImage};
use std::path::Path;

use crate::error::{InfoGanError, Result};

/// Lays out `[N, C, H, W]` images with values in [0, 1] on a grid `ncol` images wide.
pub fn image_grid<B: Backend>(images: Tensor<B, 4>, ncol: usize) -> Result<RgbImage> {
    let [count, channels, height, width] = images.dims();
    let ncol = ncol.clamp(1, count.max(1));
    let nrow = count.div_ceil(ncol);

    // Supports both 1 and 3 channels image
    if channels != 1 && channels != 3 {
        return Err(InfoGanError::InvalidConfig(format!(
            "cannot render {channels}-channel images"
        )));
    }

    // [N, C, H, W] -> [N, H, W, C]
    let values = images
        .permute([0, 2, 3, 1])
        .into_data()
        .iter::<f32>()
        .collect::<Vec<f32>>();

    let mut imgbuf = RgbImage::new((ncol * width) as u32, (nrow * height) as u32);
    for (index, image) in values.chunks(height * width * channels).enumerate() {
        let (row, col) = (index / ncol, index % ncol);
        for (offset, pixel) in image.chunks(channels).enumerate() {
            let (y, x) = (offset / width, offset % width);
            let rgb = match pixel {
                [v] => [to_byte(*v); 3],
                [r, g, b] => [to_byte(*r), to_byte(*g), to_byte(*b)],
                _ => unreachable!(),
            };
            imgbuf.put_pixel(
                (col * width + x) as u32,
                (row * height + y) as u32,
                Rgb(rgb),
            );
        }
    }

    Ok(imgbuf)
}

pub fn save_image_grid<B: Backend, Q: AsRef<Path>>(
    images: Tensor<B, 4>,
    ncol: usize,
    path: Q,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    image_grid(images, ncol)?.save(path)?;
    Ok(())
}

fn to_byte(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

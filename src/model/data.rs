use burn::data::dataloader::batcher::Batcher;
use burn::data::dataset::Dataset;
use burn::prelude::*;
use image::{ImageReader, imageops::FilterType};
use log::{error, warn};
use std::path::{Path, PathBuf};

use crate::error::{InpaintError, Result};
use crate::model::constants::CHANNELS;

#[derive(Debug, Clone)]
pub struct ImageItem {
    /// CHW, normalized to [-1, 1].
    pub image: Vec<f32>,
    pub size: usize,
}

/// Every decodable image under a directory, resized to `size` x `size`.
///
/// Files are decoded once when the dataset is opened and the ones that fail
/// are dropped there, so every index below `len()` maps to a loadable image.
pub struct ImageFolderDataset {
    pub image_paths: Vec<PathBuf>,
    size: usize,
}

impl ImageFolderDataset {
    pub fn new<P: AsRef<Path>>(path: P, size: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut image_paths = Vec::new();

        for entry in std::fs::read_dir(path)? {
            let entry = entry?;
            let path = entry.path();

            if path.is_file() {
                if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
                    match ext.to_lowercase().as_str() {
                        "jpg" | "jpeg" | "png" | "bmp" | "tiff" => {
                            image_paths.push(path);
                        }
                        _ => {}
                    }
                }
            }
        }
        image_paths.sort();
        image_paths.retain(|image_path| match decode_check(image_path) {
            Ok(()) => true,
            Err(err) => {
                warn!("skipping {}: {}", image_path.display(), err);
                false
            }
        });

        if image_paths.is_empty() {
            return Err(InpaintError::Dataset {
                path: path.to_path_buf(),
                reason: "no decodable image files found in the directory".into(),
            });
        }
        Ok(Self { image_paths, size })
    }
}

fn decode_check(path: &Path) -> Result<()> {
    ImageReader::open(path)?.decode()?;
    Ok(())
}

/// Decodes an image file into normalized CHW floats.
pub fn load_image(path: &Path, size: usize) -> Result<Vec<f32>> {
    let image = ImageReader::open(path)?.decode()?;
    let image = image
        .resize_exact(size as u32, size as u32, FilterType::Triangle)
        .to_rgb8();

    let plane = size * size;
    let mut image_data = vec![0.0f32; CHANNELS * plane];
    for (index, pixel) in image.pixels().enumerate() {
        for channel in 0..CHANNELS {
            // Normalize to [-1, 1]
            image_data[channel * plane + index] = (pixel[channel] as f32 / 127.5) - 1.0;
        }
    }
    Ok(image_data)
}

impl Dataset<ImageItem> for ImageFolderDataset {
    fn len(&self) -> usize {
        self.image_paths.len()
    }

    fn get(&self, index: usize) -> Option<ImageItem> {
        let path = self.image_paths.get(index)?;
        match load_image(path, self.size) {
            Ok(image) => Some(ImageItem {
                image,
                size: self.size,
            }),
            Err(err) => {
                // changed on disk after the dataset was opened
                error!("failed to load {}: {}", path.display(), err);
                None
            }
        }
    }
}

#[derive(Clone, Default)]
pub struct InpaintingBatcher {}

#[derive(Clone, Debug)]
pub struct InpaintingBatch<B: Backend> {
    pub images: Tensor<B, 4>, // Shape: [batch_size, channels, height, width]
}

impl<B: Backend> Batcher<B, ImageItem, InpaintingBatch<B>> for InpaintingBatcher {
    fn batch(&self, items: Vec<ImageItem>, device: &B::Device) -> InpaintingBatch<B> {
        let image_tensors: Vec<Tensor<B, 4>> = items
            .into_iter()
            .map(|item| {
                Tensor::<B, 3>::from_data(
                    TensorData::new(item.image, [CHANNELS, item.size, item.size])
                        .convert::<B::FloatElem>(),
                    device,
                )
                .unsqueeze_dim::<4>(0)
            })
            .collect();
        let images = Tensor::cat(image_tensors, 0);
        InpaintingBatch { images }
    }
}

use burn::prelude::*;
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::error::{InpaintError, Result};

/// Rectangular hole in pixel coordinates.
///
/// `left..right` runs along the width axis (tensor dim 3) and `bottom..top`
/// along the height axis (tensor dim 2). Both ranges are half-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub left: usize,
    pub right: usize,
    pub bottom: usize,
    pub top: usize,
}

impl Region {
    pub fn new(
        left: usize,
        right: usize,
        bottom: usize,
        top: usize,
        height: usize,
        width: usize,
    ) -> Result<Self> {
        if left >= right || bottom >= top || right > width || top > height {
            return Err(InpaintError::RegionOutOfBounds {
                left,
                right,
                bottom,
                top,
                height,
                width,
            });
        }
        Ok(Self {
            left,
            right,
            bottom,
            top,
        })
    }

    /// Square hole of side `hole` in the middle of a `height` x `width` image.
    pub fn centered(hole: usize, height: usize, width: usize) -> Result<Self> {
        check_fits(hole, hole, height, width)?;
        let bottom = (height - hole) / 2;
        let left = (width - hole) / 2;
        Self::new(left, left + hole, bottom, bottom + hole, height, width)
    }

    pub fn width(&self) -> usize {
        self.right - self.left
    }

    pub fn height(&self) -> usize {
        self.top - self.bottom
    }

    pub fn contains(&self, row: usize, col: usize) -> bool {
        (self.bottom..self.top).contains(&row) && (self.left..self.right).contains(&col)
    }
}

fn check_fits(hole_height: usize, hole_width: usize, height: usize, width: usize) -> Result<()> {
    if hole_height == 0 || hole_width == 0 || hole_height > height || hole_width > width {
        return Err(InpaintError::HoleTooLarge {
            hole_height,
            hole_width,
            height,
            width,
        });
    }
    Ok(())
}

/// Placement policy for the per-step hole.
#[derive(Debug, Clone)]
pub enum RegionSampler {
    /// Uniform placement of a fixed-size hole.
    Random {
        hole_height: usize,
        hole_width: usize,
        rng: StdRng,
    },
    Fixed(Region),
}

impl RegionSampler {
    pub fn random(hole_height: usize, hole_width: usize, seed: u64) -> Self {
        Self::Random {
            hole_height,
            hole_width,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn fixed(region: Region) -> Self {
        Self::Fixed(region)
    }

    pub fn hole_shape(&self) -> [usize; 2] {
        match self {
            Self::Random {
                hole_height,
                hole_width,
                ..
            } => [*hole_height, *hole_width],
            Self::Fixed(region) => [region.height(), region.width()],
        }
    }

    pub fn sample(&mut self, height: usize, width: usize) -> Result<Region> {
        match self {
            Self::Random {
                hole_height,
                hole_width,
                rng,
            } => {
                check_fits(*hole_height, *hole_width, height, width)?;
                let left = rng.random_range(0..=width - *hole_width);
                let bottom = rng.random_range(0..=height - *hole_height);
                Region::new(
                    left,
                    left + *hole_width,
                    bottom,
                    bottom + *hole_height,
                    height,
                    width,
                )
            }
            Self::Fixed(region) => Region::new(
                region.left,
                region.right,
                region.bottom,
                region.top,
                height,
                width,
            ),
        }
    }
}

/// Binary `[batch, height, width]` mask, 1.0 inside `region`.
///
/// One region is shared by every sample of the batch.
pub fn build_mask<B: Backend>(
    region: &Region,
    shape: [usize; 3],
    device: &B::Device,
) -> Tensor<B, 3> {
    let [batch, height, width] = shape;
    Tensor::<B, 3>::zeros([batch, height, width], device).slice_assign(
        [0..batch, region.bottom..region.top, region.left..region.right],
        Tensor::ones([batch, region.height(), region.width()], device),
    )
}

/// Copy of `images` with the hole set to 0.0. The argument stays the pristine target.
pub fn erase_hole<B: Backend>(images: &Tensor<B, 4>, region: &Region) -> Tensor<B, 4> {
    let [batch, channels, _, _] = images.dims();
    let zeros = Tensor::zeros(
        [batch, channels, region.height(), region.width()],
        &images.device(),
    );
    images.clone().slice_assign(
        [
            0..batch,
            0..channels,
            region.bottom..region.top,
            region.left..region.right,
        ],
        zeros,
    )
}

/// Network output inside the mask, pristine pixels everywhere else.
pub fn composite<B: Backend>(
    output: Tensor<B, 4>,
    pristine: Tensor<B, 4>,
    mask: Tensor<B, 3>,
) -> Tensor<B, 4> {
    let channels = output.dims()[1];
    let mask = mask.unsqueeze_dim::<4>(1).repeat_dim(1, channels);
    let keep = mask.clone().neg().add_scalar(1.0);
    output * mask + pristine * keep
}

pub fn crop<B: Backend>(images: Tensor<B, 4>, region: &Region) -> Tensor<B, 4> {
    let [batch, channels, _, _] = images.dims();
    images.slice([
        0..batch,
        0..channels,
        region.bottom..region.top,
        region.left..region.right,
    ])
}

use std::path::PathBuf;

use thiserror::Error;

use crate::model::step::StepKind;

#[derive(Debug, Error)]
pub enum InpaintError {
    #[error("hole of {hole_height}x{hole_width} does not fit in an image of {height}x{width}")]
    HoleTooLarge {
        hole_height: usize,
        hole_width: usize,
        height: usize,
        width: usize,
    },

    #[error("image batch is empty")]
    EmptyBatch,

    #[error("expected {expected} image channels, got {actual}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error(
        "region [{left}, {right}) x [{bottom}, {top}) is outside an image of {height}x{width}"
    )]
    RegionOutOfBounds {
        left: usize,
        right: usize,
        bottom: usize,
        top: usize,
        height: usize,
        width: usize,
    },

    #[error("spatial discount gamma must lie in (0, 1), got {0}")]
    InvalidGamma(f64),

    #[error("image side {0} must be a positive multiple of 4")]
    InvalidImageSize(usize),

    #[error("optimizer index {0} is neither 0 (critic) nor 1 (generator)")]
    InvalidOptimizerIndex(usize),

    #[error("{kind} loss became non-finite ({value}) at step {step}")]
    NonFiniteLoss {
        kind: StepKind,
        step: usize,
        value: f32,
    },

    #[error("dataset error in {path}: {reason}")]
    Dataset { path: PathBuf, reason: String },

    #[error("sample tensors for {path} do not hold RGB images")]
    SampleImage { path: PathBuf },

    #[error(transparent)]
    Image(#[from] image::ImageError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = InpaintError> = std::result::Result<T, E>;

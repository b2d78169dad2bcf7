use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use burn::{
    data::{dataloader::DataLoaderBuilder, dataset::Dataset},
    module::AutodiffModule,
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
};
use log::info;

use crate::error::{InpaintError, Result};
use crate::model::{
    architecture::{InpaintingModel, ModelConfig, check_image_size},
    data::{ImageFolderDataset, InpaintingBatcher},
    inference::inpaint,
    optim::{OptimizerParams, init_optimizers},
    region::{Region, RegionSampler, erase_hole},
    step::{DiscountSettings, InpaintingGan, LogSink, StepContext, StepKind},
};
use crate::utils::save_inpainting_sample;

#[derive(Config)]
pub struct TrainingConfig {
    pub dataset_dir: String,

    #[config(default = "ModelConfig::new()")]
    pub model: ModelConfig,

    #[config(default = "OptimizerParams::default()")]
    pub optimizer: OptimizerParams,

    #[config(default = 256)]
    pub image_size: usize,

    #[config(default = 64)]
    pub hole_size: usize,

    #[config(default = 0.999)]
    pub discount_gamma: f64,

    #[config(default = true)]
    pub discount_from_boundary: bool,

    #[config(default = 100)]
    pub num_epochs: usize,

    #[config(default = 16)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub num_workers: usize,

    #[config(default = 42)]
    pub seed: u64,

    #[config(default = 100)]
    pub log_interval: usize,

    #[config(default = true)]
    pub save_samples: bool,
}

impl TrainingConfig {
    /// Rejects shapes and constants that would only fail mid-run.
    pub fn validate(&self) -> Result<()> {
        check_image_size(self.image_size, self.image_size)?;
        if self.hole_size == 0 || self.hole_size > self.image_size {
            return Err(InpaintError::HoleTooLarge {
                hole_height: self.hole_size,
                hole_width: self.hole_size,
                height: self.image_size,
                width: self.image_size,
            });
        }
        if !(self.discount_gamma > 0.0 && self.discount_gamma < 1.0) {
            return Err(InpaintError::InvalidGamma(self.discount_gamma));
        }
        Ok(())
    }

    pub fn discount(&self) -> DiscountSettings {
        DiscountSettings {
            gamma: self.discount_gamma,
            from_boundary: self.discount_from_boundary,
        }
    }
}

fn create_artifact_dir(artifact_dir: &str) -> std::io::Result<()> {
    // Remove existing artifacts so stale checkpoints never mix with a new run
    std::fs::remove_dir_all(artifact_dir).ok();
    std::fs::create_dir_all(artifact_dir)
}

pub fn checkpoint_path(artifact_dir: &str, epoch: Option<usize>) -> PathBuf {
    match epoch {
        Some(epoch) => Path::new(artifact_dir).join(format!("model-epoch-{epoch}")),
        None => Path::new(artifact_dir).join("model"),
    }
}

pub fn train<B: AutodiffBackend>(
    artifact_dir: &str,
    config: TrainingConfig,
    device: B::Device,
) -> anyhow::Result<()> {
    config.validate().context("invalid training config")?;
    create_artifact_dir(artifact_dir)
        .with_context(|| format!("failed to create {artifact_dir}"))?;
    config
        .save(format!("{artifact_dir}/config.json"))
        .context("failed to save config")?;

    B::seed(config.seed);

    let dataset = ImageFolderDataset::new(&config.dataset_dir, config.image_size)
        .with_context(|| format!("failed to open dataset {}", config.dataset_dir))?;
    info!(
        "training on {} images of {}x{} with a {}x{} hole",
        dataset.len(),
        config.image_size,
        config.image_size,
        config.hole_size,
        config.hole_size
    );

    let dataloader_train = DataLoaderBuilder::new(InpaintingBatcher::default())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset);

    let model = config.model.init::<B>(&device);
    let sampler = RegionSampler::random(config.hole_size, config.hole_size, config.seed);
    let mut gan = InpaintingGan::new(model, config.model.channels(), sampler, config.discount())?;
    let mut optimizers = init_optimizers::<B>(config.optimizer);
    let mut ctx = StepContext::<B, _>::new(device.clone(), LogSink::new(config.log_interval));

    for epoch in 1..=config.num_epochs {
        let mut last_images = None;

        for (batch_idx, batch) in dataloader_train.iter().enumerate() {
            let images = batch.images.to_device(&device);

            // critic first, then generator, each on a fresh forward pass
            for kind in StepKind::ALTERNATION {
                let output = gan
                    .training_step(&mut ctx, images.clone(), batch_idx, kind)
                    .with_context(|| format!("{kind} step failed in epoch {epoch} batch {batch_idx}"))?;
                gan = gan.apply(output, &mut optimizers);
            }
            last_images = Some(images);
        }

        info!("epoch {epoch}/{} done after {} steps", config.num_epochs, ctx.global_step);
        save_checkpoint(gan.model(), &checkpoint_path(artifact_dir, Some(epoch)))?;

        if !config.save_samples {
            continue;
        }
        if let Some(images) = last_images {
            let path = Path::new(artifact_dir)
                .join("samples")
                .join(format!("sample-epoch-{epoch}.png"));
            save_epoch_sample(gan.model(), images, config.hole_size, &path)
                .with_context(|| format!("failed to save {}", path.display()))?;
        }
    }

    save_checkpoint(gan.model(), &checkpoint_path(artifact_dir, None))?;
    Ok(())
}

fn save_checkpoint<B: Backend>(model: &InpaintingModel<B>, path: &Path) -> anyhow::Result<()> {
    info!("saving checkpoint {}", path.display());
    model
        .clone()
        .save_file(path.to_path_buf(), &CompactRecorder::new())
        .with_context(|| format!("failed to save {}", path.display()))
}

fn save_epoch_sample<B: AutodiffBackend>(
    model: &InpaintingModel<B>,
    images: Tensor<B, 4>,
    hole_size: usize,
    path: &Path,
) -> Result<()> {
    let model = model.valid();
    let pristine = images.inner();
    let [_, _, height, width] = pristine.dims();
    let region = Region::centered(hole_size, height, width)?;

    let erased = erase_hole(&pristine, &region);
    let (coarse, refined) = inpaint(&model, pristine.clone(), &region)?;
    save_inpainting_sample(pristine, erased, coarse, refined, &region, path)
}

/// Loads `config.json` and a checkpoint (the final one unless `epoch` is given).
pub fn load_checkpoint<B: Backend>(
    artifact_dir: &str,
    epoch: Option<usize>,
    device: &B::Device,
) -> anyhow::Result<(TrainingConfig, InpaintingModel<B>)> {
    let config_path = format!("{artifact_dir}/config.json");
    let config = TrainingConfig::load(&config_path)
        .map_err(|err| anyhow!("failed to load {config_path}: {err:?}"))?;

    let path = checkpoint_path(artifact_dir, epoch);
    let model = config
        .model
        .init::<B>(device)
        .load_file(path.clone(), &CompactRecorder::new(), device)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok((config, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        architecture::{
            CoarseNetworkConfig, GlobalCriticConfig, LocalCriticConfig, RefinementNetworkConfig,
        },
        constants::{DISCOUNT_GAMMA, HOLE_SIZE, IMAGE_SIZE},
        optim::GroupParams,
    };
    use burn::backend::{Autodiff, NdArray};
    use image::{Rgb, RgbImage};

    fn tiny_config(dataset_dir: &Path) -> TrainingConfig {
        TrainingConfig::new(dataset_dir.display().to_string())
            .with_model(
                ModelConfig::new()
                    .with_coarse_network(CoarseNetworkConfig::new().with_base_channels(4))
                    .with_refinement_network(RefinementNetworkConfig::new().with_base_channels(4))
                    .with_local_critic(LocalCriticConfig::new().with_base_channels(4))
                    .with_global_critic(GlobalCriticConfig::new().with_base_channels(4)),
            )
            .with_image_size(16)
            .with_hole_size(8)
            .with_num_epochs(1)
            .with_batch_size(2)
            .with_num_workers(1)
            .with_log_interval(1)
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("inpaint_gan_{name}_{}", std::process::id()));
        std::fs::remove_dir_all(&dir).ok();
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn defaults_match_the_reference_regime() {
        let config = TrainingConfig::new("data".into());
        assert_eq!(config.image_size, IMAGE_SIZE);
        assert_eq!(config.hole_size, HOLE_SIZE);
        assert_eq!(config.discount_gamma, DISCOUNT_GAMMA);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_fails_fast() {
        let config = TrainingConfig::new("data".into());
        assert!(matches!(
            config.clone().with_hole_size(512).validate(),
            Err(InpaintError::HoleTooLarge { .. })
        ));
        assert!(matches!(
            config.clone().with_image_size(30).validate(),
            Err(InpaintError::InvalidImageSize(30))
        ));
        assert!(matches!(
            config.with_discount_gamma(1.5).validate(),
            Err(InpaintError::InvalidGamma(_))
        ));
    }

    #[test]
    fn optimizer_params_keep_their_keys_in_saved_config() {
        let config = TrainingConfig::new("data".into()).with_optimizer(OptimizerParams {
            critic: GroupParams { lr: 4e-4 },
            generator: GroupParams { lr: 1e-4 },
        });
        let json: serde_json::Value = serde_json::from_str(&config.to_string()).unwrap();
        assert_eq!(json["optimizer"]["D"]["lr"], 4e-4);
        assert_eq!(json["optimizer"]["G"]["lr"], 1e-4);
    }

    #[test]
    fn one_epoch_writes_checkpoints_and_samples() {
        let data_dir = scratch_dir("train_data");
        for (index, color) in [[200, 10, 10], [10, 200, 10], [10, 10, 200]].into_iter().enumerate() {
            RgbImage::from_pixel(20, 20, Rgb(color))
                .save(data_dir.join(format!("{index}.png")))
                .unwrap();
        }
        let artifact_dir = scratch_dir("train_artifacts");
        let artifact_dir = artifact_dir.to_str().unwrap();

        train::<Autodiff<NdArray<f32>>>(artifact_dir, tiny_config(&data_dir), Default::default())
            .unwrap();

        let root = Path::new(artifact_dir);
        assert!(root.join("config.json").exists());
        assert!(root.join("model-epoch-1.mpk").exists());
        assert!(root.join("model.mpk").exists());
        assert!(root.join("samples").join("sample-epoch-1.png").exists());

        let (config, _model) =
            load_checkpoint::<NdArray<f32>>(artifact_dir, Some(1), &Default::default()).unwrap();
        assert_eq!(config.hole_size, 8);
    }

    #[test]
    fn missing_dataset_aborts_training() {
        let artifact_dir = scratch_dir("train_missing");
        let config = tiny_config(&artifact_dir.join("nowhere"));
        let result = train::<Autodiff<NdArray<f32>>>(
            artifact_dir.to_str().unwrap(),
            config,
            Default::default(),
        );
        assert!(result.is_err());
    }
}

use std::fmt;

use burn::{
    optim::{GradientsParams, Optimizer},
    prelude::*,
    tensor::{ElementConversion, backend::AutodiffBackend},
};
use log::{debug, info};

use crate::{
    error::{InpaintError, Result},
    model::{
        architecture::{CriticPair, InpaintingGenerator, InpaintingModel, check_image_size},
        discount::discount_map,
        optim::InpaintingOptimizers,
        region::{Region, RegionSampler, build_mask, composite, crop, erase_hole},
    },
};

/// Which parameter group a training step updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    Critic,
    Generator,
}

impl StepKind {
    pub const ALTERNATION: [StepKind; 2] = [StepKind::Critic, StepKind::Generator];

    pub fn optimizer_index(self) -> usize {
        match self {
            Self::Critic => 0,
            Self::Generator => 1,
        }
    }
}

impl TryFrom<usize> for StepKind {
    type Error = InpaintError;

    fn try_from(index: usize) -> Result<Self> {
        match index {
            0 => Ok(Self::Critic),
            1 => Ok(Self::Generator),
            other => Err(InpaintError::InvalidOptimizerIndex(other)),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Critic => write!(f, "critic"),
            Self::Generator => write!(f, "generator"),
        }
    }
}

/// Host-side values of the terms that make up a step loss.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LossBreakdown {
    /// `mean(fake) - mean(real)` for each critic.
    Critic { local_gap: f32, global_gap: f32 },
    /// Discounted L1 over the hole, plus the negated critic scores.
    Generator { reconstruction: f32, adversarial: f32 },
}

impl LossBreakdown {
    pub fn total(&self) -> f32 {
        match *self {
            Self::Critic {
                local_gap,
                global_gap,
            } => local_gap + global_gap,
            Self::Generator {
                reconstruction,
                adversarial,
            } => reconstruction + adversarial,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub global_step: usize,
    pub batch_idx: usize,
    pub kind: StepKind,
    pub region: Region,
    pub loss: f32,
    pub breakdown: LossBreakdown,
}

pub trait LossSink {
    fn record(&mut self, record: &StepRecord);
}

/// Writes step losses through `log` every `interval` logical steps.
#[derive(Debug, Clone)]
pub struct LogSink {
    interval: usize,
}

impl LogSink {
    pub fn new(interval: usize) -> Self {
        Self {
            interval: interval.max(1),
        }
    }
}

impl LossSink for LogSink {
    fn record(&mut self, record: &StepRecord) {
        if record.global_step % self.interval != 0 {
            debug!(
                "step {} {} loss {:.4}",
                record.global_step, record.kind, record.loss
            );
            return;
        }
        match record.breakdown {
            LossBreakdown::Critic {
                local_gap,
                global_gap,
            } => info!(
                "[Step {} Batch {}] D Loss: {:.4} (local {:.4}, global {:.4})",
                record.global_step, record.batch_idx, record.loss, local_gap, global_gap
            ),
            LossBreakdown::Generator {
                reconstruction,
                adversarial,
            } => info!(
                "[Step {} Batch {}] G Loss: {:.4} (l1 {:.4}, adv {:.4})",
                record.global_step, record.batch_idx, record.loss, reconstruction, adversarial
            ),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct LossHistory {
    pub records: Vec<StepRecord>,
}

impl LossSink for LossHistory {
    fn record(&mut self, record: &StepRecord) {
        self.records.push(record.clone());
    }
}

/// Per-run state handed to every step: device, step counter and log sink.
pub struct StepContext<B: Backend, S: LossSink = LogSink> {
    pub device: B::Device,
    /// Completed critic/generator rounds.
    pub global_step: usize,
    pub sink: S,
}

impl<B: Backend, S: LossSink> StepContext<B, S> {
    pub fn new(device: B::Device, sink: S) -> Self {
        Self {
            device,
            global_step: 0,
            sink,
        }
    }
}

/// Result of one optimizer turn. The gradients belong to `kind`'s group only.
pub struct StepOutput<B: AutodiffBackend> {
    pub kind: StepKind,
    pub loss: Tensor<B, 1>,
    pub breakdown: LossBreakdown,
    pub region: Region,
    grads: GradientsParams,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiscountSettings {
    pub gamma: f64,
    pub from_boundary: bool,
}

/// Owns the four networks and runs the alternating adversarial steps.
pub struct InpaintingGan<B: AutodiffBackend> {
    model: InpaintingModel<B>,
    sampler: RegionSampler,
    channels: usize,
    discount: DiscountSettings,
    discount_cache: Option<([usize; 2], Tensor<B, 2>)>,
}

impl<B: AutodiffBackend> InpaintingGan<B> {
    pub fn new(
        model: InpaintingModel<B>,
        channels: usize,
        sampler: RegionSampler,
        discount: DiscountSettings,
    ) -> Result<Self> {
        if !(discount.gamma > 0.0 && discount.gamma < 1.0) {
            return Err(InpaintError::InvalidGamma(discount.gamma));
        }
        Ok(Self {
            model,
            sampler,
            channels,
            discount,
            discount_cache: None,
        })
    }

    pub fn model(&self) -> &InpaintingModel<B> {
        &self.model
    }

    pub fn into_model(self) -> InpaintingModel<B> {
        self.model
    }

    /// One optimizer turn: sample a hole, run both generators, composite and
    /// compute the loss for `kind`. The update itself is left to [`Self::apply`].
    pub fn training_step<S: LossSink>(
        &mut self,
        ctx: &mut StepContext<B, S>,
        images: Tensor<B, 4>,
        batch_idx: usize,
        kind: StepKind,
    ) -> Result<StepOutput<B>> {
        let [batch, channels, height, width] = images.dims();
        if batch == 0 {
            return Err(InpaintError::EmptyBatch);
        }
        if channels != self.channels {
            return Err(InpaintError::ChannelMismatch {
                expected: self.channels,
                actual: channels,
            });
        }
        let [hole_height, hole_width] = self.sampler.hole_shape();
        if hole_height > height || hole_width > width {
            return Err(InpaintError::HoleTooLarge {
                hole_height,
                hole_width,
                height,
                width,
            });
        }
        check_image_size(height, width)?;

        let region = self.sampler.sample(height, width)?;
        let pristine = images.to_device(&ctx.device);
        let mask = build_mask::<B>(&region, [batch, height, width], &ctx.device);
        let erased = erase_hole(&pristine, &region);

        let (coarse, refined) = self.model.generator.forward(erased, mask.clone());
        let coarse_composite = composite(coarse, pristine.clone(), mask.clone());
        let refined_composite = composite(refined, pristine.clone(), mask);

        let (loss, breakdown) = match kind {
            StepKind::Critic => self.critic_loss(&region, refined_composite, pristine),
            StepKind::Generator => {
                let weights = self.discount_weights([region.height(), region.width()], &ctx.device)?;
                self.generator_loss(&region, coarse_composite, refined_composite, pristine, weights)
            }
        };

        let value = scalar(loss.clone());
        if !value.is_finite() {
            return Err(InpaintError::NonFiniteLoss {
                kind,
                step: ctx.global_step,
                value,
            });
        }

        let grads = loss.backward();
        let grads = match kind {
            StepKind::Critic => GradientsParams::from_grads(grads, &self.model.critics),
            StepKind::Generator => GradientsParams::from_grads(grads, &self.model.generator),
        };

        ctx.sink.record(&StepRecord {
            global_step: ctx.global_step,
            batch_idx,
            kind,
            region,
            loss: value,
            breakdown,
        });
        if kind == StepKind::Generator {
            ctx.global_step += 1;
        }

        Ok(StepOutput {
            kind,
            loss,
            breakdown,
            region,
            grads,
        })
    }

    /// [`Self::training_step`] addressed by optimizer index: 0 for the critics, 1 for the generators.
    pub fn training_step_indexed<S: LossSink>(
        &mut self,
        ctx: &mut StepContext<B, S>,
        images: Tensor<B, 4>,
        batch_idx: usize,
        optimizer_idx: usize,
    ) -> Result<StepOutput<B>> {
        let kind = StepKind::try_from(optimizer_idx)?;
        self.training_step(ctx, images, batch_idx, kind)
    }

    /// Applies `output`'s gradients with the optimizer bound to its group.
    pub fn apply<OD, OG>(
        mut self,
        output: StepOutput<B>,
        optimizers: &mut InpaintingOptimizers<OD, OG>,
    ) -> Self
    where
        OD: Optimizer<CriticPair<B>, B>,
        OG: Optimizer<InpaintingGenerator<B>, B>,
    {
        let InpaintingModel { generator, critics } = self.model;
        self.model = match output.kind {
            StepKind::Critic => InpaintingModel {
                generator,
                critics: optimizers.step_critics(critics, output.grads),
            },
            StepKind::Generator => InpaintingModel {
                generator: optimizers.step_generator(generator, output.grads),
                critics,
            },
        };
        self
    }

    fn critic_loss(
        &self,
        region: &Region,
        refined_composite: Tensor<B, 4>,
        pristine: Tensor<B, 4>,
    ) -> (Tensor<B, 1>, LossBreakdown) {
        let critics = &self.model.critics;
        // no gradient may reach the generators from here
        let fake = refined_composite.detach();

        let fake_local = critics.local.forward(crop(fake.clone(), region)).mean();
        let real_local = critics.local.forward(crop(pristine.clone(), region)).mean();
        let fake_global = critics.global.forward(fake).mean();
        let real_global = critics.global.forward(pristine).mean();

        let local_gap = fake_local - real_local;
        let global_gap = fake_global - real_global;
        let breakdown = LossBreakdown::Critic {
            local_gap: scalar(local_gap.clone()),
            global_gap: scalar(global_gap.clone()),
        };
        (local_gap + global_gap, breakdown)
    }

    fn generator_loss(
        &self,
        region: &Region,
        coarse_composite: Tensor<B, 4>,
        refined_composite: Tensor<B, 4>,
        pristine: Tensor<B, 4>,
        weights: Tensor<B, 2>,
    ) -> (Tensor<B, 1>, LossBreakdown) {
        let critics = &self.model.critics;
        let refined_hole = crop(refined_composite.clone(), region);
        let reconstruction = reconstruction_loss(
            region,
            coarse_composite,
            refined_composite.clone(),
            pristine,
            weights,
        );

        let adversarial = critics.local.forward(refined_hole).mean().neg()
            - critics.global.forward(refined_composite).mean();

        let breakdown = LossBreakdown::Generator {
            reconstruction: scalar(reconstruction.clone()),
            adversarial: scalar(adversarial.clone()),
        };
        (reconstruction + adversarial, breakdown)
    }

    fn discount_weights(&mut self, shape: [usize; 2], device: &B::Device) -> Result<Tensor<B, 2>> {
        if let Some((cached_shape, weights)) = &self.discount_cache {
            if *cached_shape == shape {
                return Ok(weights.clone());
            }
        }
        let weights = discount_map::<B>(
            self.discount.gamma,
            shape,
            self.discount.from_boundary,
            device,
        )?;
        self.discount_cache = Some((shape, weights.clone()));
        Ok(weights)
    }
}

/// `mean(weights * (|coarse - x| + |refined - x|))` over the hole crop, where
/// `weights` is the `[hole_height, hole_width]` discount map.
pub fn reconstruction_loss<B: Backend>(
    region: &Region,
    coarse_composite: Tensor<B, 4>,
    refined_composite: Tensor<B, 4>,
    pristine: Tensor<B, 4>,
    weights: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let target = crop(pristine, region);
    let coarse_hole = crop(coarse_composite, region);
    let refined_hole = crop(refined_composite, region);

    let l1 = (coarse_hole - target.clone()).abs() + (refined_hole - target).abs();
    let [batch, channels, _, _] = l1.dims();
    let weights = weights
        .unsqueeze::<4>()
        .repeat_dim(0, batch)
        .repeat_dim(1, channels);
    (l1 * weights).mean()
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f32 {
    tensor.into_scalar().elem::<f32>()
}

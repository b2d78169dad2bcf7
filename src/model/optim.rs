use burn::{
    optim::{AdamConfig, GradientsParams, Optimizer},
    tensor::backend::AutodiffBackend,
};
use serde::{Deserialize, Serialize};

use crate::model::architecture::{CriticPair, InpaintingGenerator};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupParams {
    pub lr: f64,
}

/// Learning rates keyed the way the config file spells them: `{"D": {..}, "G": {..}}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerParams {
    #[serde(rename = "D")]
    pub critic: GroupParams,
    #[serde(rename = "G")]
    pub generator: GroupParams,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            critic: GroupParams { lr: 1e-4 },
            generator: GroupParams { lr: 1e-4 },
        }
    }
}

/// Exactly two optimizers: index 0 owns the critic group, index 1 the generator group.
pub struct InpaintingOptimizers<OD, OG> {
    critic: OD,
    generator: OG,
    critic_lr: f64,
    generator_lr: f64,
}

pub fn init_optimizers<B: AutodiffBackend>(
    params: OptimizerParams,
) -> InpaintingOptimizers<impl Optimizer<CriticPair<B>, B>, impl Optimizer<InpaintingGenerator<B>, B>>
{
    InpaintingOptimizers {
        critic: AdamConfig::new().init::<B, CriticPair<B>>(),
        generator: AdamConfig::new().init::<B, InpaintingGenerator<B>>(),
        critic_lr: params.critic.lr,
        generator_lr: params.generator.lr,
    }
}

impl<OD, OG> InpaintingOptimizers<OD, OG> {
    pub fn step_critics<B>(&mut self, critics: CriticPair<B>, grads: GradientsParams) -> CriticPair<B>
    where
        B: AutodiffBackend,
        OD: Optimizer<CriticPair<B>, B>,
    {
        self.critic.step(self.critic_lr, critics, grads)
    }

    pub fn step_generator<B>(
        &mut self,
        generator: InpaintingGenerator<B>,
        grads: GradientsParams,
    ) -> InpaintingGenerator<B>
    where
        B: AutodiffBackend,
        OG: Optimizer<InpaintingGenerator<B>, B>,
    {
        self.generator.step(self.generator_lr, generator, grads)
    }

    pub fn learning_rates(&self) -> [f64; 2] {
        [self.critic_lr, self.generator_lr]
    }
}

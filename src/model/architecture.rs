use burn::{
    nn::{
        LeakyRelu, LeakyReluConfig, Linear, LinearConfig, PaddingConfig2d, Relu, Tanh,
        conv::{Conv2d, Conv2dConfig, ConvTranspose2d, ConvTranspose2dConfig},
        pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig},
    },
    prelude::*,
};

use crate::error::{InpaintError, Result};

/// Image sides must divide by this for the generators to return their input shape.
pub const SIZE_MULTIPLE: usize = 4;

/// Fails on the first side the encoder-decoder cannot reproduce.
pub fn check_image_size(height: usize, width: usize) -> Result<()> {
    for side in [height, width] {
        if side == 0 || side % SIZE_MULTIPLE != 0 {
            return Err(InpaintError::InvalidImageSize(side));
        }
    }
    Ok(())
}

/// Checkpoint unit: both parameter groups.
#[derive(Module, Debug)]
pub struct InpaintingModel<B: Backend> {
    pub generator: InpaintingGenerator<B>,
    pub critics: CriticPair<B>,
}

/// Generator parameter group, updated by optimizer 1.
#[derive(Module, Debug)]
pub struct InpaintingGenerator<B: Backend> {
    pub coarse: CoarseNetwork<B>,
    pub refinement: RefinementNetwork<B>,
}

/// Critic parameter group, updated by optimizer 0.
#[derive(Module, Debug)]
pub struct CriticPair<B: Backend> {
    pub local: LocalCritic<B>,
    pub global: GlobalCritic<B>,
}

#[derive(Module, Debug)]
pub struct CoarseNetwork<B: Backend> {
    body: EncoderDecoder<B>,
}

#[derive(Module, Debug)]
pub struct RefinementNetwork<B: Backend> {
    body: EncoderDecoder<B>,
}

#[derive(Module, Debug)]
pub struct LocalCritic<B: Backend> {
    body: CriticBody<B>,
}

#[derive(Module, Debug)]
pub struct GlobalCritic<B: Backend> {
    body: CriticBody<B>,
}

/// Downsample x4, dilated middle, upsample x4. H and W must be multiples of 4.
#[derive(Module, Debug)]
pub struct EncoderDecoder<B: Backend> {
    conv_in: Conv2d<B>,
    down1: Conv2d<B>,
    down2: Conv2d<B>,
    dilated: Vec<Conv2d<B>>,
    up1: ConvTranspose2d<B>,
    up2: ConvTranspose2d<B>,
    conv_out: Conv2d<B>,
    activation: Relu,
    activation_final: Tanh,
}

/// Strided conv stack pooled to a single unbounded score per sample.
#[derive(Module, Debug)]
pub struct CriticBody<B: Backend> {
    convs: Vec<Conv2d<B>>,
    pool: AdaptiveAvgPool2d,
    head: Linear<B>,
    activation: LeakyRelu,
}

#[derive(Config, Debug)]
pub struct CoarseNetworkConfig {
    #[config(default = "3")]
    pub channels: usize,
    #[config(default = "32")]
    pub base_channels: usize,
}

#[derive(Config, Debug)]
pub struct RefinementNetworkConfig {
    #[config(default = "3")]
    pub channels: usize,
    #[config(default = "32")]
    pub base_channels: usize,
}

#[derive(Config, Debug)]
pub struct LocalCriticConfig {
    #[config(default = "3")]
    pub channels: usize,
    #[config(default = "64")]
    pub base_channels: usize,
    #[config(default = "3")]
    pub depth: usize,
    #[config(default = "0.2")]
    pub leaky_relu_slope: f64,
}

#[derive(Config, Debug)]
pub struct GlobalCriticConfig {
    #[config(default = "3")]
    pub channels: usize,
    #[config(default = "64")]
    pub base_channels: usize,
    #[config(default = "4")]
    pub depth: usize,
    #[config(default = "0.2")]
    pub leaky_relu_slope: f64,
}

#[derive(Config, Debug)]
pub struct ModelConfig {
    #[config(default = "CoarseNetworkConfig::new()")]
    pub coarse_network: CoarseNetworkConfig,
    #[config(default = "RefinementNetworkConfig::new()")]
    pub refinement_network: RefinementNetworkConfig,
    #[config(default = "LocalCriticConfig::new()")]
    pub local_critic: LocalCriticConfig,
    #[config(default = "GlobalCriticConfig::new()")]
    pub global_critic: GlobalCriticConfig,
}

impl ModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> InpaintingModel<B> {
        InpaintingModel {
            generator: InpaintingGenerator {
                coarse: self.coarse_network.init(device),
                refinement: self.refinement_network.init(device),
            },
            critics: CriticPair {
                local: self.local_critic.init(device),
                global: self.global_critic.init(device),
            },
        }
    }

    pub fn channels(&self) -> usize {
        self.coarse_network.channels
    }
}

impl CoarseNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> CoarseNetwork<B> {
        CoarseNetwork {
            body: EncoderDecoder::new(self.channels, self.channels, self.base_channels, device),
        }
    }
}

impl RefinementNetworkConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RefinementNetwork<B> {
        // the mask rides along as one extra input channel
        RefinementNetwork {
            body: EncoderDecoder::new(
                self.channels + 1,
                self.channels,
                self.base_channels,
                device,
            ),
        }
    }
}

impl LocalCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LocalCritic<B> {
        LocalCritic {
            body: CriticBody::new(
                self.channels,
                self.base_channels,
                self.depth,
                self.leaky_relu_slope,
                device,
            ),
        }
    }
}

impl GlobalCriticConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> GlobalCritic<B> {
        GlobalCritic {
            body: CriticBody::new(
                self.channels,
                self.base_channels,
                self.depth,
                self.leaky_relu_slope,
                device,
            ),
        }
    }
}

impl<B: Backend> EncoderDecoder<B> {
    fn new(in_channels: usize, out_channels: usize, base: usize, device: &B::Device) -> Self {
        let wide = base * 4;
        let dilated = [2, 4, 8]
            .into_iter()
            .map(|rate| {
                Conv2dConfig::new([wide, wide], [3, 3])
                    .with_dilation([rate, rate])
                    .with_padding(PaddingConfig2d::Explicit(rate, rate))
                    .init(device)
            })
            .collect();

        Self {
            conv_in: Conv2dConfig::new([in_channels, base], [5, 5])
                .with_padding(PaddingConfig2d::Explicit(2, 2))
                .init(device),
            down1: Conv2dConfig::new([base, base * 2], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device), // H -> H/2
            down2: Conv2dConfig::new([base * 2, wide], [3, 3])
                .with_stride([2, 2])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device), // H/2 -> H/4
            dilated,
            up1: ConvTranspose2dConfig::new([wide, base * 2], [3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_padding_out([1, 1])
                .init(device), // H/4 -> H/2
            up2: ConvTranspose2dConfig::new([base * 2, base], [3, 3])
                .with_stride([2, 2])
                .with_padding([1, 1])
                .with_padding_out([1, 1])
                .init(device), // H/2 -> H
            conv_out: Conv2dConfig::new([base, out_channels], [3, 3])
                .with_padding(PaddingConfig2d::Explicit(1, 1))
                .init(device),
            activation: Relu,
            activation_final: Tanh::new(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 4> {
        let mut x = self.activation.forward(self.conv_in.forward(input));
        x = self.activation.forward(self.down1.forward(x));
        x = self.activation.forward(self.down2.forward(x));
        for conv in &self.dilated {
            x = self.activation.forward(conv.forward(x));
        }
        x = self.activation.forward(self.up1.forward(x));
        x = self.activation.forward(self.up2.forward(x));
        x = self.conv_out.forward(x);
        self.activation_final.forward(x)
    }
}

impl<B: Backend> CriticBody<B> {
    fn new(
        channels: usize,
        base: usize,
        depth: usize,
        slope: f64,
        device: &B::Device,
    ) -> Self {
        let mut convs = Vec::with_capacity(depth);
        let mut in_channels = channels;
        let mut out_channels = base;
        for _ in 0..depth {
            convs.push(
                Conv2dConfig::new([in_channels, out_channels], [5, 5])
                    .with_stride([2, 2])
                    .with_padding(PaddingConfig2d::Explicit(2, 2))
                    .init(device),
            );
            in_channels = out_channels;
            out_channels = (out_channels * 2).min(base * 8);
        }

        Self {
            convs,
            pool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            head: LinearConfig::new(in_channels, 1).init(device),
            activation: LeakyReluConfig::new().with_negative_slope(slope).init(),
        }
    }

    fn forward(&self, input: Tensor<B, 4>) -> Tensor<B, 2> {
        let mut x = input;
        for conv in &self.convs {
            x = self.activation.forward(conv.forward(x));
        }
        let x = self.pool.forward(x);
        let [batch, features, _, _] = x.dims();
        self.head.forward(x.reshape([batch, features]))
    }
}

impl<B: Backend> CoarseNetwork<B> {
    pub fn forward(&self, erased: Tensor<B, 4>) -> Tensor<B, 4> {
        self.body.forward(erased)
    }
}

impl<B: Backend> RefinementNetwork<B> {
    pub fn forward(&self, coarse: Tensor<B, 4>, mask: Tensor<B, 3>) -> Tensor<B, 4> {
        let input = Tensor::cat(vec![coarse, mask.unsqueeze_dim::<4>(1)], 1);
        self.body.forward(input)
    }
}

impl<B: Backend> LocalCritic<B> {
    /// Scores hole crops, one value per sample.
    pub fn forward(&self, crops: Tensor<B, 4>) -> Tensor<B, 2> {
        self.body.forward(crops)
    }
}

impl<B: Backend> GlobalCritic<B> {
    /// Scores whole images, one value per sample.
    pub fn forward(&self, images: Tensor<B, 4>) -> Tensor<B, 2> {
        self.body.forward(images)
    }
}

impl<B: Backend> InpaintingGenerator<B> {
    /// Returns the raw `(coarse, refined)` outputs, before compositing.
    pub fn forward(&self, erased: Tensor<B, 4>, mask: Tensor<B, 3>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        let coarse = self.coarse.forward(erased);
        let refined = self.refinement.forward(coarse.clone(), mask);
        (coarse, refined)
    }
}

impl<B: Backend> InpaintingModel<B> {
    pub fn forward(&self, erased: Tensor<B, 4>, mask: Tensor<B, 3>) -> (Tensor<B, 4>, Tensor<B, 4>) {
        self.generator.forward(erased, mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::constants::CHANNELS;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn tiny_config() -> ModelConfig {
        ModelConfig::new()
            .with_coarse_network(CoarseNetworkConfig::new().with_base_channels(4))
            .with_refinement_network(RefinementNetworkConfig::new().with_base_channels(4))
            .with_local_critic(LocalCriticConfig::new().with_base_channels(4))
            .with_global_critic(GlobalCriticConfig::new().with_base_channels(4))
    }

    #[test]
    fn generators_preserve_shape() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let erased = Tensor::<TestBackend, 4>::zeros([2, 3, 32, 48], &device);
        let mask = Tensor::<TestBackend, 3>::zeros([2, 32, 48], &device);

        let (coarse, refined) = model.forward(erased, mask);
        assert_eq!(coarse.dims(), [2, 3, 32, 48]);
        assert_eq!(refined.dims(), [2, 3, 32, 48]);

        let values = refined.into_data().to_vec::<f32>().unwrap();
        assert!(values.iter().all(|v| (-1.0..=1.0).contains(v)));
    }

    #[test]
    fn critics_score_each_sample() {
        let device = Default::default();
        let model = tiny_config().init::<TestBackend>(&device);
        let crops = Tensor::<TestBackend, 4>::ones([3, 3, 16, 16], &device);
        let images = Tensor::<TestBackend, 4>::ones([3, 3, 64, 64], &device);

        assert_eq!(model.critics.local.forward(crops).dims(), [3, 1]);
        assert_eq!(model.critics.global.forward(images).dims(), [3, 1]);
    }

    #[test]
    fn config_survives_json() {
        let config = tiny_config();
        let json = serde_json::to_string(&config).unwrap();
        let restored: ModelConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.local_critic.base_channels, 4);
        assert_eq!(restored.global_critic.depth, 4);
        assert_eq!(restored.channels(), CHANNELS);
    }

    #[test]
    fn image_sides_must_divide_by_four() {
        assert!(check_image_size(256, 32).is_ok());
        assert!(matches!(
            check_image_size(30, 32),
            Err(InpaintError::InvalidImageSize(30))
        ));
        assert!(matches!(
            check_image_size(32, 18),
            Err(InpaintError::InvalidImageSize(18))
        ));
        assert!(matches!(
            check_image_size(0, 32),
            Err(InpaintError::InvalidImageSize(0))
        ));
    }
}

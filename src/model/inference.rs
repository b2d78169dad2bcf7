use std::path::Path;

use burn::prelude::*;

use crate::error::Result;
use crate::model::{
    architecture::{InpaintingModel, check_image_size},
    constants::CHANNELS,
    data::load_image,
    region::{Region, build_mask, composite, erase_hole},
};
use crate::utils::save_inpainting_sample;

/// Composited `(coarse, refined)` fills for `pristine` with `region` erased.
pub fn inpaint<B: Backend>(
    model: &InpaintingModel<B>,
    pristine: Tensor<B, 4>,
    region: &Region,
) -> Result<(Tensor<B, 4>, Tensor<B, 4>)> {
    let [batch, _, height, width] = pristine.dims();
    check_image_size(height, width)?;
    let mask = build_mask::<B>(region, [batch, height, width], &pristine.device());
    let erased = erase_hole(&pristine, region);
    let (coarse, refined) = model.forward(erased, mask.clone());
    Ok((
        composite(coarse, pristine.clone(), mask.clone()),
        composite(refined, pristine, mask),
    ))
}

/// Erases a centered `hole` x `hole` square from the image at `input`, fills
/// it and writes the comparison strip to `output`.
pub fn inpaint_image<B: Backend>(
    model: &InpaintingModel<B>,
    input: &Path,
    image_size: usize,
    hole: usize,
    output: &Path,
    device: &B::Device,
) -> Result<Region> {
    check_image_size(image_size, image_size)?;
    let region = Region::centered(hole, image_size, image_size)?;
    let data = load_image(input, image_size)?;
    let pristine = Tensor::<B, 3>::from_data(
        TensorData::new(data, [CHANNELS, image_size, image_size]).convert::<B::FloatElem>(),
        device,
    )
    .unsqueeze_dim::<4>(0);

    let erased = erase_hole(&pristine, &region);
    let (coarse, refined) = inpaint(model, pristine.clone(), &region)?;
    save_inpainting_sample(pristine, erased, coarse, refined, &region, output)?;
    Ok(region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InpaintError;
    use crate::model::architecture::{
        CoarseNetworkConfig, GlobalCriticConfig, LocalCriticConfig, ModelConfig,
        RefinementNetworkConfig,
    };
    use burn::{backend::NdArray, tensor::Distribution};

    type TestBackend = NdArray<f32>;

    fn tiny_model() -> InpaintingModel<TestBackend> {
        ModelConfig::new()
            .with_coarse_network(CoarseNetworkConfig::new().with_base_channels(4))
            .with_refinement_network(RefinementNetworkConfig::new().with_base_channels(4))
            .with_local_critic(LocalCriticConfig::new().with_base_channels(4))
            .with_global_critic(GlobalCriticConfig::new().with_base_channels(4))
            .init(&Default::default())
    }

    #[test]
    fn fills_only_the_hole() {
        let model = tiny_model();
        let pristine = Tensor::<TestBackend, 4>::random(
            [1, 3, 16, 16],
            Distribution::Uniform(-1.0, 1.0),
            &Default::default(),
        );
        let region = Region::centered(8, 16, 16).unwrap();
        let (coarse, refined) = inpaint(&model, pristine.clone(), &region).unwrap();

        let original = pristine.into_data().to_vec::<f32>().unwrap();
        for output in [coarse, refined] {
            let values = output.into_data().to_vec::<f32>().unwrap();
            for (index, (&got, &orig)) in values.iter().zip(original.iter()).enumerate() {
                let row = (index / 16) % 16;
                let col = index % 16;
                if !region.contains(row, col) {
                    assert_eq!(got, orig);
                }
            }
        }
    }

    #[test]
    fn writes_comparison_strip() {
        let dir = std::env::temp_dir().join(format!("inpaint_gan_infer_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let input = dir.join("in.png");
        image::RgbImage::from_pixel(24, 24, image::Rgb([10, 200, 30]))
            .save(&input)
            .unwrap();
        let output = dir.join("out.png");

        let region = inpaint_image(&tiny_model(), &input, 16, 8, &output, &Default::default())
            .unwrap();
        assert_eq!(region, Region::centered(8, 16, 16).unwrap());
        let saved = image::open(&output).unwrap();
        assert_eq!((saved.width(), saved.height()), (64, 16));
    }

    #[test]
    fn odd_sizes_are_rejected_before_the_forward_pass() {
        let model = tiny_model();
        let pristine = Tensor::<TestBackend, 4>::zeros([1, 3, 18, 18], &Default::default());
        let region = Region::centered(8, 18, 18).unwrap();
        assert!(matches!(
            inpaint(&model, pristine, &region),
            Err(InpaintError::InvalidImageSize(18))
        ));

        let missing = std::env::temp_dir().join("inpaint_gan_never_written.png");
        let output = std::env::temp_dir().join("inpaint_gan_never_written_out.png");
        assert!(matches!(
            inpaint_image(&model, &missing, 18, 8, &output, &Default::default()),
            Err(InpaintError::InvalidImageSize(18))
        ));
        assert!(!output.exists());
    }
}

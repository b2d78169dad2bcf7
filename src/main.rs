use std::path::PathBuf;

use anyhow::{Context, anyhow};
use argh::FromArgs;
use burn::{backend::Autodiff, prelude::*};
use log::info;

use inpaint_gan::model::{inference::inpaint_image, training};

#[cfg(not(feature = "cuda"))]
type MyBackend = burn::backend::NdArray<f32>;
#[cfg(feature = "cuda")]
type MyBackend = burn::backend::Cuda<f32, i32>;
type MyAutodiffBackend = Autodiff<MyBackend>;

/// Train and run a two-stage GAN that fills rectangular holes in images.
#[derive(FromArgs)]
struct Args {
    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Command {
    Train(TrainArgs),
    Inpaint(InpaintArgs),
}

/// train the generators and critics on a folder of images.
#[derive(FromArgs)]
#[argh(subcommand, name = "train")]
struct TrainArgs {
    /// training config (JSON); defaults are used when omitted.
    #[argh(option)]
    config: Option<PathBuf>,

    /// image folder, overrides the config's dataset_dir.
    #[argh(option)]
    dataset: Option<String>,

    /// where checkpoints, samples and config.json go.
    #[argh(option, default = "String::from(\"artifacts\")")]
    artifact_dir: String,
}

/// fill a centered hole in one image with a trained model.
#[derive(FromArgs)]
#[argh(subcommand, name = "inpaint")]
struct InpaintArgs {
    /// directory written by `train`.
    #[argh(option, default = "String::from(\"artifacts\")")]
    artifact_dir: String,

    /// load model-epoch-N instead of the final checkpoint.
    #[argh(option)]
    epoch: Option<usize>,

    /// input image.
    #[argh(positional)]
    input: PathBuf,

    /// output comparison strip.
    #[argh(option, default = "PathBuf::from(\"inpainted.png\")")]
    output: PathBuf,
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();

    let args: Args = argh::from_env();
    let device = <MyBackend as Backend>::Device::default();

    match args.command {
        Command::Train(args) => {
            let mut config = match &args.config {
                Some(path) => training::TrainingConfig::load(path)
                    .map_err(|err| anyhow!("failed to load {}: {:?}", path.display(), err))?,
                None => training::TrainingConfig::new("dataset/train".into()),
            };
            if let Some(dataset) = args.dataset {
                config.dataset_dir = dataset;
            }
            training::train::<MyAutodiffBackend>(&args.artifact_dir, config, device)
        }
        Command::Inpaint(args) => {
            let (config, model) =
                training::load_checkpoint::<MyBackend>(&args.artifact_dir, args.epoch, &device)?;
            let region = inpaint_image(
                &model,
                &args.input,
                config.image_size,
                config.hole_size,
                &args.output,
                &device,
            )
            .with_context(|| format!("failed to inpaint {}", args.input.display()))?;
            info!("filled {:?}, wrote {}", region, args.output.display());
            Ok(())
        }
    }
}

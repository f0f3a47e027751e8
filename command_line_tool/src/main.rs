use anyhow::{bail, Context, Result};
use clap::Parser;
use siftalign::alignment_processor::AlignmentProcessor;
use siftalign::config::{load_config, AlignConfig};
use siftalign::float_image::FloatImage;
use siftalign::transform_model::ModelFamily;
use std::path::{Path, PathBuf};
use tracing::info;

/// Command line arguments structure.
#[derive(Parser, Debug)]
#[command(author, version, about = "CLI for aligning images with scale-invariant features.")]
struct Args {
    /// Image filenames; every image is aligned into the frame of the first one
    #[arg(required = true, num_args = 2..)]
    images: Vec<PathBuf>,

    /// JSON configuration file; flags below override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Transform family: translation, rigid or affine
    #[arg(long)]
    model: Option<ModelFamily>,

    /// Seed of the RANSAC sampling
    #[arg(long)]
    seed: Option<u64>,

    /// Double the image resolution before extraction to find smaller features
    #[arg(long)]
    upscale: bool,

    /// Maximum number of RANSAC trials, shared by all epsilon rounds
    #[arg(long)]
    max_iterations: Option<usize>,
}

impl Args {
    fn config(&self) -> Result<AlignConfig> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => AlignConfig::default(),
        };
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(seed) = self.seed {
            config.ransac.seed = seed;
        }
        if let Some(max_iterations) = self.max_iterations {
            config.ransac.max_iterations = max_iterations;
        }
        config.sift.upscale |= self.upscale;
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let processor = AlignmentProcessor::new(args.config()?).context("invalid configuration")?;
    let images = args
        .images
        .iter()
        .map(|path| read_image(path))
        .collect::<Result<Vec<_>>>()?;

    if let [first, second] = images.as_slice() {
        // The second image is the reference, as for every later layer of a sequence.
        let alignment = processor
            .align_pair(second, first)
            .context("no transform aligns the images")?;
        println!("{}", alignment.model);
        println!(
            "rotation: {:.3} degrees",
            alignment.model.to_affine().rotation().to_degrees()
        );
        println!(
            "inliers: {} of {} candidates (epsilon {:.2}, mean error {:.3})",
            alignment.inliers.len(),
            alignment.candidates,
            alignment.epsilon,
            alignment.mean_error
        );
        return Ok(());
    }

    let layers = processor.align_sequence(&images);
    for (path, layer) in args.images.iter().zip(&layers) {
        let status = match &layer.alignment {
            Some(a) => format!("{} inliers", a.inliers.len()),
            None => "no model".to_string(),
        };
        println!("{} ({status}): {}", path.display(), layer.cumulative.to_affine());
    }
    Ok(())
}

/// Reads an image file as luminance in `[0, 1]`.
fn read_image(path: &Path) -> Result<FloatImage> {
    info!("Reading image file: {}", path.display());
    let img = image::open(path)
        .with_context(|| format!("could not load image {}", path.display()))?
        .to_luma32f();
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        bail!("image {} is empty", path.display());
    }
    Ok(FloatImage::from_raw(
        width as usize,
        height as usize,
        img.into_raw(),
    )?)
}

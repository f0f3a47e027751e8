use crate::config::SiftConfig;
use crate::error::ConfigError;
use crate::float_image::FloatImage;
use crate::gaussian_filter::gaussian_blur;
use crate::scale_octave::ScaleOctave;
use tracing::debug;

/// Blur assumed to be present in a camera image.
const INPUT_SIGMA: f32 = 0.5;

/// Gaussian scale space of one image, as a sequence of [ScaleOctave]s of
/// halving resolution.
///
/// Octaves whose shorter side is below `min_size` are never generated. Octaves
/// whose longer side exceeds `max_size` are blurred to twice the initial sigma
/// and decimated without building their blur stack, and do not appear in [ScaleSpacePyramid::octaves]; the count of
/// such leading octaves is kept so coordinates still map back to the input.
#[derive(Debug, Clone)]
pub struct ScaleSpacePyramid {
    octaves: Vec<ScaleOctave>,
    skipped_octaves: usize,
    input_scale: f32,
}

impl ScaleSpacePyramid {
    /// Prepares `image` and builds all octaves permitted by the size bounds.
    ///
    /// Preparation optionally stretches intensities to `[0, 1]`, optionally
    /// upsamples by two, and then blurs up to `initial_sigma` assuming an inherent
    /// blur of 0.5 input pixels (1.0 after upsampling).
    ///
    /// # Parameters
    /// - `image`: The input image. It is not modified.
    /// - `config`: Scale space parameters.
    ///
    /// # Returns
    /// The pyramid, possibly with zero octaves when the image is smaller than
    /// `min_size`, or a [ConfigError] for invalid parameters.
    pub fn build(image: &FloatImage, config: &SiftConfig) -> Result<ScaleSpacePyramid, ConfigError> {
        config.validate()?;
        Ok(Self::build_validated(image, config))
    }

    /// [ScaleSpacePyramid::build] for a configuration that already passed validation.
    pub(crate) fn build_validated(image: &FloatImage, config: &SiftConfig) -> ScaleSpacePyramid {
        let sigma0 = config.initial_sigma;

        let mut seed = if config.normalize_intensity {
            image.normalized()
        } else {
            image.clone()
        };
        let (inherent, input_scale) = if config.upscale {
            seed = seed.upsampled();
            (2.0 * INPUT_SIGMA, 0.5)
        } else {
            (INPUT_SIGMA, 1.0)
        };
        let initial_blur = (sigma0 * sigma0 - inherent * inherent).max(0.0).sqrt();
        seed = gaussian_blur(&seed, initial_blur);

        let mut octaves = Vec::new();
        let mut skipped_octaves = 0;
        loop {
            if seed.is_empty() || seed.width().min(seed.height()) < config.min_size {
                break;
            }
            if octaves.is_empty() && seed.width().max(seed.height()) > config.max_size {
                debug!(
                    width = seed.width(),
                    height = seed.height(),
                    "octave exceeds max_size, decimating"
                );
                // Blur from sigma0 to 2 * sigma0 before decimating, so the coarser
                // grid carries sigma0 again without aliasing.
                seed = gaussian_blur(&seed, sigma0 * 3f32.sqrt()).downsampled();
                skipped_octaves += 1;
                continue;
            }
            let octave = ScaleOctave::build(seed, config.steps, sigma0);
            debug!(
                octave = skipped_octaves + octaves.len(),
                width = octave.width(),
                height = octave.height(),
                "built octave"
            );
            seed = octave.next_seed();
            octaves.push(octave);
        }

        ScaleSpacePyramid {
            octaves,
            skipped_octaves,
            input_scale,
        }
    }

    pub fn octaves(&self) -> &[ScaleOctave] {
        &self.octaves
    }

    pub fn len(&self) -> usize {
        self.octaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octaves.is_empty()
    }

    /// Factor that maps pixel coordinates and blur of octave `index` back into the
    /// coordinates of the input image.
    pub fn octave_scale(&self, index: usize) -> f32 {
        2f32.powi((self.skipped_octaves + index) as i32) * self.input_scale
    }
}

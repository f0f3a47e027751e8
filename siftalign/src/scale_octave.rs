use crate::float_image::FloatImage;
use crate::gaussian_filter::gaussian_blur;

/// One octave of the scale space: `S + 3` progressively blurred images at a
/// common resolution and the `S + 2` differences of consecutive ones.
///
/// Step `i` carries blur `sigma_0 * 2^(i / S)` measured in this octave's pixels,
/// so step `S` is blurred exactly twice as much as step `0`.
#[derive(Debug, Clone)]
pub struct ScaleOctave {
    steps: Vec<FloatImage>,
    dogs: Vec<FloatImage>,
    sigmas: Vec<f32>,
    /// Steps per octave (`S`).
    scale_steps: usize,
}

impl ScaleOctave {
    /// Builds the blurred stack and its DoG images from `base`, which must
    /// already carry blur `initial_sigma`.
    ///
    /// # Parameters
    /// - `base`: Seed image of the octave.
    /// - `scale_steps`: Steps per octave `S` (at least 1).
    /// - `initial_sigma`: Blur of `base`.
    ///
    /// # Returns
    /// The complete octave. Each step is produced from the previous one with the
    /// incremental kernel `sqrt(sigma_i^2 - sigma_{i-1}^2)`.
    pub fn build(base: FloatImage, scale_steps: usize, initial_sigma: f32) -> ScaleOctave {
        let sigmas: Vec<f32> = (0..scale_steps + 3)
            .map(|i| initial_sigma * 2f32.powf(i as f32 / scale_steps as f32))
            .collect();

        let mut steps = Vec::with_capacity(sigmas.len());
        steps.push(base);
        for i in 1..sigmas.len() {
            let increment = (sigmas[i] * sigmas[i] - sigmas[i - 1] * sigmas[i - 1]).sqrt();
            let next = gaussian_blur(&steps[i - 1], increment);
            steps.push(next);
        }

        let dogs = steps
            .windows(2)
            .map(|pair| pair[1].difference(&pair[0]))
            .collect();

        ScaleOctave {
            steps,
            dogs,
            sigmas,
            scale_steps,
        }
    }

    pub fn width(&self) -> usize {
        self.steps[0].width()
    }

    pub fn height(&self) -> usize {
        self.steps[0].height()
    }

    /// Steps per octave (`S`).
    pub fn scale_steps(&self) -> usize {
        self.scale_steps
    }

    /// The `S + 3` blurred images, least blurred first.
    pub fn steps(&self) -> &[FloatImage] {
        &self.steps
    }

    /// The `S + 2` difference images; `dogs()[i] = steps()[i + 1] - steps()[i]`.
    pub fn dogs(&self) -> &[FloatImage] {
        &self.dogs
    }

    /// Blur of step `i` in octave pixels.
    pub fn sigma(&self, step: usize) -> f32 {
        self.sigmas[step]
    }

    /// Blur at a fractional step position, `sigma_0 * 2^(s / S)`.
    pub fn sigma_at(&self, step: f32) -> f32 {
        self.sigmas[0] * 2f32.powf(step / self.scale_steps as f32)
    }

    /// Seed of the next octave: step `S` (blur `2 * sigma_0`) decimated by two,
    /// which carries blur `sigma_0` in the coarser pixel grid.
    pub fn next_seed(&self) -> FloatImage {
        self.steps[self.scale_steps].downsampled()
    }
}

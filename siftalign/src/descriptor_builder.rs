use crate::config::SiftConfig;
use crate::feature::Feature;
use crate::float_image::FloatImage;
use crate::keypoint_detector::Keypoint;
use crate::scale_space_pyramid::ScaleSpacePyramid;
use std::f32::consts::PI;

/// Orientation window sigma, in multiples of the keypoint blur.
const ORIENTATION_WINDOW: f32 = 1.5;
/// Width of one descriptor cell, in multiples of the keypoint blur.
const CELL_WIDTH: f32 = 3.0;
/// Circular smoothing kernel of the orientation histogram.
const HISTOGRAM_SMOOTHING: [f32; 5] = [1.0 / 16.0, 4.0 / 16.0, 6.0 / 16.0, 4.0 / 16.0, 1.0 / 16.0];

/// Turns keypoints into oriented, described [Feature]s.
///
/// Each keypoint gets one feature per dominant gradient orientation. The
/// descriptor is a `fdsize x fdsize` grid of `fdbins`-bin gradient histograms
/// sampled in a window rotated to that orientation, so descriptors of the same
/// structure in rotated images compare equal under Euclidean distance.
#[derive(Debug, Clone)]
pub struct DescriptorBuilder {
    fdsize: usize,
    fdbins: usize,
    orientation_bins: usize,
    orientation_peak_ratio: f32,
    descriptor_clip: f32,
}

impl DescriptorBuilder {
    pub fn new(config: &SiftConfig) -> Self {
        DescriptorBuilder {
            fdsize: config.fdsize,
            fdbins: config.fdbins,
            orientation_bins: config.orientation_bins,
            orientation_peak_ratio: config.orientation_peak_ratio,
            descriptor_clip: config.descriptor_clip,
        }
    }

    pub fn descriptor_len(&self) -> usize {
        self.fdsize * self.fdsize * self.fdbins
    }

    /// Builds the features of one keypoint.
    ///
    /// # Parameters
    /// - `pyramid`: The scale space the keypoint was detected in.
    /// - `keypoint`: Location and blur in octave pixels.
    ///
    /// # Returns
    /// One feature per orientation peak, in input image coordinates. Empty when
    /// the neighbourhood carries no gradient energy.
    pub fn build(&self, pyramid: &ScaleSpacePyramid, keypoint: &Keypoint) -> Vec<Feature> {
        let octave = &pyramid.octaves()[keypoint.octave];
        let step = nearest_step(
            octave.sigma(0),
            octave.scale_steps(),
            keypoint.sigma,
            octave.steps().len(),
        );
        let image = &octave.steps()[step];
        let to_input = pyramid.octave_scale(keypoint.octave);

        self.orientations(image, keypoint.x, keypoint.y, keypoint.sigma)
            .into_iter()
            .filter_map(|orientation| {
                let descriptor =
                    self.descriptor(image, keypoint.x, keypoint.y, keypoint.sigma, orientation)?;
                Some(Feature {
                    x: keypoint.x * to_input,
                    y: keypoint.y * to_input,
                    scale: keypoint.sigma * to_input,
                    orientation,
                    descriptor,
                })
            })
            .collect()
    }

    /// Dominant gradient orientations around `(x, y)` in radians.
    ///
    /// Gradients within `3 * 1.5 * sigma` are accumulated with Gaussian weight into a
    /// circular histogram, which is smoothed once. Every local maximum reaching
    /// `orientation_peak_ratio` of the global maximum yields one orientation,
    /// refined by fitting a parabola through the peak and its two neighbours.
    pub fn orientations(&self, image: &FloatImage, x: f32, y: f32, sigma: f32) -> Vec<f32> {
        let bins = self.orientation_bins;
        let window_sigma = ORIENTATION_WINDOW * sigma;
        let radius = (3.0 * window_sigma).round() as isize;
        let cx = x.round() as isize;
        let cy = y.round() as isize;
        let bin_width = 2.0 * PI / bins as f32;

        let mut histogram = vec![0.0f32; bins];
        for py in cy - radius..=cy + radius {
            for px in cx - radius..=cx + radius {
                let rx = px as f32 - x;
                let ry = py as f32 - y;
                let r2 = rx * rx + ry * ry;
                if r2 > (radius * radius) as f32 {
                    continue;
                }
                let (gx, gy) = image.gradient(px, py);
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                let weight = (-r2 / (2.0 * window_sigma * window_sigma)).exp();
                let position = (gy.atan2(gx) + PI) / bin_width - 0.5;
                let lower = position.floor();
                let frac = position - lower;
                let b0 = (lower as isize).rem_euclid(bins as isize) as usize;
                let b1 = (b0 + 1) % bins;
                histogram[b0] += weight * magnitude * (1.0 - frac);
                histogram[b1] += weight * magnitude * frac;
            }
        }

        let smoothed: Vec<f32> = (0..bins)
            .map(|k| {
                HISTOGRAM_SMOOTHING
                    .iter()
                    .enumerate()
                    .map(|(i, w)| w * histogram[(k + bins + i - 2) % bins])
                    .sum()
            })
            .collect();

        let max = smoothed.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 {
            return Vec::new();
        }
        let threshold = self.orientation_peak_ratio * max;

        (0..bins)
            .filter_map(|k| {
                let left = smoothed[(k + bins - 1) % bins];
                let right = smoothed[(k + 1) % bins];
                let centre = smoothed[k];
                if centre < threshold || centre <= left || centre <= right {
                    return None;
                }
                let offset = 0.5 * (left - right) / (left - 2.0 * centre + right);
                let angle = -PI + (k as f32 + 0.5 + offset) * bin_width;
                Some(wrap_angle(angle))
            })
            .collect()
    }

    /// Rotation-normalized gradient histogram descriptor at `(x, y)`.
    ///
    /// # Returns
    /// The unit length descriptor after clipping, or `None` if no gradient falls
    /// into the window.
    pub fn descriptor(
        &self,
        image: &FloatImage,
        x: f32,
        y: f32,
        sigma: f32,
        orientation: f32,
    ) -> Option<Vec<f32>> {
        let d = self.fdsize;
        let bins = self.fdbins;
        let cell = CELL_WIDTH * sigma;
        let half = d as f32 / 2.0;
        let radius = (cell * std::f32::consts::SQRT_2 * (half + 0.5)).ceil() as isize;
        let cx = x.round() as isize;
        let cy = y.round() as isize;
        let (sin, cos) = orientation.sin_cos();
        let weight_denom = 2.0 * half * half;
        let bins_per_radian = bins as f32 / (2.0 * PI);

        let mut descriptor = vec![0.0f32; d * d * bins];
        for py in cy - radius..=cy + radius {
            for px in cx - radius..=cx + radius {
                let rx = px as f32 - x;
                let ry = py as f32 - y;
                // Offset in cell units within the frame rotated by `orientation`.
                let u = (cos * rx + sin * ry) / cell;
                let v = (-sin * rx + cos * ry) / cell;
                let col = u + half - 0.5;
                let row = v + half - 0.5;
                if col <= -1.0 || row <= -1.0 || col >= d as f32 || row >= d as f32 {
                    continue;
                }
                let (gx, gy) = image.gradient(px, py);
                let magnitude = (gx * gx + gy * gy).sqrt();
                if magnitude == 0.0 {
                    continue;
                }
                let relative = (gy.atan2(gx) - orientation).rem_euclid(2.0 * PI);
                let weight = (-(u * u + v * v) / weight_denom).exp() * magnitude;
                accumulate(&mut descriptor, d, bins, row, col, relative * bins_per_radian, weight);
            }
        }

        if !normalize(&mut descriptor) {
            return None;
        }
        descriptor
            .iter_mut()
            .for_each(|v| *v = v.min(self.descriptor_clip));
        normalize(&mut descriptor);
        Some(descriptor)
    }
}

/// Trilinear distribution of `weight` into the two nearest rows, columns and
/// (circular) orientation bins.
fn accumulate(
    descriptor: &mut [f32],
    d: usize,
    bins: usize,
    row: f32,
    col: f32,
    bin: f32,
    weight: f32,
) {
    let r0 = row.floor();
    let c0 = col.floor();
    let o0 = bin.floor();
    let (fr, fc, fo) = (row - r0, col - c0, bin - o0);
    let (r0, c0, o0) = (r0 as isize, c0 as isize, o0 as isize);

    for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
        let r = r0 + dr;
        if r < 0 || r >= d as isize {
            continue;
        }
        for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
            let c = c0 + dc;
            if c < 0 || c >= d as isize {
                continue;
            }
            for (dob, wo) in [(0, 1.0 - fo), (1, fo)] {
                let o = (o0 + dob).rem_euclid(bins as isize) as usize;
                let index = (r as usize * d + c as usize) * bins + o;
                descriptor[index] += weight * wr * wc * wo;
            }
        }
    }
}

/// Scales `v` to unit length. Returns `false` for an all-zero vector.
fn normalize(v: &mut [f32]) -> bool {
    let norm = v.iter().map(|a| a * a).sum::<f32>().sqrt();
    if norm <= 0.0 || !norm.is_finite() {
        return false;
    }
    v.iter_mut().for_each(|a| *a /= norm);
    true
}

/// Maps an angle into `(-pi, pi]`.
fn wrap_angle(angle: f32) -> f32 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Index of the Gaussian step whose blur is closest to `sigma`.
fn nearest_step(sigma0: f32, scale_steps: usize, sigma: f32, count: usize) -> usize {
    let step = (scale_steps as f32 * (sigma / sigma0).log2()).round();
    step.clamp(0.0, (count - 1) as f32) as usize
}

use crate::config::SiftConfig;
use crate::float_image::FloatImage;
use crate::scale_octave::ScaleOctave;
use crate::scale_space_pyramid::ScaleSpacePyramid;
use tracing::debug;

/// Re-centering steps allowed while fitting the quadratic around an extremum.
const MAX_INTERPOLATION_STEPS: usize = 5;

/// A stable scale-space extremum, in the pixel grid of its octave.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    /// Index into [ScaleSpacePyramid::octaves].
    pub octave: usize,
    /// DoG layer holding the extremum, `1..=S`.
    pub step: usize,
    /// Column in octave pixels, sub-pixel when localization is enabled.
    pub x: f32,
    /// Row in octave pixels.
    pub y: f32,
    /// Blur at the keypoint in octave pixels.
    pub sigma: f32,
    /// DoG response at the keypoint.
    pub response: f32,
}

/// Finds blob-like extrema in the DoG images of a [ScaleSpacePyramid].
///
/// A candidate must be strictly greater or strictly smaller than its 26
/// neighbours in space and scale. Candidates with a weak response or a large
/// ratio of principal curvatures (edges) are discarded.
#[derive(Debug, Clone)]
pub struct KeypointDetector {
    contrast_threshold: f32,
    edge_ratio: f32,
    refine_location: bool,
}

impl KeypointDetector {
    pub fn new(config: &SiftConfig) -> Self {
        KeypointDetector {
            contrast_threshold: config.contrast_threshold,
            edge_ratio: config.edge_ratio,
            refine_location: config.refine_location,
        }
    }

    /// Detects keypoints in every octave of `pyramid`, octave by octave and
    /// within an octave by layer, row and column.
    pub fn detect(&self, pyramid: &ScaleSpacePyramid) -> Vec<Keypoint> {
        let mut keypoints = Vec::new();
        for (index, octave) in pyramid.octaves().iter().enumerate() {
            let before = keypoints.len();
            self.detect_in_octave(octave, index, &mut keypoints);
            debug!(octave = index, keypoints = keypoints.len() - before, "detected keypoints");
        }
        keypoints
    }

    fn detect_in_octave(&self, octave: &ScaleOctave, index: usize, out: &mut Vec<Keypoint>) {
        let dogs = octave.dogs();
        let width = octave.width();
        let height = octave.height();
        if width < 3 || height < 3 {
            return;
        }
        // Candidates below half the threshold cannot reach it after localization.
        let prefilter = if self.refine_location {
            0.5 * self.contrast_threshold
        } else {
            self.contrast_threshold
        };

        for step in 1..dogs.len() - 1 {
            for y in 1..height - 1 {
                for x in 1..width - 1 {
                    let value = dogs[step].get(x, y);
                    if value.abs() < prefilter || !is_extremum(dogs, step, x, y) {
                        continue;
                    }
                    let candidate = if self.refine_location {
                        localize(octave, step, x, y)
                    } else {
                        Some(Localized {
                            step,
                            x,
                            y,
                            offset: [0.0; 3],
                            response: value,
                        })
                    };
                    let Some(found) = candidate else {
                        continue;
                    };
                    if found.response.abs() < self.contrast_threshold {
                        continue;
                    }
                    if is_on_edge(&dogs[found.step], found.x, found.y, self.edge_ratio) {
                        continue;
                    }
                    out.push(Keypoint {
                        octave: index,
                        step: found.step,
                        x: found.x as f32 + found.offset[0],
                        y: found.y as f32 + found.offset[1],
                        sigma: octave.sigma_at(found.step as f32 + found.offset[2]),
                        response: found.response,
                    });
                }
            }
        }
    }
}

/// Strict 26-neighbour extremum test at `(x, y)` of DoG layer `step`.
fn is_extremum(dogs: &[FloatImage], step: usize, x: usize, y: usize) -> bool {
    let value = dogs[step].get(x, y);
    let mut is_max = true;
    let mut is_min = true;
    for (ds, layer) in dogs[step - 1..=step + 1].iter().enumerate() {
        for ny in y - 1..=y + 1 {
            for nx in x - 1..=x + 1 {
                if ds == 1 && nx == x && ny == y {
                    continue;
                }
                let neighbour = layer.get(nx, ny);
                is_max &= value > neighbour;
                is_min &= value < neighbour;
                if !is_max && !is_min {
                    return false;
                }
            }
        }
    }
    true
}

struct Localized {
    step: usize,
    x: usize,
    y: usize,
    /// Sub-sample offset `(dx, dy, ds)`.
    offset: [f32; 3],
    response: f32,
}

/// Fits a quadratic to the DoG around `(x, y, step)` and moves to the
/// neighbouring sample while the offset exceeds half a sample in any dimension.
fn localize(octave: &ScaleOctave, mut step: usize, mut x: usize, mut y: usize) -> Option<Localized> {
    let dogs = octave.dogs();
    let width = octave.width();
    let height = octave.height();
    for _ in 0..MAX_INTERPOLATION_STEPS {
        let prev = &dogs[step - 1];
        let curr = &dogs[step];
        let next = &dogs[step + 1];
        let value = curr.get(x, y);

        let gx = 0.5 * (curr.get(x + 1, y) - curr.get(x - 1, y));
        let gy = 0.5 * (curr.get(x, y + 1) - curr.get(x, y - 1));
        let gs = 0.5 * (next.get(x, y) - prev.get(x, y));

        let hxx = curr.get(x + 1, y) + curr.get(x - 1, y) - 2.0 * value;
        let hyy = curr.get(x, y + 1) + curr.get(x, y - 1) - 2.0 * value;
        let hss = next.get(x, y) + prev.get(x, y) - 2.0 * value;
        let hxy = 0.25
            * (curr.get(x + 1, y + 1) - curr.get(x - 1, y + 1) - curr.get(x + 1, y - 1)
                + curr.get(x - 1, y - 1));
        let hxs = 0.25
            * (next.get(x + 1, y) - next.get(x - 1, y) - prev.get(x + 1, y) + prev.get(x - 1, y));
        let hys = 0.25
            * (next.get(x, y + 1) - next.get(x, y - 1) - prev.get(x, y + 1) + prev.get(x, y - 1));

        let hessian = nalgebra::Matrix3::new(hxx, hxy, hxs, hxy, hyy, hys, hxs, hys, hss);
        let gradient = nalgebra::Vector3::new(gx, gy, gs);
        let offset = -(hessian.try_inverse()? * gradient);

        if offset.iter().all(|o| o.abs() < 0.5) {
            let response = value + 0.5 * gradient.dot(&offset);
            return Some(Localized {
                step,
                x,
                y,
                offset: [offset[0], offset[1], offset[2]],
                response,
            });
        }

        let nx = x as isize + offset[0].round() as isize;
        let ny = y as isize + offset[1].round() as isize;
        let ns = step as isize + offset[2].round() as isize;
        if nx < 1
            || ny < 1
            || nx >= width as isize - 1
            || ny >= height as isize - 1
            || ns < 1
            || ns >= dogs.len() as isize - 1
        {
            return None;
        }
        x = nx as usize;
        y = ny as usize;
        step = ns as usize;
    }
    None
}

/// Principal curvature test on the 2x2 spatial Hessian of `dog` at `(x, y)`.
fn is_on_edge(dog: &FloatImage, x: usize, y: usize, edge_ratio: f32) -> bool {
    let value2 = 2.0 * dog.get(x, y);
    let hxx = dog.get(x + 1, y) + dog.get(x - 1, y) - value2;
    let hyy = dog.get(x, y + 1) + dog.get(x, y - 1) - value2;
    let hxy = 0.25
        * (dog.get(x + 1, y + 1) - dog.get(x - 1, y + 1) - dog.get(x + 1, y - 1)
            + dog.get(x - 1, y - 1));
    let trace = hxx + hyy;
    let det = hxx * hyy - hxy * hxy;
    if det <= 0.0 {
        return true;
    }
    trace * trace * edge_ratio > (edge_ratio + 1.0).powi(2) * det
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn blob_image(size: usize, cx: f32, cy: f32, sigma: f32) -> FloatImage {
        FloatImage::from_fn(size, size, |x, y| {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
        })
    }

    fn config(refine_location: bool) -> SiftConfig {
        SiftConfig {
            min_size: 32,
            refine_location,
            ..SiftConfig::default()
        }
    }

    #[test]
    fn finds_a_single_blob_on_the_pixel_grid() {
        let cfg = config(false);
        let pyramid = ScaleSpacePyramid::build(&blob_image(64, 30.0, 34.0, 2.8), &cfg).unwrap();
        let keypoints = KeypointDetector::new(&cfg).detect(&pyramid);
        let blob: Vec<_> = keypoints
            .iter()
            .filter(|k| k.octave == 0 && (k.x - 30.0).abs() < 1.0 && (k.y - 34.0).abs() < 1.0)
            .collect();
        assert_eq!(blob.len(), 1);
        assert_eq!((blob[0].x, blob[0].y), (30.0, 34.0));
        assert!(blob[0].response < 0.0);
        assert!((1..=3).contains(&blob[0].step));
    }

    #[test]
    fn localization_recovers_sub_pixel_centers() {
        let cfg = config(true);
        let pyramid = ScaleSpacePyramid::build(&blob_image(64, 30.4, 33.7, 2.8), &cfg).unwrap();
        let keypoints = KeypointDetector::new(&cfg).detect(&pyramid);
        let best = keypoints
            .iter()
            .filter(|k| k.octave == 0)
            .min_by(|a, b| {
                let da = (a.x - 30.4).hypot(a.y - 33.7);
                let db = (b.x - 30.4).hypot(b.y - 33.7);
                da.total_cmp(&db)
            })
            .unwrap();
        assert_abs_diff_eq!(best.x, 30.4, epsilon = 0.2);
        assert_abs_diff_eq!(best.y, 33.7, epsilon = 0.2);
        assert!(best.sigma > 1.6 && best.sigma < 4.5, "sigma {}", best.sigma);
    }

    #[test]
    fn straight_edges_are_rejected() {
        let cfg = config(false);
        let step = FloatImage::from_fn(64, 64, |x, _| if x < 32 { 0.0 } else { 1.0 });
        let pyramid = ScaleSpacePyramid::build(&step, &cfg).unwrap();
        assert!(KeypointDetector::new(&cfg).detect(&pyramid).is_empty());
    }

    #[test]
    fn flat_image_has_no_keypoints() {
        let cfg = config(true);
        let flat = FloatImage::from_fn(64, 64, |_, _| 0.5);
        let pyramid = ScaleSpacePyramid::build(&flat, &cfg).unwrap();
        assert!(KeypointDetector::new(&cfg).detect(&pyramid).is_empty());
    }
}

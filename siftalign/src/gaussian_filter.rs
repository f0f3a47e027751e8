//! Separable Gaussian smoothing with mirrored borders.

use crate::float_image::{mirror, FloatImage};
use rayon::prelude::*;

/// Kernel half-width in standard deviations.
const KERNEL_EXTENT: f32 = 4.0;

/// Builds a normalized 1-D Gaussian kernel of length `2 * radius + 1`,
/// where `radius = ceil(4 * sigma)`.
///
/// # Examples
/// ```
/// # use siftalign::gaussian_filter::gaussian_kernel;
/// let k = gaussian_kernel(1.0);
/// assert_eq!(k.len(), 9);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = ((KERNEL_EXTENT * sigma).ceil() as usize).max(1);
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * radius)
        .map(|i| {
            let d = i as f32 - radius as f32;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Convolves `img` with a Gaussian of standard deviation `sigma`, first along
/// rows and then along columns. Rows are processed in parallel.
///
/// A non-positive `sigma` returns an unchanged copy.
pub fn gaussian_blur(img: &FloatImage, sigma: f32) -> FloatImage {
    if sigma <= 0.0 || img.is_empty() {
        return img.clone();
    }
    let kernel = gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;
    let width = img.width();
    let height = img.height();

    let mut horizontal = FloatImage::new(width, height);
    horizontal
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            let src = &img.data()[y * width..(y + 1) * width];
            for (x, out) in row.iter_mut().enumerate() {
                let mut acc = 0.0;
                for (k, w) in kernel.iter().enumerate() {
                    let sx = mirror(x as isize + k as isize - radius, width);
                    acc += w * src[sx];
                }
                *out = acc;
            }
        });

    let mut blurred = FloatImage::new(width, height);
    blurred
        .data_mut()
        .par_chunks_mut(width)
        .enumerate()
        .for_each(|(y, row)| {
            for (k, w) in kernel.iter().enumerate() {
                let sy = mirror(y as isize + k as isize - radius, height);
                let src = &horizontal.data()[sy * width..(sy + 1) * width];
                for (out, v) in row.iter_mut().zip(src.iter()) {
                    *out += w * v;
                }
            }
        });
    blurred
}

use siftalign::float_image::FloatImage;

/// Standard deviations of every blob along its major and minor axis.
const MAJOR_SIGMA: f64 = 4.0;
const MINOR_SIGMA: f64 = 2.0;

/// An elliptical Gaussian spot. Elongated spots have a well-defined dominant
/// orientation, which the descriptor needs to be rotation invariant.
#[derive(Debug, Clone, Copy)]
pub struct Blob {
    pub center: [f64; 2],
    /// Direction of the major axis in radians.
    pub angle: f64,
    pub amplitude: f64,
}

/// Blob centers of the reference scene on a 100 x 100 canvas.
const CENTERS: [[f64; 2]; 11] = [
    [30.0, 28.0],
    [48.0, 26.0],
    [66.0, 31.0],
    [27.0, 46.0],
    [43.0, 42.0],
    [60.0, 47.0],
    [72.0, 62.0],
    [34.0, 63.0],
    [51.0, 60.0],
    [62.0, 75.0],
    [45.0, 74.0],
];

/// Irregularly placed blobs with distinct orientations and amplitudes, so every
/// blob has a distinct neighbourhood.
pub fn reference_blobs() -> Vec<Blob> {
    CENTERS
        .iter()
        .enumerate()
        .map(|(i, &center)| Blob {
            center,
            angle: (37.0 * i as f64).to_radians(),
            amplitude: 0.6 + 0.04 * i as f64,
        })
        .collect()
}

/// Rotates `p` by `angle` about `pivot` and shifts it by `shift`.
pub fn rigid_map(p: [f64; 2], angle: f64, pivot: [f64; 2], shift: [f64; 2]) -> [f64; 2] {
    let (sin, cos) = angle.sin_cos();
    let dx = p[0] - pivot[0];
    let dy = p[1] - pivot[1];
    [
        pivot[0] + cos * dx - sin * dy + shift[0],
        pivot[1] + sin * dx + cos * dy + shift[1],
    ]
}

/// The blobs moved rigidly, orientations included.
pub fn moved_blobs(blobs: &[Blob], angle: f64, pivot: [f64; 2], shift: [f64; 2]) -> Vec<Blob> {
    blobs
        .iter()
        .map(|b| Blob {
            center: rigid_map(b.center, angle, pivot, shift),
            angle: b.angle + angle,
            amplitude: b.amplitude,
        })
        .collect()
}

/// Renders blobs on a black background.
pub fn blob_image(width: usize, height: usize, blobs: &[Blob]) -> FloatImage {
    FloatImage::from_fn(width, height, |x, y| {
        blobs
            .iter()
            .map(|b| {
                let (sin, cos) = b.angle.sin_cos();
                let dx = x as f64 - b.center[0];
                let dy = y as f64 - b.center[1];
                let u = cos * dx + sin * dy;
                let v = -sin * dx + cos * dy;
                let r2 = (u / MAJOR_SIGMA).powi(2) + (v / MINOR_SIGMA).powi(2);
                b.amplitude * (-0.5 * r2).exp()
            })
            .sum::<f64>() as f32
    })
}

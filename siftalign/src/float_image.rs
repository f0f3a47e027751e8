use crate::error::ImageError;

/// A single-channel image of `f32` intensities stored row by row.
///
/// Pixel `(x, y)` lives at `data[y * width + x]`. Every stage of the pipeline
/// consumes images by reference and produces new ones, so a buffer never changes
/// once a stage has handed it on.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatImage {
    width: usize,
    height: usize,
    data: Vec<f32>,
}

impl Default for FloatImage {
    /// Creates an empty image with zero width and height.
    fn default() -> FloatImage {
        FloatImage {
            width: 0,
            height: 0,
            data: Vec::new(),
        }
    }
}

impl FloatImage {
    /// Creates a black image of the given size.
    pub fn new(width: usize, height: usize) -> FloatImage {
        FloatImage {
            width,
            height,
            data: vec![0.0; width * height],
        }
    }

    /// Wraps an existing row-major pixel buffer.
    ///
    /// # Parameters
    /// - `width`: Image width in pixels.
    /// - `height`: Image height in pixels.
    /// - `data`: `width * height` intensities, row by row.
    ///
    /// # Returns
    /// The image, or [ImageError::SizeMismatch] if the buffer length is wrong.
    ///
    /// # Examples
    /// ```
    /// # use siftalign::float_image::FloatImage;
    /// let img = FloatImage::from_raw(2, 2, vec![0.0, 0.25, 0.5, 1.0]).unwrap();
    /// assert_eq!(img.get(1, 1), 1.0);
    /// assert!(FloatImage::from_raw(2, 2, vec![0.0; 3]).is_err());
    /// ```
    pub fn from_raw(width: usize, height: usize, data: Vec<f32>) -> Result<FloatImage, ImageError> {
        if data.len() != width * height {
            return Err(ImageError::SizeMismatch {
                width,
                height,
                got: data.len(),
            });
        }
        Ok(FloatImage {
            width,
            height,
            data,
        })
    }

    /// Builds an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, f: impl Fn(usize, usize) -> f32) -> FloatImage {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        FloatImage {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// `true` when the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Returns the intensity at `(x, y)`.
    ///
    /// # Panics
    /// Panics if `(x, y)` is outside the image.
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, x: usize, y: usize, value: f32) {
        self.data[y * self.width + x] = value;
    }

    /// Returns the intensity at a possibly out-of-bounds position, reflecting the
    /// coordinates at the border without repeating the edge pixel
    /// (`-1 -> 1`, `width -> width - 2`).
    pub fn get_mirrored(&self, x: isize, y: isize) -> f32 {
        self.get(mirror(x, self.width), mirror(y, self.height))
    }

    /// Intensity gradient `(dx, dy)` by central differences with mirrored borders.
    pub fn gradient(&self, x: isize, y: isize) -> (f32, f32) {
        let dx = 0.5 * (self.get_mirrored(x + 1, y) - self.get_mirrored(x - 1, y));
        let dy = 0.5 * (self.get_mirrored(x, y + 1) - self.get_mirrored(x, y - 1));
        (dx, dy)
    }

    /// Linearly rescales the intensities so the minimum becomes `0` and the
    /// maximum `1`. A constant image maps to all zeros.
    ///
    /// # Examples
    /// ```
    /// # use siftalign::float_image::FloatImage;
    /// let img = FloatImage::from_raw(3, 1, vec![10.0, 20.0, 30.0]).unwrap();
    /// assert_eq!(img.normalized().data(), &[0.0, 0.5, 1.0]);
    /// ```
    pub fn normalized(&self) -> FloatImage {
        let (min, max) = self
            .data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;
        let data = if range > 0.0 && range.is_finite() {
            self.data.iter().map(|&v| (v - min) / range).collect()
        } else {
            vec![0.0; self.data.len()]
        };
        FloatImage {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Bilinear upsampling to `(2w - 1) x (2h - 1)`. Even output pixels copy the
    /// input, odd ones interpolate their neighbours.
    pub fn upsampled(&self) -> FloatImage {
        if self.is_empty() {
            return FloatImage::default();
        }
        let width = 2 * self.width - 1;
        let height = 2 * self.height - 1;
        FloatImage::from_fn(width, height, |x, y| {
            let (x0, x1) = (x / 2, (x + 1) / 2);
            let (y0, y1) = (y / 2, (y + 1) / 2);
            0.25 * (self.get(x0, y0) + self.get(x1, y0) + self.get(x0, y1) + self.get(x1, y1))
        })
    }

    /// Decimates by two, keeping every second pixel of every second row.
    /// Odd sizes round down, so a `5 x 5` image becomes `2 x 2`.
    pub fn downsampled(&self) -> FloatImage {
        let width = self.width / 2;
        let height = self.height / 2;
        FloatImage::from_fn(width, height, |x, y| self.get(2 * x, 2 * y))
    }

    /// Pixel-wise difference `self - other` of two images of the same size.
    pub fn difference(&self, other: &FloatImage) -> FloatImage {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        FloatImage {
            width: self.width,
            height: self.height,
            data: self
                .data
                .iter()
                .zip(other.data.iter())
                .map(|(a, b)| a - b)
                .collect(),
        }
    }
}

/// Reflects `i` into `0..n` around the border pixels.
pub(crate) fn mirror(i: isize, n: usize) -> usize {
    if n <= 1 {
        return 0;
    }
    let n = n as isize;
    let period = 2 * (n - 1);
    let mut i = i.rem_euclid(period);
    if i >= n {
        i = period - i;
    }
    i as usize
}

//! Owned multi-channel floating-point raster images.
//!
//! Samples are stored row-major with interleaved channels, so the channels of
//! one pixel are contiguous. Frames are stacked after each other:
//!
//! ```text
//! offset(frame, x, y) = ((frame * height + y) * width + x) * channels
//! ```
//!
//! Elementwise arithmetic is exposed through the `std::ops` compound
//! assignment traits. An image may be combined with another image of the same
//! shape, with a single-channel image of the same extent (broadcast over
//! channels), or with a scalar.

use crate::core::error::{FilterError, FilterResult};
use log::warn;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

/// Dimensions of a raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape {
    /// Width in pixels.
    pub width: usize,
    /// Height in pixels.
    pub height: usize,
    /// Samples per pixel.
    pub channels: usize,
    /// Number of frames (temporal or extra dimension).
    pub frames: usize,
}

impl Shape {
    /// Create a single-frame shape.
    pub fn new(width: usize, height: usize, channels: usize) -> Self {
        Self {
            width,
            height,
            channels,
            frames: 1,
        }
    }

    /// Replace the frame count.
    pub fn with_frames(mut self, frames: usize) -> Self {
        self.frames = frames;
        self
    }

    /// Replace the channel count.
    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    /// All four dimensions are at least one.
    pub fn is_valid(&self) -> bool {
        self.width >= 1 && self.height >= 1 && self.channels >= 1 && self.frames >= 1
    }

    /// Total number of samples, or `None` on overflow.
    pub fn sample_count(&self) -> Option<usize> {
        self.width
            .checked_mul(self.height)?
            .checked_mul(self.channels)?
            .checked_mul(self.frames)
    }

    /// Same width, height and frame count; channels may differ.
    pub fn same_extent(&self, other: &Shape) -> bool {
        self.width == other.width && self.height == other.height && self.frames == other.frames
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.width, self.height, self.channels)?;
        if self.frames > 1 {
            write!(f, " ({} frames)", self.frames)?;
        }
        Ok(())
    }
}

/// An owned, mutable floating-point raster image.
///
/// `Clone` performs a deep copy of the sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Image {
    shape: Shape,
    data: Vec<f32>,
}

impl Image {
    /// Allocate a zero-initialised image.
    ///
    /// Fails with [`FilterError::InvalidShape`] if any dimension is zero and
    /// with [`FilterError::Allocation`] if the buffer cannot be reserved.
    pub fn try_new(shape: Shape) -> FilterResult<Self> {
        if !shape.is_valid() {
            return Err(invalid_shape(shape));
        }
        let samples = shape
            .sample_count()
            .ok_or(FilterError::Allocation { samples: usize::MAX })?;

        let mut data = Vec::new();
        data.try_reserve_exact(samples)
            .map_err(|_| FilterError::Allocation { samples })?;
        data.resize(samples, 0.0);

        Ok(Self { shape, data })
    }

    /// Allocate a zero-initialised single-frame image.
    pub fn zeros(width: usize, height: usize, channels: usize) -> FilterResult<Self> {
        Self::try_new(Shape::new(width, height, channels))
    }

    /// Allocate an image with every sample set to `value`.
    pub fn filled(shape: Shape, value: f32) -> FilterResult<Self> {
        let mut image = Self::try_new(shape)?;
        image.fill(value);
        Ok(image)
    }

    /// Wrap an existing sample buffer.
    pub fn from_vec(shape: Shape, data: Vec<f32>) -> FilterResult<Self> {
        if !shape.is_valid() {
            return Err(invalid_shape(shape));
        }
        let expected = shape
            .sample_count()
            .ok_or(FilterError::Allocation { samples: usize::MAX })?;
        if data.len() != expected {
            return Err(FilterError::SampleCountMismatch {
                expected,
                got: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Build an image by evaluating `f(x, y, channel)` for every sample.
    ///
    /// Every frame receives the same values.
    pub fn from_fn<F>(shape: Shape, mut f: F) -> FilterResult<Self>
    where
        F: FnMut(usize, usize, usize) -> f32,
    {
        let mut image = Self::try_new(shape)?;
        for frame in 0..shape.frames {
            for y in 0..shape.height {
                for x in 0..shape.width {
                    let pixel = image.pixel_at_mut(frame, x, y);
                    for (c, sample) in pixel.iter_mut().enumerate() {
                        *sample = f(x, y, c);
                    }
                }
            }
        }
        Ok(image)
    }

    /// Image dimensions.
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.shape.width
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.shape.height
    }

    /// Samples per pixel.
    pub fn channels(&self) -> usize {
        self.shape.channels
    }

    /// Number of frames.
    pub fn frames(&self) -> usize {
        self.shape.frames
    }

    /// The whole sample buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// The whole sample buffer, mutably.
    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Same width, height, channels and frames.
    pub fn is_similar(&self, other: &Image) -> bool {
        self.shape == other.shape
    }

    #[inline]
    fn offset(&self, frame: usize, x: usize, y: usize) -> usize {
        ((frame * self.shape.height + y) * self.shape.width + x) * self.shape.channels
    }

    /// Channel run of pixel `(x, y)` in frame 0.
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> &[f32] {
        self.pixel_at(0, x, y)
    }

    /// Channel run of pixel `(x, y)` in `frame`.
    #[inline]
    pub fn pixel_at(&self, frame: usize, x: usize, y: usize) -> &[f32] {
        let start = self.offset(frame, x, y);
        &self.data[start..start + self.shape.channels]
    }

    /// Mutable channel run of pixel `(x, y)` in frame 0.
    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [f32] {
        self.pixel_at_mut(0, x, y)
    }

    /// Mutable channel run of pixel `(x, y)` in `frame`.
    #[inline]
    pub fn pixel_at_mut(&mut self, frame: usize, x: usize, y: usize) -> &mut [f32] {
        let start = self.offset(frame, x, y);
        let channels = self.shape.channels;
        &mut self.data[start..start + channels]
    }

    /// Pixel lookup with coordinates clamped to the image border.
    #[inline]
    pub fn pixel_clamped(&self, frame: usize, x: isize, y: isize) -> &[f32] {
        let x = x.clamp(0, self.shape.width as isize - 1) as usize;
        let y = y.clamp(0, self.shape.height as isize - 1) as usize;
        self.pixel_at(frame, x, y)
    }

    /// Set every sample to zero.
    pub fn set_zero(&mut self) {
        self.fill(0.0);
    }

    /// Set every sample to `value`.
    pub fn fill(&mut self, value: f32) {
        self.data.par_iter_mut().for_each(|s| *s = value);
    }

    /// Replace every sample `s` with `f(s)`.
    pub fn apply_function<F>(&mut self, f: F)
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        self.data.par_iter_mut().for_each(|s| *s = f(*s));
    }

    /// Smallest and largest finite sample, if any.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    fn zip_apply<F>(&mut self, other: &Image, op: F, name: &str)
    where
        F: Fn(f32, f32) -> f32 + Sync + Send,
    {
        if self.shape == other.shape {
            self.data
                .par_iter_mut()
                .zip(other.data.par_iter())
                .for_each(|(a, &b)| *a = op(*a, b));
        } else if other.shape.channels == 1 && self.shape.same_extent(&other.shape) {
            let channels = self.shape.channels;
            self.data
                .par_chunks_mut(channels)
                .zip(other.data.par_iter())
                .for_each(|(pixel, &b)| {
                    for a in pixel {
                        *a = op(*a, b);
                    }
                });
        } else {
            warn!(
                "Skipping elementwise {}: {} is incompatible with {}",
                name, self.shape, other.shape
            );
        }
    }
}

fn invalid_shape(shape: Shape) -> FilterError {
    FilterError::InvalidShape {
        width: shape.width,
        height: shape.height,
        channels: shape.channels,
        frames: shape.frames,
    }
}

impl AddAssign<&Image> for Image {
    fn add_assign(&mut self, rhs: &Image) {
        self.zip_apply(rhs, |a, b| a + b, "add");
    }
}

impl SubAssign<&Image> for Image {
    fn sub_assign(&mut self, rhs: &Image) {
        self.zip_apply(rhs, |a, b| a - b, "subtract");
    }
}

impl MulAssign<&Image> for Image {
    fn mul_assign(&mut self, rhs: &Image) {
        self.zip_apply(rhs, |a, b| a * b, "multiply");
    }
}

impl DivAssign<&Image> for Image {
    fn div_assign(&mut self, rhs: &Image) {
        self.zip_apply(rhs, |a, b| a / b, "divide");
    }
}

impl AddAssign<f32> for Image {
    fn add_assign(&mut self, rhs: f32) {
        self.apply_function(|a| a + rhs);
    }
}

impl SubAssign<f32> for Image {
    fn sub_assign(&mut self, rhs: f32) {
        self.apply_function(|a| a - rhs);
    }
}

impl MulAssign<f32> for Image {
    fn mul_assign(&mut self, rhs: f32) {
        self.apply_function(|a| a * rhs);
    }
}

impl DivAssign<f32> for Image {
    fn div_assign(&mut self, rhs: f32) {
        self.apply_function(|a| a / rhs);
    }
}

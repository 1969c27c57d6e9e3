//! Downsample filter: halves an image by averaging 2x2 blocks.
//!
//! Only samples that differ enough from a reference value take part in the
//! average, which lets masked or empty regions (e.g., a zero background)
//! shrink without bleeding into their neighbours.

use crate::core::error::{ConfigError, FilterResult};
use crate::core::filter::{Category, Filter, FilterMetadata};
use crate::core::image::{Image, Shape};
use crate::core::tiling::TileMut;
use crate::filters::registry::FilterRegistry;
use log::warn;
use serde::{Deserialize, Serialize};

/// Register the downsample filter.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|settings| Ok(Box::new(DownsampleFilter::new(settings.downsample.clone())?)));
}

/// Parameters of [`DownsampleFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownsampleConfig {
    /// Reference pixel value. An empty vector means zero in every channel.
    pub reference: Vec<f32>,
    /// Squared distance to the reference a sample must exceed to be averaged.
    pub threshold: f32,
}

impl Default for DownsampleConfig {
    fn default() -> Self {
        Self {
            reference: Vec::new(),
            threshold: 1e-3,
        }
    }
}

impl DownsampleConfig {
    /// Create a validated configuration.
    pub fn new(reference: Vec<f32>, threshold: f32) -> Result<Self, ConfigError> {
        let config = Self {
            reference,
            threshold,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the parameters.
    ///
    /// The threshold must be finite and non-negative; a zero threshold keeps
    /// every sample that is not exactly equal to the reference.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::invalid(
                "threshold",
                format!("must be finite and non-negative, got {}", self.threshold),
            ));
        }
        if self.reference.iter().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("reference", "must contain finite values"));
        }
        Ok(())
    }
}

/// Halves width and height; each output pixel averages the source samples of
/// its 2x2 block whose squared distance to the reference exceeds the
/// threshold, or takes the reference value when none does.
#[derive(Debug, Clone, Default)]
pub struct DownsampleFilter {
    config: DownsampleConfig,
}

impl DownsampleFilter {
    /// Create a filter from a configuration.
    pub fn new(config: DownsampleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Replace the configuration.
    pub fn update(&mut self, config: DownsampleConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> &DownsampleConfig {
        &self.config
    }

    /// Downsample `input` with the default configuration.
    pub fn execute_default(input: &Image, output: Option<Image>) -> FilterResult<Option<Image>> {
        Self::default().execute(&[input], output)
    }

    fn reference(&self, channel: usize) -> f32 {
        self.config.reference.get(channel).copied().unwrap_or(0.0)
    }

    fn distance(&self, pixel: &[f32]) -> f32 {
        pixel
            .iter()
            .enumerate()
            .map(|(c, &v)| {
                let d = v - self.reference(c);
                d * d
            })
            .sum()
    }
}

impl Filter for DownsampleFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::new("downsample", "Downsample 2x", Category::Transform)
            .description("Halve an image, averaging 2x2 blocks while skipping samples close to a reference value")
    }

    fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
        let shape = inputs.first()?.shape();
        Some(Shape {
            width: shape.width >> 1,
            height: shape.height >> 1,
            ..shape
        })
    }

    fn accepts(&self, inputs: &[&Image]) -> bool {
        let Some(first) = inputs.first() else {
            return false;
        };
        let reference = self.config.reference.len();
        if reference != 0 && reference != first.channels() {
            warn!(
                "downsample: reference has {} channels, input has {}",
                reference,
                first.channels()
            );
            return false;
        }
        true
    }

    fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
        let src = inputs[0];
        let region = tile.tile();

        for frame in 0..tile.frames() {
            for (x, y) in region.pixels() {
                let (sx, sy) = (x << 1, y << 1);
                let block = [
                    src.pixel_at(frame, sx, sy),
                    src.pixel_at(frame, sx + 1, sy),
                    src.pixel_at(frame, sx, sy + 1),
                    src.pixel_at(frame, sx + 1, sy + 1),
                ];

                let dst = tile.pixel_at_mut(frame, x, y);
                dst.fill(0.0);

                let mut counter = 0usize;
                for sample in block {
                    if self.distance(sample) > self.config.threshold {
                        counter += 1;
                        for (d, &s) in dst.iter_mut().zip(sample) {
                            *d += s;
                        }
                    }
                }

                if counter > 0 {
                    let counter = counter as f32;
                    for d in dst.iter_mut() {
                        *d /= counter;
                    }
                } else {
                    for (c, d) in dst.iter_mut().enumerate() {
                        *d = self.reference(c);
                    }
                }
            }
        }
    }
}

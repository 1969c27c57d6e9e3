//! Exposure-fusion quality weights.
//!
//! Rates how useful every pixel of one exposure is for a fused result, from
//! three measures combined with per-measure exponents:
//!
//! - contrast: absolute 4-neighbour Laplacian of the luminance
//! - well-exposedness: Gaussian closeness of each colour channel to `mu`
//! - saturation: standard deviation of the colour channels
//!
//! ```text
//! weight = contrast^w_contrast * exposedness^w_exposedness * saturation^w_saturation
//! ```
//!
//! The luminance is taken from an optional second single-channel input, or
//! computed from the first input with [`LuminanceFilter`].

use crate::core::error::ConfigError;
use crate::core::filter::{Category, Filter, FilterMetadata};
use crate::core::image::{Image, Shape};
use crate::core::tiling::TileMut;
use crate::filters::builtin::luminance::LuminanceFilter;
use crate::filters::registry::FilterRegistry;
use serde::{Deserialize, Serialize};

/// Register the fusion weights filter.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|settings| {
        Ok(Box::new(FusionWeightsFilter::new(settings.fusion_weights.clone())?))
    });
}

/// Parameters of [`FusionWeightsFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeightsConfig {
    /// Exponent of the contrast measure.
    pub w_contrast: f32,
    /// Exponent of the well-exposedness measure.
    pub w_exposedness: f32,
    /// Exponent of the saturation measure.
    pub w_saturation: f32,
    /// Best exposed value.
    pub mu: f32,
    /// Width of the well-exposedness Gaussian.
    pub sigma: f32,
}

impl Default for FusionWeightsConfig {
    fn default() -> Self {
        Self {
            w_contrast: 1.0,
            w_exposedness: 1.0,
            w_saturation: 1.0,
            mu: 0.5,
            sigma: 0.2,
        }
    }
}

impl FusionWeightsConfig {
    /// Check the parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_positive("w_contrast", self.w_contrast)?;
        ConfigError::require_positive("w_exposedness", self.w_exposedness)?;
        ConfigError::require_positive("w_saturation", self.w_saturation)?;
        ConfigError::require_positive("sigma", self.sigma)?;
        if !self.mu.is_finite() {
            return Err(ConfigError::invalid("mu", "must be finite"));
        }
        Ok(())
    }
}

/// Per-pixel exposure-fusion weights; the output has one channel.
#[derive(Debug, Clone, Default)]
pub struct FusionWeightsFilter {
    config: FusionWeightsConfig,
    luminance: LuminanceFilter,
}

impl FusionWeightsFilter {
    /// Create a filter from a configuration.
    pub fn new(config: FusionWeightsConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            luminance: LuminanceFilter::default(),
        })
    }

    /// Current configuration.
    pub fn config(&self) -> &FusionWeightsConfig {
        &self.config
    }

    fn lum(&self, inputs: &[&Image], frame: usize, x: isize, y: isize) -> f32 {
        match inputs.get(1) {
            Some(lum) => lum.pixel_clamped(frame, x, y)[0],
            None => self.luminance.luminance(inputs[0].pixel_clamped(frame, x, y)),
        }
    }

    fn exposedness(&self, pixel: &[f32]) -> f32 {
        let sigma2 = 2.0 * self.config.sigma * self.config.sigma;
        pixel
            .iter()
            .take(3)
            .map(|v| {
                let d = v - self.config.mu;
                (-d * d / sigma2).exp()
            })
            .product()
    }

    fn saturation(pixel: &[f32]) -> f32 {
        if pixel.len() < 3 {
            return 1.0;
        }
        let rgb = &pixel[..3];
        let mean = rgb.iter().sum::<f32>() / 3.0;
        let var = rgb.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / 3.0;
        var.sqrt()
    }
}

impl Filter for FusionWeightsFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::new("fusion_weights", "Exposure Fusion Weights", Category::Analyze)
            .description("Contrast, well-exposedness and saturation weights of an exposure")
    }

    fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
        Some(inputs.first()?.shape().with_channels(1))
    }

    fn accepts(&self, inputs: &[&Image]) -> bool {
        match inputs {
            [_] => true,
            [image, lum] => lum.channels() == 1 && lum.shape().same_extent(&image.shape()),
            _ => false,
        }
    }

    fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
        let src = inputs[0];
        let region = tile.tile();

        for frame in 0..tile.frames() {
            for (x, y) in region.pixels() {
                let (xi, yi) = (x as isize, y as isize);
                let laplacian = self.lum(inputs, frame, xi + 1, yi)
                    + self.lum(inputs, frame, xi - 1, yi)
                    + self.lum(inputs, frame, xi, yi + 1)
                    + self.lum(inputs, frame, xi, yi - 1)
                    - 4.0 * self.lum(inputs, frame, xi, yi);

                let pixel = src.pixel_at(frame, x, y);
                let contrast = laplacian.abs().powf(self.config.w_contrast);
                let exposedness = self.exposedness(pixel).powf(self.config.w_exposedness);
                let saturation = Self::saturation(pixel).powf(self.config.w_saturation);

                tile.pixel_at_mut(frame, x, y)[0] = contrast * exposedness * saturation;
            }
        }
    }
}

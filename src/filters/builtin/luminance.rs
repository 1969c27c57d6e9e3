//! Luminance extraction: reduces any image to a single channel.

use crate::core::filter::{Category, Filter, FilterMetadata};
use crate::core::image::{Image, Shape};
use crate::core::tiling::TileMut;
use crate::filters::registry::FilterRegistry;
use serde::{Deserialize, Serialize};

/// Register the luminance filter.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|settings| Ok(Box::new(LuminanceFilter::new(settings.luminance.mode))));
}

/// Rec. 709 / CIE luminance weights for linear R, G and B.
pub const CIE_WEIGHTS: [f32; 3] = [0.2126, 0.7152, 0.0722];

/// How colour channels are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LuminanceMode {
    /// Weighted sum of the first three channels for RGB(A) input, channel
    /// mean otherwise.
    #[default]
    Cie,
    /// Plain channel mean.
    Mean,
}

/// Luminance parameters as they appear in settings files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LuminanceConfig {
    /// Reduction mode.
    pub mode: LuminanceMode,
}

/// Single-channel luminance of an image.
///
/// Single-channel input is copied as is.
#[derive(Debug, Clone, Copy, Default)]
pub struct LuminanceFilter {
    mode: LuminanceMode,
}

impl LuminanceFilter {
    /// Create a luminance filter.
    pub fn new(mode: LuminanceMode) -> Self {
        Self { mode }
    }

    /// Reduction mode.
    pub fn mode(&self) -> LuminanceMode {
        self.mode
    }

    /// Luminance of one pixel.
    #[inline]
    pub fn luminance(&self, pixel: &[f32]) -> f32 {
        match (self.mode, pixel.len()) {
            (_, 1) => pixel[0],
            (LuminanceMode::Cie, 3 | 4) => pixel
                .iter()
                .zip(CIE_WEIGHTS)
                .map(|(v, w)| v * w)
                .sum(),
            (_, n) => pixel.iter().sum::<f32>() / n as f32,
        }
    }
}

impl Filter for LuminanceFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::new("luminance", "Luminance", Category::Color)
            .description("Reduce an image to one luminance channel")
    }

    fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
        Some(inputs.first()?.shape().with_channels(1))
    }

    fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
        let src = inputs[0];
        let region = tile.tile();
        for frame in 0..tile.frames() {
            for (x, y) in region.pixels() {
                tile.pixel_at_mut(frame, x, y)[0] = self.luminance(src.pixel_at(frame, x, y));
            }
        }
    }
}

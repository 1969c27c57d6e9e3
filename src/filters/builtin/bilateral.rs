//! Edge-preserving bilateral smoothing.
//!
//! Each output pixel is a normalized weighted mean of neighbouring samples.
//! A neighbour's weight is the product of a spatial Gaussian on its offset
//! and a range Gaussian on its squared channel distance to the centre pixel:
//!
//! ```text
//! w = exp(-(dx² + dy²) / (2 sigma_s²)) * exp(-|I(q) - I(p)|² / (2 sigma_r²))
//! ```
//!
//! The neighbour offsets and their spatial weights are precomputed into a
//! sample table whenever the configuration changes, so an instance can be
//! reused across calls and images. Two sampling strategies build the table:
//!
//! - [`SamplingStrategy::Dense`] visits every offset of the square window of
//!   half-size `ceil(2.5 sigma_s)`
//! - [`SamplingStrategy::Stratified`] places a fixed number of offsets on a
//!   golden-angle spiral inside the same window, which keeps the cost bounded
//!   for the very large spatial sigmas tone mapping uses
//!
//! Samples outside the image are clamped to the border.

use crate::core::error::ConfigError;
use crate::core::filter::{Category, Filter, FilterMetadata};
use crate::core::image::{Image, Shape};
use crate::core::tiling::TileMut;
use crate::filters::registry::FilterRegistry;
use log::debug;
use serde::{Deserialize, Serialize};

/// Register the bilateral filter.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|settings| Ok(Box::new(BilateralFilter::new(settings.bilateral.clone())?)));
}

/// Window half-size in units of `sigma_s`.
pub const RADIUS_SIGMAS: f32 = 2.5;

/// Largest accepted `sigma_s`; keeps window offsets and their squares in range.
pub const MAX_SIGMA_S: f32 = 1.0e6;

/// Stratified samples per unit of `samples_multiplier`.
pub const BASE_SAMPLES: usize = 64;

/// Angle between consecutive spiral samples, `pi * (3 - sqrt(5))`.
const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// How neighbour offsets are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Every offset in the window.
    Dense,
    /// A deterministic spiral subset of the window.
    #[default]
    Stratified,
}

/// Parameters of [`BilateralFilter`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BilateralConfig {
    /// Spatial standard deviation in pixels.
    pub sigma_s: f32,
    /// Range standard deviation in sample units.
    pub sigma_r: f32,
    /// Sampling strategy.
    pub sampling: SamplingStrategy,
    /// Scales the number of stratified samples.
    pub samples_multiplier: usize,
}

impl Default for BilateralConfig {
    fn default() -> Self {
        Self {
            sigma_s: 16.0,
            sigma_r: 0.1,
            sampling: SamplingStrategy::Stratified,
            samples_multiplier: 1,
        }
    }
}

impl BilateralConfig {
    /// Create a validated configuration with the default sampling.
    pub fn new(sigma_s: f32, sigma_r: f32) -> Result<Self, ConfigError> {
        let config = Self {
            sigma_s,
            sigma_r,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Set the sampling strategy.
    pub fn with_sampling(mut self, sampling: SamplingStrategy) -> Self {
        self.sampling = sampling;
        self
    }

    /// Set the stratified sample multiplier.
    pub fn with_samples_multiplier(mut self, multiplier: usize) -> Self {
        self.samples_multiplier = multiplier;
        self
    }

    /// Check the parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_positive("sigma_s", self.sigma_s)?;
        ConfigError::require_positive("sigma_r", self.sigma_r)?;
        if self.sigma_s > MAX_SIGMA_S {
            return Err(ConfigError::invalid(
                "sigma_s",
                format!("must not exceed {}, got {}", MAX_SIGMA_S, self.sigma_s),
            ));
        }
        if self.samples_multiplier == 0 {
            return Err(ConfigError::invalid("samples_multiplier", "must be at least 1"));
        }
        Ok(())
    }

    /// Window half-size in pixels.
    pub fn radius(&self) -> usize {
        ((RADIUS_SIGMAS * self.sigma_s).ceil() as usize).max(1)
    }
}

/// One neighbour offset with its precomputed spatial weight.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Sample {
    dx: isize,
    dy: isize,
    weight: f32,
}

/// Bilateral filter over all channels of one input image.
#[derive(Debug, Clone)]
pub struct BilateralFilter {
    config: BilateralConfig,
    samples: Vec<Sample>,
    range_coeff: f32,
}

impl Default for BilateralFilter {
    fn default() -> Self {
        let config = BilateralConfig::default();
        Self {
            samples: build_samples(&config),
            range_coeff: range_coeff(config.sigma_r),
            config,
        }
    }
}

impl BilateralFilter {
    /// Create a filter from a configuration.
    pub fn new(config: BilateralConfig) -> Result<Self, ConfigError> {
        let mut filter = Self::default();
        filter.update(config)?;
        Ok(filter)
    }

    /// Replace the configuration and rebuild the sample table.
    pub fn update(&mut self, config: BilateralConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if config != self.config || self.samples.is_empty() {
            self.samples = build_samples(&config);
            debug!(
                "bilateral: sigma_s={} sigma_r={} radius={} samples={}",
                config.sigma_s,
                config.sigma_r,
                config.radius(),
                self.samples.len()
            );
        }
        self.range_coeff = range_coeff(config.sigma_r);
        self.config = config;
        Ok(())
    }

    /// Current configuration.
    pub fn config(&self) -> &BilateralConfig {
        &self.config
    }

    /// Number of neighbour offsets visited per pixel.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

fn range_coeff(sigma_r: f32) -> f32 {
    -0.5 / (sigma_r * sigma_r)
}

fn build_samples(config: &BilateralConfig) -> Vec<Sample> {
    let radius = config.radius() as isize;
    let spatial = -0.5 / (config.sigma_s * config.sigma_s);
    let sample = |dx: isize, dy: isize| Sample {
        dx,
        dy,
        weight: (((dx * dx + dy * dy) as f32) * spatial).exp(),
    };

    match config.sampling {
        SamplingStrategy::Dense => (-radius..=radius)
            .flat_map(|dy| (-radius..=radius).map(move |dx| (dx, dy)))
            .map(|(dx, dy)| sample(dx, dy))
            .collect(),
        SamplingStrategy::Stratified => {
            let count = BASE_SAMPLES * config.samples_multiplier;
            let r = radius as f32;
            let mut offsets: Vec<(isize, isize)> = (0..count)
                .map(|i| {
                    let t = ((i as f32 + 0.5) / count as f32).sqrt() * r;
                    let angle = i as f32 * GOLDEN_ANGLE;
                    (
                        (t * angle.cos()).round() as isize,
                        (t * angle.sin()).round() as isize,
                    )
                })
                .collect();
            offsets.push((0, 0));
            offsets.sort_unstable_by_key(|&(dx, dy)| (dy, dx));
            offsets.dedup();
            offsets.into_iter().map(|(dx, dy)| sample(dx, dy)).collect()
        }
    }
}

impl Filter for BilateralFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::new("bilateral", "Bilateral Filter", Category::Smooth)
            .description("Edge-preserving smoothing with spatial and range Gaussians")
    }

    fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
        inputs.first().map(|image| image.shape())
    }

    fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
        let src = inputs[0];
        let region = tile.tile();
        let channels = src.channels();
        let mut acc = vec![0.0f32; channels];

        for frame in 0..tile.frames() {
            for (x, y) in region.pixels() {
                let centre = src.pixel_at(frame, x, y);
                let (xi, yi) = (x as isize, y as isize);
                acc.fill(0.0);
                let mut total = 0.0f32;

                for s in &self.samples {
                    let neighbour = src.pixel_clamped(frame, xi + s.dx, yi + s.dy);
                    let distance: f32 = neighbour
                        .iter()
                        .zip(centre)
                        .map(|(a, b)| (a - b) * (a - b))
                        .sum();
                    let w = s.weight * (distance * self.range_coeff).exp();
                    total += w;
                    for (a, v) in acc.iter_mut().zip(neighbour) {
                        *a += w * v;
                    }
                }

                let dst = tile.pixel_at_mut(frame, x, y);
                if total > 0.0 {
                    for (d, a) in dst.iter_mut().zip(&acc) {
                        *d = a / total;
                    }
                } else {
                    dst.copy_from_slice(centre);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tiling::ProcessingConfig;

    fn step_edge() -> Image {
        Image::from_fn(Shape::new(16, 8, 1), |x, _, _| if x < 8 { 0.0 } else { 1.0 }).unwrap()
    }

    #[test]
    fn test_constant_image_is_unchanged() {
        let input = Image::filled(Shape::new(9, 7, 3), 0.3).unwrap();
        let mut filter = BilateralFilter::new(BilateralConfig::new(2.0, 0.1).unwrap()).unwrap();
        let out = filter.execute(&[&input], None).unwrap().unwrap();
        for v in out.data() {
            assert!((v - 0.3).abs() < 1e-6);
        }
    }

    #[test]
    fn test_edges_are_preserved() {
        let input = step_edge();
        let config = BilateralConfig::new(3.0, 0.05)
            .unwrap()
            .with_sampling(SamplingStrategy::Dense);
        let out = BilateralFilter::new(config).unwrap().execute(&[&input], None).unwrap().unwrap();

        assert!(out.pixel(7, 4)[0] < 1e-3);
        assert!(out.pixel(8, 4)[0] > 1.0 - 1e-3);
    }

    #[test]
    fn test_large_range_sigma_blurs_edges() {
        let input = step_edge();
        let config = BilateralConfig::new(3.0, 100.0)
            .unwrap()
            .with_sampling(SamplingStrategy::Dense);
        let out = BilateralFilter::new(config).unwrap().execute(&[&input], None).unwrap().unwrap();

        let left = out.pixel(7, 4)[0];
        assert!(left > 0.2 && left < 0.5, "left of edge = {left}");
    }

    #[test]
    fn test_output_stays_within_input_range() {
        let input = Image::from_fn(Shape::new(12, 10, 2), |x, y, c| {
            ((x * 7 + y * 13 + c * 5) % 11) as f32 / 10.0
        })
        .unwrap();
        let out = BilateralFilter::new(BilateralConfig::new(4.0, 0.2).unwrap())
            .unwrap()
            .execute(&[&input], None)
            .unwrap()
            .unwrap();
        for v in out.data() {
            assert!((-1e-6..=1.0 + 1e-6).contains(v));
        }
    }

    #[test]
    fn test_stratified_samples() {
        let config = BilateralConfig::new(40.0, 0.1).unwrap();
        let filter = BilateralFilter::new(config.clone()).unwrap();
        assert!(filter.sample_count() <= BASE_SAMPLES + 1);
        assert!(filter.samples.iter().any(|s| s.dx == 0 && s.dy == 0));
        let radius = config.radius() as isize;
        assert!(filter
            .samples
            .iter()
            .all(|s| s.dx.abs() <= radius && s.dy.abs() <= radius));

        let denser = BilateralFilter::new(config.with_samples_multiplier(4)).unwrap();
        assert!(denser.sample_count() > filter.sample_count());
    }

    #[test]
    fn test_dense_sample_count() {
        let config = BilateralConfig::new(1.0, 0.1)
            .unwrap()
            .with_sampling(SamplingStrategy::Dense);
        let filter = BilateralFilter::new(config).unwrap();
        // radius = ceil(2.5) = 3, window 7 x 7
        assert_eq!(filter.sample_count(), 49);
    }

    #[test]
    fn test_update_rebuilds_table() {
        let mut filter = BilateralFilter::new(
            BilateralConfig::new(1.0, 0.1).unwrap().with_sampling(SamplingStrategy::Dense),
        )
        .unwrap();
        filter
            .update(BilateralConfig::new(2.0, 0.1).unwrap().with_sampling(SamplingStrategy::Dense))
            .unwrap();
        assert_eq!(filter.sample_count(), 11 * 11);
        assert_eq!(filter.config().sigma_s, 2.0);

        assert!(filter.update(BilateralConfig { sigma_r: 0.0, ..BilateralConfig::default() }).is_err());
        assert_eq!(filter.config().sigma_s, 2.0);
    }

    #[test]
    fn test_tiling_does_not_change_result() {
        let input = Image::from_fn(Shape::new(20, 9, 3), |x, y, c| ((x + 2 * y + c) % 5) as f32 * 0.2)
            .unwrap();
        let mut filter = BilateralFilter::new(BilateralConfig::new(2.0, 0.3).unwrap()).unwrap();
        let whole = filter
            .execute_with(&[&input], None, &ProcessingConfig::new().with_tile_size(64, 64))
            .unwrap()
            .unwrap();
        let tiled = filter
            .execute_with(&[&input], None, &ProcessingConfig::new().with_tile_size(3, 4))
            .unwrap()
            .unwrap();
        assert_eq!(whole, tiled);
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(BilateralConfig::new(0.0, 0.1).is_err());
        assert!(BilateralConfig::new(1.0, -0.1).is_err());
        assert!(BilateralFilter::new(BilateralConfig::default().with_samples_multiplier(0)).is_err());

        assert!(BilateralConfig::new(MAX_SIGMA_S, 0.1).is_ok());
        let err = BilateralConfig::new(1.0e30, 0.1).unwrap_err();
        assert_eq!(err.parameter(), "sigma_s");
    }
}

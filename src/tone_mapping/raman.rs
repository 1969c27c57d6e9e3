//! Bilateral exposure fusion (Raman and Chaudhuri, 2009).
//!
//! # Algorithm
//!
//! Every exposure `j` of a stack gets a local-contrast weight map
//!
//! ```text
//! w_j = |bilateral(L_j) - L_j| + C
//! ```
//!
//! where `L_j` is its luminance. The bilateral filter uses
//! `sigma_s = K1 * min(width, height)` and `sigma_r = K2 * (max - min)` of the
//! value range. The first pass sums all `w_j` into an accumulator; the second
//! recomputes each `w_j`, divides it by the accumulator and adds the weighted
//! exposure into the output:
//!
//! ```text
//! out = sum_j I_j * w_j / sum_k w_k
//! ```
//!
//! Stacks are processed sequentially; the work on one exposure is tiled.
//!
//! # Example
//!
//! ```ignore
//! let mut tmo = RamanTmo::new(RamanConfig::default())?;
//! let ldr = tmo.process_stack(&[&under, &normal, &over], None)?;
//! ```

use crate::core::error::{ConfigError, FilterError, FilterResult};
use crate::core::filter::{dispatch_tiles, prepare_output, Category, Filter, FilterMetadata};
use crate::core::image::{Image, Shape};
use crate::core::tiling::{ProcessingConfig, TileMut};
use crate::filters::builtin::bilateral::{BilateralConfig, BilateralFilter, SamplingStrategy};
use crate::filters::builtin::luminance::{LuminanceFilter, LuminanceMode};
use crate::filters::registry::FilterRegistry;
use crate::settings::Settings;
use crate::tone_mapping::exposures::{ExposureGenerator, StopBracketing};
use crate::tone_mapping::stack::StackStatus;
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Register the tone-mapping operator.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|settings| Ok(Box::new(RamanTmo::from_settings(settings)?)));
}

/// Parameters of [`RamanTmo`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RamanConfig {
    /// Spatial sigma as a fraction of the smaller image side.
    pub k1: f32,
    /// Range sigma as a fraction of the value range.
    pub k2: f32,
    /// Constant added to every local-contrast weight.
    pub c: f32,
    /// Lower end of the value range.
    pub value_min: f32,
    /// Upper end of the value range.
    pub value_max: f32,
    /// Sampling strategy of the bilateral filter.
    pub sampling: SamplingStrategy,
    /// Sample multiplier of the bilateral filter.
    pub samples_multiplier: usize,
}

impl Default for RamanConfig {
    fn default() -> Self {
        Self {
            k1: 1.0,
            k2: 0.1,
            c: 70.0 / 255.0,
            value_min: 0.0,
            value_max: 1.0,
            sampling: SamplingStrategy::Stratified,
            samples_multiplier: 1,
        }
    }
}

impl RamanConfig {
    /// Check the parameters.
    ///
    /// `c` must be positive so the accumulated weights never vanish.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_positive("k1", self.k1)?;
        ConfigError::require_positive("k2", self.k2)?;
        ConfigError::require_positive("c", self.c)?;
        if !self.value_min.is_finite() || !self.value_max.is_finite() {
            return Err(ConfigError::invalid("value_range", "must be finite"));
        }
        if self.value_max <= self.value_min {
            return Err(ConfigError::invalid(
                "value_range",
                format!("empty range [{}, {}]", self.value_min, self.value_max),
            ));
        }
        if self.samples_multiplier == 0 {
            return Err(ConfigError::invalid("samples_multiplier", "must be at least 1"));
        }
        Ok(())
    }

    /// Bilateral parameters for a `width x height` stack.
    pub fn bilateral(&self, width: usize, height: usize) -> BilateralConfig {
        BilateralConfig {
            sigma_s: self.k1 * width.min(height) as f32,
            sigma_r: self.k2 * (self.value_max - self.value_min),
            sampling: self.sampling,
            samples_multiplier: self.samples_multiplier,
        }
    }
}

/// Exposure-fusion tone-mapping operator.
///
/// With one input the image is treated as HDR and an exposure stack is
/// synthesized by the [`ExposureGenerator`]; with two or more inputs they are
/// fused directly. Luminance, weight and accumulator buffers are kept between
/// calls and reused while the stack shape does not change.
pub struct RamanTmo {
    config: RamanConfig,
    bilateral: BilateralFilter,
    luminance: LuminanceFilter,
    generator: Box<dyn ExposureGenerator>,
    processing: ProcessingConfig,
    lum: Option<Image>,
    weights: Option<Image>,
    acc: Option<Image>,
}

impl Default for RamanTmo {
    fn default() -> Self {
        Self {
            config: RamanConfig::default(),
            bilateral: BilateralFilter::default(),
            luminance: LuminanceFilter::default(),
            generator: Box::new(StopBracketing::default()),
            processing: ProcessingConfig::default(),
            lum: None,
            weights: None,
            acc: None,
        }
    }
}

impl RamanTmo {
    /// Create an operator with the default exposure generator.
    pub fn new(config: RamanConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::default()
        })
    }

    /// Create an operator from the `[raman]`, `[exposures]`, `[luminance]`
    /// and `[processing]` settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, ConfigError> {
        settings.exposures.validate()?;
        Ok(Self::new(settings.raman.clone())?
            .with_generator(settings.exposures.clone())
            .with_luminance_mode(settings.luminance.mode)
            .with_processing(settings.processing))
    }

    /// Set how exposures are reduced to luminance before weighting.
    pub fn with_luminance_mode(mut self, mode: LuminanceMode) -> Self {
        self.luminance = LuminanceFilter::new(mode);
        self
    }

    /// Replace the exposure generator used for single HDR inputs.
    pub fn with_generator<G: ExposureGenerator + 'static>(mut self, generator: G) -> Self {
        self.generator = Box::new(generator);
        self
    }

    /// Set the tiling used by [`RamanTmo::process`] and
    /// [`RamanTmo::process_stack`].
    pub fn with_processing(mut self, processing: ProcessingConfig) -> Self {
        self.processing = processing;
        self
    }

    /// Current configuration.
    pub fn config(&self) -> &RamanConfig {
        &self.config
    }

    /// Replace the configuration.
    pub fn update(&mut self, config: RamanConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Tone map `inputs`: one HDR image or an exposure stack.
    pub fn process(&mut self, inputs: &[&Image], output: Option<Image>) -> FilterResult<Option<Image>> {
        let processing = self.processing;
        self.execute_with(inputs, output, &processing)
    }

    /// Fuse an exposure stack.
    ///
    /// Stacks with fewer than two images, or with images of different shapes,
    /// leave `output` untouched. When no output is supplied, a zeroed image
    /// of the first exposure's shape is returned in that case.
    pub fn process_stack(&mut self, stack: &[&Image], output: Option<Image>) -> FilterResult<Option<Image>> {
        let processing = self.processing;
        self.fuse(stack, output, &processing)
    }

    /// Tone map one HDR image with a default operator.
    pub fn tone_map(hdr: &Image, output: Option<Image>) -> FilterResult<Option<Image>> {
        RamanTmo::default().process(&[hdr], output)
    }

    /// Fuse an exposure stack with a default operator.
    pub fn tone_map_stack(stack: &[&Image], output: Option<Image>) -> FilterResult<Option<Image>> {
        RamanTmo::default().process_stack(stack, output)
    }

    /// Normalized weight map of every exposure in `stack`.
    ///
    /// The maps are single-channel and sum to one at every pixel. Returns an
    /// empty vector for stacks that cannot be fused.
    pub fn weight_maps(&mut self, stack: &[&Image]) -> FilterResult<Vec<Image>> {
        if !StackStatus::of(stack).is_ready() {
            return Ok(Vec::new());
        }
        let processing = self.processing;
        let acc = self.accumulate(stack, &processing)?;

        let mut maps = Vec::with_capacity(stack.len());
        for exposure in stack {
            let weights = self.normalized_weights(exposure, &acc, &processing)?;
            maps.push(weights.clone());
            self.weights = Some(weights);
        }
        self.acc = Some(acc);
        Ok(maps)
    }

    /// Drop the scratch buffers.
    pub fn release(&mut self) {
        self.lum = None;
        self.weights = None;
        self.acc = None;
    }

    fn tone_map_hdr(
        &mut self,
        hdr: &Image,
        output: Option<Image>,
        processing: &ProcessingConfig,
    ) -> FilterResult<Option<Image>> {
        let stack = self.generator.generate(hdr)?;
        debug!("raman_tmo: {} generated exposures", stack.len());
        if stack.len() < 2 {
            return untouched(hdr.shape(), output);
        }
        let stack: Vec<&Image> = stack.iter().collect();
        self.fuse(&stack, output, processing)
    }

    fn fuse(
        &mut self,
        stack: &[&Image],
        output: Option<Image>,
        processing: &ProcessingConfig,
    ) -> FilterResult<Option<Image>> {
        let Some(first) = stack.first() else {
            return Ok(output);
        };
        let status = StackStatus::of(stack);
        if !status.is_ready() {
            debug!("raman_tmo: stack not fused, {}", status);
            return untouched(first.shape(), output);
        }

        info!(
            "raman_tmo: fusing {} exposures of {}",
            stack.len(),
            first.shape()
        );
        let acc = self.accumulate(stack, processing)?;

        let mut output = prepare_output(first.shape(), output)?;
        output.set_zero();
        for &exposure in stack {
            let weights = self.normalized_weights(exposure, &acc, processing)?;
            dispatch_tiles(&*self, &[exposure, &weights], &mut output, processing);
            self.weights = Some(weights);
        }

        self.acc = Some(acc);
        Ok(Some(output))
    }

    /// First pass: sum of the local-contrast weights of the whole stack.
    fn accumulate(&mut self, stack: &[&Image], processing: &ProcessingConfig) -> FilterResult<Image> {
        let shape = stack[0].shape();
        self.bilateral
            .update(self.config.bilateral(shape.width, shape.height))?;

        let mut acc = prepare_output(shape.with_channels(1), self.acc.take())?;
        acc.set_zero();
        for (j, exposure) in stack.iter().enumerate() {
            debug!("raman_tmo: weights of exposure {}", j);
            let weights = self.local_contrast(exposure, processing)?;
            acc += &weights;
            self.weights = Some(weights);
        }
        Ok(acc)
    }

    /// Second pass weights of one exposure, divided by the accumulator.
    ///
    /// The returned buffer is the weight scratch image; callers hand it back
    /// through `self.weights`.
    fn normalized_weights(
        &mut self,
        exposure: &Image,
        acc: &Image,
        processing: &ProcessingConfig,
    ) -> FilterResult<Image> {
        let mut weights = self.local_contrast(exposure, processing)?;
        weights /= acc;
        Ok(weights)
    }

    /// `|bilateral(L) - L| + C` for one exposure.
    fn local_contrast(&mut self, exposure: &Image, processing: &ProcessingConfig) -> FilterResult<Image> {
        let lum = self
            .luminance
            .execute_with(&[exposure], self.lum.take(), processing)?
            .ok_or_else(|| empty_output("luminance"))?;
        let mut weights = self
            .bilateral
            .execute_with(&[&lum], self.weights.take(), processing)?
            .ok_or_else(|| empty_output("bilateral"))?;

        weights -= &lum;
        weights.apply_function(f32::abs);
        weights += self.config.c;

        self.lum = Some(lum);
        Ok(weights)
    }
}

/// Hand back the caller's buffer, or a fresh one of `shape`.
fn untouched(shape: Shape, output: Option<Image>) -> FilterResult<Option<Image>> {
    match output {
        Some(image) => Ok(Some(image)),
        None => Image::try_new(shape).map(Some),
    }
}

fn empty_output(filter: &str) -> FilterError {
    FilterError::EmptyOutput {
        filter: filter.to_string(),
    }
}

impl Filter for RamanTmo {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::new("raman_tmo", "Raman Tone Mapping", Category::ToneMapping).description(
            "Fuse an exposure stack, or a synthesized stack of one HDR image, with bilateral local-contrast weights",
        )
    }

    fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
        inputs.first().map(|image| image.shape())
    }

    /// Blend kernel of the second pass.
    ///
    /// Expects `[exposure, normalized_weights]` and adds the weighted
    /// exposure into the tile.
    fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
        let (exposure, weights) = (inputs[0], inputs[1]);
        let region = tile.tile();
        for frame in 0..tile.frames() {
            for (x, y) in region.pixels() {
                let w = weights.pixel_at(frame, x, y)[0];
                let src = exposure.pixel_at(frame, x, y);
                for (d, s) in tile.pixel_at_mut(frame, x, y).iter_mut().zip(src) {
                    *d += s * w;
                }
            }
        }
    }

    fn execute_with(
        &mut self,
        inputs: &[&Image],
        output: Option<Image>,
        config: &ProcessingConfig,
    ) -> FilterResult<Option<Image>> {
        match inputs {
            [] => Ok(output),
            [hdr] => self.tone_map_hdr(hdr, output, config),
            stack => self.fuse(stack, output, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tiling::TilingStrategy;

    fn scene(width: usize, height: usize) -> Image {
        Image::from_fn(Shape::new(width, height, 3), |x, y, c| {
            let edge = if x < width / 2 { 0.2 } else { 0.8 };
            let ripple = ((x * 3 + y * 5 + c) % 7) as f32 / 70.0;
            edge + ripple
        })
        .unwrap()
    }

    fn bracket(base: &Image) -> Vec<Image> {
        [0.25f32, 1.0, 2.5]
            .iter()
            .map(|&gain| {
                let mut image = base.clone();
                image.apply_function(|v| (v * gain).min(1.0));
                image
            })
            .collect()
    }

    fn fast() -> RamanTmo {
        RamanTmo::new(RamanConfig {
            k1: 0.25,
            ..RamanConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_small_stacks_leave_output_untouched() {
        let image = scene(8, 6);
        let marker = Image::filled(Shape::new(3, 3, 1), 0.123).unwrap();
        let mut tmo = RamanTmo::default();

        assert_eq!(tmo.process_stack(&[], None).unwrap(), None);
        let out = tmo.process_stack(&[], Some(marker.clone())).unwrap();
        assert_eq!(out, Some(marker.clone()));

        let out = tmo.process_stack(&[&image], Some(marker.clone())).unwrap();
        assert_eq!(out, Some(marker.clone()));
        let out = RamanTmo::tone_map_stack(&[&image], None).unwrap().unwrap();
        assert_eq!(out.shape(), image.shape());
        assert!(out.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_inconsistent_stack_is_a_no_op() {
        let a = scene(8, 6);
        let b = scene(6, 8);
        let marker = Image::filled(a.shape(), 0.5).unwrap();
        let out = fast().process_stack(&[&a, &b], Some(marker.clone())).unwrap();
        assert_eq!(out, Some(marker));
    }

    #[test]
    fn test_identical_exposures_reproduce_input() {
        let image = scene(10, 8);
        let out = fast().process_stack(&[&image, &image], None).unwrap().unwrap();
        assert_eq!(out.shape(), image.shape());
        for (o, i) in out.data().iter().zip(image.data()) {
            assert!((o - i).abs() < 1e-5, "{o} vs {i}");
        }
    }

    #[test]
    fn test_weight_maps_sum_to_one() {
        let stack = bracket(&scene(12, 9));
        let refs: Vec<&Image> = stack.iter().collect();
        let maps = fast().weight_maps(&refs).unwrap();
        assert_eq!(maps.len(), 3);

        let mut sum = Image::zeros(12, 9, 1).unwrap();
        for map in &maps {
            assert_eq!(map.channels(), 1);
            assert!(map.data().iter().all(|&w| w > 0.0));
            sum += map;
        }
        for s in sum.data() {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_output_is_convex_combination() {
        let stack = bracket(&scene(12, 9));
        let refs: Vec<&Image> = stack.iter().collect();
        let out = fast().process_stack(&refs, None).unwrap().unwrap();

        for (i, v) in out.data().iter().enumerate() {
            let lo = stack.iter().map(|s| s.data()[i]).fold(f32::INFINITY, f32::min);
            let hi = stack.iter().map(|s| s.data()[i]).fold(f32::NEG_INFINITY, f32::max);
            assert!(*v >= lo - 1e-5 && *v <= hi + 1e-5);
        }
    }

    #[test]
    fn test_deterministic_across_tilings() {
        let stack = bracket(&scene(13, 11));
        let refs: Vec<&Image> = stack.iter().collect();
        let mut tmo = fast();
        let reference = tmo.process_stack(&refs, None).unwrap().unwrap();

        for strategy in [
            TilingStrategy::Rows { height: 3 },
            TilingStrategy::Columns { width: 5 },
            TilingStrategy::Blocks { width: 4, height: 2 },
        ] {
            for parallel in [true, false] {
                let config = ProcessingConfig::new()
                    .with_strategy(strategy)
                    .with_parallel(parallel);
                let out = tmo.execute_with(&refs, None, &config).unwrap().unwrap();
                assert_eq!(out, reference);
            }
        }
    }

    #[test]
    fn test_output_buffer_is_reused() {
        let stack = bracket(&scene(8, 8));
        let refs: Vec<&Image> = stack.iter().collect();
        let reuse = Image::filled(stack[0].shape(), 9.0).unwrap();
        let ptr = reuse.data().as_ptr();

        let mut tmo = fast();
        let out = tmo.process_stack(&refs, Some(reuse)).unwrap().unwrap();
        assert_eq!(out.data().as_ptr(), ptr);
        assert!(out.data().iter().all(|&v| v < 9.0));

        // Scratch buffers survive the call and are dropped on release.
        assert!(tmo.acc.is_some() && tmo.lum.is_some() && tmo.weights.is_some());
        tmo.release();
        assert!(tmo.acc.is_none() && tmo.lum.is_none() && tmo.weights.is_none());
    }

    #[test]
    fn test_hdr_input_uses_generator() {
        let hdr = Image::from_fn(Shape::new(8, 8, 3), |x, y, _| 0.05 * (1 + x + 4 * y) as f32).unwrap();
        let out = RamanTmo::tone_map(&hdr, None).unwrap().unwrap();
        assert_eq!(out.shape(), hdr.shape());
        assert!(out.data().iter().all(|v| (0.0..=1.0 + 1e-5).contains(v)));
        assert!(out.data().iter().any(|&v| v > 0.0));
    }

    #[test]
    fn test_short_generated_stack_is_a_no_op() {
        let hdr = scene(6, 6);
        let single = |hdr: &Image| -> FilterResult<Vec<Image>> { Ok(vec![hdr.clone()]) };
        let mut tmo = RamanTmo::default().with_generator(single);
        let marker = Image::filled(hdr.shape(), 0.7).unwrap();
        assert_eq!(tmo.process(&[&hdr], Some(marker.clone())).unwrap(), Some(marker));
    }

    #[test]
    fn test_generator_errors_propagate() {
        let failing = |_: &Image| -> FilterResult<Vec<Image>> {
            Err(FilterError::Allocation { samples: usize::MAX })
        };
        let mut tmo = RamanTmo::default().with_generator(failing);
        let err = tmo.process(&[&scene(4, 4)], None).unwrap_err();
        assert!(err.is_fatal());
    }

    /// Fused output computed directly from the weight formula, one filter
    /// call per exposure and no scratch reuse.
    fn fused_directly(config: &RamanConfig, stack: &[Image]) -> (Vec<Image>, Image) {
        let shape = stack[0].shape();
        let mut luminance = LuminanceFilter::default();
        let mut bilateral = BilateralFilter::new(config.bilateral(shape.width, shape.height)).unwrap();

        let weights: Vec<Image> = stack
            .iter()
            .map(|exposure| {
                let lum = luminance.execute(&[exposure], None).unwrap().unwrap();
                let smooth = bilateral.execute(&[&lum], None).unwrap().unwrap();
                let data = smooth
                    .data()
                    .iter()
                    .zip(lum.data())
                    .map(|(b, l)| (b - l).abs() + config.c)
                    .collect();
                Image::from_vec(lum.shape(), data).unwrap()
            })
            .collect();

        let mut fused = Image::try_new(shape).unwrap();
        for y in 0..shape.height {
            for x in 0..shape.width {
                let total: f32 = weights.iter().map(|w| w.pixel(x, y)[0]).sum();
                for (exposure, w) in stack.iter().zip(&weights) {
                    let w = w.pixel(x, y)[0] / total;
                    for (d, s) in fused.pixel_mut(x, y).iter_mut().zip(exposure.pixel(x, y)) {
                        *d += s * w;
                    }
                }
            }
        }
        (weights, fused)
    }

    #[test]
    fn test_fusion_matches_local_contrast_weights() {
        let stack = bracket(&scene(12, 10));
        let refs: Vec<&Image> = stack.iter().collect();
        let mut tmo = fast();
        let (weights, expected) = fused_directly(tmo.config(), &stack);

        let out = tmo.process_stack(&refs, None).unwrap().unwrap();
        assert_eq!(out.shape(), expected.shape());
        for (o, e) in out.data().iter().zip(expected.data()) {
            assert!((o - e).abs() < 1e-6, "{o} vs {e}");
        }

        let maps = tmo.weight_maps(&refs).unwrap();
        for i in 0..maps[0].data().len() {
            let total: f32 = weights.iter().map(|w| w.data()[i]).sum();
            for (map, w) in maps.iter().zip(&weights) {
                assert!((map.data()[i] - w.data()[i] / total).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_textured_exposure_outweighs_flat_one() {
        assert_eq!(RamanConfig::default().c, 70.0 / 255.0);

        let shape = Shape::new(8, 8, 3);
        let flat = Image::filled(shape, 0.5).unwrap();
        let textured = Image::from_fn(shape, |x, y, _| if (x + y) % 2 == 0 { 0.45 } else { 0.55 }).unwrap();
        let mut tmo = fast();
        let maps = tmo.weight_maps(&[&flat, &textured]).unwrap();

        // A flat exposure only ever gets the constant term.
        let c = tmo.config().c;
        let (raw, _) = fused_directly(tmo.config(), &[flat.clone(), textured.clone()]);
        assert!(raw[0].data().iter().all(|&w| (w - c).abs() < 1e-6));

        for (x, y) in [(3, 3), (4, 3), (0, 0)] {
            let (w_flat, w_textured) = (maps[0].pixel(x, y)[0], maps[1].pixel(x, y)[0]);
            assert!(w_textured > w_flat, "({x}, {y}): {w_textured} <= {w_flat}");
        }
    }

    #[test]
    fn test_luminance_mode_comes_from_settings() {
        let mut settings = Settings::default();
        settings.luminance.mode = LuminanceMode::Mean;
        let tmo = RamanTmo::from_settings(&settings).unwrap();
        assert_eq!(tmo.luminance.mode(), LuminanceMode::Mean);
        assert_eq!(RamanTmo::default().luminance.mode(), LuminanceMode::Cie);
    }

    #[test]
    fn test_config_validation() {
        assert!(RamanTmo::new(RamanConfig { c: 0.0, ..RamanConfig::default() }).is_err());
        assert!(RamanTmo::new(RamanConfig {
            value_min: 1.0,
            value_max: 1.0,
            ..RamanConfig::default()
        })
        .is_err());

        let bilateral = RamanConfig::default().bilateral(640, 480);
        assert_eq!(bilateral.sigma_s, 480.0);
        assert!((bilateral.sigma_r - 0.1).abs() < 1e-7);
    }
}

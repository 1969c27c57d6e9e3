//! # Tonestack - Tile-parallel filters and exposure-fusion tone mapping
//!
//! Tonestack is a small image processing library built around one contract:
//! a filter negotiates its output shape from its inputs, reuses or allocates
//! the output buffer, and fills it tile by tile, in parallel when asked to.
//! On top of that it provides a bilateral exposure-fusion tone-mapping
//! operator that collapses an exposure stack (or a single HDR image) into one
//! low dynamic range image.
//!
//! ## Features
//!
//! - **Tiled dispatch**: Outputs are split into disjoint tiles processed with rayon
//! - **Buffer reuse**: A caller-supplied output of the right shape is filled in place
//! - **Best-effort inputs**: Unusable inputs hand the output back untouched instead of failing
//! - **Tone mapping**: Bilateral local-contrast weighting of exposure stacks
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use tonestack::prelude::*;
//!
//! let stack = tonestack::io::load_stack(&["dark.png", "mid.png", "bright.png"])?;
//! let refs: Vec<&Image> = stack.iter().collect();
//!
//! let mut tmo = RamanTmo::new(RamanConfig::default())?;
//! let ldr = tmo.process_stack(&refs, None)?.expect("stack of three exposures");
//! tonestack::io::save(&ldr, "fused.png")?;
//! ```
//!
//! ## Architecture
//!
//! - [`core`]: Images, tiles, the filter trait and error handling
//! - [`filters`]: Filter registry and built-in filters
//! - [`tone_mapping`]: The exposure-fusion operator and exposure generation
//! - [`io`]: Image files on disk
//! - [`settings`]: TOML parameter files
//!
//! ## Creating Custom Filters
//!
//! Implement [`Filter`](core::Filter); the provided `execute` takes care of
//! buffer reuse and tiling:
//!
//! ```rust,ignore
//! use tonestack::prelude::*;
//!
//! struct Invert;
//!
//! impl Filter for Invert {
//!     fn metadata(&self) -> FilterMetadata {
//!         FilterMetadata::new("invert", "Invert", Category::Color)
//!     }
//!
//!     fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
//!         inputs.first().map(|image| image.shape())
//!     }
//!
//!     fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
//!         let region = tile.tile();
//!         for (x, y) in region.pixels() {
//!             let src = inputs[0].pixel(x, y);
//!             for (d, s) in tile.pixel_mut(x, y).iter_mut().zip(src) {
//!                 *d = 1.0 - s;
//!             }
//!         }
//!     }
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod core;
pub mod filters;
pub mod io;
pub mod settings;
pub mod tone_mapping;

/// Prelude module for convenient imports.
///
/// Import everything commonly needed with:
/// ```rust,ignore
/// use tonestack::prelude::*;
/// ```
pub mod prelude {
    // Images and tiles
    pub use crate::core::image::{Image, Shape};
    pub use crate::core::tiling::{ProcessingConfig, Tile, TileGrid, TileMut, TilingStrategy};

    // Filter contract
    pub use crate::core::filter::{dispatch_tiles, prepare_output, Category, Filter, FilterMetadata};

    // Errors
    pub use crate::core::error::{
        ConfigError, FilterError, FilterResult, ToneStackError, ToneStackResult,
    };

    // Filters
    pub use crate::filters::registry::{FilterFactory, FilterRegistry, RegistryEntry};
    pub use crate::filters::builtin::{
        BilateralConfig, BilateralFilter, DownsampleConfig, DownsampleFilter, FusionWeightsConfig,
        FusionWeightsFilter, LuminanceFilter, LuminanceMode, NsweFilter, SamplingStrategy,
    };

    // Tone mapping
    pub use crate::tone_mapping::{ExposureGenerator, RamanConfig, RamanTmo, StackStatus, StopBracketing};

    // Settings
    pub use crate::settings::Settings;
}

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn test_version() {
        assert!(!super::VERSION.is_empty());
        assert_eq!(super::NAME, "tonestack");
    }

    #[test]
    fn test_registry_filters_run_through_trait_objects() {
        let registry = FilterRegistry::with_builtins();
        let settings = Settings::default();
        let input = Image::from_fn(Shape::new(8, 6, 3), |x, y, c| ((x + y + c) % 4) as f32 / 4.0)
            .unwrap();

        for id in ["downsample", "nswe", "luminance", "fusion_weights"] {
            let mut filter = registry.create(id, &settings).unwrap();
            let expected = filter.output_shape(&[&input]).unwrap();
            let out = filter.execute(&[&input], None).unwrap().unwrap();
            assert_eq!(out.shape(), expected, "{id}");
        }
    }

    #[test]
    fn test_pipeline_downsample_then_tone_map() {
        let base = Image::from_fn(Shape::new(16, 12, 3), |x, y, c| {
            0.1 + ((x * 5 + y * 3 + c) % 9) as f32 / 10.0
        })
        .unwrap();
        let small = DownsampleFilter::execute_default(&base, None).unwrap().unwrap();
        assert_eq!(small.shape(), Shape::new(8, 6, 3));

        let mut bright = small.clone();
        bright.apply_function(|v| (v * 2.0).min(1.0));
        let mut tmo = RamanTmo::new(RamanConfig {
            k1: 0.5,
            ..RamanConfig::default()
        })
        .unwrap();
        let out = tmo.process_stack(&[&small, &bright], None).unwrap().unwrap();
        assert_eq!(out.shape(), small.shape());
        assert!(out.data().iter().all(|v| v.is_finite()));
    }
}

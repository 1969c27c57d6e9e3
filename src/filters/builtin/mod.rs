//! Built-in filter implementations.
//!
//! This module contains the standard filters that ship with Tonestack. The
//! tone-mapping operator lives in [`crate::tone_mapping`] but is registered
//! alongside them.

pub mod bilateral;
pub mod downsample;
pub mod fusion_weights;
pub mod luminance;
pub mod nswe;

use crate::filters::registry::FilterRegistry;

/// Register all built-in filters.
pub fn register_all(registry: &mut FilterRegistry) {
    downsample::register(registry);
    nswe::register(registry);
    luminance::register(registry);
    bilateral::register(registry);
    fusion_weights::register(registry);
    crate::tone_mapping::raman::register(registry);
}

// Re-export for direct access
pub use bilateral::{BilateralConfig, BilateralFilter, SamplingStrategy};
pub use downsample::{DownsampleConfig, DownsampleFilter};
pub use fusion_weights::{FusionWeightsConfig, FusionWeightsFilter};
pub use luminance::{LuminanceConfig, LuminanceFilter, LuminanceMode};
pub use nswe::NsweFilter;

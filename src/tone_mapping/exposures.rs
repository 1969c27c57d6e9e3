//! Synthetic exposure stacks from a single HDR image.

use crate::core::error::{ConfigError, FilterResult};
use crate::core::image::Image;
use crate::filters::builtin::luminance::LuminanceFilter;
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Produces virtually re-exposed LDR renditions of an HDR image.
///
/// Every returned image must have the shape of the input.
pub trait ExposureGenerator: Send + Sync {
    /// Generate the exposure stack for `hdr`.
    fn generate(&self, hdr: &Image) -> FilterResult<Vec<Image>>;
}

impl<F> ExposureGenerator for F
where
    F: Fn(&Image) -> FilterResult<Vec<Image>> + Send + Sync,
{
    fn generate(&self, hdr: &Image) -> FilterResult<Vec<Image>> {
        self(hdr)
    }
}

/// Brackets the luminance range of an image in f-stops.
///
/// With `lmin` and `lmax` the smallest and largest positive finite
/// luminance, one rendition is produced for every f-stop `f` from
/// `-ceil(log2 lmax)` to `-floor(log2 lmin)`:
///
/// ```text
/// out = clamp((v * 2^f)^(1 / gamma), 0, 1)
/// ```
///
/// The step between stops is widened when more than `max_exposures`
/// renditions would be needed. An image without positive luminance yields an
/// empty stack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StopBracketing {
    /// Display gamma applied to every rendition.
    pub gamma: f32,
    /// Distance between consecutive exposures in f-stops.
    pub step: f32,
    /// Upper bound on the number of renditions.
    pub max_exposures: usize,
}

impl Default for StopBracketing {
    fn default() -> Self {
        Self {
            gamma: 2.2,
            step: 1.0,
            max_exposures: 32,
        }
    }
}

impl StopBracketing {
    /// Check the parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_positive("gamma", self.gamma)?;
        ConfigError::require_positive("step", self.step)?;
        if self.max_exposures < 2 {
            return Err(ConfigError::invalid("max_exposures", "must be at least 2"));
        }
        Ok(())
    }

    /// F-stops that bracket `hdr`, darkest exposure first.
    pub fn stops(&self, hdr: &Image) -> Vec<f32> {
        let Some((lmin, lmax)) = positive_luminance_range(hdr) else {
            return Vec::new();
        };

        let first = -lmax.log2().ceil();
        let last = -lmin.log2().floor();
        let span = last - first;

        let mut step = self.step;
        if (span / step).floor() as usize + 1 > self.max_exposures {
            step = span / (self.max_exposures - 1) as f32;
        }

        let count = (span / step + 1e-4).floor() as usize + 1;
        (0..count).map(|i| first + i as f32 * step).collect()
    }

    fn render(&self, hdr: &Image, stop: f32) -> FilterResult<Image> {
        let mut out = Image::try_new(hdr.shape())?;
        let scale = stop.exp2();
        let inv_gamma = 1.0 / self.gamma;
        out.data_mut()
            .par_iter_mut()
            .zip(hdr.data().par_iter())
            .for_each(|(d, &v)| *d = (v * scale).max(0.0).powf(inv_gamma).min(1.0));
        Ok(out)
    }
}

impl ExposureGenerator for StopBracketing {
    fn generate(&self, hdr: &Image) -> FilterResult<Vec<Image>> {
        let stops = self.stops(hdr);
        debug!("Generating {} exposures, stops {:?}", stops.len(), stops);
        stops.into_iter().map(|f| self.render(hdr, f)).collect()
    }
}

/// Smallest and largest positive finite luminance of an image.
fn positive_luminance_range(image: &Image) -> Option<(f32, f32)> {
    let luminance = LuminanceFilter::default();
    image
        .data()
        .par_chunks_exact(image.channels())
        .map(|pixel| luminance.luminance(pixel))
        .filter(|l| l.is_finite() && *l > 0.0)
        .fold(
            || None,
            |range: Option<(f32, f32)>, l| match range {
                Some((lo, hi)) => Some((lo.min(l), hi.max(l))),
                None => Some((l, l)),
            },
        )
        .reduce(
            || None,
            |a, b| match (a, b) {
                (Some((alo, ahi)), Some((blo, bhi))) => Some((alo.min(blo), ahi.max(bhi))),
                (a, None) => a,
                (None, b) => b,
            },
        )
}

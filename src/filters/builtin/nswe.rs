//! Four-neighbour difference filter.

use crate::core::error::FilterResult;
use crate::core::filter::{Category, Filter, FilterMetadata};
use crate::core::image::{Image, Shape};
use crate::core::tiling::TileMut;
use crate::filters::registry::FilterRegistry;

/// Register the NSWE filter.
pub fn register(registry: &mut FilterRegistry) {
    registry.register(|_| Ok(Box::new(NsweFilter)));
}

/// Number of output channels per input channel.
pub const DIRECTIONS: usize = 4;

/// Differences between each pixel and its north, south, west and east
/// neighbours.
///
/// For every input channel `k` the output holds four channels
/// `[N - P, S - P, W - P, E - P]` at offset `4 * k`, where `P` is the centre
/// value. Neighbours are taken along the first axis for N/S (`x + 1` and
/// `x - 1`) and along the second axis for W/E (`y - 1` and `y + 1`); samples
/// outside the image are clamped to the border, so border differences toward
/// the outside are zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct NsweFilter;

impl NsweFilter {
    /// Compute the differences of `input`.
    pub fn run(input: &Image, output: Option<Image>) -> FilterResult<Option<Image>> {
        NsweFilter.execute(&[input], output)
    }
}

impl Filter for NsweFilter {
    fn metadata(&self) -> FilterMetadata {
        FilterMetadata::new("nswe", "NSWE Differences", Category::Edge)
            .description("Per-channel differences to the four direct neighbours")
    }

    fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
        let shape = inputs.first()?.shape();
        Some(shape.with_channels(shape.channels.checked_mul(DIRECTIONS)?))
    }

    fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
        let src = inputs[0];
        let region = tile.tile();

        for frame in 0..tile.frames() {
            for (x, y) in region.pixels() {
                let (xi, yi) = (x as isize, y as isize);
                let p = src.pixel_at(frame, x, y);
                let n = src.pixel_clamped(frame, xi + 1, yi);
                let s = src.pixel_clamped(frame, xi - 1, yi);
                let w = src.pixel_clamped(frame, xi, yi - 1);
                let e = src.pixel_clamped(frame, xi, yi + 1);

                let dst = tile.pixel_at_mut(frame, x, y);
                for (k, out) in dst.chunks_exact_mut(DIRECTIONS).enumerate() {
                    out[0] = n[k] - p[k];
                    out[1] = s[k] - p[k];
                    out[2] = w[k] - p[k];
                    out[3] = e[k] - p[k];
                }
            }
        }
    }
}

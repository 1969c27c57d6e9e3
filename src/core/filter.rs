//! Filter trait and filter metadata.
//!
//! The [`Filter`] trait is the core abstraction for all image processing
//! operations. Running a filter is a fixed sequence:
//!
//! 1. check the inputs ([`Filter::accepts`])
//! 2. negotiate the output shape ([`Filter::output_shape`])
//! 3. reuse or allocate the output buffer ([`prepare_output`])
//! 4. partition the output into tiles and run [`Filter::process_tile`] on
//!    each of them ([`dispatch_tiles`])
//!
//! Steps 1 and 2 never fail loudly: a filter handed inputs it cannot work
//! with returns the caller's output untouched.

use crate::core::error::FilterResult;
use crate::core::image::{Image, Shape};
use crate::core::tiling::{ProcessingConfig, TileGrid, TileMut};
use log::{debug, trace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Category for organizing filters in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Resampling and geometric operations
    Transform,
    /// Edge-aware or plain smoothing
    Smooth,
    /// Gradients and differences
    Edge,
    /// Channel reductions and color operations
    Color,
    /// Per-pixel weight and measurement maps
    Analyze,
    /// HDR to LDR operators
    ToneMapping,
    /// Custom/user-defined
    #[default]
    Custom,
}

impl Category {
    /// Get the display name for this category.
    pub fn display_name(&self) -> &'static str {
        match self {
            Category::Transform => "Transform",
            Category::Smooth => "Smooth",
            Category::Edge => "Edge",
            Category::Color => "Color",
            Category::Analyze => "Analyze",
            Category::ToneMapping => "Tone Mapping",
            Category::Custom => "Custom",
        }
    }
}

/// Metadata describing a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterMetadata {
    /// Unique identifier for this filter type (e.g., "bilateral")
    pub id: String,
    /// Human-readable name (e.g., "Bilateral Filter")
    pub name: String,
    /// Detailed description
    pub description: String,
    /// Category for organization
    pub category: Category,
    /// Minimum number of input images
    pub min_inputs: usize,
}

impl FilterMetadata {
    /// Create metadata for a single-input filter.
    pub fn new(id: impl Into<String>, name: impl Into<String>, category: Category) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            category,
            min_inputs: 1,
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the minimum number of inputs.
    pub fn min_inputs(mut self, min_inputs: usize) -> Self {
        self.min_inputs = min_inputs;
        self
    }
}

/// A "many input images to one output image" transform.
///
/// Implementors provide the shape negotiation and the tile kernel; the
/// provided methods take care of buffer reuse and dispatch. Composite
/// filters may override [`Filter::execute_with`] entirely.
pub trait Filter: Send + Sync {
    /// Describe this filter.
    fn metadata(&self) -> FilterMetadata;

    /// Shape of the output for the given inputs.
    ///
    /// Must depend only on the input shapes, never on pixel values. Returns
    /// `None` when no output can be derived (e.g., no inputs).
    fn output_shape(&self, inputs: &[&Image]) -> Option<Shape>;

    /// Check whether the inputs are usable.
    ///
    /// The default only requires `metadata().min_inputs` images.
    fn accepts(&self, inputs: &[&Image]) -> bool {
        !inputs.is_empty() && inputs.len() >= self.metadata().min_inputs
    }

    /// Fill the destination pixels of one tile.
    ///
    /// Reads only from `inputs` and writes only inside `tile.tile()`. Must
    /// not assume anything about the order or timing of other tiles.
    fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>);

    /// Run the filter with the default [`ProcessingConfig`].
    fn execute(&mut self, inputs: &[&Image], output: Option<Image>) -> FilterResult<Option<Image>> {
        self.execute_with(inputs, output, &ProcessingConfig::default())
    }

    /// Run the filter.
    ///
    /// Returns `Ok(output)` untouched when the inputs are rejected, the
    /// (possibly reused) output on success, and `Err` only when a buffer
    /// cannot be allocated.
    fn execute_with(
        &mut self,
        inputs: &[&Image],
        output: Option<Image>,
        config: &ProcessingConfig,
    ) -> FilterResult<Option<Image>> {
        if !self.accepts(inputs) {
            debug!("{}: inputs rejected, output left untouched", self.metadata().id);
            return Ok(output);
        }
        let Some(shape) = self.output_shape(inputs).filter(Shape::is_valid) else {
            debug!("{}: no valid output shape, output left untouched", self.metadata().id);
            return Ok(output);
        };

        let mut output = prepare_output(shape, output)?;
        dispatch_tiles(&*self, inputs, &mut output, config);
        Ok(Some(output))
    }
}

/// Reuse `output` if it already has `shape`, otherwise allocate a new image.
///
/// A mismatched buffer is dropped, never resized in place.
pub fn prepare_output(shape: Shape, output: Option<Image>) -> FilterResult<Image> {
    match output {
        Some(image) if image.shape() == shape => Ok(image),
        Some(image) => {
            debug!("Replacing output buffer {} with {}", image.shape(), shape);
            Image::try_new(shape)
        }
        None => Image::try_new(shape),
    }
}

/// Partition `output` per `config` and run the filter's kernel on each tile.
///
/// Returns once every tile has been processed.
pub fn dispatch_tiles<F>(filter: &F, inputs: &[&Image], output: &mut Image, config: &ProcessingConfig)
where
    F: Filter + ?Sized,
{
    let grid = TileGrid::new(output.width(), output.height(), config.strategy);
    let mut tiles = grid.split(output);
    trace!(
        "Dispatching {} tiles ({} parallel)",
        tiles.len(),
        if config.parallel { "in" } else { "not in" }
    );

    if config.parallel {
        tiles
            .par_iter_mut()
            .for_each(|tile| filter.process_tile(inputs, tile));
    } else {
        for tile in tiles.iter_mut() {
            filter.process_tile(inputs, tile);
        }
    }
}

/// Check that every image has the same width, height, channels and frames.
pub fn all_similar(images: &[&Image]) -> bool {
    match images.split_first() {
        Some((first, rest)) => rest.iter().all(|image| image.is_similar(first)),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tiling::TilingStrategy;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Doubles its first input and counts how many tiles it saw.
    struct Doubler {
        tiles_seen: AtomicUsize,
    }

    impl Doubler {
        fn new() -> Self {
            Self {
                tiles_seen: AtomicUsize::new(0),
            }
        }
    }

    impl Filter for Doubler {
        fn metadata(&self) -> FilterMetadata {
            FilterMetadata::new("doubler", "Doubler", Category::Custom)
        }

        fn output_shape(&self, inputs: &[&Image]) -> Option<Shape> {
            inputs.first().map(|image| image.shape())
        }

        fn process_tile(&self, inputs: &[&Image], tile: &mut TileMut<'_>) {
            self.tiles_seen.fetch_add(1, Ordering::Relaxed);
            let region = tile.tile();
            for frame in 0..tile.frames() {
                for (x, y) in region.pixels() {
                    let src = inputs[0].pixel_at(frame, x, y);
                    for (d, s) in tile.pixel_at_mut(frame, x, y).iter_mut().zip(src) {
                        *d = 2.0 * s;
                    }
                }
            }
        }
    }

    fn input() -> Image {
        Image::from_fn(Shape::new(7, 5, 2).with_frames(2), |x, y, c| (x + 10 * y + 100 * c) as f32)
            .unwrap()
    }

    #[test]
    fn test_execute_allocates_and_processes_every_pixel() {
        let src = input();
        let mut filter = Doubler::new();
        let config = ProcessingConfig::new().with_tile_size(3, 2);
        let out = filter.execute_with(&[&src], None, &config).unwrap().unwrap();

        assert_eq!(out.shape(), src.shape());
        for (o, s) in out.data().iter().zip(src.data()) {
            assert_eq!(*o, 2.0 * s);
        }
        // 3 tile columns x 3 tile rows
        assert_eq!(filter.tiles_seen.load(Ordering::Relaxed), 9);
    }

    #[test]
    fn test_matching_output_is_reused_in_place() {
        let src = input();
        let reuse = Image::try_new(src.shape()).unwrap();
        let ptr = reuse.data().as_ptr();

        let out = Doubler::new().execute(&[&src], Some(reuse)).unwrap().unwrap();
        assert_eq!(out.data().as_ptr(), ptr);
    }

    #[test]
    fn test_mismatched_output_is_replaced() {
        let src = input();
        let wrong = Image::filled(Shape::new(2, 2, 2), 9.0).unwrap();
        let out = Doubler::new().execute(&[&src], Some(wrong)).unwrap().unwrap();
        assert_eq!(out.shape(), src.shape());
    }

    #[test]
    fn test_no_inputs_is_a_no_op() {
        let mut filter = Doubler::new();
        assert_eq!(filter.execute(&[], None).unwrap(), None);

        let marker = Image::filled(Shape::new(1, 1, 1), 3.0).unwrap();
        let out = filter.execute(&[], Some(marker.clone())).unwrap();
        assert_eq!(out, Some(marker));
    }

    #[test]
    fn test_output_shape_is_deterministic() {
        let a = input();
        let mut b = input();
        b.apply_function(|v| v * -3.0);
        let filter = Doubler::new();
        assert_eq!(filter.output_shape(&[&a]), filter.output_shape(&[&b]));
    }

    #[test]
    fn test_parallel_and_sequential_agree() {
        let src = input();
        let mut filter = Doubler::new();
        let strategies = [
            TilingStrategy::Rows { height: 1 },
            TilingStrategy::Columns { width: 3 },
            TilingStrategy::Blocks { width: 4, height: 4 },
        ];
        let reference = filter.execute(&[&src], None).unwrap().unwrap();
        for strategy in strategies {
            for parallel in [true, false] {
                let config = ProcessingConfig::new()
                    .with_strategy(strategy)
                    .with_parallel(parallel);
                let out = filter.execute_with(&[&src], None, &config).unwrap().unwrap();
                assert_eq!(out, reference);
            }
        }
    }

    #[test]
    fn test_all_similar() {
        let a = input();
        let b = input();
        let c = Image::zeros(7, 5, 2).unwrap();
        assert!(all_similar(&[&a, &b]));
        assert!(!all_similar(&[&a, &c]));
        assert!(all_similar(&[]));
    }
}

//! Tile partitioning and disjoint tile views for parallel dispatch.
//!
//! # Architecture
//!
//! An output image is partitioned into a grid of rectangular tiles:
//! - [`TilingStrategy`] picks the grid (full-width row bands, full-height
//!   column bands, or rectangular blocks)
//! - [`TileGrid`] holds the column and row boundaries and enumerates [`Tile`]s
//! - [`TileGrid::split`] hands out one [`TileMut`] per tile, each owning the
//!   row segments of the output buffer that fall inside its tile
//!
//! Because the views are carved out of the buffer with `split_at_mut`, no two
//! views can alias and they can be processed on any number of threads.
//!
//! # Example
//!
//! ```ignore
//! let config = ProcessingConfig::new().with_tile_size(64, 64);
//! let grid = TileGrid::new(width, height, config.strategy);
//! for tile in grid.split(&mut output) { /* ... */ }
//! ```

use crate::core::image::Image;
use serde::{Deserialize, Serialize};

/// Default edge length of a block tile.
pub const DEFAULT_TILE_SIZE: usize = 128;

/// An axis-aligned pixel range `[x0, x1) x [y0, y1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    /// First column (inclusive).
    pub x0: usize,
    /// Last column (exclusive).
    pub x1: usize,
    /// First row (inclusive).
    pub y0: usize,
    /// Last row (exclusive).
    pub y1: usize,
}

impl Tile {
    /// Create a new tile.
    pub fn new(x0: usize, x1: usize, y0: usize, y1: usize) -> Self {
        debug_assert!(x0 < x1 && y0 < y1, "empty tile [{x0},{x1})x[{y0},{y1})");
        Self { x0, x1, y0, y1 }
    }

    /// Tile covering a whole `width x height` image.
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, width, 0, height)
    }

    /// Width in pixels.
    pub fn width(&self) -> usize {
        self.x1 - self.x0
    }

    /// Height in pixels.
    pub fn height(&self) -> usize {
        self.y1 - self.y0
    }

    /// Number of pixels covered.
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Check whether `(x, y)` lies inside the tile.
    pub fn contains(&self, x: usize, y: usize) -> bool {
        (self.x0..self.x1).contains(&x) && (self.y0..self.y1).contains(&y)
    }

    /// Check whether two tiles share at least one pixel.
    pub fn intersects(&self, other: &Tile) -> bool {
        self.x0 < other.x1 && other.x0 < self.x1 && self.y0 < other.y1 && other.y0 < self.y1
    }

    /// Iterate over every `(x, y)` inside the tile in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize)> {
        let (x0, x1) = (self.x0, self.x1);
        (self.y0..self.y1).flat_map(move |y| (x0..x1).map(move |x| (x, y)))
    }
}

/// How an image is cut into tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TilingStrategy {
    /// Full-width bands of `height` rows.
    Rows {
        /// Rows per band.
        height: usize,
    },
    /// Full-height bands of `width` columns.
    Columns {
        /// Columns per band.
        width: usize,
    },
    /// Rectangular blocks.
    Blocks {
        /// Block width.
        width: usize,
        /// Block height.
        height: usize,
    },
}

impl Default for TilingStrategy {
    fn default() -> Self {
        TilingStrategy::Blocks {
            width: DEFAULT_TILE_SIZE,
            height: DEFAULT_TILE_SIZE,
        }
    }
}

impl TilingStrategy {
    /// Tile width and height for an image of the given size.
    ///
    /// Zero sizes are treated as one.
    fn tile_size(&self, image_width: usize, image_height: usize) -> (usize, usize) {
        let (w, h) = match *self {
            TilingStrategy::Rows { height } => (image_width, height),
            TilingStrategy::Columns { width } => (width, image_height),
            TilingStrategy::Blocks { width, height } => (width, height),
        };
        (w.max(1), h.max(1))
    }
}

/// Configuration for tiled dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    /// Partitioning of the output image.
    pub strategy: TilingStrategy,
    /// Whether to process tiles in parallel.
    pub parallel: bool,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            strategy: TilingStrategy::default(),
            parallel: true,
        }
    }
}

impl ProcessingConfig {
    /// Create a new processing configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use rectangular blocks of the given size.
    pub fn with_tile_size(mut self, width: usize, height: usize) -> Self {
        self.strategy = TilingStrategy::Blocks { width, height };
        self
    }

    /// Set the tiling strategy.
    pub fn with_strategy(mut self, strategy: TilingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Enable or disable parallel processing.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// A grid partition of a `width x height` pixel area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileGrid {
    x_bounds: Vec<usize>,
    y_bounds: Vec<usize>,
}

impl TileGrid {
    /// Partition a `width x height` area with the given strategy.
    pub fn new(width: usize, height: usize, strategy: TilingStrategy) -> Self {
        let (tile_width, tile_height) = strategy.tile_size(width, height);
        Self {
            x_bounds: bounds(width, tile_width),
            y_bounds: bounds(height, tile_height),
        }
    }

    /// Number of tile columns.
    pub fn columns(&self) -> usize {
        self.x_bounds.len().saturating_sub(1)
    }

    /// Number of tile rows.
    pub fn rows(&self) -> usize {
        self.y_bounds.len().saturating_sub(1)
    }

    /// Get the total number of tiles.
    pub fn tile_count(&self) -> usize {
        self.columns() * self.rows()
    }

    /// Iterate over tiles, row of tiles by row of tiles.
    pub fn tiles(&self) -> impl Iterator<Item = Tile> + '_ {
        self.y_bounds.windows(2).flat_map(move |ys| {
            self.x_bounds
                .windows(2)
                .map(move |xs| Tile::new(xs[0], xs[1], ys[0], ys[1]))
        })
    }

    fn band_of(&self, y: usize) -> usize {
        self.y_bounds.partition_point(|&b| b <= y) - 1
    }

    /// Split the sample buffer of `image` into one disjoint view per tile.
    ///
    /// The grid must have been built for the image's width and height.
    pub fn split<'a>(&self, image: &'a mut Image) -> Vec<TileMut<'a>> {
        let shape = image.shape();
        debug_assert_eq!(self.x_bounds.last().copied(), Some(shape.width));
        debug_assert_eq!(self.y_bounds.last().copied(), Some(shape.height));

        let mut views: Vec<TileMut<'a>> = self
            .tiles()
            .map(|tile| TileMut {
                tile,
                channels: shape.channels,
                frames: shape.frames,
                rows: Vec::with_capacity(tile.height() * shape.frames),
            })
            .collect();

        let columns = self.columns();
        let row_len = shape.width * shape.channels;
        for (row_index, row) in image.data_mut().chunks_exact_mut(row_len).enumerate() {
            let band = self.band_of(row_index % shape.height);
            let mut rest = row;
            for (column, xs) in self.x_bounds.windows(2).enumerate() {
                let (segment, tail) =
                    std::mem::take(&mut rest).split_at_mut((xs[1] - xs[0]) * shape.channels);
                views[band * columns + column].rows.push(segment);
                rest = tail;
            }
        }

        views
    }
}

fn bounds(extent: usize, step: usize) -> Vec<usize> {
    let mut bounds: Vec<usize> = (0..extent).step_by(step).collect();
    bounds.push(extent);
    bounds
}

/// Mutable view of the output pixels inside one tile.
///
/// Coordinates passed to the accessors are absolute image coordinates.
#[derive(Debug)]
pub struct TileMut<'a> {
    tile: Tile,
    channels: usize,
    frames: usize,
    rows: Vec<&'a mut [f32]>,
}

impl<'a> TileMut<'a> {
    /// The region this view covers.
    pub fn tile(&self) -> Tile {
        self.tile
    }

    /// Samples per pixel of the underlying image.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Number of frames of the underlying image.
    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Destination channel run of `(x, y)` in frame 0.
    #[inline]
    pub fn pixel_mut(&mut self, x: usize, y: usize) -> &mut [f32] {
        self.pixel_at_mut(0, x, y)
    }

    /// Destination channel run of `(x, y)` in `frame`.
    ///
    /// Panics if the coordinate lies outside the tile.
    #[inline]
    pub fn pixel_at_mut(&mut self, frame: usize, x: usize, y: usize) -> &mut [f32] {
        debug_assert!(self.tile.contains(x, y));
        let row = frame * self.tile.height() + (y - self.tile.y0);
        let start = (x - self.tile.x0) * self.channels;
        &mut self.rows[row][start..start + self.channels]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::image::Shape;
    use proptest::prelude::*;

    #[test]
    fn test_tile_geometry() {
        let tile = Tile::new(10, 110, 20, 220);
        assert_eq!(tile.width(), 100);
        assert_eq!(tile.height(), 200);
        assert_eq!(tile.area(), 20000);
        assert!(tile.contains(10, 20));
        assert!(!tile.contains(110, 20));
        assert_eq!(tile.pixels().count(), 20000);
    }

    #[test]
    fn test_tile_intersection() {
        let a = Tile::new(0, 4, 0, 4);
        assert!(a.intersects(&Tile::new(3, 5, 3, 5)));
        assert!(!a.intersects(&Tile::new(4, 8, 0, 4)));
        assert!(!a.intersects(&Tile::new(0, 4, 4, 8)));
    }

    #[test]
    fn test_block_grid() {
        let grid = TileGrid::new(100, 100, TilingStrategy::Blocks { width: 64, height: 64 });
        assert_eq!(grid.tile_count(), 4);

        let tiles: Vec<_> = grid.tiles().collect();
        assert_eq!(tiles[0], Tile::new(0, 64, 0, 64));
        // Last tile is smaller
        assert_eq!(tiles[3], Tile::new(64, 100, 64, 100));
    }

    #[test]
    fn test_row_and_column_bands() {
        let rows = TileGrid::new(10, 7, TilingStrategy::Rows { height: 3 });
        assert_eq!((rows.columns(), rows.rows()), (1, 3));

        let columns = TileGrid::new(10, 7, TilingStrategy::Columns { width: 4 });
        assert_eq!((columns.columns(), columns.rows()), (3, 1));
        assert_eq!(columns.tiles().last(), Some(Tile::new(8, 10, 0, 7)));
    }

    #[test]
    fn test_zero_tile_size_is_clamped() {
        let grid = TileGrid::new(3, 2, TilingStrategy::Blocks { width: 0, height: 0 });
        assert_eq!(grid.tile_count(), 6);
    }

    #[test]
    fn test_split_writes_land_in_place() {
        let mut image = Image::try_new(Shape::new(5, 4, 2).with_frames(2)).unwrap();
        let grid = TileGrid::new(5, 4, TilingStrategy::Blocks { width: 2, height: 3 });

        for mut view in grid.split(&mut image) {
            let tile = view.tile();
            for frame in 0..view.frames() {
                for (x, y) in tile.pixels() {
                    let pixel = view.pixel_at_mut(frame, x, y);
                    pixel[0] = (frame * 100 + y * 10 + x) as f32;
                    pixel[1] = -1.0;
                }
            }
        }

        for frame in 0..2 {
            for y in 0..4 {
                for x in 0..5 {
                    let pixel = image.pixel_at(frame, x, y);
                    assert_eq!(pixel, &[(frame * 100 + y * 10 + x) as f32, -1.0]);
                }
            }
        }
    }

    fn strategy() -> impl Strategy<Value = TilingStrategy> {
        prop_oneof![
            (1usize..20).prop_map(|height| TilingStrategy::Rows { height }),
            (1usize..20).prop_map(|width| TilingStrategy::Columns { width }),
            (1usize..20, 1usize..20)
                .prop_map(|(width, height)| TilingStrategy::Blocks { width, height }),
        ]
    }

    proptest! {
        #[test]
        fn prop_tiles_partition_image(
            width in 1usize..48,
            height in 1usize..48,
            strategy in strategy(),
        ) {
            let grid = TileGrid::new(width, height, strategy);
            let mut hits = vec![0u32; width * height];
            for tile in grid.tiles() {
                prop_assert!(tile.x1 <= width && tile.y1 <= height);
                for (x, y) in tile.pixels() {
                    hits[y * width + x] += 1;
                }
            }
            prop_assert!(hits.iter().all(|&h| h == 1));

            let tiles: Vec<_> = grid.tiles().collect();
            for (i, a) in tiles.iter().enumerate() {
                for b in &tiles[i + 1..] {
                    prop_assert!(!a.intersects(b));
                }
            }
        }
    }
}

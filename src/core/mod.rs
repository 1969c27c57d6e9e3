//! Core types and traits for the Tonestack filter framework.
//!
//! This module contains the foundational pieces every filter is built on:
//! - Raster images and their elementwise arithmetic
//! - Tiles, tiling strategies and disjoint tile views
//! - The filter trait, output negotiation and tiled dispatch
//! - Error types

pub mod error;
pub mod filter;
pub mod image;
pub mod tiling;

// Re-export commonly used types
pub use error::{ConfigError, FilterError, FilterResult, ToneStackError, ToneStackResult};
pub use filter::{dispatch_tiles, prepare_output, Category, Filter, FilterMetadata};
pub use image::{Image, Shape};
pub use tiling::{ProcessingConfig, Tile, TileGrid, TileMut, TilingStrategy};

//! TerraSeg Core
//!
//! Core types and error handling shared across TerraSeg components.
//!
//! This crate provides:
//! - Raster metadata and label-mask types
//! - The pixel-to-CRS affine transform used for vectorization
//! - Error types and result handling

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{GeoTransform, LabeledRaster, RasterMeta};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::types::{GeoTransform, LabeledRaster, RasterMeta};
}

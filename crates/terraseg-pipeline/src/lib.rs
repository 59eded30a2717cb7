//! TerraSeg Pipeline
//!
//! The raster-to-mask engineering core: tile grid computation over
//! arbitrarily large rasters, per-band normalization, rescaling between the
//! training tile size and the model input size, stitching per-tile
//! predictions back into a geographically consistent label mask, class-ID
//! remapping, and mask-to-polygon vectorization.

pub mod grid;
pub mod normalize;
pub mod remap;
pub mod scale;
pub mod stitch;
pub mod vectorize;

pub use grid::{extract_tiles, TileGrid, TileRect};
pub use normalize::normalize_tile;
pub use remap::remap_classes;
pub use scale::{scale_labels_back, scale_to};
pub use stitch::{argmax_labels, stitch};
pub use vectorize::{vectorize, FeatureCollection};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::grid::{extract_tiles, TileGrid, TileRect};
    pub use crate::normalize::normalize_tile;
    pub use crate::remap::remap_classes;
    pub use crate::scale::{scale_labels_back, scale_to};
    pub use crate::stitch::{argmax_labels, stitch};
    pub use crate::vectorize::{vectorize, FeatureCollection};
}

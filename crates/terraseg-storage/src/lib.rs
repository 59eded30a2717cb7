//! TerraSeg Storage
//!
//! Persistence layer for the inference service:
//! - Object storage abstraction with a filesystem backend
//! - Content-addressed label-array cache with a small binary codec
//! - Raster loading into band-major arrays with world-file georeferencing

pub mod cache;
pub mod raster;
pub mod store;

pub use cache::{cache_key, decode_labels, encode_labels, LabelCache};
pub use raster::{LoadedRaster, RasterReader};
pub use store::{FsStore, ObjectStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cache::{cache_key, LabelCache};
    pub use crate::raster::{LoadedRaster, RasterReader};
    pub use crate::store::{FsStore, ObjectStore};
}

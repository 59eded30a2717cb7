//! TerraSeg Model
//!
//! Model lifecycle for the inference service: resolving a versioned model
//! through an MLflow-compatible registry, extracting the run parameters that
//! drive tiling and normalization, and running the ONNX artifact.

pub mod registry;
pub mod session;

pub use registry::{ModelParams, RegistryClient, RegistryConfig, ResolvedModel};
pub use session::{OrtModel, SegmentationModel};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::registry::{ModelParams, RegistryClient, RegistryConfig, ResolvedModel};
    pub use crate::session::{OrtModel, SegmentationModel};
}

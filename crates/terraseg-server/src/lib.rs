//! TerraSeg Server
//!
//! HTTP inference server for satellite-image segmentation: request routing,
//! startup configuration, and the cache-or-predict orchestration over the
//! tiling pipeline.

pub mod cli;
pub mod config;
pub mod routes;
pub mod state;

pub use cli::Cli;
pub use config::ServerConfig;
pub use routes::create_router;
pub use state::{AppState, PipelinePredictor, PredictionService, Predictor};

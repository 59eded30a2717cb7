//! Error types for TerraSeg

/// Result type alias using TerraSeg's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for TerraSeg operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Model registry errors (connectivity, missing versions, bad metadata)
    #[error("registry error: {0}")]
    Registry(String),

    /// Model inference errors
    #[error("model error: {0}")]
    Model(String),

    /// Raster decoding or band-layout errors
    #[error("raster error: {0}")]
    Raster(String),

    /// Tile grid errors (dimension not divisible by tile size, image too small)
    #[error("tiling error: {0}")]
    Tiling(String),

    /// Object storage and cache errors
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Network/IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new registry error
    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    /// Create a new model error
    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    /// Create a new raster error
    pub fn raster(msg: impl Into<String>) -> Self {
        Self::Raster(msg.into())
    }

    /// Create a new tiling error
    pub fn tiling(msg: impl Into<String>) -> Self {
        Self::Tiling(msg.into())
    }

    /// Create a new storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is the caller's fault (maps to HTTP 400)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Tiling(_) | Self::Raster(_))
    }
}

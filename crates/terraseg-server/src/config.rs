//! Server configuration

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Object store root directory
    #[serde(default = "default_storage_root")]
    pub storage_root: String,

    /// Key prefix under which region imagery is stored.
    /// Region listings look under `<data_prefix>/<nuts_id>/<year>/<tile_size>/`.
    #[serde(default = "default_data_prefix")]
    pub data_prefix: String,

    /// CRS code stamped on loaded rasters and returned feature collections
    #[serde(default = "default_crs")]
    pub crs: String,

    /// Number of tiles sent through the model per inference call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &str, cli: &Cli) -> anyhow::Result<Self> {
        // Try to load from file, or use defaults
        let mut config = if Path::new(config_path).exists() {
            let content = std::fs::read_to_string(config_path)?;
            serde_yaml::from_str(&content)?
        } else {
            Self::default()
        };

        // Apply CLI overrides
        if let Some(root) = &cli.storage_root {
            config.storage_root = root.clone();
        }

        Ok(config)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            storage_root: default_storage_root(),
            data_prefix: default_data_prefix(),
            crs: default_crs(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_storage_root() -> String {
    "./data".to_string()
}

fn default_data_prefix() -> String {
    "data-preprocessed/patchs/CLCplus-Backbone/SENTINEL2".to_string()
}

fn default_crs() -> String {
    "EPSG:3035".to_string()
}

fn default_batch_size() -> usize {
    8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_overrides_defaults_field_by_field() {
        let config: ServerConfig =
            serde_yaml::from_str("storage_root: /srv/objects\nbatch_size: 4\n").unwrap();
        assert_eq!(config.storage_root, "/srv/objects");
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.crs, "EPSG:3035");
        assert_eq!(
            config.data_prefix,
            "data-preprocessed/patchs/CLCplus-Backbone/SENTINEL2"
        );
    }
}

//! Command-line interface for the inference server

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "terraseg-server")]
#[command(about = "Satellite image segmentation inference server", long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.yaml")]
    pub config: String,

    /// Listen address
    #[arg(short = 'l', long, default_value = "0.0.0.0")]
    pub listen: String,

    /// Listen port
    #[arg(short = 'P', long, default_value = "8080")]
    pub port: u16,

    /// Registered model name in the registry
    #[arg(long, env = "MODEL_NAME")]
    pub model_name: String,

    /// Model version to serve
    #[arg(long, env = "MODEL_VERSION")]
    pub model_version: String,

    /// Model registry tracking URI
    #[arg(long, env = "REGISTRY_TRACKING_URI")]
    pub tracking_uri: String,

    /// Object store root directory (overrides the config file)
    #[arg(short, long)]
    pub storage_root: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

//! Model registry client and run-metadata extraction.
//!
//! Models are versioned artifacts in an MLflow-compatible tracking server.
//! The registry maps (name, version) to an artifact source and a training
//! run, whose recorded parameters configure every inference call for the
//! lifetime of the process. Anything missing here is fatal at startup: the
//! service must not come up partially configured.

use std::collections::HashMap;

use serde::Deserialize;
use terraseg_core::{Error, Result};
use tracing::info;

/// Connection parameters for the model registry, read once at startup
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Tracking server base URI, e.g. "http://mlflow:5000"
    pub tracking_uri: String,

    /// Registered model name
    pub model_name: String,

    /// Model version to serve
    pub model_version: String,
}

/// A model version resolved through the registry
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    /// Registered model name
    pub name: String,

    /// Registered version
    pub version: String,

    /// Training run that produced this version
    pub run_id: String,

    /// Artifact location of the model file
    pub source: String,
}

/// Scalar configuration extracted from the training run parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ModelParams {
    /// Number of spectral bands the model expects
    pub n_bands: usize,

    /// Training tile side length in pixels
    pub tile_size: usize,

    /// Model input side length after augmentation
    pub augment_size: usize,

    /// Processing module name, selects the class-ID remapping
    pub module_name: String,

    /// Per-band normalization means
    pub normalization_mean: Vec<f32>,

    /// Per-band normalization standard deviations
    pub normalization_std: Vec<f32>,
}

impl ModelParams {
    /// Parse model parameters from a training run's parameter map.
    ///
    /// Every parameter is required; a registry that recorded an incomplete
    /// run cannot be served from.
    pub fn from_run_params(params: &HashMap<String, String>) -> Result<Self> {
        let n_bands = parse_usize(params, "n_bands")?;
        let tile_size = parse_usize(params, "tiles_size")?;
        let augment_size = parse_usize(params, "augment_size")?;
        let module_name = params
            .get("module_name")
            .ok_or_else(|| missing("module_name"))?
            .clone();

        if tile_size == 0 || augment_size == 0 || n_bands == 0 {
            return Err(Error::registry(
                "run parameters n_bands, tiles_size, and augment_size must be positive",
            ));
        }

        let mut normalization_mean = Vec::with_capacity(n_bands);
        let mut normalization_std = Vec::with_capacity(n_bands);
        for band in 0..n_bands {
            normalization_mean.push(parse_f32(params, &format!("normalization_mean_{band}"))?);
            normalization_std.push(parse_f32(params, &format!("normalization_std_{band}"))?);
        }

        Ok(Self {
            n_bands,
            tile_size,
            augment_size,
            module_name,
            normalization_mean,
            normalization_std,
        })
    }
}

fn missing(key: &str) -> Error {
    Error::registry(format!("run parameter '{}' is missing", key))
}

fn parse_usize(params: &HashMap<String, String>, key: &str) -> Result<usize> {
    params
        .get(key)
        .ok_or_else(|| missing(key))?
        .parse()
        .map_err(|_| Error::registry(format!("run parameter '{}' is not an integer", key)))
}

fn parse_f32(params: &HashMap<String, String>, key: &str) -> Result<f32> {
    params
        .get(key)
        .ok_or_else(|| missing(key))?
        .parse()
        .map_err(|_| Error::registry(format!("run parameter '{}' is not a number", key)))
}

/// HTTP client for the MLflow-compatible registry REST API
#[derive(Debug, Clone)]
pub struct RegistryClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct ModelVersionResponse {
    model_version: ModelVersionBody,
}

#[derive(Debug, Deserialize)]
struct ModelVersionBody {
    name: String,
    version: String,
    run_id: String,
    source: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunBody,
}

#[derive(Debug, Deserialize)]
struct RunBody {
    data: RunData,
}

#[derive(Debug, Deserialize)]
struct RunData {
    #[serde(default)]
    params: Vec<RunParam>,
}

#[derive(Debug, Deserialize)]
struct RunParam {
    key: String,
    value: String,
}

impl RegistryClient {
    /// Create a client for the given tracking URI
    pub fn new(tracking_uri: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::registry(format!("failed to build registry client: {}", e)))?;
        Ok(Self {
            http,
            base: tracking_uri.into().trim_end_matches('/').to_string(),
        })
    }

    /// Resolve a (name, version) pair to its artifact source and run id
    pub async fn get_model_version(&self, name: &str, version: &str) -> Result<ResolvedModel> {
        let url = format!("{}/api/2.0/mlflow/model-versions/get", self.base);
        let response = self
            .http
            .get(&url)
            .query(&[("name", name), ("version", version)])
            .send()
            .await
            .map_err(|e| Error::registry(format!("registry unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::registry(format!(
                "registry returned {} for model {} version {}",
                response.status(),
                name,
                version
            )));
        }

        let body: ModelVersionResponse = response
            .json()
            .await
            .map_err(|e| Error::registry(format!("malformed model-version response: {}", e)))?;

        Ok(ResolvedModel {
            name: body.model_version.name,
            version: body.model_version.version,
            run_id: body.model_version.run_id,
            source: body.model_version.source,
        })
    }

    /// Fetch the parameter map recorded on a training run
    pub async fn get_run_params(&self, run_id: &str) -> Result<HashMap<String, String>> {
        let url = format!("{}/api/2.0/mlflow/runs/get", self.base);
        let response = self
            .http
            .get(&url)
            .query(&[("run_id", run_id)])
            .send()
            .await
            .map_err(|e| Error::registry(format!("registry unreachable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::registry(format!(
                "registry returned {} for run {}",
                response.status(),
                run_id
            )));
        }

        let body: RunResponse = response
            .json()
            .await
            .map_err(|e| Error::registry(format!("malformed run response: {}", e)))?;

        Ok(body
            .run
            .data
            .params
            .into_iter()
            .map(|p| (p.key, p.value))
            .collect())
    }

    /// Resolve a model and its training parameters in one call
    pub async fn fetch_model(&self, config: &RegistryConfig) -> Result<(ResolvedModel, ModelParams)> {
        let resolved = self
            .get_model_version(&config.model_name, &config.model_version)
            .await?;
        info!(
            model = %resolved.name,
            version = %resolved.version,
            run_id = %resolved.run_id,
            "resolved model version"
        );

        let run_params = self.get_run_params(&resolved.run_id).await?;
        let params = ModelParams::from_run_params(&run_params)?;
        info!(
            tile_size = params.tile_size,
            augment_size = params.augment_size,
            n_bands = params.n_bands,
            module = %params.module_name,
            "extracted model parameters"
        );

        Ok((resolved, params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_params(n_bands: usize) -> HashMap<String, String> {
        let mut params = HashMap::new();
        params.insert("n_bands".into(), n_bands.to_string());
        params.insert("tiles_size".into(), "250".into());
        params.insert("augment_size".into(), "512".into());
        params.insert("module_name".into(), "segmentation".into());
        for band in 0..n_bands {
            params.insert(format!("normalization_mean_{band}"), "0.45".into());
            params.insert(format!("normalization_std_{band}"), "0.22".into());
        }
        params
    }

    #[test]
    fn parses_complete_run_params() {
        let params = ModelParams::from_run_params(&run_params(3)).unwrap();
        assert_eq!(params.n_bands, 3);
        assert_eq!(params.tile_size, 250);
        assert_eq!(params.augment_size, 512);
        assert_eq!(params.module_name, "segmentation");
        assert_eq!(params.normalization_mean.len(), 3);
        assert_eq!(params.normalization_std, vec![0.22, 0.22, 0.22]);
    }

    #[test]
    fn missing_parameter_is_fatal() {
        let mut params = run_params(3);
        params.remove("tiles_size");
        let err = ModelParams::from_run_params(&params).unwrap_err();
        assert!(matches!(err, Error::Registry(_)));
    }

    #[test]
    fn missing_band_statistic_is_fatal() {
        let mut params = run_params(4);
        params.remove("normalization_std_3");
        assert!(ModelParams::from_run_params(&params).is_err());
    }

    #[test]
    fn non_numeric_parameter_is_fatal() {
        let mut params = run_params(3);
        params.insert("augment_size".into(), "large".into());
        assert!(ModelParams::from_run_params(&params).is_err());
    }

    #[test]
    fn zero_tile_size_is_fatal() {
        let mut params = run_params(3);
        params.insert("tiles_size".into(), "0".into());
        assert!(ModelParams::from_run_params(&params).is_err());
    }

    #[test]
    fn model_version_response_deserializes() {
        let body: ModelVersionResponse = serde_json::from_str(
            r#"{
                "model_version": {
                    "name": "landcover",
                    "version": "7",
                    "run_id": "abc123",
                    "source": "/models/landcover/7/model.onnx",
                    "status": "READY"
                }
            }"#,
        )
        .unwrap();
        assert_eq!(body.model_version.run_id, "abc123");
        assert_eq!(body.model_version.source, "/models/landcover/7/model.onnx");
    }

    #[test]
    fn run_response_deserializes_param_list() {
        let body: RunResponse = serde_json::from_str(
            r#"{
                "run": {
                    "data": {
                        "params": [
                            {"key": "n_bands", "value": "3"},
                            {"key": "tiles_size", "value": "250"}
                        ]
                    }
                }
            }"#,
        )
        .unwrap();
        assert_eq!(body.run.data.params.len(), 2);
    }
}

//! Application state and the prediction service.
//!
//! Everything in `AppState` is initialized once at startup and read-only for
//! the lifetime of the process, so request handlers share it without locks.

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;
use ndarray::{s, Array3, Array4, Axis};
use tracing::{debug, info};

use terraseg_core::LabeledRaster;
use terraseg_model::{ModelParams, OrtModel, RegistryClient, RegistryConfig, SegmentationModel};
use terraseg_pipeline::{
    argmax_labels, extract_tiles, normalize_tile, scale_labels_back, scale_to, stitch, TileGrid,
};
use terraseg_storage::{FsStore, LabelCache, ObjectStore, RasterReader};

use crate::config::ServerConfig;

/// Full-image prediction seam.
///
/// The HTTP layer and the cache logic only see this trait; tests substitute
/// a counting mock for the real tiling pipeline.
pub trait Predictor: Send + Sync {
    /// Predict the label mask for one source image
    fn predict(&self, image_id: &str) -> terraseg_core::Result<LabeledRaster>;
}

/// Production predictor: tile, normalize, augment, infer, stitch
pub struct PipelinePredictor {
    reader: RasterReader,
    model: Arc<dyn SegmentationModel>,
    params: Arc<ModelParams>,
    batch_size: usize,
}

impl PipelinePredictor {
    /// Create a predictor over a raster reader and a loaded model
    pub fn new(
        reader: RasterReader,
        model: Arc<dyn SegmentationModel>,
        params: Arc<ModelParams>,
        batch_size: usize,
    ) -> Self {
        Self {
            reader,
            model,
            params,
            batch_size: batch_size.max(1),
        }
    }
}

impl Predictor for PipelinePredictor {
    fn predict(&self, image_id: &str) -> terraseg_core::Result<LabeledRaster> {
        let start = std::time::Instant::now();
        let params = &self.params;

        let raster = self.reader.read(image_id, params.n_bands)?;
        let grid = TileGrid::new(raster.meta.width, raster.meta.height, params.tile_size)?;
        let tiles = extract_tiles(raster.bands.view(), &grid)?;
        debug!(
            image = image_id,
            tiles = tiles.len(),
            "running prediction pipeline"
        );

        let mut augmented: Vec<Array3<f32>> = Vec::with_capacity(tiles.len());
        for mut tile in tiles {
            normalize_tile(&mut tile, &params.normalization_mean, &params.normalization_std)?;
            augmented.push(scale_to(tile.view(), params.augment_size));
        }

        let mut label_tiles = Vec::with_capacity(augmented.len());
        for chunk in augmented.chunks(self.batch_size) {
            let mut batch = Array4::<f32>::zeros((
                chunk.len(),
                params.n_bands,
                params.augment_size,
                params.augment_size,
            ));
            for (i, tile) in chunk.iter().enumerate() {
                batch.slice_mut(s![i, .., .., ..]).assign(tile);
            }

            let logits = self.model.predict_batch(batch.view())?;
            if logits.dim().0 != chunk.len() {
                return Err(terraseg_core::Error::model(format!(
                    "model returned {} outputs for a batch of {}",
                    logits.dim().0,
                    chunk.len()
                )));
            }

            for i in 0..chunk.len() {
                let labels = argmax_labels(logits.index_axis(Axis(0), i))?;
                label_tiles.push(scale_labels_back(labels.view(), params.tile_size));
            }
        }

        let mask = stitch(&label_tiles, &grid)?;
        metrics::histogram!("terraseg_prediction_latency_ms")
            .record(start.elapsed().as_millis() as f64);

        LabeledRaster::new(raster.meta, mask)
    }
}

/// Cache-or-predict orchestration shared by both prediction endpoints
#[derive(Clone)]
pub struct PredictionService {
    cache: LabelCache,
    reader: RasterReader,
    predictor: Arc<dyn Predictor>,
}

impl PredictionService {
    /// Create a service over a cache, a raster reader, and a predictor
    pub fn new(cache: LabelCache, reader: RasterReader, predictor: Arc<dyn Predictor>) -> Self {
        Self {
            cache,
            reader,
            predictor,
        }
    }

    /// Whether a prediction for this image is already cached
    pub fn is_cached(&self, image_id: &str) -> terraseg_core::Result<bool> {
        self.cache.contains(image_id)
    }

    /// Return the label mask for an image, computing and caching on miss.
    ///
    /// On a hit the pipeline is never invoked; only the source metadata is
    /// re-read to georeference the cached labels. Concurrent misses for the
    /// same image may compute twice and write the same entry, which is
    /// tolerated (last write wins).
    pub fn predict_cached(&self, image_id: &str, n_bands: usize) -> terraseg_core::Result<LabeledRaster> {
        if self.cache.contains(image_id)? {
            info!(image = image_id, "loading prediction from cache");
            metrics::counter!("terraseg_cache_hits_total").increment(1);
            let meta = self.reader.read_meta(image_id, n_bands)?;
            let labels = self.cache.load(image_id)?;
            return LabeledRaster::new(meta, labels);
        }

        metrics::counter!("terraseg_cache_misses_total").increment(1);
        let prediction = self.predictor.predict(image_id)?;
        self.cache.save(image_id, &prediction.labels)?;
        Ok(prediction)
    }

    /// Predict a batch of images, grouping into uncached-then-cached like
    /// the single-image path. Results keep that grouping order.
    pub fn predict_batch_cached(
        &self,
        image_ids: &[String],
        n_bands: usize,
    ) -> terraseg_core::Result<Vec<LabeledRaster>> {
        let mut to_predict = Vec::new();
        let mut from_cache = Vec::new();
        for id in image_ids {
            if self.cache.contains(id)? {
                from_cache.push(id.as_str());
            } else {
                to_predict.push(id.as_str());
            }
        }

        let mut results = Vec::with_capacity(image_ids.len());
        for id in to_predict {
            metrics::counter!("terraseg_cache_misses_total").increment(1);
            let prediction = self.predictor.predict(id)?;
            self.cache.save(id, &prediction.labels)?;
            results.push(prediction);
        }
        if !from_cache.is_empty() {
            info!(images = from_cache.len(), "loading predictions from cache");
        }
        for id in from_cache {
            metrics::counter!("terraseg_cache_hits_total").increment(1);
            let meta = self.reader.read_meta(id, n_bands)?;
            let labels = self.cache.load(id)?;
            results.push(LabeledRaster::new(meta, labels)?);
        }
        Ok(results)
    }
}

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<ServerConfig>,

    /// Registered model name, for the welcome endpoint
    pub model_name: String,

    /// Registered model version, for the welcome endpoint
    pub model_version: String,

    /// Parameters extracted from the model's training run
    pub params: Arc<ModelParams>,

    /// Object store holding imagery and the prediction cache
    pub store: Arc<dyn ObjectStore>,

    /// Cache-or-predict service
    pub service: PredictionService,

    /// Prometheus metrics handle for rendering (absent until installed)
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    /// Initialize application state from configuration.
    ///
    /// Fetches the model through the registry, loads the ONNX artifact, and
    /// wires the pipeline. Any failure here aborts startup: the service must
    /// not come up partially configured.
    pub async fn new(
        config: ServerConfig,
        registry: RegistryConfig,
        metrics_handle: PrometheusHandle,
    ) -> Result<Self> {
        info!("initializing application state");

        let client = RegistryClient::new(&registry.tracking_uri)?;
        let (resolved, params) = client.fetch_model(&registry).await?;

        let model_path = resolved.source.clone();
        let params_for_load = params.clone();
        let model = tokio::task::spawn_blocking(move || {
            OrtModel::load(Path::new(&model_path), &params_for_load)
        })
        .await??;

        Ok(Self::from_parts(
            config,
            resolved.name,
            resolved.version,
            params,
            Arc::new(model),
        )?
        .with_metrics(metrics_handle))
    }

    /// Wire application state from already-loaded parts.
    ///
    /// Split out of [`AppState::new`] so tests can substitute the model or
    /// the whole predictor.
    pub fn from_parts(
        config: ServerConfig,
        model_name: String,
        model_version: String,
        params: ModelParams,
        model: Arc<dyn SegmentationModel>,
    ) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(&config.storage_root)?);
        let params = Arc::new(params);
        let reader = RasterReader::new(store.clone(), config.crs.clone());
        let predictor: Arc<dyn Predictor> = Arc::new(PipelinePredictor::new(
            reader.clone(),
            model,
            params.clone(),
            config.batch_size,
        ));
        Ok(Self::assemble(
            config,
            model_name,
            model_version,
            params,
            store,
            reader,
            predictor,
        ))
    }

    /// Assemble state around an arbitrary predictor (test seam)
    pub fn with_predictor(
        config: ServerConfig,
        model_name: String,
        model_version: String,
        params: ModelParams,
        predictor: Arc<dyn Predictor>,
    ) -> Result<Self> {
        let store: Arc<dyn ObjectStore> = Arc::new(FsStore::new(&config.storage_root)?);
        let reader = RasterReader::new(store.clone(), config.crs.clone());
        Ok(Self::assemble(
            config,
            model_name,
            model_version,
            Arc::new(params),
            store,
            reader,
            predictor,
        ))
    }

    fn assemble(
        config: ServerConfig,
        model_name: String,
        model_version: String,
        params: Arc<ModelParams>,
        store: Arc<dyn ObjectStore>,
        reader: RasterReader,
        predictor: Arc<dyn Predictor>,
    ) -> Self {
        let cache = LabelCache::new(store.clone());
        let service = PredictionService::new(cache, reader, predictor);
        Self {
            config: Arc::new(config),
            model_name,
            model_version,
            params,
            store,
            service,
            metrics_handle: None,
        }
    }

    /// Attach the Prometheus handle installed in `main`
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}

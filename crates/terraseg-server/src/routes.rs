//! HTTP routes and handlers

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use terraseg_core::LabeledRaster;
use terraseg_pipeline::{remap_classes, vectorize, FeatureCollection};

use crate::state::AppState;

/// Years for which region imagery exists
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 2018..=2024;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(welcome))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/predict_image", get(predict_image))
        .route("/predict_nuts", get(predict_nuts))
        .fallback(fallback)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state
        .metrics_handle
        .as_ref()
        .map(|handle| handle.render())
        .unwrap_or_default()
}

/// Welcome page with the currently served model name and version
async fn welcome(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "message": "Satellite Image Inference",
        "model_name": state.model_name,
        "model_version": state.model_version,
    }))
}

#[derive(Debug, Deserialize)]
struct PredictImageQuery {
    /// Source image identifier (object key)
    image: String,

    /// Return GeoJSON polygons instead of the raw label mask
    #[serde(default)]
    polygons: bool,
}

/// Predict the label mask for a single satellite image
async fn predict_image(
    State(state): State<AppState>,
    Query(query): Query<PredictImageQuery>,
) -> Result<Response, AppError> {
    info!(image = %query.image, polygons = query.polygons, "predict image endpoint accessed");
    metrics::counter!("terraseg_requests_total", "endpoint" => "predict_image").increment(1);

    let mut prediction = run_prediction(&state, query.image.clone()).await?;

    // Class-ID remapping runs on every result, cached or fresh
    remap_classes(&mut prediction.labels, &state.params.module_name)?;

    if query.polygons {
        let collection = vectorize(&prediction);
        Ok(Json(collection.to_json()).into_response())
    } else {
        Ok(Json(json!({ "mask": prediction.to_nested() })).into_response())
    }
}

#[derive(Debug, Deserialize)]
struct PredictNutsQuery {
    /// NUTS region identifier
    nuts_id: String,

    /// Acquisition year of the imagery
    #[serde(default = "default_year")]
    year: i32,
}

fn default_year() -> i32 {
    2021
}

/// Predict label masks for every image of a region/year and return the
/// vectorized predictions as one feature collection
async fn predict_nuts(
    State(state): State<AppState>,
    Query(query): Query<PredictNutsQuery>,
) -> Result<Response, AppError> {
    info!(nuts_id = %query.nuts_id, year = query.year, "predict nuts endpoint accessed");
    metrics::counter!("terraseg_requests_total", "endpoint" => "predict_nuts").increment(1);

    if !YEAR_RANGE.contains(&query.year) {
        return Err(AppError::InvalidRequest(format!(
            "year {} is outside the supported range {}-{}",
            query.year,
            YEAR_RANGE.start(),
            YEAR_RANGE.end()
        )));
    }

    let prefix = format!(
        "{}/{}/{}/{}/",
        state.config.data_prefix, query.nuts_id, query.year, state.params.tile_size
    );
    let images: Vec<String> = state
        .store
        .list(&prefix)?
        .into_iter()
        .filter(|key| key.ends_with(".tif"))
        .collect();

    if images.is_empty() {
        info!(nuts_id = %query.nuts_id, year = query.year, "no images found for region");
        let empty = FeatureCollection::empty(state.config.crs.clone());
        return Ok(Json(json!({ "predictions": empty.to_json() })).into_response());
    }

    let state_for_batch = state.clone();
    let n_bands = state.params.n_bands;
    let mut predictions = tokio::task::spawn_blocking(move || {
        state_for_batch
            .service
            .predict_batch_cached(&images, n_bands)
    })
    .await
    .map_err(|e| AppError::Internal(format!("prediction task failed: {}", e)))??;

    let mut collection = FeatureCollection::empty(state.config.crs.clone());
    for prediction in &mut predictions {
        remap_classes(&mut prediction.labels, &state.params.module_name)?;
        collection.extend(vectorize(prediction));
    }

    Ok(Json(json!({ "predictions": collection.to_json() })).into_response())
}

/// Run the cache-or-predict service off the async runtime
async fn run_prediction(state: &AppState, image_id: String) -> Result<LabeledRaster, AppError> {
    let service = state.service.clone();
    let n_bands = state.params.n_bands;
    tokio::task::spawn_blocking(move || service.predict_cached(&image_id, n_bands))
        .await
        .map_err(|e| AppError::Internal(format!("prediction task failed: {}", e)))?
        .map_err(AppError::from)
}

async fn fallback() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found")
}

/// Error handling
#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    Domain(terraseg_core::Error),
    Internal(String),
}

impl From<terraseg_core::Error> for AppError {
    fn from(err: terraseg_core::Error) -> Self {
        AppError::Domain(err)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Domain(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            AppError::Domain(err) => {
                warn!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
            }
            AppError::Internal(msg) => {
                warn!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        metrics::counter!("terraseg_errors_total").increment(1);

        let body = json!({
            "error": {
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

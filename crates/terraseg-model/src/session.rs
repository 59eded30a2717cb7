//! Segmentation model trait and the ONNX Runtime implementation

use std::path::Path;

use ndarray::{Array4, ArrayView4, Ix4};
use ort::session::{builder::SessionBuilder, Session};
use ort::value::TensorRef;
use parking_lot::Mutex;
use terraseg_core::{Error, Result};
use tracing::info;

use crate::registry::ModelParams;

/// A pretrained segmentation model.
///
/// Takes a normalized batch `(batch, bands, size, size)` and returns
/// per-class logits `(batch, classes, size, size)`. Implementations must be
/// shareable across request handlers.
pub trait SegmentationModel: Send + Sync {
    /// Run inference over a batch of augmented tiles
    fn predict_batch(&self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>>;
}

/// ONNX Runtime session wrapper.
///
/// The session API requires `&mut`, so it sits behind a mutex; tile batches
/// are serialized through the model, which also bounds peak tensor memory.
pub struct OrtModel {
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OrtModel {
    /// Load an ONNX model and validate its input shape against the run
    /// parameters (dynamic dimensions are accepted).
    pub fn load(model_path: &Path, params: &ModelParams) -> Result<Self> {
        let session = SessionBuilder::new()
            .map_err(|e| Error::model(format!("failed to create session builder: {}", e)))?
            .with_memory_pattern(true)
            .map_err(|e| Error::model(format!("failed to configure session: {}", e)))?
            .commit_from_file(model_path)
            .map_err(|e| {
                Error::model(format!(
                    "failed to load model from {}: {}",
                    model_path.display(),
                    e
                ))
            })?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| Error::model("model has no inputs"))?;
        let input_name = input.name.clone();

        if let Some(shape) = input.input_type.tensor_shape() {
            // Expected layout (batch, bands, size, size); negative dims are dynamic
            if shape.len() != 4 {
                return Err(Error::model(format!(
                    "model input is rank {}, expected a 4-d tile batch",
                    shape.len()
                )));
            }
            let bands = shape[1];
            if bands > 0 && bands as usize != params.n_bands {
                return Err(Error::model(format!(
                    "model expects {} bands but run metadata says {}",
                    bands, params.n_bands
                )));
            }
            let size = shape[2];
            if size > 0 && size as usize != params.augment_size {
                return Err(Error::model(format!(
                    "model input size {} does not match augment size {}",
                    size, params.augment_size
                )));
            }
        }

        let output_name = session
            .outputs
            .first()
            .ok_or_else(|| Error::model("model has no outputs"))?
            .name
            .clone();

        info!(
            path = %model_path.display(),
            input = %input_name,
            output = %output_name,
            "loaded ONNX model"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }
}

impl SegmentationModel for OrtModel {
    fn predict_batch(&self, batch: ArrayView4<'_, f32>) -> Result<Array4<f32>> {
        let batch = batch.as_standard_layout();
        let input = TensorRef::from_array_view(&batch)
            .map_err(|e| Error::model(format!("failed to build input tensor: {}", e)))?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(|e| Error::model(format!("inference failed: {}", e)))?;

        outputs[self.output_name.as_str()]
            .try_extract_array::<f32>()
            .map_err(|e| Error::model(format!("failed to read model output: {}", e)))?
            .into_dimensionality::<Ix4>()
            .map_err(|e| Error::model(format!("model output is not 4-d: {}", e)))
            .map(|view| view.to_owned())
    }
}

//! Mapping raw model output indices to final class IDs.
//!
//! Each processing module trained against a different label encoding; the
//! module name recorded in the model's run metadata selects the table.
//! Remapping runs on every returned prediction, cached or fresh.

use ndarray::Array2;
use terraseg_core::{Error, Result};

/// Remap raw model labels to final class IDs in place.
pub fn remap_classes(labels: &mut Array2<u8>, module_name: &str) -> Result<()> {
    match module_name {
        // Multi-class land-cover head: output indices are the class IDs
        "segmentation" => Ok(()),
        // Binary head: everything but background collapses to class 1
        "binary" => {
            labels.mapv_inplace(|v| u8::from(v != 0));
            Ok(())
        }
        other => Err(Error::model(format!(
            "unknown processing module '{}', no class mapping available",
            other
        ))),
    }
}

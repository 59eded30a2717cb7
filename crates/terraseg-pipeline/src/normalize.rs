//! Per-band normalization of input tiles

use ndarray::Array3;
use terraseg_core::{Error, Result};

/// Normalize a band-major `(bands, h, w)` tile in place with per-band
/// statistics recorded at training time: `(x - mean[b]) / std[b]`.
pub fn normalize_tile(tile: &mut Array3<f32>, mean: &[f32], std: &[f32]) -> Result<()> {
    let n_bands = tile.dim().0;
    if mean.len() != n_bands || std.len() != n_bands {
        return Err(Error::raster(format!(
            "tile has {} bands but normalization statistics cover {} means / {} stds",
            n_bands,
            mean.len(),
            std.len()
        )));
    }
    if let Some(b) = std.iter().position(|s| *s <= 0.0) {
        return Err(Error::model(format!(
            "non-positive normalization std {} for band {}",
            std[b], b
        )));
    }

    for (b, mut band) in tile.outer_iter_mut().enumerate() {
        let (m, s) = (mean[b], std[b]);
        band.mapv_inplace(|v| (v - m) / s);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn normalizes_each_band_with_its_own_stats() {
        let mut tile = Array3::from_shape_fn((2, 2, 2), |(b, _, _)| (b as f32 + 1.0) * 10.0);
        normalize_tile(&mut tile, &[10.0, 20.0], &[2.0, 5.0]).unwrap();
        assert_eq!(tile[(0, 0, 0)], 0.0);
        assert_eq!(tile[(1, 1, 1)], 0.0);

        let mut tile = Array3::from_elem((1, 1, 1), 7.0);
        normalize_tile(&mut tile, &[3.0], &[2.0]).unwrap();
        assert_eq!(tile[(0, 0, 0)], 2.0);
    }

    #[test]
    fn rejects_band_count_mismatch() {
        let mut tile = Array3::<f32>::zeros((3, 2, 2));
        assert!(normalize_tile(&mut tile, &[0.0; 2], &[1.0; 2]).is_err());
        assert!(normalize_tile(&mut tile, &[0.0; 3], &[1.0; 2]).is_err());
    }

    #[test]
    fn rejects_zero_std() {
        let mut tile = Array3::<f32>::zeros((1, 2, 2));
        assert!(normalize_tile(&mut tile, &[0.0], &[0.0]).is_err());
    }
}

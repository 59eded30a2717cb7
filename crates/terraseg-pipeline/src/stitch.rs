//! Reassembly of per-tile predictions into a full-image label mask

use ndarray::{s, Array2, ArrayView3};
use terraseg_core::{Error, Result};

use crate::grid::TileGrid;

/// Collapse per-class logits `(classes, h, w)` to a label tile by arg-max
/// over the class axis. Ties resolve to the lowest class index.
pub fn argmax_labels(logits: ArrayView3<'_, f32>) -> Result<Array2<u8>> {
    let (classes, h, w) = logits.dim();
    if classes == 0 || classes > u8::MAX as usize + 1 {
        return Err(Error::model(format!(
            "unsupported class count {} in model output",
            classes
        )));
    }

    let mut labels = Array2::<u8>::zeros((h, w));
    for r in 0..h {
        for c in 0..w {
            let mut best = 0usize;
            let mut best_score = logits[(0, r, c)];
            for k in 1..classes {
                let score = logits[(k, r, c)];
                if score > best_score {
                    best = k;
                    best_score = score;
                }
            }
            labels[(r, c)] = best as u8;
        }
    }
    Ok(labels)
}

/// Stitch row-major label tiles back into the full `(height, width)` mask.
///
/// Every output pixel is written exactly once; tile count and tile shapes
/// must match the grid.
pub fn stitch(tiles: &[Array2<u8>], grid: &TileGrid) -> Result<Array2<u8>> {
    if tiles.len() != grid.len() {
        return Err(Error::tiling(format!(
            "expected {} label tiles for stitching, got {}",
            grid.len(),
            tiles.len()
        )));
    }

    let mut mask = Array2::<u8>::zeros((grid.height(), grid.width()));
    for (rect, tile) in grid.tiles().zip(tiles) {
        if tile.dim() != (rect.size, rect.size) {
            return Err(Error::tiling(format!(
                "label tile ({}, {}) has shape {:?}, expected {}x{}",
                rect.row,
                rect.col,
                tile.dim(),
                rect.size,
                rect.size
            )));
        }
        mask.slice_mut(s![rect.y..rect.y + rect.size, rect.x..rect.x + rect.size])
            .assign(tile);
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{extract_tiles, TileGrid};
    use ndarray::{Array2, Array3};

    #[test]
    fn argmax_picks_strongest_class() {
        let mut logits = Array3::<f32>::zeros((3, 2, 2));
        logits[(2, 0, 0)] = 1.0;
        logits[(1, 1, 1)] = 0.5;
        let labels = argmax_labels(logits.view()).unwrap();
        assert_eq!(labels[(0, 0)], 2);
        assert_eq!(labels[(1, 1)], 1);
        // Tie at (0, 1) resolves to class 0
        assert_eq!(labels[(0, 1)], 0);
    }

    #[test]
    fn argmax_rejects_empty_class_axis() {
        let logits = Array3::<f32>::zeros((0, 2, 2));
        assert!(argmax_labels(logits.view()).is_err());
    }

    #[test]
    fn stitch_inverts_extract() {
        let grid = TileGrid::new(6, 4, 2).unwrap();
        let mask = Array2::from_shape_fn((4, 6), |(r, c)| ((r * 6 + c) % 11) as u8);

        // Extract via the f32 path, convert each tile back to labels
        let bands = mask.mapv(|v| v as f32).insert_axis(ndarray::Axis(0));
        let tiles: Vec<Array2<u8>> = extract_tiles(bands.view(), &grid)
            .unwrap()
            .into_iter()
            .map(|t| t.index_axis_move(ndarray::Axis(0), 0).mapv(|v| v as u8))
            .collect();

        let stitched = stitch(&tiles, &grid).unwrap();
        assert_eq!(stitched, mask);
    }

    #[test]
    fn stitch_rejects_wrong_tile_count() {
        let grid = TileGrid::new(4, 4, 2).unwrap();
        let tiles = vec![Array2::<u8>::zeros((2, 2)); 3];
        assert!(stitch(&tiles, &grid).is_err());
    }

    #[test]
    fn stitch_rejects_wrong_tile_shape() {
        let grid = TileGrid::new(4, 4, 2).unwrap();
        let mut tiles = vec![Array2::<u8>::zeros((2, 2)); 4];
        tiles[2] = Array2::<u8>::zeros((3, 3));
        assert!(stitch(&tiles, &grid).is_err());
    }
}

//! Tile grid computation over a source raster

use ndarray::{s, Array3, ArrayView3};
use terraseg_core::{Error, Result};

/// Placement of a single tile within the source raster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRect {
    /// Tile row index in the grid
    pub row: usize,
    /// Tile column index in the grid
    pub col: usize,
    /// Pixel y offset of the tile's top edge
    pub y: usize,
    /// Pixel x offset of the tile's left edge
    pub x: usize,
    /// Tile side length in pixels
    pub size: usize,
}

/// A regular, non-overlapping grid of fixed-size tiles covering a raster.
///
/// The grid only exists when both raster dimensions are at least one tile
/// and exact multiples of the tile size; anything else is a tiling error
/// that surfaces to the caller unchanged.
#[derive(Debug, Clone, Copy)]
pub struct TileGrid {
    width: usize,
    height: usize,
    tile_size: usize,
    rows: usize,
    cols: usize,
}

impl TileGrid {
    /// Build a grid for a `width` x `height` raster with square tiles
    pub fn new(width: usize, height: usize, tile_size: usize) -> Result<Self> {
        if tile_size == 0 {
            return Err(Error::tiling("tile size must be positive"));
        }
        if width < tile_size || height < tile_size {
            return Err(Error::tiling(format!(
                "image {}x{} is smaller than the tile size {}",
                width, height, tile_size
            )));
        }
        if width % tile_size != 0 || height % tile_size != 0 {
            return Err(Error::tiling(format!(
                "image {}x{} is not divisible by the tile size {}",
                width, height, tile_size
            )));
        }
        Ok(Self {
            width,
            height,
            tile_size,
            rows: height / tile_size,
            cols: width / tile_size,
        })
    }

    /// Source raster width in pixels
    pub fn width(&self) -> usize {
        self.width
    }

    /// Source raster height in pixels
    pub fn height(&self) -> usize {
        self.height
    }

    /// Tile side length in pixels
    pub fn tile_size(&self) -> usize {
        self.tile_size
    }

    /// Number of tile rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of tile columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total number of tiles
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    /// True when the grid holds no tiles (never, per construction)
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterate tile placements in row-major order
    pub fn tiles(&self) -> impl Iterator<Item = TileRect> + '_ {
        let (cols, size) = (self.cols, self.tile_size);
        (0..self.len()).map(move |i| {
            let row = i / cols;
            let col = i % cols;
            TileRect {
                row,
                col,
                y: row * size,
                x: col * size,
                size,
            }
        })
    }
}

/// Extract every tile of the grid from a band-major `(bands, height, width)`
/// array, in row-major tile order.
pub fn extract_tiles(bands: ArrayView3<'_, f32>, grid: &TileGrid) -> Result<Vec<Array3<f32>>> {
    let (_, h, w) = bands.dim();
    if h != grid.height() || w != grid.width() {
        return Err(Error::tiling(format!(
            "band array {}x{} does not match grid {}x{}",
            w,
            h,
            grid.width(),
            grid.height()
        )));
    }
    let tiles = grid
        .tiles()
        .map(|t| {
            bands
                .slice(s![.., t.y..t.y + t.size, t.x..t.x + t.size])
                .to_owned()
        })
        .collect();
    Ok(tiles)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn grid_counts_tiles() {
        let grid = TileGrid::new(500, 750, 250).unwrap();
        assert_eq!(grid.cols(), 2);
        assert_eq!(grid.rows(), 3);
        assert_eq!(grid.len(), 6);

        let rects: Vec<_> = grid.tiles().collect();
        assert_eq!(rects.len(), 6);
        assert_eq!(rects[0], TileRect { row: 0, col: 0, y: 0, x: 0, size: 250 });
        // Row-major: second tile moves along x
        assert_eq!(rects[1].x, 250);
        assert_eq!(rects[1].y, 0);
        assert_eq!(rects[5], TileRect { row: 2, col: 1, y: 500, x: 250, size: 250 });
    }

    #[test]
    fn grid_rejects_indivisible_dimensions() {
        let err = TileGrid::new(300, 250, 250).unwrap_err();
        assert!(matches!(err, terraseg_core::Error::Tiling(_)));
        assert!(err.is_client_error());
    }

    #[test]
    fn grid_rejects_small_images() {
        assert!(TileGrid::new(100, 500, 250).is_err());
        assert!(TileGrid::new(500, 100, 250).is_err());
        assert!(TileGrid::new(0, 0, 250).is_err());
    }

    #[test]
    fn extract_yields_tile_contents() {
        let grid = TileGrid::new(4, 2, 2).unwrap();
        let bands =
            Array3::from_shape_fn((1, 2, 4), |(_, r, c)| (r * 4 + c) as f32);
        let tiles = extract_tiles(bands.view(), &grid).unwrap();
        assert_eq!(tiles.len(), 2);
        assert_eq!(tiles[0][(0, 0, 0)], 0.0);
        assert_eq!(tiles[1][(0, 0, 0)], 2.0);
        assert_eq!(tiles[1][(0, 1, 1)], 7.0);
    }

    #[test]
    fn extract_rejects_shape_mismatch() {
        let grid = TileGrid::new(4, 4, 2).unwrap();
        let bands = Array3::<f32>::zeros((1, 2, 4));
        assert!(extract_tiles(bands.view(), &grid).is_err());
    }
}

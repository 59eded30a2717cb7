//! Core raster types for TerraSeg

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Affine pixel-to-CRS mapping in the six-parameter form.
///
/// The origin is the top-left corner of the top-left pixel, so whole-number
/// pixel coordinates address pixel corners. Rotation terms are carried for
/// completeness but are zero for all imagery we serve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X size of a pixel in CRS units
    pub pixel_width: f64,
    /// Row rotation (zero for north-up imagery)
    pub row_rotation: f64,
    /// Column rotation (zero for north-up imagery)
    pub col_rotation: f64,
    /// Y size of a pixel in CRS units (negative for north-up imagery)
    pub pixel_height: f64,
    /// X coordinate of the top-left corner of the top-left pixel
    pub origin_x: f64,
    /// Y coordinate of the top-left corner of the top-left pixel
    pub origin_y: f64,
}

impl GeoTransform {
    /// Create a north-up transform with no rotation
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            pixel_width,
            row_rotation: 0.0,
            col_rotation: 0.0,
            pixel_height,
            origin_x,
            origin_y,
        }
    }

    /// Identity transform: pixel indices are the coordinates
    pub fn identity() -> Self {
        Self::north_up(0.0, 0.0, 1.0, -1.0)
    }

    /// Map fractional pixel coordinates to CRS coordinates.
    ///
    /// Whole-number `col`/`row` values address pixel corners, which is what
    /// the vectorizer needs for ring vertices.
    pub fn pixel_to_coords(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Metadata describing a source raster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMeta {
    /// Source image identifier (path or object key)
    pub image_id: String,

    /// Width in pixels
    pub width: usize,

    /// Height in pixels
    pub height: usize,

    /// Number of spectral bands
    pub n_bands: usize,

    /// Coordinate reference system code, e.g. "EPSG:3035"
    pub crs: String,

    /// Pixel-to-CRS affine transform
    pub transform: GeoTransform,
}

impl RasterMeta {
    /// Create metadata with an identity transform and unspecified CRS
    pub fn new(image_id: impl Into<String>, width: usize, height: usize, n_bands: usize) -> Self {
        Self {
            image_id: image_id.into(),
            width,
            height,
            n_bands,
            crs: String::new(),
            transform: GeoTransform::identity(),
        }
    }

    /// Set the CRS code
    pub fn with_crs(mut self, crs: impl Into<String>) -> Self {
        self.crs = crs.into();
        self
    }

    /// Set the geotransform
    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }
}

/// A predicted per-pixel label mask together with its source metadata.
///
/// `labels` is indexed `[row, col]` and matches the source raster dimensions.
#[derive(Debug, Clone)]
pub struct LabeledRaster {
    /// Source raster metadata
    pub meta: RasterMeta,

    /// Per-pixel class labels, shape `(height, width)`
    pub labels: Array2<u8>,
}

impl LabeledRaster {
    /// Create a labeled raster, checking the mask shape against the metadata
    pub fn new(meta: RasterMeta, labels: Array2<u8>) -> crate::Result<Self> {
        let (rows, cols) = labels.dim();
        if rows != meta.height || cols != meta.width {
            return Err(crate::Error::internal(format!(
                "label mask shape {}x{} does not match raster {}x{}",
                rows, cols, meta.height, meta.width
            )));
        }
        Ok(Self { meta, labels })
    }

    /// Labels as nested rows for JSON responses
    pub fn to_nested(&self) -> Vec<Vec<u8>> {
        self.labels
            .rows()
            .into_iter()
            .map(|row| row.to_vec())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    #[test]
    fn transform_maps_origin() {
        let t = GeoTransform::north_up(100.0, 200.0, 10.0, -10.0);
        assert_eq!(t.pixel_to_coords(0.0, 0.0), (100.0, 200.0));
        assert_eq!(t.pixel_to_coords(2.0, 3.0), (120.0, 170.0));
    }

    #[test]
    fn labeled_raster_rejects_shape_mismatch() {
        let meta = RasterMeta::new("img", 4, 4, 3);
        let labels = Array2::<u8>::zeros((2, 2));
        assert!(LabeledRaster::new(meta, labels).is_err());
    }

    #[test]
    fn nested_rows_match_layout() {
        let meta = RasterMeta::new("img", 2, 2, 1);
        let labels = Array2::from_shape_vec((2, 2), vec![1u8, 2, 3, 4]).unwrap();
        let lsi = LabeledRaster::new(meta, labels).unwrap();
        assert_eq!(lsi.to_nested(), vec![vec![1, 2], vec![3, 4]]);
    }
}

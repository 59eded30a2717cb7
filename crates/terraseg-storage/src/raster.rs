//! Raster loading: image bytes from the object store into band-major arrays.
//!
//! Format parsing is delegated to the `image` crate; georeferencing comes
//! from an ESRI world-file sidecar when present and falls back to the
//! identity transform. Full CRS machinery stays outside this service.

use std::sync::Arc;

use image::DynamicImage;
use ndarray::Array3;
use nshare::AsNdarray3;
use terraseg_core::{Error, GeoTransform, RasterMeta, Result};
use tracing::debug;

use crate::store::ObjectStore;

/// A decoded raster: band-major pixel data plus metadata
#[derive(Debug, Clone)]
pub struct LoadedRaster {
    /// Raster metadata (dimensions, CRS, transform)
    pub meta: RasterMeta,

    /// Pixel data, shape `(bands, height, width)`
    pub bands: Array3<f32>,
}

/// Reads rasters out of an object store
#[derive(Clone)]
pub struct RasterReader {
    store: Arc<dyn ObjectStore>,
    crs: String,
}

impl RasterReader {
    /// Create a reader; `crs` is the CRS code stamped on loaded metadata
    pub fn new(store: Arc<dyn ObjectStore>, crs: impl Into<String>) -> Self {
        Self {
            store,
            crs: crs.into(),
        }
    }

    /// Load an image by id and convert it to `n_bands` band-major f32 data
    pub fn read(&self, image_id: &str, n_bands: usize) -> Result<LoadedRaster> {
        let bytes = self.store.get(image_id)?;
        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| Error::raster(format!("cannot decode '{}': {}", image_id, e)))?;

        let bands = to_bands(&decoded, n_bands, image_id)?;
        let (_, height, width) = bands.dim();

        let transform = self.read_world_file(image_id)?;
        let meta = RasterMeta::new(image_id, width, height, n_bands)
            .with_crs(self.crs.clone())
            .with_transform(transform);

        debug!(
            image = image_id,
            width, height, n_bands, "loaded raster from store"
        );
        Ok(LoadedRaster { meta, bands })
    }

    /// Read only the metadata of an image, without decoding pixel data.
    ///
    /// Used on cache hits, where the labels come from the cache but the
    /// dimensions and georeferencing still come from the source image.
    pub fn read_meta(&self, image_id: &str, n_bands: usize) -> Result<RasterMeta> {
        let bytes = self.store.get(image_id)?;
        let (width, height) = image::ImageReader::new(std::io::Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| Error::raster(format!("cannot probe '{}': {}", image_id, e)))?
            .into_dimensions()
            .map_err(|e| Error::raster(format!("cannot probe '{}': {}", image_id, e)))?;

        let transform = self.read_world_file(image_id)?;
        Ok(RasterMeta::new(image_id, width as usize, height as usize, n_bands)
            .with_crs(self.crs.clone())
            .with_transform(transform))
    }

    /// Parse the world-file sidecar next to the image, if any
    fn read_world_file(&self, image_id: &str) -> Result<GeoTransform> {
        let sidecar = match image_id.rsplit_once('.') {
            Some((stem, _)) => format!("{stem}.wld"),
            None => format!("{image_id}.wld"),
        };
        if !self.store.exists(&sidecar)? {
            return Ok(GeoTransform::identity());
        }

        let text = String::from_utf8(self.store.get(&sidecar)?)
            .map_err(|_| Error::raster(format!("world file '{}' is not UTF-8", sidecar)))?;
        parse_world_file(&text)
            .ok_or_else(|| Error::raster(format!("world file '{}' is malformed", sidecar)))
    }
}

/// Parse the six world-file lines. World files reference the center of the
/// top-left pixel; the returned transform is corner-based.
fn parse_world_file(text: &str) -> Option<GeoTransform> {
    let values: Vec<f64> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(|l| l.parse().ok())
        .collect::<Option<Vec<f64>>>()?;
    if values.len() != 6 {
        return None;
    }
    let [pixel_width, col_rotation, row_rotation, pixel_height, center_x, center_y] =
        values[..6].try_into().ok()?;
    Some(GeoTransform {
        pixel_width,
        row_rotation,
        col_rotation,
        pixel_height,
        origin_x: center_x - 0.5 * (pixel_width + row_rotation),
        origin_y: center_y - 0.5 * (col_rotation + pixel_height),
    })
}

/// Convert a decoded image to `(n_bands, h, w)` f32 data
fn to_bands(decoded: &DynamicImage, n_bands: usize, image_id: &str) -> Result<Array3<f32>> {
    match n_bands {
        1 => {
            let gray = decoded.to_luma8();
            let (width, height) = gray.dimensions();
            let data: Vec<f32> = gray.into_raw().into_iter().map(f32::from).collect();
            Array3::from_shape_vec((1, height as usize, width as usize), data)
                .map_err(|e| Error::raster(format!("band layout error for '{}': {}", image_id, e)))
        }
        3 => {
            let rgb = decoded.to_rgb8();
            Ok(rgb.as_ndarray3().mapv(f32::from))
        }
        other => Err(Error::raster(format!(
            "{} bands requested for '{}', the raster decoder supports 1 or 3",
            other, image_id
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn store_with_png(width: u32, height: u32) -> (TempDir, Arc<FsStore>) {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(FsStore::new(dir.path()).unwrap());

        let mut img = RgbImage::new(width, height);
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            *pixel = Rgb([x as u8, y as u8, 200]);
        }
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageFormat::Png).unwrap();
        store.put("patch/img.png", &bytes.into_inner()).unwrap();
        (dir, store)
    }

    #[test]
    fn reads_rgb_raster_band_major() {
        let (_dir, store) = store_with_png(4, 2);
        let reader = RasterReader::new(store, "EPSG:3035");

        let raster = reader.read("patch/img.png", 3).unwrap();
        assert_eq!(raster.bands.dim(), (3, 2, 4));
        assert_eq!(raster.meta.width, 4);
        assert_eq!(raster.meta.height, 2);
        assert_eq!(raster.meta.crs, "EPSG:3035");
        // Band 0 carries the x coordinate, band 2 the constant
        assert_eq!(raster.bands[(0, 0, 3)], 3.0);
        assert_eq!(raster.bands[(2, 1, 1)], 200.0);
    }

    #[test]
    fn identity_transform_without_world_file() {
        let (_dir, store) = store_with_png(2, 2);
        let reader = RasterReader::new(store, "EPSG:3035");
        let raster = reader.read("patch/img.png", 3).unwrap();
        assert_eq!(raster.meta.transform, GeoTransform::identity());
    }

    #[test]
    fn world_file_shifts_origin_to_pixel_corner() {
        let (_dir, store) = store_with_png(2, 2);
        store
            .put("patch/img.wld", b"10.0\n0.0\n0.0\n-10.0\n1005.0\n1995.0\n")
            .unwrap();

        let reader = RasterReader::new(store, "EPSG:3035");
        let raster = reader.read("patch/img.png", 3).unwrap();
        assert_eq!(raster.meta.transform.origin_x, 1000.0);
        assert_eq!(raster.meta.transform.origin_y, 2000.0);
        assert_eq!(raster.meta.transform.pixel_width, 10.0);
    }

    #[test]
    fn world_file_corner_shift_includes_rotation_terms() {
        let (_dir, store) = store_with_png(2, 2);
        // A=10, D=1, B=2, E=-10: the center of pixel (0, 0) sits at
        // corner + 0.5*(A+B) in x and corner + 0.5*(D+E) in y
        store
            .put("patch/img.wld", b"10.0\n1.0\n2.0\n-10.0\n1006.0\n1995.5\n")
            .unwrap();

        let reader = RasterReader::new(store, "EPSG:3035");
        let raster = reader.read("patch/img.png", 3).unwrap();
        assert_eq!(raster.meta.transform.origin_x, 1000.0);
        assert_eq!(raster.meta.transform.origin_y, 2000.0);
        assert_eq!(raster.meta.transform.row_rotation, 2.0);
        assert_eq!(raster.meta.transform.col_rotation, 1.0);
    }

    #[test]
    fn read_meta_skips_pixel_decoding_but_keeps_georeferencing() {
        let (_dir, store) = store_with_png(6, 3);
        store
            .put("patch/img.wld", b"2.0\n0.0\n0.0\n-2.0\n101.0\n199.0\n")
            .unwrap();

        let reader = RasterReader::new(store, "EPSG:3035");
        let meta = reader.read_meta("patch/img.png", 3).unwrap();
        assert_eq!((meta.width, meta.height), (6, 3));
        assert_eq!(meta.transform.origin_x, 100.0);
        assert_eq!(meta.transform.origin_y, 200.0);
    }

    #[test]
    fn unsupported_band_count_is_a_raster_error() {
        let (_dir, store) = store_with_png(2, 2);
        let reader = RasterReader::new(store, "EPSG:3035");
        let err = reader.read("patch/img.png", 4).unwrap_err();
        assert!(matches!(err, Error::Raster(_)));
    }

    #[test]
    fn missing_image_is_a_storage_error() {
        let dir = TempDir::new().unwrap();
        let store: Arc<FsStore> = Arc::new(FsStore::new(dir.path()).unwrap());
        let reader = RasterReader::new(store, "EPSG:3035");
        assert!(matches!(
            reader.read("nope.png", 3).unwrap_err(),
            Error::Storage(_)
        ));
    }
}

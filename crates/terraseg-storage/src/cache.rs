//! Content-addressed cache for predicted label arrays.
//!
//! Cache entries hold the raw model labels, before class-ID remapping, so a
//! remapping change never invalidates cached predictions. Entry existence is
//! the sole correctness check: no staleness tracking, versioning, or expiry.

use std::sync::Arc;

use ndarray::Array2;
use sha2::{Digest, Sha256};
use terraseg_core::{Error, Result};
use tracing::debug;

use crate::store::ObjectStore;

const MAGIC: &[u8; 4] = b"TSLB";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4 + 1 + 4 + 4;

/// Deterministic cache key for a source image identifier
pub fn cache_key(image_id: &str) -> String {
    let digest = Sha256::digest(image_id.as_bytes());
    format!("cache/{:x}.lab", digest)
}

/// Serialize a label mask: magic, version, width and height as LE u32,
/// then row-major labels.
pub fn encode_labels(labels: &Array2<u8>) -> Vec<u8> {
    let (height, width) = labels.dim();
    let mut out = Vec::with_capacity(HEADER_LEN + height * width);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&(width as u32).to_le_bytes());
    out.extend_from_slice(&(height as u32).to_le_bytes());
    for row in labels.rows() {
        out.extend(row.iter());
    }
    out
}

/// Deserialize a label mask, validating magic, version, and payload length
pub fn decode_labels(data: &[u8]) -> Result<Array2<u8>> {
    if data.len() < HEADER_LEN {
        return Err(Error::storage("cache entry truncated before header"));
    }
    if &data[0..4] != MAGIC {
        return Err(Error::storage("cache entry has wrong magic"));
    }
    if data[4] != VERSION {
        return Err(Error::storage(format!(
            "unsupported cache entry version {}",
            data[4]
        )));
    }
    let width = u32::from_le_bytes(data[5..9].try_into().expect("sliced to 4 bytes")) as usize;
    let height = u32::from_le_bytes(data[9..13].try_into().expect("sliced to 4 bytes")) as usize;

    let payload = &data[HEADER_LEN..];
    if payload.len() != width * height {
        return Err(Error::storage(format!(
            "cache entry payload is {} bytes, expected {} for {}x{}",
            payload.len(),
            width * height,
            width,
            height
        )));
    }
    Array2::from_shape_vec((height, width), payload.to_vec())
        .map_err(|e| Error::storage(format!("cache entry has invalid shape: {}", e)))
}

/// Cache of predicted label arrays on top of an object store
#[derive(Clone)]
pub struct LabelCache {
    store: Arc<dyn ObjectStore>,
}

impl LabelCache {
    /// Wrap an object store
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Whether a prediction for this image is cached
    pub fn contains(&self, image_id: &str) -> Result<bool> {
        self.store.exists(&cache_key(image_id))
    }

    /// Load the cached label mask for an image
    pub fn load(&self, image_id: &str) -> Result<Array2<u8>> {
        let key = cache_key(image_id);
        debug!(image = image_id, key = %key, "loading prediction from cache");
        decode_labels(&self.store.get(&key)?)
    }

    /// Store a predicted label mask for an image.
    ///
    /// Concurrent writers for the same image race benignly: both write the
    /// same deterministic content and the last write wins.
    pub fn save(&self, image_id: &str, labels: &Array2<u8>) -> Result<()> {
        let key = cache_key(image_id);
        debug!(image = image_id, key = %key, "caching prediction");
        self.store.put(&key, &encode_labels(labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsStore;
    use tempfile::TempDir;

    #[test]
    fn cache_key_is_deterministic_and_distinct() {
        let a = cache_key("s3/patchs/FR1/2021/img_001.tif");
        let b = cache_key("s3/patchs/FR1/2021/img_001.tif");
        let c = cache_key("s3/patchs/FR1/2021/img_002.tif");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with("cache/"));
        assert!(a.ends_with(".lab"));
    }

    #[test]
    fn codec_roundtrip() {
        let labels = Array2::from_shape_fn((5, 7), |(r, c)| ((r * 7 + c) % 13) as u8);
        let decoded = decode_labels(&encode_labels(&labels)).unwrap();
        assert_eq!(decoded, labels);
    }

    #[test]
    fn decode_rejects_corrupt_entries() {
        let labels = Array2::<u8>::zeros((2, 2));
        let mut data = encode_labels(&labels);

        assert!(decode_labels(&data[..3]).is_err());

        let mut wrong_magic = data.clone();
        wrong_magic[0] = b'X';
        assert!(decode_labels(&wrong_magic).is_err());

        let mut wrong_version = data.clone();
        wrong_version[4] = 99;
        assert!(decode_labels(&wrong_version).is_err());

        data.pop();
        assert!(decode_labels(&data).is_err());
    }

    #[test]
    fn cache_load_returns_what_was_saved() {
        let dir = TempDir::new().unwrap();
        let cache = LabelCache::new(Arc::new(FsStore::new(dir.path()).unwrap()));

        let labels = Array2::from_shape_fn((3, 3), |(r, c)| (r * 3 + c) as u8);
        assert!(!cache.contains("img.tif").unwrap());
        cache.save("img.tif", &labels).unwrap();
        assert!(cache.contains("img.tif").unwrap());
        assert_eq!(cache.load("img.tif").unwrap(), labels);
    }
}

//! Tile rescaling between the training tile size and the model input size.
//!
//! Input tiles are augmented (bilinearly up-scaled) to the model's expected
//! square input, and predicted label tiles are brought back to the tile size
//! with nearest-neighbour sampling so class indices stay exact.

use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

/// Bilinearly resample a band-major `(bands, n, n)` tile to `(bands, out, out)`.
///
/// Uses half-pixel center alignment, the same convention as the image
/// resizers used at training time. Identity when sizes already match.
pub fn scale_to(tile: ArrayView3<'_, f32>, out_size: usize) -> Array3<f32> {
    let (bands, in_h, in_w) = tile.dim();
    if in_h == out_size && in_w == out_size {
        return tile.to_owned();
    }

    let scale_y = in_h as f32 / out_size as f32;
    let scale_x = in_w as f32 / out_size as f32;

    Array3::from_shape_fn((bands, out_size, out_size), |(b, oy, ox)| {
        let sy = ((oy as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (in_h - 1) as f32);
        let sx = ((ox as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (in_w - 1) as f32);

        let y0 = sy.floor() as usize;
        let x0 = sx.floor() as usize;
        let y1 = (y0 + 1).min(in_h - 1);
        let x1 = (x0 + 1).min(in_w - 1);
        let fy = sy - y0 as f32;
        let fx = sx - x0 as f32;

        let top = tile[(b, y0, x0)] * (1.0 - fx) + tile[(b, y0, x1)] * fx;
        let bottom = tile[(b, y1, x0)] * (1.0 - fx) + tile[(b, y1, x1)] * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

/// Resample a predicted `(n, n)` label tile to `(out, out)` with
/// nearest-neighbour sampling. Identity when sizes already match.
pub fn scale_labels_back(labels: ArrayView2<'_, u8>, out_size: usize) -> Array2<u8> {
    let (in_h, in_w) = labels.dim();
    if in_h == out_size && in_w == out_size {
        return labels.to_owned();
    }

    let scale_y = in_h as f32 / out_size as f32;
    let scale_x = in_w as f32 / out_size as f32;

    Array2::from_shape_fn((out_size, out_size), |(oy, ox)| {
        let sy = (((oy as f32 + 0.5) * scale_y - 0.5).round() as isize)
            .clamp(0, in_h as isize - 1) as usize;
        let sx = (((ox as f32 + 0.5) * scale_x - 0.5).round() as isize)
            .clamp(0, in_w as isize - 1) as usize;
        labels[(sy, sx)]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn identity_when_sizes_match() {
        let tile = Array3::from_shape_fn((2, 4, 4), |(b, r, c)| (b + r + c) as f32);
        assert_eq!(scale_to(tile.view(), 4), tile);

        let labels = Array2::from_shape_fn((4, 4), |(r, c)| (r + c) as u8);
        assert_eq!(scale_labels_back(labels.view(), 4), labels);
    }

    #[test]
    fn upscale_preserves_constant_tiles() {
        let tile = Array3::from_elem((3, 2, 2), 5.0);
        let up = scale_to(tile.view(), 8);
        assert_eq!(up.dim(), (3, 8, 8));
        assert!(up.iter().all(|v| (*v - 5.0).abs() < 1e-6));
    }

    #[test]
    fn upscale_interpolates_between_pixels() {
        let mut tile = Array3::zeros((1, 1, 2));
        tile[(0, 0, 1)] = 10.0;
        let up = scale_to(tile.view(), 4);
        // Values must be monotonically non-decreasing along x and bounded
        for x in 1..4 {
            assert!(up[(0, 0, x)] >= up[(0, 0, x - 1)]);
        }
        assert!(up[(0, 0, 0)] >= 0.0 && up[(0, 0, 3)] <= 10.0);
    }

    #[test]
    fn label_downscale_keeps_exact_classes() {
        // 4x4 quadrant mask scaled to 2x2 keeps one pixel per quadrant
        let labels = Array2::from_shape_fn((4, 4), |(r, c)| match (r / 2, c / 2) {
            (0, 0) => 1u8,
            (0, 1) => 2,
            (1, 0) => 3,
            _ => 4,
        });
        let down = scale_labels_back(labels.view(), 2);
        assert_eq!(down, Array2::from_shape_vec((2, 2), vec![1, 2, 3, 4]).unwrap());
    }

    #[test]
    fn roundtrip_constant_labels() {
        let labels = Array2::from_elem((3, 3), 7u8);
        let up = scale_labels_back(labels.view(), 9);
        let down = scale_labels_back(up.view(), 3);
        assert_eq!(down, labels);
    }
}

//! Raster image decoding.

#![allow(clippy::cast_precision_loss)]

use std::path::Path;

use image::{DynamicImage, GenericImageView};
use nalgebra::Vector2;

use super::{AlphaState, RawElevation};
use crate::error::{Result, TerrainError};
use crate::grid::{is_valid_side, ElevationGrid};

/// Decode a raster image file into elevation samples in `[0, 1]`.
///
/// # Errors
///
/// Returns `Decode` if the file cannot be read, `NotSquareImage` or
/// `InvalidSize` if its dimensions are unusable.
pub fn decode_image(path: &Path) -> Result<RawElevation> {
    let img = image::open(path).map_err(|e| TerrainError::decode(path, e.to_string()))?;
    elevation_from_image(&img)
}

/// Convert a decoded image into elevation samples in `[0, 1]`.
///
/// Color images use their luminance. One pixel is one unit of sample spacing.
///
/// # Errors
///
/// Returns `NotSquareImage` or `InvalidSize` if the dimensions are unusable.
pub fn elevation_from_image(img: &DynamicImage) -> Result<RawElevation> {
    let (width, height) = img.dimensions();
    let (width, height) = (width as usize, height as usize);
    if width != height {
        return Err(TerrainError::NotSquareImage { width, height });
    }
    if !is_valid_side(width) {
        return Err(TerrainError::InvalidSize { width, height });
    }

    let alpha = classify_alpha(img);
    let max = f64::from(u16::MAX);
    let samples = img
        .to_luma16()
        .pixels()
        .map(|p| f64::from(p.0[0]) / max)
        .collect();
    let grid = ElevationGrid::new(samples, width, height, Vector2::new(1.0, 1.0))?;
    Ok(RawElevation::from_image_grid(grid, alpha))
}

fn classify_alpha(img: &DynamicImage) -> AlphaState {
    if !img.color().has_alpha() {
        return AlphaState::Absent;
    }
    if img.to_luma_alpha16().pixels().all(|p| p.0[1] == u16::MAX) {
        AlphaState::Opaque
    } else {
        AlphaState::Partial
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgba, RgbaImage};

    #[test]
    fn test_white_gray_is_one() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(5, 5, Luma([255])));
        let raw = elevation_from_image(&img).unwrap();
        assert_eq!(raw.grid.side(), 5);
        assert!(raw.grid.samples().iter().all(|&h| h == 1.0));
        assert_eq!(raw.alpha, Some(AlphaState::Absent));
        assert_eq!((raw.source_min, raw.source_max), (0.0, 1.0));
    }

    #[test]
    fn test_alpha_does_not_change_heights() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([255, 255, 255, 255]));
        img.put_pixel(1, 1, Rgba([255, 255, 255, 0]));
        let raw = elevation_from_image(&DynamicImage::ImageRgba8(img)).unwrap();
        assert_eq!(raw.alpha, Some(AlphaState::Partial));
        assert!(raw.grid.samples().iter().all(|&h| h == 1.0));
    }

    #[test]
    fn test_opaque_alpha() {
        let img = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 0, 255]));
        let raw = elevation_from_image(&DynamicImage::ImageRgba8(img)).unwrap();
        assert_eq!(raw.alpha, Some(AlphaState::Opaque));
        assert!(raw.grid.samples().iter().all(|&h| h == 0.0));
    }

    #[test]
    fn test_non_square_rejected() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(128, 64));
        assert_eq!(
            elevation_from_image(&img).unwrap_err(),
            TerrainError::NotSquareImage {
                width: 128,
                height: 64
            }
        );
    }

    #[test]
    fn test_power_of_two_side_rejected() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(128, 128));
        assert_eq!(
            elevation_from_image(&img).unwrap_err(),
            TerrainError::InvalidSize {
                width: 128,
                height: 128
            }
        );
    }

    #[test]
    fn test_top_row_is_row_zero() {
        let mut img = GrayImage::new(3, 3);
        img.put_pixel(2, 0, Luma([255]));
        let raw = elevation_from_image(&DynamicImage::ImageLuma8(img)).unwrap();
        assert_eq!(raw.grid.get(2, 0), Some(1.0));
        assert_eq!(raw.grid.get(2, 2), Some(0.0));
    }

    #[test]
    fn test_unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.png");
        std::fs::write(&path, b"not a png").unwrap();
        assert!(matches!(
            decode_image(&path).unwrap_err(),
            TerrainError::Decode { .. }
        ));
    }
}

//! Wide composite rasters: the horizontally tiled strips of one curve.

use std::path::Path;

use image::RgbImage;

use curvetrace_core::{Error, Result, StripGeometry};

/// An RGB raster validated against a strip geometry.
#[derive(Debug)]
pub struct WideImage {
    pixels: RgbImage,
    geometry: StripGeometry,
}

impl WideImage {
    /// Load from disk and validate the dimensions.
    pub fn open(path: &Path, geometry: StripGeometry) -> Result<Self> {
        let pixels = image::open(path)
            .map_err(|e| Error::Image(format!("{}: {e}", path.display())))?
            .to_rgb8();
        Self::new(pixels, geometry)
    }

    /// Wrap an in-memory raster, failing unless it is exactly
    /// `strip_width * num_strips` by `strip_height` pixels.
    pub fn new(pixels: RgbImage, geometry: StripGeometry) -> Result<Self> {
        let expected_w = geometry.wide_width();
        let expected_h = geometry.strip_height;
        if pixels.width() != expected_w || pixels.height() != expected_h {
            return Err(Error::ShapeMismatch {
                expected_w,
                expected_h,
                actual_w: pixels.width(),
                actual_h: pixels.height(),
            });
        }
        Ok(Self { pixels, geometry })
    }

    pub fn geometry(&self) -> StripGeometry {
        self.geometry
    }

    pub fn pixels(&self) -> &RgbImage {
        &self.pixels
    }

    /// Crop of strip `index`, `strip_width` by `strip_height` pixels.
    pub fn crop_strip(&self, index: usize) -> RgbImage {
        let (x0, _) = self.geometry.pixel_bounds(index);
        image::imageops::crop_imm(
            &self.pixels,
            x0,
            0,
            self.geometry.strip_width,
            self.geometry.strip_height,
        )
        .to_image()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_dimension_validation() {
        let geometry = StripGeometry::new(8, 8, 3);
        let good = RgbImage::new(24, 8);
        assert!(WideImage::new(good, geometry).is_ok());

        let bad = RgbImage::new(25, 8);
        let err = WideImage::new(bad, geometry).unwrap_err();
        assert!(err.to_string().contains("expected 24x8"));
    }

    #[test]
    fn test_crop_strip_extracts_own_columns() {
        let geometry = StripGeometry::new(4, 2, 3);
        let mut pixels = RgbImage::new(12, 2);
        for x in 0..12 {
            for y in 0..2 {
                // Encode the strip index into the red channel.
                pixels.put_pixel(x, y, Rgb([(x / 4) as u8, 0, 0]));
            }
        }
        let wide = WideImage::new(pixels, geometry).unwrap();
        for index in 0..3 {
            let crop = wide.crop_strip(index);
            assert_eq!(crop.dimensions(), (4, 2));
            for pixel in crop.pixels() {
                assert_eq!(pixel[0], index as u8);
            }
        }
    }
}

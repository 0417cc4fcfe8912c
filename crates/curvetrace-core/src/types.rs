//! Fundamental types shared across the curvetrace crates.

use serde::{Deserialize, Serialize};

/// A single curve sample with both axes normalized to `[0, 1]`.
///
/// Depending on context the x axis spans either the full wide raster
/// (global coordinates) or a single strip (strip-local coordinates); the
/// y axis always spans the raster height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    #[serde(rename = "X")]
    pub x: f32,
    #[serde(rename = "Y")]
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Linear interpolation between two points at parameter `t`.
    pub fn lerp(a: Point, b: Point, t: f32) -> Point {
        Point {
            x: a.x + (b.x - a.x) * t,
            y: a.y + (b.y - a.y) * t,
        }
    }
}

/// Tiling of a wide raster into equal-width vertical strips.
///
/// A wide raster is `strip_width * num_strips` pixels across and
/// `strip_height` pixels tall. Strip `i` owns the normalized x interval
/// `[i/N, (i+1)/N)`; the final strip is closed on the right so `x = 1.0`
/// belongs to exactly one strip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StripGeometry {
    pub strip_width: u32,
    pub strip_height: u32,
    pub num_strips: usize,
}

impl Default for StripGeometry {
    fn default() -> Self {
        Self {
            strip_width: 224,
            strip_height: 224,
            num_strips: 3,
        }
    }
}

impl StripGeometry {
    pub fn new(strip_width: u32, strip_height: u32, num_strips: usize) -> Self {
        Self {
            strip_width,
            strip_height,
            num_strips,
        }
    }

    /// Width of the full wide raster in pixels.
    pub fn wide_width(&self) -> u32 {
        self.strip_width * self.num_strips as u32
    }

    /// Normalized x interval covered by strip `index`.
    pub fn x_bounds(&self, index: usize) -> (f32, f32) {
        let n = self.num_strips as f32;
        (index as f32 / n, (index + 1) as f32 / n)
    }

    /// Whether strip `index` owns global coordinate `x`.
    ///
    /// Ownership is exact comparison against the computed bounds, so a
    /// point sitting on an interval boundary that is not exactly
    /// representable in f32 may land one strip over.
    pub fn contains_x(&self, index: usize, x: f32) -> bool {
        let (lo, hi) = self.x_bounds(index);
        if index + 1 == self.num_strips {
            x >= lo && x <= hi
        } else {
            x >= lo && x < hi
        }
    }

    /// Pixel x range `[start, end)` of strip `index` in the wide raster.
    pub fn pixel_bounds(&self, index: usize) -> (u32, u32) {
        let start = index as u32 * self.strip_width;
        (start, start + self.strip_width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_point_lerp() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(1.0, 2.0);
        let mid = Point::lerp(a, b, 0.5);
        assert_relative_eq!(mid.x, 0.5);
        assert_relative_eq!(mid.y, 1.0);
        assert_eq!(Point::lerp(a, b, 0.0), a);
        assert_eq!(Point::lerp(a, b, 1.0), b);
    }

    #[test]
    fn test_wide_width() {
        let geometry = StripGeometry::new(224, 224, 3);
        assert_eq!(geometry.wide_width(), 672);
        assert_eq!(geometry.strip_height, 224);
    }

    #[test]
    fn test_x_bounds() {
        let geometry = StripGeometry::new(224, 224, 4);
        let (lo, hi) = geometry.x_bounds(1);
        assert_relative_eq!(lo, 0.25);
        assert_relative_eq!(hi, 0.5);
    }

    #[test]
    fn test_each_x_owned_by_exactly_one_strip() {
        let geometry = StripGeometry::new(224, 224, 3);
        for k in 0..=100 {
            let x = k as f32 / 100.0;
            let owners = (0..geometry.num_strips)
                .filter(|&i| geometry.contains_x(i, x))
                .count();
            assert_eq!(owners, 1, "x = {x} owned by {owners} strips");
        }
    }

    #[test]
    fn test_last_strip_closed_on_right() {
        let geometry = StripGeometry::new(224, 224, 3);
        assert!(geometry.contains_x(2, 1.0));
        assert!(!geometry.contains_x(1, 1.0));
        // Interior boundaries belong to the strip on the right.
        assert!(geometry.contains_x(1, 1.0 / 3.0));
        assert!(!geometry.contains_x(0, 1.0 / 3.0));
    }

    #[test]
    fn test_pixel_bounds() {
        let geometry = StripGeometry::new(224, 224, 3);
        assert_eq!(geometry.pixel_bounds(0), (0, 224));
        assert_eq!(geometry.pixel_bounds(2), (448, 672));
    }
}

//! Strip sampling: fixed-length strip-local point sequences from a wide
//! image and its full-resolution coordinate table.

use image::RgbImage;

use curvetrace_core::{Error, Point, Result, StripGeometry};

use crate::table::CoordinateTable;
use crate::wide::WideImage;

/// Fill y value for strips whose x interval holds fewer than two points.
const SPARSE_FILL_Y: f32 = 0.5;

/// Resamples each vertical strip of a wide image to a fixed-length point
/// sequence in strip-local coordinates.
///
/// For strip `i` of `N`: points with global x in `[i/N, (i+1)/N)` are
/// selected (the final strip closes the interval so `x = 1.0` is assigned
/// exactly once), resampled to exactly `points_per_strip` entries, then
/// renormalized so the strip's own x range spans `[0, 1]`. The output
/// length never varies with curve density.
pub struct StripSampler {
    geometry: StripGeometry,
    points_per_strip: usize,
}

impl StripSampler {
    pub fn new(geometry: StripGeometry, points_per_strip: usize) -> Self {
        Self {
            geometry,
            points_per_strip,
        }
    }

    pub fn geometry(&self) -> StripGeometry {
        self.geometry
    }

    pub fn points_per_strip(&self) -> usize {
        self.points_per_strip
    }

    /// Crop strip `index` and resample its points.
    ///
    /// Fails when the image was validated against a different geometry
    /// than this sampler's, so a stale sampler cannot crop out of frame.
    pub fn sample(
        &self,
        image: &WideImage,
        table: &CoordinateTable,
        index: usize,
    ) -> Result<(RgbImage, Vec<Point>)> {
        if image.geometry() != self.geometry {
            return Err(Error::ShapeMismatch {
                expected_w: self.geometry.wide_width(),
                expected_h: self.geometry.strip_height,
                actual_w: image.geometry().wide_width(),
                actual_h: image.geometry().strip_height,
            });
        }
        let crop = image.crop_strip(index);
        let points = self.sample_points(table, index);
        Ok((crop, points))
    }

    /// Resample the points of strip `index` without touching pixels.
    ///
    /// Always returns exactly `points_per_strip` strip-local points. A
    /// strip holding fewer than two source points degenerates to a
    /// constant sequence at the strip's left edge, y centered.
    pub fn sample_points(&self, table: &CoordinateTable, index: usize) -> Vec<Point> {
        let (x_min, _) = self.geometry.x_bounds(index);
        let selected: Vec<Point> = table
            .points()
            .iter()
            .copied()
            .filter(|p| self.geometry.contains_x(index, p.x))
            .collect();
        let resampled = resample(&selected, self.points_per_strip, x_min);
        let n = self.geometry.num_strips as f32;
        resampled
            .into_iter()
            .map(|p| Point::new((p.x - x_min) * n, p.y))
            .collect()
    }
}

/// Resample `points` to exactly `target` entries, still in global x.
fn resample(points: &[Point], target: usize, x_min: f32) -> Vec<Point> {
    match points.len() {
        0 | 1 => vec![Point::new(x_min, SPARSE_FILL_Y); target],
        n if n >= target => downsample_indices(n, target)
            .into_iter()
            .map(|i| points[i])
            .collect(),
        _ => interpolate(points, target),
    }
}

/// Evenly spaced indices over `[0, n-1]`, rounded to nearest.
///
/// Both endpoints are always kept; interior indices may repeat when `n`
/// barely exceeds `target`.
fn downsample_indices(n: usize, target: usize) -> Vec<usize> {
    if target == 1 {
        return vec![0];
    }
    let span = (n - 1) as f32;
    let denom = (target - 1) as f32;
    (0..target)
        .map(|k| ((k as f32 * span / denom).round() as usize).min(n - 1))
        .collect()
}

/// Linear interpolation over the virtual parameter axis `[0, n-1]`,
/// sampled at `target` evenly spaced positions.
fn interpolate(points: &[Point], target: usize) -> Vec<Point> {
    let n = points.len();
    if target == 1 {
        return vec![points[0]];
    }
    let span = (n - 1) as f32;
    let denom = (target - 1) as f32;
    (0..target)
        .map(|k| {
            let pos = k as f32 * span / denom;
            let lo = pos.floor() as usize;
            let hi = (lo + 1).min(n - 1);
            Point::lerp(points[lo], points[hi], pos - lo as f32)
        })
        .collect()
}

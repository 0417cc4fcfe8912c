//! Coordinate tables: per-image curve ground truth.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use curvetrace_core::{Error, Point, Result};

/// Ordered curve samples for one wide image.
///
/// Rows are sorted by x, and both columns are normalized to `[0, 1]` over
/// the full wide raster. The table length is the full-resolution point
/// count of the rendered curve, not the per-strip sequence length.
#[derive(Debug, Clone)]
pub struct CoordinateTable {
    points: Vec<Point>,
}

impl CoordinateTable {
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Parse a headered CSV file with `X` and `Y` columns.
    ///
    /// Extra columns are ignored; missing or non-numeric values fail.
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| Error::CoordinateTable(format!("{}: {e}", path.display())))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut points = Vec::new();
        for record in csv_reader.deserialize() {
            let point: Point = record.map_err(|e| Error::CoordinateTable(e.to_string()))?;
            points.push(point);
        }
        Ok(Self::new(points))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Fail unless the table holds exactly `expected` rows.
    pub fn expect_rows(&self, expected: usize) -> Result<()> {
        if self.points.len() != expected {
            return Err(Error::CoordinateTable(format!(
                "expected {expected} rows, got {}",
                self.points.len()
            )));
        }
        Ok(())
    }
}

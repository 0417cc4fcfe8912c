//! Explicit pairing of image files with coordinate tables.
//!
//! Pairing by bare directory-listing order silently trains on misaligned
//! data the moment one file is missing or renamed. The manifest keeps the
//! lexical sort as the pairing key but validates counts and file stems up
//! front, so a broken pairing fails before any sample is loaded.

use std::fs;
use std::path::{Path, PathBuf};

use curvetrace_core::{Error, Result};

/// One matched (image, coordinate table) pair.
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub image: PathBuf,
    pub coords: PathBuf,
}

/// Validated list of training pairs.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Scan `dir` for `*.png` / `*.csv` pairs matched by sorted order.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut images = list_with_extension(dir, "png")?;
        let mut coords = list_with_extension(dir, "csv")?;
        images.sort();
        coords.sort();
        Self::from_sorted(images, coords)
    }

    /// Build from pre-sorted file lists, validating counts and stems.
    pub fn from_sorted(images: Vec<PathBuf>, coords: Vec<PathBuf>) -> Result<Self> {
        if images.len() != coords.len() {
            return Err(Error::ManifestMismatch(format!(
                "{} images but {} coordinate files",
                images.len(),
                coords.len()
            )));
        }
        let mut entries = Vec::with_capacity(images.len());
        for (image, coords) in images.into_iter().zip(coords) {
            if file_stem(&image) != file_stem(&coords) {
                return Err(Error::ManifestMismatch(format!(
                    "pair mismatch: image '{}' vs coordinates '{}'",
                    image.display(),
                    coords.display()
                )));
            }
            entries.push(ManifestEntry { image, coords });
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ManifestEntry> {
        self.entries.get(index)
    }
}

fn list_with_extension(dir: &Path, ext: &str) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) == Some(ext) {
            out.push(path);
        }
    }
    Ok(out)
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

//! Image stores
//!
//! The turn loop loads its initial grid by name (`"<W>x<H>"`) and writes snapshots
//! as `"<W>x<H>x<turn>"`. Writes complete before `write` returns, so a snapshot is
//! on disk by the time `ImageOutputComplete` is reported.
//!
//! - `PgmStore`: binary PGM (P5) files, 255 = alive, 0 = dead
//! - `MemoryStore`: in-memory map, shared between clones
//! - `SeededStore`: random initial board, writes delegated to another store

use crate::grid::{cell_count, Grid};
use crate::Result;
use anyhow::{anyhow, bail, Context};
use log::debug;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub trait ImageStore: Send {
    fn read(&self, name: &str) -> Result<Grid>;
    fn write(&self, name: &str, grid: &Grid) -> Result<()>;
}

/// Name of the input image for a grid size
pub fn input_name(width: usize, height: usize) -> String {
    format!("{}x{}", width, height)
}

/// Name of a snapshot taken after `turn` turns
pub fn output_name(width: usize, height: usize, turn: usize) -> String {
    format!("{}x{}x{}", width, height, turn)
}

/// PGM files on disk
#[derive(Debug, Clone)]
pub struct PgmStore {
    input_dir: PathBuf,
    output_dir: PathBuf,
}

impl PgmStore {
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
        }
    }

    pub fn output_path(&self, name: &str) -> PathBuf {
        self.output_dir.join(format!("{}.pgm", name))
    }
}

impl ImageStore for PgmStore {
    fn read(&self, name: &str) -> Result<Grid> {
        let path = self.input_dir.join(format!("{}.pgm", name));
        let bytes =
            fs::read(&path).with_context(|| format!("Failed to read image {}", path.display()))?;
        decode_pgm(&bytes).with_context(|| format!("Invalid PGM image {}", path.display()))
    }

    fn write(&self, name: &str, grid: &Grid) -> Result<()> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!(
                "Failed to create output directory {}",
                self.output_dir.display()
            )
        })?;
        let path = self.output_path(name);
        fs::write(&path, encode_pgm(grid))
            .with_context(|| format!("Failed to write image {}", path.display()))?;
        debug!("Wrote {}", path.display());
        Ok(())
    }
}

/// Encode a grid as binary PGM
pub fn encode_pgm(grid: &Grid) -> Vec<u8> {
    let mut out = format!("P5\n{} {}\n255\n", grid.width(), grid.height()).into_bytes();
    out.extend(grid.to_bytes());
    out
}

/// Decode a binary PGM. Comments (`#` to end of line) in the header are skipped.
pub fn decode_pgm(bytes: &[u8]) -> Result<Grid> {
    let mut pos = 0;
    let mut fields = Vec::with_capacity(4);
    while fields.len() < 4 {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos < bytes.len() && bytes[pos] == b'#' {
            while pos < bytes.len() && bytes[pos] != b'\n' {
                pos += 1;
            }
            continue;
        }
        let start = pos;
        while pos < bytes.len() && !bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if start == pos {
            bail!("Truncated PGM header");
        }
        fields.push(std::str::from_utf8(&bytes[start..pos]).context("Non-ASCII PGM header")?);
    }
    // exactly one whitespace byte separates the header from the raster
    pos += 1;

    if fields[0] != "P5" {
        bail!("Unsupported PGM magic {:?} (expected P5)", fields[0]);
    }
    let width: usize = fields[1].parse().context("Bad PGM width")?;
    let height: usize = fields[2].parse().context("Bad PGM height")?;
    let max: usize = fields[3].parse().context("Bad PGM max value")?;
    if max == 0 || max > 255 {
        bail!("Unsupported PGM max value {}", max);
    }

    let len = cell_count(width, height).context("Bad PGM dimensions")?;
    let raster = bytes
        .get(pos..)
        .and_then(|rest| rest.get(..len))
        .ok_or_else(|| {
            anyhow!(
                "PGM raster too short: need {} bytes, have {}",
                len,
                bytes.len().saturating_sub(pos)
            )
        })?;
    Ok(Grid::from_bytes(width, height, raster)?)
}

/// In-memory store; clones share the same images
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    images: Arc<Mutex<HashMap<String, Grid>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(name: &str, grid: Grid) -> Self {
        let store = Self::new();
        if let Ok(mut images) = store.images.lock() {
            images.insert(name.to_string(), grid);
        }
        store
    }

    pub fn get(&self, name: &str) -> Option<Grid> {
        self.images.lock().ok()?.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .images
            .lock()
            .map(|images| images.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }
}

impl ImageStore for MemoryStore {
    fn read(&self, name: &str) -> Result<Grid> {
        self.get(name)
            .ok_or_else(|| anyhow!("No image named {}", name))
    }

    fn write(&self, name: &str, grid: &Grid) -> Result<()> {
        let mut images = self
            .images
            .lock()
            .map_err(|_| anyhow!("Image store lock poisoned"))?;
        images.insert(name.to_string(), grid.clone());
        Ok(())
    }
}

/// Random initial board for any requested size
#[derive(Debug, Clone)]
pub struct SeededStore<S> {
    seed: u64,
    density: f64,
    output: S,
}

impl<S: ImageStore> SeededStore<S> {
    pub fn new(seed: u64, density: f64, output: S) -> Self {
        Self {
            seed,
            density,
            output,
        }
    }
}

impl<S: ImageStore> ImageStore for SeededStore<S> {
    fn read(&self, name: &str) -> Result<Grid> {
        let (width, height) = parse_size(name)?;
        Ok(Grid::random(width, height, self.density, self.seed)?)
    }

    fn write(&self, name: &str, grid: &Grid) -> Result<()> {
        self.output.write(name, grid)
    }
}

fn parse_size(name: &str) -> Result<(usize, usize)> {
    let (w, h) = name
        .split_once('x')
        .ok_or_else(|| anyhow!("Image name {:?} is not <W>x<H>", name))?;
    let width = w.parse().with_context(|| format!("Bad width in {:?}", name))?;
    let height = h.parse().with_context(|| format!("Bad height in {:?}", name))?;
    Ok((width, height))
}

/// Whether a PGM for `name` exists under `dir`
pub fn pgm_exists(dir: &Path, name: &str) -> bool {
    dir.join(format!("{}.pgm", name)).is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::CellCoord;

    #[test]
    fn test_pgm_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let grid = Grid::with_alive(4, 3, &[CellCoord::new(0, 0), CellCoord::new(3, 2)]).unwrap();

        let store = PgmStore::new(dir.path(), dir.path());
        store.write("4x3", &grid).unwrap();
        assert!(pgm_exists(dir.path(), "4x3"));
        assert_eq!(store.read("4x3").unwrap(), grid);
    }

    #[test]
    fn test_decode_with_comment() {
        let mut bytes = b"P5\n# made by hand\n2 2\n255\n".to_vec();
        bytes.extend_from_slice(&[255, 0, 0, 255]);
        let grid = decode_pgm(&bytes).unwrap();
        assert_eq!(grid.alive_cells(), vec![CellCoord::new(0, 0), CellCoord::new(1, 1)]);
    }

    #[test]
    fn test_decode_rejects_bad_input() {
        assert!(decode_pgm(b"P2\n2 2\n255\n\0\0\0\0").is_err());
        assert!(decode_pgm(b"P5\n2 2\n255\n\0\0").is_err());
        assert!(decode_pgm(b"P5\n2").is_err());
    }

    #[test]
    fn test_decode_rejects_overflowing_dimensions() {
        let header = format!("P5\n{} 2\n255\n", usize::MAX);
        let err = decode_pgm(header.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("Bad PGM dimensions"));
    }

    #[test]
    fn test_missing_file_has_context() {
        let dir = tempfile::tempdir().unwrap();
        let store = PgmStore::new(dir.path(), dir.path());
        let err = store.read("16x16").unwrap_err();
        assert!(format!("{:#}", err).contains("16x16.pgm"));
    }

    #[test]
    fn test_memory_store_shared_between_clones() {
        let store = MemoryStore::new();
        let clone = store.clone();
        clone.write("2x2x1", &Grid::new(2, 2).unwrap()).unwrap();
        assert_eq!(store.names(), vec!["2x2x1".to_string()]);
        assert!(store.read("missing").is_err());
    }

    #[test]
    fn test_seeded_store() {
        let store = SeededStore::new(9, 0.5, MemoryStore::new());
        let a = store.read("32x16").unwrap();
        assert_eq!((a.width(), a.height()), (32, 16));
        assert_eq!(a, store.read("32x16").unwrap());
        assert!(store.read("bogus").is_err());
    }
}

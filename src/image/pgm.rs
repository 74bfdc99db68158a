//! Binary PGM (P5) image store

use super::{input_name, snapshot_name, ImageStore};
use crate::board::Grid;
use crate::Result;
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

const MAGIC: &str = "P5";
const MAXVAL: usize = 255;

/// Reads `<input_dir>/<h>x<w>.pgm`, writes `<output_dir>/<h>x<w>x<turn>.pgm`
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

    pub fn input_path(&self, height: usize, width: usize) -> PathBuf {
        self.input_dir.join(format!("{}.pgm", input_name(height, width)))
    }

    pub fn output_path(&self, height: usize, width: usize, turn: u64) -> PathBuf {
        self.output_dir
            .join(format!("{}.pgm", snapshot_name(height, width, turn)))
    }
}

impl ImageStore for PgmStore {
    fn load(&self, height: usize, width: usize) -> Result<Grid> {
        let path = self.input_path(height, width);
        let grid = read_pgm(&path)?;
        if grid.height() != height || grid.width() != width {
            anyhow::bail!(
                "{} is {}x{}, expected {}x{}",
                path.display(),
                grid.height(),
                grid.width(),
                height,
                width
            );
        }
        Ok(grid)
    }

    fn save(&self, grid: &Grid, turn: u64) -> Result<String> {
        fs::create_dir_all(&self.output_dir).with_context(|| {
            format!("Failed to create output directory: {}", self.output_dir.display())
        })?;

        let path = self.output_path(grid.height(), grid.width(), turn);
        let comment = format!("golnet turn {} at {}", turn, chrono::Utc::now().to_rfc3339());
        write_pgm(&path, grid, Some(comment.as_str()))?;
        debug!(path = %path.display(), turn, "image written");

        Ok(snapshot_name(grid.height(), grid.width(), turn))
    }
}

/// Write `grid` as a binary PGM with an optional header comment
pub fn write_pgm(path: &Path, grid: &Grid, comment: Option<&str>) -> Result<()> {
    let mut data = Vec::with_capacity(grid.height() * grid.width() + 64);
    data.extend_from_slice(MAGIC.as_bytes());
    data.push(b'\n');
    if let Some(comment) = comment {
        data.extend_from_slice(format!("# {}\n", comment.replace('\n', " ")).as_bytes());
    }
    data.extend_from_slice(format!("{} {}\n{}\n", grid.width(), grid.height(), MAXVAL).as_bytes());
    data.extend_from_slice(&grid.to_bytes());

    fs::write(path, data).with_context(|| format!("Failed to write image: {}", path.display()))
}

/// Read a binary PGM with maxval 255
pub fn read_pgm(path: &Path) -> Result<Grid> {
    let data = fs::read(path).with_context(|| format!("Failed to read image: {}", path.display()))?;
    parse_pgm(&data).with_context(|| format!("Invalid PGM image: {}", path.display()))
}

/// Parse binary PGM bytes
pub fn parse_pgm(data: &[u8]) -> Result<Grid> {
    let mut header = HeaderReader { data, pos: 0 };

    let magic = header.token()?;
    if magic != MAGIC {
        anyhow::bail!("unsupported format '{}', expected {}", magic, MAGIC);
    }
    let width: usize = header.number("width")?;
    let height: usize = header.number("height")?;
    let maxval: usize = header.number("maxval")?;
    if maxval != MAXVAL {
        anyhow::bail!("unsupported maxval {}, expected {}", maxval, MAXVAL);
    }

    // Exactly one whitespace byte separates the header from the raster
    let start = header.pos + 1;
    let expected = width * height;
    let raster = data
        .get(start..start + expected)
        .with_context(|| format!("raster truncated: expected {} bytes", expected))?;

    Grid::from_bytes(height, width, raster)
}

/// Whitespace-separated header tokens, skipping `#` comments
struct HeaderReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn token(&mut self) -> Result<&'a str> {
        loop {
            match self.data.get(self.pos) {
                Some(b) if b.is_ascii_whitespace() => self.pos += 1,
                Some(b'#') => {
                    while let Some(&b) = self.data.get(self.pos) {
                        self.pos += 1;
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(_) => break,
                None => anyhow::bail!("header truncated"),
            }
        }

        let data: &'a [u8] = self.data;
        let start = self.pos;
        while matches!(self.data.get(self.pos), Some(b) if !b.is_ascii_whitespace()) {
            self.pos += 1;
        }
        std::str::from_utf8(&data[start..self.pos]).context("header is not ASCII")
    }

    fn number(&mut self, field: &str) -> Result<usize> {
        let token = self.token()?;
        token
            .parse()
            .with_context(|| format!("invalid {} '{}'", field, token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Cell;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = PgmStore::new(dir.path(), dir.path());
        let grid = Grid::random(16, 24, 0.3, &mut StdRng::seed_from_u64(3));

        let name = store.save(&grid, 7).unwrap();
        assert_eq!(name, "16x24x7");
        assert!(dir.path().join("16x24x7.pgm").exists());

        // Same file under the input name
        fs::copy(dir.path().join("16x24x7.pgm"), dir.path().join("16x24.pgm")).unwrap();
        assert_eq!(store.load(16, 24).unwrap(), grid);
    }

    #[test]
    fn test_save_creates_output_dir() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("nested").join("out");
        let store = PgmStore::new(dir.path(), &out);

        store.save(&Grid::new(2, 2), 0).unwrap();
        assert!(out.join("2x2x0.pgm").exists());
    }

    #[test]
    fn test_parse_header_with_comments() {
        let mut data = b"P5\n# made by hand\n3 2\n# maxval next\n255\n".to_vec();
        data.extend_from_slice(&[255, 0, 0, 0, 0, 255]);

        let grid = parse_pgm(&data).unwrap();
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.alive_cells(), vec![Cell::new(0, 0), Cell::new(2, 1)]);
    }

    #[test]
    fn test_rejects_bad_images() {
        assert!(parse_pgm(b"P2\n1 1\n255\n\xff").is_err());
        assert!(parse_pgm(b"P5\n2 2\n15\n\x00\x00\x00\x00").is_err());
        assert!(parse_pgm(b"P5\n2 2\n255\n\x00\x00").is_err());
        assert!(parse_pgm(b"P5\n2").is_err());
    }

    #[test]
    fn test_load_wrong_size() {
        let dir = TempDir::new().unwrap();
        write_pgm(&dir.path().join("4x4.pgm"), &Grid::new(4, 5), None).unwrap();

        let store = PgmStore::new(dir.path(), dir.path());
        assert!(store.load(4, 4).is_err());
        assert!(store.load(8, 8).is_err());
    }
}

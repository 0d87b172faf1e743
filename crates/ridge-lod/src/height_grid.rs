//! Height samples the mesh is built from.

use glam::Vec3;

use crate::error::LodError;

/// A rectangular grid of height samples, indexed `(row, col)`.
pub trait HeightSource {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    /// Height at an in-range sample.
    fn height(&self, row: usize, col: usize) -> f32;
}

/// Owned row-major height grid.
#[derive(Clone, Debug, PartialEq)]
pub struct HeightGrid {
    rows: usize,
    cols: usize,
    samples: Vec<f32>,
}

impl HeightGrid {
    /// Wrap a row-major sample buffer.
    pub fn from_samples(rows: usize, cols: usize, samples: Vec<f32>) -> Result<Self, LodError> {
        if samples.len() != rows * cols {
            return Err(LodError::GridShape {
                rows,
                cols,
                len: samples.len(),
            });
        }
        Ok(Self { rows, cols, samples })
    }

    /// Grid of constant `height`.
    #[must_use]
    pub fn flat(rows: usize, cols: usize, height: f32) -> Self {
        Self {
            rows,
            cols,
            samples: vec![height; rows * cols],
        }
    }

    /// Grid filled by evaluating `f(row, col)`.
    #[must_use]
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut samples = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                samples.push(f(row, col));
            }
        }
        Self { rows, cols, samples }
    }

    /// Copy any source into an owned grid.
    #[must_use]
    pub fn from_source(source: &impl HeightSource) -> Self {
        Self::from_fn(source.rows(), source.cols(), |r, c| source.height(r, c))
    }

    /// Overwrite one sample.
    pub fn set(&mut self, row: usize, col: usize, height: f32) {
        self.samples[row * self.cols + col] = height;
    }

    /// Unit surface normal at a sample for cells `spacing` apart.
    ///
    /// Central differences inside the grid, doubled one-sided differences on
    /// the border. World x follows rows and z follows columns.
    #[must_use]
    pub fn vertex_normal(&self, row: usize, col: usize, spacing: f32) -> Vec3 {
        let dx = self.difference(row, col, true);
        let dz = self.difference(row, col, false);
        Vec3::new(-dx, 2.0 * spacing, -dz).normalize_or(Vec3::Y)
    }

    /// Height change over two cells along rows (`along_rows`) or columns.
    fn difference(&self, row: usize, col: usize, along_rows: bool) -> f32 {
        let (pos, len) = if along_rows { (row, self.rows) } else { (col, self.cols) };
        let at = |p: usize| {
            if along_rows {
                self.height(p, col)
            } else {
                self.height(row, p)
            }
        };
        if len < 2 {
            0.0
        } else if pos == 0 {
            2.0 * (at(1) - at(0))
        } else if pos == len - 1 {
            2.0 * (at(pos) - at(pos - 1))
        } else {
            at(pos + 1) - at(pos - 1)
        }
    }
}

impl HeightSource for HeightGrid {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn height(&self, row: usize, col: usize) -> f32 {
        self.samples[row * self.cols + col]
    }
}

// matrix.rs - Runtime-sized dense f32 matrix.
//
// Row-major, contiguous, no stride padding: element (r, c) lives at index
// r * cols + c and the buffer length is exactly rows * cols. The matmul
// kernel and the unroll transform both rely on this dense packing, so
// unlike an image container there is no alignment padding per row.
//
// Matrices are value-like. Whoever holds one owns it; the GPU path copies
// the data into device buffers and hands back a fresh Matrix.

use std::fmt;

/// A dense row-major matrix of `f32` with runtime dimensions.
///
/// Invariant: `data.len() == rows * cols`, enforced by every constructor.
pub struct Matrix {
    /// Element data in row-major order. Length = rows * cols.
    data: Vec<f32>,
    rows: usize,
    cols: usize,
}

// Clone is a deep copy of heap data; implemented manually to say so.
impl Clone for Matrix {
    fn clone(&self) -> Self {
        Matrix {
            data: self.data.clone(),
            rows: self.rows,
            cols: self.cols,
        }
    }
}

impl Matrix {
    // --- Constructors ---

    /// Create a zero-initialized matrix with the given dimensions.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Matrix {
            data: vec![0.0; rows * cols],
            rows,
            cols,
        }
    }

    /// Create a matrix from an existing element vector.
    ///
    /// # Panics
    /// Panics if `data.len() != rows * cols`.
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Self {
        assert_eq!(
            data.len(),
            rows * cols,
            "data length ({}) must equal rows * cols ({})",
            data.len(),
            rows * cols,
        );
        Matrix { data, rows, cols }
    }

    /// Create a matrix by evaluating `f(row, col)` for every element.
    /// Handy for test fixtures and synthetic grids.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Matrix { data, rows, cols }
    }

    // --- Accessors ---

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Total element count (rows * cols).
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the element at (row, col).
    ///
    /// # Panics
    /// Panics if out of bounds.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.bounds_check(row, col);
        self.data[row * self.cols + col]
    }

    /// Set the element at (row, col).
    ///
    /// # Panics
    /// Panics if out of bounds.
    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.bounds_check(row, col);
        self.data[row * self.cols + col] = value;
    }

    #[inline]
    fn bounds_check(&self, row: usize, col: usize) {
        assert!(
            row < self.rows && col < self.cols,
            "({row}, {col}) out of bounds for {}x{} matrix",
            self.rows,
            self.cols,
        );
    }

    /// Borrow the full row-major element buffer.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable borrow of the full row-major element buffer.
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Consume the matrix, returning its element vector.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// Borrow a single row as a slice.
    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        assert!(row < self.rows, "row {row} out of bounds (rows {})", self.rows);
        let start = row * self.cols;
        &self.data[start..start + self.cols]
    }

    // --- Comparison ---

    /// Largest element-wise absolute difference against another matrix.
    ///
    /// # Panics
    /// Panics if the shapes differ.
    pub fn max_abs_diff(&self, other: &Matrix) -> f32 {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "shape mismatch: {}x{} vs {}x{}",
            self.rows,
            self.cols,
            other.rows,
            other.cols,
        );
        self.data
            .iter()
            .zip(other.data.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max)
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// Rows/cols beyond this many are elided with "..." when printing.
/// Large matrices (e.g. the 128x512 matmul inputs) stay readable.
const DISPLAY_LIMIT: usize = 6;

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}x{} matrix", self.rows, self.cols)?;
        for r in 0..self.rows {
            if self.rows > 2 * DISPLAY_LIMIT && r == DISPLAY_LIMIT {
                writeln!(f, "  ...")?;
            }
            if self.rows > 2 * DISPLAY_LIMIT && (DISPLAY_LIMIT..self.rows - DISPLAY_LIMIT).contains(&r) {
                continue;
            }
            write!(f, "[")?;
            for c in 0..self.cols {
                if self.cols > 2 * DISPLAY_LIMIT && c == DISPLAY_LIMIT {
                    write!(f, "   ...  ")?;
                }
                if self.cols > 2 * DISPLAY_LIMIT && (DISPLAY_LIMIT..self.cols - DISPLAY_LIMIT).contains(&c) {
                    continue;
                }
                write!(f, " {:7.2} ", self.data[r * self.cols + c])?;
            }
            writeln!(f, "]")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Matrix {{ {}x{} }}", self.rows, self.cols)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

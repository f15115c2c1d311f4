// unroll.rs - Neighborhood unrolling (im2col) for 3x3 stencils.
//
// Turns a windowed stencil operation into a dense matrix multiply: row i
// of the unrolled matrix holds the 3x3 neighborhood of grid cell i, so
//
//     convolved = unroll(grid) * weights      (R*C x 9) * (9 x 1)
//
// computes, per cell, the weighted sum of its neighborhood in one multiply
// against the shared GPU kernel. `fold_column` reshapes the resulting
// column back into the original grid shape.
//
// BORDER HANDLING: zero-padding. Any neighbor offset landing outside the
// grid contributes 0.0. Not clamping, not wrap-around: a corner cell has
// exactly 5 out-of-bounds neighbors and they are all zero. This matches
// the reference the crate was validated against and is part of the pinned
// filter fixtures in tests/.

use crate::matrix::Matrix;

/// The 3x3 stencil as (delta_row, delta_col) offsets, in the fixed order
/// every filter weight vector follows: top-left, top, top-right, left,
/// center, right, bottom-left, bottom, bottom-right.
pub const NEIGHBORHOOD_OFFSETS: [(isize, isize); 9] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 0),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Unroll an RxC grid into an (R*C)x9 matrix of 3x3 neighborhoods.
///
/// Cells are visited in row-major order, so row `r * C + c` of the output
/// holds the neighborhood of cell (r, c). Out-of-bounds neighbors are
/// zero-padded.
pub fn unroll(grid: &Matrix) -> Matrix {
    let rows = grid.rows();
    let cols = grid.cols();

    let mut data = Vec::with_capacity(rows * cols * NEIGHBORHOOD_OFFSETS.len());
    for r in 0..rows {
        for c in 0..cols {
            for &(dr, dc) in &NEIGHBORHOOD_OFFSETS {
                let nr = r as isize + dr;
                let nc = c as isize + dc;
                let v = if nr < 0 || nr >= rows as isize || nc < 0 || nc >= cols as isize {
                    0.0
                } else {
                    grid.get(nr as usize, nc as usize)
                };
                data.push(v);
            }
        }
    }
    Matrix::from_vec(rows * cols, NEIGHBORHOOD_OFFSETS.len(), data)
}

/// Reshape an (R*C)x1 column back into an RxC grid.
///
/// Element i of the column goes to (i / C, i % C), the inverse of the
/// traversal order `unroll` uses.
///
/// # Panics
/// Panics if `column` is not (rows*cols)x1.
pub fn fold_column(column: &Matrix, rows: usize, cols: usize) -> Matrix {
    assert_eq!(
        (column.rows(), column.cols()),
        (rows * cols, 1),
        "expected a {}x1 column, got {}x{}",
        rows * cols,
        column.rows(),
        column.cols(),
    );
    Matrix::from_vec(rows, cols, column.as_slice().to_vec())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

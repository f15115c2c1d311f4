// reference.rs - CPU reference matrix multiply and cross-check.
//
// The straightforward triple-nested loop. It exists for two reasons:
//   1. Oracle: every GPU multiply is validated against it (see `verify`).
//   2. Baseline: the benchmarks compare GPU dispatch cost against it.
//
// ACCUMULATOR CONTRACT
// The two multiply paths in this crate have deliberately different zeroing
// contracts, stated explicitly so neither is relied on by accident:
//   - The GPU kernel self-zeros: each invocation accumulates into a local
//     starting at 0.0 and writes its output element exactly once.
//   - `multiply_into` accumulates into the buffer it is given and therefore
//     requires the caller to supply a zeroed output.
// The `multiply` convenience wrapper allocates the zeroed output itself and
// is what most callers want.

use std::fmt;

use crate::matrix::Matrix;

/// Absolute element-wise tolerance for CPU/GPU agreement.
///
/// f32 addition is not associative; the GPU accumulates in a different
/// order than the CPU loop, so exact equality cannot be expected. 1e-5
/// absolute comfortably covers the rounding drift for the K dimensions
/// this crate dispatches while still catching real defects.
pub const TOLERANCE: f32 = 1e-5;

/// Multiply `a` (MxK) by `b` (KxN), accumulating into `out` (MxN).
///
/// `out` is NOT cleared first: `out[i][j] += a[i][k] * b[k][j]`. The caller
/// must supply a zeroed matrix (or deliberately accumulate onto existing
/// values). Use [`multiply`] unless you need that control.
///
/// # Panics
/// Panics if the shapes are inconsistent.
pub fn multiply_into(out: &mut Matrix, a: &Matrix, b: &Matrix) {
    assert_eq!(
        a.cols(),
        b.rows(),
        "inner dimensions must agree: a is {}x{}, b is {}x{}",
        a.rows(),
        a.cols(),
        b.rows(),
        b.cols(),
    );
    assert_eq!(
        (out.rows(), out.cols()),
        (a.rows(), b.cols()),
        "output must be {}x{}, got {}x{}",
        a.rows(),
        b.cols(),
        out.rows(),
        out.cols(),
    );

    let m = a.rows();
    let n = b.cols();
    let k_dim = a.cols();

    // Row-major output order, accumulating over k innermost. Indexing into
    // the flat slices directly keeps the inner loop free of bounds asserts.
    let a_data = a.as_slice();
    let b_data = b.as_slice();
    let out_data = out.as_mut_slice();
    for i in 0..m {
        for j in 0..n {
            let mut acc = out_data[i * n + j];
            for k in 0..k_dim {
                acc += a_data[i * k_dim + k] * b_data[k * n + j];
            }
            out_data[i * n + j] = acc;
        }
    }
}

/// Multiply `a` (MxK) by `b` (KxN), returning a fresh MxN result.
///
/// Allocates and zeroes the output before accumulating; see the module
/// notes on the accumulator contract.
pub fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    let mut out = Matrix::zeros(a.rows(), b.cols());
    multiply_into(&mut out, a, b);
    out
}

// ---------------------------------------------------------------------------
// Cross-check
// ---------------------------------------------------------------------------

/// First element where `actual` and `expected` disagree beyond tolerance.
///
/// A mismatch is a correctness defect in whichever path produced `actual`,
/// surfaced to the caller rather than logged and ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mismatch {
    pub row: usize,
    pub col: usize,
    pub actual: f32,
    pub expected: f32,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "mismatch at ({}, {}): actual {} vs expected {} (diff {})",
            self.row,
            self.col,
            self.actual,
            self.expected,
            (self.actual - self.expected).abs(),
        )
    }
}

impl std::error::Error for Mismatch {}

/// Compare `actual` against `expected` element-wise, row-major order.
///
/// Returns the first element whose absolute difference exceeds `tolerance`
/// (use [`TOLERANCE`] for the standard CPU/GPU check).
///
/// # Panics
/// Panics if the shapes differ; that is a caller bug, not a numerical
/// mismatch.
pub fn verify(actual: &Matrix, expected: &Matrix, tolerance: f32) -> Result<(), Mismatch> {
    assert_eq!(
        (actual.rows(), actual.cols()),
        (expected.rows(), expected.cols()),
        "shape mismatch: {}x{} vs {}x{}",
        actual.rows(),
        actual.cols(),
        expected.rows(),
        expected.cols(),
    );
    let n = actual.cols();
    for (idx, (&got, &want)) in actual
        .as_slice()
        .iter()
        .zip(expected.as_slice().iter())
        .enumerate()
    {
        if (got - want).abs() > tolerance {
            return Err(Mismatch {
                row: idx / n,
                col: idx % n,
                actual: got,
                expected: want,
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

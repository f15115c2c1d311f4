// filter.rs - named 3x3 filters over 2-D grids.
//
// A filter is nothing but a 9-element weight vector in the neighborhood
// offset order fixed by `unroll::NEIGHBORHOOD_OFFSETS`. Applying one is
// the composition
//
//     fold_column(unroll(grid) * weights)
//
// where the multiply runs either on the GPU (`apply_weights`) or through
// the CPU reference engine (`apply_weights_cpu`). Adding a filter means
// adding a weight vector; no new dispatch logic.
//
// Outputs are plain f32 grids. Quantizing edge responses to a displayable
// range (or clamping blur output to 8-bit) is the caller's business.

use std::fmt;

use crate::gpu::device::{GpuDevice, GpuError};
use crate::gpu::matmul::GpuMatmul;
use crate::matrix::Matrix;
use crate::reference;
use crate::unroll;

/// The named 3x3 filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    /// Normalized Gaussian blur (weights sum to 1, center dominant).
    GaussianBlur,
    /// Scharr derivative along x; responds to vertical intensity edges.
    HorizontalEdge,
    /// Scharr derivative along y; responds to horizontal intensity edges.
    VerticalEdge,
}

impl Filter {
    /// The filter's weight vector, in neighborhood offset order
    /// (TL, T, TR, L, C, R, BL, B, BR).
    pub fn weights(&self) -> [f32; 9] {
        match self {
            Filter::GaussianBlur => [
                0.077847, 0.123317, 0.077847,
                0.123317, 0.195346, 0.123317,
                0.077847, 0.123317, 0.077847,
            ],
            Filter::HorizontalEdge => [
                3.0, 0.0, -3.0,
                10.0, 0.0, -10.0,
                3.0, 0.0, -3.0,
            ],
            Filter::VerticalEdge => [
                3.0, 10.0, 3.0,
                0.0, 0.0, 0.0,
                -3.0, -10.0, -3.0,
            ],
        }
    }

    /// Apply this filter on the device. Output shape equals input shape.
    pub fn apply(
        &self,
        gpu: &GpuDevice,
        matmul: &GpuMatmul,
        grid: &Matrix,
    ) -> Result<Matrix, GpuError> {
        apply_weights(gpu, matmul, grid, &self.weights())
    }

    /// Apply this filter through the CPU reference engine.
    ///
    /// Oracle for the GPU path and fallback when no device is available.
    pub fn apply_cpu(&self, grid: &Matrix) -> Matrix {
        apply_weights_cpu(grid, &self.weights())
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::GaussianBlur => write!(f, "gaussian blur"),
            Filter::HorizontalEdge => write!(f, "horizontal edge"),
            Filter::VerticalEdge => write!(f, "vertical edge"),
        }
    }
}

/// Apply an arbitrary 9-weight vector to a grid on the device.
///
/// Unrolls the grid to (R*C)x9, dispatches a (R*C)x9 * 9x1 multiply, and
/// folds the resulting column back to RxC.
pub fn apply_weights(
    gpu: &GpuDevice,
    matmul: &GpuMatmul,
    grid: &Matrix,
    weights: &[f32; 9],
) -> Result<Matrix, GpuError> {
    let unrolled = unroll::unroll(grid);
    let weight_col = Matrix::from_vec(9, 1, weights.to_vec());
    let column = matmul.multiply(gpu, &unrolled, &weight_col)?;
    Ok(unroll::fold_column(&column, grid.rows(), grid.cols()))
}

/// CPU counterpart of [`apply_weights`], same composition through
/// `reference::multiply`.
pub fn apply_weights_cpu(grid: &Matrix, weights: &[f32; 9]) -> Matrix {
    let unrolled = unroll::unroll(grid);
    let weight_col = Matrix::from_vec(9, 1, weights.to_vec());
    let column = reference::multiply(&unrolled, &weight_col);
    unroll::fold_column(&column, grid.rows(), grid.cols())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaussian_weights_normalized() {
        let w = Filter::GaussianBlur.weights();
        let sum: f32 = w.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4, "blur weights sum to {sum}");
        // Center tap dominant, all positive.
        assert!(w.iter().all(|&v| v > 0.0));
        assert!(w[4] > w[1] && w[1] > w[0]);
        // Symmetric under 180-degree rotation.
        for i in 0..9 {
            assert_eq!(w[i], w[8 - i]);
        }
    }

    #[test]
    fn test_edge_weights_zero_sum() {
        // Derivative filters must not respond to constant regions.
        for filter in [Filter::HorizontalEdge, Filter::VerticalEdge] {
            let sum: f32 = filter.weights().iter().sum();
            assert_eq!(sum, 0.0, "{filter} weights sum to {sum}");
        }
    }

    #[test]
    fn test_edge_filters_are_transposes() {
        let h = Filter::HorizontalEdge.weights();
        let v = Filter::VerticalEdge.weights();
        for r in 0..3 {
            for c in 0..3 {
                assert_eq!(h[r * 3 + c], v[c * 3 + r]);
            }
        }
    }

    #[test]
    fn test_identity_weights_reproduce_grid() {
        let mut identity = [0.0f32; 9];
        identity[4] = 1.0;
        let grid = Matrix::from_fn(3, 5, |r, c| (r * 5 + c) as f32 * 1.5 - 4.0);
        let out = apply_weights_cpu(&grid, &identity);
        assert_eq!(out.as_slice(), grid.as_slice());
    }

    #[test]
    fn test_output_shape_equals_input_shape() {
        for &(rows, cols) in &[(1usize, 1usize), (1, 7), (7, 1), (4, 6)] {
            let grid = Matrix::from_fn(rows, cols, |r, c| (r + c) as f32);
            let out = Filter::GaussianBlur.apply_cpu(&grid);
            assert_eq!((out.rows(), out.cols()), (rows, cols));
        }
    }

    #[test]
    fn test_horizontal_edge_on_vertical_step() {
        // Left half 0, right half 10: the x-derivative fires on the step
        // column and is zero well inside the flat halves.
        let grid = Matrix::from_fn(5, 6, |_, c| if c < 3 { 0.0 } else { 10.0 });
        let out = Filter::HorizontalEdge.apply_cpu(&grid);
        // Interior flat cell.
        assert_eq!(out.get(2, 1), 0.0);
        // Step cell (2,2): right column of the window is 10s.
        // (3 + 10 + 3) * (0 - 10) = -160.
        assert_eq!(out.get(2, 2), -160.0);
        // Vertical-edge filter sees nothing in the interior of the step.
        let out_v = Filter::VerticalEdge.apply_cpu(&grid);
        assert_eq!(out_v.get(2, 2), 0.0);
    }

    #[test]
    fn test_blur_fixture_2x2() {
        // Pinned regression fixture: the deterministic result of the
        // zero-padding plus Gaussian weight formula on [[1,2],[3,4]].
        let grid = Matrix::from_vec(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let out = Filter::GaussianBlur.apply_cpu(&grid);
        let expected = [1.123319, 1.240818, 1.358317, 1.475816];
        for (i, (&got, &want)) in out.as_slice().iter().zip(expected.iter()).enumerate() {
            assert!(
                (got - want).abs() < 1e-5,
                "element {i}: got {got}, want {want}"
            );
        }
        // Zero-padded averaging pulls every corner below the center-heavy
        // input, and ordering is preserved.
        assert!(out.get(0, 0) < out.get(0, 1));
        assert!(out.get(0, 1) < out.get(1, 0));
        assert!(out.get(1, 0) < out.get(1, 1));
    }

    // ---- GPU integration tests (subprocess-isolated) -----------------------

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args([
                "test", "--lib", "--",
                test_name, "--exact", "--ignored", "--nocapture",
            ])
            .output()
            .unwrap_or_else(|e| panic!("failed to spawn subprocess for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}");
        eprint!("{stderr}");
        stdout + &stderr
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_filter_matches_cpu() {
        let gpu = GpuDevice::new().expect("need Vulkan GPU");
        let matmul = GpuMatmul::new(&gpu);

        // Deterministic pseudo-random grid.
        let mut rng = 7u32;
        let grid = Matrix::from_fn(37, 53, |_, _| {
            rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
            (rng >> 24) as f32
        });

        for filter in [Filter::GaussianBlur, Filter::HorizontalEdge, Filter::VerticalEdge] {
            let device_out = filter.apply(&gpu, &matmul, &grid).expect("dispatch failed");
            let cpu_out = filter.apply_cpu(&grid);
            // K = 9 and u8-range samples: absolute error stays tiny even
            // for the edge filters whose outputs reach +/- 8k.
            reference::verify(&device_out, &cpu_out, 1e-2)
                .unwrap_or_else(|e| panic!("{filter}: {e}"));
        }
        println!("GPU_TEST_OK");
    }

    #[test]
    #[ignore = "requires a real Vulkan GPU"]
    fn test_gpu_filter_matches_cpu() {
        let out = run_gpu_test_in_subprocess("filter::tests::inner_gpu_filter_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}

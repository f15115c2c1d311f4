// demos/matmul.rs - CPU vs GPU dense multiply with verification.
//
// Multiplies a random MxK by KxN pair on the CPU reference engine and on
// the device, times both, and verifies the device result element-wise to
// 1e-5 absolute. A mismatch is a hard failure.
//
// USAGE
//   cargo run --example matmul              # default 128x512 * 512x256
//   cargo run --example matmul -- M K N     # explicit dimensions

use std::process::ExitCode;
use std::time::Instant;

use convmat::gpu::device::{GpuDevice, GpuOptions, TileSize};
use convmat::gpu::matmul::GpuMatmul;
use convmat::matrix::Matrix;
use convmat::reference;

/// Deterministic matrix in [-10, 10), LCG-generated.
fn random_matrix(rows: usize, cols: usize, seed: u32) -> Matrix {
    let mut rng = seed;
    Matrix::from_fn(rows, cols, |_, _| {
        rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
        (rng >> 8) as f32 / (1u32 << 24) as f32 * 20.0 - 10.0
    })
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let m: usize = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(128);
    let k: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(512);
    let n: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(256);

    eprintln!("[matmul] A: {m}x{k}, B: {k}x{n}");
    let a = random_matrix(m, k, 1);
    let b = random_matrix(k, n, 2);

    // --- CPU reference ---
    let start = Instant::now();
    let cpu_out = reference::multiply(&a, &b);
    println!("CPU computation took {} ms.", start.elapsed().as_millis());

    // --- GPU ---
    let gpu = match GpuDevice::new_with_options(GpuOptions {
        tile: TileSize::default(),
        verbose: true,
    }) {
        Ok(gpu) => gpu,
        Err(e) => {
            eprintln!("[matmul] fatal: {e}");
            return ExitCode::FAILURE;
        }
    };
    eprintln!("[matmul] {gpu}");
    let matmul = GpuMatmul::new(&gpu);

    let start = Instant::now();
    let gpu_out = match matmul.multiply(&gpu, &a, &b) {
        Ok(out) => out,
        Err(e) => {
            eprintln!("[matmul] dispatch failed: {e}");
            return ExitCode::FAILURE;
        }
    };
    println!("GPU computation took {} ms.", start.elapsed().as_millis());

    // --- Verify ---
    match reference::verify(&gpu_out, &cpu_out, reference::TOLERANCE) {
        Ok(()) => {
            println!(
                "Verification passed (max |diff| = {:.2e}).",
                gpu_out.max_abs_diff(&cpu_out)
            );
            ExitCode::SUCCESS
        }
        Err(mismatch) => {
            eprintln!("[matmul] verification FAILED: {mismatch}");
            ExitCode::FAILURE
        }
    }
}

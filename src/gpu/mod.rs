// gpu/mod.rs - GPU execution layer.
//
// This module owns everything that touches the device: context and queue
// acquisition (`device`) and the dense matmul dispatch (`matmul`). The CPU
// modules in the parent crate never see a wgpu type; they hand matrices in
// and get matrices back.
//
// Ordering per dispatch:
//
//   upload(A), upload(B)  - independent, enqueued before the kernel
//   matrix_mult kernel    - one invocation per output element, ordered
//                           after both uploads by submission order
//   readback              - recorded after the kernel; the host blocks
//                           only at the final buffer map
//
// The compiled pipeline is created once (GpuMatmul::new) and reused for
// every multiply and filter call. Buffers are created fresh per dispatch
// and dropped when the call returns, error paths included.

pub mod device;
pub mod matmul;

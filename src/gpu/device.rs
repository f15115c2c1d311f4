// gpu/device.rs - wgpu device abstraction.
//
// Responsibilities:
//   - Enumerate Vulkan adapters and select the first non-CPU one.
//   - Own the wgpu instance, device and queue for the lifetime of the
//     application. There are no hidden globals: every dispatch takes a
//     `&GpuDevice` explicitly.
//   - Provide `TileSize`, the workgroup tiling applied to the 2-D output
//     index space, validated against the device's invocation limit.
//
// ADAPTER SELECTION:
// wgpu's default `request_adapter` uses power preference heuristics that
// may grab llvmpipe/softpipe on WSL2 (where the software renderer appears
// as a valid Vulkan device). We enumerate explicitly and prefer real
// hardware, falling back to whatever exists only as a last resort.
//
// DIAGNOSTICS:
// Adapter enumeration logging is controlled by the runtime `verbose` flag
// in `GpuOptions`, not a cargo feature or cfg. Initialization failures are
// fatal to the caller; wgpu's own validation layer supplies the
// human-readable shader build log on compilation errors.

use std::fmt;

// ---------------------------------------------------------------------------
// Tile size
// ---------------------------------------------------------------------------

/// Workgroup tiling for the 2-D matmul dispatch.
///
/// Each workgroup covers an `x` by `y` tile of the output index space
/// (x along rows of the output, y along columns). Tiling affects locality
/// only; the kernel guards out-of-bounds invocations, so correctness never
/// depends on the tile shape.
///
/// The default is 16x16 = 256 invocations, which stays within
/// `wgpu::Limits::default()` on every backend wgpu supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSize {
    pub x: u32,
    pub y: u32,
}

impl TileSize {
    /// Total invocations per workgroup (x * y).
    pub fn total(&self) -> u32 {
        self.x * self.y
    }
}

impl Default for TileSize {
    fn default() -> Self {
        TileSize { x: 16, y: 16 }
    }
}

impl fmt::Display for TileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} ({} invocations)", self.x, self.y, self.total())
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Runtime configuration for device acquisition.
#[derive(Debug, Clone, Copy)]
pub struct GpuOptions {
    /// Workgroup tile applied to every matmul dispatch.
    pub tile: TileSize,
    /// Log adapter enumeration and selection to stderr.
    pub verbose: bool,
}

impl Default for GpuOptions {
    fn default() -> Self {
        GpuOptions {
            tile: TileSize::default(),
            verbose: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Adapter info
// ---------------------------------------------------------------------------

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}, {:?})",
            self.name, self.backend, self.device_type
        )
    }
}

// ---------------------------------------------------------------------------
// GpuDevice
// ---------------------------------------------------------------------------

/// The compute context: adapter, device, queue, and active tile size.
///
/// Create via `GpuDevice::new()` or `GpuDevice::new_with_options()`. Hold
/// one `GpuDevice` for the lifetime of the application; it is expensive to
/// create (Vulkan instance + device initialization). Teardown is `Drop`:
/// queue, device and instance are released when the struct goes out of
/// scope, on error paths included.
///
/// # Field drop order
/// Rust drops struct fields in declaration order (top to bottom).
/// `_instance` is declared last so the `wgpu::Instance` outlives `device`
/// and `queue`; some Vulkan layers crash if the instance is destroyed
/// while device-level objects still reference it.
pub struct GpuDevice {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub tile: TileSize,
    pub adapter_info: AdapterInfo,
    /// Keeps the `wgpu::Instance` alive until `device` and `queue` are
    /// dropped. Never accessed directly.
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Create a `GpuDevice` with default options (16x16 tile, quiet).
    ///
    /// # Errors
    /// Returns `Err` if no suitable adapter is found or the device request
    /// fails. Both are fatal setup errors: there is nothing to retry.
    pub fn new() -> Result<Self, GpuError> {
        Self::new_with_options(GpuOptions::default())
    }

    /// Create a `GpuDevice` with explicit options.
    pub fn new_with_options(options: GpuOptions) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(options))
    }

    async fn init_async(options: GpuOptions) -> Result<Self, GpuError> {
        // Vulkan only. ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER lets wgpu
        // enumerate non-conformant layers (dzn on WSL2) which support the
        // storage buffers and compute dispatches this crate needs.
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
                | wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        } else {
            wgpu::InstanceFlags::ALLOW_UNDERLYING_NONCOMPLIANT_ADAPTER
        };

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::VULKAN,
            flags,
            ..Default::default()
        });

        // Enumerate all Vulkan adapters. Tiered selection:
        //   1. DiscreteGpu / IntegratedGpu / VirtualGpu / Other (real
        //      hardware or a pass-through layer).
        //   2. Last resort: anything, software renderers included. The
        //      chosen adapter name is logged when verbose so a silent
        //      llvmpipe fallback is at least visible.
        let all_adapters: Vec<wgpu::Adapter> = instance
            .enumerate_adapters(wgpu::Backends::VULKAN)
            .into_iter()
            .collect();

        if all_adapters.is_empty() {
            return Err(GpuError::NoSuitableAdapter);
        }

        if options.verbose {
            for a in &all_adapters {
                let info = a.get_info();
                eprintln!(
                    "[convmat] Vulkan adapter: {} ({:?}, {:?})",
                    info.name, info.backend, info.device_type
                );
            }
        }

        let adapter = all_adapters
            .into_iter()
            .find(|a| {
                matches!(
                    a.get_info().device_type,
                    wgpu::DeviceType::DiscreteGpu
                        | wgpu::DeviceType::IntegratedGpu
                        | wgpu::DeviceType::VirtualGpu
                        | wgpu::DeviceType::Other
                )
            })
            .or_else(|| {
                instance
                    .enumerate_adapters(wgpu::Backends::VULKAN)
                    .into_iter()
                    .next()
            })
            .ok_or(GpuError::NoSuitableAdapter)?;

        let raw_info = adapter.get_info();
        let adapter_info = AdapterInfo {
            name: raw_info.name.clone(),
            vendor: raw_info.vendor,
            device: raw_info.device,
            device_type: raw_info.device_type,
            backend: raw_info.backend,
        };

        if options.verbose {
            eprintln!("[convmat] selected adapter: {adapter_info}");
        }

        let limits = wgpu::Limits::default();
        let max_invocations = limits.max_compute_invocations_per_workgroup;
        if options.tile.total() > max_invocations {
            return Err(GpuError::TileTooLarge {
                total: options.tile.total(),
                max: max_invocations,
            });
        }

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("convmat"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(GpuError::DeviceRequest)?;

        Ok(GpuDevice {
            device,
            queue,
            tile: options.tile,
            adapter_info,
            _instance: instance,
        })
    }

    /// Workgroup counts needed to cover an `out_rows` x `out_cols` output
    /// index space with the active tile size.
    ///
    /// Ceiling division, so every output element is covered even when the
    /// dimensions are not tile multiples; the shader guards the overhang:
    /// ```wgsl
    /// if gid.x >= dims.m || gid.y >= dims.n { return; }
    /// ```
    pub fn dispatch_size(&self, out_rows: u32, out_cols: u32) -> (u32, u32) {
        let dx = (out_rows + self.tile.x - 1) / self.tile.x;
        let dy = (out_cols + self.tile.y - 1) / self.tile.y;
        (dx, dy)
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, tile: {} }}",
            self.adapter_info, self.tile
        )
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors from device acquisition and dispatch.
///
/// The first three are fatal setup errors; `DimensionMismatch` and
/// `ReadbackFailed` are per-dispatch errors reported to the caller of that
/// dispatch without poisoning the context.
#[derive(Debug)]
pub enum GpuError {
    /// No Vulkan adapter found at all.
    NoSuitableAdapter,
    /// wgpu device request failed (driver issue, unsupported limits, ...).
    DeviceRequest(wgpu::RequestDeviceError),
    /// Requested tile exceeds the device's invocation limit.
    TileTooLarge { total: u32, max: u32 },
    /// Multiply called with incompatible shapes (A.cols != B.rows).
    DimensionMismatch {
        a_rows: usize,
        a_cols: usize,
        b_rows: usize,
        b_cols: usize,
    },
    /// The output buffer map failed; the dispatch produced no result.
    ReadbackFailed(wgpu::BufferAsyncError),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoSuitableAdapter => write!(
                f,
                "no Vulkan adapter found. Ensure Vulkan is installed and \
                 `vulkaninfo` lists a device."
            ),
            GpuError::DeviceRequest(e) => write!(f, "device request failed: {e}"),
            GpuError::TileTooLarge { total, max } => write!(
                f,
                "tile size {total} exceeds the device limit of {max} invocations"
            ),
            GpuError::DimensionMismatch {
                a_rows,
                a_cols,
                b_rows,
                b_cols,
            } => write!(
                f,
                "cannot multiply {a_rows}x{a_cols} by {b_rows}x{b_cols}: \
                 inner dimensions must agree"
            ),
            GpuError::ReadbackFailed(e) => write!(f, "output readback failed: {e}"),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceRequest(e) => Some(e),
            GpuError::ReadbackFailed(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Error types for flowsort.
//!
//! Configuration problems are caught once at setup and reported as
//! [`ConfigError`]. GPU acquisition and readback failures are [`GpuError`].
//! [`SimulationError`] wraps both for the builders that can hit either.

use std::fmt;

/// Errors detected while validating a configuration, before any frame runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// The particle (or element) count is zero.
    ZeroParticles,
    /// Block size must be a power of two in `1..=MAX_BLOCK_SIZE`.
    BlockSize(u32),
    /// The element count padded up to a whole number of blocks does not fit
    /// the 32-bit counters used by the sort.
    TooManyElements {
        /// Requested element count.
        len: usize,
        /// Configured block size.
        block_size: u32,
    },
    /// A caller-supplied buffer has the wrong number of records.
    BufferLength {
        /// Which buffer was rejected.
        buffer: &'static str,
        /// Required length (the configured particle count).
        expected: usize,
        /// Length that was supplied.
        actual: usize,
    },
    /// A scalar parameter is non-finite or outside its valid range.
    InvalidParameter {
        /// Parameter name as it appears on the builder.
        name: &'static str,
        /// Offending value.
        value: f32,
    },
    /// A direction vector is zero-length or non-finite.
    DegenerateDirection(&'static str),
    /// The key policy reports an empty key range.
    ZeroKeyRange,
    /// A replacement key policy needs more radix passes than were set up.
    KeyRangeTooLarge {
        /// Key range the sorter was built for.
        configured: u32,
        /// Key range of the rejected policy.
        requested: u32,
    },
    /// Neither a spawner nor a spawn buffer was provided.
    NoSpawner,
    /// The GPU backend only evaluates [`crate::DepthQuantizer`] keys.
    UnsupportedKeyPolicy,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroParticles => write!(f, "Particle count must be at least 1"),
            ConfigError::BlockSize(size) => write!(
                f,
                "Block size {} is invalid; it must be a power of two between 1 and {}",
                size,
                crate::sort::MAX_BLOCK_SIZE
            ),
            ConfigError::TooManyElements { len, block_size } => write!(
                f,
                "{} elements padded to blocks of {} overflow 32-bit sort counters",
                len, block_size
            ),
            ConfigError::BufferLength { buffer, expected, actual } => write!(
                f,
                "{} has {} records but the simulation is configured for {}",
                buffer, actual, expected
            ),
            ConfigError::InvalidParameter { name, value } => {
                write!(f, "Invalid value {} for parameter `{}`", value, name)
            }
            ConfigError::DegenerateDirection(name) => {
                write!(f, "Direction `{}` must be finite and non-zero", name)
            }
            ConfigError::ZeroKeyRange => write!(f, "Key policy must produce at least one key value"),
            ConfigError::KeyRangeTooLarge { configured, requested } => write!(
                f,
                "Key range {} exceeds the range {} the sorter was configured for",
                requested, configured
            ),
            ConfigError::NoSpawner => write!(
                f,
                "No spawn source provided. Use .with_spawner() or .with_spawn_buffer() to set one."
            ),
            ConfigError::UnsupportedKeyPolicy => write!(
                f,
                "The GPU backend requires a DepthQuantizer key policy. Use .with_depth_quantizer()."
            ),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Errors that can occur while acquiring or using the GPU.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
    /// wgpu reported a validation error while recording or submitting work.
    Validation(String),
    /// The element count needs more workgroups than one dispatch allows.
    DispatchTooLarge {
        /// Workgroups the dispatch would need.
        workgroups: u32,
        /// Device limit per dimension.
        limit: u32,
    },
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
            GpuError::Validation(msg) => write!(f, "GPU validation error: {}", msg),
            GpuError::DispatchTooLarge { workgroups, limit } => write!(
                f,
                "Dispatch needs {} workgroups but the device allows {}",
                workgroups, limit
            ),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors that can occur when building or stepping a simulation.
#[derive(Debug)]
pub enum SimulationError {
    /// The configuration was rejected.
    Config(ConfigError),
    /// GPU setup or readback failed.
    Gpu(GpuError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimulationError::Config(e) => write!(f, "Configuration error: {}", e),
            SimulationError::Gpu(e) => write!(f, "GPU error: {}", e),
        }
    }
}

impl std::error::Error for SimulationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SimulationError::Config(e) => Some(e),
            SimulationError::Gpu(e) => Some(e),
        }
    }
}

impl From<ConfigError> for SimulationError {
    fn from(e: ConfigError) -> Self {
        SimulationError::Config(e)
    }
}

impl From<GpuError> for SimulationError {
    fn from(e: GpuError) -> Self {
        SimulationError::Gpu(e)
    }
}

/// Reject non-finite values and values not strictly greater than zero.
pub(crate) fn require_positive(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

/// Reject non-finite values.
pub(crate) fn require_finite(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter { name, value })
    }
}

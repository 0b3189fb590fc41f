//! GPU radix sort.
//!
//! Same four phases per digit as the CPU sorter, one compute pass each. Every
//! radix pass has its own params buffer and bind groups, built once, so a
//! whole sort is recorded into one encoder with no buffer writes in between.

use wgpu::util::DeviceExt;

use super::{create_bind_group, create_compute_pipeline, create_storage_buffer, dispatch, GpuContext};
use crate::error::{ConfigError, GpuError, SimulationError};
use crate::shaders::{self, SortParams, WORKGROUP_SIZE};
use crate::sort::{pass_count, BlockLayout, Lanes, DIGIT_BITS};

/// Radix passes on the GPU.
///
/// Always even so the final result is back in buffer A, where the key pass
/// writes and the renderer reads. A surplus pass sorts on an all-zero digit
/// and leaves the order unchanged.
fn gpu_pass_count(key_range: u32) -> u32 {
    let passes = pass_count(key_range);
    if passes % 2 == 1 { passes + 1 } else { passes }
}

struct PassBindings {
    _params: wgpu::Buffer,
    flags: wgpu::BindGroup,
    resolve: wgpu::BindGroup,
    reorder: wgpu::BindGroup,
}

/// GPU resources for sorting a fixed number of `(key, index)` pairs.
#[allow(dead_code)] // Scratch buffers are only used through bind groups
pub struct RadixSortGpu {
    layout: BlockLayout,
    key_range: u32,

    keys_a: wgpu::Buffer,
    keys_b: wgpu::Buffer,
    values_a: wgpu::Buffer,
    values_b: wgpu::Buffer,
    flags: wgpu::Buffer,
    local_scan: wgpu::Buffer,
    block_totals: wgpu::Buffer,
    block_offsets: wgpu::Buffer,
    digit_base: wgpu::Buffer,

    flags_pipeline: wgpu::ComputePipeline,
    block_scan_pipeline: wgpu::ComputePipeline,
    resolve_pipeline: wgpu::ComputePipeline,
    reorder_pipeline: wgpu::ComputePipeline,

    block_scan_bind_group: wgpu::BindGroup,
    passes: Vec<PassBindings>,
}

impl RadixSortGpu {
    /// Allocate buffers and build pipelines for `len` keys in `0..key_range`.
    ///
    /// # Errors
    ///
    /// The same configuration errors as [`crate::RadixSorter::new`], plus
    /// [`GpuError::DispatchTooLarge`] if one block per workgroup needs more
    /// workgroups than the device allows.
    pub fn new(ctx: &GpuContext, len: usize, block_size: u32, key_range: u32) -> Result<Self, SimulationError> {
        let layout = BlockLayout::new(len, block_size)?;
        if key_range == 0 {
            return Err(ConfigError::ZeroKeyRange.into());
        }
        let num_blocks = layout.num_blocks as u32;
        ctx.check_dispatch(num_blocks)?;

        let device = &ctx.device;
        let lane_size = std::mem::size_of::<Lanes>();
        let key_bytes = (len * std::mem::size_of::<u32>()) as u64;
        let lane_bytes = (layout.padded_len * lane_size) as u64;
        let block_bytes = (layout.num_blocks * lane_size) as u64;

        let keys_a = create_storage_buffer(device, "Sort Keys A", key_bytes);
        let keys_b = create_storage_buffer(device, "Sort Keys B", key_bytes);
        let values_a = create_storage_buffer(device, "Sort Indices A", key_bytes);
        let values_b = create_storage_buffer(device, "Sort Indices B", key_bytes);
        let flags = create_storage_buffer(device, "Digit Flags", lane_bytes);
        let local_scan = create_storage_buffer(device, "Block Local Scan", lane_bytes);
        let block_totals = create_storage_buffer(device, "Block Totals", block_bytes);
        let block_offsets = create_storage_buffer(device, "Block Offsets", block_bytes);
        let digit_base = create_storage_buffer(device, "Digit Base", lane_size as u64);

        let flags_pipeline = create_compute_pipeline(device, &shaders::flags_shader(), "Radix Flags");
        let block_scan_pipeline =
            create_compute_pipeline(device, &shaders::block_scan_shader(block_size), "Radix Block Scan");
        let resolve_pipeline = create_compute_pipeline(device, &shaders::resolve_shader(), "Radix Resolve");
        let reorder_pipeline = create_compute_pipeline(device, &shaders::reorder_shader(), "Radix Reorder");

        let block_scan_bind_group = create_bind_group(
            device,
            &block_scan_pipeline,
            "Block Scan Bind Group",
            &[&flags, &local_scan, &block_totals],
        );

        let passes = (0..gpu_pass_count(key_range))
            .map(|pass| {
                let params = SortParams {
                    len: len as u32,
                    shift: pass * DIGIT_BITS,
                    num_blocks,
                    block_size,
                };
                let params_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("Sort Params"),
                    contents: bytemuck::cast_slice(&[params]),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

                let (keys_in, values_in, keys_out, values_out) = if pass % 2 == 0 {
                    (&keys_a, &values_a, &keys_b, &values_b)
                } else {
                    (&keys_b, &values_b, &keys_a, &values_a)
                };

                PassBindings {
                    flags: create_bind_group(
                        device,
                        &flags_pipeline,
                        "Flags Bind Group",
                        &[keys_in, &flags, &params_buffer],
                    ),
                    resolve: create_bind_group(
                        device,
                        &resolve_pipeline,
                        "Resolve Bind Group",
                        &[&block_totals, &block_offsets, &digit_base, &params_buffer],
                    ),
                    reorder: create_bind_group(
                        device,
                        &reorder_pipeline,
                        "Reorder Bind Group",
                        &[
                            keys_in,
                            values_in,
                            keys_out,
                            values_out,
                            &local_scan,
                            &block_offsets,
                            &digit_base,
                            &params_buffer,
                        ],
                    ),
                    _params: params_buffer,
                }
            })
            .collect::<Vec<_>>();

        log::debug!(
            "RadixSortGpu: {} keys, {} blocks of {}, {} passes",
            len,
            num_blocks,
            block_size,
            passes.len()
        );

        Ok(Self {
            layout,
            key_range,
            keys_a,
            keys_b,
            values_a,
            values_b,
            flags,
            local_scan,
            block_totals,
            block_offsets,
            digit_base,
            flags_pipeline,
            block_scan_pipeline,
            resolve_pipeline,
            reorder_pipeline,
            block_scan_bind_group,
            passes,
        })
    }

    /// Number of pairs sorted.
    pub fn len(&self) -> usize {
        self.layout.len
    }

    /// Always false; a sorter holds at least one element.
    pub fn is_empty(&self) -> bool {
        self.layout.len == 0
    }

    /// Exclusive upper bound on accepted keys.
    pub fn key_range(&self) -> u32 {
        self.key_range
    }

    /// Radix passes recorded per sort.
    pub fn passes(&self) -> u32 {
        self.passes.len() as u32
    }

    /// Keys in; sorted keys out.
    pub fn keys_buffer(&self) -> &wgpu::Buffer {
        &self.keys_a
    }

    /// Particle indices in (expected to be `0..len`); draw order out.
    pub fn permutation_buffer(&self) -> &wgpu::Buffer {
        &self.values_a
    }

    /// Record every sort pass.
    ///
    /// Reads pairs from [`RadixSortGpu::keys_buffer`] and
    /// [`RadixSortGpu::permutation_buffer`] and leaves the sorted pairs there.
    pub fn execute(&self, encoder: &mut wgpu::CommandEncoder) {
        let num_blocks = self.layout.num_blocks as u32;
        let flag_groups = (self.layout.padded_len as u32).div_ceil(WORKGROUP_SIZE);
        let element_groups = (self.layout.len as u32).div_ceil(WORKGROUP_SIZE);

        for bindings in &self.passes {
            dispatch(encoder, "Radix Flags", &self.flags_pipeline, &bindings.flags, flag_groups);
            dispatch(
                encoder,
                "Radix Block Scan",
                &self.block_scan_pipeline,
                &self.block_scan_bind_group,
                num_blocks,
            );
            dispatch(encoder, "Radix Resolve", &self.resolve_pipeline, &bindings.resolve, 1);
            dispatch(encoder, "Radix Reorder", &self.reorder_pipeline, &bindings.reorder, element_groups);
        }
    }

    /// Upload `keys`, sort them, and read back the permutation.
    ///
    /// # Panics
    ///
    /// Panics if `keys.len()` differs from [`RadixSortGpu::len`].
    pub fn sort(&self, ctx: &GpuContext, keys: &[u32]) -> Result<Vec<u32>, GpuError> {
        assert_eq!(keys.len(), self.len(), "RadixSortGpu was built for {} keys", self.len());

        let identity: Vec<u32> = (0..keys.len() as u32).collect();
        ctx.queue.write_buffer(&self.keys_a, 0, bytemuck::cast_slice(keys));
        ctx.queue.write_buffer(&self.values_a, 0, bytemuck::cast_slice(&identity));

        ctx.submit_checked("Radix Sort Encoder", |encoder| self.execute(encoder))?;
        self.read_permutation(ctx)
    }

    /// Read back the permutation from the last sort.
    pub fn read_permutation(&self, ctx: &GpuContext) -> Result<Vec<u32>, GpuError> {
        ctx.read_buffer(&self.values_a, self.len())
    }

    /// Read back the sorted keys from the last sort.
    pub fn read_sorted_keys(&self, ctx: &GpuContext) -> Result<Vec<u32>, GpuError> {
        ctx.read_buffer(&self.keys_a, self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_pass_count_is_even() {
        assert_eq!(gpu_pass_count(1), 2);
        assert_eq!(gpu_pass_count(4), 2);
        assert_eq!(gpu_pass_count(16), 2);
        assert_eq!(gpu_pass_count(64), 4);
        assert_eq!(gpu_pass_count(1024), 6);
        assert_eq!(gpu_pass_count(u32::MAX), 16);
    }
}

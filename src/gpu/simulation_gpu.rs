//! GPU frame driver.

use wgpu::util::DeviceExt;

use super::{AdvectGpu, GpuContext, RadixSortGpu};
use crate::config::SimulationConfig;
use crate::error::{ConfigError, GpuError, SimulationError};
use crate::field::VectorField;
use crate::particle::{Particle, SpawnDescriptor};
use crate::sort_key::{DepthQuantizer, KeyPolicy};

/// A simulation whose buffers live on the GPU.
///
/// Built with [`crate::SimulationBuilder::build_gpu`]. Each
/// [`GpuSimulation::step`] records advect, keys and every sort pass into one
/// submission; nothing is read back unless asked for.
pub struct GpuSimulation {
    ctx: GpuContext,
    config: SimulationConfig,
    field: VectorField,
    quantizer: DepthQuantizer,
    particle_buffer: wgpu::Buffer,
    spawn_buffer: wgpu::Buffer,
    advect: AdvectGpu,
    sorter: RadixSortGpu,
    time: f32,
    frame: u64,
}

impl GpuSimulation {
    pub(crate) fn new(
        ctx: GpuContext,
        config: SimulationConfig,
        field: VectorField,
        quantizer: DepthQuantizer,
        particles: &[Particle],
        spawn: &[SpawnDescriptor],
    ) -> Result<Self, SimulationError> {
        let len = config.particle_count;
        let device = &ctx.device;

        let particle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Buffer"),
            contents: bytemuck::cast_slice(particles),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::VERTEX
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
        });
        let spawn_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Spawn Buffer"),
            contents: bytemuck::cast_slice(spawn),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
        });

        let sorter = RadixSortGpu::new(&ctx, len, config.block_size, quantizer.key_range())?;
        let advect = AdvectGpu::new(
            &ctx,
            &particle_buffer,
            &spawn_buffer,
            sorter.keys_buffer(),
            sorter.permutation_buffer(),
            len as u32,
        )?;

        log::debug!("GpuSimulation: {} particles, {} sort passes", len, sorter.passes());

        Ok(Self {
            ctx,
            config,
            field,
            quantizer,
            particle_buffer,
            spawn_buffer,
            advect,
            sorter,
            time: 0.0,
            frame: 0,
        })
    }

    /// Run one frame on the GPU.
    ///
    /// # Errors
    ///
    /// Returns [`GpuError::Validation`] if wgpu rejects the recorded work.
    pub fn step(&mut self) -> Result<(), GpuError> {
        self.advect.update(
            &self.ctx.queue,
            &self.field,
            &self.quantizer,
            self.config.timestep,
            self.time,
        );

        let advect = &self.advect;
        let sorter = &self.sorter;
        self.ctx.submit_checked("Frame Encoder", |encoder| {
            advect.execute(encoder);
            sorter.execute(encoder);
        })?;

        self.time += self.config.timestep;
        self.frame += 1;
        log::trace!("GPU frame {} submitted", self.frame);
        Ok(())
    }

    /// Replace the spawn buffer contents.
    ///
    /// # Errors
    ///
    /// Rejects a slice whose length is not the particle count.
    pub fn write_spawn_buffer(&self, spawn: &[SpawnDescriptor]) -> Result<(), ConfigError> {
        if spawn.len() != self.config.particle_count {
            return Err(ConfigError::BufferLength {
                buffer: "spawn buffer",
                expected: self.config.particle_count,
                actual: spawn.len(),
            });
        }
        self.ctx
            .queue
            .write_buffer(&self.spawn_buffer, 0, bytemuck::cast_slice(spawn));
        Ok(())
    }

    /// Read the particle buffer back, in slot order.
    pub fn read_particles(&self) -> Result<Vec<Particle>, GpuError> {
        self.ctx.read_buffer(&self.particle_buffer, self.config.particle_count)
    }

    /// Read the draw order from the last frame.
    pub fn read_permutation(&self) -> Result<Vec<u32>, GpuError> {
        self.sorter.read_permutation(&self.ctx)
    }

    /// Read the sorted keys from the last frame.
    pub fn read_sorted_keys(&self) -> Result<Vec<u32>, GpuError> {
        self.sorter.read_sorted_keys(&self.ctx)
    }

    /// Particle records, `array<vec4<f32>>`, for binding in the renderer.
    pub fn particle_buffer(&self) -> &wgpu::Buffer {
        &self.particle_buffer
    }

    /// Draw order, `array<u32>`, for binding in the renderer.
    pub fn permutation_buffer(&self) -> &wgpu::Buffer {
        self.sorter.permutation_buffer()
    }

    /// The device and queue this simulation runs on.
    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Simulated time in seconds.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Frames stepped so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }
}

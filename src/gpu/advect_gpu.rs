//! Advect and key passes.

use wgpu::util::DeviceExt;

use super::{create_bind_group, create_compute_pipeline, dispatch, GpuContext};
use crate::error::GpuError;
use crate::field::VectorField;
use crate::shaders::{self, AdvectParams, KeyParams, WORKGROUP_SIZE};
use crate::sort_key::DepthQuantizer;

/// Uniform block for one advect dispatch.
fn advect_params(field: &VectorField, timestep: f32, time: f32, len: u32) -> AdvectParams {
    let (obstacle_center, obstacle_radius, obstacle_influence, has_obstacle) = match &field.obstacle {
        Some(o) => (o.center.to_array(), o.radius, o.influence, 1),
        None => ([0.0; 3], 0.0, 1.0, 0),
    };
    AdvectParams {
        origin: field.potential.origin.to_array(),
        strength: field.potential.strength,
        axis: field.potential.axis.to_array(),
        epsilon: field.potential.epsilon,
        drift: field.noise.drift.to_array(),
        noise_scale: field.noise.scale,
        noise_strength: field.noise.strength,
        timestep,
        time,
        len,
        obstacle_center,
        obstacle_radius,
        obstacle_influence,
        has_obstacle,
        _pad0: 0,
        _pad1: 0,
    }
}

/// Pipelines and bindings that move particles and compute their keys.
///
/// The key pass writes into the sorter's input buffers, so advect, keys and
/// sort can be recorded back to back in one encoder.
pub struct AdvectGpu {
    len: u32,
    advect_params: wgpu::Buffer,
    key_params: wgpu::Buffer,
    advect_pipeline: wgpu::ComputePipeline,
    key_pipeline: wgpu::ComputePipeline,
    advect_bind_group: wgpu::BindGroup,
    key_bind_group: wgpu::BindGroup,
}

impl AdvectGpu {
    /// Bind the particle and spawn buffers (`len` records each) and the key
    /// and index buffers the sort reads.
    pub fn new(
        ctx: &GpuContext,
        particles: &wgpu::Buffer,
        spawn: &wgpu::Buffer,
        keys: &wgpu::Buffer,
        values: &wgpu::Buffer,
        len: u32,
    ) -> Result<Self, GpuError> {
        ctx.check_dispatch(len.div_ceil(WORKGROUP_SIZE))?;
        let device = &ctx.device;

        let advect_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Advect Params"),
            contents: bytemuck::bytes_of(&AdvectParams::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let key_params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Key Params"),
            contents: bytemuck::bytes_of(&KeyParams::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let advect_pipeline = create_compute_pipeline(device, &shaders::advect_shader(), "Advect");
        let key_pipeline = create_compute_pipeline(device, shaders::KEYS_WGSL, "Depth Keys");

        let advect_bind_group = create_bind_group(
            device,
            &advect_pipeline,
            "Advect Bind Group",
            &[particles, spawn, &advect_params],
        );
        let key_bind_group = create_bind_group(
            device,
            &key_pipeline,
            "Key Bind Group",
            &[particles, keys, values, &key_params],
        );

        Ok(Self {
            len,
            advect_params,
            key_params,
            advect_pipeline,
            key_pipeline,
            advect_bind_group,
            key_bind_group,
        })
    }

    /// Upload the uniforms for the next [`AdvectGpu::execute`].
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        field: &VectorField,
        quantizer: &DepthQuantizer,
        timestep: f32,
        time: f32,
    ) {
        let advect = advect_params(field, timestep, time, self.len);
        queue.write_buffer(&self.advect_params, 0, bytemuck::bytes_of(&advect));
        queue.write_buffer(&self.key_params, 0, bytemuck::bytes_of(&quantizer.gpu_params(self.len)));
    }

    /// Record the advect pass followed by the key pass.
    pub fn execute(&self, encoder: &mut wgpu::CommandEncoder) {
        let workgroups = self.len.div_ceil(WORKGROUP_SIZE);
        dispatch(encoder, "Advect", &self.advect_pipeline, &self.advect_bind_group, workgroups);
        dispatch(encoder, "Depth Keys", &self.key_pipeline, &self.key_bind_group, workgroups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::SphereObstacle;
    use glam::Vec3;

    #[test]
    fn test_advect_params_carry_field() {
        let field = VectorField::new().with_obstacle(SphereObstacle::new(Vec3::new(1.0, 2.0, 3.0), 0.5));
        let params = advect_params(&field, 0.01, 2.0, 77);
        assert_eq!(params.has_obstacle, 1);
        assert_eq!(params.obstacle_center, [1.0, 2.0, 3.0]);
        assert_eq!(params.axis, [0.0, 1.0, 0.0]);
        assert_eq!(params.len, 77);

        let params = advect_params(&VectorField::new(), 0.01, 0.0, 1);
        assert_eq!(params.has_obstacle, 0);
        assert!(params.obstacle_influence > 0.0);
    }
}

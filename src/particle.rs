//! Particle records shared with the renderer and the emitter.
//!
//! A particle is a single 16-byte record: position in `xyz`, remaining
//! lifetime in `w`. The same layout is used for spawn descriptors so that a
//! respawn is a plain record copy, and on the GPU both buffers are bound as
//! `array<vec4<f32>>`.

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

/// One simulated particle: position plus remaining lifetime in seconds.
///
/// `#[repr(C)]` with no padding, so a `&[Particle]` can be uploaded with
/// `bytemuck::cast_slice` and read by WGSL as `vec4<f32>`.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// World-space position.
    pub position: Vec3,
    /// Remaining lifetime. Negative means the particle has expired.
    pub lifetime: f32,
}

/// Replacement record written over an expired particle.
///
/// Same layout as [`Particle`]; the emitter fills one per particle slot.
pub type SpawnDescriptor = Particle;

/// Which transition a particle takes on its next step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParticleState {
    /// `lifetime >= 0`: the particle is integrated through the flow.
    Alive,
    /// `lifetime < 0` (or NaN): the particle is replaced by its spawn record.
    Expired,
}

impl Particle {
    /// Create a particle at `position` with `lifetime` seconds left.
    #[inline]
    pub const fn new(position: Vec3, lifetime: f32) -> Self {
        Self { position, lifetime }
    }

    /// Current state, decided from the lifetime alone.
    #[inline]
    pub fn state(&self) -> ParticleState {
        if self.lifetime >= 0.0 {
            ParticleState::Alive
        } else {
            ParticleState::Expired
        }
    }

    /// Shorthand for `state() == ParticleState::Expired`.
    #[inline]
    pub fn is_expired(&self) -> bool {
        self.state() == ParticleState::Expired
    }
}

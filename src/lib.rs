//! # flowsort
//!
//! Advects a large particle population through a divergence-free flow field
//! and depth-orders it every frame for alpha-blended rendering.
//!
//! Each frame runs three phases over `N` particles:
//!
//! 1. **Advect**: every particle either integrates one explicit Euler step
//!    through the [`VectorField`] or, once its lifetime is spent, is replaced
//!    by its [`SpawnDescriptor`].
//! 2. **Keys**: a [`KeyPolicy`] (usually a [`DepthQuantizer`]) turns each
//!    position into a `u32` sort key.
//! 3. **Sort**: a stable 2-bit LSD radix sort orders `(key, index)` pairs and
//!    yields a permutation the renderer draws through. The particle buffer
//!    itself is never reordered.
//!
//! The same pipeline runs on the CPU with `rayon` ([`Simulation`]) or as
//! `wgpu` compute passes ([`GpuSimulation`]).
//!
//! ## Quick Start
//!
//! ```ignore
//! use flowsort::prelude::*;
//!
//! let mut sim = Simulation::builder()
//!     .with_particle_count(20_000)
//!     .with_lifetime(4.0)
//!     .with_field(
//!         VectorField::new()
//!             .with_potential(PotentialFlow::new(0.5, 1e-3))
//!             .with_curl_noise(CurlNoise::new(1.5, 0.4)),
//!     )
//!     .with_depth_quantizer(DepthQuantizer::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO).back_to_front())
//!     .with_spawner(|ctx| ctx.random_in_sphere(0.5))
//!     .build()?;
//!
//! loop {
//!     let order = sim.step();
//!     // draw sim.particles()[order[i]] for i in 0..N
//! }
//! ```
//!
//! ## The sort
//!
//! Keys are sorted two bits at a time, least significant digit first. Each
//! pass has four phases, each a full barrier:
//!
//! | Phase | Work |
//! |-------|------|
//! | Flag | one-hot `[u32; 4]` of each element's digit |
//! | Block scan | exclusive prefix sum per block, plus block totals |
//! | Resolve | block offsets and per-digit bases |
//! | Reorder | scatter each pair to `base + offset + local` |
//!
//! Arrays whose length is not a multiple of the block size are padded
//! virtually with a maximal sentinel digit that sorts last and is never
//! written out.

pub mod advect;
pub mod config;
pub mod error;
pub mod field;
pub mod gpu;
pub mod noise;
pub mod particle;
pub mod shaders;
mod simulation;
pub mod sort;
pub mod sort_key;
mod spawn;

pub use advect::{ParticleAdvector, StepStats, Transition};
pub use config::SimulationConfig;
pub use error::{ConfigError, GpuError, SimulationError};
pub use field::{CurlNoise, PotentialFlow, SphereObstacle, VectorField};
pub use glam::{Vec3, Vec4};
pub use gpu::{AdvectGpu, GpuContext, GpuSimulation, RadixSortGpu};
pub use particle::{Particle, ParticleState, SpawnDescriptor};
pub use simulation::{Simulation, SimulationBuilder, Spawner};
pub use sort::{radix_sort, PingPong, RadixSorter};
pub use sort_key::{extract_keys, DepthQuantizer, KeyPolicy};
pub use spawn::SpawnContext;

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use flowsort::prelude::*;
/// ```
pub mod prelude {
    pub use crate::field::{CurlNoise, PotentialFlow, SphereObstacle, VectorField};
    pub use crate::particle::{Particle, SpawnDescriptor};
    pub use crate::simulation::{Simulation, SimulationBuilder};
    pub use crate::sort::RadixSorter;
    pub use crate::sort_key::{DepthQuantizer, KeyPolicy};
    pub use crate::spawn::SpawnContext;
    pub use crate::{ConfigError, SimulationError};
    pub use crate::{Vec3, Vec4};
}

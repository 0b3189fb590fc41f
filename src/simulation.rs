//! Simulation builder and frame driver.
//!
//! A [`Simulation`] owns the particle, spawn, key and sort buffers and runs
//! one frame per [`Simulation::step`]: advect, extract keys, sort. Everything
//! is checked once in [`SimulationBuilder::build`]; a built simulation cannot
//! fail.

use glam::Vec3;
use rayon::prelude::*;

use crate::advect::{ParticleAdvector, StepStats};
use crate::config::SimulationConfig;
use crate::error::{ConfigError, SimulationError};
use crate::field::VectorField;
use crate::gpu::{GpuContext, GpuSimulation};
use crate::particle::{Particle, SpawnDescriptor};
use crate::sort::RadixSorter;
use crate::sort_key::{extract_keys, DepthQuantizer, KeyPolicy};
use crate::spawn::SpawnContext;

/// Spawner callback: where slot `ctx.index` (re)appears.
pub type Spawner = Box<dyn Fn(&mut SpawnContext) -> Vec3 + Send + Sync>;

/// A particle simulation builder.
///
/// Use method chaining to configure, then call `.build()`.
pub struct SimulationBuilder {
    config: SimulationConfig,
    field: VectorField,
    key_policy: Option<Box<dyn KeyPolicy>>,
    spawner: Option<Spawner>,
    spawn_buffer: Option<Vec<SpawnDescriptor>>,
    particles: Option<Vec<Particle>>,
}

impl Default for SimulationBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SimulationConfig::default(),
            field: VectorField::default(),
            key_policy: None,
            spawner: None,
            spawn_buffer: None,
            particles: None,
        }
    }

    /// Set the number of particle slots.
    pub fn with_particle_count(mut self, count: usize) -> Self {
        self.config.particle_count = count;
        self
    }

    /// Set the lifetime given to spawned particles.
    pub fn with_lifetime(mut self, seconds: f32) -> Self {
        self.config.lifetime = seconds;
        self
    }

    /// Set the integration timestep.
    pub fn with_timestep(mut self, seconds: f32) -> Self {
        self.config.timestep = seconds;
        self
    }

    /// Set the radix sort block size.
    pub fn with_block_size(mut self, block_size: u32) -> Self {
        self.config.block_size = block_size;
        self
    }

    /// Seed for the spawner RNGs.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Set the flow field.
    pub fn with_field(mut self, field: VectorField) -> Self {
        self.field = field;
        self
    }

    /// Sort by quantized view depth.
    pub fn with_depth_quantizer(mut self, quantizer: DepthQuantizer) -> Self {
        self.key_policy = Some(Box::new(quantizer));
        self
    }

    /// Sort by a custom key. CPU backend only.
    pub fn with_key_policy(mut self, policy: Box<dyn KeyPolicy>) -> Self {
        self.key_policy = Some(policy);
        self
    }

    /// Generate the spawn buffer from a position function.
    ///
    /// Spawned particles get the configured lifetime.
    pub fn with_spawner<F>(mut self, spawner: F) -> Self
    where
        F: Fn(&mut SpawnContext) -> Vec3 + Send + Sync + 'static,
    {
        self.spawner = Some(Box::new(spawner));
        self
    }

    /// Use an explicit spawn buffer. Takes precedence over a spawner.
    pub fn with_spawn_buffer(mut self, spawn: Vec<SpawnDescriptor>) -> Self {
        self.spawn_buffer = Some(spawn);
        self
    }

    /// Use explicit initial particle states instead of staggered copies of
    /// the spawn buffer.
    pub fn with_particles(mut self, particles: Vec<Particle>) -> Self {
        self.particles = Some(particles);
        self
    }

    /// Validate the configuration and build a CPU simulation.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found: bad counts or block size,
    /// non-positive timestep or lifetime, bad field or key parameters, a
    /// missing spawn source, or caller buffers of the wrong length.
    pub fn build(self) -> Result<Simulation, ConfigError> {
        let parts = self.prepare()?;
        let sorter = RadixSorter::new(
            parts.config.particle_count,
            parts.config.block_size,
            parts.key_policy.key_range(),
        )?;

        log::debug!(
            "Simulation: {} particles, dt={}, {} sort passes",
            parts.config.particle_count,
            parts.config.timestep,
            sorter.passes()
        );

        Ok(Simulation {
            advector: ParticleAdvector::new(parts.field, parts.config.timestep),
            keys: vec![0; parts.config.particle_count],
            config: parts.config,
            key_policy: parts.key_policy,
            spawner: parts.spawner,
            sorter,
            particles: parts.particles,
            spawn: parts.spawn,
            time: 0.0,
            frame: 0,
            refreshes: 0,
            last_stats: StepStats::default(),
        })
    }

    /// Validate the configuration and build a GPU simulation on `ctx`.
    ///
    /// The key policy must be a [`DepthQuantizer`].
    pub fn build_gpu(self, ctx: GpuContext) -> Result<GpuSimulation, SimulationError> {
        let parts = self.prepare()?;
        let quantizer = *parts
            .key_policy
            .as_depth_quantizer()
            .ok_or(ConfigError::UnsupportedKeyPolicy)?;
        GpuSimulation::new(
            ctx,
            parts.config,
            parts.field,
            quantizer,
            &parts.particles,
            &parts.spawn,
        )
    }

    fn prepare(self) -> Result<Parts, ConfigError> {
        let config = self.config;
        config.validate()?;
        self.field.validate()?;

        let key_policy = self.key_policy.unwrap_or_else(|| {
            Box::new(DepthQuantizer::looking_at(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO).with_range(0.1, 10.0))
        });
        key_policy.validate()?;

        let n = config.particle_count;
        let spawn = match (self.spawn_buffer, &self.spawner) {
            (Some(buffer), _) => {
                check_length("spawn buffer", n, buffer.len())?;
                buffer
            }
            (None, Some(spawner)) => generate_spawn(spawner, &config, config.seed),
            (None, None) => return Err(ConfigError::NoSpawner),
        };

        let degenerate = spawn
            .iter()
            .filter(|s| !s.position.is_finite() || !s.lifetime.is_finite())
            .count();
        if degenerate > 0 {
            log::warn!("{} spawn records have non-finite position or lifetime", degenerate);
        }

        let particles = match self.particles {
            Some(particles) => {
                check_length("particle buffer", n, particles.len())?;
                particles
            }
            None => staggered(&spawn),
        };

        Ok(Parts {
            config,
            field: self.field,
            key_policy,
            spawner: self.spawner,
            particles,
            spawn,
        })
    }
}

struct Parts {
    config: SimulationConfig,
    field: VectorField,
    key_policy: Box<dyn KeyPolicy>,
    spawner: Option<Spawner>,
    particles: Vec<Particle>,
    spawn: Vec<SpawnDescriptor>,
}

fn check_length(buffer: &'static str, expected: usize, actual: usize) -> Result<(), ConfigError> {
    if expected == actual {
        Ok(())
    } else {
        Err(ConfigError::BufferLength { buffer, expected, actual })
    }
}

fn generate_spawn(spawner: &Spawner, config: &SimulationConfig, seed: u64) -> Vec<SpawnDescriptor> {
    let count = config.particle_count as u32;
    (0..count)
        .into_par_iter()
        .map(|i| {
            let mut ctx = SpawnContext::new(i, count, seed);
            SpawnDescriptor::new(spawner(&mut ctx), config.lifetime)
        })
        .collect()
}

/// Initial particles: the spawn records with lifetimes spread evenly over
/// `(0, lifetime)`, so respawns are spread across frames instead of all
/// landing on the same one.
fn staggered(spawn: &[SpawnDescriptor]) -> Vec<Particle> {
    let n = spawn.len() as f32;
    spawn
        .iter()
        .enumerate()
        .map(|(i, s)| Particle::new(s.position, s.lifetime * (i as f32 + 0.5) / n))
        .collect()
}

/// A built CPU simulation.
pub struct Simulation {
    config: SimulationConfig,
    advector: ParticleAdvector,
    key_policy: Box<dyn KeyPolicy>,
    spawner: Option<Spawner>,
    sorter: RadixSorter,
    particles: Vec<Particle>,
    spawn: Vec<SpawnDescriptor>,
    keys: Vec<u32>,
    time: f32,
    frame: u64,
    refreshes: u64,
    last_stats: StepStats,
}

impl Simulation {
    /// Start configuring a simulation.
    pub fn builder() -> SimulationBuilder {
        SimulationBuilder::new()
    }

    /// Run one frame and return the draw order.
    ///
    /// Advects every particle, recomputes the keys from the new positions
    /// and sorts them. The returned slice holds particle indices in key
    /// order.
    pub fn step(&mut self) -> &[u32] {
        self.last_stats = self.advector.step(&mut self.particles, &self.spawn, self.time);
        extract_keys(self.key_policy.as_ref(), &self.particles, &mut self.keys);
        self.sorter.sort(&self.keys);

        self.time += self.config.timestep;
        self.frame += 1;
        self.sorter.permutation()
    }

    /// Particle buffer, in slot order.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Particles in the order of the last sort.
    pub fn sorted_particles(&self) -> impl Iterator<Item = &Particle> + '_ {
        self.sorter
            .permutation()
            .iter()
            .map(move |&i| &self.particles[i as usize])
    }

    /// Spawn buffer.
    pub fn spawn_buffer(&self) -> &[SpawnDescriptor] {
        &self.spawn
    }

    /// Mutable spawn buffer, for emitter policies that move the spawn points.
    pub fn spawn_buffer_mut(&mut self) -> &mut [SpawnDescriptor] {
        &mut self.spawn
    }

    /// Regenerate the spawn buffer with the builder's spawner.
    ///
    /// Each call draws a fresh set of positions (the seed is mixed with a
    /// count of refreshes so far). Does nothing if the simulation was built
    /// from an explicit spawn buffer.
    pub fn refresh_spawn_buffer(&mut self) {
        if let Some(spawner) = &self.spawner {
            self.refreshes += 1;
            let seed = self.config.seed ^ self.refreshes.wrapping_mul(0xD1B5_4A32_D192_ED03);
            self.spawn = generate_spawn(spawner, &self.config, seed);
        }
    }

    /// Keys computed in the last frame, index-aligned with the particles.
    pub fn keys(&self) -> &[u32] {
        &self.keys
    }

    /// Draw order from the last frame.
    pub fn permutation(&self) -> &[u32] {
        self.sorter.permutation()
    }

    /// Replace the key policy.
    ///
    /// # Errors
    ///
    /// The sorter's pass count is fixed at build time, so a policy with a
    /// larger key range than the current one is rejected.
    pub fn set_key_policy(&mut self, policy: Box<dyn KeyPolicy>) -> Result<(), ConfigError> {
        policy.validate()?;
        if policy.key_range() > self.sorter.key_range() {
            return Err(ConfigError::KeyRangeTooLarge {
                configured: self.sorter.key_range(),
                requested: policy.key_range(),
            });
        }
        self.key_policy = policy;
        Ok(())
    }

    /// The flow field.
    pub fn field(&self) -> &VectorField {
        self.advector.field()
    }

    /// Configuration the simulation was built with.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Simulated time in seconds.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Frames stepped so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Transition counts of the last frame.
    pub fn last_stats(&self) -> StepStats {
        self.last_stats
    }
}

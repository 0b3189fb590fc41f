//! Per-particle integrate-or-respawn step.
//!
//! Each particle is independent: an expired particle is overwritten by its
//! spawn record, a live one takes one explicit Euler step through the
//! [`VectorField`] and loses `dt` of lifetime. The whole buffer is processed
//! as one parallel phase; a particle only ever writes its own slot.

use rayon::prelude::*;

use crate::field::VectorField;
use crate::particle::{Particle, ParticleState, SpawnDescriptor};

/// What happened to one particle during a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// Moved through the field; lifetime decreased by `dt`.
    Integrated,
    /// Replaced by its spawn record; not integrated this step.
    Respawned,
}

/// Summary of one advection step.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepStats {
    /// Particles that took an Euler step.
    pub integrated: usize,
    /// Particles that were replaced by their spawn record.
    pub respawned: usize,
}

impl StepStats {
    fn record(transition: Transition) -> Self {
        match transition {
            Transition::Integrated => Self { integrated: 1, respawned: 0 },
            Transition::Respawned => Self { integrated: 0, respawned: 1 },
        }
    }

    fn merge(self, other: Self) -> Self {
        Self {
            integrated: self.integrated + other.integrated,
            respawned: self.respawned + other.respawned,
        }
    }

    /// Total particles processed.
    pub fn total(&self) -> usize {
        self.integrated + self.respawned
    }
}

/// Moves particles through a [`VectorField`] with a fixed timestep.
#[derive(Clone, Copy, Debug)]
pub struct ParticleAdvector {
    field: VectorField,
    timestep: f32,
}

impl ParticleAdvector {
    /// Create an advector. The field and timestep are assumed validated.
    pub fn new(field: VectorField, timestep: f32) -> Self {
        Self { field, timestep }
    }

    /// The field particles are advected through.
    pub fn field(&self) -> &VectorField {
        &self.field
    }

    /// Integration timestep in seconds.
    pub fn timestep(&self) -> f32 {
        self.timestep
    }

    /// Advance a single particle.
    ///
    /// The state is decided from the lifetime at the start of the step, so a
    /// particle that expires now is only respawned on the next call.
    #[inline]
    pub fn advance(&self, particle: &mut Particle, spawn: &SpawnDescriptor, time: f32) -> Transition {
        match particle.state() {
            ParticleState::Expired => {
                *particle = *spawn;
                Transition::Respawned
            }
            ParticleState::Alive => {
                let velocity = self.field.sample(particle.position, time);
                particle.position += velocity * self.timestep;
                particle.lifetime -= self.timestep;
                Transition::Integrated
            }
        }
    }

    /// Advance every particle in parallel.
    ///
    /// # Panics
    ///
    /// Panics if `particles` and `spawn` differ in length.
    pub fn step(&self, particles: &mut [Particle], spawn: &[SpawnDescriptor], time: f32) -> StepStats {
        assert_eq!(
            particles.len(),
            spawn.len(),
            "particle and spawn buffers must be index-aligned"
        );

        let stats = particles
            .par_iter_mut()
            .zip(spawn.par_iter())
            .map(|(particle, spawn)| StepStats::record(self.advance(particle, spawn, time)))
            .reduce(StepStats::default, StepStats::merge);

        log::trace!(
            "advect t={:.3}: {} integrated, {} respawned",
            time,
            stats.integrated,
            stats.respawned
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{CurlNoise, PotentialFlow};
    use glam::Vec3;

    fn advector() -> ParticleAdvector {
        ParticleAdvector::new(VectorField::new(), 0.01)
    }

    #[test]
    fn test_expired_particle_copies_spawn_exactly() {
        let adv = advector();
        let spawn = Particle::new(Vec3::new(0.25, -1.5, 3.0), 2.5);
        let mut p = Particle::new(Vec3::new(9.0, 9.0, 9.0), -0.004);

        assert_eq!(adv.advance(&mut p, &spawn, 1.0), Transition::Respawned);
        assert_eq!(p, spawn);
    }

    #[test]
    fn test_alive_particle_takes_euler_step() {
        let adv = advector();
        let start = Vec3::new(0.7, 0.2, -0.4);
        let mut p = Particle::new(start, 1.0);
        let spawn = Particle::new(Vec3::ZERO, 5.0);

        assert_eq!(adv.advance(&mut p, &spawn, 0.5), Transition::Integrated);
        let expected = start + adv.field().sample(start, 0.5) * 0.01;
        assert!((p.position - expected).length() < 1e-6);
        assert!((p.lifetime - 0.99).abs() < 1e-6);
    }

    #[test]
    fn test_zero_lifetime_integrates_then_expires() {
        let adv = advector();
        let spawn = Particle::new(Vec3::ONE, 3.0);
        let mut p = Particle::new(Vec3::new(1.0, 0.0, 0.0), 0.0);

        assert_eq!(adv.advance(&mut p, &spawn, 0.0), Transition::Integrated);
        assert!(p.is_expired());
        assert_eq!(adv.advance(&mut p, &spawn, 0.0), Transition::Respawned);
        assert_eq!(p, spawn);
    }

    #[test]
    fn test_particle_at_singularity_stays_finite() {
        let adv = ParticleAdvector::new(
            VectorField::new()
                .with_potential(PotentialFlow::new(5.0, 1e-6))
                .with_curl_noise(CurlNoise::new(1.0, 0.0)),
            0.1,
        );
        let mut p = Particle::new(Vec3::ZERO, 1.0);
        adv.advance(&mut p, &Particle::default(), 0.0);
        assert!(p.position.is_finite());
    }

    #[test]
    fn test_step_counts_transitions() {
        let adv = advector();
        let mut particles: Vec<Particle> = (0..100)
            .map(|i| {
                let lifetime = if i % 4 == 0 { -1.0 } else { 1.0 };
                Particle::new(Vec3::new(i as f32 * 0.01, 0.5, 0.0), lifetime)
            })
            .collect();
        let spawn: Vec<Particle> = (0..100)
            .map(|i| Particle::new(Vec3::new(0.0, i as f32, 0.0), 2.0))
            .collect();

        let stats = adv.step(&mut particles, &spawn, 0.0);
        assert_eq!(stats, StepStats { integrated: 75, respawned: 25 });
        assert_eq!(stats.total(), 100);

        for (i, p) in particles.iter().enumerate() {
            if i % 4 == 0 {
                assert_eq!(*p, spawn[i]);
            } else {
                assert!((p.lifetime - 0.99).abs() < 1e-6);
            }
        }
    }

    #[test]
    #[should_panic(expected = "index-aligned")]
    fn test_step_rejects_misaligned_buffers() {
        let adv = advector();
        let mut particles = vec![Particle::default(); 4];
        let spawn = vec![Particle::default(); 3];
        adv.step(&mut particles, &spawn, 0.0);
    }
}

//! Spawn context for filling spawn buffers.
//!
//! Provides helper methods to reduce boilerplate when choosing where
//! particles (re)appear.

use glam::Vec3;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::{PI, TAU};

/// Context handed to spawner functions, one per particle slot.
///
/// Each slot gets its own RNG derived from the simulation seed and the slot
/// index, so a spawn buffer is reproducible for a given seed no matter which
/// thread fills which slot.
///
/// ```ignore
/// let sim = Simulation::builder()
///     .with_particle_count(50_000)
///     .with_spawner(|ctx| ctx.random_in_disc(0.2) + Vec3::new(0.0, -1.0, 0.0))
///     .build()?;
/// ```
pub struct SpawnContext {
    /// Index of the slot being filled (0 to count-1).
    pub index: u32,
    /// Total number of slots.
    pub count: u32,
    rng: SmallRng,
}

impl SpawnContext {
    /// Create the context for slot `index` of `count`.
    pub fn new(index: u32, count: u32, seed: u64) -> Self {
        let stream = (index as u64).wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
        Self {
            index,
            count,
            rng: SmallRng::seed_from_u64(seed ^ stream),
        }
    }

    /// Normalized position of this slot (0.0 to 1.0).
    #[inline]
    pub fn progress(&self) -> f32 {
        self.index as f32 / self.count as f32
    }

    // ========== Random primitives ==========

    /// Random f32 between 0.0 and 1.0.
    #[inline]
    pub fn random(&mut self) -> f32 {
        self.rng.gen()
    }

    /// Random f32 in `min..max`.
    #[inline]
    pub fn random_range(&mut self, min: f32, max: f32) -> f32 {
        self.rng.gen_range(min..max)
    }

    // ========== Position helpers ==========

    /// Random point inside a sphere of given radius, centered at origin.
    ///
    /// Distribution is uniform throughout the volume.
    pub fn random_in_sphere(&mut self, radius: f32) -> Vec3 {
        let r = radius * self.rng.gen::<f32>().cbrt();
        self.random_direction() * r
    }

    /// Random point on the surface of a sphere of given radius.
    pub fn random_on_sphere(&mut self, radius: f32) -> Vec3 {
        self.random_direction() * radius
    }

    /// Random point inside a cube of given half-size, centered at origin.
    pub fn random_in_cube(&mut self, half_size: f32) -> Vec3 {
        Vec3::new(
            self.rng.gen_range(-half_size..=half_size),
            self.rng.gen_range(-half_size..=half_size),
            self.rng.gen_range(-half_size..=half_size),
        )
    }

    /// Random point on a disc in the XZ plane, uniform over its area.
    ///
    /// Matches the default flow axis (Y): particles seeded on the disc rise
    /// or fall along the axis.
    pub fn random_in_disc(&mut self, radius: f32) -> Vec3 {
        let theta = self.rng.gen_range(0.0..TAU);
        let r = radius * self.rng.gen::<f32>().sqrt();
        Vec3::new(r * theta.cos(), 0.0, r * theta.sin())
    }

    /// Uniform random unit vector.
    pub fn random_direction(&mut self) -> Vec3 {
        let z: f32 = self.rng.gen_range(-1.0..=1.0);
        let theta = self.rng.gen_range(0.0..TAU);
        let s = (1.0 - z * z).max(0.0).sqrt();
        Vec3::new(s * theta.cos(), s * theta.sin(), z)
    }

    // ========== Structured helpers ==========

    /// Evenly spaced point on a ring of given radius in the XZ plane.
    pub fn ring_position(&self, radius: f32) -> Vec3 {
        let angle = self.progress() * TAU;
        Vec3::new(angle.cos() * radius, 0.0, angle.sin() * radius)
    }

    /// Point on a Fibonacci sphere; nearly uniform with no clumping.
    pub fn fibonacci_sphere(&self, radius: f32) -> Vec3 {
        let golden = PI * (3.0 - 5.0_f32.sqrt());
        let y = 1.0 - 2.0 * (self.index as f32 + 0.5) / self.count as f32;
        let r = (1.0 - y * y).max(0.0).sqrt();
        let theta = golden * self.index as f32;
        Vec3::new(r * theta.cos(), y, r * theta.sin()) * radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = SpawnContext::new(7, 100, 42);
        let mut b = SpawnContext::new(7, 100, 42);
        assert_eq!(a.random_in_sphere(1.0), b.random_in_sphere(1.0));

        let mut c = SpawnContext::new(8, 100, 42);
        let mut d = SpawnContext::new(7, 100, 43);
        let p = SpawnContext::new(7, 100, 42).random_in_cube(1.0);
        assert_ne!(c.random_in_cube(1.0), p);
        assert_ne!(d.random_in_cube(1.0), p);
    }

    #[test]
    fn test_shapes_stay_in_bounds() {
        for i in 0..200 {
            let mut ctx = SpawnContext::new(i, 200, 1);
            assert!(ctx.random_in_sphere(0.5).length() <= 0.5 + 1e-5);
            assert!((ctx.random_on_sphere(2.0).length() - 2.0).abs() < 1e-4);
            let c = ctx.random_in_cube(0.25);
            assert!(c.abs().max_element() <= 0.25);
            let d = ctx.random_in_disc(1.0);
            assert_eq!(d.y, 0.0);
            assert!(d.length() <= 1.0 + 1e-5);
            assert!((ctx.fibonacci_sphere(1.0).length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_progress() {
        assert_eq!(SpawnContext::new(0, 4, 0).progress(), 0.0);
        assert_eq!(SpawnContext::new(2, 4, 0).progress(), 0.5);
    }
}

//! Sort-key extraction.
//!
//! A [`KeyPolicy`] maps a particle position to an integer key in
//! `[0, key_range)`. The radix sort needs one pass per two bits of the range,
//! so a tight range directly saves sort work.
//!
//! [`DepthQuantizer`] is the policy used for alpha compositing: distance
//! along the view direction, quantized into a fixed number of buckets.

use glam::Vec3;
use rayon::prelude::*;

use crate::error::{require_finite, ConfigError};
use crate::particle::Particle;
use crate::shaders::KeyParams;

/// Maps a particle position to an orderable integer key.
///
/// Implementations must be deterministic and return keys in
/// `0..self.key_range()`.
pub trait KeyPolicy: Send + Sync {
    /// Key for a particle at `position`.
    fn key(&self, position: Vec3) -> u32;

    /// Exclusive upper bound on the keys this policy produces.
    fn key_range(&self) -> u32;

    /// Check the policy's parameters. Called once at setup.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.key_range() == 0 {
            Err(ConfigError::ZeroKeyRange)
        } else {
            Ok(())
        }
    }

    /// The GPU backend can only evaluate [`DepthQuantizer`] keys.
    fn as_depth_quantizer(&self) -> Option<&DepthQuantizer> {
        None
    }
}

/// Quantized view depth.
///
/// Depth is `(position - eye) . direction`. The interval `[near, far]` is
/// split into `buckets` equal buckets; depths before `near` (including
/// anything behind the eye) go to bucket 0 and depths past `far` to the last
/// bucket. NaN depths go to bucket 0.
///
/// By default keys increase with depth (front-to-back order). Call
/// [`DepthQuantizer::back_to_front`] to reverse them, which is the order
/// alpha-blended sprites are drawn in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DepthQuantizer {
    eye: Vec3,
    direction: Vec3,
    near: f32,
    far: f32,
    buckets: u32,
    back_to_front: bool,
}

impl DepthQuantizer {
    /// Quantizer looking from `eye` along `direction`, with `[0.1, 100]`
    /// split into 1024 buckets.
    pub fn new(eye: Vec3, direction: Vec3) -> Self {
        Self {
            eye,
            direction: direction.normalize_or_zero(),
            near: 0.1,
            far: 100.0,
            buckets: 1024,
            back_to_front: false,
        }
    }

    /// Quantizer looking from `eye` toward `target`.
    pub fn looking_at(eye: Vec3, target: Vec3) -> Self {
        Self::new(eye, target - eye)
    }

    /// Set the depth interval mapped onto the buckets.
    pub fn with_range(mut self, near: f32, far: f32) -> Self {
        self.near = near;
        self.far = far;
        self
    }

    /// Set the number of buckets (the key range).
    pub fn with_buckets(mut self, buckets: u32) -> Self {
        self.buckets = buckets;
        self
    }

    /// Reverse the key order so the farthest particle gets key 0.
    pub fn back_to_front(mut self) -> Self {
        self.back_to_front = true;
        self
    }

    /// Signed distance along the view direction.
    #[inline]
    pub fn depth(&self, position: Vec3) -> f32 {
        (position - self.eye).dot(self.direction)
    }

    /// Eye point.
    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    /// Normalized view direction.
    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    /// Uniform block for the key shader.
    pub(crate) fn gpu_params(&self, len: u32) -> KeyParams {
        KeyParams {
            eye: self.eye.to_array(),
            near: self.near,
            direction: self.direction.to_array(),
            far: self.far,
            buckets: self.buckets,
            reversed: self.back_to_front as u32,
            len,
            _pad: 0,
        }
    }
}

impl KeyPolicy for DepthQuantizer {
    fn key(&self, position: Vec3) -> u32 {
        let t = (self.depth(position) - self.near) / (self.far - self.near);
        let scaled = t * self.buckets as f32;
        let last = self.buckets.saturating_sub(1);
        // `>` is false for NaN, which lands in bucket 0. The clamp is done in
        // integers: `last as f32` rounds up once buckets exceed 2^24.
        let bucket = if scaled > 0.0 { (scaled as u32).min(last) } else { 0 };
        if self.back_to_front {
            last - bucket
        } else {
            bucket
        }
    }

    fn key_range(&self) -> u32 {
        self.buckets
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.buckets == 0 {
            return Err(ConfigError::ZeroKeyRange);
        }
        if !self.eye.is_finite() {
            return Err(ConfigError::DegenerateDirection("depth.eye"));
        }
        if !self.direction.is_finite() || self.direction.length_squared() == 0.0 {
            return Err(ConfigError::DegenerateDirection("depth.direction"));
        }
        require_finite("depth.near", self.near)?;
        require_finite("depth.far", self.far)?;
        if self.far <= self.near {
            return Err(ConfigError::InvalidParameter { name: "depth.far", value: self.far });
        }
        Ok(())
    }

    fn as_depth_quantizer(&self) -> Option<&DepthQuantizer> {
        Some(self)
    }
}

/// Compute one key per particle into `keys`, in parallel.
///
/// # Panics
///
/// Panics if the buffers differ in length.
pub fn extract_keys(policy: &dyn KeyPolicy, particles: &[Particle], keys: &mut [u32]) {
    assert_eq!(
        particles.len(),
        keys.len(),
        "key buffer must be index-aligned with the particles"
    );
    keys.par_iter_mut()
        .zip(particles.par_iter())
        .for_each(|(key, particle)| *key = policy.key(particle.position));
}

//! Divergence-free flow field driving the particles.
//!
//! The velocity at a point is the sum of two terms:
//!
//! - **Potential flow**: the gradient of `phi(r) = -a * ln(r + e)`, where `r`
//!   is the distance from the flow axis through `origin`. In the plane
//!   across the axis `ln r` is harmonic, so away from the axis the term is
//!   divergence-free up to `O(e)`. It pulls particles toward the axis
//!   (`a > 0`) or pushes them away (`a < 0`).
//! - **Curl noise**: the curl of a vector potential built from three
//!   decorrelated simplex noise samples. The curl of any smooth potential is
//!   divergence-free, so the noise stirs the particles without clumping them.
//!
//! Both terms are evaluated from analytic derivatives. A numerical variant,
//! [`VectorField::velocity_numerical`], takes central differences of the
//! noise potential instead; that lets the potential be reshaped near a
//! [`SphereObstacle`] so the flow slides around it.
//!
//! # Example
//!
//! ```ignore
//! let field = VectorField::new()
//!     .with_potential(PotentialFlow::new(0.4, 1e-3).with_axis(Vec3::Y))
//!     .with_curl_noise(CurlNoise::new(1.5, 0.8).with_drift(Vec3::new(0.0, 0.2, 0.0)));
//!
//! let v = field.velocity(Vec3::new(0.5, 0.0, 0.2), 0.0);
//! ```

use glam::Vec3;

use crate::error::{require_finite, require_positive, ConfigError};
use crate::noise::simplex3_grad;

/// Offsets that decorrelate the three noise samples forming the potential.
///
/// Kept a few lattice cells away and no further: at large coordinates f32
/// loses enough of `x - floor(x)` that the curl turns grainy.
const POTENTIAL_OFFSET_Y: Vec3 = Vec3::new(3.917, -5.231, 1.679);
const POTENTIAL_OFFSET_Z: Vec3 = Vec3::new(-6.143, 2.871, -4.527);

/// Finite-difference step, in noise-space units.
const NUMERICAL_STEP: f32 = 1e-3;

/// Line-source potential flow around an axis.
///
/// `r` is the distance from the axis through `origin`, not from the point
/// `origin` itself. Measured from a point, `ln r` has divergence `1 / r²`
/// in 3D; measured from a line it is harmonic in the plane across the
/// axis, which keeps the combined field divergence-free away from the
/// singularity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PotentialFlow {
    /// Point the axis passes through (the singularity).
    pub origin: Vec3,
    /// Axis direction. Stored normalized.
    pub axis: Vec3,
    /// Strength `a`. Positive values attract toward the axis.
    pub strength: f32,
    /// `e` in `ln(r + e)`; keeps the field finite at the axis.
    pub epsilon: f32,
}

impl Default for PotentialFlow {
    fn default() -> Self {
        Self::new(0.5, 1e-3)
    }
}

impl PotentialFlow {
    /// Potential flow along the Y axis through the world origin.
    pub fn new(strength: f32, epsilon: f32) -> Self {
        Self {
            origin: Vec3::ZERO,
            axis: Vec3::Y,
            strength,
            epsilon,
        }
    }

    /// Move the singularity.
    pub fn with_origin(mut self, origin: Vec3) -> Self {
        self.origin = origin;
        self
    }

    /// Set the flow axis. Zero vectors are rejected by [`VectorField::validate`].
    pub fn with_axis(mut self, axis: Vec3) -> Self {
        self.axis = axis.normalize_or_zero();
        self
    }

    /// Component of `p - origin` perpendicular to the axis.
    #[inline]
    fn radial(&self, p: Vec3) -> Vec3 {
        let d = p - self.origin;
        d - self.axis * d.dot(self.axis)
    }

    /// Scalar potential `phi(p)`.
    pub fn potential(&self, p: Vec3) -> f32 {
        -self.strength * (self.radial(p).length() + self.epsilon).ln()
    }

    /// Analytic gradient of the potential. Zero on the axis itself.
    pub fn velocity(&self, p: Vec3) -> Vec3 {
        let radial = self.radial(p);
        let r = radial.length();
        radial.normalize_or_zero() * (-self.strength / (r + self.epsilon))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_finite("potential.strength", self.strength)?;
        require_positive("potential.epsilon", self.epsilon)?;
        if !self.origin.is_finite() {
            return Err(ConfigError::DegenerateDirection("potential.origin"));
        }
        if !self.axis.is_finite() || self.axis.length_squared() == 0.0 {
            return Err(ConfigError::DegenerateDirection("potential.axis"));
        }
        Ok(())
    }
}

/// Curl of a simplex-noise vector potential.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CurlNoise {
    /// Spatial frequency. Smaller values give larger eddies.
    pub scale: f32,
    /// Velocity multiplier.
    pub strength: f32,
    /// Noise-space translation per second; animates the flow over time.
    pub drift: Vec3,
}

impl Default for CurlNoise {
    fn default() -> Self {
        Self::new(1.0, 0.5)
    }
}

impl CurlNoise {
    /// Static curl noise with the given frequency and strength.
    pub fn new(scale: f32, strength: f32) -> Self {
        Self {
            scale,
            strength,
            drift: Vec3::ZERO,
        }
    }

    /// Animate the noise by translating it through noise space.
    pub fn with_drift(mut self, drift: Vec3) -> Self {
        self.drift = drift;
        self
    }

    #[inline]
    fn noise_point(&self, p: Vec3, time: f32) -> Vec3 {
        p * self.scale + self.drift * time
    }

    /// The vector potential `psi(p)`.
    pub fn potential(&self, p: Vec3, time: f32) -> Vec3 {
        let q = self.noise_point(p, time);
        Vec3::new(
            simplex3_grad(q).0,
            simplex3_grad(q + POTENTIAL_OFFSET_Y).0,
            simplex3_grad(q + POTENTIAL_OFFSET_Z).0,
        ) * self.strength
    }

    /// `curl(psi)` from the analytic noise gradients.
    pub fn velocity(&self, p: Vec3, time: f32) -> Vec3 {
        let q = self.noise_point(p, time);
        let (_, gx) = simplex3_grad(q);
        let (_, gy) = simplex3_grad(q + POTENTIAL_OFFSET_Y);
        let (_, gz) = simplex3_grad(q + POTENTIAL_OFFSET_Z);

        // Chain rule: d/dp = scale * d/dq
        Vec3::new(gz.y - gy.z, gx.z - gz.x, gy.x - gx.y) * (self.scale * self.strength)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("curl_noise.scale", self.scale)?;
        require_finite("curl_noise.strength", self.strength)?;
        if !self.drift.is_finite() {
            return Err(ConfigError::DegenerateDirection("curl_noise.drift"));
        }
        Ok(())
    }
}

/// A sphere the curl-noise flow slides around instead of entering.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SphereObstacle {
    /// Sphere center.
    pub center: Vec3,
    /// Sphere radius.
    pub radius: f32,
    /// Distance from the surface over which the flow is bent.
    pub influence: f32,
}

impl SphereObstacle {
    /// Obstacle with an influence band as wide as its radius.
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self {
            center,
            radius,
            influence: radius,
        }
    }

    /// Set the width of the band in which the flow is bent.
    pub fn with_influence(mut self, influence: f32) -> Self {
        self.influence = influence;
        self
    }

    /// Outward unit normal and signed distance to the surface.
    fn normal_and_distance(&self, p: Vec3) -> (Vec3, f32) {
        let d = p - self.center;
        (d.normalize_or_zero(), d.length() - self.radius)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        require_positive("obstacle.radius", self.radius)?;
        require_positive("obstacle.influence", self.influence)?;
        if !self.center.is_finite() {
            return Err(ConfigError::DegenerateDirection("obstacle.center"));
        }
        Ok(())
    }
}

/// Smooth ramp from 0 at the surface to 1 one influence-width away.
fn ramp(r: f32) -> f32 {
    let r = r.clamp(0.0, 1.0);
    let r3 = r * r * r;
    (15.0 / 8.0) * r - (10.0 / 8.0) * r3 + (3.0 / 8.0) * r3 * r * r
}

/// Combined potential-flow and curl-noise velocity field.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VectorField {
    /// Singular potential-flow term.
    pub potential: PotentialFlow,
    /// Curl-noise term.
    pub noise: CurlNoise,
    /// Optional obstacle. When set, [`VectorField::sample`] uses the
    /// numerical path.
    pub obstacle: Option<SphereObstacle>,
}

impl VectorField {
    /// Field with default potential flow and curl noise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the potential-flow term.
    pub fn with_potential(mut self, potential: PotentialFlow) -> Self {
        self.potential = potential;
        self
    }

    /// Replace the curl-noise term.
    pub fn with_curl_noise(mut self, noise: CurlNoise) -> Self {
        self.noise = noise;
        self
    }

    /// Bend the curl-noise flow around a sphere.
    pub fn with_obstacle(mut self, obstacle: SphereObstacle) -> Self {
        self.obstacle = Some(obstacle);
        self
    }

    /// Check all parameters; called once by the simulation builders.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.potential.validate()?;
        self.noise.validate()?;
        if let Some(obstacle) = &self.obstacle {
            obstacle.validate()?;
        }
        Ok(())
    }

    /// Analytic velocity at `p`. Non-finite results collapse to zero.
    pub fn velocity(&self, p: Vec3, time: f32) -> Vec3 {
        finite_or_zero(self.potential.velocity(p) + self.noise.velocity(p, time))
    }

    /// Velocity with the curl taken by central differences of the
    /// (obstacle-constrained) noise potential.
    ///
    /// Without an obstacle this agrees with [`VectorField::velocity`] up to
    /// finite-difference error.
    pub fn velocity_numerical(&self, p: Vec3, time: f32) -> Vec3 {
        let h = NUMERICAL_STEP / self.noise.scale;
        let inv = 1.0 / (2.0 * h);

        let dx = (self.constrained_potential(p + Vec3::X * h, time)
            - self.constrained_potential(p - Vec3::X * h, time))
            * inv;
        let dy = (self.constrained_potential(p + Vec3::Y * h, time)
            - self.constrained_potential(p - Vec3::Y * h, time))
            * inv;
        let dz = (self.constrained_potential(p + Vec3::Z * h, time)
            - self.constrained_potential(p - Vec3::Z * h, time))
            * inv;

        // dx holds d(psi)/dx for all three components, and so on
        let curl = Vec3::new(dy.z - dz.y, dz.x - dx.z, dx.y - dy.x);
        finite_or_zero(self.potential.velocity(p) + curl)
    }

    /// Velocity used by the advector: numerical when an obstacle is
    /// configured, analytic otherwise.
    #[inline]
    pub fn sample(&self, p: Vec3, time: f32) -> Vec3 {
        if self.obstacle.is_some() {
            self.velocity_numerical(p, time)
        } else {
            self.velocity(p, time)
        }
    }

    /// Noise potential with its tangential part faded out near the obstacle.
    ///
    /// `psi' = alpha * psi + (1 - alpha) * n (n . psi)`; at the surface only
    /// the normal component survives, so the curl has no normal component.
    fn constrained_potential(&self, p: Vec3, time: f32) -> Vec3 {
        let psi = self.noise.potential(p, time);
        match &self.obstacle {
            None => psi,
            Some(obstacle) => {
                let (n, distance) = obstacle.normal_and_distance(p);
                let alpha = ramp(distance / obstacle.influence);
                psi * alpha + n * n.dot(psi) * (1.0 - alpha)
            }
        }
    }
}

#[inline]
fn finite_or_zero(v: Vec3) -> Vec3 {
    if v.is_finite() {
        v
    } else {
        Vec3::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn divergence(f: impl Fn(Vec3) -> Vec3, p: Vec3, h: f32) -> f32 {
        let dvx = (f(p + Vec3::X * h).x - f(p - Vec3::X * h).x) / (2.0 * h);
        let dvy = (f(p + Vec3::Y * h).y - f(p - Vec3::Y * h).y) / (2.0 * h);
        let dvz = (f(p + Vec3::Z * h).z - f(p - Vec3::Z * h).z) / (2.0 * h);
        dvx + dvy + dvz
    }

    fn grid() -> impl Iterator<Item = Vec3> {
        (0..6).flat_map(|i| {
            (0..6).flat_map(move |j| {
                (0..6).map(move |k| {
                    Vec3::new(
                        -1.3 + i as f32 * 0.53,
                        -1.1 + j as f32 * 0.47,
                        -1.2 + k as f32 * 0.51,
                    )
                })
            })
        })
    }

    // ========== PotentialFlow ==========

    #[test]
    fn test_potential_velocity_is_gradient() {
        let flow = PotentialFlow::new(0.7, 1e-3).with_origin(Vec3::new(0.1, 0.0, -0.2));
        let p = Vec3::new(0.6, 0.3, 0.4);
        let h = 1e-3;
        let fd = Vec3::new(
            (flow.potential(p + Vec3::X * h) - flow.potential(p - Vec3::X * h)) / (2.0 * h),
            (flow.potential(p + Vec3::Y * h) - flow.potential(p - Vec3::Y * h)) / (2.0 * h),
            (flow.potential(p + Vec3::Z * h) - flow.potential(p - Vec3::Z * h)) / (2.0 * h),
        );
        assert!((flow.velocity(p) - fd).length() < 1e-2, "{:?} vs {:?}", flow.velocity(p), fd);
    }

    #[test]
    fn test_potential_attracts_toward_axis() {
        let flow = PotentialFlow::new(1.0, 1e-3);
        let v = flow.velocity(Vec3::new(2.0, 5.0, 0.0));
        assert!(v.x < 0.0);
        assert!(v.y.abs() < 1e-6, "no flow along the axis");
        assert!(v.z.abs() < 1e-6);
    }

    #[test]
    fn test_singularity_is_finite() {
        let field = VectorField::new();
        let v = field.velocity(Vec3::ZERO, 0.0);
        assert!(v.is_finite());
        assert_eq!(PotentialFlow::new(1.0, 1e-3).velocity(Vec3::new(0.0, 3.0, 0.0)), Vec3::ZERO);
        assert!(PotentialFlow::new(1.0, 1e-3).potential(Vec3::ZERO).is_finite());
    }

    #[test]
    fn test_non_finite_velocity_clamps_to_zero() {
        let field = VectorField::new();
        assert_eq!(field.velocity(Vec3::new(f32::NAN, 0.0, 0.0), 0.0), Vec3::ZERO);
        assert_eq!(field.velocity(Vec3::splat(f32::INFINITY), 0.0), Vec3::ZERO);
    }

    // ========== Divergence ==========

    #[test]
    fn test_curl_noise_is_divergence_free() {
        let noise = CurlNoise::new(0.5, 1.0).with_drift(Vec3::new(0.1, 0.3, 0.0));
        for p in grid() {
            let div = divergence(|q| noise.velocity(q, 0.7), p, 5e-3);
            assert!(div.abs() < 1e-2, "div = {} at {:?}", div, p);
        }
    }

    #[test]
    fn test_combined_field_is_divergence_free_away_from_axis() {
        let field = VectorField::new()
            .with_potential(PotentialFlow::new(0.3, 1e-4))
            .with_curl_noise(CurlNoise::new(0.5, 1.0));
        for p in grid() {
            let radial = Vec3::new(p.x, 0.0, p.z).length();
            if radial < 0.4 {
                continue;
            }
            let div = divergence(|q| field.velocity(q, 0.0), p, 5e-3);
            assert!(div.abs() < 2e-2, "div = {} at {:?}", div, p);
        }
    }

    #[test]
    fn test_potential_offsets_stay_near_origin() {
        // ulp(16) is 2e-6; past that the noise gradients jitter visibly at
        // finite-difference spacings
        assert!(POTENTIAL_OFFSET_Y.abs().max_element() < 16.0);
        assert!(POTENTIAL_OFFSET_Z.abs().max_element() < 16.0);
        assert!((POTENTIAL_OFFSET_Y - POTENTIAL_OFFSET_Z).length() > 4.0);
    }

    #[test]
    fn test_curl_noise_divergence_does_not_grow_with_finer_steps() {
        let noise = CurlNoise::new(1.0, 1.0);
        for p in grid() {
            for h in [5e-3, 2e-3, 1e-3] {
                let div = divergence(|q| noise.velocity(q, 0.0), p, h);
                assert!(div.abs() < 1.5e-2, "div = {} at {:?} with h = {}", div, p, h);
            }
        }
    }

    // ========== Numerical path ==========

    #[test]
    fn test_numerical_matches_analytic_without_obstacle() {
        let field = VectorField::new().with_curl_noise(CurlNoise::new(0.8, 1.0));
        for p in grid() {
            let a = field.velocity(p, 0.25);
            let n = field.velocity_numerical(p, 0.25);
            assert!((a - n).length() < 2e-2 * (1.0 + a.length()), "{:?} vs {:?} at {:?}", a, n, p);
        }
    }

    #[test]
    fn test_obstacle_blocks_normal_flow() {
        let obstacle = SphereObstacle::new(Vec3::new(0.2, 0.1, -0.3), 0.5).with_influence(0.4);
        let field = VectorField::new()
            .with_potential(PotentialFlow::new(0.0, 1e-3))
            .with_curl_noise(CurlNoise::new(1.0, 1.0))
            .with_obstacle(obstacle);

        for k in 0..32 {
            let theta = k as f32 * 0.61;
            let phi = k as f32 * 0.37 + 0.2;
            let n = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            let p = obstacle.center + n * obstacle.radius;
            let v = field.sample(p, 0.0);
            assert!(v.dot(n).abs() < 2e-2, "normal velocity {} at {:?}", v.dot(n), p);
        }
    }

    #[test]
    fn test_obstacle_far_field_unchanged() {
        let obstacle = SphereObstacle::new(Vec3::ZERO, 0.2).with_influence(0.1);
        let free = VectorField::new();
        let blocked = VectorField::new().with_obstacle(obstacle);
        let p = Vec3::new(1.5, 0.3, -0.8);
        let a = free.velocity(p, 0.0);
        let b = blocked.sample(p, 0.0);
        assert!((a - b).length() < 2e-2 * (1.0 + a.length()));
    }

    #[test]
    fn test_ramp_endpoints() {
        assert_eq!(ramp(0.0), 0.0);
        assert!((ramp(1.0) - 1.0).abs() < 1e-6);
        assert!((ramp(5.0) - 1.0).abs() < 1e-6);
        assert_eq!(ramp(-1.0), 0.0);
    }

    // ========== Validation ==========

    #[test]
    fn test_validate_rejects_bad_parameters() {
        assert!(VectorField::new().validate().is_ok());
        assert!(VectorField::new()
            .with_potential(PotentialFlow::new(1.0, 0.0))
            .validate()
            .is_err());
        assert!(VectorField::new()
            .with_potential(PotentialFlow::new(1.0, 1e-3).with_axis(Vec3::ZERO))
            .validate()
            .is_err());
        assert!(VectorField::new()
            .with_curl_noise(CurlNoise::new(0.0, 1.0))
            .validate()
            .is_err());
        assert!(VectorField::new()
            .with_obstacle(SphereObstacle::new(Vec3::ZERO, -1.0))
            .validate()
            .is_err());
    }
}

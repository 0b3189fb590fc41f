//! 3D simplex noise with analytic gradient.
//!
//! The CPU evaluation and the WGSL source in [`NOISE_GRAD_WGSL`] follow the
//! same arithmetic step for step (permutation polynomial mod 289, gradients
//! on an octahedron from a 7x7 lattice, radial kernel `(0.5 - d²)^4`), so the
//! two backends agree to within float rounding.
//!
//! The kernel radius of `0.5` keeps each corner's contribution inside its
//! simplex, which makes both the value and the gradient continuous across
//! simplex boundaries. Curl noise depends on that: the divergence of the curl
//! is only zero if the partial derivatives are consistent everywhere.

use glam::{Vec3, Vec3Swizzles, Vec4, Vec4Swizzles};

/// Output scale that maps the kernel sum to roughly `[-1, 1]`.
const NOISE_SCALE: f32 = 105.0;

#[inline]
fn mod289_3(x: Vec3) -> Vec3 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

#[inline]
fn mod289_4(x: Vec4) -> Vec4 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

#[inline]
fn permute4(x: Vec4) -> Vec4 {
    mod289_4((x * 34.0 + Vec4::ONE) * x)
}

#[inline]
fn taylor_inv_sqrt4(r: Vec4) -> Vec4 {
    Vec4::splat(1.792_842_9) - r * 0.853_734_7
}

/// GLSL `step`: 0 where `x < edge`, 1 elsewhere.
#[inline]
fn step3(edge: Vec3, x: Vec3) -> Vec3 {
    Vec3::select(x.cmplt(edge), Vec3::ZERO, Vec3::ONE)
}

#[inline]
fn step4(edge: Vec4, x: Vec4) -> Vec4 {
    Vec4::select(x.cmplt(edge), Vec4::ZERO, Vec4::ONE)
}

/// Simplex noise value at `v`, roughly in `[-1, 1]`.
pub fn simplex3(v: Vec3) -> f32 {
    simplex3_grad(v).0
}

/// Simplex noise value and its gradient at `v`.
///
/// The gradient is exact (differentiated kernel by kernel), not a
/// finite-difference estimate.
pub fn simplex3_grad(v: Vec3) -> (f32, Vec3) {
    const C_X: f32 = 1.0 / 6.0;
    const C_Y: f32 = 1.0 / 3.0;

    // Skew to find the simplex cell, then unskew the first corner
    let i = (v + Vec3::splat(v.dot(Vec3::splat(C_Y)))).floor();
    let x0 = v - i + Vec3::splat(i.dot(Vec3::splat(C_X)));

    // Rank the coordinates to pick the other two corners
    let g = step3(x0.yzx(), x0);
    let l = Vec3::ONE - g;
    let i1 = g.min(l.zxy());
    let i2 = g.max(l.zxy());

    let x1 = x0 - i1 + Vec3::splat(C_X);
    let x2 = x0 - i2 + Vec3::splat(C_Y);
    let x3 = x0 - Vec3::splat(0.5);

    let i = mod289_3(i);
    let p = permute4(
        permute4(
            permute4(Vec4::splat(i.z) + Vec4::new(0.0, i1.z, i2.z, 1.0))
                + Vec4::splat(i.y)
                + Vec4::new(0.0, i1.y, i2.y, 1.0),
        ) + Vec4::splat(i.x)
            + Vec4::new(0.0, i1.x, i2.x, 1.0),
    );

    // Gradients from a 7x7 grid folded onto an octahedron
    let ns = Vec3::new(2.0 / 7.0, 0.5 / 7.0 - 1.0, 1.0 / 7.0);
    let j = p - (p * ns.z * ns.z).floor() * 49.0;
    let x_ = (j * ns.z).floor();
    let y_ = (j - x_ * 7.0).floor();

    let x = x_ * ns.x + Vec4::splat(ns.y);
    let y = y_ * ns.x + Vec4::splat(ns.y);
    let h = Vec4::ONE - x.abs() - y.abs();

    let b0 = Vec4::new(x.x, x.y, y.x, y.y);
    let b1 = Vec4::new(x.z, x.w, y.z, y.w);
    let s0 = b0.floor() * 2.0 + Vec4::ONE;
    let s1 = b1.floor() * 2.0 + Vec4::ONE;
    let sh = -step4(h, Vec4::ZERO);

    let a0 = b0.xzyw() + s0.xzyw() * sh.xxyy();
    let a1 = b1.xzyw() + s1.xzyw() * sh.zzww();

    let mut p0 = Vec3::new(a0.x, a0.y, h.x);
    let mut p1 = Vec3::new(a0.z, a0.w, h.y);
    let mut p2 = Vec3::new(a1.x, a1.y, h.z);
    let mut p3 = Vec3::new(a1.z, a1.w, h.w);

    let norm = taylor_inv_sqrt4(Vec4::new(p0.dot(p0), p1.dot(p1), p2.dot(p2), p3.dot(p3)));
    p0 *= norm.x;
    p1 *= norm.y;
    p2 *= norm.z;
    p3 *= norm.w;

    let m = (Vec4::splat(0.5) - Vec4::new(x0.dot(x0), x1.dot(x1), x2.dot(x2), x3.dot(x3)))
        .max(Vec4::ZERO);
    let m2 = m * m;
    let m4 = m2 * m2;
    let pdotx = Vec4::new(p0.dot(x0), p1.dot(x1), p2.dot(x2), p3.dot(x3));

    // d/dx of m^4 (g . x) = -8 m^3 (g . x) x + m^4 g
    let t = m2 * m * pdotx;
    let grad = (x0 * t.x + x1 * t.y + x2 * t.z + x3 * t.w) * -8.0
        + p0 * m4.x
        + p1 * m4.y
        + p2 * m4.z
        + p3 * m4.w;

    (NOISE_SCALE * m4.dot(pdotx), grad * NOISE_SCALE)
}

/// WGSL port of [`simplex3_grad`].
///
/// `noise3_grad(v)` returns `vec4(gradient, value)`.
pub const NOISE_GRAD_WGSL: &str = r#"
fn mod289_3(x: vec3<f32>) -> vec3<f32> {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn mod289_4(x: vec4<f32>) -> vec4<f32> {
    return x - floor(x * (1.0 / 289.0)) * 289.0;
}

fn permute4(x: vec4<f32>) -> vec4<f32> {
    return mod289_4(((x * 34.0) + 1.0) * x);
}

fn taylor_inv_sqrt4(r: vec4<f32>) -> vec4<f32> {
    return 1.7928429 - 0.8537347 * r;
}

// 3D simplex noise, returns (gradient.xyz, value)
fn noise3_grad(v: vec3<f32>) -> vec4<f32> {
    let C = vec2<f32>(1.0 / 6.0, 1.0 / 3.0);

    var i = floor(v + dot(v, vec3<f32>(C.y)));
    let x0 = v - i + dot(i, vec3<f32>(C.x));

    let g = step(x0.yzx, x0.xyz);
    let l = 1.0 - g;
    let i1 = min(g.xyz, l.zxy);
    let i2 = max(g.xyz, l.zxy);

    let x1 = x0 - i1 + C.x;
    let x2 = x0 - i2 + C.y;
    let x3 = x0 - 0.5;

    i = mod289_3(i);
    let p = permute4(permute4(permute4(
        i.z + vec4<f32>(0.0, i1.z, i2.z, 1.0))
      + i.y + vec4<f32>(0.0, i1.y, i2.y, 1.0))
      + i.x + vec4<f32>(0.0, i1.x, i2.x, 1.0));

    let ns = vec3<f32>(2.0 / 7.0, 0.5 / 7.0 - 1.0, 1.0 / 7.0);
    let j = p - 49.0 * floor(p * ns.z * ns.z);
    let x_ = floor(j * ns.z);
    let y_ = floor(j - 7.0 * x_);

    let x = x_ * ns.x + ns.yyyy;
    let y = y_ * ns.x + ns.yyyy;
    let h = 1.0 - abs(x) - abs(y);

    let b0 = vec4<f32>(x.xy, y.xy);
    let b1 = vec4<f32>(x.zw, y.zw);
    let s0 = floor(b0) * 2.0 + 1.0;
    let s1 = floor(b1) * 2.0 + 1.0;
    let sh = -step(h, vec4<f32>(0.0));

    let a0 = b0.xzyw + s0.xzyw * sh.xxyy;
    let a1 = b1.xzyw + s1.xzyw * sh.zzww;

    var p0 = vec3<f32>(a0.xy, h.x);
    var p1 = vec3<f32>(a0.zw, h.y);
    var p2 = vec3<f32>(a1.xy, h.z);
    var p3 = vec3<f32>(a1.zw, h.w);

    let norm = taylor_inv_sqrt4(vec4<f32>(dot(p0, p0), dot(p1, p1), dot(p2, p2), dot(p3, p3)));
    p0 *= norm.x;
    p1 *= norm.y;
    p2 *= norm.z;
    p3 *= norm.w;

    let m = max(0.5 - vec4<f32>(dot(x0, x0), dot(x1, x1), dot(x2, x2), dot(x3, x3)), vec4<f32>(0.0));
    let m2 = m * m;
    let m4 = m2 * m2;
    let pdotx = vec4<f32>(dot(p0, x0), dot(p1, x1), dot(p2, x2), dot(p3, x3));

    let t = m2 * m * pdotx;
    var grad = -8.0 * (t.x * x0 + t.y * x1 + t.z * x2 + t.w * x3);
    grad += m4.x * p0 + m4.y * p1 + m4.z * p2 + m4.w * p3;

    return vec4<f32>(105.0 * grad, 105.0 * dot(m4, pdotx));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_points() -> impl Iterator<Item = Vec3> {
        (0..200).map(|i| {
            let f = i as f32;
            Vec3::new(
                (f * 0.731).sin() * 7.3 + f * 0.013,
                (f * 1.379).cos() * 5.1 - 2.0,
                (f * 0.271).sin() * 9.7 + 0.5,
            )
        })
    }

    #[test]
    fn test_noise_is_deterministic() {
        for p in sample_points() {
            assert_eq!(simplex3_grad(p), simplex3_grad(p));
        }
    }

    #[test]
    fn test_noise_range() {
        for p in sample_points() {
            let n = simplex3(p);
            assert!(n.is_finite());
            assert!(n.abs() <= 1.25, "noise({:?}) = {} out of range", p, n);
        }
    }

    #[test]
    fn test_noise_not_constant() {
        let values: Vec<f32> = sample_points().map(simplex3).collect();
        let min = values.iter().cloned().fold(f32::INFINITY, f32::min);
        let max = values.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        assert!(max - min > 0.5, "noise spread too small: {} .. {}", min, max);
    }

    #[test]
    fn test_gradient_matches_central_difference() {
        let h = 1e-3;
        for p in sample_points() {
            let (_, grad) = simplex3_grad(p);
            let fd = Vec3::new(
                (simplex3(p + Vec3::X * h) - simplex3(p - Vec3::X * h)) / (2.0 * h),
                (simplex3(p + Vec3::Y * h) - simplex3(p - Vec3::Y * h)) / (2.0 * h),
                (simplex3(p + Vec3::Z * h) - simplex3(p - Vec3::Z * h)) / (2.0 * h),
            );
            let err = (grad - fd).length();
            assert!(err < 2e-2 * (1.0 + grad.length()), "at {:?}: analytic {:?} vs fd {:?}", p, grad, fd);
        }
    }

    #[test]
    fn test_noise_continuous_across_cells() {
        // Walk a fine line through many simplex cells; successive samples
        // must stay close
        let step = 1e-3;
        let mut prev = simplex3(Vec3::new(-3.0, 0.37, 1.11));
        for k in 1..6000 {
            let p = Vec3::new(-3.0 + k as f32 * step, 0.37 + k as f32 * step * 0.5, 1.11);
            let n = simplex3(p);
            assert!((n - prev).abs() < 0.05, "jump of {} at {:?}", n - prev, p);
            prev = n;
        }
    }
}

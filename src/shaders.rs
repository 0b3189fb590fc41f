//! WGSL sources for the GPU backend, and the uniform blocks they read.
//!
//! Element-wise passes run 256 invocations per workgroup. The block-scan pass
//! runs one workgroup per sort block, so its source is generated for a
//! specific block size.
//!
//! Every `#[repr(C)]` params struct here mirrors a WGSL struct field for
//! field; the layout tests below pin their sizes to what WGSL expects.

use bytemuck::{Pod, Zeroable};

use crate::noise::NOISE_GRAD_WGSL;

/// Invocations per workgroup for element-wise passes.
pub const WORKGROUP_SIZE: u32 = 256;

/// Uniforms for the advect pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, Pod, Zeroable)]
pub struct AdvectParams {
    pub origin: [f32; 3],
    pub strength: f32,
    pub axis: [f32; 3],
    pub epsilon: f32,
    pub drift: [f32; 3],
    pub noise_scale: f32,
    pub noise_strength: f32,
    pub timestep: f32,
    pub time: f32,
    pub len: u32,
    pub obstacle_center: [f32; 3],
    pub obstacle_radius: f32,
    pub obstacle_influence: f32,
    pub has_obstacle: u32,
    pub _pad0: u32,
    pub _pad1: u32,
}

/// Uniforms for the key pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct KeyParams {
    pub eye: [f32; 3],
    pub near: f32,
    pub direction: [f32; 3],
    pub far: f32,
    pub buckets: u32,
    pub reversed: u32,
    pub len: u32,
    pub _pad: u32,
}

/// Uniforms shared by the sort passes. One buffer per radix pass.
#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct SortParams {
    pub len: u32,
    pub shift: u32,
    pub num_blocks: u32,
    pub block_size: u32,
}

const ADVECT_PARAMS_WGSL: &str = r#"
struct AdvectParams {
    origin: vec3<f32>,
    strength: f32,
    axis: vec3<f32>,
    epsilon: f32,
    drift: vec3<f32>,
    noise_scale: f32,
    noise_strength: f32,
    timestep: f32,
    time: f32,
    len: u32,
    obstacle_center: vec3<f32>,
    obstacle_radius: f32,
    obstacle_influence: f32,
    has_obstacle: u32,
    _pad0: u32,
    _pad1: u32,
};
"#;

const SORT_PARAMS_WGSL: &str = r#"
struct SortParams {
    len: u32,
    shift: u32,
    num_blocks: u32,
    block_size: u32,
};
"#;

const ADVECT_BODY_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read_write> particles: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read> spawn: array<vec4<f32>>;
@group(0) @binding(2) var<uniform> params: AdvectParams;

const OFFSET_Y = vec3<f32>(3.917, -5.231, 1.679);
const OFFSET_Z = vec3<f32>(-6.143, 2.871, -4.527);
const F32_MAX = 3.4028235e38;

fn potential_velocity(p: vec3<f32>) -> vec3<f32> {
    let d = p - params.origin;
    let radial = d - params.axis * dot(d, params.axis);
    let r = length(radial);
    if r <= 0.0 {
        return vec3<f32>(0.0);
    }
    return radial / r * (-params.strength / (r + params.epsilon));
}

fn noise_point(p: vec3<f32>) -> vec3<f32> {
    return p * params.noise_scale + params.drift * params.time;
}

fn curl_velocity(p: vec3<f32>) -> vec3<f32> {
    let q = noise_point(p);
    let gx = noise3_grad(q).xyz;
    let gy = noise3_grad(q + OFFSET_Y).xyz;
    let gz = noise3_grad(q + OFFSET_Z).xyz;
    return vec3<f32>(gz.y - gy.z, gx.z - gz.x, gy.x - gx.y) * (params.noise_scale * params.noise_strength);
}

fn ramp(x: f32) -> f32 {
    let r = clamp(x, 0.0, 1.0);
    let r3 = r * r * r;
    return (15.0 / 8.0) * r - (10.0 / 8.0) * r3 + (3.0 / 8.0) * r3 * r * r;
}

fn constrained_potential(p: vec3<f32>) -> vec3<f32> {
    let q = noise_point(p);
    let psi = vec3<f32>(
        noise3_grad(q).w,
        noise3_grad(q + OFFSET_Y).w,
        noise3_grad(q + OFFSET_Z).w
    ) * params.noise_strength;

    let d = p - params.obstacle_center;
    let dist = length(d);
    var n = vec3<f32>(0.0);
    if dist > 0.0 {
        n = d / dist;
    }
    let alpha = ramp((dist - params.obstacle_radius) / params.obstacle_influence);
    return psi * alpha + n * dot(n, psi) * (1.0 - alpha);
}

fn curl_numerical(p: vec3<f32>) -> vec3<f32> {
    let h = 1e-3 / params.noise_scale;
    let inv = 1.0 / (2.0 * h);
    let ex = vec3<f32>(h, 0.0, 0.0);
    let ey = vec3<f32>(0.0, h, 0.0);
    let ez = vec3<f32>(0.0, 0.0, h);
    let dx = (constrained_potential(p + ex) - constrained_potential(p - ex)) * inv;
    let dy = (constrained_potential(p + ey) - constrained_potential(p - ey)) * inv;
    let dz = (constrained_potential(p + ez) - constrained_potential(p - ez)) * inv;
    return vec3<f32>(dy.z - dz.y, dz.x - dx.z, dx.y - dy.x);
}

// False for NaN and infinities
fn is_finite3(v: vec3<f32>) -> bool {
    return all(abs(v) <= vec3<f32>(F32_MAX));
}

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= params.len {
        return;
    }

    let particle = particles[idx];

    // Negative or NaN lifetime: replace with the spawn record, no integration
    if !(particle.w >= 0.0) {
        particles[idx] = spawn[idx];
        return;
    }

    let p = particle.xyz;
    var v = potential_velocity(p);
    if params.has_obstacle != 0u {
        v = v + curl_numerical(p);
    } else {
        v = v + curl_velocity(p);
    }
    if !is_finite3(v) {
        v = vec3<f32>(0.0);
    }

    particles[idx] = vec4<f32>(p + v * params.timestep, particle.w - params.timestep);
}
"#;

/// Advect pass: integrate live particles, respawn expired ones.
pub fn advect_shader() -> String {
    format!("{}\n{}\n{}", NOISE_GRAD_WGSL, ADVECT_PARAMS_WGSL, ADVECT_BODY_WGSL)
}

/// Key pass: quantized depth per particle, plus the identity permutation the
/// sort starts from.
pub const KEYS_WGSL: &str = r#"
struct KeyParams {
    eye: vec3<f32>,
    near: f32,
    direction: vec3<f32>,
    far: f32,
    buckets: u32,
    reversed: u32,
    len: u32,
    _pad: u32,
};

@group(0) @binding(0) var<storage, read> particles: array<vec4<f32>>;
@group(0) @binding(1) var<storage, read_write> keys: array<u32>;
@group(0) @binding(2) var<storage, read_write> values: array<u32>;
@group(0) @binding(3) var<uniform> params: KeyParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= params.len {
        return;
    }

    let depth = dot(particles[idx].xyz - params.eye, params.direction);
    let scaled = (depth - params.near) / (params.far - params.near) * f32(params.buckets);

    // Comparison is false for NaN, which lands in bucket 0
    // Clamp in integers; f32(buckets - 1u) rounds up past 2^24
    var bucket = 0u;
    if scaled > 0.0 {
        bucket = min(u32(scaled), params.buckets - 1u);
    }
    if params.reversed != 0u {
        bucket = params.buckets - 1u - bucket;
    }

    keys[idx] = bucket;
    values[idx] = idx;
}
"#;

const FLAGS_BODY_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> keys: array<u32>;
@group(0) @binding(1) var<storage, read_write> flags: array<vec4<u32>>;
@group(0) @binding(2) var<uniform> params: SortParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= params.num_blocks * params.block_size {
        return;
    }

    // Padding past the last key takes the largest digit
    var digit = 3u;
    if idx < params.len {
        digit = (keys[idx] >> params.shift) & 3u;
    }
    flags[idx] = select(vec4<u32>(0u), vec4<u32>(1u), vec4<u32>(digit) == vec4<u32>(0u, 1u, 2u, 3u));
}
"#;

/// Flag pass: one-hot digit lanes, with sentinel padding.
pub fn flags_shader() -> String {
    format!("{}\n{}", SORT_PARAMS_WGSL, FLAGS_BODY_WGSL)
}

/// Block-scan pass for blocks of `block_size` elements.
///
/// Inclusive Hillis-Steele scan of the four lanes in workgroup memory,
/// converted to exclusive by subtracting each element's own flag.
pub fn block_scan_shader(block_size: u32) -> String {
    format!(
        r#"
@group(0) @binding(0) var<storage, read> flags: array<vec4<u32>>;
@group(0) @binding(1) var<storage, read_write> local_scan: array<vec4<u32>>;
@group(0) @binding(2) var<storage, read_write> block_totals: array<vec4<u32>>;

var<workgroup> scratch: array<vec4<u32>, {block_size}>;

@compute @workgroup_size({block_size})
fn main(
    @builtin(local_invocation_id) local_id: vec3<u32>,
    @builtin(workgroup_id) group_id: vec3<u32>
) {{
    let tid = local_id.x;
    let idx = group_id.x * {block_size}u + tid;

    let flag = flags[idx];
    scratch[tid] = flag;
    workgroupBarrier();

    for (var stride = 1u; stride < {block_size}u; stride = stride * 2u) {{
        var addend = vec4<u32>(0u);
        if tid >= stride {{
            addend = scratch[tid - stride];
        }}
        workgroupBarrier();
        scratch[tid] = scratch[tid] + addend;
        workgroupBarrier();
    }}

    let inclusive = scratch[tid];
    local_scan[idx] = inclusive - flag;
    if tid == {block_size}u - 1u {{
        block_totals[group_id.x] = inclusive;
    }}
}}
"#,
        block_size = block_size
    )
}

const RESOLVE_BODY_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> block_totals: array<vec4<u32>>;
@group(0) @binding(1) var<storage, read_write> block_offsets: array<vec4<u32>>;
@group(0) @binding(2) var<storage, read_write> digit_base: vec4<u32>;
@group(0) @binding(3) var<uniform> params: SortParams;

@compute @workgroup_size(1)
fn main() {
    var running = vec4<u32>(0u);
    for (var b = 0u; b < params.num_blocks; b = b + 1u) {
        block_offsets[b] = running;
        running = running + block_totals[b];
    }
    digit_base = vec4<u32>(
        0u,
        running.x,
        running.x + running.y,
        running.x + running.y + running.z
    );
}
"#;

/// Resolve pass: block offsets and digit bases, single invocation.
pub fn resolve_shader() -> String {
    format!("{}\n{}", SORT_PARAMS_WGSL, RESOLVE_BODY_WGSL)
}

const REORDER_BODY_WGSL: &str = r#"
@group(0) @binding(0) var<storage, read> keys_in: array<u32>;
@group(0) @binding(1) var<storage, read> values_in: array<u32>;
@group(0) @binding(2) var<storage, read_write> keys_out: array<u32>;
@group(0) @binding(3) var<storage, read_write> values_out: array<u32>;
@group(0) @binding(4) var<storage, read> local_scan: array<vec4<u32>>;
@group(0) @binding(5) var<storage, read> block_offsets: array<vec4<u32>>;
@group(0) @binding(6) var<storage, read> digit_base: vec4<u32>;
@group(0) @binding(7) var<uniform> params: SortParams;

@compute @workgroup_size(256)
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {
    let idx = global_id.x;
    if idx >= params.len {
        return;
    }

    let key = keys_in[idx];
    let digit = (key >> params.shift) & 3u;
    let block_index = idx / params.block_size;
    let dest = digit_base[digit] + block_offsets[block_index][digit] + local_scan[idx][digit];

    keys_out[dest] = key;
    values_out[dest] = values_in[idx];
}
"#;

/// Reorder pass: scatter real elements to their resolved positions.
pub fn reorder_shader() -> String {
    format!("{}\n{}", SORT_PARAMS_WGSL, REORDER_BODY_WGSL)
}

//! Every WGSL source the GPU backend builds must parse and validate.
//!
//! Runs without a GPU: naga is the same front end wgpu uses at pipeline
//! creation.

use flowsort::shaders;

fn validate_wgsl(code: &str) -> Result<(), String> {
    let module = naga::front::wgsl::parse_str(code).map_err(|e| format!("WGSL parse error: {:?}", e))?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    validator
        .validate(&module)
        .map_err(|e| format!("WGSL validation error: {:?}", e))?;

    Ok(())
}

#[test]
fn test_advect_shader_validates() {
    validate_wgsl(&shaders::advect_shader()).unwrap();
}

#[test]
fn test_key_shader_validates() {
    validate_wgsl(shaders::KEYS_WGSL).unwrap();
}

#[test]
fn test_flags_shader_validates() {
    validate_wgsl(&shaders::flags_shader()).unwrap();
}

#[test]
fn test_block_scan_shader_validates_for_each_block_size() {
    for block_size in [1, 2, 64, 128, 256] {
        validate_wgsl(&shaders::block_scan_shader(block_size))
            .unwrap_or_else(|e| panic!("block size {}: {}", block_size, e));
    }
}

#[test]
fn test_resolve_shader_validates() {
    validate_wgsl(&shaders::resolve_shader()).unwrap();
}

#[test]
fn test_reorder_shader_validates() {
    validate_wgsl(&shaders::reorder_shader()).unwrap();
}

#[test]
fn test_every_shader_has_main_entry_point() {
    let sources = [
        shaders::advect_shader(),
        shaders::KEYS_WGSL.to_string(),
        shaders::flags_shader(),
        shaders::block_scan_shader(256),
        shaders::resolve_shader(),
        shaders::reorder_shader(),
    ];
    for source in &sources {
        let module = naga::front::wgsl::parse_str(source).unwrap();
        assert_eq!(module.entry_points.len(), 1);
        assert_eq!(module.entry_points[0].name, "main");
        assert_eq!(module.entry_points[0].stage, naga::ShaderStage::Compute);
    }
}

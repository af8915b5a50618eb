// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Result;
use env_logger::Env;
use glint_core::math::{Color, Mat4};
use glint_core::renderer::api::gl;
use glint_core::renderer::{
    GlDevice, GraphicsConfig, GraphicsContext, ResourceError, ResourceKind, ResourceState,
    ShaderError, ShaderProgram,
};
use glint_infra::graphics::UniformValue;
use glint_infra::HeadlessDevice;
use std::rc::Rc;

const VERTEX_SHADER: &str = r#"
attribute vec3 a_position;
attribute vec2 a_texCoord0;
uniform mat4 u_projTrans;
uniform vec2 u_offsets[3];
varying vec2 v_texCoords;
void main() {
    v_texCoords = a_texCoord0 + u_offsets[0];
    gl_Position = u_projTrans * vec4(a_position, 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
uniform sampler2D u_texture;
uniform vec4 u_tint;
varying vec2 v_texCoords;
void main() {
    gl_FragColor = texture2D(u_texture, v_texCoords) * u_tint;
}
"#;

fn setup_with(config: GraphicsConfig) -> (Rc<HeadlessDevice>, GraphicsContext) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
    let device = Rc::new(HeadlessDevice::default());
    let ctx = GraphicsContext::new(device.clone(), config);
    (device, ctx)
}

fn setup() -> (Rc<HeadlessDevice>, GraphicsContext) {
    setup_with(GraphicsConfig {
        check_gl_errors: true,
        ..GraphicsConfig::default()
    })
}

#[test]
fn test_compile_and_introspect() -> Result<()> {
    let (device, ctx) = setup();
    let shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;

    assert!(shader.is_compiled());
    assert_eq!(shader.state(), ResourceState::Ready);
    assert!(device.is_program_linked(shader.handle()));
    assert!(ctx.is_managed(ResourceKind::ShaderProgram, shader.id()));

    assert_eq!(
        shader.uniform_names(),
        ["u_offsets", "u_projTrans", "u_texture", "u_tint"]
    );
    assert_eq!(shader.attribute_names(), ["a_position", "a_texCoord0"]);
    assert_eq!(shader.uniform_type("u_projTrans"), Some(gl::FLOAT_MAT4));
    assert_eq!(shader.uniform_type("u_texture"), Some(gl::SAMPLER_2D));
    assert_eq!(shader.uniform_size("u_offsets"), Some(3));
    assert_eq!(shader.attribute_type("a_texCoord0"), Some(gl::FLOAT_VEC2));
    assert_eq!(shader.attribute_location("a_position"), Some(0));
    assert!(shader.has_uniform("u_tint"));
    assert!(!shader.has_attribute("a_normal"));
    Ok(())
}

#[test]
fn test_unknown_uniform_is_ignored_unless_pedantic() -> Result<()> {
    let (device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;

    shader.set_uniform_i("nonexistent", &[1])?;
    assert_eq!(device.call_count("uniform_1i"), 0);
    assert_eq!(shader.fetch_uniform_location("nonexistent", false)?, -1);

    let err = shader.fetch_uniform_location("nonexistent", true).unwrap_err();
    assert!(matches!(
        err,
        ResourceError::Shader(ShaderError::UnknownUniform(ref name)) if name == "nonexistent"
    ));
    let err = shader.fetch_attribute_location("a_normal", true).unwrap_err();
    assert!(matches!(err, ResourceError::Shader(ShaderError::UnknownAttribute(_))));
    Ok(())
}

#[test]
fn test_locations_are_cached() -> Result<()> {
    let (device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    let lookups = device.call_count("get_uniform_location");

    shader.fetch_uniform_location("u_tint", true)?;
    shader.fetch_uniform_location("missing", false)?;
    shader.fetch_uniform_location("missing", false)?;

    // Active uniforms were resolved at link time; only the unknown name is queried, once.
    assert_eq!(device.call_count("get_uniform_location"), lookups + 1);
    Ok(())
}

#[test]
fn test_uniform_values_reach_the_program() -> Result<()> {
    let (device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;
    let program = shader.handle();

    shader.set_uniform_i("u_texture", &[2])?;
    shader.set_uniform_color("u_tint", Color::RED)?;
    shader.set_uniform_mat4("u_projTrans", &Mat4::IDENTITY)?;
    shader.set_uniform_2fv("u_offsets", &[0.0, 0.5, 1.0, 1.5, 2.0, 2.5])?;
    shader.set_uniform_f("u_offsets[2]", &[9.0, 9.5])?;

    assert_eq!(device.uniform_value(program, "u_texture"), Some(UniformValue::Int(vec![2])));
    assert_eq!(
        device.uniform_value(program, "u_tint"),
        Some(UniformValue::Float(vec![1.0, 0.0, 0.0, 1.0]))
    );
    assert_eq!(
        device.uniform_value(program, "u_projTrans"),
        Some(UniformValue::Matrix {
            dimension: 4,
            transpose: false,
            values: Mat4::IDENTITY.to_cols_array().to_vec(),
        })
    );
    assert_eq!(
        device.uniform_value(program, "u_offsets"),
        Some(UniformValue::Float(vec![0.0, 0.5, 1.0, 1.5, 2.0, 2.5]))
    );
    assert_eq!(
        device.uniform_value(program, "u_offsets[2]"),
        Some(UniformValue::Float(vec![9.0, 9.5]))
    );
    assert_eq!(device.get_error(), gl::NO_ERROR);
    Ok(())
}

#[test]
fn test_invalid_uniform_arguments() -> Result<()> {
    let (_device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;

    let err = shader.set_uniform_i("u_texture", &[1, 2, 3, 4, 5]).unwrap_err();
    assert!(matches!(err, ResourceError::InvalidArgument(_)));
    let err = shader.set_uniform_f("u_tint", &[]).unwrap_err();
    assert!(matches!(err, ResourceError::InvalidArgument(_)));
    let err = shader.set_uniform_matrix("u_projTrans", &[1.0; 8], false).unwrap_err();
    assert!(matches!(err, ResourceError::Shader(ShaderError::InvalidMatrixSize(8))));
    Ok(())
}

#[test]
fn test_compile_error_reports_stage_and_log() {
    let (device, ctx) = setup();
    let broken = "#error missing lighting model\nvoid main() {}";

    let err = ShaderProgram::new(&ctx, VERTEX_SHADER, broken).unwrap_err();

    match err {
        ResourceError::Shader(ShaderError::Compilation { stage, log }) => {
            assert_eq!(stage, "fragment");
            assert!(log.contains("missing lighting model"), "got: {log}");
        }
        other => panic!("expected a compilation error, got {other:?}"),
    }
    // The vertex stage that did compile is released.
    assert_eq!(device.live_shaders(), 0);
    assert_eq!(device.live_programs(), 0);
    assert_eq!(ctx.managed_count(ResourceKind::ShaderProgram), 0);
}

#[test]
fn test_missing_main_fails_vertex_stage() {
    let (_device, ctx) = setup();
    let err = ShaderProgram::new(&ctx, "attribute vec3 a_position;", FRAGMENT_SHADER).unwrap_err();
    assert!(matches!(
        err,
        ResourceError::Shader(ShaderError::Compilation { stage: "vertex", .. })
    ));
}

#[test]
fn test_link_error_on_conflicting_uniform() {
    let (device, ctx) = setup();
    let vertex = "uniform float u_x;\nvoid main() { gl_Position = vec4(u_x); }";
    let fragment = "uniform vec2 u_x;\nvoid main() { gl_FragColor = vec4(u_x, 0.0, 1.0); }";

    let err = ShaderProgram::new(&ctx, vertex, fragment).unwrap_err();

    match err {
        ResourceError::Shader(ShaderError::Link { log }) => {
            assert!(log.contains("u_x"), "got: {log}");
        }
        other => panic!("expected a link error, got {other:?}"),
    }
    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_shaders(), 0);
}

#[test]
fn test_configured_prefixes_are_prepended() -> Result<()> {
    let (_device, ctx) = setup_with(GraphicsConfig {
        prepend_vertex_code: "#version 100\n".into(),
        prepend_fragment_code: "#version 100\nprecision mediump float;\nuniform float u_time;\n"
            .into(),
        ..GraphicsConfig::default()
    });

    let shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;

    assert!(shader.vertex_source().starts_with("#version 100\n"));
    assert!(shader.vertex_source().ends_with(VERTEX_SHADER));
    assert!(shader.fragment_source().contains("precision mediump float;"));
    assert!(shader.has_uniform("u_time"));
    Ok(())
}

#[test]
fn test_recompiles_after_context_loss() -> Result<()> {
    let (device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    let old = shader.handle();

    device.lose_context();
    assert_eq!(ctx.invalidate_all_shader_programs(), 1);
    assert_eq!(shader.state(), ResourceState::Invalidated);

    shader.bind()?;

    assert_eq!(shader.state(), ResourceState::Ready);
    assert_ne!(shader.handle(), old);
    assert!(device.is_program_linked(shader.handle()));
    assert_eq!(device.current_program(), shader.handle());
    assert_eq!(device.call_count("link_program"), 2);

    shader.set_uniform_i("u_texture", &[0])?;
    assert_eq!(
        device.uniform_value(shader.handle(), "u_texture"),
        Some(UniformValue::Int(vec![0]))
    );
    Ok(())
}

#[test]
fn test_failed_recompile_is_not_retried() -> Result<()> {
    let (device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;

    device.lose_context();
    ctx.invalidate_all();
    device.fail_next_allocation();

    let err = shader.bind().unwrap_err();
    assert!(matches!(
        err,
        ResourceError::Shader(ShaderError::Compilation { stage: "vertex", .. })
    ));
    assert_eq!(shader.state(), ResourceState::Unloaded);
    assert!(!shader.is_compiled());

    let err = shader.bind().unwrap_err();
    assert!(matches!(err, ResourceError::Shader(ShaderError::NotCompiled { .. })));
    assert_eq!(device.call_count("create_shader"), 3);
    Ok(())
}

#[test]
fn test_dispose() -> Result<()> {
    let (device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;

    shader.dispose();
    shader.dispose();

    assert_eq!(device.live_programs(), 0);
    assert_eq!(device.live_shaders(), 0);
    assert_eq!(device.current_program(), 0);
    assert_eq!(shader.handle(), 0);
    assert_eq!(ctx.managed_count(ResourceKind::ShaderProgram), 0);
    assert!(matches!(
        shader.bind(),
        Err(ResourceError::Disposed("shader program"))
    ));
    Ok(())
}

#[test]
fn test_dispose_after_context_loss_skips_dead_handles() -> Result<()> {
    let (device, ctx) = setup();
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;

    device.lose_context();
    ctx.invalidate_all_shader_programs();
    shader.dispose();

    assert_eq!(device.call_count("delete_program"), 0);
    assert_eq!(device.call_count("delete_shader"), 0);
    assert_eq!(shader.handle(), 0);
    assert_eq!(ctx.managed_count(ResourceKind::ShaderProgram), 0);
    Ok(())
}

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
use approx::assert_relative_eq;
use env_logger::Env;
use glint_core::math::{Mat4, Vec3};
use glint_core::renderer::api::gl;
use glint_core::renderer::{
    GraphicsConfig, GraphicsContext, Mesh, ResourceError, ResourceKind, ResourceState,
    ShaderProgram, VertexAttribute, VertexAttributes, VertexUsage,
};
use glint_infra::graphics::DrawCall;
use glint_infra::HeadlessDevice;
use std::rc::Rc;

const VERTEX_SHADER: &str = r#"
attribute vec3 a_position;
attribute vec4 a_color;
attribute vec2 a_offset;
uniform mat4 u_projTrans;
varying vec4 v_color;
void main() {
    v_color = a_color;
    gl_Position = u_projTrans * vec4(a_position + vec3(a_offset, 0.0), 1.0);
}
"#;

const FRAGMENT_SHADER: &str = r#"
varying vec4 v_color;
void main() {
    gl_FragColor = v_color;
}
"#;

const QUAD: [f32; 12] = [
    0.0, 0.0, 0.0, //
    1.0, 0.0, 0.0, //
    1.0, 1.0, 0.0, //
    0.0, 1.0, 0.0,
];
const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

fn setup() -> (Rc<HeadlessDevice>, GraphicsContext) {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
    let device = Rc::new(HeadlessDevice::default());
    let config = GraphicsConfig {
        check_gl_errors: true,
        ..GraphicsConfig::default()
    };
    let ctx = GraphicsContext::new(device.clone(), config);
    (device, ctx)
}

fn quad_mesh(ctx: &GraphicsContext) -> Result<Mesh> {
    let mut mesh = Mesh::with_attributes(ctx, true, 4, 6, vec![VertexAttribute::position()])?;
    mesh.set_vertices(&QUAD)?.set_indices(&QUAD_INDICES)?;
    Ok(mesh)
}

fn to_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_ne_bytes()).collect()
}

#[test]
fn test_bounding_box_of_unit_quad() -> Result<()> {
    let (_device, ctx) = setup();
    let mesh = quad_mesh(&ctx)?;

    let bounds = mesh.calculate_bounding_box()?;

    assert_eq!(bounds.min, Vec3::new(0.0, 0.0, 0.0));
    assert_eq!(bounds.max, Vec3::new(1.0, 1.0, 0.0));
    Ok(())
}

#[test]
fn test_bounding_box_of_a_part() -> Result<()> {
    let (_device, ctx) = setup();
    let mesh = quad_mesh(&ctx)?;

    // Indices 3..6 reference vertices 2, 3 and 0.
    let part = mesh.calculate_bounding_box_range(3, 3, None)?;
    assert_eq!(part.min, Vec3::new(0.0, 0.0, 0.0));
    assert_eq!(part.max, Vec3::new(1.0, 1.0, 0.0));

    let moved = Mat4::from_translation(Vec3::new(10.0, 0.0, 0.0));
    let part = mesh.calculate_bounding_box_range(0, 2, Some(&moved))?;
    assert_relative_eq!(part.min.x, 10.0);
    assert_relative_eq!(part.max.x, 11.0);

    let err = mesh.calculate_bounding_box_range(4, 3, None).unwrap_err();
    assert!(matches!(err, ResourceError::InvalidArgument(_)));
    Ok(())
}

#[test]
fn test_radius() -> Result<()> {
    let (_device, ctx) = setup();
    let mesh = quad_mesh(&ctx)?;
    let radius = mesh.calculate_radius(Vec3::ZERO, 0, 6, None)?;
    assert_relative_eq!(radius, 2.0f32.sqrt(), epsilon = 1e-6);
    Ok(())
}

#[test]
fn test_empty_mesh_has_no_bounds() -> Result<()> {
    let (_device, ctx) = setup();
    let mesh = Mesh::with_attributes(&ctx, false, 4, 0, vec![VertexAttribute::position()])?;
    assert!(matches!(mesh.calculate_bounding_box(), Err(ResourceError::NoVertices)));

    let mut colors = Mesh::with_attributes(&ctx, false, 1, 0, vec![VertexAttribute::color_unpacked()])?;
    colors.set_vertices(&[1.0, 1.0, 1.0, 1.0])?;
    assert!(matches!(
        colors.calculate_bounding_box(),
        Err(ResourceError::MissingAttribute("position"))
    ));
    Ok(())
}

#[test]
fn test_vertices_round_trip() -> Result<()> {
    let (_device, ctx) = setup();
    let mut mesh = Mesh::with_attributes(
        &ctx,
        false,
        3,
        0,
        vec![VertexAttribute::position(), VertexAttribute::color_unpacked()],
    )?;
    assert_eq!(mesh.vertex_size(), 28);

    let vertices: Vec<f32> = (0..21).map(|i| i as f32 * 0.5).collect();
    mesh.set_vertices(&vertices)?;
    assert_eq!(mesh.num_vertices(), 3);

    let mut out = vec![0.0; 21];
    mesh.get_vertices(0, 21, &mut out, 0)?;
    assert_eq!(out, vertices);

    let mut shifted = vec![-1.0; 9];
    mesh.get_vertices(7, 7, &mut shifted, 2)?;
    assert_eq!(&shifted[..2], &[-1.0, -1.0]);
    assert_eq!(&shifted[2..], &vertices[7..14]);

    let too_many = vec![0.0; 28];
    assert!(matches!(
        mesh.set_vertices(&too_many),
        Err(ResourceError::InsufficientCapacity { .. })
    ));
    Ok(())
}

#[test]
fn test_get_indices_boundary() -> Result<()> {
    let (_device, ctx) = setup();
    let mesh = quad_mesh(&ctx)?;
    let mut out = [0u16; 6];

    mesh.get_indices(3, 3, &mut out, 0)?;
    assert_eq!(&out[..3], &[2, 3, 0]);

    let err = mesh.get_indices(4, 3, &mut out, 0).unwrap_err();
    assert!(matches!(
        err,
        ResourceError::IndexOutOfRange {
            offset: 4,
            count: 3,
            len: 6
        }
    ));

    let err = mesh.get_indices(0, 6, &mut out, 1).unwrap_err();
    assert!(matches!(err, ResourceError::InsufficientCapacity { .. }));
    Ok(())
}

#[test]
fn test_update_vertices_grows_populated_range() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = Mesh::with_attributes(&ctx, false, 4, 0, vec![VertexAttribute::position()])?;
    mesh.update_vertices(3, &[1.0, 2.0, 3.0])?;

    assert_eq!(mesh.num_vertices(), 2);
    assert_eq!(mesh.vertices(), &[0.0, 0.0, 0.0, 1.0, 2.0, 3.0]);
    assert!(mesh.update_vertices(10, &[1.0, 2.0, 3.0]).is_err());
    // Nothing is sent before the mesh is bound.
    assert_eq!(device.call_count("buffer_sub_data"), 0);
    Ok(())
}

#[test]
fn test_render_indexed() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;

    shader.bind()?;
    mesh.render_all(&mut shader, gl::TRIANGLES)?;

    assert_eq!(
        device.draw_calls(),
        [DrawCall {
            mode: gl::TRIANGLES,
            first: 0,
            count: 6,
            index_type: Some(gl::UNSIGNED_SHORT),
            offset: 0,
            instances: 1,
            program: shader.handle(),
        }]
    );
    let uploaded = device
        .buffer_contents(mesh.vertex_buffer_handle())
        .expect("vertex buffer should exist");
    assert_eq!(uploaded, to_bytes(&QUAD));
    assert_eq!(device.buffer_usage(mesh.vertex_buffer_handle()), Some(gl::STATIC_DRAW));

    let position = device.vertex_attrib_state(0).expect("attribute 0");
    assert_eq!((position.size, position.stride), (3, 12));
    // Auto-bind leaves the arrays disabled again.
    assert!(!position.enabled);
    assert_eq!(device.bound_buffer(gl::ARRAY_BUFFER), 0);
    Ok(())
}

#[test]
fn test_render_range_out_of_bounds() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;

    let err = mesh.render(&mut shader, gl::TRIANGLES, 4, 3, true).unwrap_err();
    assert!(matches!(err, ResourceError::IndexOutOfRange { .. }));
    mesh.render(&mut shader, gl::TRIANGLES, 3, 0, true)?;
    assert!(device.draw_calls().is_empty());
    Ok(())
}

#[test]
fn test_render_without_indices_draws_arrays() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = Mesh::with_attributes(&ctx, false, 3, 0, vec![VertexAttribute::position()])?;
    mesh.set_vertices(&QUAD[..9])?;
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;

    mesh.render_all(&mut shader, gl::TRIANGLES)?;

    assert_eq!(device.call_count("draw_arrays"), 1);
    assert_eq!(device.call_count("draw_elements"), 0);
    let draw = device.draw_calls()[0];
    assert_eq!((draw.first, draw.count, draw.index_type), (0, 3, None));
    assert_eq!(device.buffer_usage(mesh.vertex_buffer_handle()), Some(gl::DYNAMIC_DRAW));
    Ok(())
}

#[test]
fn test_render_without_program_reports_device_error() -> Result<()> {
    let (_device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;

    let err = mesh.render_all(&mut shader, gl::TRIANGLES).unwrap_err();
    assert!(matches!(
        err,
        ResourceError::Gl {
            operation: "draw",
            code: gl::INVALID_OPERATION
        }
    ));
    Ok(())
}

#[test]
fn test_instanced_rendering() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;
    let per_instance =
        VertexAttributes::new(vec![VertexAttribute::float(VertexUsage::Generic, 2, "a_offset")])?;
    mesh.enable_instanced_rendering(false, 3, per_instance)?;
    mesh.set_instance_data(&[0.0, 0.0, 2.0, 0.0, 4.0, 0.0])?;
    assert_eq!(mesh.num_instances(), 3);

    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;
    mesh.render_all(&mut shader, gl::TRIANGLES)?;

    assert_eq!(device.call_count("draw_elements_instanced"), 1);
    assert_eq!(device.draw_calls()[0].instances, 3);
    let offset = shader.attribute_location("a_offset").expect("a_offset is active");
    let state = device.vertex_attrib_state(offset as u32).expect("attribute state");
    // Divisors are reset when the mesh is unbound.
    assert_eq!(state.divisor, 0);
    assert_eq!(device.call_count("vertex_attrib_divisor"), 2);

    let per_instance =
        VertexAttributes::new(vec![VertexAttribute::float(VertexUsage::Generic, 2, "a_offset")])?;
    assert!(mesh.enable_instanced_rendering(false, 3, per_instance).is_err());
    mesh.disable_instanced_rendering();
    assert!(mesh.set_instance_data(&[0.0, 0.0]).is_err());
    Ok(())
}

#[test]
fn test_buffers_are_restored_after_context_loss() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;
    let mut shader = ShaderProgram::new(&ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
    shader.bind()?;
    mesh.render_all(&mut shader, gl::TRIANGLES)?;
    let old_buffer = mesh.vertex_buffer_handle();

    device.lose_context();
    ctx.invalidate_all();
    assert_eq!(mesh.state(), ResourceState::Invalidated);

    shader.bind()?;
    mesh.render_all(&mut shader, gl::TRIANGLES)?;

    assert_eq!(mesh.state(), ResourceState::Ready);
    assert_ne!(mesh.vertex_buffer_handle(), old_buffer);
    let restored = device
        .buffer_contents(mesh.vertex_buffer_handle())
        .expect("vertex buffer should be recreated");
    assert_eq!(restored, to_bytes(&QUAD));
    assert_eq!(device.draw_calls().len(), 2);
    Ok(())
}

#[test]
fn test_transform_and_scale() -> Result<()> {
    let (_device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;

    mesh.scale(2.0, 3.0, 1.0)?;
    let bounds = mesh.calculate_bounding_box()?;
    assert_eq!(bounds.max, Vec3::new(2.0, 3.0, 0.0));

    mesh.transform_range(&Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)), 1, 1)?;
    let mut second = [0.0; 3];
    mesh.get_vertices(3, 3, &mut second, 0)?;
    assert_eq!(second, [2.0, 0.0, 5.0]);
    assert!(mesh.transform_range(&Mat4::IDENTITY, 3, 2).is_err());
    Ok(())
}

#[test]
fn test_copy_removes_duplicates() -> Result<()> {
    let (_device, ctx) = setup();
    let mut mesh = Mesh::with_attributes(&ctx, true, 6, 6, vec![VertexAttribute::position()])?;
    mesh.set_vertices(&[
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        1.0, 1.0, 0.0, //
        1.0, 1.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0,
    ])?;
    mesh.set_indices(&[0, 1, 2, 3, 4, 5])?;

    let copy = mesh.copy(true, true, None)?;

    assert_eq!(copy.num_vertices(), 4);
    assert_eq!(copy.vertices(), &QUAD);
    assert_eq!(copy.indices(), &QUAD_INDICES);
    assert_ne!(copy.id(), mesh.id());
    assert_eq!(ctx.managed_count(ResourceKind::Mesh), 2);
    Ok(())
}

#[test]
fn test_copy_without_indices_keeps_every_vertex() -> Result<()> {
    let (_device, ctx) = setup();
    // Two triangles sharing an edge, drawn without an index buffer.
    let triangles = [
        0.0, 0.0, 0.0, //
        1.0, 0.0, 0.0, //
        1.0, 1.0, 0.0, //
        1.0, 1.0, 0.0, //
        0.0, 1.0, 0.0, //
        0.0, 0.0, 0.0,
    ];
    let mut mesh = Mesh::with_attributes(&ctx, true, 6, 0, vec![VertexAttribute::position()])?;
    mesh.set_vertices(&triangles)?;

    let copy = mesh.copy(true, true, None)?;

    assert_eq!(copy.num_vertices(), 6);
    assert_eq!(copy.num_indices(), 0);
    assert_eq!(copy.vertices(), &triangles);
    Ok(())
}

#[test]
fn test_copy_keeps_selected_attributes() -> Result<()> {
    let (_device, ctx) = setup();
    let mut mesh = Mesh::with_attributes(
        &ctx,
        false,
        2,
        0,
        vec![VertexAttribute::position(), VertexAttribute::normal()],
    )?;
    mesh.set_vertices(&[1.0, 2.0, 3.0, 0.0, 0.0, 1.0, 4.0, 5.0, 6.0, 0.0, 1.0, 0.0])?;

    let copy = mesh.copy(false, false, Some(&[VertexUsage::Position]))?;

    assert_eq!(copy.vertex_size(), 12);
    assert_eq!(copy.vertices(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    assert!(copy.vertex_attribute(VertexUsage::Normal).is_none());
    Ok(())
}

#[test]
fn test_dispose_releases_buffers() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;
    assert_eq!(device.live_buffers(), 2);

    mesh.dispose();
    mesh.dispose();

    assert_eq!(device.live_buffers(), 0);
    assert_eq!(ctx.managed_count(ResourceKind::Mesh), 0);
    assert!(matches!(mesh.set_vertices(&QUAD), Err(ResourceError::Disposed("mesh"))));
    Ok(())
}

#[test]
fn test_dispose_after_context_loss_skips_dead_buffers() -> Result<()> {
    let (device, ctx) = setup();
    let mut mesh = quad_mesh(&ctx)?;

    device.lose_context();
    ctx.invalidate_all_meshes();
    mesh.dispose();

    assert_eq!(device.call_count("delete_buffer"), 0);
    assert_eq!(mesh.state(), ResourceState::Disposed);
    assert_eq!(ctx.managed_count(ResourceKind::Mesh), 0);
    Ok(())
}

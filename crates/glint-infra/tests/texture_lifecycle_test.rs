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
use glint_core::math::Color;
use glint_core::renderer::api::gl;
use glint_core::renderer::{
    GlDevice, GraphicsConfig, GraphicsContext, PixelFormat, Pixmap, PixmapTextureData,
    ResourceError, ResourceKind, ResourceState, Texture, TextureFilter, TextureWrap,
};
use glint_infra::{HeadlessConfig, HeadlessDevice};
use std::rc::Rc;

fn init_logger() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}

fn setup_with(device: HeadlessDevice, config: GraphicsConfig) -> (Rc<HeadlessDevice>, GraphicsContext) {
    init_logger();
    let device = Rc::new(device);
    let ctx = GraphicsContext::new(device.clone(), config);
    (device, ctx)
}

fn setup() -> (Rc<HeadlessDevice>, GraphicsContext) {
    let config = GraphicsConfig {
        check_gl_errors: true,
        ..GraphicsConfig::default()
    };
    setup_with(HeadlessDevice::default(), config)
}

fn red_pixmap(width: u32, height: u32) -> Result<Pixmap> {
    let mut pixmap = Pixmap::new(width, height, PixelFormat::Rgba8888)?;
    pixmap.set_color(Color::RED);
    pixmap.fill();
    Ok(pixmap)
}

#[test]
fn test_filled_pixmap_uploads_as_one_rgba_image() -> Result<()> {
    let (device, ctx) = setup();

    let pixmap = red_pixmap(2, 2)?;
    let red = Color::pack_rgba(255, 0, 0, 255);
    assert_eq!(pixmap.get_pixel(0, 0), red);
    assert_eq!(pixmap.get_pixel(1, 1), red);

    let mut texture = Texture::from_pixmap(&ctx, pixmap, false)?;
    texture.upload()?;

    assert_eq!(device.call_count("tex_image_2d"), 1);
    let level = device
        .texture_level(texture.handle(), 0)
        .expect("level 0 should be specified");
    assert_eq!((level.width, level.height), (2, 2));
    assert_eq!(level.format, gl::RGBA);
    assert_eq!(level.ty, gl::UNSIGNED_BYTE);
    assert_eq!(level.pixels, [255, 0, 0, 255].repeat(4));
    assert_eq!(texture.state(), ResourceState::Ready);
    Ok(())
}

#[test]
fn test_upload_is_idempotent() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(4, 4)?, false)?;

    // Construction alone does not touch the image.
    assert_eq!(device.call_count("tex_image_2d"), 0);
    texture.upload()?;
    texture.upload()?;
    texture.ensure_uploaded()?;
    texture.bind()?;

    assert_eq!(device.call_count("tex_image_2d"), 1);
    Ok(())
}

#[test]
fn test_unmanaged_textures_are_not_registered() -> Result<()> {
    let (_device, ctx) = setup();
    let mut unmanaged = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;
    let managed = Texture::from_pixmap_managed(&ctx, red_pixmap(2, 2)?, false)?;

    assert!(!unmanaged.is_managed());
    assert!(managed.is_managed());
    assert_eq!(ctx.managed_count(ResourceKind::Texture), 1);
    assert!(ctx.is_managed(ResourceKind::Texture, managed.id()));

    unmanaged.upload()?;
    let err = unmanaged.reload().unwrap_err();
    assert!(matches!(err, ResourceError::NotManaged("texture")));
    Ok(())
}

#[test]
fn test_reload_after_context_loss_reuploads_retained_data() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap_managed(&ctx, red_pixmap(2, 2)?, false)?;
    texture.upload()?;
    let old_handle = texture.handle();
    let before = device.texture_level(old_handle, 0);

    device.lose_context();
    assert_eq!(ctx.invalidate_all_textures(), 1);
    assert_eq!(texture.state(), ResourceState::Invalidated);

    texture.reload()?;

    let new_handle = texture.handle();
    assert_ne!(new_handle, 0);
    assert_ne!(new_handle, old_handle);
    assert_eq!(device.call_count("gen_texture"), 2);
    assert_eq!(device.call_count("tex_image_2d"), 2);
    // The dead handle is not deleted again.
    assert_eq!(device.call_count("delete_texture"), 0);
    assert_eq!(device.texture_level(new_handle, 0), before);
    assert_eq!(texture.state(), ResourceState::Ready);
    Ok(())
}

#[test]
fn test_invalidated_texture_reloads_on_next_bind() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap_managed(&ctx, red_pixmap(2, 2)?, false)?;
    texture.bind_to(0)?;
    let old_handle = texture.handle();

    device.lose_context();
    ctx.invalidate_all();

    let bound = texture.bind_to(0)?.handle();
    assert_ne!(bound, old_handle);
    assert!(device.is_texture(bound));
    assert_eq!(device.bound_texture(0, gl::TEXTURE_2D), bound);
    assert_eq!(device.get_error(), gl::NO_ERROR);
    Ok(())
}

#[test]
fn test_reload_of_live_texture_replaces_handle() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap_managed(&ctx, red_pixmap(2, 2)?, false)?;
    texture.upload()?;
    let old_handle = texture.handle();

    texture.reload()?;

    assert!(!device.is_texture(old_handle));
    assert!(device.is_texture(texture.handle()));
    assert_eq!(device.live_textures(), 1);
    Ok(())
}

#[test]
fn test_dispose_is_idempotent_and_final() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap_managed(&ctx, red_pixmap(2, 2)?, false)?;
    texture.upload()?;

    texture.dispose();
    texture.dispose();

    assert_eq!(device.call_count("delete_texture"), 1);
    assert_eq!(device.live_textures(), 0);
    assert_eq!(ctx.managed_count(ResourceKind::Texture), 0);
    assert!(matches!(texture.upload(), Err(ResourceError::Disposed("texture"))));
    assert!(texture.bind().is_err());
    Ok(())
}

#[test]
fn test_dispose_after_context_loss_skips_dead_handle() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap_managed(&ctx, red_pixmap(2, 2)?, false)?;
    texture.upload()?;

    device.lose_context();
    ctx.invalidate_all_textures();
    texture.dispose();

    assert_eq!(device.call_count("delete_texture"), 0);
    assert_eq!(texture.handle(), 0);
    assert_eq!(texture.state(), ResourceState::Disposed);
    assert_eq!(ctx.managed_count(ResourceKind::Texture), 0);
    Ok(())
}

#[test]
fn test_load_rejects_provider_with_other_managed_status() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;
    texture.upload()?;
    let uploads = device.call_count("tex_image_2d");

    let managed = PixmapTextureData::new(red_pixmap(4, 4)?, None, false, false).with_managed(true);
    let err = texture.load(Box::new(managed)).unwrap_err();

    assert!(matches!(err, ResourceError::ManagedMismatch));
    assert_eq!((texture.width(), texture.height()), (2, 2));
    assert_eq!(device.call_count("tex_image_2d"), uploads);
    Ok(())
}

#[test]
fn test_load_uploads_new_provider() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap_managed(&ctx, red_pixmap(2, 2)?, false)?;
    texture.upload()?;
    let handle = texture.handle();

    let larger = PixmapTextureData::new(red_pixmap(4, 3)?, None, false, false).with_managed(true);
    texture.load(Box::new(larger))?;

    assert_eq!((texture.width(), texture.height()), (4, 3));
    assert_eq!(texture.handle(), handle);
    assert_eq!(texture.state(), ResourceState::Ready);
    let level = device
        .texture_level(handle, 0)
        .expect("level 0 should be respecified");
    assert_eq!((level.width, level.height), (4, 3));
    assert_eq!(device.call_count("tex_image_2d"), 2);
    Ok(())
}

#[test]
fn test_drop_releases_gpu_object() -> Result<()> {
    let (device, ctx) = setup();
    {
        let mut texture = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;
        texture.upload()?;
        assert_eq!(device.live_textures(), 1);
    }
    assert_eq!(device.live_textures(), 0);
    Ok(())
}

#[test]
fn test_sampler_state_is_applied_once() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;
    texture.upload()?;
    device.reset_call_counts();

    texture.set_filter(TextureFilter::Linear, TextureFilter::Linear)?;
    assert_eq!(device.call_count("tex_parameter_i"), 2);
    texture.set_filter(TextureFilter::Linear, TextureFilter::Linear)?;
    assert_eq!(device.call_count("tex_parameter_i"), 2);

    texture.set_wrap(TextureWrap::Repeat, TextureWrap::ClampToEdge)?;
    // Only U changed.
    assert_eq!(device.call_count("tex_parameter_i"), 3);

    let handle = texture.handle();
    assert_eq!(
        device.texture_parameter_i(handle, gl::TEXTURE_MIN_FILTER),
        Some(gl::LINEAR as i32)
    );
    assert_eq!(
        device.texture_parameter_i(handle, gl::TEXTURE_WRAP_S),
        Some(gl::REPEAT as i32)
    );
    assert_eq!(texture.min_filter(), TextureFilter::Linear);
    assert_eq!(texture.wrap_u(), TextureWrap::Repeat);
    Ok(())
}

#[test]
fn test_anisotropic_filter_is_clamped_to_device_maximum() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;

    let applied = texture.set_anisotropic_filter(64.0)?;
    assert_relative_eq!(applied, 16.0);
    assert_relative_eq!(texture.anisotropic_filter_level(), 16.0);
    let stored = device
        .texture_parameter_f(texture.handle(), gl::TEXTURE_MAX_ANISOTROPY_EXT)
        .expect("anisotropy should be set");
    assert_relative_eq!(stored, 16.0);

    // The maximum is queried once per context.
    texture.set_anisotropic_filter(4.0)?;
    assert_eq!(device.call_count("get_float"), 1);
    Ok(())
}

#[test]
fn test_anisotropic_filter_without_extension() -> Result<()> {
    let config = GraphicsConfig {
        check_gl_errors: true,
        ..GraphicsConfig::default()
    };
    let (device, ctx) = setup_with(HeadlessDevice::new(HeadlessConfig::without_extensions()), config);
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;

    assert_relative_eq!(ctx.max_anisotropic_filter_level(), 1.0);
    assert_relative_eq!(texture.set_anisotropic_filter(8.0)?, 1.0);
    assert_eq!(device.call_count("tex_parameter_f"), 0);
    assert_eq!(device.get_error(), gl::NO_ERROR);
    Ok(())
}

#[test]
fn test_hardware_mipmaps() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(8, 8)?, true)?;
    texture.upload()?;

    assert_eq!(device.call_count("generate_mipmap"), 1);
    assert_eq!(device.call_count("tex_image_2d"), 1);
    assert_eq!(device.mip_level_count(texture.handle()), 4);
    Ok(())
}

#[test]
fn test_cpu_mipmaps() -> Result<()> {
    let config = GraphicsConfig {
        check_gl_errors: true,
        hardware_mipmaps: false,
        ..GraphicsConfig::default()
    };
    let (device, ctx) = setup_with(HeadlessDevice::default(), config);
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(8, 8)?, true)?;
    texture.upload()?;

    assert_eq!(device.call_count("generate_mipmap"), 0);
    assert_eq!(device.call_count("tex_image_2d"), 4);
    let smallest = device
        .texture_level(texture.handle(), 3)
        .expect("level 3 should be specified");
    assert_eq!((smallest.width, smallest.height), (1, 1));
    assert_eq!(smallest.pixels, [255, 0, 0, 255]);

    let mut wide = Texture::from_pixmap(&ctx, red_pixmap(8, 4)?, true)?;
    assert!(matches!(wide.upload(), Err(ResourceError::InvalidArgument(_))));
    Ok(())
}

#[test]
fn test_indexed_pixmap_is_expanded_for_upload() -> Result<()> {
    let (device, ctx) = setup();
    let green = Color::pack_rgba(0, 255, 0, 255);
    let mut pixmap = Pixmap::with_palette(2, 1, vec![green])?;
    pixmap.fill();

    let mut texture = Texture::from_pixmap(&ctx, pixmap, false)?;
    texture.upload()?;

    let level = device.texture_level(texture.handle(), 0).expect("level 0");
    assert_eq!(level.format, gl::RGBA);
    assert_eq!(level.pixels, [0, 255, 0, 255].repeat(2));
    Ok(())
}

#[test]
fn test_rgb_rows_use_tight_unpack_alignment() -> Result<()> {
    let (device, ctx) = setup();
    // 3 pixels of 3 bytes give 9-byte rows, which only unpack correctly with alignment 1.
    let mut pixmap = Pixmap::new(3, 3, PixelFormat::Rgb888)?;
    pixmap.set_color(Color::BLUE);
    pixmap.fill();

    let mut texture = Texture::from_pixmap(&ctx, pixmap, false)?;
    texture.upload()?;

    assert_eq!(device.pixel_store(gl::UNPACK_ALIGNMENT), 1);
    let level = device.texture_level(texture.handle(), 0).expect("level 0");
    assert_eq!(level.pixels, [0, 0, 255].repeat(9));
    Ok(())
}

#[test]
fn test_draw_updates_unmanaged_texture() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::with_size(&ctx, 4, 4, PixelFormat::Rgba8888)?;
    let patch = red_pixmap(2, 2)?;

    texture.draw(&patch, 1, 1)?;

    let level = device.texture_level(texture.handle(), 0).expect("level 0");
    let pixel = |x: usize, y: usize| &level.pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
    assert_eq!(pixel(0, 0), [255, 255, 255, 255]);
    assert_eq!(pixel(1, 1), [255, 0, 0, 255]);
    assert_eq!(pixel(2, 2), [255, 0, 0, 255]);
    assert_eq!(pixel(3, 3), [255, 255, 255, 255]);
    Ok(())
}

#[test]
fn test_draw_is_rejected_on_managed_texture() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap_managed(&ctx, red_pixmap(4, 4)?, false)?;
    let err = texture.draw(&red_pixmap(1, 1)?, 0, 0).unwrap_err();
    assert!(matches!(err, ResourceError::InvalidArgument(_)));
    assert_eq!(device.call_count("tex_sub_image_2d"), 0);
    Ok(())
}

#[test]
fn test_storage_only_texture_allocates_without_data() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::storage_only(&ctx, 16, 8, PixelFormat::Rgb565)?;
    texture.upload()?;

    let level = device.texture_level(texture.handle(), 0).expect("level 0");
    assert_eq!((level.width, level.height), (16, 8));
    assert_eq!(level.ty, gl::UNSIGNED_SHORT_5_6_5);
    assert!(level.pixels.iter().all(|&b| b == 0));
    assert!(!texture.is_managed());
    Ok(())
}

#[test]
fn test_texture_units_are_activated_once() -> Result<()> {
    let (device, ctx) = setup();
    let mut first = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;
    let mut second = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;

    first.bind_to(2)?;
    second.bind_to(2)?;

    assert_eq!(device.call_count("active_texture"), 1);
    assert_eq!(device.active_unit(), 2);
    assert_eq!(device.bound_texture(2, gl::TEXTURE_2D), second.handle());
    Ok(())
}

#[test]
fn test_device_errors_surface_after_upload() -> Result<()> {
    let (device, ctx) = setup();
    let mut texture = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false)?;

    device.inject_error(gl::OUT_OF_MEMORY);
    let err = texture.upload().unwrap_err();
    assert!(matches!(
        err,
        ResourceError::Gl {
            code: gl::OUT_OF_MEMORY,
            ..
        }
    ));
    Ok(())
}

#[test]
fn test_handle_allocation_failure() -> Result<()> {
    let (device, ctx) = setup();
    device.fail_next_allocation();
    let err = Texture::from_pixmap(&ctx, red_pixmap(2, 2)?, false).unwrap_err();
    assert!(matches!(err, ResourceError::HandleAllocation("texture")));
    assert_eq!(ctx.managed_count(ResourceKind::Texture), 0);
    Ok(())
}

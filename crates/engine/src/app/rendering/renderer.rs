use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::ImageReader;
use pixels::{Error, Pixels, SurfaceTexture};
use tracing::warn;
use winit::window::Window;

use crate::app::{Camera2D, Entity, RenderableKind, SceneWorld};
use crate::sprite_keys::sprite_path;

use super::transform::camera_pixels_per_world;
use super::{world_to_screen_px, Viewport};

const PLACEHOLDER_COLOR: [u8; 4] = [220, 220, 240, 255];
const PLACEHOLDER_HALF_SIZE_PX: i32 = 5;

struct LoadedSprite {
    width: u32,
    height: u32,
    rgba: Vec<u8>,
}

pub struct Renderer {
    window: Arc<Window>,
    pixels: Pixels<'static>,
    viewport: Viewport,
    asset_dir: PathBuf,
    sprite_cache: HashMap<String, Option<LoadedSprite>>,
    warned_missing_sprite_keys: HashSet<String>,
}

impl Renderer {
    pub fn new(window: Arc<Window>, asset_dir: PathBuf) -> Result<Self, Error> {
        let size = window.inner_size();
        let pixels = Self::build_pixels(Arc::clone(&window), size.width, size.height)?;
        Ok(Self {
            window,
            pixels,
            viewport: Viewport {
                width: size.width,
                height: size.height,
            },
            asset_dir,
            sprite_cache: HashMap::new(),
            warned_missing_sprite_keys: HashSet::new(),
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), Error> {
        if width == 0 || height == 0 {
            return Ok(());
        }
        self.pixels = Self::build_pixels(Arc::clone(&self.window), width, height)?;
        self.viewport = Viewport { width, height };
        Ok(())
    }

    fn build_pixels(
        window: Arc<Window>,
        width: u32,
        height: u32,
    ) -> Result<Pixels<'static>, Error> {
        let surface = SurfaceTexture::new(width, height, window);
        Pixels::new(width, height, surface)
    }

    pub(crate) fn render_world(
        &mut self,
        world: &SceneWorld,
        background_color: [u8; 3],
    ) -> Result<(), Error> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Ok(());
        }

        let (width, height) = (self.viewport.width, self.viewport.height);
        let asset_dir = self.asset_dir.as_path();
        let sprite_cache = &mut self.sprite_cache;
        let warned_missing_sprite_keys = &mut self.warned_missing_sprite_keys;
        let frame = self.pixels.frame_mut();

        clear_frame(frame, background_color);
        for entity in world.entities() {
            draw_entity(
                frame,
                width,
                height,
                world.camera(),
                entity,
                sprite_cache,
                warned_missing_sprite_keys,
                asset_dir,
            );
        }

        self.pixels.render()
    }
}

fn clear_frame(frame: &mut [u8], color: [u8; 3]) {
    let rgba = opaque(color);
    for chunk in frame.chunks_exact_mut(4) {
        chunk.copy_from_slice(&rgba);
    }
}

fn opaque(color: [u8; 3]) -> [u8; 4] {
    [color[0], color[1], color[2], 255]
}

#[allow(clippy::too_many_arguments)]
fn draw_entity(
    frame: &mut [u8],
    width: u32,
    height: u32,
    camera: &Camera2D,
    entity: &Entity,
    sprite_cache: &mut HashMap<String, Option<LoadedSprite>>,
    warned_missing_sprite_keys: &mut HashSet<String>,
    asset_dir: &Path,
) {
    let (cx, cy) = world_to_screen_px(camera, (width, height), entity.transform.position);
    let size_px = entity.size.max(0.0) * camera_pixels_per_world(camera);
    let half_px = size_px * 0.5;

    match &entity.renderable.kind {
        RenderableKind::Placeholder => {
            draw_square(frame, width, height, cx, cy, PLACEHOLDER_HALF_SIZE_PX, PLACEHOLDER_COLOR);
        }
        RenderableKind::Circle(color) => {
            draw_disc(frame, width, height, cx, cy, half_px, opaque(*color));
        }
        RenderableKind::Square(color) => {
            draw_rotated_square(
                frame,
                width,
                height,
                cx,
                cy,
                half_px,
                entity.transform.rotation_degrees,
                opaque(*color),
            );
        }
        RenderableKind::Sprite(key) => {
            match resolve_cached_sprite(sprite_cache, warned_missing_sprite_keys, asset_dir, key)
            {
                Some(sprite) => {
                    let scale = sprite_scale_for_size(sprite, size_px);
                    draw_sprite_centered_scaled(frame, width, height, cx, cy, sprite, scale);
                }
                None => draw_square(
                    frame,
                    width,
                    height,
                    cx,
                    cy,
                    PLACEHOLDER_HALF_SIZE_PX,
                    PLACEHOLDER_COLOR,
                ),
            }
        }
    }
}

fn resolve_cached_sprite<'a>(
    cache: &'a mut HashMap<String, Option<LoadedSprite>>,
    warned_keys: &mut HashSet<String>,
    asset_dir: &Path,
    key: &str,
) -> Option<&'a LoadedSprite> {
    if !cache.contains_key(key) {
        let loaded = match sprite_path(asset_dir, key) {
            Ok(path) => match load_sprite_rgba(&path) {
                Ok(sprite) => Some(sprite),
                Err(reason) => {
                    warn_sprite_load_once(warned_keys, key, Some(&path), &reason);
                    None
                }
            },
            Err(error) => {
                warn_sprite_load_once(warned_keys, key, None, &format!("invalid_key:{error}"));
                None
            }
        };
        cache.insert(key.to_string(), loaded);
    }
    cache.get(key).and_then(Option::as_ref)
}

fn load_sprite_rgba(path: &Path) -> Result<LoadedSprite, String> {
    let reader = ImageReader::open(path).map_err(|error| format!("file_open_failed:{error}"))?;
    let decoded = reader
        .decode()
        .map_err(|error| format!("decode_failed:{error}"))?;
    let image = decoded.to_rgba8();
    Ok(LoadedSprite {
        width: image.width(),
        height: image.height(),
        rgba: image.into_raw(),
    })
}

fn warn_sprite_load_once(
    warned_keys: &mut HashSet<String>,
    key: &str,
    resolved_path: Option<&Path>,
    reason: &str,
) {
    if !warned_keys.insert(key.to_string()) {
        return;
    }
    let path_display = resolved_path
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| "<unresolved>".to_string());
    warn!(
        sprite_key = key,
        path = %path_display,
        reason = reason,
        "renderer_sprite_load_failed_using_placeholder"
    );
}

/// Scale that makes the sprite's longest side span `size_px`.
fn sprite_scale_for_size(sprite: &LoadedSprite, size_px: f32) -> f32 {
    let longest = sprite.width.max(sprite.height);
    if longest == 0 || !size_px.is_finite() || size_px <= 0.0 {
        return 1.0;
    }
    size_px / longest as f32
}

fn write_pixel_rgba_clipped(frame: &mut [u8], width: usize, x: i32, y: i32, color: [u8; 4]) {
    if x < 0 || y < 0 || x as usize >= width {
        return;
    }
    let x = x as usize;
    let y = y as usize;
    let Some(pixel_offset) = y.checked_mul(width).and_then(|row| row.checked_add(x)) else {
        return;
    };
    let Some(byte_offset) = pixel_offset.checked_mul(4) else {
        return;
    };
    let Some(end) = byte_offset.checked_add(4) else {
        return;
    };
    if end > frame.len() {
        return;
    }
    frame[byte_offset..end].copy_from_slice(&color);
}

fn draw_square(
    frame: &mut [u8],
    width: u32,
    height: u32,
    cx: i32,
    cy: i32,
    half_size: i32,
    color: [u8; 4],
) {
    for y in (cy - half_size).max(0)..=(cy + half_size).min(height as i32 - 1) {
        for x in (cx - half_size).max(0)..=(cx + half_size).min(width as i32 - 1) {
            write_pixel_rgba_clipped(frame, width as usize, x, y, color);
        }
    }
}

fn draw_disc(
    frame: &mut [u8],
    width: u32,
    height: u32,
    cx: i32,
    cy: i32,
    radius_px: f32,
    color: [u8; 4],
) {
    if !radius_px.is_finite() || radius_px <= 0.0 {
        return;
    }
    let extent = radius_px.ceil() as i32;
    let radius_sq = radius_px * radius_px;
    for y in (cy - extent).max(0)..=(cy + extent).min(height as i32 - 1) {
        for x in (cx - extent).max(0)..=(cx + extent).min(width as i32 - 1) {
            let dx = (x - cx) as f32;
            let dy = (y - cy) as f32;
            if dx * dx + dy * dy <= radius_sq {
                write_pixel_rgba_clipped(frame, width as usize, x, y, color);
            }
        }
    }
}

/// Fills a square of half side `half_px` rotated counter-clockwise (as seen
/// on screen) by `rotation_degrees` around its centre.
#[allow(clippy::too_many_arguments)]
fn draw_rotated_square(
    frame: &mut [u8],
    width: u32,
    height: u32,
    cx: i32,
    cy: i32,
    half_px: f32,
    rotation_degrees: f32,
    color: [u8; 4],
) {
    if !half_px.is_finite() || half_px <= 0.0 {
        return;
    }
    let (sin, cos) = rotation_degrees.to_radians().sin_cos();
    let extent = (half_px * std::f32::consts::SQRT_2).ceil() as i32;
    for y in (cy - extent).max(0)..=(cy + extent).min(height as i32 - 1) {
        for x in (cx - extent).max(0)..=(cx + extent).min(width as i32 - 1) {
            if rotated_square_contains(x - cx, y - cy, half_px, sin, cos) {
                write_pixel_rgba_clipped(frame, width as usize, x, y, color);
            }
        }
    }
}

fn rotated_square_contains(dx_px: i32, dy_px: i32, half_px: f32, sin: f32, cos: f32) -> bool {
    // screen y grows downward; undo the rotation in y-up space
    let dx = dx_px as f32;
    let dy = -(dy_px as f32);
    let local_x = dx * cos + dy * sin;
    let local_y = -dx * sin + dy * cos;
    local_x.abs() <= half_px && local_y.abs() <= half_px
}

fn draw_sprite_centered_scaled(
    frame: &mut [u8],
    width: u32,
    height: u32,
    center_x: i32,
    center_y: i32,
    sprite: &LoadedSprite,
    scale: f32,
) {
    if sprite.width == 0 || sprite.height == 0 || width == 0 || height == 0 {
        return;
    }
    let expected_rgba_len = sprite.width as usize * sprite.height as usize * 4;
    if sprite.rgba.len() < expected_rgba_len {
        return;
    }

    let scale = if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    };
    let inv_scale = scale.recip();
    let scaled_w = (sprite.width as f32 * scale).round().max(1.0) as i32;
    let scaled_h = (sprite.height as f32 * scale).round().max(1.0) as i32;
    let left = center_x - scaled_w / 2;
    let top = center_y - scaled_h / 2;

    let draw_left = left.max(0);
    let draw_top = top.max(0);
    let draw_right = (left + scaled_w).min(width as i32);
    let draw_bottom = (top + scaled_h).min(height as i32);
    if draw_left >= draw_right || draw_top >= draw_bottom {
        return;
    }

    let frame_width = width as usize;
    let sprite_width = sprite.width as usize;

    for out_y in draw_top..draw_bottom {
        let src_y = (((out_y - top) as f32) * inv_scale).floor() as u32;
        let src_y = src_y.min(sprite.height - 1) as usize;
        let src_row_offset = src_y * sprite_width * 4;
        let dst_row_offset = out_y as usize * frame_width * 4;

        for out_x in draw_left..draw_right {
            let src_x = (((out_x - left) as f32) * inv_scale).floor() as u32;
            let src_x = src_x.min(sprite.width - 1) as usize;
            let src_offset = src_row_offset + src_x * 4;
            let alpha = sprite.rgba[src_offset + 3];
            if alpha == 0 {
                continue;
            }
            let dst_offset = dst_row_offset + out_x as usize * 4;
            frame[dst_offset..dst_offset + 3]
                .copy_from_slice(&sprite.rgba[src_offset..src_offset + 3]);
            frame[dst_offset + 3] = 255;
        }
    }
}

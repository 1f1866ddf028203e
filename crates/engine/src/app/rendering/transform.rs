use crate::app::{Camera2D, Vec2};

/// Screen pixels per world unit at zoom 1.0.
pub const PIXELS_PER_WORLD: f32 = 64.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// World origin sits at the viewport centre when the camera is at the
/// origin; world +y points up the screen.
pub fn world_to_screen(
    world: Vec2,
    camera: &Camera2D,
    viewport: Viewport,
    pixels_per_world: f32,
) -> (i32, i32) {
    let x = (world.x - camera.position.x) * pixels_per_world + viewport.width as f32 * 0.5;
    let y = viewport.height as f32 * 0.5 - (world.y - camera.position.y) * pixels_per_world;
    (x.round() as i32, y.round() as i32)
}

pub fn world_to_screen_px(camera: &Camera2D, window_size: (u32, u32), world: Vec2) -> (i32, i32) {
    world_to_screen(
        world,
        camera,
        Viewport {
            width: window_size.0,
            height: window_size.1,
        },
        camera_pixels_per_world(camera),
    )
}

pub(crate) fn camera_pixels_per_world(camera: &Camera2D) -> f32 {
    PIXELS_PER_WORLD * camera.effective_zoom()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_maps_to_viewport_center() {
        let viewport = Viewport {
            width: 800,
            height: 600,
        };
        let camera = Camera2D::default();
        let (x, y) = world_to_screen(Vec2::ZERO, &camera, viewport, 32.0);
        assert_eq!(x, 400);
        assert_eq!(y, 300);
    }

    #[test]
    fn camera_offset_shifts_screen_position() {
        let viewport = Viewport {
            width: 800,
            height: 600,
        };
        let camera = Camera2D {
            position: Vec2::new(10.0, -5.0),
            zoom: 1.0,
        };
        let (x, y) = world_to_screen(Vec2::new(12.0, -4.0), &camera, viewport, 10.0);
        assert_eq!(x, 420);
        assert_eq!(y, 290);
    }

    #[test]
    fn zoom_scales_distance_from_center() {
        let mut camera = Camera2D::default();
        let (x1, _) = world_to_screen_px(&camera, (1280, 720), Vec2::new(1.0, 0.0));
        camera.zoom = 2.0;
        let (x2, _) = world_to_screen_px(&camera, (1280, 720), Vec2::new(1.0, 0.0));

        assert_eq!(x1, 640 + 64);
        assert_eq!(x2, 640 + 128);
    }
}

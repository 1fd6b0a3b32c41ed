use glam::{Mat4, Vec3};

use crate::coords::{Vec2, Viewport};

/// Orthographic 2D camera.
///
/// The default looks down -Z at the centre of its viewport, so world units map 1:1 to
/// pixels with the origin at the bottom-left corner.
#[derive(Clone, Copy, Debug)]
pub struct OrthoCamera {
    pub position: Vec3,
    pub direction: Vec3,
    pub up: Vec3,
    pub near: f32,
    pub far: f32,
    pub zoom: f32,
    pub viewport: Viewport,

    projection: Mat4,
    view: Mat4,
    projection_view: Mat4,
    inverse_projection_view: Mat4,
}

impl OrthoCamera {
    pub fn new(viewport_width: f32, viewport_height: f32) -> Self {
        let mut camera = Self {
            position: Vec3::new(viewport_width / 2.0, viewport_height / 2.0, 0.0),
            direction: Vec3::NEG_Z,
            up: Vec3::Y,
            near: 0.0,
            far: 100.0,
            zoom: 1.0,
            viewport: Viewport::new(viewport_width, viewport_height),
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            projection_view: Mat4::IDENTITY,
            inverse_projection_view: Mat4::IDENTITY,
        };
        camera.update();
        camera
    }

    /// Recomputes the matrices from position, direction, zoom and viewport.
    pub fn update(&mut self) {
        let half_w = self.zoom * self.viewport.width / 2.0;
        let half_h = self.zoom * self.viewport.height / 2.0;
        self.projection =
            Mat4::orthographic_rh_gl(-half_w, half_w, -half_h, half_h, self.near, self.far);
        self.view = Mat4::look_to_rh(self.position, self.direction, self.up);
        self.projection_view = self.projection * self.view;
        self.inverse_projection_view = self.projection_view.inverse();
    }

    pub fn set_viewport(&mut self, width: f32, height: f32) {
        self.viewport = Viewport::new(width, height);
    }

    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.projection
    }

    #[inline]
    pub fn view(&self) -> Mat4 {
        self.view
    }

    #[inline]
    pub fn projection_view(&self) -> Mat4 {
        self.projection_view
    }

    /// Screen pixels (top-left origin) to world coordinates, as of the last `update`.
    pub fn screen_to_world(&self, screen: Vec2, screen_width: f32, screen_height: f32) -> Vec2 {
        let x = 2.0 * screen.x / screen_width - 1.0;
        let y = 2.0 * (screen_height - screen.y - 1.0) / screen_height - 1.0;
        let world = self.inverse_projection_view.project_point3(Vec3::new(x, y, -1.0));
        Vec2::new(world.x, world.y)
    }

    /// World coordinates to screen pixels (bottom-left origin), as of the last `update`.
    pub fn world_to_screen(&self, world: Vec2, screen_width: f32, screen_height: f32) -> Vec2 {
        let ndc = self
            .projection_view
            .project_point3(Vec3::new(world.x, world.y, 0.0));
        Vec2::new(
            screen_width * (ndc.x + 1.0) / 2.0,
            screen_height * (ndc.y + 1.0) / 2.0,
        )
    }
}

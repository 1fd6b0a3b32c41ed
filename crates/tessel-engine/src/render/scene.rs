use std::rc::Rc;

use crate::coords::{Vec2, Viewport};
use crate::device::ManagedContext;
use crate::error::Result;
use crate::paint::Color;

use super::camera::OrthoCamera;
use super::polygon_batcher::{BatcherConfig, PolygonBatcher};
use super::shader::ShaderProgram;
use super::shape_batcher::{ShapeBatcher, ShapeBatcherConfig};
use super::skeleton::{SkeletonRenderer, SkinnedElement};
use super::skeleton_debug::{DebugSkeleton, SkeletonDebugRenderer};
use super::texture::GpuTexture;

/// Scene renderer configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SceneConfig {
    /// Uses the two-color shader and widens batcher vertices with a dark color.
    pub two_color_tint: bool,
    /// Default for skeleton drawing; see [`SceneRenderer::premultiplied_alpha`].
    pub premultiplied_alpha: bool,
    pub batcher: BatcherConfig,
    pub shapes: ShapeBatcherConfig,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            two_color_tint: true,
            premultiplied_alpha: false,
            batcher: BatcherConfig::default(),
            shapes: ShapeBatcherConfig::default(),
        }
    }
}

/// How the camera reacts to a new drawable size.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ResizeMode {
    /// Keep the camera viewport; the image stretches with the drawable.
    #[default]
    Stretch,
    /// Camera viewport follows the drawable size.
    Expand,
    /// Scale the drawable so the target viewport fits, preserving aspect.
    Fit,
}

/// Drawer that currently owns GPU state.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ActiveRenderer {
    #[default]
    None,
    Batcher,
    Shapes,
    Debug,
}

/// Batcher backing a drawer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum RendererKind {
    Polygons,
    Shapes,
}

impl ActiveRenderer {
    fn kind(self) -> Option<RendererKind> {
        match self {
            ActiveRenderer::None => None,
            ActiveRenderer::Batcher => Some(RendererKind::Polygons),
            // The debug drawer emits through the shape batcher.
            ActiveRenderer::Shapes | ActiveRenderer::Debug => Some(RendererKind::Shapes),
        }
    }
}

/// Atlas page region.
///
/// `rotate` marks regions packed rotated 90° clockwise in the page.
#[derive(Clone, Copy)]
pub struct TextureRegion<'a> {
    pub texture: &'a GpuTexture,
    pub u: f32,
    pub v: f32,
    pub u2: f32,
    pub v2: f32,
    pub rotate: bool,
}

/// Largest batcher stride: position, color, texcoords and dark color.
const MAX_QUAD_STRIDE: usize = 12;

/// Owns the camera, both batchers, their shaders and the skeleton drawers, and keeps at
/// most one batcher drawing.
///
/// Each drawing call enables the batcher it needs, ending the other one first. The camera
/// matrix is uploaded when a batcher is enabled, so camera changes apply from the next
/// switch (or the next [`SceneRenderer::begin`]).
pub struct SceneRenderer {
    ctx: Rc<ManagedContext>,
    pub camera: OrthoCamera,
    /// Premultiplies skeleton tints and picks matching blend factors.
    pub premultiplied_alpha: bool,

    batcher: PolygonBatcher,
    batcher_shader: Rc<ShaderProgram>,
    shapes: ShapeBatcher,
    shapes_shader: Rc<ShaderProgram>,
    skeleton_renderer: SkeletonRenderer,
    skeleton_debug_renderer: SkeletonDebugRenderer,

    active: ActiveRenderer,
    target_viewport: Viewport,
    quad: [f32; 4 * MAX_QUAD_STRIDE],
}

impl SceneRenderer {
    /// Creates a renderer whose camera (and `Fit` target) covers `width` × `height`.
    pub fn new(
        ctx: &Rc<ManagedContext>,
        width: f32,
        height: f32,
        config: SceneConfig,
    ) -> Result<Self> {
        let batcher_shader = Rc::new(if config.two_color_tint {
            ShaderProgram::two_colored_textured(ctx)?
        } else {
            ShaderProgram::colored_textured(ctx)?
        });
        let batcher = PolygonBatcher::new(
            ctx,
            BatcherConfig {
                two_color_tint: config.two_color_tint,
                ..config.batcher
            },
        )?;
        let shapes_shader = Rc::new(ShaderProgram::colored(ctx)?);
        let shapes = ShapeBatcher::new(ctx, config.shapes)?;

        let mut skeleton_debug_renderer = SkeletonDebugRenderer::new();
        skeleton_debug_renderer.premultiplied_alpha = config.premultiplied_alpha;

        Ok(Self {
            ctx: ctx.clone(),
            camera: OrthoCamera::new(width, height),
            premultiplied_alpha: config.premultiplied_alpha,
            batcher,
            batcher_shader,
            shapes,
            shapes_shader,
            skeleton_renderer: SkeletonRenderer::new(),
            skeleton_debug_renderer,
            active: ActiveRenderer::None,
            target_viewport: Viewport::new(width, height),
            quad: [0.0; 4 * MAX_QUAD_STRIDE],
        })
    }

    #[inline]
    pub fn context(&self) -> &Rc<ManagedContext> {
        &self.ctx
    }

    #[inline]
    pub fn active(&self) -> ActiveRenderer {
        self.active
    }

    #[inline]
    pub fn batcher(&self) -> &PolygonBatcher {
        &self.batcher
    }

    #[inline]
    pub fn shapes(&self) -> &ShapeBatcher {
        &self.shapes
    }

    /// Debug drawer settings (colors, toggles, scale).
    #[inline]
    pub fn skeleton_debug_renderer_mut(&mut self) -> &mut SkeletonDebugRenderer {
        &mut self.skeleton_debug_renderer
    }

    /// Viewport the `Fit` resize mode scales towards.
    #[inline]
    pub fn target_viewport(&self) -> Viewport {
        self.target_viewport
    }

    pub fn set_target_viewport(&mut self, width: f32, height: f32) {
        self.target_viewport = Viewport::new(width, height);
    }

    // ── frame ─────────────────────────────────────────────────────────────

    pub fn begin(&mut self) -> Result<()> {
        self.camera.update();
        self.enable_renderer(ActiveRenderer::Batcher)
    }

    /// Ends whichever batcher is drawing. No-op when none is.
    pub fn end(&mut self) -> Result<()> {
        let ended = match self.active.kind() {
            Some(RendererKind::Polygons) => self.batcher.end(),
            Some(RendererKind::Shapes) => self.shapes.end(),
            None => Ok(()),
        };
        self.active = ActiveRenderer::None;
        ended
    }

    fn enable_renderer(&mut self, renderer: ActiveRenderer) -> Result<()> {
        if self.active == renderer {
            return Ok(());
        }
        if self.active.kind() == renderer.kind() {
            self.active = renderer;
            return Ok(());
        }
        self.end()?;

        let mvp = self.camera.projection_view().to_cols_array();
        match renderer.kind() {
            Some(RendererKind::Polygons) => {
                let shader = &self.batcher_shader;
                shader.bind()?;
                shader.set_uniform_4x4f(ShaderProgram::MVP_MATRIX, &mvp)?;
                shader.set_uniform_i(ShaderProgram::SAMPLER, 0)?;
                self.batcher.begin(shader)?;
            }
            Some(RendererKind::Shapes) => {
                let shader = &self.shapes_shader;
                shader.bind()?;
                shader.set_uniform_4x4f(ShaderProgram::MVP_MATRIX, &mvp)?;
                self.shapes.begin(shader)?;
            }
            None => {}
        }
        self.active = renderer;
        Ok(())
    }

    // ── textured ──────────────────────────────────────────────────────────

    /// Whole texture stretched over `width` × `height` from its bottom-left corner.
    pub fn draw_texture(
        &mut self,
        texture: &GpuTexture,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Option<Color>,
    ) -> Result<()> {
        self.draw_texture_uv(texture, x, y, width, height, 0.0, 1.0, 1.0, 0.0, color)
    }

    /// Texture sub-rectangle; `(u, v)` lands on the bottom-left corner, `(u2, v2)` on the
    /// top-right.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_texture_uv(
        &mut self,
        texture: &GpuTexture,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        u: f32,
        v: f32,
        u2: f32,
        v2: f32,
        color: Option<Color>,
    ) -> Result<()> {
        let corners = axis_aligned(x, y, width, height);
        let uvs = [[u, v], [u2, v], [u2, v2], [u, v2]];
        self.draw_quad(texture, corners, uvs, color)
    }

    /// Texture rotated by `angle` degrees counter-clockwise around `(x + pivot_x, y + pivot_y)`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_texture_rotated(
        &mut self,
        texture: &GpuTexture,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        pivot_x: f32,
        pivot_y: f32,
        angle: f32,
        color: Option<Color>,
    ) -> Result<()> {
        let origin = Vec2::new(x + pivot_x, y + pivot_y);
        let (sin, cos) = angle.to_radians().sin_cos();
        let rotate = |p: Vec2| Vec2::new(cos * p.x - sin * p.y, sin * p.x + cos * p.y) + origin;

        let (fx, fy) = (-pivot_x, -pivot_y);
        let (fx2, fy2) = (width - pivot_x, height - pivot_y);
        let corners = [
            rotate(Vec2::new(fx, fy)),
            rotate(Vec2::new(fx2, fy)),
            rotate(Vec2::new(fx2, fy2)),
            rotate(Vec2::new(fx, fy2)),
        ];
        let uvs = [[0.0, 1.0], [1.0, 1.0], [1.0, 0.0], [0.0, 0.0]];
        self.draw_quad(texture, corners, uvs, color)
    }

    /// Atlas region stretched over `width` × `height`.
    pub fn draw_region(
        &mut self,
        region: &TextureRegion<'_>,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Option<Color>,
    ) -> Result<()> {
        let TextureRegion { u, v, u2, v2, .. } = *region;
        let uvs = if region.rotate {
            [[u2, v2], [u2, v], [u, v], [u, v2]]
        } else {
            [[u, v2], [u2, v2], [u2, v], [u, v]]
        };
        self.draw_quad(region.texture, axis_aligned(x, y, width, height), uvs, color)
    }

    /// Corners in order bottom-left, bottom-right, top-right, top-left.
    fn draw_quad(
        &mut self,
        texture: &GpuTexture,
        corners: [Vec2; 4],
        uvs: [[f32; 2]; 4],
        color: Option<Color>,
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Batcher)?;
        let color = color.unwrap_or(Color::WHITE);
        let stride = self.batcher.vertex_size();

        for (i, (p, [u, v])) in corners.into_iter().zip(uvs).enumerate() {
            let out = &mut self.quad[i * stride..(i + 1) * stride];
            out[..8].copy_from_slice(&[p.x, p.y, color.r, color.g, color.b, color.a, u, v]);
            out[8..].fill(0.0);
        }
        self.batcher.draw(
            texture,
            &self.quad[..4 * stride],
            &SkinnedElement::QUAD_TRIANGLES,
        )
    }

    // ── skeletons ─────────────────────────────────────────────────────────

    pub fn draw_skeleton<'e, 't: 'e>(
        &mut self,
        elements: impl IntoIterator<Item = &'e SkinnedElement<'t>>,
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Batcher)?;
        self.skeleton_renderer.premultiplied_alpha = self.premultiplied_alpha;
        self.skeleton_renderer.draw(&mut self.batcher, elements)
    }

    pub fn draw_skeleton_debug(
        &mut self,
        skeleton: &DebugSkeleton,
        ignored_bones: &[&str],
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Debug)?;
        self.skeleton_debug_renderer.premultiplied_alpha = self.premultiplied_alpha;
        self.skeleton_debug_renderer
            .draw(&mut self.shapes, skeleton, ignored_bones)
    }

    // ── shapes ────────────────────────────────────────────────────────────

    pub fn line(&mut self, a: Vec2, b: Vec2, color: Option<Color>) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.line(a, b, color)
    }

    pub fn triangle(
        &mut self,
        filled: bool,
        a: Vec2,
        b: Vec2,
        c: Vec2,
        color: Option<Color>,
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.triangle(filled, a, b, c, color)
    }

    pub fn quad(&mut self, filled: bool, corners: [Vec2; 4], color: Option<Color>) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.quad(filled, corners, color)
    }

    pub fn rect(
        &mut self,
        filled: bool,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Option<Color>,
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.rect(filled, x, y, width, height, color)
    }

    pub fn rect_line(
        &mut self,
        filled: bool,
        a: Vec2,
        b: Vec2,
        width: f32,
        color: Option<Color>,
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.rect_line(filled, a, b, width, color)
    }

    pub fn polygon(&mut self, points: &[f32], color: Option<Color>) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.polygon(points, color)
    }

    pub fn circle(
        &mut self,
        filled: bool,
        center: Vec2,
        radius: f32,
        color: Option<Color>,
        segments: usize,
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.circle(filled, center, radius, color, segments)
    }

    pub fn curve(
        &mut self,
        p1: Vec2,
        c1: Vec2,
        c2: Vec2,
        p2: Vec2,
        segments: usize,
        color: Option<Color>,
    ) -> Result<()> {
        self.enable_renderer(ActiveRenderer::Shapes)?;
        self.shapes.curve(p1, c1, c2, p2, segments, color)
    }

    // ── surface ───────────────────────────────────────────────────────────

    /// Applies a new drawable size (physical pixels) to the GL viewport and the camera.
    /// Zero-sized drawables (a minimized window) are ignored.
    pub fn resize(&mut self, mode: ResizeMode, width: u32, height: u32) {
        if !Viewport::new(width as f32, height as f32).is_valid() {
            log::debug!("ignoring resize to {width}x{height}");
            return;
        }
        self.ctx
            .gl()
            .viewport(0, 0, width as i32, height as i32);

        let (source_width, source_height) = (width as f32, height as f32);
        match mode {
            ResizeMode::Stretch => {}
            ResizeMode::Expand => self.camera.set_viewport(source_width, source_height),
            ResizeMode::Fit => {
                let target = self.target_viewport;
                let source = Viewport::new(source_width, source_height);
                let scale = if target.aspect() < source.aspect() {
                    target.width / source_width
                } else {
                    target.height / source_height
                };
                self.camera
                    .set_viewport(source_width * scale, source_height * scale);
            }
        }
        self.camera.update();
    }

    /// Releases GPU resources. Safe to call more than once.
    pub fn dispose(&self) {
        self.batcher.dispose();
        self.batcher_shader.dispose();
        self.shapes.dispose();
        self.shapes_shader.dispose();
    }
}

fn axis_aligned(x: f32, y: f32, width: f32, height: f32) -> [Vec2; 4] {
    [
        Vec2::new(x, y),
        Vec2::new(x + width, y),
        Vec2::new(x + width, y + height),
        Vec2::new(x, y + height),
    ]
}

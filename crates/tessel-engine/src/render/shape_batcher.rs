use std::rc::Rc;

use crate::coords::Vec2;
use crate::device::{Capability, ManagedContext, Primitive};
use crate::error::{RenderError, Result};
use crate::paint::{BlendFactors, Color};

use super::mesh::{Mesh, VertexAttribute};
use super::polygon_batcher::MAX_BATCH_VERTICES;
use super::shader::ShaderProgram;

/// Floats per shape vertex: position (2) + color (4).
const SHAPE_STRIDE: usize = 6;

/// Primitive a shape batch is drawn with.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash)]
pub enum ShapeType {
    Point,
    Line,
    #[default]
    Filled,
}

impl ShapeType {
    #[inline]
    pub fn primitive(self) -> Primitive {
        match self {
            ShapeType::Point => Primitive::Points,
            ShapeType::Line => Primitive::Lines,
            ShapeType::Filled => Primitive::Triangles,
        }
    }

    #[inline]
    fn outline_or_filled(filled: bool) -> Self {
        if filled { ShapeType::Filled } else { ShapeType::Line }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ShapeBatcherConfig {
    /// Vertex capacity of one batch. At most [`MAX_BATCH_VERTICES`].
    pub max_vertices: usize,
}

impl Default for ShapeBatcherConfig {
    fn default() -> Self {
        Self {
            max_vertices: MAX_BATCH_VERTICES,
        }
    }
}

/// Immediate-mode points, lines and filled shapes.
///
/// Untextured position + color vertices, no indices. A batch is keyed by its
/// [`ShapeType`]; emitting a shape of another type (or one that does not fit) flushes.
/// Outlines are emitted as line pairs, filled shapes as triangle lists.
pub struct ShapeBatcher {
    ctx: Rc<ManagedContext>,
    mesh: Mesh,
    shader: Option<Rc<ShaderProgram>>,
    drawing: bool,
    shape_type: ShapeType,
    color: Color,
    cursor: usize,
    blend: BlendFactors,
    draw_calls: usize,
}

impl ShapeBatcher {
    pub fn new(ctx: &Rc<ManagedContext>, config: ShapeBatcherConfig) -> Result<Self> {
        if config.max_vertices > MAX_BATCH_VERTICES {
            return Err(RenderError::CapacityExceeded {
                what: "ShapeBatcher vertices",
                requested: config.max_vertices,
                capacity: MAX_BATCH_VERTICES,
            });
        }
        let mesh = Mesh::new(
            ctx,
            vec![VertexAttribute::position2(), VertexAttribute::color()],
            config.max_vertices,
            0,
        );
        Ok(Self {
            ctx: ctx.clone(),
            mesh,
            shader: None,
            drawing: false,
            shape_type: ShapeType::Filled,
            color: Color::WHITE,
            cursor: 0,
            blend: BlendFactors::ALPHA,
            draw_calls: 0,
        })
    }

    #[inline]
    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    #[inline]
    pub fn shape_type(&self) -> ShapeType {
        self.shape_type
    }

    #[inline]
    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    #[inline]
    pub fn blend(&self) -> BlendFactors {
        self.blend
    }

    /// Default color for calls that pass `None`.
    #[inline]
    pub fn color(&self) -> Color {
        self.color
    }

    #[inline]
    pub fn set_color(&mut self, color: Color) {
        self.color = color;
    }

    pub fn begin(&mut self, shader: &Rc<ShaderProgram>) -> Result<()> {
        if self.drawing {
            return Err(RenderError::AlreadyDrawing { what: "ShapeBatcher" });
        }
        self.shader = Some(shader.clone());
        self.cursor = 0;
        self.draw_calls = 0;
        self.drawing = true;

        self.ctx.gl().enable(Capability::Blend);
        self.apply_blend();
        Ok(())
    }

    pub fn set_blend_mode(&mut self, blend: BlendFactors) -> Result<()> {
        if blend == self.blend {
            return Ok(());
        }
        if self.drawing {
            self.flush()?;
        }
        self.blend = blend;
        if self.drawing {
            self.apply_blend();
        }
        Ok(())
    }

    fn apply_blend(&self) {
        let b = self.blend;
        self.ctx
            .gl()
            .blend_func_separate(b.src_color, b.dst, b.src_alpha, b.dst);
    }

    pub fn end(&mut self) -> Result<()> {
        if !self.drawing {
            return Err(RenderError::NotDrawing { what: "ShapeBatcher" });
        }
        let flushed = self.flush();
        self.shader = None;
        self.drawing = false;
        self.ctx.gl().disable(Capability::Blend);
        flushed
    }

    /// Submits pending vertices as one draw call. No-op when empty.
    pub fn flush(&mut self) -> Result<()> {
        if self.cursor == 0 {
            return Ok(());
        }
        let shader = self
            .shader
            .clone()
            .ok_or(RenderError::NotDrawing { what: "ShapeBatcher" })?;
        self.mesh.set_vertices_len(self.cursor)?;
        self.mesh.draw(&shader, self.shape_type.primitive())?;
        self.cursor = 0;
        self.draw_calls += 1;
        Ok(())
    }

    /// Makes room for `vertices` vertices of `shape_type`, flushing when needed.
    fn check(&mut self, shape_type: ShapeType, vertices: usize) -> Result<()> {
        if !self.drawing {
            return Err(RenderError::NotDrawing { what: "ShapeBatcher" });
        }
        let capacity = self.mesh.max_vertices();
        if vertices > capacity {
            return Err(RenderError::CapacityExceeded {
                what: "ShapeBatcher shape vertices",
                requested: vertices,
                capacity,
            });
        }
        if self.shape_type != shape_type {
            self.flush()?;
            self.shape_type = shape_type;
        } else if capacity - self.cursor / SHAPE_STRIDE < vertices {
            self.flush()?;
        }
        Ok(())
    }

    #[inline]
    fn vertex(&mut self, x: f32, y: f32, color: Color) {
        let i = self.cursor;
        let out = &mut self.mesh.vertices_mut()[i..i + SHAPE_STRIDE];
        out.copy_from_slice(&[x, y, color.r, color.g, color.b, color.a]);
        self.cursor += SHAPE_STRIDE;
    }

    // ── emitters ──────────────────────────────────────────────────────────

    pub fn point(&mut self, p: Vec2, color: Option<Color>) -> Result<()> {
        self.check(ShapeType::Point, 1)?;
        let color = color.unwrap_or(self.color);
        self.vertex(p.x, p.y, color);
        Ok(())
    }

    pub fn line(&mut self, a: Vec2, b: Vec2, color: Option<Color>) -> Result<()> {
        self.check(ShapeType::Line, 2)?;
        let color = color.unwrap_or(self.color);
        self.vertex(a.x, a.y, color);
        self.vertex(b.x, b.y, color);
        Ok(())
    }

    pub fn triangle(
        &mut self,
        filled: bool,
        a: Vec2,
        b: Vec2,
        c: Vec2,
        color: Option<Color>,
    ) -> Result<()> {
        let color = color.unwrap_or(self.color);
        if filled {
            self.check(ShapeType::Filled, 3)?;
            for p in [a, b, c] {
                self.vertex(p.x, p.y, color);
            }
        } else {
            self.check(ShapeType::Line, 6)?;
            for (p, q) in [(a, b), (b, c), (c, a)] {
                self.vertex(p.x, p.y, color);
                self.vertex(q.x, q.y, color);
            }
        }
        Ok(())
    }

    /// Quad with corners in winding order.
    pub fn quad(&mut self, filled: bool, corners: [Vec2; 4], color: Option<Color>) -> Result<()> {
        let color = color.unwrap_or(self.color);
        let [a, b, c, d] = corners;
        if filled {
            self.check(ShapeType::Filled, 6)?;
            for p in [a, b, c, c, d, a] {
                self.vertex(p.x, p.y, color);
            }
        } else {
            self.check(ShapeType::Line, 8)?;
            for (p, q) in [(a, b), (b, c), (c, d), (d, a)] {
                self.vertex(p.x, p.y, color);
                self.vertex(q.x, q.y, color);
            }
        }
        Ok(())
    }

    /// Axis-aligned rectangle from its bottom-left corner.
    pub fn rect(
        &mut self,
        filled: bool,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Option<Color>,
    ) -> Result<()> {
        self.quad(
            filled,
            [
                Vec2::new(x, y),
                Vec2::new(x + width, y),
                Vec2::new(x + width, y + height),
                Vec2::new(x, y + height),
            ],
            color,
        )
    }

    /// Segment from `a` to `b` with thickness `width`.
    pub fn rect_line(
        &mut self,
        filled: bool,
        a: Vec2,
        b: Vec2,
        width: f32,
        color: Option<Color>,
    ) -> Result<()> {
        let color = color.unwrap_or(self.color);
        let t = Vec2::new(b.y - a.y, a.x - b.x).normalized() * (width * 0.5);
        let (a1, a2) = (a + t, a - t);
        let (b1, b2) = (b + t, b - t);
        if filled {
            self.check(ShapeType::Filled, 6)?;
            for p in [a1, a2, b1, b2, b1, a2] {
                self.vertex(p.x, p.y, color);
            }
        } else {
            self.check(ShapeType::Line, 8)?;
            for (p, q) in [(a1, a2), (b1, b2), (b1, a1), (b2, a2)] {
                self.vertex(p.x, p.y, color);
                self.vertex(q.x, q.y, color);
            }
        }
        Ok(())
    }

    /// Cross marker centred on `center`.
    pub fn x(&mut self, center: Vec2, size: f32, color: Option<Color>) -> Result<()> {
        let (cx, cy) = (center.x, center.y);
        self.line(
            Vec2::new(cx - size, cy - size),
            Vec2::new(cx + size, cy + size),
            color,
        )?;
        self.line(
            Vec2::new(cx - size, cy + size),
            Vec2::new(cx + size, cy - size),
            color,
        )
    }

    /// Closed outline through flat `[x0, y0, x1, y1, ...]` points.
    pub fn polygon(&mut self, points: &[f32], color: Option<Color>) -> Result<()> {
        let count = points.len() / 2;
        if count < 3 {
            return Err(RenderError::InvalidGeometry("polygon needs at least 3 vertices"));
        }
        self.check(ShapeType::Line, count * 2)?;
        let color = color.unwrap_or(self.color);
        for i in 0..count {
            let j = (i + 1) % count;
            self.vertex(points[i * 2], points[i * 2 + 1], color);
            self.vertex(points[j * 2], points[j * 2 + 1], color);
        }
        Ok(())
    }

    /// Circle approximated by `segments` segments; `0` picks `max(1, 6 * cbrt(radius))`.
    pub fn circle(
        &mut self,
        filled: bool,
        center: Vec2,
        radius: f32,
        color: Option<Color>,
        segments: usize,
    ) -> Result<()> {
        let segments = if segments == 0 {
            ((6.0 * radius.cbrt()) as usize).max(1)
        } else {
            segments
        };
        let color = color.unwrap_or(self.color);
        let angle = std::f32::consts::TAU / segments as f32;
        let (sin, cos) = angle.sin_cos();

        let shape_type = ShapeType::outline_or_filled(filled);
        let per_segment = if filled { 3 } else { 2 };
        self.check(shape_type, segments * per_segment)?;

        let (x, y) = (center.x, center.y);
        let (mut cx, mut cy) = (radius, 0.0f32);
        for i in 0..segments {
            if filled {
                self.vertex(x, y, color);
            }
            self.vertex(x + cx, y + cy, color);
            if i + 1 == segments {
                // Close on the exact starting point instead of the accumulated rotation.
                cx = radius;
                cy = 0.0;
            } else {
                let tmp = cx;
                cx = cos * cx - sin * cy;
                cy = sin * tmp + cos * cy;
            }
            self.vertex(x + cx, y + cy, color);
        }
        Ok(())
    }

    /// Cubic Bézier from `p1` to `p2` with controls `c1`, `c2`, as `segments` line segments.
    pub fn curve(
        &mut self,
        p1: Vec2,
        c1: Vec2,
        c2: Vec2,
        p2: Vec2,
        segments: usize,
        color: Option<Color>,
    ) -> Result<()> {
        if segments == 0 {
            return Err(RenderError::InvalidGeometry("curve needs at least 1 segment"));
        }
        self.check(ShapeType::Line, segments * 2 + 2)?;
        let color = color.unwrap_or(self.color);

        // Forward differencing of the cubic.
        let step = 1.0 / segments as f32;
        let step2 = step * step;
        let step3 = step2 * step;
        let pre1 = 3.0 * step;
        let pre2 = 3.0 * step2;
        let pre4 = 6.0 * step2;
        let pre5 = 6.0 * step3;

        let tmp1 = p1 - c1 * 2.0 + c2;
        let tmp2 = (c1 - c2) * 3.0 - p1 + p2;

        let mut f = p1;
        let mut df = (c1 - p1) * pre1 + tmp1 * pre2 + tmp2 * step3;
        let mut ddf = tmp1 * pre4 + tmp2 * pre5;
        let dddf = tmp2 * pre5;

        for _ in 0..segments {
            self.vertex(f.x, f.y, color);
            f = f + df;
            df = df + ddf;
            ddf = ddf + dddf;
            self.vertex(f.x, f.y, color);
        }
        self.vertex(f.x, f.y, color);
        self.vertex(p2.x, p2.y, color);
        Ok(())
    }

    pub fn dispose(&self) {
        self.mesh.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{GlCall, HeadlessBackend};

    struct Fixture {
        gl: HeadlessBackend,
        ctx: Rc<ManagedContext>,
        shader: Rc<ShaderProgram>,
    }

    fn fixture() -> Fixture {
        let gl = HeadlessBackend::new();
        let ctx = ManagedContext::new(gl.clone());
        let shader = Rc::new(ShaderProgram::colored(&ctx).unwrap());
        Fixture { gl, ctx, shader }
    }

    fn shapes(f: &Fixture, max_vertices: usize) -> ShapeBatcher {
        ShapeBatcher::new(&f.ctx, ShapeBatcherConfig { max_vertices }).unwrap()
    }

    fn positions(gl: &HeadlessBackend) -> Vec<(f32, f32)> {
        gl.last_vertices()
            .chunks(SHAPE_STRIDE)
            .map(|v| (v[0], v[1]))
            .collect()
    }

    fn draws(gl: &HeadlessBackend) -> Vec<(Primitive, i32)> {
        gl.draw_calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::DrawArrays { primitive, count, .. } => Some((*primitive, *count)),
                _ => None,
            })
            .collect()
    }

    // ── state machine ─────────────────────────────────────────────────────

    #[test]
    fn guards() {
        let f = fixture();
        let mut s = shapes(&f, 64);
        assert_eq!(
            s.point(Vec2::zero(), None),
            Err(RenderError::NotDrawing { what: "ShapeBatcher" })
        );
        f.gl.clear_calls();
        assert_eq!(s.flush(), Ok(()));
        assert!(f.gl.draw_calls().is_empty());

        s.begin(&f.shader).unwrap();
        assert!(s.begin(&f.shader).is_err());
        s.end().unwrap();
        assert!(s.end().is_err());
    }

    // ── batching ──────────────────────────────────────────────────────────

    #[test]
    fn type_changes_flush() {
        let f = fixture();
        let mut s = shapes(&f, 64);
        f.gl.clear_calls();
        s.begin(&f.shader).unwrap();
        s.line(Vec2::zero(), Vec2::new(1.0, 1.0), None).unwrap();
        s.line(Vec2::zero(), Vec2::new(2.0, 2.0), None).unwrap();
        s.rect(true, 0.0, 0.0, 1.0, 1.0, None).unwrap();
        s.point(Vec2::zero(), None).unwrap();
        s.end().unwrap();

        assert_eq!(
            draws(&f.gl),
            vec![(Primitive::Lines, 4), (Primitive::Triangles, 6), (Primitive::Points, 1)]
        );
        assert_eq!(s.draw_calls(), 3);
    }

    #[test]
    fn overflow_flushes_without_truncation() {
        let f = fixture();
        let mut s = shapes(&f, 5);
        f.gl.clear_calls();
        s.begin(&f.shader).unwrap();
        for i in 0..4 {
            s.line(Vec2::new(i as f32, 0.0), Vec2::new(i as f32, 1.0), None).unwrap();
        }
        s.end().unwrap();
        assert_eq!(draws(&f.gl), vec![(Primitive::Lines, 4), (Primitive::Lines, 4)]);
    }

    #[test]
    fn shape_larger_than_mesh_is_rejected() {
        let f = fixture();
        let mut s = shapes(&f, 4);
        s.begin(&f.shader).unwrap();
        let err = s.rect(true, 0.0, 0.0, 1.0, 1.0, None).unwrap_err();
        assert!(matches!(err, RenderError::CapacityExceeded { requested: 6, capacity: 4, .. }));
    }

    // ── emitters ──────────────────────────────────────────────────────────

    #[test]
    fn per_call_color_overrides_default() {
        let f = fixture();
        let mut s = shapes(&f, 16);
        s.set_color(Color::RED);
        s.begin(&f.shader).unwrap();
        s.point(Vec2::zero(), None).unwrap();
        s.point(Vec2::zero(), Some(Color::BLUE)).unwrap();
        s.end().unwrap();
        let v = f.gl.last_vertices();
        assert_eq!(&v[2..6], &Color::RED.to_array());
        assert_eq!(&v[8..12], &Color::BLUE.to_array());
    }

    #[test]
    fn outline_triangle_emits_three_segments() {
        let f = fixture();
        let mut s = shapes(&f, 16);
        s.begin(&f.shader).unwrap();
        s.triangle(false, Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0), None)
            .unwrap();
        s.end().unwrap();
        assert_eq!(
            positions(&f.gl),
            vec![(0.0, 0.0), (1.0, 0.0), (1.0, 0.0), (0.0, 1.0), (0.0, 1.0), (0.0, 0.0)]
        );
    }

    #[test]
    fn rect_line_is_offset_by_half_width() {
        let f = fixture();
        let mut s = shapes(&f, 16);
        s.begin(&f.shader).unwrap();
        s.rect_line(true, Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), 2.0, None).unwrap();
        s.end().unwrap();
        let p = positions(&f.gl);
        assert_eq!(p.len(), 6);
        assert_eq!(p[0], (0.0, -1.0));
        assert_eq!(p[1], (0.0, 1.0));
        assert_eq!(p[2], (10.0, -1.0));
    }

    #[test]
    fn polygon_closes_and_rejects_degenerate() {
        let f = fixture();
        let mut s = shapes(&f, 16);
        s.begin(&f.shader).unwrap();
        assert!(matches!(s.polygon(&[0.0, 0.0, 1.0, 1.0], None), Err(RenderError::InvalidGeometry(_))));
        s.polygon(&[0.0, 0.0, 1.0, 0.0, 1.0, 1.0], None).unwrap();
        s.end().unwrap();
        let p = positions(&f.gl);
        assert_eq!(p.len(), 6);
        assert_eq!(p[5], (0.0, 0.0));
    }

    #[test]
    fn circle_segments_and_closure() {
        let f = fixture();
        let mut s = shapes(&f, 256);
        f.gl.clear_calls();
        s.begin(&f.shader).unwrap();
        // 6 * cbrt(9) truncates to 12 segments.
        s.circle(false, Vec2::new(5.0, 5.0), 9.0, None, 0).unwrap();
        s.end().unwrap();
        assert_eq!(draws(&f.gl), vec![(Primitive::Lines, 24)]);
        let p = positions(&f.gl);
        assert_eq!(p[0], (14.0, 5.0));
        assert_eq!(p[23], (14.0, 5.0));

        f.gl.clear_calls();
        s.begin(&f.shader).unwrap();
        s.circle(true, Vec2::zero(), 0.001, None, 0).unwrap();
        s.end().unwrap();
        assert_eq!(draws(&f.gl), vec![(Primitive::Triangles, 3)]);
    }

    #[test]
    fn curve_hits_both_endpoints() {
        let f = fixture();
        let mut s = shapes(&f, 128);
        s.begin(&f.shader).unwrap();
        s.curve(
            Vec2::new(0.0, 0.0),
            Vec2::new(0.0, 10.0),
            Vec2::new(10.0, 10.0),
            Vec2::new(10.0, 0.0),
            32,
            None,
        )
        .unwrap();
        s.end().unwrap();
        let p = positions(&f.gl);
        assert_eq!(p.len(), 66);
        assert_eq!(p[0], (0.0, 0.0));
        let (x, y) = p[64];
        assert!((x - 10.0).abs() < 1e-3 && y.abs() < 1e-3);
        assert_eq!(p[65], (10.0, 0.0));
        assert!(s.curve(Vec2::zero(), Vec2::zero(), Vec2::zero(), Vec2::zero(), 0, None).is_err());
    }
}

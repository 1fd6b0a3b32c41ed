use std::rc::Rc;

use crate::device::{Capability, ManagedContext, Primitive, RestorableId};
use crate::error::{RenderError, Result};
use crate::paint::BlendFactors;

use super::mesh::{Mesh, VertexAttribute};
use super::shader::ShaderProgram;
use super::texture::GpuTexture;

/// Largest vertex count whose `max_vertices * 3` indices still address `u16` vertices.
pub const MAX_BATCH_VERTICES: usize = 10920;

/// Polygon batcher configuration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatcherConfig {
    /// Vertex capacity of one batch. At most [`MAX_BATCH_VERTICES`].
    pub max_vertices: usize,
    /// Adds a dark color (`a_color2`) to every vertex.
    pub two_color_tint: bool,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_vertices: MAX_BATCH_VERTICES,
            two_color_tint: true,
        }
    }
}

/// Batches textured triangles into as few draw calls as possible.
///
/// Vertex layout: position (2), color (4), texcoords (2), plus color2 (4) with two-color
/// tint. A batch is flushed when the texture changes, when blending changes, when the
/// next element does not fit, and on [`PolygonBatcher::end`].
///
/// Idle → `begin` → Drawing → `end` → Idle.
pub struct PolygonBatcher {
    ctx: Rc<ManagedContext>,
    mesh: Mesh,
    shader: Option<Rc<ShaderProgram>>,
    drawing: bool,
    last_texture: Option<RestorableId>,
    vertices_len: usize,
    indices_len: usize,
    blend: BlendFactors,
    draw_calls: usize,
}

impl PolygonBatcher {
    pub fn new(ctx: &Rc<ManagedContext>, config: BatcherConfig) -> Result<Self> {
        if config.max_vertices > MAX_BATCH_VERTICES {
            return Err(RenderError::CapacityExceeded {
                what: "PolygonBatcher vertices",
                requested: config.max_vertices,
                capacity: MAX_BATCH_VERTICES,
            });
        }

        let mut attributes = vec![
            VertexAttribute::position2(),
            VertexAttribute::color(),
            VertexAttribute::tex_coords(0),
        ];
        if config.two_color_tint {
            attributes.push(VertexAttribute::color2());
        }
        let mesh = Mesh::new(ctx, attributes, config.max_vertices, config.max_vertices * 3);

        Ok(Self {
            ctx: ctx.clone(),
            mesh,
            shader: None,
            drawing: false,
            last_texture: None,
            vertices_len: 0,
            indices_len: 0,
            blend: BlendFactors::ALPHA,
            draw_calls: 0,
        })
    }

    #[inline]
    pub fn is_drawing(&self) -> bool {
        self.drawing
    }

    /// Floats per vertex expected by [`PolygonBatcher::draw`].
    #[inline]
    pub fn vertex_size(&self) -> usize {
        self.mesh.stride()
    }

    #[inline]
    pub fn blend(&self) -> BlendFactors {
        self.blend
    }

    /// Draw calls issued since the last `begin`.
    #[inline]
    pub fn draw_calls(&self) -> usize {
        self.draw_calls
    }

    #[inline]
    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn begin(&mut self, shader: &Rc<ShaderProgram>) -> Result<()> {
        if self.drawing {
            return Err(RenderError::AlreadyDrawing { what: "PolygonBatcher" });
        }
        self.shader = Some(shader.clone());
        self.vertices_len = 0;
        self.indices_len = 0;
        self.last_texture = None;
        self.draw_calls = 0;
        self.drawing = true;

        let gl = self.ctx.gl();
        gl.enable(Capability::Blend);
        self.apply_blend();
        Ok(())
    }

    /// Changes blending. Pending geometry is flushed first so it keeps the old state.
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

    /// Appends one element. `indices` are relative to the element's own first vertex.
    pub fn draw(&mut self, texture: &GpuTexture, vertices: &[f32], indices: &[u16]) -> Result<()> {
        if !self.drawing {
            return Err(RenderError::NotDrawing { what: "PolygonBatcher" });
        }

        let stride = self.mesh.stride();
        if vertices.len() % stride != 0 {
            return Err(RenderError::InvalidGeometry(
                "element vertex floats are not a multiple of the vertex size",
            ));
        }
        let element_vertices = vertices.len() / stride;
        if indices.iter().any(|&index| usize::from(index) >= element_vertices) {
            return Err(RenderError::InvalidGeometry("element index out of range"));
        }

        let vertex_capacity = self.mesh.vertices().len();
        let index_capacity = self.mesh.max_indices();
        if vertices.len() > vertex_capacity {
            return Err(RenderError::CapacityExceeded {
                what: "PolygonBatcher element vertex floats",
                requested: vertices.len(),
                capacity: vertex_capacity,
            });
        }
        if indices.len() > index_capacity {
            return Err(RenderError::CapacityExceeded {
                what: "PolygonBatcher element indices",
                requested: indices.len(),
                capacity: index_capacity,
            });
        }

        if self.last_texture != Some(texture.key()) {
            self.flush()?;
            texture.bind(0);
            self.last_texture = Some(texture.key());
        } else if self.vertices_len + vertices.len() > vertex_capacity
            || self.indices_len + indices.len() > index_capacity
        {
            self.flush()?;
        }

        let base = (self.vertices_len / stride) as u16;
        let start = self.vertices_len;
        self.mesh.vertices_mut()[start..start + vertices.len()].copy_from_slice(vertices);
        self.vertices_len += vertices.len();

        let start = self.indices_len;
        for (dst, &index) in self.mesh.indices_mut()[start..start + indices.len()]
            .iter_mut()
            .zip(indices)
        {
            *dst = base + index;
        }
        self.indices_len += indices.len();
        Ok(())
    }

    /// Submits pending geometry as one draw call. No-op when empty.
    pub fn flush(&mut self) -> Result<()> {
        if self.vertices_len == 0 {
            return Ok(());
        }
        let shader = self
            .shader
            .clone()
            .ok_or(RenderError::NotDrawing { what: "PolygonBatcher" })?;

        self.mesh.set_vertices_len(self.vertices_len)?;
        self.mesh.set_indices_len(self.indices_len)?;
        self.mesh.draw(&shader, Primitive::Triangles)?;

        self.vertices_len = 0;
        self.indices_len = 0;
        self.draw_calls += 1;
        Ok(())
    }

    pub fn end(&mut self) -> Result<()> {
        if !self.drawing {
            return Err(RenderError::NotDrawing { what: "PolygonBatcher" });
        }
        let flushed = self.flush();
        self.shader = None;
        self.last_texture = None;
        self.drawing = false;
        self.ctx.gl().disable(Capability::Blend);
        flushed
    }

    pub fn dispose(&self) {
        self.mesh.dispose();
    }
}

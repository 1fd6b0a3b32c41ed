use std::borrow::Cow;
use std::cell::Cell;
use std::rc::{Rc, Weak};

use crate::device::{
    BufferId, BufferTarget, BufferUsage, GlBackend, ManagedContext, Primitive, Restorable,
    RestorableId,
};
use crate::error::{RenderError, Result};

use super::shader::ShaderProgram;

/// Named float attribute in an interleaved vertex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub name: Cow<'static, str>,
    pub num_elements: usize,
}

impl VertexAttribute {
    pub fn new(name: impl Into<Cow<'static, str>>, num_elements: usize) -> Self {
        Self {
            name: name.into(),
            num_elements,
        }
    }

    pub fn position2() -> Self {
        Self::new(ShaderProgram::POSITION, 2)
    }

    pub fn position3() -> Self {
        Self::new(ShaderProgram::POSITION, 3)
    }

    pub fn color() -> Self {
        Self::new(ShaderProgram::COLOR, 4)
    }

    /// Dark color for two-color tinting.
    pub fn color2() -> Self {
        Self::new(ShaderProgram::COLOR2, 4)
    }

    /// Texture coordinates; unit 0 is `a_texCoords`, unit N is `a_texCoordsN`.
    pub fn tex_coords(unit: u32) -> Self {
        if unit == 0 {
            Self::new(ShaderProgram::TEXCOORDS, 2)
        } else {
            Self::new(format!("{}{unit}", ShaderProgram::TEXCOORDS), 2)
        }
    }
}

/// What [`Mesh::bind`] does when the program has no location for an attribute.
///
/// Drivers strip attributes the shader never reads, so a missing location is usually benign.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub enum AttributePolicy {
    /// Skip the attribute (one-time debug message).
    #[default]
    Skip,
    /// Fail with [`RenderError::AttributeNotFound`].
    Fail,
}

/// GPU-side state shared with the restoration registry.
struct MeshBuffers {
    vertices: Cell<Option<BufferId>>,
    indices: Cell<Option<BufferId>>,
    dirty_vertices: Cell<bool>,
    dirty_indices: Cell<bool>,
}

impl Restorable for MeshBuffers {
    fn label(&self) -> &'static str {
        "Mesh"
    }

    fn restore(&self, _gl: &dyn GlBackend) -> Result<()> {
        // Old names died with the context. The next draw re-creates and re-uploads.
        self.vertices.set(None);
        self.indices.set(None);
        self.dirty_vertices.set(true);
        self.dirty_indices.set(true);
        Ok(())
    }
}

/// Interleaved vertex array plus `u16` index array, mirrored on the CPU.
///
/// Capacity is fixed at construction. Writers fill [`Mesh::vertices_mut`] /
/// [`Mesh::indices_mut`] and then set the used lengths; only the used prefix is uploaded,
/// and only when it changed since the last draw.
///
/// While the context is lost, draws are skipped and the data stays dirty, so it is
/// uploaded once the context comes back.
pub struct Mesh {
    ctx: Rc<ManagedContext>,
    gpu: Rc<MeshBuffers>,
    registration: Cell<Option<RestorableId>>,

    attributes: Vec<VertexAttribute>,
    stride: usize,
    vertices: Vec<f32>,
    indices: Vec<u16>,
    vertices_len: usize,
    indices_len: usize,

    attribute_policy: AttributePolicy,
    warned_missing_attribute: Cell<bool>,
}

impl Mesh {
    /// Creates a mesh holding up to `max_vertices` vertices and `max_indices` indices.
    ///
    /// Buffers are created lazily on the first draw.
    pub fn new(
        ctx: &Rc<ManagedContext>,
        attributes: Vec<VertexAttribute>,
        max_vertices: usize,
        max_indices: usize,
    ) -> Self {
        let stride = attributes.iter().map(|a| a.num_elements).sum();
        let gpu = Rc::new(MeshBuffers {
            vertices: Cell::new(None),
            indices: Cell::new(None),
            dirty_vertices: Cell::new(false),
            dirty_indices: Cell::new(false),
        });
        let weak: Weak<dyn Restorable> = Rc::downgrade(&gpu) as Weak<dyn Restorable>;
        let registration = ctx.add_restorable(weak);

        Self {
            ctx: ctx.clone(),
            gpu,
            registration: Cell::new(Some(registration)),
            attributes,
            stride,
            vertices: vec![0.0; max_vertices * stride],
            indices: vec![0; max_indices],
            vertices_len: 0,
            indices_len: 0,
            attribute_policy: AttributePolicy::default(),
            warned_missing_attribute: Cell::new(false),
        }
    }

    #[inline]
    pub fn attributes(&self) -> &[VertexAttribute] {
        &self.attributes
    }

    /// Floats per vertex.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn max_vertices(&self) -> usize {
        if self.stride == 0 { 0 } else { self.vertices.len() / self.stride }
    }

    #[inline]
    pub fn num_vertices(&self) -> usize {
        if self.stride == 0 { 0 } else { self.vertices_len / self.stride }
    }

    #[inline]
    pub fn max_indices(&self) -> usize {
        self.indices.len()
    }

    #[inline]
    pub fn num_indices(&self) -> usize {
        self.indices_len
    }

    #[inline]
    pub fn vertices(&self) -> &[f32] {
        &self.vertices
    }

    /// Whole backing array; pair with [`Mesh::set_vertices_len`].
    #[inline]
    pub fn vertices_mut(&mut self) -> &mut [f32] {
        &mut self.vertices
    }

    #[inline]
    pub fn indices(&self) -> &[u16] {
        &self.indices
    }

    /// Whole backing array; pair with [`Mesh::set_indices_len`].
    #[inline]
    pub fn indices_mut(&mut self) -> &mut [u16] {
        &mut self.indices
    }

    pub fn set_attribute_policy(&mut self, policy: AttributePolicy) {
        self.attribute_policy = policy;
    }

    /// Sets the used vertex length in floats and marks the vertices dirty.
    pub fn set_vertices_len(&mut self, len: usize) -> Result<()> {
        if len > self.vertices.len() {
            return Err(RenderError::CapacityExceeded {
                what: "mesh vertex floats",
                requested: len,
                capacity: self.vertices.len(),
            });
        }
        self.vertices_len = len;
        self.gpu.dirty_vertices.set(true);
        Ok(())
    }

    /// Sets the used index count and marks the indices dirty.
    pub fn set_indices_len(&mut self, len: usize) -> Result<()> {
        if len > self.indices.len() {
            return Err(RenderError::CapacityExceeded {
                what: "mesh indices",
                requested: len,
                capacity: self.indices.len(),
            });
        }
        self.indices_len = len;
        self.gpu.dirty_indices.set(true);
        Ok(())
    }

    pub fn set_vertices(&mut self, vertices: &[f32]) -> Result<()> {
        self.set_vertices_len(vertices.len())?;
        self.vertices[..vertices.len()].copy_from_slice(vertices);
        Ok(())
    }

    pub fn set_indices(&mut self, indices: &[u16]) -> Result<()> {
        self.set_indices_len(indices.len())?;
        self.indices[..indices.len()].copy_from_slice(indices);
        Ok(())
    }

    // ── drawing ───────────────────────────────────────────────────────────

    /// Draws every used index, or every used vertex when no indices are set.
    pub fn draw(&self, shader: &ShaderProgram, primitive: Primitive) -> Result<()> {
        let count = if self.indices_len > 0 {
            self.indices_len
        } else {
            self.num_vertices()
        };
        self.draw_with_offset(shader, primitive, 0, count)
    }

    /// Draws `count` indices (or vertices) starting at `offset`.
    pub fn draw_with_offset(
        &self,
        shader: &ShaderProgram,
        primitive: Primitive,
        offset: usize,
        count: usize,
    ) -> Result<()> {
        let (what, used) = if self.indices_len > 0 {
            ("mesh drawn indices", self.indices_len)
        } else {
            ("mesh drawn vertices", self.num_vertices())
        };
        let end = offset.saturating_add(count);
        if end > used {
            return Err(RenderError::CapacityExceeded {
                what,
                requested: end,
                capacity: used,
            });
        }

        if self.ctx.is_lost() {
            return Ok(());
        }
        self.upload()?;
        self.bind(shader)?;

        let gl = self.ctx.gl();
        if self.indices_len > 0 {
            gl.draw_elements_u16(primitive, count as i32, (offset * 2) as i32);
        } else {
            gl.draw_arrays(primitive, offset as i32, count as i32);
        }

        self.unbind(shader);
        Ok(())
    }

    /// Binds the vertex buffer and describes every attribute found in `shader`.
    pub fn bind(&self, shader: &ShaderProgram) -> Result<()> {
        let gl = self.ctx.gl();
        gl.bind_buffer(BufferTarget::Array, self.gpu.vertices.get());

        let stride_bytes = (self.stride * 4) as i32;
        let mut offset = 0;
        for attribute in &self.attributes {
            match shader.attribute_location(&attribute.name) {
                Some(location) => {
                    gl.enable_vertex_attrib_array(location);
                    gl.vertex_attrib_pointer_f32(
                        location,
                        attribute.num_elements as i32,
                        stride_bytes,
                        (offset * 4) as i32,
                    );
                }
                None => self.missing_attribute(&attribute.name)?,
            }
            offset += attribute.num_elements;
        }

        if self.indices_len > 0 {
            gl.bind_buffer(BufferTarget::ElementArray, self.gpu.indices.get());
        }
        Ok(())
    }

    pub fn unbind(&self, shader: &ShaderProgram) {
        let gl = self.ctx.gl();
        for attribute in &self.attributes {
            if let Some(location) = shader.attribute_location(&attribute.name) {
                gl.disable_vertex_attrib_array(location);
            }
        }
        gl.bind_buffer(BufferTarget::Array, None);
        if self.indices_len > 0 {
            gl.bind_buffer(BufferTarget::ElementArray, None);
        }
    }

    fn missing_attribute(&self, name: &str) -> Result<()> {
        match self.attribute_policy {
            AttributePolicy::Fail => Err(RenderError::AttributeNotFound(name.to_owned())),
            AttributePolicy::Skip => {
                if !self.warned_missing_attribute.replace(true) {
                    log::debug!("Mesh: attribute {name} has no location; skipped");
                }
                Ok(())
            }
        }
    }

    /// Uploads dirty arrays, creating buffers on first use.
    fn upload(&self) -> Result<()> {
        let gl = self.ctx.gl();

        if self.gpu.dirty_vertices.get() {
            let buffer = ensure_buffer(gl, &self.gpu.vertices)?;
            gl.bind_buffer(BufferTarget::Array, Some(buffer));
            gl.buffer_data(
                BufferTarget::Array,
                bytemuck::cast_slice(&self.vertices[..self.vertices_len]),
                BufferUsage::Dynamic,
            );
            self.gpu.dirty_vertices.set(false);
        }

        if self.gpu.dirty_indices.get() {
            let buffer = ensure_buffer(gl, &self.gpu.indices)?;
            gl.bind_buffer(BufferTarget::ElementArray, Some(buffer));
            gl.buffer_data(
                BufferTarget::ElementArray,
                bytemuck::cast_slice(&self.indices[..self.indices_len]),
                BufferUsage::Dynamic,
            );
            self.gpu.dirty_indices.set(false);
        }
        Ok(())
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    /// Deregisters and deletes the buffers. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(id) = self.registration.take() {
            self.ctx.remove_restorable(id);
        }
        let gl = self.ctx.gl();
        if let Some(buffer) = self.gpu.vertices.take() {
            gl.delete_buffer(buffer);
        }
        if let Some(buffer) = self.gpu.indices.take() {
            gl.delete_buffer(buffer);
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.registration.get().is_none()
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn ensure_buffer(gl: &dyn GlBackend, slot: &Cell<Option<BufferId>>) -> Result<BufferId> {
    if let Some(buffer) = slot.get() {
        return Ok(buffer);
    }
    let buffer = gl
        .create_buffer()
        .ok_or(RenderError::ResourceCreation("buffer"))?;
    slot.set(Some(buffer));
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{GlCall, HeadlessBackend};

    fn setup() -> (HeadlessBackend, Rc<ManagedContext>, ShaderProgram) {
        let gl = HeadlessBackend::new();
        let ctx = ManagedContext::new(gl.clone());
        let shader = ShaderProgram::colored(&ctx).unwrap();
        (gl, ctx, shader)
    }

    fn colored_mesh(ctx: &Rc<ManagedContext>, max_vertices: usize, max_indices: usize) -> Mesh {
        Mesh::new(
            ctx,
            vec![VertexAttribute::position2(), VertexAttribute::color()],
            max_vertices,
            max_indices,
        )
    }

    // ── layout ────────────────────────────────────────────────────────────

    #[test]
    fn stride_sums_attributes() {
        let (_gl, ctx, _shader) = setup();
        let mesh = Mesh::new(
            &ctx,
            vec![
                VertexAttribute::position2(),
                VertexAttribute::color(),
                VertexAttribute::tex_coords(0),
                VertexAttribute::color2(),
            ],
            4,
            6,
        );
        assert_eq!(mesh.stride(), 12);
        assert_eq!(mesh.max_vertices(), 4);
        assert_eq!(mesh.vertices().len(), 48);
        assert_eq!(VertexAttribute::tex_coords(1).name, "a_texCoords1");
    }

    #[test]
    fn oversized_writes_fail_fast() {
        let (_gl, ctx, _shader) = setup();
        let mut mesh = colored_mesh(&ctx, 2, 3);
        let err = mesh.set_vertices(&[0.0; 13]).unwrap_err();
        assert_eq!(
            err,
            RenderError::CapacityExceeded { what: "mesh vertex floats", requested: 13, capacity: 12 }
        );
        assert!(mesh.set_indices(&[0, 1, 2, 3]).is_err());
        assert!(mesh.set_vertices(&[0.0; 12]).is_ok());
        assert_eq!(mesh.num_vertices(), 2);
    }

    // ── draw ──────────────────────────────────────────────────────────────

    #[test]
    fn draw_uploads_used_prefix_once() {
        let (gl, ctx, shader) = setup();
        let mut mesh = colored_mesh(&ctx, 8, 12);
        let tri = [
            0.0, 0.0, 1.0, 1.0, 1.0, 1.0, //
            1.0, 0.0, 1.0, 1.0, 1.0, 1.0, //
            0.0, 1.0, 1.0, 1.0, 1.0, 1.0,
        ];
        mesh.set_vertices(&tri).unwrap();
        mesh.set_indices(&[0, 1, 2]).unwrap();

        gl.clear_calls();
        mesh.draw(&shader, Primitive::Triangles).unwrap();
        assert_eq!(gl.last_vertices(), tri.to_vec());
        assert_eq!(gl.last_indices(), vec![0, 1, 2]);
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawElements { primitive: Primitive::Triangles, count: 3, offset: 0 }]
        );

        gl.clear_calls();
        mesh.draw(&shader, Primitive::Triangles).unwrap();
        assert_eq!(gl.count(|c| matches!(c, GlCall::BufferData { .. })), 0);
        assert_eq!(gl.draw_calls().len(), 1);
    }

    #[test]
    fn draw_without_indices_uses_arrays() {
        let (gl, ctx, shader) = setup();
        let mut mesh = colored_mesh(&ctx, 8, 0);
        mesh.set_vertices(&[0.0; 12]).unwrap();

        gl.clear_calls();
        mesh.draw(&shader, Primitive::Lines).unwrap();
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawArrays { primitive: Primitive::Lines, first: 0, count: 2 }]
        );
        assert!(gl.calls().contains(&GlCall::AttribPointer { index: 1, size: 4, stride: 24, offset: 8 }));
    }

    #[test]
    fn draw_with_offset_uses_byte_offsets() {
        let (gl, ctx, shader) = setup();
        let mut mesh = colored_mesh(&ctx, 8, 12);
        mesh.set_vertices(&[0.0; 24]).unwrap();
        mesh.set_indices(&[0, 1, 2, 2, 3, 0]).unwrap();

        gl.clear_calls();
        mesh.draw_with_offset(&shader, Primitive::Triangles, 3, 3).unwrap();
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawElements { primitive: Primitive::Triangles, count: 3, offset: 6 }]
        );
    }

    #[test]
    fn three_component_positions_widen_the_stride() {
        let (gl, ctx, shader) = setup();
        let mut mesh = Mesh::new(
            &ctx,
            vec![VertexAttribute::position3(), VertexAttribute::color()],
            3,
            0,
        );
        assert_eq!(mesh.stride(), 7);
        mesh.set_vertices(&[0.0; 21]).unwrap();

        gl.clear_calls();
        mesh.draw(&shader, Primitive::Triangles).unwrap();
        assert!(gl.calls().contains(&GlCall::AttribPointer { index: 0, size: 3, stride: 28, offset: 0 }));
        assert!(gl.calls().contains(&GlCall::AttribPointer { index: 1, size: 4, stride: 28, offset: 12 }));
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawArrays { primitive: Primitive::Triangles, first: 0, count: 3 }]
        );
    }

    #[test]
    fn draw_range_must_stay_within_used_data() {
        let (gl, ctx, shader) = setup();
        let mut mesh = colored_mesh(&ctx, 8, 12);
        mesh.set_vertices(&[0.0; 24]).unwrap();
        mesh.set_indices(&[0, 1, 2, 2, 3, 0]).unwrap();

        gl.clear_calls();
        let err = mesh
            .draw_with_offset(&shader, Primitive::Triangles, 3, 6)
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::CapacityExceeded { what: "mesh drawn indices", requested: 9, capacity: 6 }
        );
        assert!(mesh
            .draw_with_offset(&shader, Primitive::Triangles, usize::MAX, 1)
            .is_err());

        mesh.set_indices_len(0).unwrap();
        assert!(matches!(
            mesh.draw_with_offset(&shader, Primitive::Points, 2, 3),
            Err(RenderError::CapacityExceeded { requested: 5, capacity: 4, .. })
        ));
        assert!(gl.draw_calls().is_empty());

        mesh.draw_with_offset(&shader, Primitive::Points, 1, 3).unwrap();
        assert_eq!(
            gl.draw_calls(),
            vec![GlCall::DrawArrays { primitive: Primitive::Points, first: 1, count: 3 }]
        );
    }

    #[test]
    fn missing_attribute_policy() {
        let (gl, ctx, shader) = setup();
        let mut mesh = Mesh::new(
            &ctx,
            vec![VertexAttribute::position2(), VertexAttribute::tex_coords(0)],
            4,
            0,
        );
        mesh.set_vertices(&[0.0; 4]).unwrap();

        gl.clear_calls();
        mesh.draw(&shader, Primitive::Points).unwrap();
        assert_eq!(gl.draw_calls().len(), 1);
        assert_eq!(gl.count(|c| matches!(c, GlCall::AttribPointer { .. })), 1);

        mesh.set_attribute_policy(AttributePolicy::Fail);
        assert_eq!(
            mesh.draw(&shader, Primitive::Points),
            Err(RenderError::AttributeNotFound("a_texCoords".into()))
        );
    }

    // ── loss / lifetime ───────────────────────────────────────────────────

    #[test]
    fn restore_reuploads_same_data_exactly_once() {
        let (gl, ctx, shader) = setup();
        let mut mesh = colored_mesh(&ctx, 4, 6);
        let quad: Vec<f32> = (0..24).map(|i| i as f32).collect();
        mesh.set_vertices(&quad).unwrap();
        mesh.set_indices(&[0, 1, 2, 2, 3, 0]).unwrap();
        mesh.draw(&shader, Primitive::Triangles).unwrap();

        gl.lose_context();
        ctx.mark_lost();
        mesh.draw(&shader, Primitive::Triangles).unwrap();

        gl.restore_context();
        gl.clear_calls();
        assert!(ctx.mark_restored().is_ok());

        mesh.draw(&shader, Primitive::Triangles).unwrap();
        mesh.draw(&shader, Primitive::Triangles).unwrap();

        let uploads = gl.count(|c| matches!(c, GlCall::BufferData { .. }));
        assert_eq!(uploads, 2);
        assert_eq!(gl.last_vertices(), quad);
        assert_eq!(gl.last_indices(), vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(gl.draw_calls().len(), 2);
    }

    #[test]
    fn draws_are_skipped_while_lost() {
        let (gl, ctx, shader) = setup();
        let mut mesh = colored_mesh(&ctx, 4, 0);
        mesh.set_vertices(&[0.0; 6]).unwrap();
        ctx.mark_lost();
        gl.clear_calls();
        mesh.draw(&shader, Primitive::Points).unwrap();
        assert!(gl.calls().is_empty());
    }

    #[test]
    fn dispose_is_idempotent() {
        let (gl, ctx, shader) = setup();
        let mut mesh = colored_mesh(&ctx, 4, 6);
        mesh.set_vertices(&[0.0; 24]).unwrap();
        mesh.set_indices(&[0, 1, 2]).unwrap();
        mesh.draw(&shader, Primitive::Triangles).unwrap();
        let before = ctx.restorable_count();
        assert_eq!(gl.live_buffers(), 2);

        mesh.dispose();
        mesh.dispose();
        drop(mesh);

        assert!(gl.live_buffers() == 0);
        assert_eq!(gl.invalid_deletes(), 0);
        assert_eq!(ctx.restorable_count(), before - 1);
    }
}

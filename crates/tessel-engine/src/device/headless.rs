use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::num::NonZeroU32;
use std::rc::Rc;

use super::backend::{
    BlendFactor, BufferId, BufferTarget, BufferUsage, Capability, GlBackend, Primitive, ProgramId,
    ShaderId, ShaderStage, TextureFilter, TextureId, TextureWrap, UniformLocation, UniformValue,
};

/// Owned copy of a uniform upload.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    Int(i32),
    Floats(Vec<f32>),
}

/// One recorded backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    CreateBuffer(BufferId),
    DeleteBuffer(BufferId),
    BindBuffer(BufferTarget, Option<BufferId>),
    BufferData {
        target: BufferTarget,
        buffer: Option<BufferId>,
        len: usize,
        usage: BufferUsage,
    },
    CreateShader(ShaderStage, ShaderId),
    CompileShader(ShaderId),
    DeleteShader(ShaderId),
    CreateProgram(ProgramId),
    LinkProgram(ProgramId),
    DeleteProgram(ProgramId),
    UseProgram(Option<ProgramId>),
    Uniform {
        name: String,
        data: UniformData,
    },
    EnableAttrib(u32),
    DisableAttrib(u32),
    AttribPointer {
        index: u32,
        size: i32,
        stride: i32,
        offset: i32,
    },
    DrawArrays {
        primitive: Primitive,
        first: i32,
        count: i32,
    },
    DrawElements {
        primitive: Primitive,
        count: i32,
        offset: i32,
    },
    Enable(Capability),
    Disable(Capability),
    BlendFunc {
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    },
    Viewport {
        x: i32,
        y: i32,
        width: i32,
        height: i32,
    },
    Clear([f32; 4]),
    CreateTexture(TextureId),
    DeleteTexture(TextureId),
    ActiveTexture(u32),
    BindTexture(Option<TextureId>),
    TexImage {
        texture: Option<TextureId>,
        width: u32,
        height: u32,
    },
    TexFilters {
        min: TextureFilter,
        mag: TextureFilter,
    },
    TexWraps {
        s: TextureWrap,
        t: TextureWrap,
    },
    GenerateMipmap,
}

impl GlCall {
    #[inline]
    pub fn is_draw(&self) -> bool {
        matches!(self, GlCall::DrawArrays { .. } | GlCall::DrawElements { .. })
    }
}

struct ProgramObject {
    attributes: Vec<String>,
    uniforms: HashMap<String, UniformLocation>,
}

#[derive(Default)]
struct HeadlessState {
    next_name: u32,
    next_location: u32,
    lost: bool,
    calls: Vec<GlCall>,

    buffers: HashMap<BufferId, Vec<u8>>,
    shaders: HashMap<ShaderId, String>,
    programs: HashMap<ProgramId, Option<ProgramObject>>,
    textures: HashSet<TextureId>,
    uniform_names: HashMap<u32, String>,
    hidden_attributes: HashSet<String>,

    bound_array: Option<BufferId>,
    bound_element: Option<BufferId>,
    bound_texture: Option<TextureId>,
    last_upload: HashMap<BufferTarget, Vec<u8>>,

    invalid_deletes: usize,
}

impl HeadlessState {
    fn next_name(&mut self) -> NonZeroU32 {
        self.next_name += 1;
        // Starts at 1 and only grows, so names are never reused across a context loss.
        NonZeroU32::new(self.next_name).unwrap_or(NonZeroU32::MIN)
    }

    fn record(&mut self, call: GlCall) {
        self.calls.push(call);
    }

    fn bound(&self, target: BufferTarget) -> Option<BufferId> {
        match target {
            BufferTarget::Array => self.bound_array,
            BufferTarget::ElementArray => self.bound_element,
        }
    }
}

/// GPU-less [`GlBackend`] that records every call.
///
/// Cloning yields another handle onto the same state, so a test can hand one clone to
/// `ManagedContext` and keep the other for inspection.
///
/// Behavior:
/// - object names come from one counter and are never reused
/// - a shader fails to compile when its source contains `#error`
/// - a program fails to link when either stage lacks `main`
/// - attribute and uniform locations are parsed from the declarations, in order
/// - while lost, creation returns `None` and every other call is ignored (not recorded)
#[derive(Clone, Default)]
pub struct HeadlessBackend {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    // ── context loss ──────────────────────────────────────────────────────

    /// Drops every object and starts ignoring calls, like a driver reset.
    pub fn lose_context(&self) {
        let mut s = self.state.borrow_mut();
        s.lost = true;
        s.buffers.clear();
        s.shaders.clear();
        s.programs.clear();
        s.textures.clear();
        s.uniform_names.clear();
        s.bound_array = None;
        s.bound_element = None;
        s.bound_texture = None;
    }

    /// Accepts calls again. Objects created before the loss stay gone.
    pub fn restore_context(&self) {
        self.state.borrow_mut().lost = false;
    }

    /// Makes `name` report no location, as if the driver optimized the attribute out.
    pub fn hide_attribute(&self, name: &str) {
        self.state.borrow_mut().hidden_attributes.insert(name.to_owned());
    }

    // ── inspection ────────────────────────────────────────────────────────

    pub fn calls(&self) -> Vec<GlCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Recorded `DrawArrays` / `DrawElements` calls.
    pub fn draw_calls(&self) -> Vec<GlCall> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter(|c| c.is_draw())
            .cloned()
            .collect()
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&GlCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    /// Bytes most recently uploaded to `target`.
    pub fn last_upload(&self, target: BufferTarget) -> Option<Vec<u8>> {
        self.state.borrow().last_upload.get(&target).cloned()
    }

    /// Most recent `Array` upload decoded as floats.
    pub fn last_vertices(&self) -> Vec<f32> {
        self.last_upload(BufferTarget::Array)
            .map(|bytes| {
                bytes
                    .chunks_exact(4)
                    .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Most recent `ElementArray` upload decoded as `u16` indices.
    pub fn last_indices(&self) -> Vec<u16> {
        self.last_upload(BufferTarget::ElementArray)
            .map(|bytes| {
                bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_ne_bytes([c[0], c[1]]))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(&buffer).cloned()
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_shaders(&self) -> usize {
        self.state.borrow().shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    /// Total live objects of every kind.
    pub fn live_objects(&self) -> usize {
        self.live_buffers() + self.live_shaders() + self.live_programs() + self.live_textures()
    }

    /// Deletions of names that were not live (double frees or stale handles).
    pub fn invalid_deletes(&self) -> usize {
        self.state.borrow().invalid_deletes
    }
}

/// Names declared with `qualifier` (`attribute`, `in`, `uniform`), in declaration order.
fn declared_names(source: &str, qualifiers: &[&str]) -> Vec<String> {
    let mut out = Vec::new();
    for statement in source.split(';') {
        let tokens: Vec<&str> = statement.split_whitespace().collect();
        if !tokens.iter().any(|t| qualifiers.contains(t)) {
            continue;
        }
        let Some(last) = tokens.last() else { continue };
        let name = last.split('[').next().unwrap_or(last);
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_owned());
        }
    }
    out
}

impl GlBackend for HeadlessBackend {
    fn is_context_lost(&self) -> bool {
        self.state.borrow().lost
    }

    fn create_buffer(&self) -> Option<BufferId> {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return None;
        }
        let id = BufferId(s.next_name());
        s.buffers.insert(id, Vec::new());
        s.record(GlCall::CreateBuffer(id));
        Some(id)
    }

    fn delete_buffer(&self, buffer: BufferId) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        if s.buffers.remove(&buffer).is_none() {
            s.invalid_deletes += 1;
        }
        if s.bound_array == Some(buffer) {
            s.bound_array = None;
        }
        if s.bound_element == Some(buffer) {
            s.bound_element = None;
        }
        s.record(GlCall::DeleteBuffer(buffer));
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        match target {
            BufferTarget::Array => s.bound_array = buffer,
            BufferTarget::ElementArray => s.bound_element = buffer,
        }
        s.record(GlCall::BindBuffer(target, buffer));
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        let buffer = s.bound(target);
        if let Some(store) = buffer.and_then(|b| s.buffers.get_mut(&b)) {
            store.clear();
            store.extend_from_slice(data);
        }
        s.last_upload.insert(target, data.to_vec());
        s.record(GlCall::BufferData {
            target,
            buffer,
            len: data.len(),
            usage,
        });
    }

    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId> {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return None;
        }
        let id = ShaderId(s.next_name());
        s.shaders.insert(id, String::new());
        s.record(GlCall::CreateShader(stage, id));
        Some(id)
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> bool {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return false;
        }
        s.record(GlCall::CompileShader(shader));
        match s.shaders.get_mut(&shader) {
            Some(src) => {
                *src = source.to_owned();
                !source.contains("#error")
            }
            None => false,
        }
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        let s = self.state.borrow();
        match s.shaders.get(&shader) {
            Some(src) if src.contains("#error") => "ERROR: 0:1: '#error' : user error".to_owned(),
            _ => String::new(),
        }
    }

    fn delete_shader(&self, shader: ShaderId) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        if s.shaders.remove(&shader).is_none() {
            s.invalid_deletes += 1;
        }
        s.record(GlCall::DeleteShader(shader));
    }

    fn create_program(&self) -> Option<ProgramId> {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return None;
        }
        let id = ProgramId(s.next_name());
        s.programs.insert(id, None);
        s.record(GlCall::CreateProgram(id));
        Some(id)
    }

    fn link_program(&self, program: ProgramId, vertex: ShaderId, fragment: ShaderId) -> bool {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return false;
        }
        s.record(GlCall::LinkProgram(program));

        let (Some(vs), Some(fs)) = (s.shaders.get(&vertex), s.shaders.get(&fragment)) else {
            return false;
        };
        if !vs.contains("main") || !fs.contains("main") {
            return false;
        }

        let attributes = declared_names(vs, &["attribute", "in"]);
        let mut uniform_names = declared_names(vs, &["uniform"]);
        for name in declared_names(fs, &["uniform"]) {
            if !uniform_names.contains(&name) {
                uniform_names.push(name);
            }
        }

        let mut uniforms = HashMap::new();
        for name in uniform_names {
            let location = UniformLocation(s.next_location);
            s.next_location += 1;
            s.uniform_names.insert(location.0, name.clone());
            uniforms.insert(name, location);
        }

        if !s.programs.contains_key(&program) {
            return false;
        }
        s.programs.insert(program, Some(ProgramObject { attributes, uniforms }));
        true
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        match self.state.borrow().programs.get(&program) {
            Some(Some(_)) => String::new(),
            _ => "ERROR: missing main() in shader stage".to_owned(),
        }
    }

    fn delete_program(&self, program: ProgramId) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        if s.programs.remove(&program).is_none() {
            s.invalid_deletes += 1;
        }
        s.record(GlCall::DeleteProgram(program));
    }

    fn use_program(&self, program: Option<ProgramId>) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        s.record(GlCall::UseProgram(program));
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        let s = self.state.borrow();
        if s.lost || s.hidden_attributes.contains(name) {
            return None;
        }
        let linked = s.programs.get(&program)?.as_ref()?;
        linked
            .attributes
            .iter()
            .position(|a| a == name)
            .map(|i| i as u32)
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let s = self.state.borrow();
        if s.lost {
            return None;
        }
        let linked = s.programs.get(&program)?.as_ref()?;
        linked.uniforms.get(name).copied()
    }

    fn uniform(&self, location: UniformLocation, value: UniformValue<'_>) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        let name = s
            .uniform_names
            .get(&location.0)
            .cloned()
            .unwrap_or_else(|| format!("#{}", location.0));
        let data = match value {
            UniformValue::I32(v) => UniformData::Int(v),
            UniformValue::F32(v) => UniformData::Floats(vec![v]),
            UniformValue::Vec2(v) => UniformData::Floats(v.to_vec()),
            UniformValue::Vec3(v) => UniformData::Floats(v.to_vec()),
            UniformValue::Vec4(v) => UniformData::Floats(v.to_vec()),
            UniformValue::Mat2(m) => UniformData::Floats(m.to_vec()),
            UniformValue::Mat3(m) => UniformData::Floats(m.to_vec()),
            UniformValue::Mat4(m) => UniformData::Floats(m.to_vec()),
        };
        s.record(GlCall::Uniform { name, data });
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::EnableAttrib(index));
        }
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::DisableAttrib(index));
        }
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::AttribPointer {
                index,
                size,
                stride,
                offset,
            });
        }
    }

    fn draw_arrays(&self, primitive: Primitive, first: i32, count: i32) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::DrawArrays {
                primitive,
                first,
                count,
            });
        }
    }

    fn draw_elements_u16(&self, primitive: Primitive, count: i32, offset: i32) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::DrawElements {
                primitive,
                count,
                offset,
            });
        }
    }

    fn enable(&self, capability: Capability) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::Enable(capability));
        }
    }

    fn disable(&self, capability: Capability) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::Disable(capability));
        }
    }

    fn blend_func_separate(
        &self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::BlendFunc {
                src_color,
                dst_color,
                src_alpha,
                dst_alpha,
            });
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::Viewport {
                x,
                y,
                width,
                height,
            });
        }
    }

    fn clear(&self, color: [f32; 4]) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::Clear(color));
        }
    }

    fn create_texture(&self) -> Option<TextureId> {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return None;
        }
        let id = TextureId(s.next_name());
        s.textures.insert(id);
        s.record(GlCall::CreateTexture(id));
        Some(id)
    }

    fn delete_texture(&self, texture: TextureId) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        if !s.textures.remove(&texture) {
            s.invalid_deletes += 1;
        }
        if s.bound_texture == Some(texture) {
            s.bound_texture = None;
        }
        s.record(GlCall::DeleteTexture(texture));
    }

    fn active_texture(&self, unit: u32) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::ActiveTexture(unit));
        }
    }

    fn bind_texture_2d(&self, texture: Option<TextureId>) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        s.bound_texture = texture;
        s.record(GlCall::BindTexture(texture));
    }

    fn tex_image_2d_rgba8(&self, width: u32, height: u32, _pixels: &[u8]) {
        let mut s = self.state.borrow_mut();
        if s.lost {
            return;
        }
        let texture = s.bound_texture;
        s.record(GlCall::TexImage {
            texture,
            width,
            height,
        });
    }

    fn tex_filters(&self, min: TextureFilter, mag: TextureFilter) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::TexFilters { min, mag });
        }
    }

    fn tex_wraps(&self, ws: TextureWrap, wt: TextureWrap) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::TexWraps { s: ws, t: wt });
        }
    }

    fn generate_mipmap_2d(&self) {
        let mut s = self.state.borrow_mut();
        if !s.lost {
            s.record(GlCall::GenerateMipmap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "attribute vec4 a_position; attribute vec4 a_color; \
                      uniform mat4 u_projTrans; void main() { gl_Position = a_position; }";
    const FS: &str = "uniform sampler2D u_texture; void main() { gl_FragColor = vec4(1.0); }";

    fn linked(gl: &HeadlessBackend) -> ProgramId {
        let vs = gl.create_shader(ShaderStage::Vertex).unwrap();
        let fs = gl.create_shader(ShaderStage::Fragment).unwrap();
        assert!(gl.compile_shader(vs, VS));
        assert!(gl.compile_shader(fs, FS));
        let p = gl.create_program().unwrap();
        assert!(gl.link_program(p, vs, fs));
        p
    }

    // ── objects ───────────────────────────────────────────────────────────

    #[test]
    fn names_are_unique_and_tracked() {
        let gl = HeadlessBackend::new();
        let a = gl.create_buffer().unwrap();
        let b = gl.create_buffer().unwrap();
        assert_ne!(a, b);
        assert_eq!(gl.live_buffers(), 2);

        gl.delete_buffer(a);
        gl.delete_buffer(a);
        assert_eq!(gl.live_buffers(), 1);
        assert_eq!(gl.invalid_deletes(), 1);
    }

    #[test]
    fn buffer_data_lands_in_bound_buffer() {
        let gl = HeadlessBackend::new();
        let b = gl.create_buffer().unwrap();
        gl.bind_buffer(BufferTarget::Array, Some(b));
        let floats = [1.0f32, 2.5];
        gl.buffer_data(
            BufferTarget::Array,
            bytemuck::cast_slice(&floats),
            BufferUsage::Dynamic,
        );
        assert_eq!(gl.buffer_contents(b).map(|v| v.len()), Some(8));
        assert_eq!(gl.last_vertices(), vec![1.0, 2.5]);
    }

    // ── programs ──────────────────────────────────────────────────────────

    #[test]
    fn locations_follow_declarations() {
        let gl = HeadlessBackend::new();
        let p = linked(&gl);
        assert_eq!(gl.attrib_location(p, "a_position"), Some(0));
        assert_eq!(gl.attrib_location(p, "a_color"), Some(1));
        assert_eq!(gl.attrib_location(p, "a_texCoords"), None);
        assert!(gl.uniform_location(p, "u_projTrans").is_some());
        assert!(gl.uniform_location(p, "u_texture").is_some());
        assert!(gl.uniform_location(p, "u_missing").is_none());

        gl.hide_attribute("a_color");
        assert_eq!(gl.attrib_location(p, "a_color"), None);
    }

    #[test]
    fn error_directive_fails_compile() {
        let gl = HeadlessBackend::new();
        let vs = gl.create_shader(ShaderStage::Vertex).unwrap();
        assert!(!gl.compile_shader(vs, "#error nope\nvoid main() {}"));
        assert!(!gl.shader_info_log(vs).is_empty());
    }

    #[test]
    fn uniform_uploads_record_names() {
        let gl = HeadlessBackend::new();
        let p = linked(&gl);
        let loc = gl.uniform_location(p, "u_texture").unwrap();
        gl.uniform(loc, UniformValue::I32(0));
        assert!(gl.calls().contains(&GlCall::Uniform {
            name: "u_texture".into(),
            data: UniformData::Int(0),
        }));
    }

    // ── loss ──────────────────────────────────────────────────────────────

    #[test]
    fn lost_context_drops_objects_and_ignores_calls() {
        let gl = HeadlessBackend::new();
        let _ = linked(&gl);
        gl.create_texture().unwrap();
        assert!(gl.live_objects() > 0);

        gl.lose_context();
        assert!(gl.is_context_lost());
        assert_eq!(gl.live_objects(), 0);
        assert!(gl.create_buffer().is_none());

        gl.clear_calls();
        gl.draw_arrays(Primitive::Triangles, 0, 3);
        assert!(gl.calls().is_empty());

        gl.restore_context();
        assert!(!gl.is_context_lost());
        assert!(gl.create_buffer().is_some());
    }
}

use std::num::NonZeroU32;

// ── handles ───────────────────────────────────────────────────────────────

/// GL buffer object name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BufferId(pub NonZeroU32);

/// GL shader object name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ShaderId(pub NonZeroU32);

/// GL program object name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct ProgramId(pub NonZeroU32);

/// GL texture object name.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct TextureId(pub NonZeroU32);

/// Uniform location inside a linked program.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct UniformLocation(pub u32);

// ── state enums ───────────────────────────────────────────────────────────

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferTarget {
    Array,
    ElementArray,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BufferUsage {
    Static,
    Dynamic,
    Stream,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Capability {
    Blend,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum BlendFactor {
    Zero,
    One,
    SrcColor,
    OneMinusSrcColor,
    SrcAlpha,
    OneMinusSrcAlpha,
    DstColor,
    OneMinusDstColor,
    DstAlpha,
    OneMinusDstAlpha,
}

/// Texture minification/magnification filter.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFilter {
    Nearest,
    Linear,
    /// Alias of `MipMapLinearLinear`.
    MipMap,
    MipMapNearestNearest,
    MipMapLinearNearest,
    MipMapNearestLinear,
    MipMapLinearLinear,
}

impl TextureFilter {
    /// Returns `true` when the filter samples from mip levels.
    #[inline]
    pub fn uses_mipmaps(self) -> bool {
        !matches!(self, TextureFilter::Nearest | TextureFilter::Linear)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureWrap {
    MirroredRepeat,
    ClampToEdge,
    Repeat,
}

/// Uniform payload.
///
/// Matrices are column-major.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum UniformValue<'a> {
    I32(i32),
    F32(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Mat2(&'a [f32; 4]),
    Mat3(&'a [f32; 9]),
    Mat4(&'a [f32; 16]),
}

// ── backend ───────────────────────────────────────────────────────────────

/// Legacy-GL subset issued by the renderer.
///
/// Implementations:
/// - [`GlowBackend`](super::GlowBackend): real driver through `glow`
/// - [`HeadlessBackend`](super::HeadlessBackend): no GPU; records calls
///
/// Methods mirror their GL namesakes and never fail loudly. Creation calls return `None`
/// when the driver refuses (typically because the context is lost). Status queries
/// (`compile_shader`, `link_program`) return the driver's status flag.
///
/// All calls assume a single render thread with the context current.
pub trait GlBackend {
    /// Returns `true` if the driver reports the context as lost.
    fn is_context_lost(&self) -> bool {
        false
    }

    // buffers
    fn create_buffer(&self) -> Option<BufferId>;
    fn delete_buffer(&self, buffer: BufferId);
    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>);
    /// Replaces the store of the buffer bound to `target` with `data`.
    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage);

    // shaders + programs
    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId>;
    /// Sets the source and compiles. Returns the compile status.
    fn compile_shader(&self, shader: ShaderId, source: &str) -> bool;
    fn shader_info_log(&self, shader: ShaderId) -> String;
    fn delete_shader(&self, shader: ShaderId);

    fn create_program(&self) -> Option<ProgramId>;
    /// Attaches both stages and links. Returns the link status.
    fn link_program(&self, program: ProgramId, vertex: ShaderId, fragment: ShaderId) -> bool;
    fn program_info_log(&self, program: ProgramId) -> String;
    fn delete_program(&self, program: ProgramId);
    fn use_program(&self, program: Option<ProgramId>);

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32>;
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;
    fn uniform(&self, location: UniformLocation, value: UniformValue<'_>);

    // vertex layout
    fn enable_vertex_attrib_array(&self, index: u32);
    fn disable_vertex_attrib_array(&self, index: u32);
    /// Float attribute; `stride` and `offset` are in bytes.
    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32);

    // draws
    fn draw_arrays(&self, primitive: Primitive, first: i32, count: i32);
    /// Indexed draw from the bound element buffer (`u16` indices, `offset` in bytes).
    fn draw_elements_u16(&self, primitive: Primitive, count: i32, offset: i32);

    // fixed-function state
    fn enable(&self, capability: Capability);
    fn disable(&self, capability: Capability);
    fn blend_func_separate(
        &self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    );
    fn viewport(&self, x: i32, y: i32, width: i32, height: i32);
    /// Clears the color buffer to straight RGBA `color`.
    fn clear(&self, color: [f32; 4]);

    // textures (2D only)
    fn create_texture(&self) -> Option<TextureId>;
    fn delete_texture(&self, texture: TextureId);
    /// Selects texture unit `unit` (0-based).
    fn active_texture(&self, unit: u32);
    fn bind_texture_2d(&self, texture: Option<TextureId>);
    /// Uploads tightly packed RGBA8 pixels to level 0 of the bound texture.
    fn tex_image_2d_rgba8(&self, width: u32, height: u32, pixels: &[u8]);
    fn tex_filters(&self, min: TextureFilter, mag: TextureFilter);
    fn tex_wraps(&self, s: TextureWrap, t: TextureWrap);
    fn generate_mipmap_2d(&self);
}

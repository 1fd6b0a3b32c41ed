use glow::HasContext;

use super::backend::{
    BlendFactor, BufferId, BufferTarget, BufferUsage, Capability, GlBackend, Primitive, ProgramId,
    ShaderId, ShaderStage, TextureFilter, TextureId, TextureWrap, UniformLocation, UniformValue,
};

/// [`GlBackend`] over a `glow` context.
///
/// The GL context must stay current on the calling thread for the lifetime of this value.
/// On GL 3.0+ (desktop or ES) a single vertex array object is created and left bound,
/// so the legacy attribute calls issued by `Mesh` are valid under core profiles.
pub struct GlowBackend {
    gl: glow::Context,
    vao: Option<glow::VertexArray>,
}

impl GlowBackend {
    /// Wraps a loaded `glow` context.
    pub fn new(gl: glow::Context) -> Self {
        let version = gl.version();
        let needs_vao = version.major >= 3;
        log::info!(
            "GL {}.{}{} ({})",
            version.major,
            version.minor,
            if version.is_embedded { " ES" } else { "" },
            version.vendor_info
        );

        let vao = if needs_vao {
            // Safety: context is current per the constructor contract.
            unsafe {
                match gl.create_vertex_array() {
                    Ok(vao) => {
                        gl.bind_vertex_array(Some(vao));
                        Some(vao)
                    }
                    Err(e) => {
                        log::warn!("couldn't create vertex array object: {e}");
                        None
                    }
                }
            }
        } else {
            None
        };

        Self { gl, vao }
    }

    /// Returns the wrapped context for calls outside the renderer's subset.
    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }
}

impl Drop for GlowBackend {
    fn drop(&mut self) {
        if let Some(vao) = self.vao.take() {
            unsafe { self.gl.delete_vertex_array(vao) };
        }
    }
}

// ── enum mapping ──────────────────────────────────────────────────────────

fn buffer_target(target: BufferTarget) -> u32 {
    match target {
        BufferTarget::Array => glow::ARRAY_BUFFER,
        BufferTarget::ElementArray => glow::ELEMENT_ARRAY_BUFFER,
    }
}

fn buffer_usage(usage: BufferUsage) -> u32 {
    match usage {
        BufferUsage::Static => glow::STATIC_DRAW,
        BufferUsage::Dynamic => glow::DYNAMIC_DRAW,
        BufferUsage::Stream => glow::STREAM_DRAW,
    }
}

fn shader_stage(stage: ShaderStage) -> u32 {
    match stage {
        ShaderStage::Vertex => glow::VERTEX_SHADER,
        ShaderStage::Fragment => glow::FRAGMENT_SHADER,
    }
}

fn primitive(p: Primitive) -> u32 {
    match p {
        Primitive::Points => glow::POINTS,
        Primitive::Lines => glow::LINES,
        Primitive::LineStrip => glow::LINE_STRIP,
        Primitive::Triangles => glow::TRIANGLES,
        Primitive::TriangleStrip => glow::TRIANGLE_STRIP,
        Primitive::TriangleFan => glow::TRIANGLE_FAN,
    }
}

fn capability(c: Capability) -> u32 {
    match c {
        Capability::Blend => glow::BLEND,
    }
}

fn blend_factor(f: BlendFactor) -> u32 {
    match f {
        BlendFactor::Zero => glow::ZERO,
        BlendFactor::One => glow::ONE,
        BlendFactor::SrcColor => glow::SRC_COLOR,
        BlendFactor::OneMinusSrcColor => glow::ONE_MINUS_SRC_COLOR,
        BlendFactor::SrcAlpha => glow::SRC_ALPHA,
        BlendFactor::OneMinusSrcAlpha => glow::ONE_MINUS_SRC_ALPHA,
        BlendFactor::DstColor => glow::DST_COLOR,
        BlendFactor::OneMinusDstColor => glow::ONE_MINUS_DST_COLOR,
        BlendFactor::DstAlpha => glow::DST_ALPHA,
        BlendFactor::OneMinusDstAlpha => glow::ONE_MINUS_DST_ALPHA,
    }
}

fn texture_filter(f: TextureFilter) -> i32 {
    let v = match f {
        TextureFilter::Nearest => glow::NEAREST,
        TextureFilter::Linear => glow::LINEAR,
        TextureFilter::MipMap | TextureFilter::MipMapLinearLinear => glow::LINEAR_MIPMAP_LINEAR,
        TextureFilter::MipMapNearestNearest => glow::NEAREST_MIPMAP_NEAREST,
        TextureFilter::MipMapLinearNearest => glow::LINEAR_MIPMAP_NEAREST,
        TextureFilter::MipMapNearestLinear => glow::NEAREST_MIPMAP_LINEAR,
    };
    v as i32
}

fn texture_wrap(w: TextureWrap) -> i32 {
    let v = match w {
        TextureWrap::MirroredRepeat => glow::MIRRORED_REPEAT,
        TextureWrap::ClampToEdge => glow::CLAMP_TO_EDGE,
        TextureWrap::Repeat => glow::REPEAT,
    };
    v as i32
}

#[inline]
fn native_uniform(location: UniformLocation) -> glow::NativeUniformLocation {
    glow::NativeUniformLocation(location.0)
}

// ── GlBackend ─────────────────────────────────────────────────────────────

// Safety (all blocks below): the context is current on this thread and every handle passed
// in was produced by this backend.
impl GlBackend for GlowBackend {
    fn create_buffer(&self) -> Option<BufferId> {
        unsafe { self.gl.create_buffer() }.ok().map(|b| BufferId(b.0))
    }

    fn delete_buffer(&self, buffer: BufferId) {
        unsafe { self.gl.delete_buffer(glow::NativeBuffer(buffer.0)) }
    }

    fn bind_buffer(&self, target: BufferTarget, buffer: Option<BufferId>) {
        unsafe {
            self.gl
                .bind_buffer(buffer_target(target), buffer.map(|b| glow::NativeBuffer(b.0)))
        }
    }

    fn buffer_data(&self, target: BufferTarget, data: &[u8], usage: BufferUsage) {
        unsafe {
            self.gl
                .buffer_data_u8_slice(buffer_target(target), data, buffer_usage(usage))
        }
    }

    fn create_shader(&self, stage: ShaderStage) -> Option<ShaderId> {
        unsafe { self.gl.create_shader(shader_stage(stage)) }
            .ok()
            .map(|s| ShaderId(s.0))
    }

    fn compile_shader(&self, shader: ShaderId, source: &str) -> bool {
        let shader = glow::NativeShader(shader.0);
        unsafe {
            self.gl.shader_source(shader, source);
            self.gl.compile_shader(shader);
            self.gl.get_shader_compile_status(shader)
        }
    }

    fn shader_info_log(&self, shader: ShaderId) -> String {
        unsafe { self.gl.get_shader_info_log(glow::NativeShader(shader.0)) }
    }

    fn delete_shader(&self, shader: ShaderId) {
        unsafe { self.gl.delete_shader(glow::NativeShader(shader.0)) }
    }

    fn create_program(&self) -> Option<ProgramId> {
        unsafe { self.gl.create_program() }.ok().map(|p| ProgramId(p.0))
    }

    fn link_program(&self, program: ProgramId, vertex: ShaderId, fragment: ShaderId) -> bool {
        let program = glow::NativeProgram(program.0);
        unsafe {
            self.gl.attach_shader(program, glow::NativeShader(vertex.0));
            self.gl.attach_shader(program, glow::NativeShader(fragment.0));
            self.gl.link_program(program);
            self.gl.get_program_link_status(program)
        }
    }

    fn program_info_log(&self, program: ProgramId) -> String {
        unsafe { self.gl.get_program_info_log(glow::NativeProgram(program.0)) }
    }

    fn delete_program(&self, program: ProgramId) {
        unsafe { self.gl.delete_program(glow::NativeProgram(program.0)) }
    }

    fn use_program(&self, program: Option<ProgramId>) {
        unsafe { self.gl.use_program(program.map(|p| glow::NativeProgram(p.0))) }
    }

    fn attrib_location(&self, program: ProgramId, name: &str) -> Option<u32> {
        unsafe { self.gl.get_attrib_location(glow::NativeProgram(program.0), name) }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        unsafe { self.gl.get_uniform_location(glow::NativeProgram(program.0), name) }
            .map(|l| UniformLocation(l.0))
    }

    fn uniform(&self, location: UniformLocation, value: UniformValue<'_>) {
        let loc = native_uniform(location);
        let loc = Some(&loc);
        unsafe {
            match value {
                UniformValue::I32(v) => self.gl.uniform_1_i32(loc, v),
                UniformValue::F32(v) => self.gl.uniform_1_f32(loc, v),
                UniformValue::Vec2([x, y]) => self.gl.uniform_2_f32(loc, x, y),
                UniformValue::Vec3([x, y, z]) => self.gl.uniform_3_f32(loc, x, y, z),
                UniformValue::Vec4([x, y, z, w]) => self.gl.uniform_4_f32(loc, x, y, z, w),
                UniformValue::Mat2(m) => self.gl.uniform_matrix_2_f32_slice(loc, false, m),
                UniformValue::Mat3(m) => self.gl.uniform_matrix_3_f32_slice(loc, false, m),
                UniformValue::Mat4(m) => self.gl.uniform_matrix_4_f32_slice(loc, false, m),
            }
        }
    }

    fn enable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.enable_vertex_attrib_array(index) }
    }

    fn disable_vertex_attrib_array(&self, index: u32) {
        unsafe { self.gl.disable_vertex_attrib_array(index) }
    }

    fn vertex_attrib_pointer_f32(&self, index: u32, size: i32, stride: i32, offset: i32) {
        unsafe {
            self.gl
                .vertex_attrib_pointer_f32(index, size, glow::FLOAT, false, stride, offset)
        }
    }

    fn draw_arrays(&self, p: Primitive, first: i32, count: i32) {
        unsafe { self.gl.draw_arrays(primitive(p), first, count) }
    }

    fn draw_elements_u16(&self, p: Primitive, count: i32, offset: i32) {
        unsafe {
            self.gl
                .draw_elements(primitive(p), count, glow::UNSIGNED_SHORT, offset)
        }
    }

    fn enable(&self, c: Capability) {
        unsafe { self.gl.enable(capability(c)) }
    }

    fn disable(&self, c: Capability) {
        unsafe { self.gl.disable(capability(c)) }
    }

    fn blend_func_separate(
        &self,
        src_color: BlendFactor,
        dst_color: BlendFactor,
        src_alpha: BlendFactor,
        dst_alpha: BlendFactor,
    ) {
        unsafe {
            self.gl.blend_func_separate(
                blend_factor(src_color),
                blend_factor(dst_color),
                blend_factor(src_alpha),
                blend_factor(dst_alpha),
            )
        }
    }

    fn viewport(&self, x: i32, y: i32, width: i32, height: i32) {
        unsafe { self.gl.viewport(x, y, width, height) }
    }

    fn clear(&self, [r, g, b, a]: [f32; 4]) {
        unsafe {
            self.gl.clear_color(r, g, b, a);
            self.gl.clear(glow::COLOR_BUFFER_BIT);
        }
    }

    fn create_texture(&self) -> Option<TextureId> {
        unsafe { self.gl.create_texture() }.ok().map(|t| TextureId(t.0))
    }

    fn delete_texture(&self, texture: TextureId) {
        unsafe { self.gl.delete_texture(glow::NativeTexture(texture.0)) }
    }

    fn active_texture(&self, unit: u32) {
        unsafe { self.gl.active_texture(glow::TEXTURE0 + unit) }
    }

    fn bind_texture_2d(&self, texture: Option<TextureId>) {
        unsafe {
            self.gl
                .bind_texture(glow::TEXTURE_2D, texture.map(|t| glow::NativeTexture(t.0)))
        }
    }

    fn tex_image_2d_rgba8(&self, width: u32, height: u32, pixels: &[u8]) {
        unsafe {
            self.gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            self.gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                width as i32,
                height as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                glow::PixelUnpackData::Slice(Some(pixels)),
            );
        }
    }

    fn tex_filters(&self, min: TextureFilter, mag: TextureFilter) {
        unsafe {
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MIN_FILTER, texture_filter(min));
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_MAG_FILTER, texture_filter(mag));
        }
    }

    fn tex_wraps(&self, s: TextureWrap, t: TextureWrap) {
        unsafe {
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_S, texture_wrap(s));
            self.gl
                .tex_parameter_i32(glow::TEXTURE_2D, glow::TEXTURE_WRAP_T, texture_wrap(t));
        }
    }

    fn generate_mipmap_2d(&self) {
        unsafe { self.gl.generate_mipmap(glow::TEXTURE_2D) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mipmap_filters_map_to_mipmap_enums() {
        assert_eq!(texture_filter(TextureFilter::MipMap), glow::LINEAR_MIPMAP_LINEAR as i32);
        assert_eq!(texture_filter(TextureFilter::Linear), glow::LINEAR as i32);
        assert_eq!(
            texture_filter(TextureFilter::MipMapNearestLinear),
            glow::NEAREST_MIPMAP_LINEAR as i32
        );
    }

    #[test]
    fn blend_factors_map_one_to_one() {
        assert_eq!(blend_factor(BlendFactor::OneMinusSrcAlpha), glow::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend_factor(BlendFactor::DstColor), glow::DST_COLOR);
        assert_eq!(primitive(Primitive::Lines), glow::LINES);
    }
}

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::device::{
    GlBackend, ManagedContext, ProgramId, Restorable, RestorableId, ShaderId, ShaderStage,
    UniformLocation, UniformValue,
};
use crate::error::{RenderError, Result};

/// Linked program objects. `None` until compiled.
#[derive(Debug, Copy, Clone)]
struct Linked {
    vs: ShaderId,
    fs: ShaderId,
    program: ProgramId,
}

/// State shared with the restoration registry.
struct ProgramState {
    vertex_source: String,
    fragment_source: String,
    linked: Cell<Option<Linked>>,
    uniforms: RefCell<HashMap<String, UniformLocation>>,
    attributes: RefCell<HashMap<String, u32>>,
}

impl ProgramState {
    fn rebuild(&self, gl: &dyn GlBackend) -> Result<()> {
        self.uniforms.borrow_mut().clear();
        self.attributes.borrow_mut().clear();
        let linked = compile(gl, &self.vertex_source, &self.fragment_source)?;
        self.linked.set(Some(linked));
        Ok(())
    }
}

impl Restorable for ProgramState {
    fn label(&self) -> &'static str {
        "ShaderProgram"
    }

    fn restore(&self, gl: &dyn GlBackend) -> Result<()> {
        // Handles from before the loss are dead; drop them without deleting.
        self.linked.set(None);
        self.rebuild(gl)
    }
}

/// Fixed uniform scratch, reused across matrix uploads.
#[derive(Default)]
struct Scratch {
    mat2: [f32; 4],
    mat3: [f32; 9],
    mat4: [f32; 16],
}

/// Vertex + fragment program with cached locations.
///
/// Construction compiles and links immediately. On failure every partially created object
/// is deleted and the error is returned, unless the context is lost: then the program is
/// kept uncompiled and built on restore.
pub struct ShaderProgram {
    ctx: Rc<ManagedContext>,
    state: Rc<ProgramState>,
    registration: Cell<Option<RestorableId>>,
    scratch: RefCell<Scratch>,
}

impl ShaderProgram {
    pub const MVP_MATRIX: &'static str = "u_projTrans";
    pub const POSITION: &'static str = "a_position";
    pub const COLOR: &'static str = "a_color";
    pub const COLOR2: &'static str = "a_color2";
    pub const TEXCOORDS: &'static str = "a_texCoords";
    pub const SAMPLER: &'static str = "u_texture";

    pub fn new(
        ctx: &Rc<ManagedContext>,
        vertex_source: impl Into<String>,
        fragment_source: impl Into<String>,
    ) -> Result<Self> {
        let state = Rc::new(ProgramState {
            vertex_source: vertex_source.into(),
            fragment_source: fragment_source.into(),
            linked: Cell::new(None),
            uniforms: RefCell::new(HashMap::new()),
            attributes: RefCell::new(HashMap::new()),
        });

        if let Err(e) = state.rebuild(ctx.gl()) {
            if !ctx.is_lost() {
                return Err(e);
            }
            log::warn!("ShaderProgram: context lost during compile; deferred to restore ({e})");
        }

        let weak: Weak<dyn Restorable> = Rc::downgrade(&state) as Weak<dyn Restorable>;
        let registration = ctx.add_restorable(weak);

        Ok(Self {
            ctx: ctx.clone(),
            state,
            registration: Cell::new(Some(registration)),
            scratch: RefCell::new(Scratch::default()),
        })
    }

    #[inline]
    pub fn is_compiled(&self) -> bool {
        self.state.linked.get().is_some()
    }

    #[inline]
    pub fn program(&self) -> Option<ProgramId> {
        self.state.linked.get().map(|l| l.program)
    }

    #[inline]
    pub fn vertex_source(&self) -> &str {
        &self.state.vertex_source
    }

    #[inline]
    pub fn fragment_source(&self) -> &str {
        &self.state.fragment_source
    }

    pub fn bind(&self) -> Result<()> {
        match self.program() {
            Some(program) => {
                self.ctx.gl().use_program(Some(program));
                Ok(())
            }
            None if self.ctx.is_lost() => Ok(()),
            None => Err(RenderError::NotCompiled),
        }
    }

    pub fn unbind(&self) {
        self.ctx.gl().use_program(None);
    }

    // ── locations ─────────────────────────────────────────────────────────

    /// Location of `name`, cached per program.
    ///
    /// `Ok(None)` while the context is lost; uploads through it are skipped.
    pub fn uniform_location(&self, name: &str) -> Result<Option<UniformLocation>> {
        if let Some(location) = self.state.uniforms.borrow().get(name) {
            return Ok(Some(*location));
        }
        if self.ctx.is_lost() {
            return Ok(None);
        }
        let program = self.program().ok_or(RenderError::NotCompiled)?;
        let location = self
            .ctx
            .gl()
            .uniform_location(program, name)
            .ok_or_else(|| RenderError::LocationNotFound(name.to_owned()))?;
        self.state
            .uniforms
            .borrow_mut()
            .insert(name.to_owned(), location);
        Ok(Some(location))
    }

    /// Location of attribute `name`, or `None` if the program does not expose it.
    pub fn attribute_location(&self, name: &str) -> Option<u32> {
        if let Some(location) = self.state.attributes.borrow().get(name) {
            return Some(*location);
        }
        let program = self.program()?;
        let location = self.ctx.gl().attrib_location(program, name)?;
        self.state
            .attributes
            .borrow_mut()
            .insert(name.to_owned(), location);
        Some(location)
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    fn upload(&self, name: &str, value: UniformValue<'_>) -> Result<()> {
        if let Some(location) = self.uniform_location(name)? {
            self.ctx.gl().uniform(location, value);
        }
        Ok(())
    }

    pub fn set_uniform_i(&self, name: &str, value: i32) -> Result<()> {
        self.upload(name, UniformValue::I32(value))
    }

    pub fn set_uniform_f(&self, name: &str, value: f32) -> Result<()> {
        self.upload(name, UniformValue::F32(value))
    }

    pub fn set_uniform_2f(&self, name: &str, x: f32, y: f32) -> Result<()> {
        self.upload(name, UniformValue::Vec2([x, y]))
    }

    pub fn set_uniform_3f(&self, name: &str, x: f32, y: f32, z: f32) -> Result<()> {
        self.upload(name, UniformValue::Vec3([x, y, z]))
    }

    pub fn set_uniform_4f(&self, name: &str, x: f32, y: f32, z: f32, w: f32) -> Result<()> {
        self.upload(name, UniformValue::Vec4([x, y, z, w]))
    }

    /// Column-major 2×2 matrix.
    pub fn set_uniform_2x2f(&self, name: &str, value: &[f32]) -> Result<()> {
        let mut scratch = self.scratch.borrow_mut();
        copy_matrix(name, &mut scratch.mat2, value)?;
        self.upload(name, UniformValue::Mat2(&scratch.mat2))
    }

    /// Column-major 3×3 matrix.
    pub fn set_uniform_3x3f(&self, name: &str, value: &[f32]) -> Result<()> {
        let mut scratch = self.scratch.borrow_mut();
        copy_matrix(name, &mut scratch.mat3, value)?;
        self.upload(name, UniformValue::Mat3(&scratch.mat3))
    }

    /// Column-major 4×4 matrix.
    pub fn set_uniform_4x4f(&self, name: &str, value: &[f32]) -> Result<()> {
        let mut scratch = self.scratch.borrow_mut();
        copy_matrix(name, &mut scratch.mat4, value)?;
        self.upload(name, UniformValue::Mat4(&scratch.mat4))
    }

    // ── lifetime ──────────────────────────────────────────────────────────

    /// Deregisters and deletes the shader objects and program. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(id) = self.registration.take() {
            self.ctx.remove_restorable(id);
        }
        if let Some(linked) = self.state.linked.take() {
            let gl = self.ctx.gl();
            gl.delete_shader(linked.vs);
            gl.delete_shader(linked.fs);
            gl.delete_program(linked.program);
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.registration.get().is_none()
    }

    // ── built-in programs ─────────────────────────────────────────────────

    /// Vertex color only (`a_position`, `a_color`).
    pub fn colored(ctx: &Rc<ManagedContext>) -> Result<Self> {
        Self::new(ctx, COLORED_VS, COLORED_FS)
    }

    /// Vertex color times texture (`a_position`, `a_color`, `a_texCoords`).
    pub fn colored_textured(ctx: &Rc<ManagedContext>) -> Result<Self> {
        Self::new(ctx, COLORED_TEXTURED_VS, COLORED_TEXTURED_FS)
    }

    /// Light/dark two-color tint (`a_position`, `a_color`, `a_color2`, `a_texCoords`).
    pub fn two_colored_textured(ctx: &Rc<ManagedContext>) -> Result<Self> {
        Self::new(ctx, TWO_COLORED_TEXTURED_VS, TWO_COLORED_TEXTURED_FS)
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn copy_matrix<const N: usize>(name: &str, dst: &mut [f32; N], value: &[f32]) -> Result<()> {
    if value.len() != N {
        return Err(RenderError::UniformSize {
            name: name.to_owned(),
            expected: N,
            actual: value.len(),
        });
    }
    dst.copy_from_slice(value);
    Ok(())
}

fn compile_stage(gl: &dyn GlBackend, stage: ShaderStage, source: &str) -> Result<ShaderId> {
    let shader = gl
        .create_shader(stage)
        .ok_or(RenderError::ResourceCreation("shader"))?;
    if !gl.compile_shader(shader, source) {
        let log = gl.shader_info_log(shader);
        gl.delete_shader(shader);
        return Err(RenderError::ShaderCompile { stage, log });
    }
    Ok(shader)
}

/// Compiles both stages and links. Nothing is left alive on failure.
fn compile(gl: &dyn GlBackend, vertex_source: &str, fragment_source: &str) -> Result<Linked> {
    let vs = compile_stage(gl, ShaderStage::Vertex, vertex_source)?;
    let fs = match compile_stage(gl, ShaderStage::Fragment, fragment_source) {
        Ok(fs) => fs,
        Err(e) => {
            gl.delete_shader(vs);
            return Err(e);
        }
    };

    let Some(program) = gl.create_program() else {
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        return Err(RenderError::ResourceCreation("program"));
    };
    if !gl.link_program(program, vs, fs) {
        let log = gl.program_info_log(program);
        gl.delete_program(program);
        gl.delete_shader(vs);
        gl.delete_shader(fs);
        return Err(RenderError::ShaderLink { log });
    }

    Ok(Linked { vs, fs, program })
}

// ── GLSL ──────────────────────────────────────────────────────────────────

const COLORED_VS: &str = r#"
attribute vec4 a_position;
attribute vec4 a_color;
uniform mat4 u_projTrans;
varying vec4 v_color;

void main () {
    v_color = a_color;
    gl_Position = u_projTrans * a_position;
}
"#;

const COLORED_FS: &str = r#"
#ifdef GL_ES
    #define LOWP lowp
    precision mediump float;
#else
    #define LOWP
#endif
varying LOWP vec4 v_color;

void main () {
    gl_FragColor = v_color;
}
"#;

const COLORED_TEXTURED_VS: &str = r#"
attribute vec4 a_position;
attribute vec4 a_color;
attribute vec2 a_texCoords;
uniform mat4 u_projTrans;
varying vec4 v_color;
varying vec2 v_texCoords;

void main () {
    v_color = a_color;
    v_texCoords = a_texCoords;
    gl_Position = u_projTrans * a_position;
}
"#;

const COLORED_TEXTURED_FS: &str = r#"
#ifdef GL_ES
    #define LOWP lowp
    precision mediump float;
#else
    #define LOWP
#endif
varying LOWP vec4 v_color;
varying vec2 v_texCoords;
uniform sampler2D u_texture;

void main () {
    gl_FragColor = v_color * texture2D(u_texture, v_texCoords);
}
"#;

const TWO_COLORED_TEXTURED_VS: &str = r#"
attribute vec4 a_position;
attribute vec4 a_color;
attribute vec4 a_color2;
attribute vec2 a_texCoords;
uniform mat4 u_projTrans;
varying vec4 v_light;
varying vec4 v_dark;
varying vec2 v_texCoords;

void main () {
    v_light = a_color;
    v_dark = a_color2;
    v_texCoords = a_texCoords;
    gl_Position = u_projTrans * a_position;
}
"#;

const TWO_COLORED_TEXTURED_FS: &str = r#"
#ifdef GL_ES
    #define LOWP lowp
    precision mediump float;
#else
    #define LOWP
#endif
varying LOWP vec4 v_light;
varying LOWP vec4 v_dark;
varying vec2 v_texCoords;
uniform sampler2D u_texture;

void main () {
    vec4 texColor = texture2D(u_texture, v_texCoords);
    gl_FragColor.a = texColor.a * v_light.a;
    gl_FragColor.rgb = ((texColor.a - 1.0) * v_dark.a + 1.0 - texColor.rgb) * v_dark.rgb + texColor.rgb * v_light.rgb;
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{GlCall, HeadlessBackend, UniformData};

    fn setup() -> (HeadlessBackend, Rc<ManagedContext>) {
        let gl = HeadlessBackend::new();
        let ctx = ManagedContext::new(gl.clone());
        (gl, ctx)
    }

    // ── compile ───────────────────────────────────────────────────────────

    #[test]
    fn builtins_compile_and_expose_locations() {
        let (_gl, ctx) = setup();
        let shader = ShaderProgram::two_colored_textured(&ctx).unwrap();
        assert!(shader.is_compiled());
        assert_eq!(shader.attribute_location(ShaderProgram::POSITION), Some(0));
        assert_eq!(shader.attribute_location(ShaderProgram::COLOR2), Some(2));
        assert_eq!(shader.attribute_location(ShaderProgram::TEXCOORDS), Some(3));
        assert!(shader.uniform_location(ShaderProgram::MVP_MATRIX).unwrap().is_some());
        assert!(shader.uniform_location(ShaderProgram::SAMPLER).unwrap().is_some());
    }

    #[test]
    fn compile_failure_leaves_nothing_alive() {
        let (gl, ctx) = setup();
        let err = ShaderProgram::new(&ctx, COLORED_VS, "#error broken\nvoid main () {}")
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::ShaderCompile { stage: ShaderStage::Fragment, .. }));
        assert_eq!(gl.live_objects(), 0);
        assert_eq!(ctx.restorable_count(), 0);
    }

    #[test]
    fn link_failure_leaves_nothing_alive() {
        let (gl, ctx) = setup();
        let err = ShaderProgram::new(&ctx, "attribute vec4 a_position;", COLORED_FS)
            .err()
            .unwrap();
        assert!(matches!(err, RenderError::ShaderLink { .. }));
        assert_eq!(gl.live_objects(), 0);
    }

    #[test]
    fn compile_while_lost_is_deferred() {
        let (gl, ctx) = setup();
        gl.lose_context();
        let shader = ShaderProgram::colored(&ctx).unwrap();
        assert!(!shader.is_compiled());
        assert!(shader.bind().is_ok());
        assert_eq!(shader.uniform_location(ShaderProgram::MVP_MATRIX), Ok(None));

        gl.restore_context();
        assert!(ctx.mark_restored().is_ok());
        assert!(shader.is_compiled());
    }

    // ── uniforms ──────────────────────────────────────────────────────────

    #[test]
    fn missing_uniform_is_an_error() {
        let (_gl, ctx) = setup();
        let shader = ShaderProgram::colored(&ctx).unwrap();
        assert_eq!(
            shader.set_uniform_f("u_missing", 1.0),
            Err(RenderError::LocationNotFound("u_missing".into()))
        );
    }

    #[test]
    fn matrix_uploads_check_length() {
        let (gl, ctx) = setup();
        let shader = ShaderProgram::colored(&ctx).unwrap();
        shader.bind().unwrap();

        let identity: Vec<f32> = glam::Mat4::IDENTITY.to_cols_array().to_vec();
        shader.set_uniform_4x4f(ShaderProgram::MVP_MATRIX, &identity).unwrap();
        assert!(gl.calls().contains(&GlCall::Uniform {
            name: "u_projTrans".into(),
            data: UniformData::Floats(identity.clone()),
        }));

        assert_eq!(
            shader.set_uniform_4x4f(ShaderProgram::MVP_MATRIX, &identity[..9]),
            Err(RenderError::UniformSize { name: "u_projTrans".into(), expected: 16, actual: 9 })
        );
    }

    #[test]
    fn locations_are_cached() {
        let (gl, ctx) = setup();
        let shader = ShaderProgram::colored(&ctx).unwrap();
        let first = shader.uniform_location(ShaderProgram::MVP_MATRIX).unwrap();
        gl.lose_context();
        gl.restore_context();
        // Backend forgot the program, but the cache still answers.
        assert_eq!(shader.uniform_location(ShaderProgram::MVP_MATRIX).unwrap(), first);
    }

    // ── loss / lifetime ───────────────────────────────────────────────────

    #[test]
    fn restore_recompiles_and_clears_caches() {
        let (gl, ctx) = setup();
        let shader = ShaderProgram::colored(&ctx).unwrap();
        let before = shader.program();
        shader.uniform_location(ShaderProgram::MVP_MATRIX).unwrap();

        gl.lose_context();
        ctx.mark_lost();
        gl.restore_context();
        assert!(ctx.mark_restored().is_ok());

        assert_ne!(shader.program(), before);
        assert_eq!(gl.live_programs(), 1);
        assert!(shader.uniform_location(ShaderProgram::MVP_MATRIX).unwrap().is_some());
    }

    #[test]
    fn dispose_is_idempotent() {
        let (gl, ctx) = setup();
        let shader = ShaderProgram::colored(&ctx).unwrap();
        assert_eq!(gl.live_objects(), 3);
        shader.dispose();
        shader.dispose();
        drop(shader);
        assert_eq!(gl.live_objects(), 0);
        assert_eq!(gl.invalid_deletes(), 0);
        assert_eq!(ctx.restorable_count(), 0);
    }
}

use std::cell::Cell;
use std::rc::{Rc, Weak};

use image::{DynamicImage, RgbaImage};

use crate::device::{
    GlBackend, ManagedContext, Restorable, RestorableId, TextureFilter, TextureId, TextureWrap,
};
use crate::error::{RenderError, Result};

impl TextureFilter {
    /// Parses atlas filter names (`Nearest`, `Linear`, `MipMap`, `MipMapNearestNearest`, ...).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "Nearest" => TextureFilter::Nearest,
            "Linear" => TextureFilter::Linear,
            "MipMap" => TextureFilter::MipMap,
            "MipMapNearestNearest" => TextureFilter::MipMapNearestNearest,
            "MipMapLinearNearest" => TextureFilter::MipMapLinearNearest,
            "MipMapNearestLinear" => TextureFilter::MipMapNearestLinear,
            "MipMapLinearLinear" => TextureFilter::MipMapLinearLinear,
            _ => return None,
        })
    }
}

impl TextureWrap {
    /// Parses atlas wrap names (`MirroredRepeat`, `ClampToEdge`, `Repeat`).
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "MirroredRepeat" => TextureWrap::MirroredRepeat,
            "ClampToEdge" => TextureWrap::ClampToEdge,
            "Repeat" => TextureWrap::Repeat,
            _ => return None,
        })
    }
}

struct TextureState {
    image: RgbaImage,
    use_mipmaps: bool,
    handle: Cell<Option<TextureId>>,
}

impl TextureState {
    /// Creates the texture object and uploads the retained image with default sampling.
    fn upload(&self, gl: &dyn GlBackend) -> Result<()> {
        let handle = gl
            .create_texture()
            .ok_or(RenderError::ResourceCreation("texture"))?;
        self.handle.set(Some(handle));

        gl.bind_texture_2d(Some(handle));
        gl.tex_image_2d_rgba8(self.image.width(), self.image.height(), self.image.as_raw());
        let min = if self.use_mipmaps {
            TextureFilter::MipMapLinearLinear
        } else {
            TextureFilter::Linear
        };
        gl.tex_filters(min, TextureFilter::Linear);
        gl.tex_wraps(TextureWrap::ClampToEdge, TextureWrap::ClampToEdge);
        if self.use_mipmaps {
            gl.generate_mipmap_2d();
        }
        Ok(())
    }
}

impl Restorable for TextureState {
    fn label(&self) -> &'static str {
        "GpuTexture"
    }

    fn restore(&self, gl: &dyn GlBackend) -> Result<()> {
        self.handle.set(None);
        self.upload(gl)
    }
}

/// 2D texture backed by a retained RGBA image.
///
/// The image stays on the CPU so the texture can be re-created after a context loss.
/// Restores use the default sampling (linear, clamp-to-edge); callers that changed filters
/// or wraps re-apply them afterwards.
pub struct GpuTexture {
    ctx: Rc<ManagedContext>,
    state: Rc<TextureState>,
    key: RestorableId,
    registration: Cell<Option<RestorableId>>,
    bound_unit: Cell<u32>,
}

impl GpuTexture {
    pub fn new(ctx: &Rc<ManagedContext>, image: RgbaImage, use_mipmaps: bool) -> Result<Self> {
        let state = Rc::new(TextureState {
            image,
            use_mipmaps,
            handle: Cell::new(None),
        });

        if let Err(e) = state.upload(ctx.gl()) {
            if !ctx.is_lost() {
                return Err(e);
            }
            log::debug!("GpuTexture: context lost; upload deferred to restore");
        }

        let weak: Weak<dyn Restorable> = Rc::downgrade(&state) as Weak<dyn Restorable>;
        let key = ctx.add_restorable(weak);

        Ok(Self {
            ctx: ctx.clone(),
            state,
            key,
            registration: Cell::new(Some(key)),
            bound_unit: Cell::new(0),
        })
    }

    /// Converts any decoded image to RGBA8 first.
    pub fn from_dynamic_image(
        ctx: &Rc<ManagedContext>,
        image: DynamicImage,
        use_mipmaps: bool,
    ) -> Result<Self> {
        Self::new(ctx, image.into_rgba8(), use_mipmaps)
    }

    /// Identity for batch keys. Stable for the texture's lifetime, unique per context.
    #[inline]
    pub fn key(&self) -> RestorableId {
        self.key
    }

    #[inline]
    pub fn handle(&self) -> Option<TextureId> {
        self.state.handle.get()
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.state.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.state.image.height()
    }

    #[inline]
    pub fn image(&self) -> &RgbaImage {
        &self.state.image
    }

    #[inline]
    pub fn uses_mipmaps(&self) -> bool {
        self.state.use_mipmaps
    }

    pub fn bind(&self, unit: u32) {
        self.bound_unit.set(unit);
        let gl = self.ctx.gl();
        gl.active_texture(unit);
        gl.bind_texture_2d(self.handle());
    }

    /// Unbinds from the unit used by the last [`GpuTexture::bind`].
    pub fn unbind(&self) {
        let gl = self.ctx.gl();
        gl.active_texture(self.bound_unit.get());
        gl.bind_texture_2d(None);
    }

    pub fn set_filters(&self, min: TextureFilter, mag: TextureFilter) {
        let gl = self.ctx.gl();
        gl.bind_texture_2d(self.handle());
        gl.tex_filters(min, mag);
    }

    pub fn set_wraps(&self, u: TextureWrap, v: TextureWrap) {
        let gl = self.ctx.gl();
        gl.bind_texture_2d(self.handle());
        gl.tex_wraps(u, v);
    }

    /// Deregisters and deletes the texture. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(id) = self.registration.take() {
            self.ctx.remove_restorable(id);
        }
        if let Some(handle) = self.state.handle.take() {
            self.ctx.gl().delete_texture(handle);
        }
    }
}

impl Drop for GpuTexture {
    fn drop(&mut self) {
        self.dispose();
    }
}

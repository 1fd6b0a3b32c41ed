use crate::error::{RenderError, Result};
use crate::paint::{BlendMode, Color};

use super::polygon_batcher::PolygonBatcher;
use super::texture::GpuTexture;

/// One textured attachment, already posed by the skeletal evaluator.
#[derive(Clone, Copy)]
pub struct SkinnedElement<'a> {
    /// World positions, `[x0, y0, x1, y1, ...]`.
    pub vertices: &'a [f32],
    /// Texture coordinates, one pair per vertex.
    pub uvs: &'a [f32],
    /// Triangle list over this element's vertices.
    pub indices: &'a [u16],
    pub texture: &'a GpuTexture,
    pub blend_mode: BlendMode,
    /// Combined skeleton × slot × attachment tint, straight alpha.
    pub color: Color,
    /// Dark tint for two-color rendering. `None` means black.
    pub dark_color: Option<Color>,
}

impl SkinnedElement<'_> {
    /// Two triangles over a region's four corners.
    pub const QUAD_TRIANGLES: [u16; 6] = [0, 1, 2, 2, 3, 0];
}

/// Feeds posed skeleton attachments into a [`PolygonBatcher`].
///
/// Writes the batcher's vertex layout (with or without the dark color, whichever the
/// batcher was built for), switches blend state whenever the slot blend mode changes, and
/// premultiplies tints when `premultiplied_alpha` is set.
#[derive(Debug, Default)]
pub struct SkeletonRenderer {
    pub premultiplied_alpha: bool,
    scratch: Vec<f32>,
}

impl SkeletonRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws `elements` in order. The batcher must be drawing.
    pub fn draw<'e, 't: 'e>(
        &mut self,
        batcher: &mut PolygonBatcher,
        elements: impl IntoIterator<Item = &'e SkinnedElement<'t>>,
    ) -> Result<()> {
        let pma = self.premultiplied_alpha;
        let stride = batcher.vertex_size();
        let two_color = stride == 12;
        let mut blend_mode: Option<BlendMode> = None;

        for element in elements {
            if element.vertices.len() != element.uvs.len() {
                return Err(RenderError::InvalidGeometry("skinned element uvs do not match vertices"));
            }

            if blend_mode != Some(element.blend_mode) {
                blend_mode = Some(element.blend_mode);
                batcher.set_blend_mode(element.blend_mode.factors(pma))?;
            }

            let light = if pma {
                element.color.premultiplied()
            } else {
                element.color
            };
            let dark = element.dark_color.unwrap_or(Color::BLACK);

            let count = element.vertices.len() / 2;
            self.scratch.clear();
            self.scratch.reserve(count * stride);
            for i in 0..count {
                let (x, y) = (element.vertices[i * 2], element.vertices[i * 2 + 1]);
                let (u, v) = (element.uvs[i * 2], element.uvs[i * 2 + 1]);
                self.scratch
                    .extend_from_slice(&[x, y, light.r, light.g, light.b, light.a, u, v]);
                if two_color {
                    self.scratch.extend_from_slice(&[dark.r, dark.g, dark.b, 1.0]);
                }
            }

            batcher.draw(element.texture, &self.scratch, element.indices)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{BlendFactor, GlCall, HeadlessBackend, ManagedContext};
    use crate::render::polygon_batcher::BatcherConfig;
    use crate::render::shader::ShaderProgram;
    use image::RgbaImage;
    use std::rc::Rc;

    const QUAD_XY: [f32; 8] = [0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0];
    const QUAD_UV: [f32; 8] = [0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0];

    fn setup(two_color_tint: bool) -> (HeadlessBackend, Rc<ManagedContext>, PolygonBatcher, Rc<ShaderProgram>) {
        let gl = HeadlessBackend::new();
        let ctx = ManagedContext::new(gl.clone());
        let shader = Rc::new(if two_color_tint {
            ShaderProgram::two_colored_textured(&ctx).unwrap()
        } else {
            ShaderProgram::colored_textured(&ctx).unwrap()
        });
        let batcher = PolygonBatcher::new(
            &ctx,
            BatcherConfig { max_vertices: 64, two_color_tint },
        )
        .unwrap();
        (gl, ctx, batcher, shader)
    }

    fn element<'a>(texture: &'a GpuTexture, blend_mode: BlendMode, color: Color) -> SkinnedElement<'a> {
        SkinnedElement {
            vertices: &QUAD_XY,
            uvs: &QUAD_UV,
            indices: &SkinnedElement::QUAD_TRIANGLES,
            texture,
            blend_mode,
            color,
            dark_color: None,
        }
    }

    #[test]
    fn writes_premultiplied_interleaved_vertices() {
        let (gl, ctx, mut batcher, shader) = setup(false);
        let texture = GpuTexture::new(&ctx, RgbaImage::new(1, 1), false).unwrap();
        let mut renderer = SkeletonRenderer::new();
        renderer.premultiplied_alpha = true;

        batcher.begin(&shader).unwrap();
        let e = element(&texture, BlendMode::Normal, Color::new(1.0, 0.5, 0.0, 0.5));
        renderer.draw(&mut batcher, [&e]).unwrap();
        batcher.end().unwrap();

        let v = gl.last_vertices();
        assert_eq!(v.len(), 32);
        assert_eq!(&v[0..8], &[0.0, 0.0, 0.5, 0.25, 0.0, 0.5, 0.0, 1.0]);
        assert_eq!(&v[24..32], &[0.0, 1.0, 0.5, 0.25, 0.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn dark_color_written_for_two_color_batchers() {
        let (gl, ctx, mut batcher, shader) = setup(true);
        let texture = GpuTexture::new(&ctx, RgbaImage::new(1, 1), false).unwrap();
        let mut renderer = SkeletonRenderer::new();

        batcher.begin(&shader).unwrap();
        let mut e = element(&texture, BlendMode::Normal, Color::WHITE);
        e.dark_color = Some(Color::new(0.25, 0.5, 0.75, 0.1));
        renderer.draw(&mut batcher, [&e]).unwrap();
        batcher.end().unwrap();

        let v = gl.last_vertices();
        assert_eq!(v.len(), 48);
        assert_eq!(&v[8..12], &[0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn blend_mode_changes_switch_factors() {
        let (gl, ctx, mut batcher, shader) = setup(false);
        let texture = GpuTexture::new(&ctx, RgbaImage::new(1, 1), false).unwrap();
        let mut renderer = SkeletonRenderer::new();

        let normal = element(&texture, BlendMode::Normal, Color::WHITE);
        let additive = element(&texture, BlendMode::Additive, Color::WHITE);

        batcher.begin(&shader).unwrap();
        gl.clear_calls();
        renderer.draw(&mut batcher, [&normal, &normal, &additive]).unwrap();
        batcher.end().unwrap();

        assert_eq!(gl.draw_calls().len(), 2);
        assert!(gl.calls().contains(&GlCall::BlendFunc {
            src_color: BlendFactor::SrcAlpha,
            dst_color: BlendFactor::One,
            src_alpha: BlendFactor::One,
            dst_alpha: BlendFactor::One,
        }));
    }

    #[test]
    fn mismatched_uvs_are_rejected() {
        let (_gl, ctx, mut batcher, shader) = setup(false);
        let texture = GpuTexture::new(&ctx, RgbaImage::new(1, 1), false).unwrap();
        let mut e = element(&texture, BlendMode::Normal, Color::WHITE);
        e.uvs = &QUAD_UV[..6];
        batcher.begin(&shader).unwrap();
        assert!(matches!(
            SkeletonRenderer::new().draw(&mut batcher, [&e]),
            Err(RenderError::InvalidGeometry(_))
        ));
    }
}

use std::path::Path;
use std::rc::Rc;

use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use tessel_engine::coords::Vec2;
use tessel_engine::device::ManagedContext;
use tessel_engine::paint::{BlendMode, Color};
use tessel_engine::render::{
    DebugBone, DebugBoundingBox, DebugMesh, DebugPath, DebugSkeleton, GpuTexture, SceneRenderer,
    SkinnedElement,
};

const RIBBON_SEGMENTS: usize = 32;
const ARM_BONES: usize = 3;
const ARM_BONE_LENGTH: f32 = 70.0;

/// Animated content exercising every drawer of the scene renderer.
pub struct Demo {
    checker: GpuTexture,
    gradient: GpuTexture,
    picture: Option<GpuTexture>,

    time: f32,
    ribbon_vertices: Vec<f32>,
    ribbon_uvs: Vec<f32>,
    ribbon_indices: Vec<u16>,
    arm: DebugSkeleton,
}

impl Demo {
    pub fn new(ctx: &Rc<ManagedContext>, image: Option<&Path>) -> Result<Self> {
        let checker = GpuTexture::new(ctx, checker_image(64, 8), false)
            .context("failed to create checker texture")?;
        let gradient = GpuTexture::new(ctx, gradient_image(64), true)
            .context("failed to create gradient texture")?;

        let picture = image
            .map(|path| -> Result<GpuTexture> {
                let decoded = image::open(path)
                    .with_context(|| format!("failed to load {}", path.display()))?;
                log::info!(
                    "loaded {} ({}x{})",
                    path.display(),
                    decoded.width(),
                    decoded.height()
                );
                Ok(GpuTexture::from_dynamic_image(ctx, decoded, true)?)
            })
            .transpose()?;

        let mut demo = Self {
            checker,
            gradient,
            picture,
            time: 0.0,
            ribbon_vertices: Vec::new(),
            ribbon_uvs: ribbon_uvs(),
            ribbon_indices: ribbon_indices(),
            arm: DebugSkeleton::default(),
        };
        demo.update(0.0);
        Ok(demo)
    }

    pub fn update(&mut self, dt: f32) {
        self.time += dt;
        self.pose_ribbon();
        self.pose_arm();
    }

    pub fn draw(&self, scene: &mut SceneRenderer) -> tessel_engine::Result<()> {
        let t = self.time;

        // Alternating textures: one flush per switch.
        for row in 0..3 {
            for col in 0..8 {
                let texture = if (row + col) % 2 == 0 { &self.checker } else { &self.gradient };
                let tint = Color::new(1.0, 1.0 - row as f32 * 0.2, 1.0, 1.0);
                let (x, y) = (400.0 + col as f32 * 66.0, 20.0 + row as f32 * 66.0);
                scene.draw_texture(texture, x, y, 64.0, 64.0, Some(tint))?;
            }
        }

        scene.draw_texture_rotated(
            &self.checker,
            720.0,
            300.0,
            128.0,
            128.0,
            64.0,
            64.0,
            t * 45.0,
            None,
        )?;
        scene.draw_texture_uv(&self.gradient, 560.0, 300.0, 128.0, 128.0, 0.25, 0.75, 0.75, 0.25, None)?;

        if let Some(picture) = &self.picture {
            let scale = 200.0 / picture.width().max(picture.height()) as f32;
            scene.draw_texture(
                picture,
                400.0,
                320.0,
                picture.width() as f32 * scale,
                picture.height() as f32 * scale,
                None,
            )?;
        }

        let ribbon = |blend_mode, color| SkinnedElement {
            vertices: &self.ribbon_vertices,
            uvs: &self.ribbon_uvs,
            indices: &self.ribbon_indices,
            texture: &self.checker,
            blend_mode,
            color,
            dark_color: Some(Color::new(0.1, 0.0, 0.2, 1.0)),
        };
        let elements = [
            ribbon(BlendMode::Normal, Color::WHITE),
            ribbon(BlendMode::Additive, Color::new(0.2, 0.4, 1.0, 0.35 + 0.25 * t.sin())),
        ];
        scene.draw_skeleton(&elements)?;

        let pulse = 30.0 + 10.0 * (t * 2.0).sin();
        scene.circle(false, Vec2::new(880.0, 480.0), pulse, Some(Color::GREEN), 0)?;
        scene.circle(true, Vec2::new(880.0, 480.0), 8.0, Some(Color::WHITE), 16)?;
        scene.rect(false, 390.0, 10.0, 8.0 * 66.0 + 18.0, 3.0 * 66.0 + 18.0, Some(Color::LIGHT_GRAY))?;
        scene.curve(
            Vec2::new(20.0, 500.0),
            Vec2::new(120.0, 540.0 + 40.0 * t.cos()),
            Vec2::new(220.0, 440.0),
            Vec2::new(320.0, 500.0),
            24,
            Some(Color::BLUE),
        )?;
        scene.polygon(&star(Vec2::new(880.0, 380.0), 40.0, 16.0, t), Some(Color::RED))?;
        scene.rect_line(true, Vec2::new(20.0, 420.0), Vec2::new(320.0, 400.0), 4.0, Some(Color::WHITE))?;

        scene.draw_skeleton_debug(&self.arm, &[])?;
        Ok(())
    }

    /// Wavy strip along x, two vertices per column.
    fn pose_ribbon(&mut self) {
        let t = self.time;
        self.ribbon_vertices.clear();
        for i in 0..=RIBBON_SEGMENTS {
            let f = i as f32 / RIBBON_SEGMENTS as f32;
            let x = 40.0 + f * 300.0;
            let y = 260.0 + 30.0 * (f * 6.0 + t * 3.0).sin();
            self.ribbon_vertices.extend_from_slice(&[x, y - 20.0, x, y + 20.0]);
        }
    }

    /// Three-bone swinging arm with a region per bone.
    fn pose_arm(&mut self) {
        let t = self.time;
        let position = Vec2::new(180.0, 40.0);
        let mut skeleton = DebugSkeleton {
            position,
            bones: vec![DebugBone {
                name: "root".into(),
                origin: position,
                tip: position,
                is_root: true,
            }],
            ..Default::default()
        };

        let mut origin = position;
        let mut angle = 90.0f32;
        let mut outline = Vec::new();
        for i in 0..ARM_BONES {
            angle += 25.0 * (t * 1.5 + i as f32).sin();
            let (sin, cos) = angle.to_radians().sin_cos();
            let tip = origin + Vec2::new(cos, sin) * ARM_BONE_LENGTH;

            let side = Vec2::new(cos, sin).perp() * 10.0;
            let [a, b, c, d] = [origin - side, tip - side, tip + side, origin + side];
            skeleton
                .regions
                .push([a.x, a.y, b.x, b.y, c.x, c.y, d.x, d.y]);
            outline.extend([tip.x, tip.y]);

            skeleton.bones.push(DebugBone {
                name: format!("arm{i}"),
                origin,
                tip,
                is_root: false,
            });
            origin = tip;
        }

        outline.extend([position.x + 30.0, position.y, position.x - 30.0, position.y]);
        skeleton.bounding_boxes.push(DebugBoundingBox {
            polygon: outline,
            color: Color::new(1.0, 1.0, 0.0, 0.6),
        });

        let hand = origin;
        skeleton.meshes.push(DebugMesh {
            vertices: vec![
                hand.x - 12.0, hand.y,
                hand.x, hand.y - 12.0,
                hand.x + 12.0, hand.y,
                hand.x, hand.y + 12.0,
            ],
            triangles: vec![0, 1, 2, 2, 3, 0],
            hull_vertices: 4,
        });

        skeleton.paths.push(DebugPath {
            world: vec![
                60.0, 60.0, 80.0, 40.0, 100.0, 20.0,
                140.0, 20.0, 160.0, 40.0 + 20.0 * t.sin(), 180.0, 60.0,
            ],
            closed: false,
        });

        self.arm = skeleton;
    }
}

fn checker_image(size: u32, cell: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        if (x / cell + y / cell) % 2 == 0 {
            Rgba([235, 235, 240, 255])
        } else {
            Rgba([60, 64, 80, 255])
        }
    })
}

fn gradient_image(size: u32) -> RgbaImage {
    let scale = 255.0 / (size - 1).max(1) as f32;
    RgbaImage::from_fn(size, size, |x, y| {
        Rgba([(x as f32 * scale) as u8, (y as f32 * scale) as u8, 200, 255])
    })
}

fn ribbon_uvs() -> Vec<f32> {
    (0..=RIBBON_SEGMENTS)
        .flat_map(|i| {
            let u = i as f32 / RIBBON_SEGMENTS as f32;
            [u, 1.0, u, 0.0]
        })
        .collect()
}

fn ribbon_indices() -> Vec<u16> {
    (0..RIBBON_SEGMENTS as u16)
        .flat_map(|i| {
            let (a, b, c, d) = (i * 2, i * 2 + 1, i * 2 + 3, i * 2 + 2);
            [a, b, c, c, d, a]
        })
        .collect()
}

fn star(center: Vec2, outer: f32, inner: f32, spin: f32) -> Vec<f32> {
    (0..10)
        .flat_map(|i| {
            let radius = if i % 2 == 0 { outer } else { inner };
            let (sin, cos) = (spin + i as f32 * std::f32::consts::PI / 5.0).sin_cos();
            [center.x + cos * radius, center.y + sin * radius]
        })
        .collect()
}

use crate::coords::Vec2;
use crate::error::Result;
use crate::paint::{BlendFactors, Color};

use super::shape_batcher::ShapeBatcher;

/// Bone in world space.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugBone {
    pub name: String,
    pub origin: Vec2,
    /// `origin + length * (a, c)` of the bone's world transform.
    pub tip: Vec2,
    pub is_root: bool,
}

/// Mesh attachment in world space.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugMesh {
    /// `[x0, y0, x1, y1, ...]`.
    pub vertices: Vec<f32>,
    pub triangles: Vec<u16>,
    /// The first `hull_vertices` vertices form the outline.
    pub hull_vertices: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugBoundingBox {
    /// `[x0, y0, x1, y1, ...]`.
    pub polygon: Vec<f32>,
    pub color: Color,
}

/// Path attachment in world space.
///
/// Layout is `[c0, p0, c1, c2, p1, c3, c4, p2, ...]` as point pairs: each anchor sits
/// between its two controls. A closed path wraps from the last anchor back to the first.
#[derive(Debug, Clone, PartialEq)]
pub struct DebugPath {
    pub world: Vec<f32>,
    pub closed: bool,
}

/// Posed skeleton snapshot supplied by the skeletal evaluator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DebugSkeleton {
    pub position: Vec2,
    pub bones: Vec<DebugBone>,
    /// Region attachments as four world corners `[x1, y1, ..., x4, y4]`.
    pub regions: Vec<[f32; 8]>,
    pub meshes: Vec<DebugMesh>,
    pub bounding_boxes: Vec<DebugBoundingBox>,
    pub paths: Vec<DebugPath>,
}

impl DebugSkeleton {
    /// Axis-aligned bounds over every bounding box polygon, as `(min, max)`.
    pub fn bounding_box_aabb(&self) -> Option<(Vec2, Vec2)> {
        let mut points = self
            .bounding_boxes
            .iter()
            .flat_map(|b| b.polygon.chunks_exact(2))
            .map(|p| Vec2::new(p[0], p[1]));
        let first = points.next()?;
        Some(points.fold((first, first), |(min, max), p| {
            (
                Vec2::new(min.x.min(p.x), min.y.min(p.y)),
                Vec2::new(max.x.max(p.x), max.y.max(p.y)),
            )
        }))
    }
}

/// Draws skeleton diagnostics through a [`ShapeBatcher`].
///
/// Order: bone lines, skeleton origin marker, region outlines, mesh triangles and hulls,
/// bounding boxes, paths, then bone origins on top.
#[derive(Debug, Clone)]
pub struct SkeletonDebugRenderer {
    pub bone_line_color: Color,
    pub bone_origin_color: Color,
    pub attachment_line_color: Color,
    pub triangle_line_color: Color,
    pub path_color: Color,
    pub aabb_color: Color,

    pub draw_bones: bool,
    pub draw_region_attachments: bool,
    pub draw_bounding_boxes: bool,
    pub draw_mesh_hull: bool,
    pub draw_mesh_triangles: bool,
    pub draw_paths: bool,
    pub draw_skeleton_xy: bool,

    pub premultiplied_alpha: bool,
    pub scale: f32,
    pub bone_width: f32,
}

impl Default for SkeletonDebugRenderer {
    fn default() -> Self {
        Self {
            bone_line_color: Color::RED,
            bone_origin_color: Color::GREEN,
            attachment_line_color: Color::new(0.0, 0.0, 1.0, 0.5),
            triangle_line_color: Color::new(1.0, 0.64, 0.0, 0.5),
            path_color: Color::new(1.0, 127.0 / 255.0, 0.0, 1.0),
            aabb_color: Color::new(0.0, 1.0, 0.0, 0.5),
            draw_bones: true,
            draw_region_attachments: true,
            draw_bounding_boxes: true,
            draw_mesh_hull: true,
            draw_mesh_triangles: true,
            draw_paths: true,
            draw_skeleton_xy: false,
            premultiplied_alpha: false,
            scale: 1.0,
            bone_width: 2.0,
        }
    }
}

const PATH_SEGMENTS: usize = 32;
const BONE_ORIGIN_SEGMENTS: usize = 8;

impl SkeletonDebugRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draws `skeleton`, skipping bones named in `ignored_bones`. The batcher must be drawing.
    pub fn draw(
        &self,
        shapes: &mut ShapeBatcher,
        skeleton: &DebugSkeleton,
        ignored_bones: &[&str],
    ) -> Result<()> {
        shapes.set_blend_mode(BlendFactors::over(self.premultiplied_alpha))?;
        let ignored = |bone: &DebugBone| ignored_bones.contains(&bone.name.as_str());

        if self.draw_bones {
            let width = self.bone_width * self.scale;
            for bone in skeleton.bones.iter().filter(|b| !b.is_root && !ignored(b)) {
                shapes.rect_line(true, bone.origin, bone.tip, width, Some(self.bone_line_color))?;
            }
            if self.draw_skeleton_xy {
                shapes.x(skeleton.position, 4.0 * self.scale, Some(self.bone_line_color))?;
            }
        }

        if self.draw_region_attachments {
            let color = Some(self.attachment_line_color);
            for corners in &skeleton.regions {
                let p = |i: usize| Vec2::new(corners[i * 2], corners[i * 2 + 1]);
                for i in 0..4 {
                    shapes.line(p(i), p((i + 1) % 4), color)?;
                }
            }
        }

        if self.draw_mesh_hull || self.draw_mesh_triangles {
            for mesh in &skeleton.meshes {
                self.draw_mesh(shapes, mesh)?;
            }
        }

        if self.draw_bounding_boxes {
            if let Some((min, max)) = skeleton.bounding_box_aabb() {
                shapes.rect(false, min.x, min.y, max.x - min.x, max.y - min.y, Some(self.aabb_color))?;
            }
            for bounding_box in &skeleton.bounding_boxes {
                if bounding_box.polygon.len() >= 6 {
                    shapes.polygon(&bounding_box.polygon, Some(bounding_box.color))?;
                }
            }
        }

        if self.draw_paths {
            for path in &skeleton.paths {
                self.draw_path(shapes, path)?;
            }
        }

        if self.draw_bones {
            let radius = 3.0 * self.scale;
            for bone in skeleton.bones.iter().filter(|b| !ignored(b)) {
                shapes.circle(
                    true,
                    bone.origin,
                    radius,
                    Some(self.bone_origin_color),
                    BONE_ORIGIN_SEGMENTS,
                )?;
            }
        }
        Ok(())
    }

    fn draw_mesh(&self, shapes: &mut ShapeBatcher, mesh: &DebugMesh) -> Result<()> {
        let vertex = |i: usize| Vec2::new(mesh.vertices[i * 2], mesh.vertices[i * 2 + 1]);
        let count = mesh.vertices.len() / 2;

        if self.draw_mesh_triangles {
            let color = Some(self.triangle_line_color);
            for tri in mesh.triangles.chunks_exact(3) {
                let [a, b, c] = [tri[0], tri[1], tri[2]].map(usize::from);
                if a.max(b).max(c) >= count {
                    continue;
                }
                shapes.triangle(false, vertex(a), vertex(b), vertex(c), color)?;
            }
        }

        let hull = mesh.hull_vertices.min(count);
        if self.draw_mesh_hull && hull > 0 {
            let color = Some(self.attachment_line_color);
            let mut last = vertex(hull - 1);
            for i in 0..hull {
                let p = vertex(i);
                shapes.line(p, last, color)?;
                last = p;
            }
        }
        Ok(())
    }

    fn draw_path(&self, shapes: &mut ShapeBatcher, path: &DebugPath) -> Result<()> {
        let world = &path.world;
        let n = world.len();
        if n < 4 {
            return Ok(());
        }
        let point = |i: usize| Vec2::new(world[i], world[i + 1]);
        let path_color = Some(self.path_color);
        let handle_color = Some(Color::LIGHT_GRAY);

        let mut p1 = point(2);
        if path.closed && n >= 6 {
            let (c1, c2, p2) = (point(0), point(n - 2), point(n - 4));
            shapes.curve(p1, c1, c2, p2, PATH_SEGMENTS, path_color)?;
            shapes.line(p1, c1, handle_color)?;
            shapes.line(p2, c2, handle_color)?;
        }

        let end = n - 4;
        let mut i = 4;
        while i < end && i + 5 < n {
            let (c1, c2, p2) = (point(i), point(i + 2), point(i + 4));
            shapes.curve(p1, c1, c2, p2, PATH_SEGMENTS, path_color)?;
            shapes.line(p1, c1, handle_color)?;
            shapes.line(p2, c2, handle_color)?;
            p1 = p2;
            i += 6;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{GlCall, HeadlessBackend, ManagedContext, Primitive};
    use crate::render::shader::ShaderProgram;
    use crate::render::shape_batcher::ShapeBatcherConfig;
    use std::rc::Rc;

    fn run(renderer: &SkeletonDebugRenderer, skeleton: &DebugSkeleton, ignored: &[&str]) -> Vec<(Primitive, i32)> {
        let gl = HeadlessBackend::new();
        let ctx = ManagedContext::new(gl.clone());
        let shader = Rc::new(ShaderProgram::colored(&ctx).unwrap());
        let mut shapes = ShapeBatcher::new(&ctx, ShapeBatcherConfig::default()).unwrap();

        gl.clear_calls();
        shapes.begin(&shader).unwrap();
        renderer.draw(&mut shapes, skeleton, ignored).unwrap();
        shapes.end().unwrap();

        gl.draw_calls()
            .iter()
            .filter_map(|c| match c {
                GlCall::DrawArrays { primitive, count, .. } => Some((*primitive, *count)),
                _ => None,
            })
            .collect()
    }

    fn bone(name: &str, origin: Vec2, tip: Vec2, is_root: bool) -> DebugBone {
        DebugBone { name: name.into(), origin, tip, is_root }
    }

    fn two_bones() -> DebugSkeleton {
        DebugSkeleton {
            bones: vec![
                bone("root", Vec2::zero(), Vec2::zero(), true),
                bone("arm", Vec2::zero(), Vec2::new(10.0, 0.0), false),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn bones_draw_lines_then_origins() {
        let draws = run(&SkeletonDebugRenderer::new(), &two_bones(), &[]);
        // One thick segment for the child bone, then an 8-segment disc per bone.
        assert_eq!(draws, vec![(Primitive::Triangles, 6 + 2 * 24)]);
    }

    #[test]
    fn ignored_bones_are_skipped() {
        let draws = run(&SkeletonDebugRenderer::new(), &two_bones(), &["arm", "root"]);
        assert!(draws.is_empty());
    }

    #[test]
    fn regions_and_bounding_boxes_are_outlined() {
        let skeleton = DebugSkeleton {
            regions: vec![[0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0]],
            bounding_boxes: vec![DebugBoundingBox {
                polygon: vec![0.0, 0.0, 4.0, 0.0, 2.0, 3.0],
                color: Color::GREEN,
            }],
            ..Default::default()
        };
        let draws = run(&SkeletonDebugRenderer::new(), &skeleton, &[]);
        // Region (8) + aabb rect (8) + triangle polygon (6).
        assert_eq!(draws, vec![(Primitive::Lines, 22)]);
        assert_eq!(
            skeleton.bounding_box_aabb(),
            Some((Vec2::new(0.0, 0.0), Vec2::new(4.0, 3.0)))
        );
    }

    #[test]
    fn mesh_triangles_and_hull() {
        let skeleton = DebugSkeleton {
            meshes: vec![DebugMesh {
                vertices: vec![0.0, 0.0, 1.0, 0.0, 1.0, 1.0, 0.0, 1.0],
                triangles: vec![0, 1, 2, 2, 3, 0],
                hull_vertices: 4,
            }],
            ..Default::default()
        };
        let draws = run(&SkeletonDebugRenderer::new(), &skeleton, &[]);
        assert_eq!(draws, vec![(Primitive::Lines, 2 * 6 + 4 * 2)]);

        let hull_only = SkeletonDebugRenderer { draw_mesh_triangles: false, ..Default::default() };
        assert_eq!(run(&hull_only, &skeleton, &[]), vec![(Primitive::Lines, 8)]);
    }

    #[test]
    fn open_path_draws_one_curve_per_span() {
        // c0, p0, c1, c2, p1, c3
        let skeleton = DebugSkeleton {
            paths: vec![DebugPath {
                world: vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0, 2.0, 1.0, 3.0, 0.0, 4.0, 0.0],
                closed: false,
            }],
            ..Default::default()
        };
        let draws = run(&SkeletonDebugRenderer::new(), &skeleton, &[]);
        // One curve (66) plus two handles (4).
        assert_eq!(draws, vec![(Primitive::Lines, 70)]);

        let closed = DebugSkeleton {
            paths: vec![DebugPath { closed: true, ..skeleton.paths[0].clone() }],
            ..Default::default()
        };
        assert_eq!(run(&SkeletonDebugRenderer::new(), &closed, &[]), vec![(Primitive::Lines, 140)]);
    }
}

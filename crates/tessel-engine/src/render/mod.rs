//! Batching renderers.
//!
//! Renderers accumulate geometry on the CPU and submit it through the
//! [`GlBackend`](crate::device::GlBackend) of a [`ManagedContext`](crate::device::ManagedContext).
//! Every GPU-owning type here registers with that context and is restored after a context loss.
//!
//! Convention:
//! - geometry is in world units (bottom-left origin, +Y up)
//! - the camera's projection × view matrix is uploaded as `u_projTrans`

pub mod camera;
pub mod mesh;
pub mod polygon_batcher;
pub mod scene;
pub mod shader;
pub mod shape_batcher;
pub mod skeleton;
pub mod skeleton_debug;
pub mod texture;

pub use camera::OrthoCamera;
pub use mesh::{AttributePolicy, Mesh, VertexAttribute};
pub use polygon_batcher::{BatcherConfig, PolygonBatcher, MAX_BATCH_VERTICES};
pub use scene::{ActiveRenderer, ResizeMode, SceneConfig, SceneRenderer, TextureRegion};
pub use shader::ShaderProgram;
pub use shape_batcher::{ShapeBatcher, ShapeBatcherConfig, ShapeType};
pub use skeleton::{SkeletonRenderer, SkinnedElement};
pub use skeleton_debug::{
    DebugBone, DebugBoundingBox, DebugMesh, DebugPath, DebugSkeleton, SkeletonDebugRenderer,
};
pub use texture::GpuTexture;

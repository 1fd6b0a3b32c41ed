//! Graphics device layer.
//!
//! This module is responsible for:
//! - the [`GlBackend`] seam over a legacy-GL style API
//! - the `glow` implementation used on real hardware
//! - the headless implementation used by tests and tooling
//! - [`ManagedContext`]: backend ownership plus the context-loss restoration registry

mod backend;
mod context;
mod glow_backend;
mod headless;

pub use backend::{
    BlendFactor, BufferId, BufferTarget, BufferUsage, Capability, GlBackend, Primitive, ProgramId,
    ShaderId, ShaderStage, TextureFilter, TextureId, TextureWrap, UniformLocation, UniformValue,
};
pub use context::{ManagedContext, Restorable, RestorableId, RestoreReport};
pub use glow_backend::GlowBackend;
pub use headless::{GlCall, HeadlessBackend, UniformData};

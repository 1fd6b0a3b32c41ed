//! Tessel engine crate.
//!
//! Immediate-mode 2D batching over a legacy-GL style context that can be lost and restored.
//! Higher layers (the studio binary, skeletal runtimes) build on [`render::SceneRenderer`].

pub mod coords;
pub mod device;
pub mod error;
pub mod logging;
pub mod paint;
pub mod render;

pub use error::{RenderError, Result};

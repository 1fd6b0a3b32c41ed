//! Coordinate and geometry types shared across the camera and renderers.
//!
//! World space:
//! - world units (one unit per pixel at zoom 1)
//! - origin bottom-left
//! - +X right, +Y up
//!
//! The camera converts to clip space through the `u_projTrans` uniform.

mod vec2;
mod viewport;

pub use vec2::Vec2;
pub use viewport::Viewport;

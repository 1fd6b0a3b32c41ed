//! Paint model shared by the batchers and skeleton drawers.
//!
//! Scope:
//! - color representation (straight alpha; premultiplied on demand)
//! - blend modes and their GL factor table
//!
//! Geometry types remain in `coords`.

pub mod blend;
pub mod color;

pub use blend::{BlendFactors, BlendMode};
pub use color::Color;

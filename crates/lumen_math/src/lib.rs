//! Lumen math types.
//!
//! Everything here works in double precision: the tracer compares squared
//! distances and classifies box faces against [`EPS`], which is too tight
//! for `f32` on scenes a few units across.

// Re-export the double-precision glam types under the names the rest of the
// workspace uses.
pub use glam::{DQuat as Quat, DVec3 as Vec3};

mod aabb;
mod color;
mod interval;
mod ray;

pub use aabb::Aabb;
pub use color::Color;
pub use interval::Interval;
pub use ray::Ray;

/// Tolerance used for self-intersection avoidance and boundary classification.
///
/// Intersections with `t <= EPS` are rejected, which keeps shadow and
/// reflection rays leaving a surface from hitting that same surface.
pub const EPS: f64 = 1e-6;

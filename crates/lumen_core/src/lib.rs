//! Lumen Core - scene model for the progressive ray tracer.
//!
//! This crate provides:
//!
//! - **Geometry**: `Shape` (sphere, plane, axis-aligned box) and `HitInfo`
//! - **Shading inputs**: `Material`, `Light`
//! - **Viewing**: `Camera` with incremental rotate/move/zoom
//! - **Scene**: shapes partitioned into boundable and unboundable sets
//! - **Scene files**: JSON scene descriptions
//!
//! # Example
//!
//! ```
//! use lumen_core::{Camera, Material, Scene, Shape};
//! use lumen_math::{Color, Vec3};
//!
//! let mut scene = Scene::new(64, 48, 2);
//! scene.set_camera(Camera::new(Vec3::new(0.0, -5.0, 1.0), Vec3::Y, 60.0));
//! scene.add_shape(Shape::plane(Vec3::ZERO, Vec3::Z, Material::default()));
//! scene.add_shape(Shape::sphere(Vec3::new(0.0, 0.0, 1.0), 1.0, Material::new(Color::WHITE)));
//! scene.add_light(Vec3::new(2.0, -2.0, 4.0), Color::WHITE);
//!
//! assert_eq!(scene.bounded_shapes().len(), 1);
//! assert_eq!(scene.unbounded_shapes().len(), 1);
//! ```

pub mod camera;
pub mod description;
pub mod material;
pub mod scene;
pub mod shape;

// Re-export commonly used types
pub use camera::Camera;
pub use description::{
    grid_steps, load_scene, SceneDescription, SceneError, SceneResult, MAX_GRID_SHAPES,
};
pub use material::Material;
pub use scene::{Light, Scene};
pub use shape::{Cuboid, HitInfo, Plane, Shape, Sphere};

//! Lumen Renderer - progressive multithreaded ray tracing.
//!
//! A Whitted-style tracer (ambient, diffuse, Phong-style specular, hard
//! shadows and mirror reflection) that refines an image one sample per pixel
//! per pass:
//!
//! - [`Bvh`] indexes the scene's bounded shapes
//! - [`Tracer`] queues one job per image row on a [`ThreadPool`]
//! - [`Pixels`] accumulates running means per pixel, one lock per row
//! - [`ProgressiveRender`] ties them together with a front buffer and
//!   camera controls that restart accumulation
//!
//! # Example
//!
//! ```no_run
//! use lumen_core::{Camera, Material, Scene, Shape};
//! use lumen_math::{Color, Vec3};
//! use lumen_renderer::{ProgressiveRender, RenderConfig};
//!
//! let mut scene = Scene::new(320, 240, 4);
//! scene.set_camera(Camera::new(Vec3::new(0.0, -5.0, 1.0), Vec3::Y, 60.0));
//! scene.add_shape(Shape::plane(Vec3::ZERO, Vec3::Z, Material::default()));
//! scene.add_shape(Shape::sphere(Vec3::new(0.0, 0.0, 1.0), 1.0, Material::default()));
//! scene.add_light(Vec3::new(2.0, -2.0, 4.0), Color::WHITE);
//!
//! let mut render = ProgressiveRender::new(scene, &RenderConfig::default())?;
//! render.render_passes(16);
//! render.save("output.ppm")?;
//! # Ok::<(), lumen_renderer::RenderError>(())
//! ```

mod bvh;
mod config;
mod error;
pub mod output;
mod pixels;
pub mod pool;
mod progressive;
pub mod sampler;
pub mod tracer;

pub use bvh::{Bvh, BvhNode};
pub use config::{RenderConfig, DEFAULT_LEAF_SIZE};
pub use error::{RenderError, RenderResult};
pub use output::{save_image, write_ppm};
pub use pixels::{PixelData, Pixels};
pub use pool::ThreadPool;
pub use progressive::ProgressiveRender;
pub use tracer::{compute_lighting, trace_ray, Tracer};

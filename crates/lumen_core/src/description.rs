//! JSON scene descriptions.
//!
//! A description is plain data; [`SceneDescription::build`] validates it and
//! produces a [`Scene`].
//!
//! ```json
//! {
//!   "width": 320, "height": 240, "reflections": 4, "ambient": 0.2,
//!   "background": { "rgb8": [135, 206, 235] },
//!   "camera": { "position": [0, -4, 1], "direction": [0, 1, 0], "fov": 60 },
//!   "lights": [ { "position": [2, -2, 5], "color": [1, 1, 1] } ],
//!   "shapes": [
//!     { "type": "plane", "point": [0, 0, 0], "normal": [0, 0, 1] },
//!     { "type": "sphere", "center": [0, 0, 1], "radius": 1,
//!       "material": { "color": [1, 0, 0], "reflectivity": 0.3 } },
//!     { "type": "box", "center": [2, 1, 0.5], "size": [1, 1, 1] }
//!   ]
//! }
//! ```

use std::path::Path;

use lumen_math::{Color, Vec3};
use serde::Deserialize;
use thiserror::Error;

use crate::{Camera, Material, Scene, Shape};

/// Upper bound on shapes a single `sphere_grid` entry may expand to.
pub const MAX_GRID_SHAPES: usize = 4_000_000;

/// Number of grid points from `start` to `end` (inclusive) at `spacing`.
///
/// Returns `None` when the count would exceed [`MAX_GRID_SHAPES`], including
/// ranges so wide the step count does not fit in a `usize`.
pub fn grid_steps(start: f64, end: f64, spacing: f64) -> Option<usize> {
    let steps = ((end - start) / spacing + 1e-9).floor() + 1.0;
    if !(steps <= MAX_GRID_SHAPES as f64) {
        return None;
    }
    Some(steps.max(1.0) as usize)
}

/// Errors that can occur while loading a scene description.
#[derive(Error, Debug)]
pub enum SceneError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid scene: {0}")]
    Invalid(String),
}

pub type SceneResult<T> = Result<T, SceneError>;

/// A color given either as linear floats or as 8-bit channels.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum ColorDesc {
    Linear([f64; 3]),
    Rgb8 { rgb8: [u8; 3] },
}

impl ColorDesc {
    fn to_color(self) -> Color {
        match self {
            ColorDesc::Rgb8 { rgb8: [r, g, b] } => Color::from_rgb8(r, g, b),
            ColorDesc::Linear([r, g, b]) => Color::new(r, g, b),
        }
    }
}

fn white() -> ColorDesc {
    ColorDesc::Linear([1.0, 1.0, 1.0])
}

fn black() -> ColorDesc {
    ColorDesc::Linear([0.0, 0.0, 0.0])
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MaterialDesc {
    #[serde(default = "white")]
    pub color: ColorDesc,
    #[serde(default)]
    pub reflectivity: f64,
    #[serde(default = "white")]
    pub specular: ColorDesc,
    #[serde(default = "default_specular_factor")]
    pub specular_factor: f64,
    #[serde(default = "default_shininess")]
    pub shininess: f64,
}

fn default_specular_factor() -> f64 {
    Material::default().specular_factor
}

fn default_shininess() -> f64 {
    Material::default().shininess
}

impl Default for MaterialDesc {
    fn default() -> Self {
        Self {
            color: white(),
            reflectivity: 0.0,
            specular: white(),
            specular_factor: default_specular_factor(),
            shininess: default_shininess(),
        }
    }
}

impl MaterialDesc {
    fn build(&self) -> Material {
        Material::new(self.color.to_color())
            .with_reflectivity(self.reflectivity)
            .with_specular(self.specular.to_color(), self.specular_factor, self.shininess)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CameraDesc {
    pub position: [f64; 3],
    pub direction: [f64; 3],
    #[serde(default = "default_fov")]
    pub fov: f64,
    #[serde(default)]
    pub up: Option<[f64; 3]>,
}

fn default_fov() -> f64 {
    60.0
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LightDesc {
    pub position: [f64; 3],
    #[serde(default = "white")]
    pub color: ColorDesc,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShapeDesc {
    Sphere {
        center: [f64; 3],
        radius: f64,
        #[serde(default)]
        material: MaterialDesc,
    },
    Plane {
        point: [f64; 3],
        normal: [f64; 3],
        #[serde(default)]
        material: MaterialDesc,
    },
    /// Given either by `min` and `max` corners or by `center` and `size`.
    Box {
        min: Option<[f64; 3]>,
        max: Option<[f64; 3]>,
        center: Option<[f64; 3]>,
        size: Option<[f64; 3]>,
        #[serde(default)]
        material: MaterialDesc,
    },
    /// A regular field of equal spheres in a plane of constant `z`.
    SphereGrid {
        x: [f64; 2],
        y: [f64; 2],
        z: f64,
        spacing: f64,
        radius: f64,
        #[serde(default)]
        material: MaterialDesc,
    },
}

/// Top-level JSON scene description.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDescription {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_reflections")]
    pub reflections: u32,
    #[serde(default = "default_ambient")]
    pub ambient: f64,
    #[serde(default = "black")]
    pub background: ColorDesc,
    pub camera: CameraDesc,
    #[serde(default)]
    pub lights: Vec<LightDesc>,
    #[serde(default)]
    pub shapes: Vec<ShapeDesc>,
}

fn default_reflections() -> u32 {
    6
}

fn default_ambient() -> f64 {
    0.2
}

fn invalid<T>(message: impl Into<String>) -> SceneResult<T> {
    Err(SceneError::Invalid(message.into()))
}

fn finite(values: &[f64], what: &str) -> SceneResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        invalid(format!("{what} must be finite"))
    }
}

impl SceneDescription {
    /// Parse a description from JSON text.
    pub fn from_json(json: &str) -> SceneResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validate the description and build the scene.
    pub fn build(&self) -> SceneResult<Scene> {
        if self.width == 0 || self.height == 0 {
            return invalid(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            ));
        }
        if !(0.0..=1.0).contains(&self.ambient) {
            return invalid(format!("ambient must be in [0, 1], got {}", self.ambient));
        }

        let mut scene = Scene::new(self.width, self.height, self.reflections);
        scene.set_ambient_light(self.ambient);
        scene.set_background(self.background.to_color());
        scene.set_camera(self.camera.build()?);

        for light in &self.lights {
            finite(&light.position, "light position")?;
            scene.add_light(Vec3::from_array(light.position), light.color.to_color());
        }

        for shape in &self.shapes {
            shape.add_to(&mut scene)?;
        }

        log::info!(
            "Built scene {}x{}: {} bounded shapes, {} unbounded shapes, {} lights",
            scene.width(),
            scene.height(),
            scene.bounded_shapes().len(),
            scene.unbounded_shapes().len(),
            scene.lights().len()
        );
        Ok(scene)
    }
}

impl CameraDesc {
    fn build(&self) -> SceneResult<Camera> {
        finite(&self.position, "camera position")?;
        let direction = Vec3::from_array(self.direction);
        if !direction.is_finite() || direction.length_squared() == 0.0 {
            return invalid("camera direction must be a non-zero vector");
        }
        if !(self.fov > 0.0 && self.fov < 180.0) {
            return invalid(format!("camera fov must be in (0, 180), got {}", self.fov));
        }

        let mut camera = Camera::new(Vec3::from_array(self.position), direction, self.fov);
        if let Some(up) = self.up {
            camera = camera.with_up(Vec3::from_array(up));
        }
        Ok(camera)
    }
}

impl ShapeDesc {
    fn add_to(&self, scene: &mut Scene) -> SceneResult<()> {
        match self {
            ShapeDesc::Sphere {
                center,
                radius,
                material,
            } => {
                finite(center, "sphere center")?;
                if !(*radius > 0.0) || !radius.is_finite() {
                    return invalid(format!("sphere radius must be positive, got {radius}"));
                }
                scene.add_shape(Shape::sphere(
                    Vec3::from_array(*center),
                    *radius,
                    material.build(),
                ));
            }
            ShapeDesc::Plane {
                point,
                normal,
                material,
            } => {
                finite(point, "plane point")?;
                let normal = Vec3::from_array(*normal);
                if !normal.is_finite() || normal.length_squared() == 0.0 {
                    return invalid("plane normal must be a non-zero vector");
                }
                scene.add_shape(Shape::plane(
                    Vec3::from_array(*point),
                    normal,
                    material.build(),
                ));
            }
            ShapeDesc::Box {
                min,
                max,
                center,
                size,
                material,
            } => {
                let shape = match (min, max, center, size) {
                    (Some(min), Some(max), None, None) => {
                        finite(min, "box min")?;
                        finite(max, "box max")?;
                        if min.iter().zip(max).any(|(lo, hi)| lo > hi) {
                            return invalid("box min must not exceed max");
                        }
                        Shape::cuboid(
                            Vec3::from_array(*min),
                            Vec3::from_array(*max),
                            material.build(),
                        )
                    }
                    (None, None, Some(center), Some(size)) => {
                        finite(center, "box center")?;
                        finite(size, "box size")?;
                        if size.iter().any(|s| *s < 0.0) {
                            return invalid("box size must not be negative");
                        }
                        Shape::cuboid_from_center(
                            Vec3::from_array(*center),
                            size[0],
                            size[1],
                            size[2],
                            material.build(),
                        )
                    }
                    _ => return invalid("box needs either min and max or center and size"),
                };
                scene.add_shape(shape);
            }
            ShapeDesc::SphereGrid {
                x,
                y,
                z,
                spacing,
                radius,
                material,
            } => {
                finite(&[x[0], x[1], y[0], y[1], *z, *spacing, *radius], "sphere grid")?;
                if !(*spacing > 0.0) || !(*radius > 0.0) {
                    return invalid("sphere grid spacing and radius must be positive");
                }
                if x[0] > x[1] || y[0] > y[1] {
                    return invalid("sphere grid ranges must be ascending");
                }

                // Step counts are computed up front so that float accumulation
                // cannot add or drop a row.
                let (nx, ny) = match (
                    grid_steps(x[0], x[1], *spacing),
                    grid_steps(y[0], y[1], *spacing),
                ) {
                    (Some(nx), Some(ny)) if nx.saturating_mul(ny) <= MAX_GRID_SHAPES => (nx, ny),
                    _ => return invalid(format!("sphere grid exceeds {MAX_GRID_SHAPES} spheres")),
                };

                let material = material.build();
                for i in 0..nx {
                    for j in 0..ny {
                        let center = Vec3::new(
                            x[0] + i as f64 * spacing,
                            y[0] + j as f64 * spacing,
                            *z,
                        );
                        scene.add_shape(Shape::sphere(center, *radius, material));
                    }
                }
                log::debug!("Expanded sphere grid into {} spheres", nx * ny);
            }
        }
        Ok(())
    }
}

/// Load and build a scene from a JSON file.
pub fn load_scene<P: AsRef<Path>>(path: P) -> SceneResult<Scene> {
    let path = path.as_ref();
    log::info!("Loading scene from: {:?}", path);
    let content = std::fs::read_to_string(path)?;
    SceneDescription::from_json(&content)?.build()
}

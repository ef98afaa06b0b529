//! The scene: shapes, lights, camera and render settings.
//!
//! Shapes are partitioned on insertion. Shapes with finite bounds go to the
//! boundable set that the renderer indexes with a BVH; infinite shapes
//! (planes) go to a small set that is always tested by brute force.

use lumen_math::{Color, Vec3};

use crate::{Camera, Shape};

/// A point light. No distance falloff is modeled.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Light {
    pub position: Vec3,
    pub color: Color,
}

impl Light {
    pub fn new(position: Vec3, color: Color) -> Self {
        Self { position, color }
    }
}

/// Everything the tracer needs to render an image.
///
/// Shapes and lights are only appended while the scene is being built. Once
/// rendering starts, the camera is the only part that changes.
#[derive(Clone, Debug)]
pub struct Scene {
    bounded: Vec<Shape>,
    unbounded: Vec<Shape>,
    lights: Vec<Light>,
    camera: Camera,
    ambient_light: f64,
    background: Color,
    reflections: u32,
    width: u32,
    height: u32,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(512, 512, 6)
    }
}

impl Scene {
    /// Create an empty scene with the given resolution and reflection depth.
    pub fn new(width: u32, height: u32, reflections: u32) -> Self {
        Self {
            bounded: Vec::new(),
            unbounded: Vec::new(),
            lights: Vec::new(),
            camera: Camera::default(),
            ambient_light: 0.2,
            background: Color::BLACK,
            reflections,
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Add a shape, routing it to the boundable or unboundable set.
    pub fn add_shape(&mut self, shape: Shape) {
        if shape.is_bounded() {
            self.bounded.push(shape);
        } else {
            self.unbounded.push(shape);
        }
    }

    /// Add a point light.
    pub fn add_light(&mut self, position: Vec3, color: Color) {
        self.lights.push(Light::new(position, color));
    }

    pub fn set_camera(&mut self, camera: Camera) {
        self.camera = camera;
    }

    /// Set the ambient light intensity, clamped to [0, 1].
    pub fn set_ambient_light(&mut self, ambient: f64) {
        self.ambient_light = if ambient.is_nan() {
            0.0
        } else {
            ambient.clamp(0.0, 1.0)
        };
    }

    pub fn set_background(&mut self, background: Color) {
        self.background = background;
    }

    /// Set the image resolution. Zero dimensions are raised to one pixel.
    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    /// Set the mirror reflection recursion limit.
    pub fn set_reflections(&mut self, reflections: u32) {
        self.reflections = reflections;
    }

    /// Shapes with finite bounds, in insertion order.
    pub fn bounded_shapes(&self) -> &[Shape] {
        &self.bounded
    }

    /// Shapes without finite bounds, in insertion order.
    pub fn unbounded_shapes(&self) -> &[Shape] {
        &self.unbounded
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Mutable camera access for the render loop.
    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn ambient_light(&self) -> f64 {
        self.ambient_light
    }

    pub fn background(&self) -> Color {
        self.background
    }

    pub fn reflections(&self) -> u32 {
        self.reflections
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Total number of shapes in both sets.
    pub fn shape_count(&self) -> usize {
        self.bounded.len() + self.unbounded.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Material;

    #[test]
    fn test_shapes_are_partitioned() {
        let mut scene = Scene::new(10, 10, 2);
        scene.add_shape(Shape::plane(Vec3::ZERO, Vec3::Z, Material::default()));
        scene.add_shape(Shape::sphere(Vec3::Z, 0.5, Material::default()));
        scene.add_shape(Shape::cuboid(Vec3::ZERO, Vec3::ONE, Material::default()));

        assert_eq!(scene.bounded_shapes().len(), 2);
        assert_eq!(scene.unbounded_shapes().len(), 1);
        assert_eq!(scene.shape_count(), 3);
        assert!(matches!(scene.bounded_shapes()[0], Shape::Sphere(_)));
        assert!(matches!(scene.bounded_shapes()[1], Shape::Cuboid(_)));
    }

    #[test]
    fn test_settings() {
        let mut scene = Scene::new(0, 20, 3);
        assert_eq!((scene.width(), scene.height()), (1, 20));

        scene.set_ambient_light(1.7);
        assert_eq!(scene.ambient_light(), 1.0);
        scene.set_ambient_light(-1.0);
        assert_eq!(scene.ambient_light(), 0.0);

        scene.set_background(Color::from_rgb8(135, 206, 235));
        assert_eq!(scene.background().to_bytes(), [135, 206, 235]);

        scene.set_resolution(320, 240);
        scene.set_reflections(0);
        assert_eq!((scene.width(), scene.height(), scene.reflections()), (320, 240, 0));

        scene.add_light(Vec3::Z, Color::WHITE);
        assert_eq!(scene.lights(), &[Light::new(Vec3::Z, Color::WHITE)]);
    }

    #[test]
    fn test_camera_is_mutable() {
        let mut scene = Scene::default();
        scene.camera_mut().move_position(Vec3::X);
        assert_eq!(scene.camera().position(), Vec3::X);
    }
}

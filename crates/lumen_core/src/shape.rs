//! Geometric primitives and ray intersection.
//!
//! Shapes are a closed set, so they are a tagged enum rather than trait
//! objects: the intersection routine is a `match` on the hot path, and the
//! boundable/unboundable split is visible in [`Shape::bounding_box`].

use lumen_math::{Aabb, Ray, Vec3, EPS};

use crate::Material;

/// Result of a successful ray/shape intersection.
///
/// Borrowed from the scene for the duration of one trace step.
#[derive(Clone, Copy, Debug)]
pub struct HitInfo<'a> {
    /// Point of intersection
    pub pos: Vec3,
    /// Outward-facing unit surface normal
    pub normal: Vec3,
    /// The ray that produced the hit
    pub ray: Ray,
    /// Ray parameter of the hit, always greater than `EPS`
    pub t: f64,
    /// Material of the shape that was hit
    pub material: &'a Material,
}

/// A sphere given by center and radius.
#[derive(Clone, Debug, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f64,
    pub material: Material,
}

/// An infinite plane through `point` with unit `normal`.
///
/// The plane is hit from either side; the reported normal is always the
/// stored one.
#[derive(Clone, Debug, PartialEq)]
pub struct Plane {
    pub point: Vec3,
    pub normal: Vec3,
    pub material: Material,
}

/// An axis-aligned box given by its minimum and maximum corners.
#[derive(Clone, Debug, PartialEq)]
pub struct Cuboid {
    pub min: Vec3,
    pub max: Vec3,
    pub material: Material,
}

/// Any primitive that can be placed in a scene.
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    Sphere(Sphere),
    Plane(Plane),
    Cuboid(Cuboid),
}

impl Shape {
    /// Create a sphere.
    pub fn sphere(center: Vec3, radius: f64, material: Material) -> Self {
        Shape::Sphere(Sphere {
            center,
            radius: radius.abs(),
            material,
        })
    }

    /// Create a plane. The normal is normalized; a zero normal yields a plane
    /// that is never hit.
    pub fn plane(point: Vec3, normal: Vec3, material: Material) -> Self {
        Shape::Plane(Plane {
            point,
            normal: normal.normalize_or_zero(),
            material,
        })
    }

    /// Create an axis-aligned box from two opposite corners.
    pub fn cuboid(a: Vec3, b: Vec3, material: Material) -> Self {
        Shape::Cuboid(Cuboid {
            min: a.min(b),
            max: a.max(b),
            material,
        })
    }

    /// Create an axis-aligned box centered on `center` with the given extents.
    pub fn cuboid_from_center(
        center: Vec3,
        width: f64,
        height: f64,
        depth: f64,
        material: Material,
    ) -> Self {
        let half = Vec3::new(width, height, depth).abs() / 2.0;
        Self::cuboid(center - half, center + half, material)
    }

    /// Test the ray against this shape.
    ///
    /// Returns the nearest intersection with `t > EPS`, or `None`. Degenerate
    /// rays and shapes produce `None` rather than an error.
    pub fn intersect(&self, ray: &Ray) -> Option<HitInfo<'_>> {
        match self {
            Shape::Sphere(sphere) => sphere.intersect(ray),
            Shape::Plane(plane) => plane.intersect(ray),
            Shape::Cuboid(cuboid) => cuboid.intersect(ray),
        }
    }

    /// Finite bounds of the shape, or `None` for infinite shapes.
    ///
    /// Only shapes with bounds are indexed by the BVH; the rest are tested
    /// by brute force.
    pub fn bounding_box(&self) -> Option<Aabb> {
        match self {
            Shape::Sphere(sphere) => {
                let r = Vec3::splat(sphere.radius);
                Some(Aabb::from_points(sphere.center - r, sphere.center + r))
            }
            Shape::Plane(_) => None,
            Shape::Cuboid(cuboid) => Some(Aabb::from_points(cuboid.min, cuboid.max)),
        }
    }

    /// Whether the BVH can index this shape.
    pub fn is_bounded(&self) -> bool {
        !matches!(self, Shape::Plane(_))
    }

    /// The material of this shape.
    pub fn material(&self) -> &Material {
        match self {
            Shape::Sphere(sphere) => &sphere.material,
            Shape::Plane(plane) => &plane.material,
            Shape::Cuboid(cuboid) => &cuboid.material,
        }
    }
}

impl Sphere {
    fn intersect(&self, ray: &Ray) -> Option<HitInfo<'_>> {
        let a = ray.direction.length_squared();
        if a < EPS * EPS || self.radius <= 0.0 {
            return None;
        }

        let oc = ray.origin - self.center;
        let half_b = oc.dot(ray.direction);
        let c = oc.length_squared() - self.radius * self.radius;
        let discriminant = half_b * half_b - a * c;
        if discriminant < 0.0 {
            return None;
        }

        // Nearest root in front of the origin; the far root covers rays that
        // start inside the sphere.
        let sqrtd = discriminant.sqrt();
        let near = (-half_b - sqrtd) / a;
        let far = (-half_b + sqrtd) / a;
        let t = if near > EPS {
            near
        } else if far > EPS {
            far
        } else {
            return None;
        };

        let pos = ray.at(t);
        Some(HitInfo {
            pos,
            normal: (pos - self.center) / self.radius,
            ray: *ray,
            t,
            material: &self.material,
        })
    }
}

impl Plane {
    fn intersect(&self, ray: &Ray) -> Option<HitInfo<'_>> {
        let denom = self.normal.dot(ray.direction);
        if denom.abs() < EPS {
            // Parallel (or degenerate normal/direction)
            return None;
        }

        let t = (self.point - ray.origin).dot(self.normal) / denom;
        if t <= EPS {
            return None;
        }

        Some(HitInfo {
            pos: ray.at(t),
            normal: self.normal,
            ray: *ray,
            t,
            material: &self.material,
        })
    }
}

impl Cuboid {
    fn intersect(&self, ray: &Ray) -> Option<HitInfo<'_>> {
        let mut tmin = f64::NEG_INFINITY;
        let mut tmax = f64::INFINITY;

        for axis in 0..3 {
            let inv = 1.0 / ray.direction[axis];
            let mut t0 = (self.min[axis] - ray.origin[axis]) * inv;
            let mut t1 = (self.max[axis] - ray.origin[axis]) * inv;
            if inv < 0.0 {
                std::mem::swap(&mut t0, &mut t1);
            }
            tmin = tmin.max(t0);
            tmax = tmax.min(t1);
            if tmax < tmin {
                return None;
            }
        }

        let t = if tmin > EPS { tmin } else { tmax };
        if !(t > EPS) || !t.is_finite() {
            return None;
        }

        let pos = ray.at(t);
        Some(HitInfo {
            pos,
            normal: self.face_normal(pos),
            ray: *ray,
            t,
            material: &self.material,
        })
    }

    /// Outward normal of the face closest to `pos`.
    fn face_normal(&self, pos: Vec3) -> Vec3 {
        let mut best = f64::INFINITY;
        let mut normal = Vec3::X;
        for axis in 0..3 {
            let to_min = (pos[axis] - self.min[axis]).abs();
            let to_max = (pos[axis] - self.max[axis]).abs();
            let mut axis_normal = Vec3::ZERO;
            if to_min < best {
                best = to_min;
                axis_normal[axis] = -1.0;
                normal = axis_normal;
            }
            if to_max < best {
                best = to_max;
                axis_normal[axis] = 1.0;
                normal = axis_normal;
            }
        }
        normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_vec_close(a: Vec3, b: Vec3) {
        assert!((a - b).length() < 1e-6, "{a:?} != {b:?}");
    }

    #[test]
    fn test_sphere_hit_closed_form() {
        let sphere = Shape::sphere(Vec3::ZERO, 1.0, Material::default());
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0));

        let hit = sphere.intersect(&ray).expect("ray should hit the sphere");
        assert!((hit.t - 4.0).abs() < 1e-6);
        assert_vec_close(hit.pos, Vec3::new(0.0, 0.0, -1.0));
        assert_vec_close(hit.normal, Vec3::new(0.0, 0.0, -1.0));
        assert_eq!(hit.ray, ray);
    }

    #[test]
    fn test_sphere_along_negative_z() {
        let sphere = Shape::sphere(Vec3::ZERO, 1.0, Material::default());
        let ray = Ray::new(Vec3::new(0.0, 0.0, 3.0), Vec3::new(0.0, 0.0, -1.0));

        let hit = sphere.intersect(&ray).unwrap();
        assert!((hit.t - 2.0).abs() < 1e-6);
        assert_vec_close(hit.pos, Vec3::new(0.0, 0.0, 1.0));
        assert_vec_close(hit.normal, Vec3::new(0.0, 0.0, 1.0));
    }

    #[test]
    fn test_sphere_miss() {
        let sphere = Shape::sphere(Vec3::new(2.0, 2.0, 2.0), 0.5, Material::default());
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 1.0));
        assert!(sphere.intersect(&ray).is_none());

        // Aimed away from a sphere in front of the origin
        let sphere = Shape::sphere(Vec3::new(0.0, 0.0, 5.0), 1.0, Material::default());
        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        assert!(sphere.intersect(&ray).is_none());
    }

    #[test]
    fn test_sphere_from_inside_uses_far_root() {
        let sphere = Shape::sphere(Vec3::ZERO, 2.0, Material::default());
        let ray = Ray::new(Vec3::ZERO, Vec3::X);

        let hit = sphere.intersect(&ray).unwrap();
        assert!((hit.t - 2.0).abs() < 1e-6);
        assert_vec_close(hit.normal, Vec3::X);
    }

    #[test]
    fn test_sphere_zero_direction_is_no_hit() {
        let sphere = Shape::sphere(Vec3::ZERO, 1.0, Material::default());
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::ZERO);
        assert!(sphere.intersect(&ray).is_none());
    }

    #[test]
    fn test_plane_perpendicular() {
        let plane = Shape::plane(Vec3::new(0.0, 5.0, 0.0), Vec3::Y, Material::default());
        let ray = Ray::new(Vec3::new(0.0, -1.0, 0.0), Vec3::Y);

        let hit = plane.intersect(&ray).unwrap();
        assert!((hit.t - 6.0).abs() < 1e-6);
        assert_vec_close(hit.pos, Vec3::new(0.0, 5.0, 0.0));
        assert_vec_close(hit.normal, Vec3::Y);
    }

    #[test]
    fn test_plane_parallel_is_no_hit() {
        let plane = Shape::plane(Vec3::ZERO, Vec3::X, Material::default());
        let ray = Ray::new(Vec3::new(0.0, -1.0, 0.0), Vec3::Y);
        assert!(plane.intersect(&ray).is_none());
    }

    #[test]
    fn test_plane_behind_origin_is_no_hit() {
        let plane = Shape::plane(Vec3::ZERO, Vec3::Z, Material::default());
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::Z);
        assert!(plane.intersect(&ray).is_none());
    }

    #[test]
    fn test_plane_normal_is_normalized() {
        let plane = Shape::plane(Vec3::ZERO, Vec3::new(0.0, 0.0, 3.0), Material::default());
        let ray = Ray::new(Vec3::new(1.0, 1.0, 2.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = plane.intersect(&ray).unwrap();
        assert_vec_close(hit.normal, Vec3::Z);
        assert!((hit.t - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_cuboid_hit_and_face_normal() {
        let cuboid = Shape::cuboid(Vec3::splat(-1.0), Vec3::splat(1.0), Material::default());

        let ray = Ray::new(Vec3::new(0.2, 0.3, -4.0), Vec3::Z);
        let hit = cuboid.intersect(&ray).unwrap();
        assert!((hit.t - 3.0).abs() < 1e-6);
        assert_vec_close(hit.normal, Vec3::new(0.0, 0.0, -1.0));

        let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));
        let hit = cuboid.intersect(&ray).unwrap();
        assert!((hit.t - 4.0).abs() < 1e-6);
        assert_vec_close(hit.normal, Vec3::X);
    }

    #[test]
    fn test_cuboid_from_inside_and_miss() {
        let cuboid = Shape::cuboid_from_center(Vec3::ZERO, 2.0, 4.0, 6.0, Material::default());

        let ray = Ray::new(Vec3::ZERO, Vec3::Y);
        let hit = cuboid.intersect(&ray).unwrap();
        assert!((hit.t - 2.0).abs() < 1e-6);
        assert_vec_close(hit.normal, Vec3::Y);

        let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::Y);
        assert!(cuboid.intersect(&ray).is_none());
    }

    #[test]
    fn test_bounding_boxes() {
        let sphere = Shape::sphere(Vec3::new(1.0, 2.0, 3.0), 0.5, Material::default());
        let bbox = sphere.bounding_box().unwrap();
        assert_vec_close(bbox.min(), Vec3::new(0.5, 1.5, 2.5));
        assert_vec_close(bbox.max(), Vec3::new(1.5, 2.5, 3.5));
        assert!(sphere.is_bounded());

        let cuboid = Shape::cuboid(Vec3::splat(2.0), Vec3::ZERO, Material::default());
        assert_vec_close(cuboid.bounding_box().unwrap().max(), Vec3::splat(2.0));

        let plane = Shape::plane(Vec3::ZERO, Vec3::Z, Material::default());
        assert!(plane.bounding_box().is_none());
        assert!(!plane.is_bounded());
    }
}

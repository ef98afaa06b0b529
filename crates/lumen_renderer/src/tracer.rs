//! Whitted-style ray tracing and progressive refinement.
//!
//! [`trace_ray`] and [`compute_lighting`] are pure functions of the scene,
//! its BVH and a ray. [`Tracer`] owns the worker pool and schedules one job
//! per image row to add a sample to every pixel of that row.

use std::ops::ControlFlow;
use std::sync::Arc;

use lumen_core::{HitInfo, Scene};
use lumen_math::{Color, Ray, Vec3, EPS};

use crate::pool::ThreadPool;
use crate::{sampler, Bvh, Pixels, RenderConfig, RenderResult};

/// Nearest intersection of `ray` with any shape in the scene.
pub fn closest_hit<'s>(scene: &'s Scene, bvh: &Bvh, ray: &Ray) -> Option<HitInfo<'s>> {
    let mut closest = bvh.closest_hit(scene.bounded_shapes(), ray);
    for shape in scene.unbounded_shapes() {
        if let Some(hit) = shape.intersect(ray) {
            if closest.map_or(true, |c| hit.t < c.t) {
                closest = Some(hit);
            }
        }
    }
    closest
}

/// Color seen along `ray`, following mirror reflections up to `depth` times.
pub fn trace_ray(scene: &Scene, bvh: &Bvh, ray: &Ray, depth: u32) -> Color {
    match closest_hit(scene, bvh, ray) {
        Some(hit) => compute_lighting(scene, bvh, &hit, depth),
        None => scene.background(),
    }
}

/// Whether anything lies strictly between `point` and `light_pos`.
pub fn is_occluded(scene: &Scene, bvh: &Bvh, point: Vec3, light_pos: Vec3) -> bool {
    let to_light = light_pos - point;
    let dist_sq = to_light.length_squared();
    let Some(dir) = to_light.try_normalize() else {
        return false;
    };
    let ray = Ray::new(point, dir);
    let blocks = |hit: &HitInfo| hit.t > EPS && hit.t * hit.t < dist_sq;

    let unbounded = scene
        .unbounded_shapes()
        .iter()
        .filter_map(|shape| shape.intersect(&ray))
        .any(|hit| blocks(&hit));
    if unbounded {
        return true;
    }

    bvh.traverse_first_hit(scene.bounded_shapes(), &ray, |_, hit| {
        if blocks(&hit) {
            ControlFlow::Break(())
        } else {
            ControlFlow::Continue(())
        }
    })
    .is_break()
}

/// Local illumination at a hit: ambient, then per light diffuse, specular
/// and the mirror term.
///
/// The mirror term is traced once and added for every light, so a scene
/// without lights shows only the ambient term.
pub fn compute_lighting(scene: &Scene, bvh: &Bvh, hit: &HitInfo, depth: u32) -> Color {
    let mat = hit.material;
    let i = hit.pos;
    let d = hit.ray.direction;
    let n = hit.normal;

    let amb_factor = scene.ambient_light() * (1.0 - mat.reflectivity);
    let mut color = mat.color * amb_factor;
    if scene.lights().is_empty() {
        return color;
    }

    let reflective = if depth > 0 && mat.is_reflective() {
        let reflect_dir = d - 2.0 * d.project_onto(n);
        let reflected = trace_ray(scene, bvh, &Ray::new(i, reflect_dir), depth - 1);
        reflected * ((1.0 - amb_factor) * mat.reflectivity)
    } else {
        Color::BLACK
    };

    let view = d.normalize_or_zero();
    for light in scene.lights() {
        color += reflective;
        if is_occluded(scene, bvh, i, light.position) {
            continue;
        }

        let l = (light.position - i).normalize_or_zero();
        let diffuse = (1.0 - amb_factor) * (1.0 - mat.reflectivity) * n.dot(l).max(0.0);
        color += mat.color * light.color * diffuse;

        let h = (l - view).normalize_or_zero();
        let highlight = mat.specular_factor * n.dot(h).max(0.0).powf(mat.shininess);
        color += mat.specular * light.color * highlight;
    }
    color
}

/// Schedules progressive refinement passes on a worker pool.
pub struct Tracer {
    bvh: Arc<Bvh>,
    pool: ThreadPool,
}

impl Tracer {
    /// Build the BVH for `scene` and start the workers.
    pub fn new(scene: &Scene, config: &RenderConfig) -> RenderResult<Self> {
        let bvh = Arc::new(Bvh::build(scene.bounded_shapes(), config.bvh_leaf_size));
        let pool = ThreadPool::new(config.worker_count())?;
        Ok(Self { bvh, pool })
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.pool.size()
    }

    /// Trace a single ray against `scene`, which must be the scene this
    /// tracer was built for.
    pub fn trace_ray(&self, scene: &Scene, ray: &Ray, depth: u32) -> Color {
        trace_ray(scene, &self.bvh, ray, depth)
    }

    /// Queue one job per row that adds a sample to every pixel in the row.
    ///
    /// Returns immediately. Rows become ready in any order; a row traced
    /// for a buffer that is reset before it finishes is discarded.
    pub fn refine_pixels(&self, scene: &Arc<Scene>, pixels: &Arc<Pixels>) {
        let generation = pixels.generation();
        let camera = *scene.camera();
        let reflections = scene.reflections();
        let (width, height) = (pixels.width(), pixels.height());
        if (width, height) != (scene.width(), scene.height()) {
            log::warn!(
                "Refining a {}x{} buffer for a {}x{} scene",
                width,
                height,
                scene.width(),
                scene.height()
            );
        }

        for y in 0..height {
            let scene = Arc::clone(scene);
            let pixels = Arc::clone(pixels);
            let bvh = Arc::clone(&self.bvh);
            self.pool.enqueue(move || {
                if pixels.generation() != generation {
                    return;
                }
                let mut row = pixels.row(y);
                for (x, pixel) in row.iter_mut().enumerate() {
                    let (ox, oy) = sampler::next_offset(pixel.samples);
                    let ray = camera.ray(x as f64 + ox, f64::from(y) + oy, width, height);
                    pixel.add_sample(trace_ray(&scene, &bvh, &ray, reflections));
                }
                pixels.publish_row(y, row, generation);
            });
        }
        log::debug!("Queued refinement pass over {} rows", height);
    }

    /// Block until every queued row has been traced.
    pub fn wait(&self) {
        self.pool.wait();
    }

    /// Drop rows that have not started. Returns how many were dropped.
    pub fn clear_tasks(&self) -> usize {
        self.pool.clear_tasks()
    }

    /// Whether no row is queued or being traced.
    pub fn is_idle(&self) -> bool {
        self.pool.active() == 0
    }
}

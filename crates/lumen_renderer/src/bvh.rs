//! Bounding Volume Hierarchy (BVH) acceleration structure.
//!
//! The tree is stored as a flat arena of nodes. Leaves reference a contiguous
//! range of a shape-index permutation, so the scene's shape list itself is
//! never reordered. Built once from the boundable shapes and immutable
//! afterwards, which lets every worker thread share it without locking.

use std::ops::ControlFlow;

use lumen_core::{HitInfo, Shape};
use lumen_math::{Aabb, Interval, Ray, Vec3, EPS};

use crate::config::DEFAULT_LEAF_SIZE;

/// Subtrees with at least this many shapes are built on the rayon pool.
const PARALLEL_BUILD_THRESHOLD: usize = 4096;

/// Traversal stack depth. Median splits keep the tree balanced, so the depth
/// is bounded by log2 of the shape count.
const MAX_DEPTH: usize = 64;

/// A node of the flattened tree.
#[derive(Debug, Clone, PartialEq)]
pub enum BvhNode {
    /// Internal node; `left` and `right` index into the node arena.
    Branch { left: usize, right: usize, bbox: Aabb },
    /// Leaf covering `indices[start..end]`.
    Leaf { start: usize, end: usize, bbox: Aabb },
}

impl BvhNode {
    pub fn bbox(&self) -> &Aabb {
        match self {
            BvhNode::Branch { bbox, .. } | BvhNode::Leaf { bbox, .. } => bbox,
        }
    }
}

#[derive(Clone, Copy)]
struct BuildItem {
    index: usize,
    bbox: Aabb,
    centroid: Vec3,
}

/// BVH over the boundable shapes of a scene.
#[derive(Debug, Clone, Default)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    indices: Vec<usize>,
}

impl Bvh {
    /// Build with the default leaf size.
    pub fn new(shapes: &[Shape]) -> Self {
        Self::build(shapes, DEFAULT_LEAF_SIZE)
    }

    /// Build a BVH over `shapes`.
    ///
    /// Shapes without finite bounds are skipped. Every traversal must be
    /// passed the same slice that the tree was built from.
    pub fn build(shapes: &[Shape], leaf_size: usize) -> Self {
        let leaf_size = leaf_size.max(1);
        let mut items: Vec<BuildItem> = shapes
            .iter()
            .enumerate()
            .filter_map(|(index, shape)| {
                shape.bounding_box().map(|bbox| BuildItem {
                    index,
                    bbox,
                    centroid: bbox.centroid(),
                })
            })
            .collect();

        if items.is_empty() {
            return Self::default();
        }

        let nodes = build_recursive(&mut items, 0, leaf_size);
        let indices = items.iter().map(|item| item.index).collect();

        log::info!(
            "Built BVH: {} shapes, {} nodes, leaf size {}",
            items.len(),
            nodes.len(),
            leaf_size
        );
        Self { nodes, indices }
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of shapes indexed by the tree.
    pub fn shape_count(&self) -> usize {
        self.indices.len()
    }

    /// Bounds of everything in the tree.
    pub fn bounds(&self) -> Option<Aabb> {
        self.nodes.first().map(|node| *node.bbox())
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    /// Call `visit` for every shape the ray intersects, in no particular order.
    pub fn traverse<'s, F>(&self, shapes: &'s [Shape], ray: &Ray, mut visit: F)
    where
        F: FnMut(&'s Shape, HitInfo<'s>),
    {
        let _: ControlFlow<()> = self.traverse_first_hit(shapes, ray, |shape, hit| {
            visit(shape, hit);
            ControlFlow::Continue(())
        });
    }

    /// Like [`Bvh::traverse`], but stops as soon as `visit` breaks.
    pub fn traverse_first_hit<'s, B, F>(
        &self,
        shapes: &'s [Shape],
        ray: &Ray,
        mut visit: F,
    ) -> ControlFlow<B>
    where
        F: FnMut(&'s Shape, HitInfo<'s>) -> ControlFlow<B>,
    {
        if self.nodes.is_empty() {
            return ControlFlow::Continue(());
        }

        let ray_t = Interval::new(EPS, f64::INFINITY);
        let mut stack = [0usize; MAX_DEPTH];
        let mut top = 1;

        while top > 0 {
            top -= 1;
            let node = &self.nodes[stack[top]];
            if !node.bbox().hit(ray, ray_t) {
                continue;
            }
            match *node {
                BvhNode::Branch { left, right, .. } => {
                    stack[top] = right;
                    stack[top + 1] = left;
                    top += 2;
                }
                BvhNode::Leaf { start, end, .. } => {
                    for &index in &self.indices[start..end] {
                        let shape = &shapes[index];
                        if let Some(hit) = shape.intersect(ray) {
                            visit(shape, hit)?;
                        }
                    }
                }
            }
        }
        ControlFlow::Continue(())
    }

    /// Nearest intersection among the indexed shapes.
    ///
    /// Subtrees whose boxes start beyond the current nearest hit are skipped.
    pub fn closest_hit<'s>(&self, shapes: &'s [Shape], ray: &Ray) -> Option<HitInfo<'s>> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut closest: Option<HitInfo<'s>> = None;
        let mut stack = [0usize; MAX_DEPTH];
        let mut top = 1;

        while top > 0 {
            top -= 1;
            let node = &self.nodes[stack[top]];
            let max_t = closest.map_or(f64::INFINITY, |hit| hit.t);
            if !node.bbox().hit(ray, Interval::new(EPS, max_t)) {
                continue;
            }
            match *node {
                BvhNode::Branch { left, right, .. } => {
                    stack[top] = right;
                    stack[top + 1] = left;
                    top += 2;
                }
                BvhNode::Leaf { start, end, .. } => {
                    for &index in &self.indices[start..end] {
                        if let Some(hit) = shapes[index].intersect(ray) {
                            if closest.map_or(true, |c| hit.t < c.t) {
                                closest = Some(hit);
                            }
                        }
                    }
                }
            }
        }
        closest
    }
}

/// Build the subtree for `items`, whose first element sits at `base` in the
/// final permutation. Child indices in the result are local to it.
fn build_recursive(items: &mut [BuildItem], base: usize, leaf_size: usize) -> Vec<BvhNode> {
    let bbox = items
        .iter()
        .fold(items[0].bbox, |acc, item| Aabb::surrounding(&acc, &item.bbox));

    if items.len() <= leaf_size {
        return vec![BvhNode::Leaf {
            start: base,
            end: base + items.len(),
            bbox,
        }];
    }

    // Split axis from the spread of centroids, not of the boxes themselves
    let centroid_bounds = items.iter().fold(Aabb::EMPTY, |acc, item| {
        Aabb::surrounding(&acc, &Aabb::from_points(item.centroid, item.centroid))
    });
    let axis = centroid_bounds.longest_axis();

    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| a.centroid[axis].total_cmp(&b.centroid[axis]));

    let parallel = items.len() >= PARALLEL_BUILD_THRESHOLD;
    let (left_items, right_items) = items.split_at_mut(mid);
    let (left, right) = if parallel {
        rayon::join(
            || build_recursive(left_items, base, leaf_size),
            || build_recursive(right_items, base + mid, leaf_size),
        )
    } else {
        (
            build_recursive(left_items, base, leaf_size),
            build_recursive(right_items, base + mid, leaf_size),
        )
    };

    let mut nodes = Vec::with_capacity(1 + left.len() + right.len());
    nodes.push(BvhNode::Branch {
        left: 1,
        right: 1 + left.len(),
        bbox,
    });
    append_shifted(&mut nodes, left);
    append_shifted(&mut nodes, right);
    nodes
}

/// Append a subtree, rebasing its child indices onto the end of `nodes`.
fn append_shifted(nodes: &mut Vec<BvhNode>, subtree: Vec<BvhNode>) {
    let offset = nodes.len();
    nodes.extend(subtree.into_iter().map(|node| match node {
        BvhNode::Branch { left, right, bbox } => BvhNode::Branch {
            left: left + offset,
            right: right + offset,
            bbox,
        },
        leaf => leaf,
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_core::Material;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force<'s>(shapes: &'s [Shape], ray: &Ray) -> Option<HitInfo<'s>> {
        shapes
            .iter()
            .filter_map(|shape| shape.intersect(ray))
            .min_by(|a, b| a.t.total_cmp(&b.t))
    }

    fn random_scene(rng: &mut StdRng, count: usize) -> Vec<Shape> {
        (0..count)
            .map(|i| {
                let center = Vec3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                );
                if i % 5 == 0 {
                    Shape::cuboid_from_center(
                        center,
                        rng.gen_range(0.1..1.5),
                        rng.gen_range(0.1..1.5),
                        rng.gen_range(0.1..1.5),
                        Material::default(),
                    )
                } else {
                    Shape::sphere(center, rng.gen_range(0.1..1.0), Material::default())
                }
            })
            .collect()
    }

    fn random_ray(rng: &mut StdRng) -> Ray {
        let origin = Vec3::new(
            rng.gen_range(-15.0..15.0),
            rng.gen_range(-15.0..15.0),
            rng.gen_range(-15.0..15.0),
        );
        let target = Vec3::new(
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
            rng.gen_range(-10.0..10.0),
        );
        Ray::new(origin, (target - origin).normalize())
    }

    #[test]
    fn test_bvh_empty() {
        let bvh = Bvh::new(&[]);
        assert!(bvh.is_empty());
        assert_eq!(bvh.shape_count(), 0);
        assert!(bvh.bounds().is_none());

        let ray = Ray::new(Vec3::ZERO, Vec3::Z);
        assert!(bvh.closest_hit(&[], &ray).is_none());
        let flow = bvh.traverse_first_hit::<(), _>(&[], &ray, |_, _| ControlFlow::Break(()));
        assert!(flow.is_continue());
    }

    #[test]
    fn test_bvh_single_sphere() {
        let shapes = vec![Shape::sphere(Vec3::new(0.0, 0.0, -1.0), 0.5, Material::default())];
        let bvh = Bvh::new(&shapes);

        assert_eq!(bvh.len(), 1);
        assert!(matches!(bvh.nodes()[0], BvhNode::Leaf { start: 0, end: 1, .. }));

        let ray = Ray::new(Vec3::ZERO, Vec3::new(0.0, 0.0, -1.0));
        let hit = bvh.closest_hit(&shapes, &ray).unwrap();
        assert!((hit.t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_unbounded_shapes_are_skipped() {
        let shapes = vec![
            Shape::plane(Vec3::ZERO, Vec3::Z, Material::default()),
            Shape::sphere(Vec3::new(0.0, 0.0, 5.0), 1.0, Material::default()),
        ];
        let bvh = Bvh::new(&shapes);
        assert_eq!(bvh.shape_count(), 1);

        // The plane would be hit first at t = 1 if it were indexed
        let ray = Ray::new(Vec3::new(0.0, 0.0, 1.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(bvh.closest_hit(&shapes, &ray).is_none());
    }

    #[test]
    fn test_structure_is_consistent() {
        let mut rng = StdRng::seed_from_u64(7);
        let shapes = random_scene(&mut rng, 200);
        let bvh = Bvh::build(&shapes, 3);

        // Indices form a permutation of the shapes
        let mut seen = bvh.indices.clone();
        seen.sort_unstable();
        assert_eq!(seen, (0..200).collect::<Vec<_>>());

        let mut covered = 0;
        for node in bvh.nodes() {
            match *node {
                BvhNode::Leaf { start, end, ref bbox } => {
                    assert!(end - start <= 3 && end > start);
                    covered += end - start;
                    for &index in &bvh.indices[start..end] {
                        let shape_box = shapes[index].bounding_box().unwrap();
                        assert!(bbox.min().cmple(shape_box.min()).all());
                        assert!(bbox.max().cmpge(shape_box.max()).all());
                    }
                }
                BvhNode::Branch { left, right, .. } => {
                    assert!(left < bvh.len() && right < bvh.len());
                }
            }
        }
        assert_eq!(covered, 200);
    }

    #[test]
    fn test_bvh_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        let shapes = random_scene(&mut rng, 300);
        let bvh = Bvh::new(&shapes);

        for _ in 0..1000 {
            let ray = random_ray(&mut rng);
            let expected = brute_force(&shapes, &ray);

            let closest = bvh.closest_hit(&shapes, &ray);
            let mut visited: Option<HitInfo> = None;
            bvh.traverse(&shapes, &ray, |_, hit| {
                if visited.map_or(true, |v| hit.t < v.t) {
                    visited = Some(hit);
                }
            });

            match expected {
                None => {
                    assert!(closest.is_none());
                    assert!(visited.is_none());
                }
                Some(expected) => {
                    assert!((closest.unwrap().t - expected.t).abs() < 1e-9);
                    assert!((visited.unwrap().t - expected.t).abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn test_parallel_build_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(1234);
        let shapes = random_scene(&mut rng, PARALLEL_BUILD_THRESHOLD * 2 + 17);
        let bvh = Bvh::new(&shapes);
        assert_eq!(bvh.shape_count(), shapes.len());

        for _ in 0..200 {
            let ray = random_ray(&mut rng);
            let expected = brute_force(&shapes, &ray).map(|hit| hit.t);
            let actual = bvh.closest_hit(&shapes, &ray).map(|hit| hit.t);
            match (expected, actual) {
                (None, None) => {}
                (Some(e), Some(a)) => assert!((e - a).abs() < 1e-9),
                other => panic!("mismatch: {other:?}"),
            }
        }
    }

    #[test]
    fn test_traverse_first_hit_stops_early() {
        let shapes: Vec<Shape> = (0..20)
            .map(|i| Shape::sphere(Vec3::new(0.0, 0.0, i as f64 * 3.0), 1.0, Material::default()))
            .collect();
        let bvh = Bvh::new(&shapes);
        let ray = Ray::new(Vec3::new(0.0, 0.0, -5.0), Vec3::Z);

        let mut visits = 0;
        let flow = bvh.traverse_first_hit(&shapes, &ray, |_, hit| {
            visits += 1;
            ControlFlow::Break(hit.t)
        });
        assert_eq!(visits, 1);
        assert!(flow.is_break());

        let mut all = 0;
        bvh.traverse(&shapes, &ray, |_, _| all += 1);
        assert_eq!(all, 20);
    }
}

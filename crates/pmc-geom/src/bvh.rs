//! A triangle bounding volume hierarchy supporting nearest-point queries,
//! used by the Hausdorff distance engine for both the forward (decoded
//! surface against original samples) and proxy (original surface against
//! decoded samples) directions.
//!
//! Construction follows the surface-area heuristic (SAH) with binned
//! bucket search, the same scheme used for ray-tracing acceleration
//! structures elsewhere in this codebase — only the leaf query changes
//! (closest-point instead of ray/triangle intersection).

use crate::aabb::Aabb3;
use crate::predicates::closest_point_on_triangle;
use pmc_math::Point3;

const NUM_BUCKETS: usize = 12;
const MAX_LEAF_TRIANGLES: usize = 4;

/// One triangle stored in the BVH, carrying an opaque caller id (typically
/// a dense face or sample index) alongside its three corners.
#[derive(Debug, Clone, Copy)]
pub struct BvhTriangle {
    /// Caller-defined identifier returned from queries.
    pub id: u32,
    /// Corners.
    pub verts: [Point3; 3],
}

enum BvhNode {
    Leaf { aabb: Aabb3, tris: Vec<usize> },
    Internal { aabb: Aabb3, left: Box<BvhNode>, right: Box<BvhNode> },
}

impl BvhNode {
    fn aabb(&self) -> &Aabb3 {
        match self {
            BvhNode::Leaf { aabb, .. } => aabb,
            BvhNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// A static triangle BVH.
pub struct Bvh {
    root: Option<BvhNode>,
    tris: Vec<BvhTriangle>,
}

struct Bucket {
    count: usize,
    aabb: Aabb3,
}

impl Bvh {
    /// Build a BVH over `tris`. Empty input yields a BVH that reports no
    /// hits from [`Bvh::nearest`].
    pub fn build(tris: Vec<BvhTriangle>) -> Self {
        if tris.is_empty() {
            return Self { root: None, tris };
        }
        let indices: Vec<usize> = (0..tris.len()).collect();
        let root = Self::build_node(&tris, indices);
        Self { root: Some(root), tris }
    }

    fn centroid(tris: &[BvhTriangle], i: usize) -> Point3 {
        let t = &tris[i];
        Aabb3::of_triangle(&t.verts[0], &t.verts[1], &t.verts[2]).center()
    }

    fn build_node(tris: &[BvhTriangle], indices: Vec<usize>) -> BvhNode {
        let mut bounds = Aabb3::empty();
        for &i in &indices {
            bounds.expand(&Aabb3::of_triangle(&tris[i].verts[0], &tris[i].verts[1], &tris[i].verts[2]));
        }

        if indices.len() <= MAX_LEAF_TRIANGLES {
            return BvhNode::Leaf { aabb: bounds, tris: indices };
        }

        let mut centroid_bounds = Aabb3::empty();
        for &i in &indices {
            centroid_bounds.include_point(&Self::centroid(tris, i));
        }
        let extent = centroid_bounds.max - centroid_bounds.min;
        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };
        let axis_extent = extent[axis];

        if axis_extent < 1e-12 {
            // All centroids coincide; split arbitrarily in half rather than
            // looping forever trying to bucket a degenerate axis.
            let mid = indices.len() / 2;
            let (left, right) = indices.split_at(mid);
            return BvhNode::Internal {
                aabb: bounds,
                left: Box::new(Self::build_node(tris, left.to_vec())),
                right: Box::new(Self::build_node(tris, right.to_vec())),
            };
        }

        let min = centroid_bounds.min[axis];
        let bucket_of = |i: usize| -> usize {
            let c = Self::centroid(tris, i)[axis];
            let b = ((c - min) / axis_extent * NUM_BUCKETS as f64) as usize;
            b.min(NUM_BUCKETS - 1)
        };

        let mut buckets: Vec<Bucket> = (0..NUM_BUCKETS)
            .map(|_| Bucket { count: 0, aabb: Aabb3::empty() })
            .collect();
        for &i in &indices {
            let b = bucket_of(i);
            buckets[b].count += 1;
            buckets[b].aabb.expand(&Aabb3::of_triangle(&tris[i].verts[0], &tris[i].verts[1], &tris[i].verts[2]));
        }

        let mut best_cost = f64::INFINITY;
        let mut best_split = 0usize;
        for split in 0..NUM_BUCKETS - 1 {
            let mut left_box = Aabb3::empty();
            let mut left_count = 0usize;
            for b in &buckets[0..=split] {
                left_box.expand(&b.aabb);
                left_count += b.count;
            }
            let mut right_box = Aabb3::empty();
            let mut right_count = 0usize;
            for b in &buckets[split + 1..] {
                right_box.expand(&b.aabb);
                right_count += b.count;
            }
            if left_count == 0 || right_count == 0 {
                continue;
            }
            let cost = left_count as f64 * left_box.surface_area()
                + right_count as f64 * right_box.surface_area();
            if cost < best_cost {
                best_cost = cost;
                best_split = split;
            }
        }

        let (left_idx, right_idx): (Vec<usize>, Vec<usize>) =
            indices.into_iter().partition(|&i| bucket_of(i) <= best_split);

        if left_idx.is_empty() || right_idx.is_empty() {
            // Degenerate partition (SAH found no valid split); fall back to
            // an even split so construction always terminates.
            let mut all: Vec<usize> = left_idx.into_iter().chain(right_idx).collect();
            all.sort_by(|&a, &b| {
                Self::centroid(tris, a)[axis]
                    .partial_cmp(&Self::centroid(tris, b)[axis])
                    .unwrap()
            });
            let mid = all.len() / 2;
            let (l, r) = all.split_at(mid);
            return BvhNode::Internal {
                aabb: bounds,
                left: Box::new(Self::build_node(tris, l.to_vec())),
                right: Box::new(Self::build_node(tris, r.to_vec())),
            };
        }

        BvhNode::Internal {
            aabb: bounds,
            left: Box::new(Self::build_node(tris, left_idx)),
            right: Box::new(Self::build_node(tris, right_idx)),
        }
    }

    /// Closest point on any triangle to `p`. Returns the triangle id, the
    /// closest point, and the squared distance. `None` if the BVH is empty.
    pub fn nearest(&self, p: &Point3) -> Option<(u32, Point3, f64)> {
        let root = self.root.as_ref()?;
        let mut best: Option<(u32, Point3, f64)> = None;
        self.nearest_node(root, p, &mut best);
        best
    }

    fn point_box_dist2(p: &Point3, b: &Aabb3) -> f64 {
        let dx = (b.min.x - p.x).max(0.0).max(p.x - b.max.x);
        let dy = (b.min.y - p.y).max(0.0).max(p.y - b.max.y);
        let dz = (b.min.z - p.z).max(0.0).max(p.z - b.max.z);
        dx * dx + dy * dy + dz * dz
    }

    fn nearest_node(&self, node: &BvhNode, p: &Point3, best: &mut Option<(u32, Point3, f64)>) {
        if let Some((_, _, d)) = best {
            if Self::point_box_dist2(p, node.aabb()) > *d {
                return;
            }
        }
        match node {
            BvhNode::Leaf { tris: idxs, .. } => {
                for &i in idxs {
                    let t = &self.tris[i];
                    let (q, d2) = closest_point_on_triangle(p, &t.verts[0], &t.verts[1], &t.verts[2]);
                    if best.map_or(true, |(_, _, bd)| d2 < bd) {
                        *best = Some((t.id, q, d2));
                    }
                }
            }
            BvhNode::Internal { left, right, .. } => {
                let dl = Self::point_box_dist2(p, left.aabb());
                let dr = Self::point_box_dist2(p, right.aabb());
                if dl <= dr {
                    self.nearest_node(left, p, best);
                    self.nearest_node(right, p, best);
                } else {
                    self.nearest_node(right, p, best);
                    self.nearest_node(left, p, best);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tri(id: u32, a: [f64; 3], b: [f64; 3], c: [f64; 3]) -> BvhTriangle {
        BvhTriangle {
            id,
            verts: [
                Point3::new(a[0], a[1], a[2]),
                Point3::new(b[0], b[1], b[2]),
                Point3::new(c[0], c[1], c[2]),
            ],
        }
    }

    #[test]
    fn empty_bvh_has_no_nearest() {
        let bvh = Bvh::build(Vec::new());
        assert!(bvh.nearest(&Point3::new(0.0, 0.0, 0.0)).is_none());
    }

    #[test]
    fn finds_nearest_among_many_triangles() {
        let mut tris = Vec::new();
        for i in 0..200u32 {
            let x = i as f64 * 2.0;
            tris.push(tri(
                i,
                [x, 0.0, 0.0],
                [x + 1.0, 0.0, 0.0],
                [x, 1.0, 0.0],
            ));
        }
        let bvh = Bvh::build(tris);
        let (id, q, d2) = bvh.nearest(&Point3::new(100.3, 0.1, 5.0)).unwrap();
        assert_eq!(id, 50);
        assert!(q.z.abs() < 1e-9);
        assert!(d2 > 0.0);
    }

    #[test]
    fn matches_brute_force_on_random_like_layout() {
        let tris = vec![
            tri(0, [0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            tri(1, [5.0, 5.0, 5.0], [6.0, 5.0, 5.0], [5.0, 6.0, 5.0]),
            tri(2, [-3.0, 0.0, 0.0], [-2.0, 0.0, 0.0], [-3.0, 1.0, 0.0]),
        ];
        let bvh = Bvh::build(tris.clone());
        let p = Point3::new(-2.5, 0.4, 0.0);
        let (bvh_id, _, bvh_d2) = bvh.nearest(&p).unwrap();

        let mut brute: Option<(u32, f64)> = None;
        for t in &tris {
            let (_, d2) = closest_point_on_triangle(&p, &t.verts[0], &t.verts[1], &t.verts[2]);
            if brute.map_or(true, |(_, bd)| d2 < bd) {
                brute = Some((t.id, d2));
            }
        }
        let (brute_id, brute_d2) = brute.unwrap();
        assert_eq!(bvh_id, brute_id);
        assert!((bvh_d2 - brute_d2).abs() < 1e-9);
    }
}

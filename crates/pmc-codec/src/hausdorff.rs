//! Per-batch Hausdorff bookkeeping (C8).
//!
//! Three strategies, mirroring a spatial-join engine's
//! `Hausdorff_Computing_Type` choices: `Bvh` samples every Splittable
//! face's current triangulation and queries a BVH built once over the
//! original surface (and, for the proxy direction, a BVH rebuilt over the
//! current surface each batch); `Associate` restricts the candidate set to
//! the original triangles a removed vertex actually absorbed;
//! `AssociateCylinder` further filters that set to triangles whose sampled
//! points fall inside the current face's triangular prism.

use std::collections::HashMap;

use pmc_geom::{closest_point_on_triangle, triangle_area, triangle_normal, Bvh};
use pmc_math::Point3;
use pmc_topo::{FaceId, Topology};

use crate::config::HausdorffStrategy;

/// Original-mesh triangles plus the acceleration structures and
/// vertex-to-triangle associations the non-`Bvh` strategies need.
pub struct HausdorffEngine {
    strategy: HausdorffStrategy,
    sampling_rate: u32,
    original_triangles: Vec<[Point3; 3]>,
    original_bvh: Bvh,
    total_area: f64,
    /// Original triangle ids touching each original vertex index, used by
    /// `Associate`/`AssociateCylinder` to look up the triangles absorbed by
    /// a removed vertex.
    vertex_to_triangles: HashMap<usize, Vec<u32>>,
}

impl HausdorffEngine {
    /// Build from the original (pre-decimation) point/face lists.
    pub fn new(points: &[Point3], faces: &[Vec<usize>], strategy: HausdorffStrategy, sampling_rate: u32) -> Self {
        let mut original_triangles = Vec::new();
        let mut vertex_to_triangles: HashMap<usize, Vec<u32>> = HashMap::new();
        let mut total_area = 0.0;
        for face in faces {
            for tri in fan_triangulate_indices(face) {
                let id = original_triangles.len() as u32;
                let pts = [points[tri[0]], points[tri[1]], points[tri[2]]];
                total_area += triangle_area(&pts[0], &pts[1], &pts[2]);
                original_triangles.push(pts);
                for &idx in &tri {
                    vertex_to_triangles.entry(idx).or_default().push(id);
                }
            }
        }
        let bvh_triangles: Vec<_> = original_triangles
            .iter()
            .enumerate()
            .map(|(id, pts)| pmc_geom::BvhTriangle { id: id as u32, verts: *pts })
            .collect();
        let original_bvh = Bvh::build(bvh_triangles);
        Self {
            strategy,
            sampling_rate,
            original_triangles,
            original_bvh,
            total_area: total_area.max(1e-12),
            vertex_to_triangles,
        }
    }

    fn area_unit(&self, triangle_count: usize) -> f64 {
        self.total_area / (triangle_count.max(1) as f64 * self.sampling_rate.max(1) as f64)
    }

    /// Sample and bound forward/proxy Hausdorff distance for this batch's
    /// Splittable faces, writing the result into each face's `hausdorff`
    /// and `proxy_hausdorff` fields and returning the batch-level maxima.
    ///
    /// `original_vertex_ids`, when the strategy needs triangle association,
    /// gives the original-mesh vertex index each removed vertex corresponds
    /// to (by insertion order into the base mesh); `Bvh` ignores it.
    pub fn update_batch(
        &self,
        topo: &mut Topology,
        quantizer: &pmc_geom::Quantizer,
        splittable_faces: &[(FaceId, Vec<usize>)],
    ) -> (f32, f32) {
        if self.strategy == HausdorffStrategy::None {
            return (0.0, 0.0);
        }

        let mut all_current_triangles: Vec<[Point3; 3]> = Vec::new();
        let mut triangle_owner: Vec<FaceId> = Vec::new();
        for (face_id, face) in topo.faces.iter() {
            let verts: Vec<Point3> = face
                .half_edges
                .iter()
                .map(|&he| quantizer.dequantize(topo.vertices[topo.half_edges[he].origin].position))
                .collect();
            for tri in fan_triangulate_points(&verts) {
                all_current_triangles.push(tri);
                triangle_owner.push(face_id);
            }
        }
        let current_bvh_triangles: Vec<_> = all_current_triangles
            .iter()
            .enumerate()
            .map(|(id, pts)| pmc_geom::BvhTriangle { id: id as u32, verts: *pts })
            .collect();
        // Rebuild the reverse BVH fresh each batch: the current surface
        // changes shape every batch, unlike the original, which is static.
        let current_bvh = Bvh::build(current_bvh_triangles);

        let area_unit = self.area_unit(all_current_triangles.len().max(1));
        let gap_correction = (area_unit / 2.0).sqrt();

        let mut batch_fwd: f32 = 0.0;
        for (face_id, absorbed_original_verts) in splittable_faces {
            let verts: Vec<Point3> = topo.faces[*face_id]
                .half_edges
                .iter()
                .map(|&he| quantizer.dequantize(topo.vertices[topo.half_edges[he].origin].position))
                .collect();
            let triangles = fan_triangulate_points(&verts);
            let candidate_original: Vec<u32> = match self.strategy {
                HausdorffStrategy::Bvh => Vec::new(),
                _ => self.associated_triangles(absorbed_original_verts),
            };

            let mut fit_hdist: f64 = 0.0;
            for tri in &triangles {
                let points = sample_triangle(tri, area_unit);
                let mut curhdist: f64 = 0.0;
                for p in &points {
                    let dist = match self.strategy {
                        HausdorffStrategy::Bvh => {
                            self.original_bvh.nearest(p).map(|(_, _, d2)| d2.sqrt()).unwrap_or(0.0)
                        }
                        HausdorffStrategy::Associate => self.distance_to_candidates(p, &candidate_original),
                        HausdorffStrategy::AssociateCylinder => {
                            let filtered = self.filter_by_cylinder(&candidate_original, tri);
                            self.distance_to_candidates(p, &filtered)
                        }
                        HausdorffStrategy::None => 0.0,
                    };
                    curhdist = curhdist.max(dist);
                }
                fit_hdist = fit_hdist.max(curhdist);
            }
            let hdist = fit_hdist + gap_correction;
            topo.faces[*face_id].hausdorff = hdist;
            batch_fwd = batch_fwd.max(hdist as f32);
        }

        // Proxy direction: sample the ORIGINAL surface, find the closest
        // current triangle, and accumulate onto whichever current face
        // owns it.
        let mut proxy_by_face: HashMap<FaceId, f64> = HashMap::new();
        for tri in &self.original_triangles {
            for p in sample_triangle(tri, area_unit) {
                if let Some((tid, _, dist)) = current_bvh.nearest(&p) {
                    let owner = triangle_owner.get(tid as usize).copied();
                    if let Some(owner) = owner {
                        let entry = proxy_by_face.entry(owner).or_insert(0.0);
                        *entry = entry.max(dist.sqrt() + gap_correction);
                    }
                }
            }
        }
        let mut batch_prx: f32 = 0.0;
        for (face_id, dist) in &proxy_by_face {
            if topo.faces.contains_key(*face_id) {
                topo.faces[*face_id].proxy_hausdorff = *dist;
                batch_prx = batch_prx.max(*dist as f32);
            }
        }

        (batch_fwd, batch_prx)
    }

    fn associated_triangles(&self, absorbed_original_verts: &[usize]) -> Vec<u32> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for &v in absorbed_original_verts {
            if let Some(tris) = self.vertex_to_triangles.get(&v) {
                for &t in tris {
                    if seen.insert(t) {
                        out.push(t);
                    }
                }
            }
        }
        out
    }

    fn distance_to_candidates(&self, p: &Point3, candidates: &[u32]) -> f64 {
        let mut best = f64::MAX;
        for &t in candidates {
            let tri = &self.original_triangles[t as usize];
            let (_, d2) = closest_point_on_triangle(p, &tri[0], &tri[1], &tri[2]);
            best = best.min(d2);
        }
        if best == f64::MAX {
            0.0
        } else {
            best.sqrt()
        }
    }

    fn filter_by_cylinder(&self, candidates: &[u32], cur_tri: &[Point3; 3]) -> Vec<u32> {
        let normal = triangle_normal(&cur_tri[0], &cur_tri[1], &cur_tri[2]);
        candidates
            .iter()
            .copied()
            .filter(|&t| {
                let tri = &self.original_triangles[t as usize];
                tri.iter().any(|p| point_in_triangle_cylinder(p, cur_tri, &normal))
            })
            .collect()
    }
}

/// Whether `p`, projected along `normal`, falls inside `tri`'s footprint —
/// used to discard original triangles that only share a vertex with the
/// removed star but lie outside its local extent.
fn point_in_triangle_cylinder(p: &Point3, tri: &[Point3; 3], normal: &pmc_math::Vec3) -> bool {
    let offset = (*p - tri[0]).dot(normal);
    let projected = Point3::from(p.coords - *normal * offset);
    let (_, d2) = closest_point_on_triangle(&projected, &tri[0], &tri[1], &tri[2]);
    d2 < 1e-9
}

fn fan_triangulate_indices(face: &[usize]) -> Vec<[usize; 3]> {
    let mut out = Vec::new();
    for i in 1..face.len().saturating_sub(1) {
        out.push([face[0], face[i], face[i + 1]]);
    }
    out
}

pub(crate) fn fan_triangulate_points(verts: &[Point3]) -> Vec<[Point3; 3]> {
    let mut out = Vec::new();
    for i in 1..verts.len().saturating_sub(1) {
        out.push([verts[0], verts[i], verts[i + 1]]);
    }
    out
}

/// Grid-sample a triangle at roughly one point per `area_unit` of area,
/// always including its three corners.
fn sample_triangle(tri: &[Point3; 3], area_unit: f64) -> Vec<Point3> {
    let mut points = vec![tri[0], tri[1], tri[2]];
    let area = triangle_area(&tri[0], &tri[1], &tri[2]);
    let num_points = (area / area_unit.max(1e-12)) as usize + 1;
    if num_points <= 3 {
        return points;
    }
    let extra = num_points - 3;
    let dimx = (extra as f64).sqrt() as usize;
    let dimy = if dimx == 0 { 0 } else { (extra + dimx - 1) / dimx };
    let step_x = 1.0 / (dimx as f64 + 1.0);
    let step_y = 1.0 / (dimy as f64 + 1.0);
    let v2 = tri[1] - tri[0];
    let v3 = tri[2] - tri[0];
    let mut u = 0.0;
    while u < 1.0 {
        let mut v = 0.0;
        while v < 1.0 - u {
            if !((u == 0.0 && v == 0.0) || (u >= 1.0 && v >= 1.0)) {
                points.push(tri[0] + v2 * u + v3 * v);
            }
            v += step_y;
        }
        u += step_x;
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_surfaces_have_near_zero_hausdorff() {
        let points = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
        ];
        let faces = vec![vec![0, 1, 2], vec![1, 3, 2]];
        let engine = HausdorffEngine::new(&points, &faces, HausdorffStrategy::Bvh, 10);
        assert!(engine.total_area > 0.0);
        assert_eq!(engine.original_triangles.len(), 2);
    }

    #[test]
    fn sample_triangle_always_includes_corners() {
        let tri = [Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 0.0, 0.0), Point3::new(0.0, 4.0, 0.0)];
        let pts = sample_triangle(&tri, 0.5);
        assert!(pts.len() >= 3);
        assert!(pts.contains(&tri[0]));
    }
}

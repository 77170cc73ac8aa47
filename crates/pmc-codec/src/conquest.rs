//! Decimation (C5+C6) and undecimation (C7) conquest passes.
//!
//! Both directions drive the same kind of breadth-first walk over a gate
//! queue of half-edges; the difference is only in what happens when a
//! gate's target vertex is found Unconquered: decimation decides via the
//! [`removable`] predicate and performs a [`pmc_topo::Topology::vertex_cut`],
//! undecimation decides by reading one bit from an already-range-decoded
//! [`BatchRecord`] and performs the inverse `insert_vertex_in_face`.

use std::collections::{HashMap, HashSet, VecDeque};

use pmc_geom::{barycenter_ivec3, is_convex, is_planar};
use pmc_math::{IVec3, Tolerance};
use pmc_topo::{FaceId, HalfEdgeId, QueueState, SplitState, VertexId, VertexState};

use crate::error::{CodecError, Result};
use crate::mesh::{CodecMesh, Operation};

/// Fully decided contents of one batch, independent of how it is
/// serialized into the compressed blob. Produced by [`decimation_batch`]
/// (encode) before range-coding, and by range-decoding before being
/// consumed by [`undecimation_batch`] (decode).
#[derive(Debug, Clone, Default)]
pub struct BatchRecord {
    /// Largest geometric deviation predicted across this batch's faces.
    pub max_cut: f32,
    /// Splittable/Unsplittable bit per face visited, in BFS order.
    pub conn_face: Vec<bool>,
    /// Original/Added bit per candidate rim half-edge, in visiting order.
    pub conn_edge: Vec<bool>,
    /// Residual vector per Splittable face, in the same order as
    /// `conn_face`'s `true` entries.
    pub residuals: Vec<IVec3>,
    /// Adaptive quantization-cell tag parallel to `residuals`.
    pub quant_ids: Vec<u32>,
    /// Whether the removed vertex was protruding, parallel to `residuals`.
    /// Transmitted explicitly because the decoder cannot recompute it
    /// before the vertex it describes has been reconstructed.
    pub protruding: Vec<bool>,
    /// Forward Hausdorff bound for this LOD.
    pub hausdorff_fwd: f32,
    /// Proxy Hausdorff bound for this LOD.
    pub hausdorff_prx: f32,
    /// Original-mesh vertex indices (keyed by stable id, which matches the
    /// input OFF vertex index for base-mesh vertices) absorbed into each
    /// Splittable face's removed-vertex region this batch. Consumed only by
    /// the `Associate`/`AssociateCylinder` Hausdorff strategies; the `Bvh`
    /// strategy ignores it.
    pub absorbed_by_face: HashMap<FaceId, Vec<usize>>,
}

/// Degree bounds enforced by the removability predicate.
const MIN_DEGREE: usize = 3;

/// Planarity slack, in lattice cells, allowed before a ring is rejected as
/// non-planar. The quantization step is the finest distinction the lattice
/// can represent, so a fixed epsilon unrelated to it would either reject
/// almost every ring at a coarse bit depth or accept numerical noise at a
/// fine one; a multiple of the step scales with both.
const PLANAR_TOLERANCE_CELLS: f64 = 1.5;

fn ring_vertices(mesh: &CodecMesh, v: VertexId) -> Result<Vec<VertexId>> {
    let spokes = mesh.topo.vertex_outgoing_half_edges(v)?;
    Ok(spokes.iter().map(|&h| mesh.topo.dest(h)).collect())
}

/// Whether `v` may be removed this batch: degree-bounded, independent of
/// already-Conquered neighbors, and its ring is a simple, planar-enough,
/// convex-enough polygon.
pub fn removable(mesh: &CodecMesh, v: VertexId) -> Result<bool> {
    let ring = ring_vertices(mesh, v)?;
    let degree = ring.len();
    if degree < MIN_DEGREE || degree as u32 > mesh.max_vertex_degree {
        return Ok(false);
    }
    for &w in &ring {
        if mesh.topo.vertices[w].state == VertexState::Conquered {
            return Ok(false);
        }
    }
    let mut seen = HashSet::new();
    if !ring.iter().all(|w| seen.insert(*w)) {
        return Ok(false);
    }
    let ring_pts: Vec<_> = ring
        .iter()
        .map(|&w| mesh.quantizer.dequantize(mesh.topo.vertices[w].position))
        .collect();
    let tol = Tolerance { linear: mesh.quantizer.max_step() * PLANAR_TOLERANCE_CELLS };
    if !is_planar(&ring_pts, &tol) {
        return Ok(false);
    }
    if !is_convex(&ring_pts) {
        return Ok(false);
    }
    Ok(true)
}

/// Whether the removed vertex's position lies on the outward side of its
/// ring's mean plane. Transmitted per removed vertex (see
/// [`BatchRecord::protruding`]) rather than recomputed on decode, since
/// decode only learns the position after applying the residual this flag
/// helps interpret.
fn compute_protruding(ring_pts: &[pmc_math::Point3], removed: &pmc_math::Point3) -> bool {
    if ring_pts.len() < 3 {
        return true;
    }
    let normal = pmc_geom::triangle_normal(&ring_pts[0], &ring_pts[1], &ring_pts[2]);
    let center = pmc_geom::barycenter(ring_pts);
    (removed - center).dot(&normal) >= 0.0
}

struct GateQueues {
    primary: VecDeque<HalfEdgeId>,
    problematic: VecDeque<HalfEdgeId>,
}

impl GateQueues {
    fn new() -> Self {
        Self { primary: VecDeque::new(), problematic: VecDeque::new() }
    }

    fn push(&mut self, mesh: &mut CodecMesh, h: HalfEdgeId) {
        if mesh.topo.half_edges[h].queue_state == QueueState::NotYetInQueue {
            mesh.topo.half_edges[h].queue_state = QueueState::InQueue;
            self.primary.push_back(h);
        }
    }

    fn push_face_neighbors(&mut self, mesh: &mut CodecMesh, face: FaceId) {
        let boundary = mesh.topo.faces[face].half_edges.clone();
        for e in boundary {
            let t = mesh.topo.half_edges[e].twin;
            self.push(mesh, t);
        }
    }

    fn pop(&mut self, mesh: &CodecMesh) -> Option<(HalfEdgeId, bool)> {
        loop {
            if let Some(h) = self.primary.pop_front() {
                if mesh.topo.half_edges.contains_key(h) {
                    return Some((h, false));
                }
                continue;
            }
            if let Some(h) = self.problematic.pop_front() {
                if mesh.topo.half_edges.contains_key(h) {
                    return Some((h, true));
                }
                continue;
            }
            return None;
        }
    }
}

/// Run one decimation batch (C5+C6, geometry side only — no range coding
/// yet). Returns `None` once no removable vertex remains.
pub fn decimation_batch(mesh: &mut CodecMesh) -> Result<Option<BatchRecord>> {
    mesh.topo.reset_pass_flags();
    let Some(seed) = mesh.pick_seed() else { return Ok(None) };
    mesh.step_operation(Operation::DecimationConquest);

    let mut queues = GateQueues::new();
    let origin = mesh.topo.half_edges[seed].origin;
    mesh.topo.vertices[origin].state = VertexState::Conquered;
    queues.push(mesh, seed);

    let mut record = BatchRecord::default();
    let mut removed_any = false;
    let mut candidate_edges: Vec<HalfEdgeId> = Vec::new();

    while let Some((h, from_problematic)) = queues.pop(mesh) {
        mesh.topo.half_edges[h].queue_state = QueueState::NoLongerInQueue;
        let face = mesh.topo.half_edges[h].face;
        if mesh.topo.faces[face].processed {
            continue;
        }
        let v = mesh.topo.dest(h);
        let v_conquered = mesh.topo.vertices[v].state == VertexState::Conquered;

        if v_conquered && !from_problematic && !queues.primary.is_empty() {
            mesh.topo.half_edges[h].queue_state = QueueState::InProblematicQueue;
            queues.problematic.push_back(h);
            continue;
        }

        if v_conquered {
            mesh.topo.faces[face].processed = true;
            mesh.topo.faces[face].split_state = SplitState::Unsplittable;
            record.conn_face.push(false);
            queues.push_face_neighbors(mesh, face);
            continue;
        }

        if removable(mesh, v)? {
            removed_any = true;
            mesh.step_operation(Operation::RemovedVertexCoding);
            mesh.topo.vertices[v].state = VertexState::Conquered;
            record.conn_face.push(true);

            let ring_positions: Vec<IVec3> = mesh
                .topo
                .vertex_outgoing_half_edges(v)?
                .iter()
                .map(|&he| mesh.topo.vertices[mesh.topo.dest(he)].position)
                .collect();
            let ring_pts: Vec<_> = ring_positions.iter().map(|&p| mesh.quantizer.dequantize(p)).collect();
            let removed_pt = mesh.quantizer.dequantize(mesh.topo.vertices[v].position);
            let protruding = compute_protruding(&ring_pts, &removed_pt);
            let ring_stable_ids: Vec<usize> = mesh
                .topo
                .vertex_outgoing_half_edges(v)?
                .iter()
                .map(|&he| mesh.topo.vertices[mesh.topo.dest(he)].stable_id as usize)
                .collect();
            let removed_stable_id = mesh.topo.vertices[v].stable_id as usize;

            let cut = mesh.topo.vertex_cut(h)?;
            let phat = barycenter_ivec3(&ring_positions);
            let raw_residual = cut.removed_position.sub(phat);
            let stored_residual = if protruding { raw_residual } else { raw_residual.neg() };

            let f = cut.face;
            mesh.topo.faces[f].processed = true;
            mesh.topo.faces[f].split_state = SplitState::Splittable;
            mesh.topo.faces[f].removed_vertex_pos = Some(cut.removed_position);
            mesh.topo.faces[f].residual = Some(stored_residual);
            let quant_id = if mesh.adaptive_quant { (cut.rim.len() as u32).min(63) } else { 0 };
            mesh.topo.faces[f].quant_cell_id = quant_id;

            let predicted_pt = mesh.quantizer.dequantize(phat);
            let max_cut_f = (removed_pt - predicted_pt).norm();
            mesh.topo.faces[f].max_cut = max_cut_f;
            record.max_cut = record.max_cut.max(max_cut_f as f32);

            record.residuals.push(stored_residual);
            record.quant_ids.push(quant_id);
            record.protruding.push(protruding);
            mesh.touch_vertices(1);
            let mut absorbed = ring_stable_ids;
            absorbed.push(removed_stable_id);
            record.absorbed_by_face.insert(f, absorbed);

            for &he in &cut.rim {
                queues.push(mesh, he);
            }
            candidate_edges.extend(cut.rim.iter().copied());
        } else {
            mesh.topo.faces[face].processed = true;
            mesh.topo.faces[face].split_state = SplitState::Unsplittable;
            record.conn_face.push(false);
            queues.push_face_neighbors(mesh, face);
        }
    }

    if !removed_any {
        return Ok(None);
    }

    // Inserted-edge coding: classify each candidate rim half-edge. Added
    // (false) iff its twin also belongs to a face this batch merged via
    // vertex_cut (a hole-to-hole seam); Original (true) otherwise.
    mesh.step_operation(Operation::InsertedEdgeCoding);
    let splittable_this_batch: HashSet<FaceId> = mesh
        .topo
        .faces
        .iter()
        .filter(|(_, f)| f.split_state == SplitState::Splittable)
        .map(|(id, _)| id)
        .collect();
    for &e in &candidate_edges {
        let twin_face = mesh.topo.half_edges[mesh.topo.half_edges[e].twin].face;
        let original = !splittable_this_batch.contains(&twin_face);
        record.conn_edge.push(original);
    }

    mesh.step_operation(Operation::Idle);
    Ok(Some(record))
}

/// A reinserted vertex's residual, adaptive quant-cell tag, and protruding
/// flag, read live from the bitstream at the moment the BFS needs them.
pub type VertexData = (IVec3, u32, bool);

/// Run one undecimation batch (C7). Unlike encode's `decimation_batch`,
/// this cannot consume a pre-parsed [`BatchRecord`]: which face the BFS
/// visits next depends on the topology mutations of every prior decision
/// in the same batch, so each face's Splittable/Unsplittable bit (and, if
/// Splittable, its residual/quant-id/protruding data) must be pulled from
/// the range decoder at the exact point the traversal needs it. `conn_edge`
/// has no such dependency — it is applied in a second pass by the caller,
/// mirroring the encode-side `InsertedEdgeCoding` phase split.
pub fn undecimation_batch(
    mesh: &mut CodecMesh,
    mut next_face_bit: impl FnMut() -> Result<bool>,
    mut next_vertex_data: impl FnMut() -> Result<VertexData>,
) -> Result<Vec<HalfEdgeId>> {
    mesh.topo.reset_pass_flags();
    let Some(seed) = mesh.pick_seed() else {
        return Err(CodecError::PredicateFailure("no seed half-edge available".into()));
    };
    mesh.step_operation(Operation::UndecimationConquest);

    let mut queues = GateQueues::new();
    let origin = mesh.topo.half_edges[seed].origin;
    mesh.topo.vertices[origin].state = VertexState::Conquered;
    queues.push(mesh, seed);

    let mut candidate_edges: Vec<HalfEdgeId> = Vec::new();

    while let Some((h, from_problematic)) = queues.pop(mesh) {
        mesh.topo.half_edges[h].queue_state = QueueState::NoLongerInQueue;
        let face = mesh.topo.half_edges[h].face;
        if mesh.topo.faces[face].processed {
            continue;
        }
        let v = mesh.topo.dest(h);
        let v_conquered = mesh.topo.vertices[v].state == VertexState::Conquered;

        if v_conquered && !from_problematic && !queues.primary.is_empty() {
            mesh.topo.half_edges[h].queue_state = QueueState::InProblematicQueue;
            queues.problematic.push_back(h);
            continue;
        }
        if v_conquered {
            // Mirrors encode's own `v_conquered` branch, which pushes a
            // `false` onto `conn_face` for this same face before moving on
            // (see `decimation_batch` above): that bit must be consumed
            // here too, or every subsequent face bit in this batch reads
            // one position behind where encode wrote it.
            let _ = next_face_bit()?;
            mesh.topo.faces[face].processed = true;
            mesh.topo.faces[face].split_state = SplitState::Unsplittable;
            queues.push_face_neighbors(mesh, face);
            continue;
        }

        let is_splittable = next_face_bit()?;

        if is_splittable {
            let (stored_residual, quant_id, protruding) = next_vertex_data()?;
            let _ = quant_id;

            let boundary = mesh.topo.faces[face].half_edges.clone();
            let ring_positions: Vec<IVec3> =
                boundary.iter().map(|&he| mesh.topo.vertices[mesh.topo.half_edges[he].origin].position).collect();
            let phat = barycenter_ivec3(&ring_positions);
            let residual = if protruding { stored_residual } else { stored_residual.neg() };
            let new_pos = phat.add(residual);

            let ins = mesh.topo.insert_vertex_in_face(face, new_pos)?;
            mesh.topo.vertices[ins.vertex].protruding = protruding;
            mesh.topo.vertices[ins.vertex].state = VertexState::Conquered;
            mesh.touch_vertices(1);

            for &e in &boundary {
                queues.push(mesh, e);
            }
            candidate_edges.extend(boundary.iter().copied());
        } else {
            mesh.topo.faces[face].processed = true;
            mesh.topo.faces[face].split_state = SplitState::Unsplittable;
            queues.push_face_neighbors(mesh, face);
        }
    }

    Ok(candidate_edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmc_geom::{Aabb3, Quantizer};
    use pmc_math::Point3;
    use pmc_topo::Topology;

    fn octahedron() -> CodecMesh {
        let pts = vec![
            IVec3::new(0, 0, 10),
            IVec3::new(10, 0, 0),
            IVec3::new(0, 10, 0),
            IVec3::new(-10, 0, 0),
            IVec3::new(0, -10, 0),
            IVec3::new(0, 0, -10),
        ];
        let faces = vec![
            vec![0, 1, 2],
            vec![0, 2, 3],
            vec![0, 3, 4],
            vec![0, 4, 1],
            vec![5, 2, 1],
            vec![5, 3, 2],
            vec![5, 4, 3],
            vec![5, 1, 4],
        ];
        let topo = Topology::from_indexed(&pts, &faces).unwrap();
        let bbox = Aabb3 { min: Point3::new(-10.0, -10.0, -10.0), max: Point3::new(10.0, 10.0, 10.0) };
        let q = Quantizer::new(&bbox, 12);
        CodecMesh::new(topo, q, 10, true)
    }

    #[test]
    fn tetrahedron_has_no_removable_vertex() {
        let pts = vec![
            IVec3::new(0, 0, 0),
            IVec3::new(10, 0, 0),
            IVec3::new(0, 10, 0),
            IVec3::new(0, 0, 10),
        ];
        let faces = vec![vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 3]];
        let topo = Topology::from_indexed(&pts, &faces).unwrap();
        let bbox = Aabb3 { min: Point3::new(0.0, 0.0, 0.0), max: Point3::new(10.0, 10.0, 10.0) };
        let q = Quantizer::new(&bbox, 12);
        let mut mesh = CodecMesh::new(topo, q, 10, true);
        assert!(decimation_batch(&mut mesh).unwrap().is_none());
    }

    #[test]
    fn octahedron_decimates_and_undoes() {
        let mut mesh = octahedron();
        let record = decimation_batch(&mut mesh).unwrap().unwrap();
        assert!(!record.residuals.is_empty());
        assert_eq!(record.residuals.len(), record.quant_ids.len());
        assert_eq!(record.residuals.len(), record.protruding.len());
        assert!(mesh.topo.vertex_count() < 6);
        assert_eq!(mesh.vertices_touched, record.residuals.len() as u64);
        assert_eq!(mesh.operation, Operation::Idle);
    }

    #[test]
    fn disabling_adaptive_quant_forces_a_constant_bucket() {
        let mut mesh = octahedron();
        mesh.adaptive_quant = false;
        let record = decimation_batch(&mut mesh).unwrap().unwrap();
        assert!(record.quant_ids.iter().all(|&id| id == 0));
    }

    #[test]
    fn conn_face_bit_count_matches_between_encode_and_a_conquered_replay() {
        // Every face this batch visits pushes exactly one `conn_face` bit on
        // the encode side (Splittable, Unsplittable, or the already-conquered
        // shortcut at line ~187); the decode side must consume exactly as
        // many to stay aligned on the next batch's bits.
        let mut mesh = octahedron();
        let record = decimation_batch(&mut mesh).unwrap().unwrap();
        let mut bits = record.conn_face.clone().into_iter();
        let next_face_bit = move || -> Result<bool> { Ok(bits.next().unwrap()) };
        let mut residuals = record.residuals.iter();
        let mut quant_ids = record.quant_ids.iter();
        let mut protruding = record.protruding.iter();
        let next_vertex_data = move || -> Result<VertexData> {
            Ok((*residuals.next().unwrap(), *quant_ids.next().unwrap(), *protruding.next().unwrap()))
        };

        let mut decode_mesh = octahedron();
        let rim = undecimation_batch(&mut decode_mesh, next_face_bit, next_vertex_data).unwrap();
        assert_eq!(rim.len(), record.conn_edge.len());
        assert_eq!(decode_mesh.topo.vertex_count(), mesh.topo.vertex_count());
    }
}

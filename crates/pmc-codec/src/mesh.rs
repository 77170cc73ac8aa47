//! Operation state machine (C9) and the mesh wrapper conquest passes drive.

use pmc_geom::Quantizer;
use pmc_topo::{HalfEdgeId, Topology, VertexId};

/// Phase of the per-batch operation state machine (§4.8).
///
/// Encode drives `Idle -> DecimationConquest -> RemovedVertexCoding ->
/// InsertedEdgeCoding -> Idle`; decode drives `Idle -> UndecimationConquest
/// -> InsertedEdgeDecoding -> Idle`. Each transition is one synchronous
/// `step_operation` call — no operation suspends mid-phase, matching the
/// single-threaded, non-blocking resource model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// No batch in progress.
    Idle,
    /// Encode: selecting the independent removable-vertex set.
    DecimationConquest,
    /// Encode: serializing residuals and quant-cell ids for Splittable faces.
    RemovedVertexCoding,
    /// Encode: serializing Original/Added bits for candidate rim edges.
    InsertedEdgeCoding,
    /// Decode: reinserting vertices, mirroring C5+C6 in one traversal.
    UndecimationConquest,
    /// Decode: applying the decoded Original/Added classification.
    InsertedEdgeDecoding,
}

/// Shared mesh state threaded through the conquest passes.
pub struct CodecMesh {
    /// The half-edge arena.
    pub topo: Topology,
    /// Maps float positions to/from the lattice.
    pub quantizer: Quantizer,
    /// Degree ceiling the removability predicate enforces.
    pub max_vertex_degree: u32,
    /// Current operation-state-machine phase.
    pub operation: Operation,
    /// Running count of vertices removed so far (encode) or reinserted so
    /// far (decode), across all batches.
    pub vertices_touched: u64,
    /// Whether the residual quant-cell id is derived from local mesh
    /// complexity or left at a constant bucket (§6 `adaptive_quant`).
    pub adaptive_quant: bool,
}

impl CodecMesh {
    /// Wrap a topology for conquest, in the `Idle` phase.
    pub fn new(topo: Topology, quantizer: Quantizer, max_vertex_degree: u32, adaptive_quant: bool) -> Self {
        Self {
            topo,
            quantizer,
            max_vertex_degree,
            operation: Operation::Idle,
            vertices_touched: 0,
            adaptive_quant,
        }
    }

    /// Drive the C9 operation state machine to `next`. A thin setter, but
    /// it is the single place every conquest phase transition goes through,
    /// so the sequence of phases a run visits can be inspected or asserted
    /// on without threading extra bookkeeping through each pass.
    pub fn step_operation(&mut self, next: Operation) {
        self.operation = next;
    }

    /// Record `n` more vertices removed (encode) or reinserted (decode).
    pub fn touch_vertices(&mut self, n: u64) {
        self.vertices_touched += n;
    }

    /// Deterministic seed half-edge for this batch's conquest: the
    /// half-edge, among all outgoing half-edges of the lattice-lexicographically
    /// smallest vertex, whose destination is itself lattice-lexicographically
    /// smallest. Depends only on current vertex positions, which encode and
    /// decode agree on exactly at every LOD (P3) — unlike an arena insertion
    /// index, which diverges once decode's vertex counter runs ahead of
    /// encode's original numbering.
    pub fn pick_seed(&self) -> Option<HalfEdgeId> {
        let v0 = self.lexicographically_smallest_vertex()?;
        let spokes = self.topo.vertex_outgoing_half_edges(v0).ok()?;
        spokes.into_iter().min_by_key(|&h| {
            let d = self.topo.dest(h);
            lattice_key(self.topo.vertices[d].position)
        })
    }

    fn lexicographically_smallest_vertex(&self) -> Option<VertexId> {
        self.topo
            .vertices
            .iter()
            .min_by_key(|(_, v)| lattice_key(v.position))
            .map(|(id, _)| id)
    }
}

fn lattice_key(p: pmc_math::IVec3) -> (i64, i64, i64) {
    (p.x, p.y, p.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmc_geom::Aabb3;
    use pmc_math::{IVec3, Point3};

    fn tetra_topo() -> Topology {
        let pts = vec![
            IVec3::new(0, 0, 0),
            IVec3::new(10, 0, 0),
            IVec3::new(0, 10, 0),
            IVec3::new(0, 0, 10),
        ];
        let faces = vec![vec![0, 2, 1], vec![0, 1, 3], vec![0, 3, 2], vec![1, 2, 3]];
        Topology::from_indexed(&pts, &faces).unwrap()
    }

    #[test]
    fn seed_picks_origin_vertex_first() {
        let topo = tetra_topo();
        let bbox = Aabb3 { min: Point3::new(0.0, 0.0, 0.0), max: Point3::new(10.0, 10.0, 10.0) };
        let q = Quantizer::new(&bbox, 12);
        let mesh = CodecMesh::new(topo, q, 10, true);
        let seed = mesh.pick_seed().unwrap();
        assert_eq!(mesh.topo.half_edges[seed].origin, mesh.lexicographically_smallest_vertex().unwrap());
    }
}

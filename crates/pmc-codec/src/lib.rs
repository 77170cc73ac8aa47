#![warn(missing_docs)]

//! Progressive mesh compression (C9): encodes a closed 2-manifold triangle
//! mesh into a compressed blob that can be decoded incrementally, from a
//! coarse base mesh up through successively finer levels of detail, with a
//! per-level Hausdorff-distance bound attached to each level.
//!
//! [`encode`] drives the decimation conquest engine ([`conquest`]) batch by
//! batch, range-coding each batch's connectivity and geometry into
//! [`blob`]'s wire format. [`Decoder`] parses a blob and replays batches
//! through the inverse undecimation conquest, one [`Decoder::advance_to`]
//! call at a time.

mod blob;
pub mod config;
mod conquest;
mod error;
mod hausdorff;
mod mesh;
pub mod off;

pub use config::{EncodeConfig, HausdorffStrategy};
pub use error::{CodecError, Result};
pub use pmc_math::Point3;

use std::collections::HashMap;

use pmc_geom::{Aabb3, Bvh, BvhTriangle, Quantizer};
use pmc_math::IVec3;
use pmc_topo::{Topology, VertexId};

use conquest::{decimation_batch, undecimation_batch, BatchRecord, VertexData};
use mesh::{CodecMesh, Operation};

/// Compress an OFF-format mesh into a progressive blob.
///
/// The input must describe a single-component, closed 2-manifold triangle
/// mesh; anything else is rejected as [`CodecError::InvalidMesh`] (surfaced
/// from [`pmc_topo::TopoError`] by [`Topology::from_indexed`]).
pub fn encode(off_text: &str, config: &EncodeConfig) -> Result<Vec<u8>> {
    let (points, faces) = off::read(off_text)?;
    if points.is_empty() {
        return Err(CodecError::InvalidMesh("mesh has no vertices".into()));
    }

    let mut bbox = Aabb3::empty();
    for p in &points {
        bbox.include_point(p);
    }
    let quantizer = Quantizer::new(&bbox, config.quant_bits);

    let lattice_points: Vec<IVec3> = points.iter().map(|p| quantizer.quantize(p)).collect::<std::result::Result<_, _>>()?;
    let topo = Topology::from_indexed(&lattice_points, &faces)?;
    let init_verts = topo.vertex_count() as u32;
    let init_faces = topo.face_count() as u32;
    log::debug!("encode: base mesh has {init_verts} vertices, {init_faces} faces");

    let engine = hausdorff::HausdorffEngine::new(&points, &faces, config.hausdorff_strategy, config.sampling_rate);
    let mut codec_mesh = CodecMesh::new(topo, quantizer, config.max_vertex_degree, config.adaptive_quant);

    let mut records: Vec<BatchRecord> = Vec::new();
    loop {
        if let Some(cap) = config.decimation_cap {
            if records.len() as u32 >= cap {
                log::debug!("encode: stopping at decimation cap {cap}");
                break;
            }
        }
        let Some(mut record) = decimation_batch(&mut codec_mesh)? else {
            break;
        };

        let splittable_faces: Vec<_> =
            record.absorbed_by_face.iter().map(|(&face, ids)| (face, ids.clone())).collect();
        let (h_fwd, h_prx) =
            engine.update_batch(&mut codec_mesh.topo, &codec_mesh.quantizer, &splittable_faces);
        record.hausdorff_fwd = h_fwd;
        record.hausdorff_prx = h_prx;

        log::debug!(
            "encode: batch {} removed {} vertices, max_cut={:.6}, hausdorff_fwd={:.6}",
            records.len(),
            record.residuals.len(),
            record.max_cut,
            record.hausdorff_fwd
        );
        records.push(record);
    }
    log::info!(
        "encode: {} batches, base mesh {} vertices / {} faces",
        records.len(),
        codec_mesh.topo.vertex_count(),
        codec_mesh.topo.face_count()
    );

    let alpha_beta_min = records
        .iter()
        .flat_map(|r| r.residuals.iter())
        .map(|r| r.max_abs())
        .max()
        .unwrap_or(0)
        .max(1) as i32;

    let mut out = Vec::new();
    let header = blob::Header {
        bbmin: bbox.min,
        bbmax: bbox.max,
        quant_bits: config.quant_bits,
        alpha_beta_min,
        n_batches: records.len() as u32,
        init_verts,
        init_faces,
    };
    blob::write_header(&mut out, &header);
    blob::write_base_mesh(&mut out, &codec_mesh.topo, &codec_mesh.quantizer);
    // Batches replay coarse-to-fine on decode, the reverse of the
    // fine-to-coarse order they were produced in here.
    for record in records.iter().rev() {
        let bytes = blob::write_batch(record, alpha_beta_min)?;
        out.extend_from_slice(&bytes);
    }

    Ok(out)
}

/// Degree ceiling passed to the reconstructed mesh's [`CodecMesh`] during
/// decode. Undecimation never calls [`conquest::removable`], so this value
/// is never actually consulted; it exists only because [`CodecMesh::new`]
/// takes one.
const DECODE_DEGREE_PLACEHOLDER: u32 = u32::MAX;

/// `adaptive_quant` passed to the reconstructed mesh's [`CodecMesh`] during
/// decode. Undecimation reads `quant_cell_id` straight off the wire (see
/// [`conquest::undecimation_batch`]'s `next_vertex_data`) and never derives
/// one itself, so this flag has no effect on decode; it exists only because
/// [`CodecMesh::new`] takes one.
const DECODE_ADAPTIVE_QUANT_PLACEHOLDER: bool = false;

/// Incrementally reconstructs a mesh from a blob written by [`encode`].
///
/// A freshly [`Decoder::open`]ed decoder sits at level of detail 0 (the
/// coarsest, base mesh). [`Decoder::advance_to`] replays batches forward,
/// each one reinserting vertices removed at the corresponding encode-time
/// decimation batch, increasing the level of detail until it reaches
/// [`Decoder::lod_count`], the original fully detailed mesh.
pub struct Decoder {
    header: blob::Header,
    parsed_batches: Vec<blob::ParsedBatch>,
    alpha_beta_min: i32,
    mesh: CodecMesh,
    applied: usize,
    fwd_so_far: f32,
    prx_so_far: f32,
}

impl Decoder {
    /// Parse a compressed blob and build the base (coarsest) mesh.
    pub fn open(blob_bytes: &[u8]) -> Result<Self> {
        let parsed = blob::parse(blob_bytes)?;
        let bbox = Aabb3 { min: parsed.header.bbmin, max: parsed.header.bbmax };
        let quantizer = Quantizer::new(&bbox, parsed.header.quant_bits);
        let lattice_points: Vec<IVec3> =
            parsed.base_points.iter().map(|p| quantizer.quantize(p)).collect::<std::result::Result<_, _>>()?;
        let topo = Topology::from_indexed(&lattice_points, &parsed.base_faces)?;
        log::debug!(
            "decode: opened blob with {} batches, base mesh {} vertices / {} faces",
            parsed.header.n_batches,
            topo.vertex_count(),
            topo.face_count()
        );
        let mesh = CodecMesh::new(
            topo,
            quantizer,
            DECODE_DEGREE_PLACEHOLDER,
            DECODE_ADAPTIVE_QUANT_PLACEHOLDER,
        );
        Ok(Self {
            alpha_beta_min: parsed.header.alpha_beta_min,
            header: parsed.header,
            parsed_batches: parsed.batches,
            mesh,
            applied: 0,
            fwd_so_far: 0.0,
            prx_so_far: 0.0,
        })
    }

    /// Number of levels of detail beyond the base mesh; the fully detailed
    /// mesh sits at `lod_count()`.
    pub fn lod_count(&self) -> u32 {
        self.parsed_batches.len() as u32
    }

    /// Current level of detail (number of batches applied so far).
    pub fn current_lod(&self) -> u32 {
        self.applied as u32
    }

    /// Replay batches forward until `lod` levels of detail have been
    /// applied. Levels of detail can only move forward: rewinding would
    /// require redecoding from [`Decoder::open`], since undecimation
    /// mutates the mesh in place and has no inverse.
    pub fn advance_to(&mut self, lod: u32) -> Result<()> {
        let target = lod as usize;
        if target > self.parsed_batches.len() {
            return Err(CodecError::PredicateFailure(format!(
                "requested lod {target} exceeds the {} available",
                self.parsed_batches.len()
            )));
        }
        if target < self.applied {
            return Err(CodecError::PredicateFailure(
                "decoder cannot rewind to an earlier level of detail".into(),
            ));
        }
        while self.applied < target {
            self.apply_one_batch()?;
        }
        Ok(())
    }

    fn apply_one_batch(&mut self) -> Result<()> {
        let batch = &self.parsed_batches[self.applied];
        let alpha_beta_min = self.alpha_beta_min;
        let alphabet = blob::residual_alphabet_size(alpha_beta_min);

        let mut face_dec = pmc_coder::RangeDecoder::new(&batch.conn_face_bytes);
        let mut face_model = pmc_coder::AdaptiveModel::new(2);
        let mut geom_dec = pmc_coder::RangeDecoder::new(&batch.geom_bytes);
        let mut quant_model = pmc_coder::AdaptiveModel::new(blob::QUANT_ID_ALPHABET);
        let mut protruding_model = pmc_coder::AdaptiveModel::new(2);
        let mut rx_model = pmc_coder::AdaptiveModel::new(alphabet);
        let mut ry_model = pmc_coder::AdaptiveModel::new(alphabet);
        let mut rz_model = pmc_coder::AdaptiveModel::new(alphabet);

        let next_face_bit = || -> Result<bool> { Ok(face_model.decode(&mut face_dec)? == 1) };
        let next_vertex_data = || -> Result<VertexData> {
            let qid = quant_model.decode(&mut geom_dec)? as u32;
            let protruding = protruding_model.decode(&mut geom_dec)? == 1;
            let x = rx_model.decode(&mut geom_dec)? as i64 - alpha_beta_min as i64;
            let y = ry_model.decode(&mut geom_dec)? as i64 - alpha_beta_min as i64;
            let z = rz_model.decode(&mut geom_dec)? as i64 - alpha_beta_min as i64;
            Ok((IVec3::new(x, y, z), qid, protruding))
        };

        let candidate_edges = undecimation_batch(&mut self.mesh, next_face_bit, next_vertex_data)?;
        if candidate_edges.len() != batch.rim_count as usize {
            return Err(CodecError::CorruptedStream(format!(
                "batch {} declared {} rim edges, traversal produced {}",
                self.applied,
                batch.rim_count,
                candidate_edges.len()
            )));
        }

        self.mesh.step_operation(Operation::InsertedEdgeDecoding);
        let mut edge_dec = pmc_coder::RangeDecoder::new(&batch.conn_edge_bytes);
        let mut edge_model = pmc_coder::AdaptiveModel::new(2);
        for &e in &candidate_edges {
            let original = edge_model.decode(&mut edge_dec)? == 1;
            if !original && self.mesh.topo.half_edges.contains_key(e) {
                self.mesh.topo.join_face(e)?;
            }
        }
        self.mesh.step_operation(Operation::Idle);

        self.fwd_so_far = self.fwd_so_far.max(batch.hausdorff_fwd);
        self.prx_so_far = self.prx_so_far.max(batch.hausdorff_prx);
        self.applied += 1;
        log::debug!(
            "decode: applied batch {}/{}, mesh now {} vertices / {} faces",
            self.applied,
            self.parsed_batches.len(),
            self.mesh.topo.vertex_count(),
            self.mesh.topo.face_count()
        );
        Ok(())
    }

    /// Current mesh's vertex positions, dequantized to float.
    pub fn vertices(&self) -> Vec<Point3> {
        self.mesh.topo.vertices.iter().map(|(_, v)| self.mesh.quantizer.dequantize(v.position)).collect()
    }

    /// Current mesh's faces, as vertex indices into [`Decoder::vertices`].
    pub fn faces(&self) -> Vec<Vec<usize>> {
        let index_of: HashMap<VertexId, usize> =
            self.mesh.topo.vertices.iter().enumerate().map(|(i, (id, _))| (id, i)).collect();
        self.mesh
            .topo
            .faces
            .iter()
            .map(|(_, f)| f.half_edges.iter().map(|&he| index_of[&self.mesh.topo.half_edges[he].origin]).collect())
            .collect()
    }

    /// Serialize the current mesh back to OFF text.
    pub fn to_off(&self) -> String {
        off::write(&self.vertices(), &self.faces())
    }

    /// Worst-case forward Hausdorff distance (approximation -> original)
    /// accumulated by every batch applied so far.
    pub fn hausdorff(&self) -> f32 {
        self.fwd_so_far
    }

    /// Worst-case proxy Hausdorff distance (original -> approximation)
    /// accumulated by every batch applied so far.
    pub fn proxy_hausdorff(&self) -> f32 {
        self.prx_so_far
    }

    /// Upper bound on how much the mesh can still change reconstructing
    /// from `lod` up to full detail: the largest per-batch geometric
    /// deviation recorded for any batch at or beyond `lod`. Zero once
    /// `lod == lod_count()`.
    pub fn max_cut(&self, lod: u32) -> f32 {
        self.parsed_batches[lod as usize..].iter().map(|b| b.max_cut).fold(0.0, f32::max)
    }

    /// The bounding box [`encode`] quantized positions against.
    pub fn bounding_box(&self) -> (Point3, Point3) {
        (self.header.bbmin, self.header.bbmax)
    }
}

fn current_triangles(decoder: &Decoder) -> Vec<[Point3; 3]> {
    let mut out = Vec::new();
    for (_, f) in decoder.mesh.topo.faces.iter() {
        let verts: Vec<Point3> = f
            .half_edges
            .iter()
            .map(|&he| {
                decoder
                    .mesh
                    .quantizer
                    .dequantize(decoder.mesh.topo.vertices[decoder.mesh.topo.half_edges[he].origin].position)
            })
            .collect();
        out.extend(hausdorff::fan_triangulate_points(&verts));
    }
    out
}

fn max_nearest_distance(tris: &[[Point3; 3]], bvh: &Bvh) -> f64 {
    let mut worst = 0.0f64;
    for tri in tris {
        for corner in tri {
            if let Some((_, _, d2)) = bvh.nearest(corner) {
                worst = worst.max(d2.sqrt());
            }
        }
    }
    worst
}

fn build_bvh(tris: &[[Point3; 3]]) -> Bvh {
    let bvh_tris = tris.iter().enumerate().map(|(i, pts)| BvhTriangle { id: i as u32, verts: *pts }).collect();
    Bvh::build(bvh_tris)
}

/// Sampled two-sided distance bound `[lo, hi]` between two decoders' current
/// meshes (which may sit at different levels of detail, or have come from
/// different blobs entirely). Corner-sampled, unlike the internal per-batch
/// Hausdorff engine's area-weighted grid sampling: a lighter-weight estimate
/// intended for comparing two already-reconstructed meshes, not for driving
/// compression decisions.
pub fn distance_range(a: &Decoder, b: &Decoder) -> [f64; 2] {
    let tris_a = current_triangles(a);
    let tris_b = current_triangles(b);
    if tris_a.is_empty() || tris_b.is_empty() {
        return [0.0, 0.0];
    }
    let bvh_a = build_bvh(&tris_a);
    let bvh_b = build_bvh(&tris_b);
    let d_ab = max_nearest_distance(&tris_a, &bvh_b);
    let d_ba = max_nearest_distance(&tris_b, &bvh_a);
    [d_ab.min(d_ba), d_ab.max(d_ba)]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tetrahedron_off() -> &'static str {
        "OFF\n4 4 0\n0 0 0\n10 0 0\n0 10 0\n0 0 10\n3 0 2 1\n3 0 1 3\n3 0 3 2\n3 1 2 3\n"
    }

    fn octahedron_off() -> &'static str {
        "OFF\n6 8 0\n\
         0 0 10\n10 0 0\n0 10 0\n-10 0 0\n0 -10 0\n0 0 -10\n\
         3 0 1 2\n3 0 2 3\n3 0 3 4\n3 0 4 1\n\
         3 5 2 1\n3 5 3 2\n3 5 4 3\n3 5 1 4\n"
    }

    #[test]
    fn tetrahedron_has_no_batches() {
        let config = EncodeConfig::default();
        let blob = encode(tetrahedron_off(), &config).unwrap();
        let decoder = Decoder::open(&blob).unwrap();
        assert_eq!(decoder.lod_count(), 0);
        assert_eq!(decoder.vertices().len(), 4);
        assert_eq!(decoder.faces().len(), 4);
    }

    #[test]
    fn octahedron_round_trips_through_every_lod() {
        let config = EncodeConfig { quant_bits: 14, ..EncodeConfig::default() };
        let blob = encode(octahedron_off(), &config).unwrap();
        let mut decoder = Decoder::open(&blob).unwrap();
        assert!(decoder.vertices().len() <= 6);

        let n = decoder.lod_count();
        decoder.advance_to(n).unwrap();
        assert_eq!(decoder.vertices().len(), 6);
        assert_eq!(decoder.faces().len(), 8);
        assert_eq!(decoder.max_cut(n), 0.0);
    }

    #[test]
    fn advancing_in_two_steps_matches_advancing_directly() {
        let config = EncodeConfig { quant_bits: 14, ..EncodeConfig::default() };
        let blob = encode(octahedron_off(), &config).unwrap();
        let n = Decoder::open(&blob).unwrap().lod_count();
        if n == 0 {
            return;
        }

        let mut stepwise = Decoder::open(&blob).unwrap();
        stepwise.advance_to(n / 2).unwrap();
        stepwise.advance_to(n).unwrap();

        let mut direct = Decoder::open(&blob).unwrap();
        direct.advance_to(n).unwrap();

        assert_eq!(stepwise.vertices().len(), direct.vertices().len());
        assert_eq!(stepwise.faces().len(), direct.faces().len());
    }

    #[test]
    fn decoder_rejects_rewinding() {
        let config = EncodeConfig::default();
        let blob = encode(octahedron_off(), &config).unwrap();
        let mut decoder = Decoder::open(&blob).unwrap();
        let n = decoder.lod_count();
        if n == 0 {
            return;
        }
        decoder.advance_to(n).unwrap();
        assert!(decoder.advance_to(0).is_err());
    }

    #[test]
    fn rejects_non_manifold_input() {
        let open_border = "OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
        let config = EncodeConfig::default();
        let err = encode(open_border, &config).unwrap_err();
        assert!(matches!(err, CodecError::Topo(_)));
    }

    #[test]
    fn corrupted_blob_is_rejected_not_panicked() {
        let config = EncodeConfig::default();
        let mut blob = encode(octahedron_off(), &config).unwrap();
        if blob.len() > 20 {
            blob[20] ^= 0xFF;
        }
        let result = Decoder::open(&blob).and_then(|mut d| {
            let n = d.lod_count();
            d.advance_to(n)?;
            Ok(())
        });
        assert!(result.is_err());
    }

    #[test]
    fn distance_range_of_identical_meshes_is_near_zero() {
        let config = EncodeConfig::default();
        let blob = encode(octahedron_off(), &config).unwrap();
        let mut a = Decoder::open(&blob).unwrap();
        let mut b = Decoder::open(&blob).unwrap();
        let n = a.lod_count();
        a.advance_to(n).unwrap();
        b.advance_to(n).unwrap();
        let [lo, hi] = distance_range(&a, &b);
        assert!(lo >= 0.0);
        assert!(hi < 1e-6);
    }
}

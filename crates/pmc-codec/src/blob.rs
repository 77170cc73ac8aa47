//! Compressed blob byte layout (§4.8): header, base mesh, and the
//! reverse-chronological batch stream.
//!
//! The abstract layout in the specification names each batch section
//! ("conn_face_bits (range-coded)", "residuals + quant_ids (range-coded)")
//! without saying how a reader is meant to know where one range-coded
//! section ends and the next begins. We make that concrete with u32
//! length prefixes ahead of every variable-size blob — the same
//! length-prefixed-blob convention the teacher's own binary formats use
//! for nested variable-length sections. All multibyte integers are
//! little-endian and all floats are IEEE-754 single precision, exactly as
//! specified.

use pmc_coder::{AdaptiveModel, RangeDecoder, RangeEncoder};
use pmc_math::{IVec3, Point3};
use pmc_topo::Topology;

use crate::conquest::BatchRecord;
use crate::error::{CodecError, Result};

/// Fixed header fields (§4.8).
#[derive(Debug, Clone, Copy)]
pub struct Header {
    /// Bounding-box minimum corner used to build the quantizer.
    pub bbmin: Point3,
    /// Bounding-box maximum corner used to build the quantizer.
    pub bbmax: Point3,
    /// Quantization bit depth per axis.
    pub quant_bits: u32,
    /// Shift applied to a signed residual component to make it a
    /// non-negative symbol index for the range coder.
    pub alpha_beta_min: i32,
    /// Number of decimation batches in the stream.
    pub n_batches: u32,
    /// Vertex count of the finest (fully decoded) mesh.
    pub init_verts: u32,
    /// Face count of the finest (fully decoded) mesh.
    pub init_faces: u32,
}

const MAGIC: [u8; 4] = *b"PMC1";

fn push_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// A byte cursor over the compressed blob, used by both header/base-mesh
/// parsing and the batch pre-scan. Never blocks; a short read is always a
/// [`CodecError::CorruptedStream`].
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(CodecError::CorruptedStream(format!(
                "expected {n} more bytes at offset {}, only {} remain",
                self.pos,
                self.bytes.len() - self.pos.min(self.bytes.len())
            )));
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn remaining(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }
}

/// Append the header to `out`. Callers append the base mesh and batches
/// immediately after.
pub fn write_header(out: &mut Vec<u8>, header: &Header) {
    out.extend_from_slice(&MAGIC);
    push_f32(out, header.bbmin.x as f32);
    push_f32(out, header.bbmin.y as f32);
    push_f32(out, header.bbmin.z as f32);
    push_f32(out, header.bbmax.x as f32);
    push_f32(out, header.bbmax.y as f32);
    push_f32(out, header.bbmax.z as f32);
    push_u32(out, header.quant_bits);
    push_i32(out, header.alpha_beta_min);
    push_u32(out, header.n_batches);
    push_u32(out, header.init_verts);
    push_u32(out, header.init_faces);
}

fn read_header(cur: &mut Cursor) -> Result<Header> {
    let magic = cur.take(4)?;
    if magic != MAGIC {
        return Err(CodecError::CorruptedStream("bad magic, not a pmc-codec blob".into()));
    }
    let bbmin = Point3::new(cur.f32()? as f64, cur.f32()? as f64, cur.f32()? as f64);
    let bbmax = Point3::new(cur.f32()? as f64, cur.f32()? as f64, cur.f32()? as f64);
    let quant_bits = cur.u32()?;
    let alpha_beta_min = cur.i32()?;
    let n_batches = cur.u32()?;
    let init_verts = cur.u32()?;
    let init_faces = cur.u32()?;
    Ok(Header { bbmin, bbmax, quant_bits, alpha_beta_min, n_batches, init_verts, init_faces })
}

/// Write the base mesh section: `vertex_count, face_count`, then vertex
/// positions (already dequantized to float, per §4.8), then one
/// `(degree, degree × vertex_idx)` record per face.
pub fn write_base_mesh(out: &mut Vec<u8>, topo: &Topology, quantizer: &pmc_geom::Quantizer) {
    let index_of: std::collections::HashMap<_, u32> =
        topo.vertices.iter().enumerate().map(|(i, (id, _))| (id, i as u32)).collect();
    push_u32(out, topo.vertex_count() as u32);
    push_u32(out, topo.face_count() as u32);
    for (_, v) in topo.vertices.iter() {
        let p = quantizer.dequantize(v.position);
        push_f32(out, p.x as f32);
        push_f32(out, p.y as f32);
        push_f32(out, p.z as f32);
    }
    for (_, f) in topo.faces.iter() {
        push_u32(out, f.half_edges.len() as u32);
        for &he in &f.half_edges {
            push_u32(out, index_of[&topo.half_edges[he].origin]);
        }
    }
}

/// Parsed base mesh: float vertex positions and index faces, ready to be
/// re-quantized onto the header's lattice and handed to
/// `Topology::from_indexed`.
fn read_base_mesh(cur: &mut Cursor) -> Result<(Vec<Point3>, Vec<Vec<usize>>)> {
    let vertex_count = cur.u32()? as usize;
    let face_count = cur.u32()? as usize;
    let mut points = Vec::with_capacity(vertex_count);
    for _ in 0..vertex_count {
        points.push(Point3::new(cur.f32()? as f64, cur.f32()? as f64, cur.f32()? as f64));
    }
    let mut faces = Vec::with_capacity(face_count);
    for _ in 0..face_count {
        let degree = cur.u32()? as usize;
        if degree < 3 {
            return Err(CodecError::CorruptedStream(format!("base mesh face has degree {degree}")));
        }
        let mut face = Vec::with_capacity(degree);
        for _ in 0..degree {
            let idx = cur.u32()? as usize;
            if idx >= vertex_count {
                return Err(CodecError::CorruptedStream(format!(
                    "base mesh face references out-of-range vertex {idx}"
                )));
            }
            face.push(idx);
        }
        faces.push(face);
    }
    Ok((points, faces))
}

/// Alphabet size for a signed residual component shifted by
/// `alpha_beta_min`: components range over `[-alpha_beta_min,
/// alpha_beta_min]`.
pub fn residual_alphabet_size(alpha_beta_min: i32) -> usize {
    (2 * alpha_beta_min as i64 + 1) as usize
}

/// Adaptive-cell tag alphabet. Matches the `.min(63)` cap `decimation_batch`
/// clamps `quant_cell_id` to.
pub const QUANT_ID_ALPHABET: usize = 64;

fn shift_component(v: i64, alpha_beta_min: i32) -> Result<usize> {
    let shifted = v + alpha_beta_min as i64;
    if shifted < 0 || shifted as u64 > (2 * alpha_beta_min as i64) as u64 {
        return Err(CodecError::QuantizationOverflow(v, alpha_beta_min as u32));
    }
    Ok(shifted as usize)
}

/// Range-code one batch's connectivity bits, residual/quant-id/protruding
/// data, and Hausdorff floats into its length-prefixed section.
pub fn write_batch(record: &BatchRecord, alpha_beta_min: i32) -> Result<Vec<u8>> {
    let mut face_enc = RangeEncoder::new();
    let mut face_model = AdaptiveModel::new(2);
    for &bit in &record.conn_face {
        face_model.encode(&mut face_enc, bit as usize)?;
    }
    let conn_face_bytes = face_enc.finish();

    let mut edge_enc = RangeEncoder::new();
    let mut edge_model = AdaptiveModel::new(2);
    for &bit in &record.conn_edge {
        edge_model.encode(&mut edge_enc, bit as usize)?;
    }
    let conn_edge_bytes = edge_enc.finish();

    let alphabet = residual_alphabet_size(alpha_beta_min);
    let mut geom_enc = RangeEncoder::new();
    let mut quant_model = AdaptiveModel::new(QUANT_ID_ALPHABET);
    let mut protruding_model = AdaptiveModel::new(2);
    let mut rx_model = AdaptiveModel::new(alphabet);
    let mut ry_model = AdaptiveModel::new(alphabet);
    let mut rz_model = AdaptiveModel::new(alphabet);
    for i in 0..record.residuals.len() {
        quant_model.encode(&mut geom_enc, (record.quant_ids[i] as usize).min(QUANT_ID_ALPHABET - 1))?;
        protruding_model.encode(&mut geom_enc, record.protruding[i] as usize)?;
        let r = record.residuals[i];
        rx_model.encode(&mut geom_enc, shift_component(r.x, alpha_beta_min)?)?;
        ry_model.encode(&mut geom_enc, shift_component(r.y, alpha_beta_min)?)?;
        rz_model.encode(&mut geom_enc, shift_component(r.z, alpha_beta_min)?)?;
    }
    let geom_bytes = geom_enc.finish();

    let mut out = Vec::new();
    push_f32(&mut out, record.max_cut);
    push_u32(&mut out, record.conn_face.len() as u32);
    push_u32(&mut out, record.residuals.len() as u32);
    push_u32(&mut out, record.conn_edge.len() as u32);
    push_u32(&mut out, conn_face_bytes.len() as u32);
    out.extend_from_slice(&conn_face_bytes);
    push_u32(&mut out, conn_edge_bytes.len() as u32);
    out.extend_from_slice(&conn_edge_bytes);
    push_u32(&mut out, geom_bytes.len() as u32);
    out.extend_from_slice(&geom_bytes);
    push_f32(&mut out, record.hausdorff_fwd);
    push_f32(&mut out, record.hausdorff_prx);
    Ok(out)
}

/// One batch section as parsed from the blob: the three range-coded byte
/// slices plus the fixed-size fields surrounding them, still undecoded.
/// Decoding happens lazily during [`crate::Decoder::advance_to`], in lock
/// step with the undecimation BFS, exactly mirroring how `write_batch`
/// encoded them in traversal order.
pub struct ParsedBatch {
    /// Per-batch slack bound (§9's `max_cut(lod)` resolution).
    pub max_cut: f32,
    /// Number of connectivity face bits.
    pub face_count: u32,
    /// Number of Splittable faces (residual/quant-id/protruding entries).
    pub splittable_count: u32,
    /// Number of candidate rim half-edges (`conn_edge` bits).
    pub rim_count: u32,
    /// Range-coded Splittable/Unsplittable bits.
    pub conn_face_bytes: Vec<u8>,
    /// Range-coded Original/Added bits.
    pub conn_edge_bytes: Vec<u8>,
    /// Range-coded quant-id/protruding/residual stream.
    pub geom_bytes: Vec<u8>,
    /// Forward Hausdorff bound at this LOD.
    pub hausdorff_fwd: f32,
    /// Proxy Hausdorff bound at this LOD.
    pub hausdorff_prx: f32,
}

fn read_batch(cur: &mut Cursor) -> Result<ParsedBatch> {
    let max_cut = cur.f32()?;
    let face_count = cur.u32()?;
    let splittable_count = cur.u32()?;
    let rim_count = cur.u32()?;
    let conn_face_len = cur.u32()? as usize;
    let conn_face_bytes = cur.take(conn_face_len)?.to_vec();
    let conn_edge_len = cur.u32()? as usize;
    let conn_edge_bytes = cur.take(conn_edge_len)?.to_vec();
    let geom_len = cur.u32()? as usize;
    let geom_bytes = cur.take(geom_len)?.to_vec();
    let hausdorff_fwd = cur.f32()?;
    let hausdorff_prx = cur.f32()?;
    Ok(ParsedBatch {
        max_cut,
        face_count,
        splittable_count,
        rim_count,
        conn_face_bytes,
        conn_edge_bytes,
        geom_bytes,
        hausdorff_fwd,
        hausdorff_prx,
    })
}

/// Parsed blob: header, base mesh, and every batch section in stored
/// (reverse-chronological) order.
pub struct ParsedBlob {
    /// Fixed header fields.
    pub header: Header,
    /// Base (coarsest) mesh geometry and connectivity.
    pub base_points: Vec<Point3>,
    /// Base (coarsest) mesh faces, by vertex index into `base_points`.
    pub base_faces: Vec<Vec<usize>>,
    /// Batch sections, in the order the decoder replays them.
    pub batches: Vec<ParsedBatch>,
}

/// Parse a full compressed blob: header, base mesh, then every batch
/// section up front. Decoding a batch's range-coded payload is deferred to
/// [`crate::Decoder::advance_to`]; this pass only validates framing
/// (lengths, counts, magic) so a truncated or malformed blob is rejected
/// immediately at `Decoder::open` rather than partway through replay.
pub fn parse(blob: &[u8]) -> Result<ParsedBlob> {
    let mut cur = Cursor::new(blob);
    let header = read_header(&mut cur)?;
    let (base_points, base_faces) = read_base_mesh(&mut cur)?;
    let mut batches = Vec::with_capacity(header.n_batches as usize);
    for _ in 0..header.n_batches {
        batches.push(read_batch(&mut cur)?);
    }
    if !cur.is_empty() {
        return Err(CodecError::CorruptedStream(format!(
            "{} trailing bytes after the declared {} batches",
            cur.remaining().len(),
            header.n_batches
        )));
    }
    Ok(ParsedBlob { header, base_points, base_faces, batches })
}

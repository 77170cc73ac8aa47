//! OFF text format reader/writer.
//!
//! Supplements the bespoke compressed-blob format (§4.8-equivalent) with
//! the plain-text mesh interchange format named as an accepted input in
//! the external-interfaces section: a header line `OFF`, a counts line
//! `V F E`, `V` point lines, and `F` face lines of the form
//! `degree i0 i1 ... i(d-1)`.

use crate::error::{CodecError, Result};
use pmc_math::Point3;

/// Parse OFF text into a point list and a face list (vertex indices, one
/// `Vec` per face in boundary order).
pub fn read(text: &str) -> Result<(Vec<Point3>, Vec<Vec<usize>>)> {
    let mut lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let header = lines
        .next()
        .ok_or_else(|| CodecError::InvalidMesh("empty OFF input".into()))?;
    if header != "OFF" {
        return Err(CodecError::InvalidMesh(format!(
            "expected 'OFF' header, got '{header}'"
        )));
    }

    let counts = lines
        .next()
        .ok_or_else(|| CodecError::InvalidMesh("OFF input missing counts line".into()))?;
    let mut counts = counts.split_whitespace();
    let n_verts: usize = parse_field(counts.next(), "vertex count")?;
    let n_faces: usize = parse_field(counts.next(), "face count")?;
    let _n_edges: usize = parse_field(counts.next(), "edge count")?;

    let mut points = Vec::with_capacity(n_verts);
    for _ in 0..n_verts {
        let line = lines
            .next()
            .ok_or_else(|| CodecError::InvalidMesh("OFF input truncated in vertex list".into()))?;
        let mut it = line.split_whitespace();
        let x: f64 = parse_field(it.next(), "vertex x")?;
        let y: f64 = parse_field(it.next(), "vertex y")?;
        let z: f64 = parse_field(it.next(), "vertex z")?;
        points.push(Point3::new(x, y, z));
    }

    let mut faces = Vec::with_capacity(n_faces);
    for _ in 0..n_faces {
        let line = lines
            .next()
            .ok_or_else(|| CodecError::InvalidMesh("OFF input truncated in face list".into()))?;
        let mut it = line.split_whitespace();
        let degree: usize = parse_field(it.next(), "face degree")?;
        let mut face = Vec::with_capacity(degree);
        for _ in 0..degree {
            let idx: usize = parse_field(it.next(), "face vertex index")?;
            if idx >= n_verts {
                return Err(CodecError::InvalidMesh(format!(
                    "face references out-of-range vertex index {idx}"
                )));
            }
            face.push(idx);
        }
        faces.push(face);
    }

    Ok((points, faces))
}

fn parse_field<T: std::str::FromStr>(field: Option<&str>, what: &str) -> Result<T> {
    field
        .ok_or_else(|| CodecError::InvalidMesh(format!("OFF input missing {what}")))?
        .parse()
        .map_err(|_| CodecError::InvalidMesh(format!("OFF input has malformed {what}")))
}

/// Serialize a point/face list to OFF text.
pub fn write(points: &[Point3], faces: &[Vec<usize>]) -> String {
    let mut out = String::from("OFF\n");
    out.push_str(&format!("{} {} 0\n", points.len(), faces.len()));
    for p in points {
        out.push_str(&format!("{} {} {}\n", p.x, p.y, p.z));
    }
    for face in faces {
        out.push_str(&face.len().to_string());
        for &idx in face {
            out.push(' ');
            out.push_str(&idx.to_string());
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const TETRA: &str = "OFF\n4 4 0\n0 0 0\n1 0 0\n0 1 0\n0 0 1\n3 0 2 1\n3 0 1 3\n3 0 3 2\n3 1 2 3\n";

    #[test]
    fn reads_tetrahedron() {
        let (points, faces) = read(TETRA).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(faces.len(), 4);
        assert_eq!(faces[0], vec![0, 2, 1]);
    }

    #[test]
    fn round_trips_through_write() {
        let (points, faces) = read(TETRA).unwrap();
        let text = write(&points, &faces);
        let (points2, faces2) = read(&text).unwrap();
        assert_eq!(points.len(), points2.len());
        assert_eq!(faces, faces2);
    }

    #[test]
    fn rejects_missing_header() {
        let err = read("4 4 0\n").unwrap_err();
        assert!(matches!(err, CodecError::InvalidMesh(_)));
    }

    #[test]
    fn rejects_out_of_range_face_index() {
        let bad = "OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 9\n";
        let err = read(bad).unwrap_err();
        assert!(matches!(err, CodecError::InvalidMesh(_)));
    }
}

//! End-to-end encode/decode coverage beyond the small fixtures exercised in
//! `src/lib.rs`'s own unit tests: a mesh with enough vertices to actually
//! drive several decimation batches, plus the input-rejection paths a
//! caller handing in arbitrary OFF text is likely to hit.

use pmc_codec::{encode, CodecError, Decoder, EncodeConfig};

/// A regular icosahedron: 12 vertices, 20 faces, enough topology for the
/// conquest loop to run more than one batch.
fn icosahedron_off() -> String {
    let phi: f64 = (1.0 + 5f64.sqrt()) / 2.0;
    let verts = [
        (-1.0, phi, 0.0),
        (1.0, phi, 0.0),
        (-1.0, -phi, 0.0),
        (1.0, -phi, 0.0),
        (0.0, -1.0, phi),
        (0.0, 1.0, phi),
        (0.0, -1.0, -phi),
        (0.0, 1.0, -phi),
        (phi, 0.0, -1.0),
        (phi, 0.0, 1.0),
        (-phi, 0.0, -1.0),
        (-phi, 0.0, 1.0),
    ];
    let faces = [
        [0, 11, 5],
        [0, 5, 1],
        [0, 1, 7],
        [0, 7, 10],
        [0, 10, 11],
        [1, 5, 9],
        [5, 11, 4],
        [11, 10, 2],
        [10, 7, 6],
        [7, 1, 8],
        [3, 9, 4],
        [3, 4, 2],
        [3, 2, 6],
        [3, 6, 8],
        [3, 8, 9],
        [4, 9, 5],
        [2, 4, 11],
        [6, 2, 10],
        [8, 6, 7],
        [9, 8, 1],
    ];
    let mut text = format!("OFF\n{} {} 0\n", verts.len(), faces.len());
    for (x, y, z) in verts {
        text.push_str(&format!("{x} {y} {z}\n"));
    }
    for f in faces {
        text.push_str(&format!("3 {} {} {}\n", f[0], f[1], f[2]));
    }
    text
}

#[test]
fn icosahedron_decimates_and_reconstructs_exactly() {
    let config = EncodeConfig { quant_bits: 16, ..EncodeConfig::default() };
    let blob = encode(&icosahedron_off(), &config).unwrap();
    let mut decoder = Decoder::open(&blob).unwrap();

    // A base mesh this coarse should have strictly fewer vertices than the
    // 12 the full-detail icosahedron has, unless decimation found nothing
    // removable (which would itself be a bug for a regular icosahedron).
    assert!(decoder.vertices().len() <= 12);

    let n = decoder.lod_count();
    assert!(n > 0, "a regular icosahedron should admit at least one decimation batch");

    decoder.advance_to(n).unwrap();
    assert_eq!(decoder.vertices().len(), 12);
    assert_eq!(decoder.faces().len(), 20);
    assert_eq!(decoder.max_cut(n), 0.0);
    assert_eq!(decoder.current_lod(), n);
}

#[test]
fn hausdorff_bound_is_monotonically_non_increasing_as_lod_advances() {
    let config = EncodeConfig { quant_bits: 16, ..EncodeConfig::default() };
    let blob = encode(&icosahedron_off(), &config).unwrap();
    let mut decoder = Decoder::open(&blob).unwrap();
    let n = decoder.lod_count();
    if n == 0 {
        return;
    }

    let mut last_max_cut = f32::MAX;
    for lod in 0..=n {
        decoder.advance_to(lod).unwrap();
        let cut = decoder.max_cut(lod);
        assert!(cut <= last_max_cut + 1e-6, "max_cut should shrink (or hold) as lod advances");
        last_max_cut = cut;
    }
    assert_eq!(last_max_cut, 0.0, "max_cut at full detail must be zero");
}

#[test]
fn stepping_through_every_lod_one_at_a_time_matches_jumping_to_the_end() {
    let config = EncodeConfig { quant_bits: 16, ..EncodeConfig::default() };
    let blob = encode(&icosahedron_off(), &config).unwrap();
    let n = Decoder::open(&blob).unwrap().lod_count();
    if n == 0 {
        return;
    }

    let mut stepwise = Decoder::open(&blob).unwrap();
    for lod in 1..=n {
        stepwise.advance_to(lod).unwrap();
    }

    let mut direct = Decoder::open(&blob).unwrap();
    direct.advance_to(n).unwrap();

    assert_eq!(stepwise.vertices().len(), direct.vertices().len());
    assert_eq!(stepwise.faces().len(), direct.faces().len());
    assert_eq!(stepwise.to_off(), direct.to_off());
}

#[test]
fn encoding_twice_from_the_same_input_is_byte_identical() {
    let config = EncodeConfig { quant_bits: 16, ..EncodeConfig::default() };
    let a = encode(&icosahedron_off(), &config).unwrap();
    let b = encode(&icosahedron_off(), &config).unwrap();
    assert_eq!(a, b, "encode must be deterministic for identical input and config");
}

#[test]
fn rejects_a_mesh_with_two_disjoint_components() {
    let two_tetrahedra = "OFF\n8 8 0\n\
         0 0 0\n10 0 0\n0 10 0\n0 0 10\n\
         100 0 0\n110 0 0\n100 10 0\n100 0 10\n\
         3 0 2 1\n3 0 1 3\n3 0 3 2\n3 1 2 3\n\
         3 4 6 5\n3 4 5 7\n3 4 7 6\n3 5 6 7\n";
    let config = EncodeConfig::default();
    let err = encode(two_tetrahedra, &config).unwrap_err();
    assert!(matches!(err, CodecError::Topo(_)));
}

#[test]
fn rejects_degenerate_empty_input() {
    let config = EncodeConfig::default();
    let err = encode("OFF\n0 0 0\n", &config).unwrap_err();
    assert!(matches!(err, CodecError::InvalidMesh(_)));
}

#[test]
fn truncated_blob_is_rejected_not_panicked() {
    let config = EncodeConfig { quant_bits: 16, ..EncodeConfig::default() };
    let blob = encode(&icosahedron_off(), &config).unwrap();
    let truncated = &blob[..blob.len() / 2];
    assert!(Decoder::open(truncated).is_err());
}

#[test]
fn advance_past_available_lod_count_is_rejected() {
    let config = EncodeConfig { quant_bits: 16, ..EncodeConfig::default() };
    let blob = encode(&icosahedron_off(), &config).unwrap();
    let mut decoder = Decoder::open(&blob).unwrap();
    let n = decoder.lod_count();
    assert!(decoder.advance_to(n + 1).is_err());
}

//! Error types for the progressive mesh codec.

use thiserror::Error;

/// Errors raised while encoding or decoding a mesh.
#[derive(Error, Debug)]
pub enum CodecError {
    /// The input mesh is not a single-component closed 2-manifold.
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    /// The compressed bitstream is malformed: a range-coded symbol fell
    /// outside its model's alphabet, the header magic/size didn't match, or
    /// the buffer ended before the expected number of batches were read.
    #[error("corrupted compressed stream: {0}")]
    CorruptedStream(String),

    /// A residual component did not fit in the alphabet implied by
    /// `quant_bits` and `alpha_beta_min`; the mesh needs a larger bit depth.
    #[error("residual component {0} overflowed the {1}-bit quantization lattice")]
    QuantizationOverflow(i64, u32),

    /// Reconstructing a batch during undecimation produced a mesh that
    /// fails the manifold invariants; the connectivity bitstream is
    /// inconsistent with the topology it's being replayed against.
    #[error("undecimation predicate failure: {0}")]
    PredicateFailure(String),

    /// Propagated from reading/writing an OFF file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Propagated from the half-edge arena.
    #[error(transparent)]
    Topo(#[from] pmc_topo::TopoError),

    /// Propagated from quantization.
    #[error(transparent)]
    Quantize(#[from] pmc_geom::QuantizeError),

    /// Propagated from the range coder's adaptive models.
    #[error(transparent)]
    Coder(#[from] pmc_coder::CoderError),
}

/// Result type used throughout this crate.
pub type Result<T> = std::result::Result<T, CodecError>;

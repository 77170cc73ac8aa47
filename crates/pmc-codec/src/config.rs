//! Encoder configuration.

use serde::{Deserialize, Serialize};

/// Which strategy the Hausdorff engine uses to bound per-face error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HausdorffStrategy {
    /// Skip Hausdorff bookkeeping entirely; `hausdorff`/`proxy_hausdorff`
    /// stay at zero.
    None,
    /// Brute-force sample-to-BVH queries against the original surface (and
    /// a reverse BVH over the current mesh for the proxy direction). The
    /// reference strategy; used by tests because it has no dependency on
    /// the encoder's own traversal bookkeeping.
    Bvh,
    /// Track, per removed-vertex region, the original triangles it
    /// absorbed, and query only those.
    Associate,
    /// `Associate`, additionally filtered by whether a sample falls inside
    /// the current face's triangular prism along its normal.
    AssociateCylinder,
}

impl Default for HausdorffStrategy {
    fn default() -> Self {
        HausdorffStrategy::Bvh
    }
}

/// Knobs for [`crate::encode`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EncodeConfig {
    /// Bits per axis for the quantization lattice.
    pub quant_bits: u32,
    /// Maximum number of decimation batches to run; `None` means run until
    /// no removable vertex remains.
    pub decimation_cap: Option<u32>,
    /// Hausdorff samples per unit area on a Splittable face.
    pub sampling_rate: u32,
    /// Which Hausdorff bookkeeping strategy to use.
    pub hausdorff_strategy: HausdorffStrategy,
    /// Whether the residual quant-cell id is derived from local mesh
    /// complexity (`true`) or left at a constant bucket (`false`).
    pub adaptive_quant: bool,
    /// Maximum vertex degree the removability predicate will accept.
    pub max_vertex_degree: u32,
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            quant_bits: 12,
            decimation_cap: None,
            sampling_rate: 30,
            hausdorff_strategy: HausdorffStrategy::Bvh,
            adaptive_quant: true,
            max_vertex_degree: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let cfg = EncodeConfig::default();
        assert_eq!(cfg.quant_bits, 12);
        assert_eq!(cfg.decimation_cap, None);
        assert_eq!(cfg.sampling_rate, 30);
        assert_eq!(cfg.hausdorff_strategy, HausdorffStrategy::Bvh);
        assert!(cfg.adaptive_quant);
    }

    #[test]
    fn config_round_trips_through_json() {
        let cfg = EncodeConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EncodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.quant_bits, cfg.quant_bits);
        assert_eq!(back.hausdorff_strategy, cfg.hausdorff_strategy);
    }
}

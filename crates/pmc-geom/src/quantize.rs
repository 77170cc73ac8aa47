//! Integer lattice quantization of vertex positions.

use crate::aabb::Aabb3;
use pmc_math::{IVec3, Point3};

/// Errors raised when a position cannot be represented on the configured
/// lattice.
#[derive(Debug, thiserror::Error)]
pub enum QuantizeError {
    /// A coordinate fell outside `[0, 2^bits - 1]` after quantization,
    /// meaning the input point lies outside the bounding box the
    /// quantizer was built from.
    #[error("coordinate {0} overflowed the {1}-bit lattice")]
    Overflow(i64, u32),
}

/// Maps floating-point positions inside a bounding box onto an integer
/// lattice of `bits` per axis, and back. The lattice origin is the box
/// minimum; cell `i` covers `[min + i*step, min + (i+1)*step)`.
///
/// `step` is a single value shared by all three axes (§4.2: `step = max(
/// extent_x, extent_y, extent_z) / 2^Q`), not a per-axis value. The
/// lattice cells are therefore cubes, which is what makes the quantization
/// error isotropic — every axis rounds to the same worst-case slack, so a
/// residual magnitude and the Hausdorff engine's per-sample gap correction
/// (`sqrt(area_unit/2)`) mean the same thing regardless of which axis they
/// fall on.
#[derive(Debug, Clone, Copy)]
pub struct Quantizer {
    min: Point3,
    step: f64,
    bits: u32,
}

impl Quantizer {
    /// Build a quantizer with `bits` bits per axis from the bounding box of
    /// `points`. Panics if `points` is empty or `bits` is 0.
    pub fn new(bbox: &Aabb3, bits: u32) -> Self {
        assert!(bits > 0 && bits <= 32, "quantization bit depth out of range");
        let levels = (1u64 << bits) as f64;
        let extent = bbox.max - bbox.min;
        let max_extent = extent.x.max(extent.y).max(extent.z);
        let step = if max_extent > 0.0 { max_extent / levels } else { 1.0 };
        Self { min: bbox.min, step, bits }
    }

    /// Bit depth this quantizer was built with.
    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// The single lattice cell size shared by all three axes. Used to scale
    /// geometric tolerances (e.g. the removability predicate's planarity
    /// check) to the precision quantization actually preserves, rather than
    /// a fixed epsilon that would be meaningless at a coarse bit depth and
    /// overly strict at a fine one.
    pub fn max_step(&self) -> f64 {
        self.step
    }

    /// Lattice cell index for `p`.
    pub fn quantize(&self, p: &Point3) -> Result<IVec3, QuantizeError> {
        let levels = 1i64 << self.bits;
        let max_cell = levels - 1;
        let cell = |coord: f64, min: f64| -> Result<i64, QuantizeError> {
            let raw = ((coord - min) / self.step).floor() as i64;
            // A point sitting exactly on the box's upper face floors to
            // `levels`, one past the last valid cell, since the box is a
            // closed interval but cells are half-open; fold it into the
            // last cell instead of rejecting it, since the box was built
            // to contain this point. Anything further out is a genuine
            // out-of-box coordinate.
            let c = if raw == levels { max_cell } else { raw };
            if c < 0 || c > max_cell {
                return Err(QuantizeError::Overflow(c, self.bits));
            }
            Ok(c)
        };
        Ok(IVec3::new(cell(p.x, self.min.x)?, cell(p.y, self.min.y)?, cell(p.z, self.min.z)?))
    }

    /// Inverse of [`Quantizer::quantize`]: the center of the cell.
    pub fn dequantize(&self, cell: IVec3) -> Point3 {
        Point3::new(
            self.min.x + self.step * (cell.x as f64 + 0.5),
            self.min.y + self.step * (cell.y as f64 + 0.5),
            self.min.z + self.step * (cell.z as f64 + 0.5),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_within_half_a_cell() {
        let bbox = Aabb3 {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(100.0, 100.0, 100.0),
        };
        let q = Quantizer::new(&bbox, 12);
        let p = Point3::new(37.4, 81.2, 3.0);
        let cell = q.quantize(&p).unwrap();
        let back = q.dequantize(cell);
        assert!((back.x - p.x).abs() < 100.0 / 4096.0);
        assert!((back.y - p.y).abs() < 100.0 / 4096.0);
        assert!((back.z - p.z).abs() < 100.0 / 4096.0);
    }

    #[test]
    fn step_is_uniform_and_sized_from_the_largest_extent() {
        let bbox = Aabb3 {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(100.0, 50.0, 25.0),
        };
        let q = Quantizer::new(&bbox, 8);
        assert!((q.max_step() - 100.0 / 256.0).abs() < 1e-9);

        // A unit step along the short axes, not a quarter/eighth of one:
        // the lattice cell is a cube sized off the longest extent.
        let a = q.quantize(&Point3::new(0.0, 0.0, 0.0)).unwrap();
        let b = q.quantize(&Point3::new(0.0, 100.0 / 256.0, 0.0)).unwrap();
        assert_eq!(b.y - a.y, 1);
    }

    #[test]
    fn clamps_the_upper_box_corner_into_the_last_cell() {
        let bbox = Aabb3 {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(1.0, 1.0, 1.0),
        };
        let q = Quantizer::new(&bbox, 4);
        let cell = q.quantize(&Point3::new(1.0, 1.0, 1.0)).unwrap();
        assert_eq!(cell, IVec3::new(15, 15, 15));
    }

    #[test]
    fn rejects_a_point_outside_the_box() {
        let bbox = Aabb3 {
            min: Point3::new(0.0, 0.0, 0.0),
            max: Point3::new(1.0, 1.0, 1.0),
        };
        let q = Quantizer::new(&bbox, 4);
        let err = q.quantize(&Point3::new(-0.5, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, QuantizeError::Overflow(_, 4)));
    }
}

//! Triangle geometry predicates: closest point, area, normal, barycenter,
//! and the planarity/convexity tests used by the removability predicate.

use pmc_math::{IVec3, Point3, Tolerance, Vec3};

/// Signed area-weighted normal of triangle `(a, b, c)` (not normalized).
pub fn triangle_normal_unnormalized(a: &Point3, b: &Point3, c: &Point3) -> Vec3 {
    (b - a).cross(&(c - a))
}

/// Unit normal of triangle `(a, b, c)`. Degenerate (near-zero-area)
/// triangles return a zero vector rather than `NaN`.
pub fn triangle_normal(a: &Point3, b: &Point3, c: &Point3) -> Vec3 {
    let n = triangle_normal_unnormalized(a, b, c);
    let len = n.norm();
    if len < 1e-12 {
        Vec3::zeros()
    } else {
        n / len
    }
}

/// Area of triangle `(a, b, c)`.
pub fn triangle_area(a: &Point3, b: &Point3, c: &Point3) -> f64 {
    0.5 * triangle_normal_unnormalized(a, b, c).norm()
}

/// Centroid of an arbitrary point set (used for removed-vertex prediction:
/// the barycenter of a face's surviving boundary vertices).
pub fn barycenter(points: &[Point3]) -> Point3 {
    let mut acc = Vec3::zeros();
    for p in points {
        acc += p.coords;
    }
    Point3::from(acc / points.len().max(1) as f64)
}

/// Integer-lattice barycenter, computed identically on encode and decode so
/// the predicted removed-vertex position is bit-for-bit reproducible
/// without relying on floating-point determinism.
pub fn barycenter_ivec3(points: &[IVec3]) -> IVec3 {
    let n = points.len().max(1) as i64;
    let (mut sx, mut sy, mut sz) = (0i64, 0i64, 0i64);
    for p in points {
        sx += p.x;
        sy += p.y;
        sz += p.z;
    }
    IVec3::new(div_round(sx, n), div_round(sy, n), div_round(sz, n))
}

/// Integer division rounding to nearest, ties away from zero. Shared by
/// encode and decode so predicted barycenters never diverge by a rounding
/// half-unit.
fn div_round(num: i64, den: i64) -> i64 {
    debug_assert!(den > 0);
    if num >= 0 {
        (2 * num + den) / (2 * den)
    } else {
        -((2 * (-num) + den) / (2 * den))
    }
}

/// Closest point on triangle `(a, b, c)` to `p`, and the squared distance.
/// Ericson's region-based closest-point algorithm (*Real-Time Collision
/// Detection*, ch. 5.1.5) — handles all seven Voronoi regions without
/// trigonometry.
pub fn closest_point_on_triangle(p: &Point3, a: &Point3, b: &Point3, c: &Point3) -> (Point3, f64) {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;

    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return (*a, (p - a).norm_squared());
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return (*b, (p - b).norm_squared());
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        let q = a + ab * v;
        return (q, (p - q).norm_squared());
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return (*c, (p - c).norm_squared());
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        let q = a + ac * w;
        return (q, (p - q).norm_squared());
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        let q = b + (c - b) * w;
        return (q, (p - q).norm_squared());
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    let q = a + ab * v + ac * w;
    (q, (p - q).norm_squared())
}

/// Whether `points` (the ring of vertices bounding a removed-vertex star)
/// are coplanar within `tol`.
pub fn is_planar(points: &[Point3], tol: &Tolerance) -> bool {
    if points.len() < 4 {
        return true;
    }
    let n = triangle_normal(&points[0], &points[1], &points[2]);
    if n.norm_squared() < 1e-18 {
        return false;
    }
    points[3..].iter().all(|p| {
        let d = (p - points[0]).dot(&n);
        tol.is_zero(d)
    })
}

/// Whether the polygon `ring` is convex when viewed along its average
/// normal. Used by the removability predicate to reject stars whose
/// re-triangulated hole would fold over itself.
pub fn is_convex(ring: &[Point3]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut reference: Option<f64> = None;
    for i in 0..n {
        let a = ring[i];
        let b = ring[(i + 1) % n];
        let c = ring[(i + 2) % n];
        let cross = (b - a).cross(&(c - b));
        // Accumulate against a running average normal direction rather than
        // a single edge pair, so near-planar noise doesn't flip the sign.
        let avg_normal = ring
            .windows(3)
            .map(|w| (w[1] - w[0]).cross(&(w[2] - w[1])))
            .fold(Vec3::zeros(), |acc, v| acc + v);
        let sign = cross.dot(&avg_normal);
        match reference {
            None => reference = Some(sign),
            Some(r) if r.signum() != sign.signum() && sign.abs() > 1e-12 && r.abs() > 1e-12 => {
                return false;
            }
            _ => {}
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closest_point_inside_triangle_is_projection() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let p = Point3::new(0.2, 0.2, 1.0);
        let (q, d2) = closest_point_on_triangle(&p, &a, &b, &c);
        assert!((q.z).abs() < 1e-9);
        assert!((d2 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn closest_point_outside_vertex_region() {
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(1.0, 0.0, 0.0);
        let c = Point3::new(0.0, 1.0, 0.0);
        let p = Point3::new(-1.0, -1.0, 0.0);
        let (q, _) = closest_point_on_triangle(&p, &a, &b, &c);
        assert!((q - a).norm() < 1e-9);
    }

    #[test]
    fn barycenter_ivec3_rounds_to_nearest() {
        let pts = vec![IVec3::new(0, 0, 0), IVec3::new(1, 0, 0), IVec3::new(2, 0, 0)];
        assert_eq!(barycenter_ivec3(&pts), IVec3::new(1, 0, 0));
    }

    #[test]
    fn div_round_ties_away_from_zero() {
        assert_eq!(div_round(1, 2), 1);
        assert_eq!(div_round(-1, 2), -1);
        assert_eq!(div_round(3, 2), 2);
    }

    #[test]
    fn square_is_convex_and_planar() {
        let ring = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        assert!(is_planar(&ring, &Tolerance::DEFAULT));
        assert!(is_convex(&ring));
    }
}

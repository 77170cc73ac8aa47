#![warn(missing_docs)]

//! Quantization, geometric predicates, and a triangle BVH for the
//! progressive mesh codec.

mod aabb;
mod bvh;
mod predicates;
mod quantize;

pub use aabb::Aabb3;
pub use bvh::{Bvh, BvhTriangle};
pub use predicates::{
    barycenter, barycenter_ivec3, closest_point_on_triangle, is_convex, is_planar,
    triangle_area, triangle_normal, triangle_normal_unnormalized,
};
pub use quantize::{QuantizeError, Quantizer};

//! Mathematical utilities and type definitions.
//!
//! This module provides fundamental types used throughout the workspace
//! and utility functions for coordinate transformations.

use nalgebra::{Isometry3, Matrix3, Point2, Point3, Vector2, Vector3};

pub mod coordinate_utils;

pub use coordinate_utils::{
    distort_to_pixel, normalized_to_pixel, pixel_to_normalized, undistort_pixel,
};

/// Scalar type used throughout the workspace (currently `f64`).
pub type Real = f64;

/// 2D vector with [`Real`] components.
pub type Vec2 = Vector2<Real>;
/// 3D vector with [`Real`] components.
pub type Vec3 = Vector3<Real>;
/// 2D point with [`Real`] coordinates.
pub type Pt2 = Point2<Real>;
/// 3D point with [`Real`] coordinates.
pub type Pt3 = Point3<Real>;
/// 3×3 matrix with [`Real`] entries.
pub type Mat3 = Matrix3<Real>;
/// 3D rigid transform (SE(3)) using [`Real`].
pub type Iso3 = Isometry3<Real>;

/// Lift `(x, y)` to `(x, y, 1)`.
pub fn to_homogeneous(p: &Pt2) -> Vec3 {
    Vec3::new(p.x, p.y, 1.0)
}

/// Divide `(x, y, w)` through by `w`. The caller guarantees `w != 0`.
pub fn from_homogeneous(v: &Vec3) -> Pt2 {
    Pt2::new(v.x / v.z, v.y / v.z)
}

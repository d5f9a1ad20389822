//! Conversions between pixel and normalized image coordinates.
//!
//! These helpers work on a plain 3×3 camera matrix `K` and are what the
//! remap builders in `lensfix-imaging` call for every output pixel.

use crate::{DistortionModel, Mat3, Pt2, Real, Vec2, Vec3};

/// Convert pixel coordinates to normalized coordinates on the Z=1 plane.
///
/// `k_inv` is the inverse of the camera matrix; callers building whole remap
/// tables invert `K` once and reuse it.
///
/// ```
/// use lensfix_core::{Mat3, Pt2};
/// use lensfix_core::math::pixel_to_normalized;
///
/// let k = Mat3::new(800.0, 0.0, 640.0, 0.0, 800.0, 480.0, 0.0, 0.0, 1.0);
/// let n = pixel_to_normalized(Pt2::new(640.0, 480.0), &k.try_inverse().unwrap());
/// assert!(n.norm() < 1e-12);
/// ```
pub fn pixel_to_normalized(pixel: Pt2, k_inv: &Mat3) -> Vec2 {
    let v = k_inv * Vec3::new(pixel.x, pixel.y, 1.0);
    Vec2::new(v.x / v.z, v.y / v.z)
}

/// Convert normalized coordinates to pixel coordinates: `K * [x, y, 1]^T`.
pub fn normalized_to_pixel(normalized: Vec2, intrinsics: &Mat3) -> Pt2 {
    let v = intrinsics * Vec3::new(normalized.x, normalized.y, 1.0);
    Pt2::new(v.x / v.z, v.y / v.z)
}

/// Map a distorted pixel to undistorted normalized coordinates.
///
/// 1. `n = K^{-1} * [u, v, 1]^T`
/// 2. `n_undist = distortion.undistort(n)` (iterative)
pub fn undistort_pixel<D: DistortionModel<Real>>(pixel: Pt2, k_inv: &Mat3, distortion: &D) -> Vec2 {
    let normalized = pixel_to_normalized(pixel, k_inv);
    distortion.undistort(&normalized)
}

/// Distort normalized coordinates and map them to pixels.
///
/// Approximate inverse of [`undistort_pixel`].
pub fn distort_to_pixel<D: DistortionModel<Real>>(
    normalized: Vec2,
    intrinsics: &Mat3,
    distortion: &D,
) -> Pt2 {
    let distorted = distortion.distort(&normalized);
    normalized_to_pixel(distorted, intrinsics)
}

//! Homography estimation (plane-induced projective transform).
//!
//! `H` maps board points on `z = 0` to image pixels: `x' ~ H x`.
//! Points are Hartley-normalized internally and the result is de-normalized.

use crate::math::normalize_points_2d;
use lensfix_core::{from_homogeneous, to_homogeneous, Mat3, Pt2};
use nalgebra::DMatrix;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HomographyError {
    #[error("need at least 4 point correspondences, got {0}")]
    NotEnoughPoints(usize),
    #[error("point count mismatch: {0} board vs {1} image")]
    CountMismatch(usize, usize),
    #[error("degenerate point configuration for normalization")]
    Degenerate,
    #[error("svd failed during homography estimation")]
    SvdFailed,
}

/// Estimate `H` such that `x' ~ H x` using the normalized DLT.
///
/// The result is scaled so that `H[2,2] == 1` when possible.
pub fn dlt_homography(world: &[Pt2], image: &[Pt2]) -> Result<Mat3, HomographyError> {
    let n = world.len();
    if image.len() != n {
        return Err(HomographyError::CountMismatch(n, image.len()));
    }
    if n < 4 {
        return Err(HomographyError::NotEnoughPoints(n));
    }

    let (world_n, t_w) = normalize_points_2d(world).ok_or(HomographyError::Degenerate)?;
    let (image_n, t_i) = normalize_points_2d(image).ok_or(HomographyError::Degenerate)?;

    // Pad to at least 9 rows so the SVD yields a full V^T.
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);

    for (i, (pw, pi)) in world_n.iter().zip(image_n.iter()).enumerate() {
        let (x, y) = (pw.x, pw.y);
        let (u, v) = (pi.x, pi.y);
        let r0 = 2 * i;
        let r1 = r0 + 1;

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t.ok_or(HomographyError::SvdFailed)?;

    // nalgebra does not sort singular values; pick the smallest explicitly.
    let (min_idx, _) = svd
        .singular_values
        .iter()
        .enumerate()
        .fold((0, f64::INFINITY), |best, (i, &s)| {
            if s < best.1 {
                (i, s)
            } else {
                best
            }
        });
    let h_vec = v_t.row(min_idx);

    let mut h = Mat3::zeros();
    for r in 0..3 {
        for c in 0..3 {
            h[(r, c)] = h_vec[3 * r + c];
        }
    }

    let t_i_inv = t_i.try_inverse().ok_or(HomographyError::Degenerate)?;
    h = t_i_inv * h * t_w;

    let scale = h[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h /= scale;
    }
    if h.iter().any(|v| !v.is_finite()) {
        return Err(HomographyError::Degenerate);
    }

    Ok(h)
}

/// Pixel distance between `H * world` and `image`.
pub fn homography_transfer_error(h: &Mat3, world: &Pt2, image: &Pt2) -> f64 {
    let projected = from_homogeneous(&(h * to_homogeneous(world)));
    (projected - image).norm()
}

//! Linear Brown-Conrady estimate from homography residuals.
//!
//! For fixed `K` and per-view homographies, the difference between observed
//! and homography-predicted normalized coordinates is linear in
//! `(k1, k2[, k3][, p1, p2])`. The stacked system is solved by SVD.
//!
//! Only meant as a starting point for the non-linear refinement; accuracy
//! drops for strong distortion.

use lensfix_core::{from_homogeneous, to_homogeneous, BrownConrady5, Mat3, Pt2, Real};
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Error, Clone, Copy, PartialEq)]
pub enum DistortionFitError {
    #[error("need at least {0} points for distortion estimation, got {1}")]
    NotEnoughPoints(usize, usize),
    #[error("point count mismatch: {0} board vs {1} pixel")]
    CountMismatch(usize, usize),
    #[error("svd failed during distortion estimation")]
    SvdFailed,
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    #[error("degenerate configuration: all points near image center")]
    DegenerateConfiguration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionFitOptions {
    /// Hold `p1 = p2 = 0`.
    pub fix_tangential: bool,
    /// Hold `k3 = 0`.
    pub fix_k3: bool,
    /// Undistortion iterations stored in the result.
    pub iters: u32,
}

impl Default for DistortionFitOptions {
    fn default() -> Self {
        Self {
            fix_tangential: false,
            fix_k3: true,
            iters: 8,
        }
    }
}

impl DistortionFitOptions {
    fn n_params(&self) -> usize {
        2 + usize::from(!self.fix_k3) + 2 * usize::from(!self.fix_tangential)
    }
}

/// One view for the distortion fit: its homography and raw correspondences.
#[derive(Debug, Clone)]
pub struct DistortionView {
    pub homography: Mat3,
    pub board_points: Vec<Pt2>,
    pub pixel_points: Vec<Pt2>,
}

impl DistortionView {
    pub fn new(
        homography: Mat3,
        board_points: Vec<Pt2>,
        pixel_points: Vec<Pt2>,
    ) -> Result<Self, DistortionFitError> {
        if board_points.len() != pixel_points.len() {
            return Err(DistortionFitError::CountMismatch(
                board_points.len(),
                pixel_points.len(),
            ));
        }
        Ok(Self {
            homography,
            board_points,
            pixel_points,
        })
    }
}

pub fn estimate_distortion_from_homographies(
    intrinsics: &Mat3,
    views: &[DistortionView],
    opts: DistortionFitOptions,
) -> Result<BrownConrady5<Real>, DistortionFitError> {
    let total_points: usize = views.iter().map(|v| v.board_points.len()).sum();
    let n_params = opts.n_params();
    let min_points = n_params.div_ceil(2) + 2;
    if total_points < min_points {
        return Err(DistortionFitError::NotEnoughPoints(min_points, total_points));
    }

    let k_inv = intrinsics
        .try_inverse()
        .ok_or(DistortionFitError::IntrinsicsNotInvertible)?;

    let mut a = DMatrix::<Real>::zeros(2 * total_points, n_params);
    let mut b = DVector::<Real>::zeros(2 * total_points);
    let mut max_r2: Real = 0.0;

    let mut row = 0;
    for view in views {
        for (board_pt, pixel_obs) in view.board_points.iter().zip(&view.pixel_points) {
            let pixel_ideal = from_homogeneous(&(view.homography * to_homogeneous(board_pt)));
            let n_ideal = from_homogeneous(&(k_inv * to_homogeneous(&pixel_ideal)));
            let n_obs = from_homogeneous(&(k_inv * to_homogeneous(pixel_obs)));
            let residual = n_obs - n_ideal;

            let (x, y) = (n_ideal.x, n_ideal.y);
            let r2 = x * x + y * y;
            max_r2 = max_r2.max(r2);

            let mut col = 0;
            for power in [r2, r2 * r2] {
                a[(row, col)] = x * power;
                a[(row + 1, col)] = y * power;
                col += 1;
            }
            if !opts.fix_k3 {
                let r6 = r2 * r2 * r2;
                a[(row, col)] = x * r6;
                a[(row + 1, col)] = y * r6;
                col += 1;
            }
            if !opts.fix_tangential {
                a[(row, col)] = 2.0 * x * y;
                a[(row + 1, col)] = r2 + 2.0 * y * y;
                a[(row, col + 1)] = r2 + 2.0 * x * x;
                a[(row + 1, col + 1)] = 2.0 * x * y;
            }

            b[row] = residual.x;
            b[row + 1] = residual.y;
            row += 2;
        }
    }

    if max_r2 < 1e-6 {
        return Err(DistortionFitError::DegenerateConfiguration);
    }

    let x = a
        .svd(true, true)
        .solve(&b, 1e-10)
        .map_err(|_| DistortionFitError::SvdFailed)?;

    let mut it = x.iter().copied();
    let mut next = || it.next().unwrap_or(0.0);
    let k1 = next();
    let k2 = next();
    let k3 = if opts.fix_k3 { 0.0 } else { next() };
    let (p1, p2) = if opts.fix_tangential {
        (0.0, 0.0)
    } else {
        (next(), next())
    };

    Ok(BrownConrady5 {
        k1,
        k2,
        k3,
        p1,
        p2,
        iters: opts.iters,
    })
}

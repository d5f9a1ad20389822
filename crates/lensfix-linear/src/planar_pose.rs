//! Board pose from a plane homography.
//!
//! With `K` known, `K^{-1} H ∝ [r1 r2 t]` for a board on `z = 0`. The scaled
//! columns are projected onto SO(3) via SVD.

use lensfix_core::{Iso3, Mat3, Real};
use nalgebra::{Matrix3, Rotation3, Translation3, UnitQuaternion, Vector3};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanarPoseError {
    #[error("intrinsics matrix is not invertible")]
    IntrinsicsNotInvertible,
    #[error("degenerate homography for planar pose extraction")]
    Degenerate,
    #[error("svd failed during planar pose extraction")]
    SvdFailed,
}

/// Pose `T_C_B` of the board in the camera frame.
pub fn estimate_planar_pose_from_h(kmtx: &Mat3, hmtx: &Mat3) -> Result<Iso3, PlanarPoseError> {
    let k_inv = kmtx
        .try_inverse()
        .ok_or(PlanarPoseError::IntrinsicsNotInvertible)?;

    let k_inv_h1 = k_inv * hmtx.column(0);
    let k_inv_h2 = k_inv * hmtx.column(1);

    let norm1 = k_inv_h1.norm();
    let norm2 = k_inv_h2.norm();
    if norm1 <= 1e-12 || norm2 <= 1e-12 {
        return Err(PlanarPoseError::Degenerate);
    }
    let lambda = 2.0 / (norm1 + norm2);

    let mut r1 = lambda * k_inv_h1;
    let mut r2 = lambda * k_inv_h2;
    let mut t: Vector3<Real> = lambda * (k_inv * hmtx.column(2));
    // Board in front of the camera.
    if t.z < 0.0 {
        r1 = -r1;
        r2 = -r2;
        t = -t;
    }
    let r3 = r1.cross(&r2);
    if r3.norm() <= 1e-12 {
        return Err(PlanarPoseError::Degenerate);
    }

    let mut r_mat = Matrix3::<Real>::zeros();
    r_mat.set_column(0, &r1);
    r_mat.set_column(1, &r2);
    r_mat.set_column(2, &r3);

    let svd = r_mat.svd(true, true);
    let u = svd.u.ok_or(PlanarPoseError::SvdFailed)?;
    let v_t = svd.v_t.ok_or(PlanarPoseError::SvdFailed)?;
    let mut r_orth = u * v_t;
    if r_orth.determinant() < 0.0 {
        let mut u_flipped = u;
        u_flipped.column_mut(2).neg_mut();
        r_orth = u_flipped * v_t;
    }

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r_orth));
    Ok(Iso3::from_parts(Translation3::from(t), rot))
}

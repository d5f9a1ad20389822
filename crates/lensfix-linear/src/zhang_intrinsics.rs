//! Intrinsics from plane homographies.
//!
//! [`estimate_intrinsics_from_homographies`] is Zhang's closed form and needs
//! three or more views. [`estimate_focal_with_center`] fixes the principal
//! point and assumes square pixels, which leaves a single unknown and works
//! from one view.

use lensfix_core::{FxFyCxCySkew, Mat3, Real};
use nalgebra::{DMatrix, SVector};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ZhangError {
    #[error("need at least {required} homographies, got {got}")]
    NotEnoughViews { required: usize, got: usize },
    #[error("svd failed during intrinsics estimation")]
    SvdFailed,
    #[error("degenerate configuration in intrinsics estimation")]
    Degenerate,
    #[error("invalid sign for lambda; check homographies")]
    InvalidSign,
    #[error("boards are fronto-parallel; focal length is unobservable")]
    FocalUnobservable,
}

/// The 6-vector `v_ij(H)` of Zhang's method.
fn v_ij(h: &Mat3, i: usize, j: usize) -> SVector<Real, 6> {
    let hi = h.column(i);
    let hj = h.column(j);

    SVector::<Real, 6>::from_row_slice(&[
        hi[0] * hj[0],
        hi[0] * hj[1] + hi[1] * hj[0],
        hi[1] * hj[1],
        hi[2] * hj[0] + hi[0] * hj[2],
        hi[2] * hj[1] + hi[1] * hj[2],
        hi[2] * hj[2],
    ])
}

/// Zhang's closed-form intrinsics (no distortion) from at least 3 homographies.
pub fn estimate_intrinsics_from_homographies(
    hs: &[Mat3],
) -> Result<FxFyCxCySkew<Real>, ZhangError> {
    if hs.len() < 3 {
        return Err(ZhangError::NotEnoughViews {
            required: 3,
            got: hs.len(),
        });
    }

    // Rows are padded to 6 so V^T is square.
    let m = hs.len();
    let mut vmtx = DMatrix::<Real>::zeros((2 * m).max(6), 6);
    for (k, h) in hs.iter().enumerate() {
        // Homographies carry arbitrary scale; bring them to unit norm for conditioning.
        let h = h / h.norm();
        let v11 = v_ij(&h, 0, 0);
        let v22 = v_ij(&h, 1, 1);
        let v12 = v_ij(&h, 0, 1);

        vmtx.row_mut(2 * k).copy_from(&v12.transpose());
        vmtx.row_mut(2 * k + 1).copy_from(&(v11 - v22).transpose());
    }

    let svd = vmtx.svd(false, true);
    let v_t = svd.v_t.ok_or(ZhangError::SvdFailed)?;
    let min_idx = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .ok_or(ZhangError::SvdFailed)?;
    let b = v_t.row(min_idx);

    let (b11, b12, b22, b13, b23, b33) = (b[0], b[1], b[2], b[3], b[4], b[5]);

    let denom = b11 * b22 - b12 * b12;
    let denom_norm = b11 * b11 + b22 * b22;
    if denom_norm <= 0.0 || denom.abs() / denom_norm <= 1e-6 {
        return Err(ZhangError::Degenerate);
    }

    let v0 = (b12 * b13 - b11 * b23) / denom;
    let lambda = b33 - (b13 * b13 + v0 * (b12 * b13 - b11 * b23)) / b11;
    if lambda.signum() != b11.signum() || lambda * b11 / denom <= 0.0 {
        return Err(ZhangError::InvalidSign);
    }

    let alpha = (lambda / b11).sqrt();
    let beta = (lambda * b11 / denom).sqrt();
    let gamma = -b12 * alpha * alpha * beta / lambda;
    let u0 = gamma * v0 / beta - b13 * alpha * alpha / lambda;

    let k = FxFyCxCySkew {
        fx: alpha,
        fy: beta,
        cx: u0,
        cy: v0,
        skew: gamma,
    };
    if [k.fx, k.fy, k.cx, k.cy, k.skew].iter().any(|v| !v.is_finite()) {
        return Err(ZhangError::Degenerate);
    }
    Ok(k)
}

/// Focal length with the principal point pinned at `(cx, cy)` and `fx == fy`.
///
/// With the principal point shifted to the origin, `B = diag(w, w, 1)` with
/// `w = 1 / f²`, and each homography gives two linear equations in `w`.
/// Solved in least squares over all views.
pub fn estimate_focal_with_center(
    hs: &[Mat3],
    cx: Real,
    cy: Real,
) -> Result<FxFyCxCySkew<Real>, ZhangError> {
    if hs.is_empty() {
        return Err(ZhangError::NotEnoughViews {
            required: 1,
            got: 0,
        });
    }

    let shift = Mat3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);
    let mut num = 0.0;
    let mut den = 0.0;
    for h in hs {
        let h = shift * h;
        let h = h / h.norm();
        let (h1, h2) = (h.column(0), h.column(1));

        // h1ᵀ B h2 = 0
        let a0 = h1[0] * h2[0] + h1[1] * h2[1];
        let c0 = h1[2] * h2[2];
        // h1ᵀ B h1 = h2ᵀ B h2
        let a1 = h1[0] * h1[0] + h1[1] * h1[1] - h2[0] * h2[0] - h2[1] * h2[1];
        let c1 = h1[2] * h1[2] - h2[2] * h2[2];

        num -= a0 * c0 + a1 * c1;
        den += a0 * a0 + a1 * a1;
    }

    if den <= f64::EPSILON {
        return Err(ZhangError::Degenerate);
    }
    let w = num / den;
    if !(w.is_finite() && w > 0.0) {
        return Err(ZhangError::FocalUnobservable);
    }
    let f = 1.0 / w.sqrt();

    Ok(FxFyCxCySkew {
        fx: f,
        fy: f,
        cx,
        cy,
        skew: 0.0,
    })
}

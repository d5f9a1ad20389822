//! Alternating estimation of intrinsics and distortion.
//!
//! Zhang's method assumes an ideal pinhole, so on a distorted lens its `K` is
//! biased. Each iteration fits distortion against the current `K`, undistorts
//! the observed corners, recomputes homographies and re-estimates `K`.
//!
//! The first fit is seeded by a search over a purely radial `k1`. Without it
//! the homographies of the still distorted corners soak up the dominant
//! radial term and the linear fit can come out with the wrong sign.

use crate::{
    distortion_fit::{
        estimate_distortion_from_homographies, DistortionFitError, DistortionFitOptions,
        DistortionView,
    },
    homography::{dlt_homography, homography_transfer_error, HomographyError},
    zhang_intrinsics::{estimate_focal_with_center, estimate_intrinsics_from_homographies, ZhangError},
};
use lensfix_core::{
    from_homogeneous, to_homogeneous, BrownConrady5, DistortionModel, FxFyCxCySkew, Mat3, Pt2,
    Real, Vec2,
};
use log::debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IterativeIntrinsicsError {
    #[error("intrinsics estimation failed: {0}")]
    Intrinsics(#[from] ZhangError),
    #[error("distortion estimation failed: {0}")]
    Distortion(#[from] DistortionFitError),
    #[error("homography estimation failed in view {view}: {source}")]
    Homography {
        view: usize,
        #[source]
        source: HomographyError,
    },
    #[error("no views to initialise from")]
    NoViews,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterativeIntrinsicsOptions {
    /// Distortion / intrinsics alternations after the plain Zhang estimate.
    pub iterations: usize,
    pub distortion_opts: DistortionFitOptions,
    pub zero_skew: bool,
    /// Principal point used when Zhang's method is unavailable (fewer than
    /// three views) or fails on the data.
    pub principal_point_hint: Option<[Real; 2]>,
}

impl Default for IterativeIntrinsicsOptions {
    fn default() -> Self {
        Self {
            iterations: 2,
            distortion_opts: DistortionFitOptions::default(),
            zero_skew: true,
            principal_point_hint: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct IterativeIntrinsicsResult {
    pub intrinsics: FxFyCxCySkew<Real>,
    pub distortion: BrownConrady5<Real>,
    /// Homographies computed from the finally undistorted corners.
    pub homographies: Vec<Mat3>,
}

/// Board and pixel coordinates of one calibration image.
#[derive(Debug, Clone)]
pub struct IterativeCalibView {
    pub board_points: Vec<Pt2>,
    pub pixel_points: Vec<Pt2>,
}

impl IterativeCalibView {
    pub fn new(board_points: Vec<Pt2>, pixel_points: Vec<Pt2>) -> Self {
        Self {
            board_points,
            pixel_points,
        }
    }
}

/// Smallest and largest `k1` tried by the radial seed search.
const RADIAL_SEED_BOUND: Real = 1.0;
/// Grid intervals of the coarse radial scan.
const RADIAL_SEED_GRID: usize = 40;
/// Cost evaluations of the golden-section refinement inside the best grid cell.
const RADIAL_SEED_REFINE: usize = 32;

pub fn estimate_intrinsics_iterative(
    views: &[IterativeCalibView],
    opts: IterativeIntrinsicsOptions,
) -> Result<IterativeIntrinsicsResult, IterativeIntrinsicsError> {
    if views.is_empty() {
        return Err(IterativeIntrinsicsError::NoViews);
    }

    let raw_homographies = homographies_for(views, None)?;
    let mut intrinsics = linear_intrinsics(&raw_homographies, &opts)?;

    // Homographies fitted to distorted corners absorb part of the radial
    // term, so the linear fit only sees reliable residuals once the corners
    // are roughly undistorted. Seed that with a one-parameter search.
    let seed_k1 = radial_seed(views, &intrinsics.k_matrix(), opts.distortion_opts.iters);
    let mut distortion = BrownConrady5 {
        k1: seed_k1,
        k2: 0.0,
        k3: 0.0,
        p1: 0.0,
        p2: 0.0,
        iters: opts.distortion_opts.iters,
    };
    let mut homographies = homographies_for(views, Some((&intrinsics.k_matrix(), &distortion)))?;
    match linear_intrinsics(&homographies, &opts) {
        Ok(k) => intrinsics = k,
        Err(err) => debug!("radial seed: keeping raw intrinsics ({err})"),
    }
    debug!(
        "radial seed: k1={seed_k1:.4} fx={:.2} fy={:.2}",
        intrinsics.fx, intrinsics.fy
    );

    for iter in 0..opts.iterations {
        let k_mtx = intrinsics.k_matrix();
        let dist_views = views
            .iter()
            .zip(&homographies)
            .map(|(v, h)| DistortionView::new(*h, v.board_points.clone(), v.pixel_points.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let fitted =
            estimate_distortion_from_homographies(&k_mtx, &dist_views, opts.distortion_opts)?;
        let fitted_cost = undistortion_cost(views, &k_mtx, &fitted);
        let current_cost = undistortion_cost(views, &k_mtx, &distortion);
        if fitted_cost <= current_cost {
            distortion = fitted;
        } else {
            debug!(
                "iteration {iter}: linear fit k1={:.4} worse than k1={:.4} ({fitted_cost:.3e} > {current_cost:.3e})",
                fitted.k1, distortion.k1
            );
        }

        homographies = homographies_for(views, Some((&k_mtx, &distortion)))?;
        match linear_intrinsics(&homographies, &opts) {
            Ok(k) => intrinsics = k,
            Err(err) => {
                debug!("iteration {iter}: keeping previous intrinsics ({err})");
            }
        }
        debug!(
            "iteration {iter}: fx={:.2} fy={:.2} cx={:.2} cy={:.2} k1={:.4}",
            intrinsics.fx, intrinsics.fy, intrinsics.cx, intrinsics.cy, distortion.k1
        );
    }

    Ok(IterativeIntrinsicsResult {
        intrinsics,
        distortion,
        homographies,
    })
}

fn linear_intrinsics(
    homographies: &[Mat3],
    opts: &IterativeIntrinsicsOptions,
) -> Result<FxFyCxCySkew<Real>, ZhangError> {
    let zhang = estimate_intrinsics_from_homographies(homographies);
    let mut k = match (zhang, opts.principal_point_hint) {
        (Ok(k), _) if k.fx > 0.0 && k.fy > 0.0 => k,
        (Ok(_), None) => return Err(ZhangError::Degenerate),
        (Err(err), None) => return Err(err),
        (result, Some([cx, cy])) => {
            if let Err(err) = result {
                debug!("zhang init unavailable ({err}); pinning principal point");
            }
            estimate_focal_with_center(homographies, cx, cy)?
        }
    };
    if opts.zero_skew {
        k.skew = 0.0;
    }
    Ok(k)
}

/// Pixel positions after removing `dist`, expressed through the same `k`.
fn undistort_view(view: &IterativeCalibView, k: &Mat3, k_inv: &Mat3, dist: &BrownConrady5<Real>) -> Vec<Pt2> {
    view.pixel_points
        .iter()
        .map(|p| {
            let n = dist.undistort(&from_homogeneous(&(k_inv * to_homogeneous(p))).coords);
            from_homogeneous(&(k * to_homogeneous(&n.into())))
        })
        .collect()
}

fn homographies_for(
    views: &[IterativeCalibView],
    undistort: Option<(&Mat3, &BrownConrady5<Real>)>,
) -> Result<Vec<Mat3>, IterativeIntrinsicsError> {
    let k_inv = match undistort {
        Some((k, _)) => Some(
            k.try_inverse()
                .ok_or(DistortionFitError::IntrinsicsNotInvertible)?,
        ),
        None => None,
    };

    views
        .iter()
        .enumerate()
        .map(|(idx, v)| {
            let pixels = match (undistort, k_inv.as_ref()) {
                (Some((k, dist)), Some(k_inv)) => undistort_view(v, k, k_inv, dist),
                _ => v.pixel_points.clone(),
            };
            dlt_homography(&v.board_points, &pixels)
                .map_err(|source| IterativeIntrinsicsError::Homography { view: idx, source })
        })
        .collect()
}

/// How far the corners are from a perfect projective image of the board once
/// `dist` is removed: squared DLT transfer error, normalised per view by the
/// spread of its corners. Infinite when a view cannot be fitted.
fn undistortion_cost(views: &[IterativeCalibView], k: &Mat3, dist: &BrownConrady5<Real>) -> Real {
    let Some(k_inv) = k.try_inverse() else {
        return Real::INFINITY;
    };
    let mut total = 0.0;
    for view in views {
        let pixels = undistort_view(view, k, &k_inv, dist);
        if pixels.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
            return Real::INFINITY;
        }
        let Ok(h) = dlt_homography(&view.board_points, &pixels) else {
            return Real::INFINITY;
        };
        let n = pixels.len() as Real;
        let centroid = pixels.iter().fold(Vec2::zeros(), |acc, p| acc + p.coords) / n;
        let spread = pixels
            .iter()
            .map(|p| (p.coords - centroid).norm_squared())
            .sum::<Real>()
            / n;
        if spread <= 0.0 {
            return Real::INFINITY;
        }
        let error: Real = view
            .board_points
            .iter()
            .zip(&pixels)
            .map(|(b, p)| homography_transfer_error(&h, b, p).powi(2))
            .sum();
        total += error / spread;
    }
    if total.is_finite() {
        total
    } else {
        Real::INFINITY
    }
}

/// Purely radial `k1` that makes the undistorted corners most projective
/// under `k`: a coarse scan over `±RADIAL_SEED_BOUND` refined by golden
/// section inside the best cell.
fn radial_seed(views: &[IterativeCalibView], k: &Mat3, iters: u32) -> Real {
    let cost = |k1: Real| {
        let dist = BrownConrady5 {
            k1,
            k2: 0.0,
            k3: 0.0,
            p1: 0.0,
            p2: 0.0,
            iters,
        };
        undistortion_cost(views, k, &dist)
    };

    let step = 2.0 * RADIAL_SEED_BOUND / RADIAL_SEED_GRID as Real;
    let mut best = (0.0, cost(0.0));
    for i in 0..=RADIAL_SEED_GRID {
        let k1 = -RADIAL_SEED_BOUND + i as Real * step;
        let c = cost(k1);
        if c < best.1 {
            best = (k1, c);
        }
    }
    if !best.1.is_finite() {
        return 0.0;
    }

    let (refined, refined_cost) =
        golden_section_minimize(cost, best.0 - step, best.0 + step, RADIAL_SEED_REFINE);
    if refined_cost < best.1 {
        refined
    } else {
        best.0
    }
}

/// Golden-section search for the minimum of `f` on `[a, b]`; returns
/// `(x_min, f_min)`.
fn golden_section_minimize(f: impl Fn(Real) -> Real, mut a: Real, mut b: Real, max_evals: usize) -> (Real, Real) {
    const PHI: Real = 1.618_033_988_749_895;
    const RESP: Real = 2.0 - PHI;

    let mut x1 = a + RESP * (b - a);
    let mut x2 = b - RESP * (b - a);
    let mut f1 = f(x1);
    let mut f2 = f(x2);
    for _ in 2..max_evals {
        if f1 < f2 {
            b = x2;
            x2 = x1;
            f2 = f1;
            x1 = a + RESP * (b - a);
            f1 = f(x1);
        } else {
            a = x1;
            x1 = x2;
            f1 = f2;
            x2 = b - RESP * (b - a);
            f2 = f(x2);
        }
    }
    if f1 < f2 {
        (x1, f1)
    } else {
        (x2, f2)
    }
}

//! Bundle adjustment for planar calibration.
//!
//! Parameter layout (global): `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` followed
//! by one `[wx, wy, wz, tx, ty, tz]` block per view (axis-angle + translation
//! of the board in the camera frame). Skew is held at zero.
//!
//! Parameters flagged in [`IntrinsicsFixMask`] are removed from the solver
//! vector and keep their initial values. The Jacobian is assembled view by
//! view: each view only touches the shared camera block and its own pose,
//! so central differences are taken over that 15-wide local block and
//! scattered into the global matrix.

use crate::{LmBackend, NllsProblem, NllsSolverBackend, RobustKernel, SolveOptions, SolveReport};
use anyhow::{ensure, Result};
use lensfix_core::{
    BrownConrady5, CorrespondenceView, DistortionModel, FxFyCxCySkew, Iso3, Real,
    ReprojectionStats, Vec2,
};
use log::debug;
use nalgebra::{DMatrix, DVector, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

pub const INTRINSICS_DIM: usize = 9;
pub const POSE_DIM: usize = 6;
const LOCAL_DIM: usize = INTRINSICS_DIM + POSE_DIM;

/// Camera parameters held constant during refinement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntrinsicsFixMask {
    pub fx: bool,
    pub fy: bool,
    pub cx: bool,
    pub cy: bool,
    pub k1: bool,
    pub k2: bool,
    pub p1: bool,
    pub p2: bool,
    pub k3: bool,
}

impl IntrinsicsFixMask {
    /// Mask that pins only the principal point.
    pub fn principal_point() -> Self {
        Self {
            cx: true,
            cy: true,
            ..Self::default()
        }
    }

    /// Same order as the camera block of the parameter vector.
    fn as_array(&self) -> [bool; INTRINSICS_DIM] {
        [
            self.fx, self.fy, self.cx, self.cy, self.k1, self.k2, self.p1, self.p2, self.k3,
        ]
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            fx: self.fx || other.fx,
            fy: self.fy || other.fy,
            cx: self.cx || other.cx,
            cy: self.cy || other.cy,
            k1: self.k1 || other.k1,
            k2: self.k2 || other.k2,
            p1: self.p1 || other.p1,
            p2: self.p2 || other.p2,
            k3: self.k3 || other.k3,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanarIntrinsicsSolveOptions {
    pub robust_kernel: RobustKernel,
    pub fix_intrinsics: IntrinsicsFixMask,
}

/// Starting point for the refinement, usually from `lensfix-linear`.
#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsInit {
    pub intrinsics: FxFyCxCySkew<Real>,
    pub distortion: BrownConrady5<Real>,
    /// Board-to-camera poses, one per view.
    pub poses: Vec<Iso3>,
}

#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsResult {
    pub intrinsics: FxFyCxCySkew<Real>,
    pub distortion: BrownConrady5<Real>,
    pub poses: Vec<Iso3>,
    pub final_cost: Real,
    /// Mean reprojection error per view, in pixels.
    pub per_view_errors: Vec<Real>,
    pub reprojection: ReprojectionStats,
    pub report: SolveReport,
}

#[derive(Debug, Clone)]
pub struct PlanarIntrinsicsProblem {
    views: Vec<CorrespondenceView>,
    /// Full parameter vector; fixed entries are read from here.
    base: DVector<Real>,
    /// Global indices of the free parameters, in solver order.
    free: Vec<usize>,
    /// Global index -> solver column.
    column_of: Vec<Option<usize>>,
    /// First residual row of each view.
    row_offsets: Vec<usize>,
    kernel: RobustKernel,
}

impl PlanarIntrinsicsProblem {
    pub fn new(
        views: Vec<CorrespondenceView>,
        init: &PlanarIntrinsicsInit,
        opts: &PlanarIntrinsicsSolveOptions,
    ) -> Result<Self> {
        ensure!(!views.is_empty(), "need at least one view for calibration");
        ensure!(
            views.len() == init.poses.len(),
            "{} views but {} initial poses",
            views.len(),
            init.poses.len()
        );
        for (idx, view) in views.iter().enumerate() {
            ensure!(view.len() >= 4, "view {idx} has too few points (need >= 4)");
            ensure!(view.is_planar(), "view {idx}: board points must lie on z = 0");
        }

        let base = pack_params(init);
        let fixed = opts.fix_intrinsics.as_array();
        let free: Vec<usize> = (0..base.len())
            .filter(|&i| i >= INTRINSICS_DIM || !fixed[i])
            .collect();
        let mut column_of = vec![None; base.len()];
        for (col, &global) in free.iter().enumerate() {
            column_of[global] = Some(col);
        }

        let mut row_offsets = Vec::with_capacity(views.len());
        let mut rows = 0;
        for view in &views {
            row_offsets.push(rows);
            rows += 2 * view.len();
        }

        Ok(Self {
            views,
            base,
            free,
            column_of,
            row_offsets,
            kernel: opts.robust_kernel,
        })
    }

    pub fn num_views(&self) -> usize {
        self.views.len()
    }

    /// Solver vector at the initial guess.
    pub fn initial_params(&self) -> DVector<Real> {
        DVector::from_iterator(self.free.len(), self.free.iter().map(|&i| self.base[i]))
    }

    fn expand(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut full = self.base.clone();
        for (col, &global) in self.free.iter().enumerate() {
            full[global] = x[col];
        }
        full
    }

    fn pose_offset(view_idx: usize) -> usize {
        INTRINSICS_DIM + POSE_DIM * view_idx
    }

    fn local_params(full: &DVector<Real>, view_idx: usize) -> [Real; LOCAL_DIM] {
        let mut local = [0.0; LOCAL_DIM];
        local[..INTRINSICS_DIM].copy_from_slice(&full.as_slice()[..INTRINSICS_DIM]);
        let offset = Self::pose_offset(view_idx);
        local[INTRINSICS_DIM..].copy_from_slice(&full.as_slice()[offset..offset + POSE_DIM]);
        local
    }

    /// Camera, distortion and poses encoded by a solver vector.
    pub fn decode(
        &self,
        x: &DVector<Real>,
    ) -> (FxFyCxCySkew<Real>, BrownConrady5<Real>, Vec<Iso3>) {
        let full = self.expand(x);
        let (k, dist) = decode_camera(&full.as_slice()[..INTRINSICS_DIM]);
        let poses = (0..self.num_views())
            .map(|v| {
                let o = Self::pose_offset(v);
                decode_pose(&full.as_slice()[o..o + POSE_DIM])
            })
            .collect();
        (k, dist, poses)
    }
}

fn pack_params(init: &PlanarIntrinsicsInit) -> DVector<Real> {
    let k = &init.intrinsics;
    let d = &init.distortion;
    let mut x = DVector::zeros(INTRINSICS_DIM + POSE_DIM * init.poses.len());
    x.as_mut_slice()[..INTRINSICS_DIM]
        .copy_from_slice(&[k.fx, k.fy, k.cx, k.cy, d.k1, d.k2, d.p1, d.p2, d.k3]);

    for (i, pose) in init.poses.iter().enumerate() {
        let o = INTRINSICS_DIM + POSE_DIM * i;
        let w = pose.rotation.scaled_axis();
        let t = pose.translation.vector;
        x.as_mut_slice()[o..o + POSE_DIM].copy_from_slice(&[w.x, w.y, w.z, t.x, t.y, t.z]);
    }
    x
}

fn decode_camera(p: &[Real]) -> (FxFyCxCySkew<Real>, BrownConrady5<Real>) {
    (
        FxFyCxCySkew {
            fx: p[0],
            fy: p[1],
            cx: p[2],
            cy: p[3],
            skew: 0.0,
        },
        BrownConrady5 {
            k1: p[4],
            k2: p[5],
            p1: p[6],
            p2: p[7],
            k3: p[8],
            iters: 8,
        },
    )
}

fn decode_pose(p: &[Real]) -> Iso3 {
    let rotation = UnitQuaternion::from_scaled_axis(Vector3::new(p[0], p[1], p[2]));
    Iso3::from_parts(Translation3::new(p[3], p[4], p[5]), rotation)
}

/// Observed minus projected pixel, two rows per corner, written into `out`.
fn residuals_view(local: &[Real; LOCAL_DIM], view: &CorrespondenceView, out: &mut [Real]) {
    let (k, dist) = decode_camera(&local[..INTRINSICS_DIM]);
    let pose = decode_pose(&local[INTRINSICS_DIM..]);

    for (i, (pw, meas)) in view.iter().enumerate() {
        let pc = pose.transform_point(pw);
        let z = pc.z.max(1e-9);
        let nd = dist.distort(&Vec2::new(pc.x / z, pc.y / z));
        out[2 * i] = meas.x - (k.fx * nd.x + k.cx);
        out[2 * i + 1] = meas.y - (k.fy * nd.y + k.cy);
    }
}

impl NllsProblem for PlanarIntrinsicsProblem {
    fn num_params(&self) -> usize {
        self.free.len()
    }

    fn num_residuals(&self) -> usize {
        self.views.iter().map(|v| 2 * v.len()).sum()
    }

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real> {
        let full = self.expand(x);
        let mut r = DVector::zeros(self.num_residuals());
        for (v, view) in self.views.iter().enumerate() {
            let local = Self::local_params(&full, v);
            let start = self.row_offsets[v];
            residuals_view(&local, view, &mut r.as_mut_slice()[start..start + 2 * view.len()]);
        }
        r
    }

    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let full = self.expand(x);
        let mut j = DMatrix::zeros(self.num_residuals(), self.num_params());

        for (v, view) in self.views.iter().enumerate() {
            let local = Self::local_params(&full, v);
            let rows = 2 * view.len();
            let start = self.row_offsets[v];
            let mut r_plus = vec![0.0; rows];
            let mut r_minus = vec![0.0; rows];

            for k in 0..LOCAL_DIM {
                let global = if k < INTRINSICS_DIM {
                    k
                } else {
                    Self::pose_offset(v) + (k - INTRINSICS_DIM)
                };
                let Some(col) = self.column_of[global] else {
                    continue;
                };

                let h = 1e-6 * local[k].abs().max(1.0);
                let mut p = local;
                p[k] = local[k] + h;
                residuals_view(&p, view, &mut r_plus);
                p[k] = local[k] - h;
                residuals_view(&p, view, &mut r_minus);

                for row in 0..rows {
                    j[(start + row, col)] = (r_plus[row] - r_minus[row]) / (2.0 * h);
                }
            }
        }
        j
    }

    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        let mut scales = DVector::from_element(r_unweighted.len(), 1.0);
        if self.kernel == RobustKernel::None {
            return scales;
        }
        for i in (0..r_unweighted.len()).step_by(2) {
            let r2 = r_unweighted[i].powi(2) + r_unweighted[i + 1].powi(2);
            let (_, w) = self.kernel.rho_and_weight(r2);
            let s = w.sqrt();
            scales[i] = s;
            scales[i + 1] = s;
        }
        scales
    }
}

/// Refine intrinsics, distortion and per-view poses with [`LmBackend`].
///
/// Non-convergence is reported in [`PlanarIntrinsicsResult::report`], not as
/// an error; the caller decides whether it is acceptable. Non-finite
/// parameters are an error.
pub fn optimize_planar_intrinsics(
    views: &[CorrespondenceView],
    init: &PlanarIntrinsicsInit,
    opts: &PlanarIntrinsicsSolveOptions,
    backend_opts: &SolveOptions,
) -> Result<PlanarIntrinsicsResult> {
    let problem = PlanarIntrinsicsProblem::new(views.to_vec(), init, opts)?;
    let x0 = problem.initial_params();
    debug!(
        "planar intrinsics: {} views, {} free params, {} residuals",
        problem.num_views(),
        problem.num_params(),
        problem.num_residuals()
    );

    let (x, report) = LmBackend.solve(&problem, x0, backend_opts);
    ensure!(
        x.iter().all(|v| v.is_finite()),
        "optimizer produced non-finite parameters ({})",
        report.termination
    );

    let (intrinsics, distortion, poses) = problem.decode(&x);
    let r = problem.residuals_unweighted(&x);
    let mut all_errors = Vec::with_capacity(r.len() / 2);
    let mut per_view_errors = Vec::with_capacity(views.len());
    for (v, view) in problem.views.iter().enumerate() {
        let start = problem.row_offsets[v];
        let errors: Vec<Real> = (0..view.len())
            .map(|i| r[start + 2 * i].hypot(r[start + 2 * i + 1]))
            .collect();
        per_view_errors.push(errors.iter().sum::<Real>() / errors.len() as Real);
        all_errors.extend(errors);
    }

    Ok(PlanarIntrinsicsResult {
        intrinsics,
        distortion,
        poses,
        final_cost: report.final_cost,
        per_view_errors,
        reprojection: ReprojectionStats::from_errors(&all_errors),
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_core::{synthetic::planar, Camera, Pinhole};

    fn ground_truth() -> (FxFyCxCySkew<Real>, BrownConrady5<Real>) {
        (
            FxFyCxCySkew {
                fx: 800.0,
                fy: 790.0,
                cx: 320.0,
                cy: 240.0,
                skew: 0.0,
            },
            BrownConrady5 {
                k1: -0.2,
                k2: 0.05,
                k3: 0.0,
                p1: 0.001,
                p2: -0.001,
                iters: 8,
            },
        )
    }

    fn views_and_init() -> (Vec<CorrespondenceView>, PlanarIntrinsicsInit) {
        let (k, d) = ground_truth();
        let cam = Camera::new(Pinhole, d, k);
        let poses = planar::poses_tilted(4, 0.5);
        let views =
            planar::project_views_all(&cam, &planar::grid_points(9, 6, 0.025), &poses).unwrap();
        (
            views,
            PlanarIntrinsicsInit {
                intrinsics: k,
                distortion: d,
                poses,
            },
        )
    }

    #[test]
    fn residuals_vanish_at_ground_truth() {
        let (views, init) = views_and_init();
        let problem =
            PlanarIntrinsicsProblem::new(views, &init, &PlanarIntrinsicsSolveOptions::default())
                .unwrap();
        let r = problem.residuals_unweighted(&problem.initial_params());
        assert!(r.amax() < 1e-9, "max residual {}", r.amax());
    }

    #[test]
    fn fix_mask_shrinks_parameter_vector() {
        let (views, init) = views_and_init();
        let opts = PlanarIntrinsicsSolveOptions {
            fix_intrinsics: IntrinsicsFixMask::principal_point(),
            ..Default::default()
        };
        let problem = PlanarIntrinsicsProblem::new(views, &init, &opts).unwrap();

        assert_eq!(problem.num_params(), INTRINSICS_DIM - 2 + 4 * POSE_DIM);
        let j = problem.jacobian_unweighted(&problem.initial_params());
        assert_eq!(j.ncols(), problem.num_params());
        assert_eq!(j.nrows(), problem.num_residuals());
    }

    #[test]
    fn decode_roundtrips_initial_guess() {
        let (views, init) = views_and_init();
        let problem =
            PlanarIntrinsicsProblem::new(views, &init, &PlanarIntrinsicsSolveOptions::default())
                .unwrap();
        let (k, d, poses) = problem.decode(&problem.initial_params());

        assert_eq!(k, init.intrinsics);
        assert!((d.k1 - init.distortion.k1).abs() < 1e-15);
        for (a, b) in poses.iter().zip(&init.poses) {
            assert!((a.translation.vector - b.translation.vector).norm() < 1e-12);
            assert!(a.rotation.angle_to(&b.rotation) < 1e-12);
        }
    }

    #[test]
    fn mismatched_pose_count_is_rejected() {
        let (views, mut init) = views_and_init();
        init.poses.pop();
        assert!(
            PlanarIntrinsicsProblem::new(views, &init, &PlanarIntrinsicsSolveOptions::default())
                .is_err()
        );
    }
}

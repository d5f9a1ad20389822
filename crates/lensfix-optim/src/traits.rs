use lensfix_core::Real;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Non-linear least squares problem with dense parameter/residual vectors.
///
/// The default implementations apply robust IRLS row scaling without
/// differentiating the weights: residuals and Jacobian rows are scaled by
/// `sqrt(w_i)` computed from the unweighted residuals.
pub trait NllsProblem {
    fn num_params(&self) -> usize;
    fn num_residuals(&self) -> usize;

    fn residuals_unweighted(&self, x: &DVector<Real>) -> DVector<Real>;
    fn jacobian_unweighted(&self, x: &DVector<Real>) -> DMatrix<Real>;

    /// Per-row IRLS scales (`sqrt(weights)`).
    fn robust_row_scales(&self, r_unweighted: &DVector<Real>) -> DVector<Real> {
        DVector::from_element(r_unweighted.len(), 1.0)
    }

    fn residuals(&self, x: &DVector<Real>) -> DVector<Real> {
        let mut r = self.residuals_unweighted(x);
        let scales = self.robust_row_scales(&r);
        debug_assert_eq!(scales.len(), r.len());
        r.component_mul_assign(&scales);
        r
    }

    fn jacobian(&self, x: &DVector<Real>) -> DMatrix<Real> {
        let r_unweighted = self.residuals_unweighted(x);
        let scales = self.robust_row_scales(&r_unweighted);
        let mut j = self.jacobian_unweighted(x);
        debug_assert_eq!(scales.len(), j.nrows());
        for (mut row, scale) in j.row_iter_mut().zip(scales.iter()) {
            if *scale != 1.0 {
                row.scale_mut(*scale);
            }
        }
        j
    }
}

/// Termination settings shared by all backends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolveOptions {
    /// Iteration cap. The LM backend follows the MINPACK convention and
    /// allows `max_iters * (n + 1)` residual evaluations.
    pub max_iters: usize,
    /// Relative tolerance on the cost reduction.
    pub ftol: Real,
    /// Orthogonality/gradient tolerance.
    pub gtol: Real,
    /// Relative tolerance on parameter updates.
    pub xtol: Real,
}

impl Default for SolveOptions {
    fn default() -> Self {
        Self {
            max_iters: 200,
            ftol: 1e-12,
            gtol: 1e-12,
            xtol: 1e-12,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    /// Residual evaluations performed.
    pub evaluations: usize,
    /// `0.5 * ||r||²` at the returned parameters.
    pub final_cost: Real,
    pub converged: bool,
    /// Backend-specific termination reason.
    pub termination: String,
}

pub trait NllsSolverBackend {
    fn solve<P: NllsProblem>(
        &self,
        problem: &P,
        x0: DVector<Real>,
        opts: &SolveOptions,
    ) -> (DVector<Real>, SolveReport);
}

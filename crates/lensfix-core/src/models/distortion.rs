use nalgebra::{Matrix2, RealField, Vector2};
use serde::{Deserialize, Serialize};

/// Lens distortion acting on normalized image coordinates.
pub trait DistortionModel<S: RealField + Copy> {
    /// Map ideal (undistorted) normalized coordinates to distorted ones.
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S>;
    /// Invert [`DistortionModel::distort`], usually iteratively.
    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S>;
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct NoDistortion;

impl<S: RealField + Copy> DistortionModel<S> for NoDistortion {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S> {
        *n_undist
    }

    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S> {
        *n_dist
    }
}

/// Brown-Conrady radial (k1, k2, k3) and tangential (p1, p2) distortion.
///
/// `iters` bounds the Newton undistortion; `0` selects the default of 8.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BrownConrady5<S: RealField> {
    pub k1: S,
    pub k2: S,
    pub k3: S,
    pub p1: S,
    pub p2: S,
    pub iters: u32,
}

impl<S: RealField + Copy> BrownConrady5<S> {
    fn radial(&self, r2: S) -> S {
        S::one() + r2 * (self.k1 + r2 * (self.k2 + r2 * self.k3))
    }

    fn tangential(&self, x: S, y: S) -> (S, S) {
        let two = S::one() + S::one();
        let r2 = x * x + y * y;
        let xy = x * y;
        (
            two * self.p1 * xy + self.p2 * (r2 + two * x * x),
            self.p1 * (r2 + two * y * y) + two * self.p2 * xy,
        )
    }
}

impl<S: RealField + Copy> DistortionModel<S> for BrownConrady5<S> {
    fn distort(&self, n_undist: &Vector2<S>) -> Vector2<S> {
        let (x, y) = (n_undist.x, n_undist.y);
        let radial = self.radial(x * x + y * y);
        let (dx, dy) = self.tangential(x, y);
        Vector2::new(x * radial + dx, y * radial + dy)
    }

    /// Damped Newton iteration on `distort(n) = n_dist`, started at `n_dist`.
    ///
    /// Points beyond the fold of a strongly negative radial term have no
    /// preimage; the iterate then stops wherever the Jacobian degenerates, so
    /// callers that care check `distort(undistort(n))` themselves.
    fn undistort(&self, n_dist: &Vector2<S>) -> Vector2<S> {
        let two = S::one() + S::one();
        let half = S::one() / two;
        let tol = S::default_epsilon() * S::default_epsilon();

        let mut n = *n_dist;
        let mut residual = self.distort(&n) - n_dist;
        let iters = if self.iters == 0 { 8 } else { self.iters };
        for _ in 0..iters {
            let err = residual.norm_squared();
            if err <= tol {
                break;
            }
            let Some(step) = self.jacobian(&n).try_inverse().map(|j_inv| j_inv * residual) else {
                break;
            };

            // Halve the step until the residual shrinks.
            let mut scale = S::one();
            let mut accepted = false;
            for _ in 0..16 {
                let candidate = n - step * scale;
                let r = self.distort(&candidate) - n_dist;
                if r.norm_squared() < err {
                    n = candidate;
                    residual = r;
                    accepted = true;
                    break;
                }
                scale *= half;
            }
            if !accepted {
                break;
            }
        }
        n
    }
}

impl<S: RealField + Copy> BrownConrady5<S> {
    /// Jacobian of [`DistortionModel::distort`] at `n`.
    fn jacobian(&self, n: &Vector2<S>) -> Matrix2<S> {
        let two = S::one() + S::one();
        let three = two + S::one();
        let six = three + three;
        let (x, y) = (n.x, n.y);
        let r2 = x * x + y * y;
        let radial = self.radial(r2);
        let d_radial = self.k1 + r2 * (two * self.k2 + three * self.k3 * r2);
        let cross = two * x * y * d_radial + two * self.p1 * x + two * self.p2 * y;
        Matrix2::new(
            radial + two * x * x * d_radial + two * self.p1 * y + six * self.p2 * x,
            cross,
            cross,
            radial + two * y * y * d_radial + six * self.p1 * y + two * self.p2 * x,
        )
    }
}

use lensfix_core::Real;
use serde::{Deserialize, Serialize};

/// Robust loss kernels for iteratively re-weighted least squares (IRLS).
///
/// Weights are computed per corner from its pixel reprojection error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RobustKernel {
    /// Plain L2.
    #[default]
    None,
    /// Huber loss, quadratic up to `delta` pixels.
    Huber { delta: Real },
    /// Cauchy loss with scale `c` pixels.
    Cauchy { c: Real },
}

impl RobustKernel {
    /// Loss `rho(r^2)` and IRLS weight `w(r)` for a squared residual.
    pub fn rho_and_weight(self, r2: Real) -> (Real, Real) {
        match self {
            RobustKernel::None => (r2, 1.0),
            RobustKernel::Huber { delta } => {
                let r = r2.sqrt();
                if r <= delta {
                    (r2, 1.0)
                } else {
                    (2.0 * delta * r - delta * delta, delta / r)
                }
            }
            RobustKernel::Cauchy { c } => {
                let t = r2 / (c * c);
                (c * c * (1.0 + t).ln(), 1.0 / (1.0 + t))
            }
        }
    }
}

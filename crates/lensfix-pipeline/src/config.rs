use crate::CalibrateError;
use lensfix_imaging::{HsvRange, PatternSize, SubpixConfig};
use lensfix_linear::{DistortionFitOptions, IterativeIntrinsicsOptions};
use lensfix_optim::{PlanarIntrinsicsSolveOptions, SolveOptions};
use serde::{Deserialize, Serialize};

/// Linear initialisation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitOptions {
    /// Intrinsics / distortion alternations.
    pub iterations: usize,
    pub fix_k3: bool,
    pub fix_tangential: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            iterations: 2,
            fix_k3: true,
            fix_tangential: false,
        }
    }
}

impl InitOptions {
    pub(crate) fn to_iterative(self, principal_point_hint: Option<[f64; 2]>) -> IterativeIntrinsicsOptions {
        IterativeIntrinsicsOptions {
            iterations: self.iterations,
            distortion_opts: DistortionFitOptions {
                fix_k3: self.fix_k3,
                fix_tangential: self.fix_tangential,
                ..DistortionFitOptions::default()
            },
            zero_skew: true,
            principal_point_hint,
        }
    }
}

/// Everything `calibrate` can be tuned with; every field has a default so a
/// config file only needs the entries it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrateConfig {
    /// Inner corners per row and column.
    pub pattern_size: PatternSize,
    /// Board square edge, in the unit reported for poses.
    pub square_size: f64,
    /// HSV segmentation before detection; `None` detects on plain grayscale.
    pub color_mask: Option<HsvRange>,
    /// Reject views that miss any inner corner.
    pub require_full_grid: bool,
    pub subpix: SubpixConfig,
    pub init: InitOptions,
    pub solve: PlanarIntrinsicsSolveOptions,
    pub backend: SolveOptions,
}

impl Default for CalibrateConfig {
    fn default() -> Self {
        Self {
            pattern_size: PatternSize::default(),
            square_size: 1.0,
            color_mask: Some(HsvRange::default()),
            require_full_grid: true,
            subpix: SubpixConfig::default(),
            init: InitOptions::default(),
            solve: PlanarIntrinsicsSolveOptions::default(),
            backend: SolveOptions::default(),
        }
    }
}

impl CalibrateConfig {
    /// Reject settings no calibration can run with; config files bypass the
    /// checks the command line applies.
    pub fn validate(&self) -> Result<(), CalibrateError> {
        let invalid = |msg: String| Err(CalibrateError::InvalidConfig(msg));
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return invalid(format!("square_size must be positive, got {}", self.square_size));
        }
        if self.pattern_size.cols < 2 || self.pattern_size.rows < 2 {
            return invalid(format!(
                "pattern_size must be at least 2x2 inner corners, got {}",
                self.pattern_size
            ));
        }
        if self.subpix.half_window == 0 {
            return invalid("subpix.half_window must be at least 1".to_string());
        }
        if !(self.subpix.epsilon.is_finite() && self.subpix.epsilon >= 0.0) {
            return invalid(format!("subpix.epsilon must be non-negative, got {}", self.subpix.epsilon));
        }
        Ok(())
    }
}

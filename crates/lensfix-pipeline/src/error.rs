use lensfix_linear::{IterativeIntrinsicsError, PlanarPoseError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CalibrateError {
    #[error("no calibration images given")]
    NoImages,
    #[error("invalid calibration config: {0}")]
    InvalidConfig(String),
    #[error("no chessboard pattern detected in any of {attempted} images")]
    NoPatternsDetected { attempted: usize },
    #[error("linear initialisation failed: {0}")]
    Init(#[from] IterativeIntrinsicsError),
    #[error("board pose of view {view} could not be recovered: {source}")]
    Pose {
        view: usize,
        #[source]
        source: PlanarPoseError,
    },
    /// The refinement problem could not be set up or produced non-finite values.
    #[error("refinement failed: {0:#}")]
    Refinement(anyhow::Error),
    #[error("refinement did not converge ({termination})")]
    NotConverged { termination: String },
    #[error("calibration produced an invalid result: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum WorkbenchError {
    #[error("no calibration available, calibrate the camera first")]
    NotCalibrated,
    #[error("calibration is not usable: {0}")]
    InvalidCalibration(String),
    #[error(transparent)]
    Calibrate(#[from] CalibrateError),
    #[error("batch correction failed: {0:#}")]
    Batch(anyhow::Error),
}

//! End-to-end calibration workflows.
//!
//! - [`calibrate_images`] / [`calibrate_views`]: chessboard detection, linear
//!   initialisation and bundle adjustment, producing a [`CalibrationResult`],
//! - [`batch_correct`]: undistort every image of a directory with a fixed
//!   calibration,
//! - [`Workbench`]: a session that keeps the latest calibration and gates
//!   batch correction on it.
//!
//! ```no_run
//! use lensfix_pipeline::{batch_correct, calibrate_images, BatchOptions, CalibrateConfig};
//! use std::path::Path;
//!
//! # fn main() -> anyhow::Result<()> {
//! let paths = ["board_01.png", "board_02.png", "board_03.png"];
//! let result = calibrate_images(&paths, &CalibrateConfig::default())?;
//! println!("rms {:.3} px over {} views", result.rms_error, result.views_used);
//! batch_correct(Path::new("shots"), &result, &BatchOptions::default())?;
//! # Ok(())
//! # }
//! ```

mod batch;
mod calibrate;
mod config;
mod detection;
mod error;
mod result;
mod workbench;

pub use batch::{batch_correct, corrected_name, BatchOptions, BatchReport, CORRECTED_PREFIX};
pub use calibrate::{calibrate_images, calibrate_loaded, calibrate_views, LabeledImage};
pub use config::{CalibrateConfig, InitOptions};
pub use detection::{detect_board, detection_to_view};
pub use error::{CalibrateError, WorkbenchError};
pub use result::CalibrationResult;
pub use workbench::Workbench;

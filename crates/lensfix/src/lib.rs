//! Entry crate for the `lensfix` toolbox.
//!
//! `lensfix` covers three jobs:
//!
//! ## 1. Synthetic distortion
//!
//! Apply or remove radial-tangential distortion `(k1, k2, p1, p2)` without a
//! calibration, using a camera derived from the image size:
//!
//! ```no_run
//! use lensfix::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let img = load_image(Path::new("photo.png"))?;
//! let barrel = apply_distortion(&img, -0.25, 0.05, 0.0, 0.0)?;
//! let restored = correct_distortion(&barrel, -0.25, 0.05, 0.0, 0.0)?;
//! save_image(&restored, Path::new("restored.png"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## 2. Chessboard calibration
//!
//! Detect a 9x6 inner-corner chessboard in several photos and estimate the
//! camera matrix and distortion coefficients:
//!
//! ```no_run
//! use lensfix::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CalibrateConfig {
//!     square_size: 0.025,
//!     ..CalibrateConfig::default()
//! };
//! let result = calibrate_images(&["b1.jpg", "b2.jpg", "b3.jpg"], &config)?;
//! println!("K = {:?}, dist = {:?}", result.camera_matrix, result.dist_coeffs);
//! # Ok(())
//! # }
//! ```
//!
//! ## 3. Batch correction
//!
//! Undistort a directory of photos with a calibration, writing
//! `corrected_<name>` next to each input:
//!
//! ```no_run
//! use lensfix::prelude::*;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let calibration = CalibrationResult::load_json(Path::new("calibration.json"))?;
//! let report = batch_correct(Path::new("shots"), &calibration, &BatchOptions::default())?;
//! println!("{} images corrected", report.written.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - **[`core`]**: math types, camera models, distortion coefficients
//! - **[`linear`]**: closed-form initialisation
//! - **[`optim`]**: non-linear refinement
//! - **[`imaging`]**: image I/O, remapping, detection
//! - **[`pipeline`]**: calibration, batch correction and the workbench session
//! - **[`prelude`]**: common re-exports

/// Math types, camera models and distortion coefficients.
pub mod core {
    pub use lensfix_core::*;
}

/// Closed-form initialisation (homography, Zhang, distortion fit, planar pose).
pub mod linear {
    pub use lensfix_linear::*;
}

/// Non-linear least squares and the planar bundle adjustment.
pub mod optim {
    pub use lensfix_optim::*;
}

/// Image I/O, remapping, colour segmentation and chessboard detection.
pub mod imaging {
    pub use lensfix_imaging::*;
}

/// Calibration workflows and batch correction.
pub mod pipeline {
    pub use lensfix_pipeline::*;
}

/// Import with `use lensfix::prelude::*;`.
pub mod prelude {
    pub use crate::core::{
        synthetic_camera_matrix, BrownConrady5, DistortionCoeffs, FxFyCxCySkew, Mat3, Pt2, Pt3,
    };
    pub use crate::imaging::{
        apply_distortion, correct_distortion, load_image, resize_image, save_image,
        undistort_image, HsvRange, PatternSize, SubpixConfig,
    };
    pub use crate::pipeline::{
        batch_correct, calibrate_images, calibrate_views, BatchOptions, BatchReport,
        CalibrateConfig, CalibrationResult, Workbench,
    };
}

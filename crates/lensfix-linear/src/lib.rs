//! Linear initialisation for planar (chessboard) calibration.
//!
//! - normalized DLT homographies,
//! - Zhang's closed-form intrinsics and a fixed-principal-point focal
//!   estimate for one or two views,
//! - linear Brown-Conrady fit on homography residuals,
//! - alternating intrinsics / distortion refinement,
//! - board pose recovery from a homography.
//!
//! Results seed the non-linear refinement in `lensfix-optim`.

pub mod distortion_fit;
pub mod homography;
pub mod iterative_intrinsics;
pub mod math;
pub mod planar_pose;
pub mod zhang_intrinsics;

pub use distortion_fit::*;
pub use homography::*;
pub use iterative_intrinsics::*;
pub use planar_pose::*;
pub use zhang_intrinsics::*;

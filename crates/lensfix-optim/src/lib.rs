//! Non-linear least squares for camera calibration.
//!
//! [`NllsProblem`] describes a dense problem, [`LmBackend`] minimises it with
//! the `levenberg-marquardt` crate, and [`planar_intrinsics`] is the bundle
//! adjustment over intrinsics, distortion and board poses that finishes a
//! chessboard calibration.

mod backend_lm;
pub mod planar_intrinsics;
mod robust;
mod traits;

pub use backend_lm::LmBackend;
pub use planar_intrinsics::{
    optimize_planar_intrinsics, IntrinsicsFixMask, PlanarIntrinsicsInit,
    PlanarIntrinsicsProblem, PlanarIntrinsicsResult, PlanarIntrinsicsSolveOptions,
};
pub use robust::RobustKernel;
pub use traits::{NllsProblem, NllsSolverBackend, SolveOptions, SolveReport};

//! Core math and geometry primitives for `lensfix`.
//!
//! This crate contains:
//! - linear algebra type aliases (`Real`, `Vec2`, `Pt3`, ...),
//! - composable camera models (projection + distortion + intrinsics),
//! - the validated distortion coefficient vector used by every image operation,
//! - 2D-3D correspondence views and reprojection statistics,
//! - deterministic synthetic planar data for tests.
//!
//! Camera pipeline:
//! `pixel = K ∘ distortion ∘ projection(dir)`

/// Linear algebra type aliases and helpers.
pub mod math;
/// Camera models and distortion utilities.
pub mod models;
/// Synthetic planar targets and views.
pub mod synthetic;
/// Observation containers.
pub mod types;

pub use math::*;
pub use models::*;
pub use types::*;

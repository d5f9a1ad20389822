//! Deterministic synthetic calibration data.
//!
//! ```
//! use lensfix_core::{synthetic::planar, BrownConrady5, Camera, FxFyCxCySkew, Pinhole};
//!
//! let k = FxFyCxCySkew { fx: 800.0, fy: 800.0, cx: 640.0, cy: 360.0, skew: 0.0 };
//! let dist = BrownConrady5 { k1: -0.1, k2: 0.0, k3: 0.0, p1: 0.0, p2: 0.0, iters: 8 };
//! let cam = Camera::new(Pinhole, dist, k);
//!
//! let board = planar::grid_points(9, 6, 0.025);
//! let poses = planar::poses_tilted(5, 0.6);
//! let views = planar::project_views_all(&cam, &board, &poses).unwrap();
//! assert_eq!(views.len(), 5);
//! ```

pub mod planar;

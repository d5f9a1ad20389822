//! Pixel-level operations for `lensfix`.
//!
//! - [`io`]: loading and saving PNG/JPEG/BMP files,
//! - [`resize`]: aspect-preserving resizing,
//! - [`remap`]: per-pixel coordinate tables and bilinear resampling,
//! - [`distortion`]: slider-driven distortion apply/correct and calibrated undistortion,
//! - [`color`]: HSV segmentation used before chessboard detection,
//! - [`subpix`]: iterative sub-pixel corner refinement,
//! - [`chessboard`]: inner-corner detection on top of `calib-targets`.

pub mod chessboard;
pub mod color;
pub mod distortion;
mod error;
pub mod io;
pub mod remap;
pub mod resize;
pub mod subpix;

pub use chessboard::{BoardDetection, ChessboardDetector, GridCorner, PatternSize};
pub use color::{color_mask, rgb_to_hsv, segment_by_color, HsvRange};
pub use distortion::{apply_distortion, correct_distortion, undistort_image};
pub use error::ImagingError;
pub use io::{is_image_path, load_image, save_image, try_load_image, IMAGE_EXTENSIONS};
pub use remap::{distort_map, remap, undistort_map, RemapTable};
pub use resize::resize_image;
pub use subpix::{refine_corners_subpix, SubpixConfig};

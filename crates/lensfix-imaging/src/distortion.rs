//! Whole-image distortion operations.
//!
//! The slider-driven operations work without a calibration: they use the
//! synthetic camera from [`synthetic_camera_matrix`] (`fx = fy = width`,
//! principal point at the image centre) so the same coefficients mean the
//! same thing in both directions.

use crate::remap::{distort_map, remap, undistort_map};
use crate::ImagingError;
use image::DynamicImage;
use lensfix_core::{synthetic_camera_matrix, DistortionCoeffs, Mat3};
use log::debug;

fn ensure_non_empty(img: &DynamicImage) -> Result<(), ImagingError> {
    if img.width() == 0 || img.height() == 0 {
        return Err(ImagingError::EmptyImage);
    }
    Ok(())
}

/// Render `img` as seen through a lens with the given coefficients.
pub fn apply_distortion(
    img: &DynamicImage,
    k1: f64,
    k2: f64,
    p1: f64,
    p2: f64,
) -> Result<DynamicImage, ImagingError> {
    let coeffs = DistortionCoeffs::from_slice(&[k1, k2, p1, p2])?;
    ensure_non_empty(img)?;
    if coeffs.is_zero() {
        return Ok(img.clone());
    }
    let (w, h) = (img.width(), img.height());
    debug!("applying distortion {:?} to {w}x{h} image", coeffs.as_slice());
    let table = distort_map(&synthetic_camera_matrix(w, h), &coeffs, w, h)?;
    Ok(remap(img, &table))
}

/// Remove distortion `(k1, k2, p1, p2, k3 = 0)` using the synthetic camera.
pub fn correct_distortion(
    img: &DynamicImage,
    k1: f64,
    k2: f64,
    p1: f64,
    p2: f64,
) -> Result<DynamicImage, ImagingError> {
    let coeffs = DistortionCoeffs::from_slice(&[k1, k2, p1, p2])?.to_five();
    ensure_non_empty(img)?;
    let k = synthetic_camera_matrix(img.width(), img.height());
    undistort_image(img, &k, &coeffs)
}

/// Remove distortion with an explicit (typically calibrated) camera matrix.
pub fn undistort_image(
    img: &DynamicImage,
    k: &Mat3,
    coeffs: &DistortionCoeffs,
) -> Result<DynamicImage, ImagingError> {
    ensure_non_empty(img)?;
    if coeffs.is_zero() {
        return Ok(img.clone());
    }
    let (w, h) = (img.width(), img.height());
    let table = undistort_map(k, coeffs, w, h)?;
    Ok(remap(img, &table))
}

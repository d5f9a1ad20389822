use anyhow::{Context, Result};
use lensfix_core::{DistortionCoeffs, Mat3};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Outcome of a calibration run, consumed by batch correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Row-major `K`.
    pub camera_matrix: [[f64; 3]; 3],
    /// `(k1, k2, p1, p2, k3)`.
    pub dist_coeffs: DistortionCoeffs,
    /// `(width, height)` of the calibration images.
    pub image_size: (u32, u32),
    /// Root mean square reprojection error, pixels.
    pub rms_error: f64,
    /// Mean reprojection error, pixels.
    pub mean_error: f64,
    pub views_used: usize,
    /// Mean reprojection error of each used view, pixels.
    #[serde(default)]
    pub per_view_errors: Vec<f64>,
    /// Inputs that were unreadable or showed no usable board.
    #[serde(default)]
    pub skipped: Vec<PathBuf>,
}

impl CalibrationResult {
    pub fn k_matrix(&self) -> Mat3 {
        let k = &self.camera_matrix;
        Mat3::new(
            k[0][0], k[0][1], k[0][2], k[1][0], k[1][1], k[1][2], k[2][0], k[2][1], k[2][2],
        )
    }

    pub(crate) fn matrix_rows(k: &Mat3) -> [[f64; 3]; 3] {
        [
            [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
            [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
            [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
        ]
    }

    /// Check that the result can drive an undistortion.
    pub fn validate(&self) -> Result<(), String> {
        let k = &self.camera_matrix;
        if k.iter().flatten().any(|v| !v.is_finite()) {
            return Err("camera matrix has non-finite entries".into());
        }
        if k[0][0] <= 0.0 || k[1][1] <= 0.0 {
            return Err(format!(
                "focal lengths must be positive (fx = {}, fy = {})",
                k[0][0], k[1][1]
            ));
        }
        if k[2] != [0.0, 0.0, 1.0] {
            return Err(format!("last camera matrix row must be [0, 0, 1], got {:?}", k[2]));
        }
        if self.k_matrix().try_inverse().is_none() {
            return Err("camera matrix is singular".into());
        }
        // length and finiteness are enforced by `DistortionCoeffs`
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(Into::into)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(Into::into)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)
            .with_context(|| format!("failed to write calibration to {}", path.display()))
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("failed to read calibration from {}", path.display()))?;
        Self::from_json(&data)
            .with_context(|| format!("failed to parse calibration in {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CalibrationResult {
        CalibrationResult {
            camera_matrix: [[800.0, 0.0, 320.0], [0.0, 790.0, 240.0], [0.0, 0.0, 1.0]],
            dist_coeffs: DistortionCoeffs::full(-0.2, 0.05, 0.001, -0.001, 0.0),
            image_size: (640, 480),
            rms_error: 0.31,
            mean_error: 0.27,
            views_used: 12,
            per_view_errors: vec![0.27; 12],
            skipped: vec![PathBuf::from("blurry.png")],
        }
    }

    #[test]
    fn json_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calib.json");
        let result = sample();
        result.save_json(&path).unwrap();
        assert_eq!(CalibrationResult::load_json(&path).unwrap(), result);
    }

    #[test]
    fn json_rejects_bad_coefficient_length() {
        let mut value: serde_json::Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
        value["dist_coeffs"] = serde_json::json!([0.1, 0.2, 0.3]);
        assert!(CalibrationResult::from_json(&value.to_string()).is_err());
    }

    #[test]
    fn validate_flags_bad_matrices() {
        assert!(sample().validate().is_ok());

        let mut negative = sample();
        negative.camera_matrix[0][0] = -5.0;
        assert!(negative.validate().is_err());

        let mut nan = sample();
        nan.camera_matrix[1][2] = f64::NAN;
        assert!(nan.validate().is_err());

        let mut projective = sample();
        projective.camera_matrix[2] = [0.0, 0.1, 1.0];
        assert!(projective.validate().is_err());
    }

    #[test]
    fn k_matrix_is_row_major() {
        let k = sample().k_matrix();
        assert_eq!(k[(0, 2)], 320.0);
        assert_eq!(k[(1, 1)], 790.0);
        assert_eq!(CalibrationResult::matrix_rows(&k), sample().camera_matrix);
    }
}

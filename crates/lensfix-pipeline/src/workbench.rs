use crate::{
    batch_correct, calibrate_images, BatchOptions, BatchReport, CalibrateConfig, CalibrationResult,
    WorkbenchError,
};
use log::warn;
use std::path::Path;

/// Calibration session: holds the most recent calibration and only allows
/// batch correction once one is available.
#[derive(Debug, Clone, Default)]
pub struct Workbench {
    config: CalibrateConfig,
    calibration: Option<CalibrationResult>,
}

impl Workbench {
    pub fn new(config: CalibrateConfig) -> Self {
        Self {
            config,
            calibration: None,
        }
    }

    pub fn config(&self) -> &CalibrateConfig {
        &self.config
    }

    pub fn calibration(&self) -> Option<&CalibrationResult> {
        self.calibration.as_ref()
    }

    /// Run a calibration and keep its result. A failed run clears any result
    /// held from before.
    pub fn calibrate<P: AsRef<Path>>(
        &mut self,
        paths: &[P],
    ) -> Result<&CalibrationResult, WorkbenchError> {
        self.calibration = None;
        let result = calibrate_images(paths, &self.config)?;
        Ok(self.calibration.insert(result))
    }

    /// Adopt a calibration from elsewhere, e.g. a saved JSON file.
    pub fn load_calibration(&mut self, result: CalibrationResult) -> Result<(), WorkbenchError> {
        result.validate().map_err(WorkbenchError::InvalidCalibration)?;
        self.calibration = Some(result);
        Ok(())
    }

    pub fn batch_correct(&self, dir: &Path, opts: &BatchOptions) -> Result<BatchReport, WorkbenchError> {
        let Some(calibration) = &self.calibration else {
            warn!("batch correction requested before calibration");
            return Err(WorkbenchError::NotCalibrated);
        };
        batch_correct(dir, calibration, opts).map_err(WorkbenchError::Batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lensfix_core::DistortionCoeffs;

    fn calibration() -> CalibrationResult {
        CalibrationResult {
            camera_matrix: [[100.0, 0.0, 16.0], [0.0, 100.0, 12.0], [0.0, 0.0, 1.0]],
            dist_coeffs: DistortionCoeffs::full(-0.1, 0.0, 0.0, 0.0, 0.0),
            image_size: (32, 24),
            rms_error: 0.2,
            mean_error: 0.2,
            views_used: 3,
            per_view_errors: vec![0.2; 3],
            skipped: Vec::new(),
        }
    }

    #[test]
    fn batch_refused_until_calibrated() {
        let dir = tempfile::tempdir().unwrap();
        let bench = Workbench::default();
        assert!(matches!(
            bench.batch_correct(dir.path(), &BatchOptions::default()),
            Err(WorkbenchError::NotCalibrated)
        ));
    }

    #[test]
    fn invalid_calibration_is_not_adopted() {
        let mut bench = Workbench::default();
        let mut bad = calibration();
        bad.camera_matrix[1][1] = 0.0;
        assert!(matches!(
            bench.load_calibration(bad),
            Err(WorkbenchError::InvalidCalibration(_))
        ));
        assert!(bench.calibration().is_none());

        bench.load_calibration(calibration()).unwrap();
        assert!(bench.calibration().is_some());
    }

    #[test]
    fn failed_calibration_clears_previous_result() {
        let dir = tempfile::tempdir().unwrap();
        let mut bench = Workbench::default();
        bench.load_calibration(calibration()).unwrap();

        let err = bench.calibrate(&[dir.path().join("missing.png")]).unwrap_err();
        assert!(matches!(
            err,
            WorkbenchError::Calibrate(crate::CalibrateError::NoPatternsDetected { .. })
        ));
        assert!(bench.calibration().is_none());
    }
}

//! Directory-wide undistortion with a fixed calibration.

use crate::CalibrationResult;
use anyhow::{anyhow, Context, Result};
use lensfix_imaging::{is_image_path, save_image, try_load_image, undistort_image};
use log::{debug, info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Prefix of every file written by [`batch_correct`].
pub const CORRECTED_PREFIX: &str = "corrected_";

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Where to write results; the input directory when `None`.
    pub out_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    /// Image files that could not be decoded.
    pub unreadable: Vec<PathBuf>,
    /// Images that decoded but could not be corrected or written.
    pub failed: Vec<PathBuf>,
}

/// Output file name for `input`, e.g. `shot.png` -> `corrected_shot.png`.
pub fn corrected_name(input: &Path) -> Option<String> {
    let name = input.file_name()?.to_str()?;
    Some(format!("{CORRECTED_PREFIX}{name}"))
}

fn is_previous_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(CORRECTED_PREFIX))
}

/// Undistort every image in `dir` with `calibration`.
///
/// Files are visited in name order. Non-image files and outputs of earlier
/// runs are ignored; unreadable images are skipped and listed in the report.
pub fn batch_correct(
    dir: &Path,
    calibration: &CalibrationResult,
    opts: &BatchOptions,
) -> Result<BatchReport> {
    calibration
        .validate()
        .map_err(|msg| anyhow!("refusing to batch with invalid calibration: {msg}"))?;

    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to list {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_image_path(p) && !is_previous_output(p))
        .collect();
    inputs.sort();

    let out_dir = opts.out_dir.as_deref().unwrap_or(dir);
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    let k = calibration.k_matrix();
    let mut report = BatchReport::default();
    for input in inputs {
        let Some(img) = try_load_image(&input) else {
            report.unreadable.push(input);
            continue;
        };
        if (img.width(), img.height()) != calibration.image_size {
            debug!(
                "{}: {}x{} differs from calibration size {}x{}",
                input.display(),
                img.width(),
                img.height(),
                calibration.image_size.0,
                calibration.image_size.1
            );
        }
        let Some(name) = corrected_name(&input) else {
            warn!("{}: file name is not valid UTF-8, skipping", input.display());
            report.failed.push(input);
            continue;
        };
        let output = out_dir.join(name);
        let written = undistort_image(&img, &k, &calibration.dist_coeffs)
            .and_then(|corrected| save_image(&corrected, &output));
        match written {
            Ok(()) => {
                info!("{} -> {}", input.display(), output.display());
                report.written.push(output);
            }
            Err(err) => {
                warn!("{}: {err}", input.display());
                report.failed.push(input);
            }
        }
    }
    Ok(report)
}

use crate::detection::{detect_board, detection_to_view};
use crate::{CalibrateConfig, CalibrateError, CalibrationResult};
use image::DynamicImage;
use lensfix_core::{CorrespondenceView, DistortionCoeffs, Iso3};
use lensfix_imaging::try_load_image;
use lensfix_linear::{estimate_intrinsics_iterative, estimate_planar_pose_from_h, IterativeCalibView};
use lensfix_optim::{optimize_planar_intrinsics, IntrinsicsFixMask, PlanarIntrinsicsInit};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Views below this count cannot constrain the principal point.
const MIN_VIEWS_FOR_FULL_INTRINSICS: usize = 3;

/// An in-memory calibration image and where it came from.
#[derive(Debug, Clone)]
pub struct LabeledImage {
    pub path: PathBuf,
    pub image: DynamicImage,
}

/// Calibrate from image files. Unreadable files are skipped like images
/// without a board.
pub fn calibrate_images<P: AsRef<Path>>(
    paths: &[P],
    config: &CalibrateConfig,
) -> Result<CalibrationResult, CalibrateError> {
    if paths.is_empty() {
        return Err(CalibrateError::NoImages);
    }
    config.validate()?;
    let mut images = Vec::with_capacity(paths.len());
    let mut skipped = Vec::new();
    for path in paths {
        let path = path.as_ref();
        match try_load_image(path) {
            Some(image) => images.push(LabeledImage {
                path: path.to_path_buf(),
                image,
            }),
            None => skipped.push(path.to_path_buf()),
        }
    }
    calibrate_from(&images, skipped, paths.len(), config)
}

/// Calibrate from already decoded images.
pub fn calibrate_loaded(
    images: &[LabeledImage],
    config: &CalibrateConfig,
) -> Result<CalibrationResult, CalibrateError> {
    if images.is_empty() {
        return Err(CalibrateError::NoImages);
    }
    config.validate()?;
    calibrate_from(images, Vec::new(), images.len(), config)
}

fn calibrate_from(
    images: &[LabeledImage],
    mut skipped: Vec<PathBuf>,
    attempted: usize,
    config: &CalibrateConfig,
) -> Result<CalibrationResult, CalibrateError> {
    let mut views = Vec::new();
    let mut image_size = None;

    for item in images {
        let dims = (item.image.width(), item.image.height());
        if image_size.is_some_and(|size| size != dims) {
            warn!(
                "{}: size {}x{} differs from earlier calibration images, skipping",
                item.path.display(),
                dims.0,
                dims.1
            );
            skipped.push(item.path.clone());
            continue;
        }

        let Some(detection) = detect_board(&item.image, config) else {
            warn!(
                "{}: no {} chessboard found, skipping",
                item.path.display(),
                config.pattern_size
            );
            skipped.push(item.path.clone());
            continue;
        };
        match detection_to_view(&detection, config.square_size) {
            Ok(view) => {
                debug!("{}: {} corners", item.path.display(), view.len());
                image_size = Some(dims);
                views.push(view);
            }
            Err(err) => {
                warn!("{}: {err:#}, skipping", item.path.display());
                skipped.push(item.path.clone());
            }
        }
    }

    let Some(image_size) = image_size else {
        return Err(CalibrateError::NoPatternsDetected { attempted });
    };
    info!("board found in {} of {attempted} images", views.len());

    let mut result = calibrate_views(&views, image_size, config)?;
    result.skipped = skipped;
    Ok(result)
}

/// Calibrate from board correspondences of images sized `image_size`.
///
/// With fewer than three views the principal point is pinned to the image
/// centre and `k3` is held at zero.
pub fn calibrate_views(
    views: &[CorrespondenceView],
    image_size: (u32, u32),
    config: &CalibrateConfig,
) -> Result<CalibrationResult, CalibrateError> {
    if views.is_empty() {
        return Err(CalibrateError::NoPatternsDetected { attempted: 0 });
    }
    config.validate()?;
    let few_views = views.len() < MIN_VIEWS_FOR_FULL_INTRINSICS;
    let centre = [f64::from(image_size.0) / 2.0, f64::from(image_size.1) / 2.0];

    let calib_views: Vec<IterativeCalibView> = views
        .iter()
        .map(|v| IterativeCalibView::new(v.planar_points(), v.points_2d.clone()))
        .collect();
    let linear = estimate_intrinsics_iterative(
        &calib_views,
        config.init.to_iterative(few_views.then_some(centre)),
    )?;
    debug!(
        "linear init: fx={:.2} fy={:.2} cx={:.2} cy={:.2} k1={:.4} k2={:.4}",
        linear.intrinsics.fx,
        linear.intrinsics.fy,
        linear.intrinsics.cx,
        linear.intrinsics.cy,
        linear.distortion.k1,
        linear.distortion.k2
    );

    let kmtx = linear.intrinsics.k_matrix();
    let poses = linear
        .homographies
        .iter()
        .enumerate()
        .map(|(view, h)| {
            estimate_planar_pose_from_h(&kmtx, h).map_err(|source| CalibrateError::Pose { view, source })
        })
        .collect::<Result<Vec<Iso3>, _>>()?;

    let mut solve = config.solve.clone();
    if few_views {
        solve.fix_intrinsics = solve.fix_intrinsics.union(&IntrinsicsFixMask {
            k3: true,
            ..IntrinsicsFixMask::principal_point()
        });
    }
    let init = PlanarIntrinsicsInit {
        intrinsics: linear.intrinsics,
        distortion: linear.distortion,
        poses,
    };
    let refined = optimize_planar_intrinsics(views, &init, &solve, &config.backend)
        .map_err(CalibrateError::Refinement)?;
    if !refined.report.converged {
        return Err(CalibrateError::NotConverged {
            termination: refined.report.termination,
        });
    }

    let result = CalibrationResult {
        camera_matrix: CalibrationResult::matrix_rows(&refined.intrinsics.k_matrix()),
        dist_coeffs: DistortionCoeffs::from_brown_conrady(&refined.distortion),
        image_size,
        rms_error: refined.reprojection.rms,
        mean_error: refined.reprojection.mean,
        views_used: views.len(),
        per_view_errors: refined.per_view_errors,
        skipped: Vec::new(),
    };
    result.validate().map_err(CalibrateError::Invalid)?;
    info!(
        "calibrated {} views: rms {:.4} px, mean {:.4} px",
        result.views_used, result.rms_error, result.mean_error
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn empty_input_is_rejected() {
        let paths: [&str; 0] = [];
        assert!(matches!(
            calibrate_images(&paths, &CalibrateConfig::default()),
            Err(CalibrateError::NoImages)
        ));
        assert!(matches!(
            calibrate_views(&[], (640, 480), &CalibrateConfig::default()),
            Err(CalibrateError::NoPatternsDetected { attempted: 0 })
        ));
    }

    #[test]
    fn bad_square_size_is_rejected_before_detection() {
        let config = CalibrateConfig {
            square_size: 0.0,
            ..CalibrateConfig::default()
        };
        let image = LabeledImage {
            path: PathBuf::from("a.png"),
            image: DynamicImage::ImageLuma8(GrayImage::from_pixel(16, 16, Luma([0]))),
        };
        assert!(matches!(
            calibrate_loaded(&[image], &config),
            Err(CalibrateError::InvalidConfig(_))
        ));
        assert!(matches!(
            calibrate_images(&["missing.png"], &config),
            Err(CalibrateError::InvalidConfig(_))
        ));
    }

    #[test]
    fn images_without_board_fail_outright() {
        let blank = |name: &str| LabeledImage {
            path: PathBuf::from(name),
            image: DynamicImage::ImageLuma8(GrayImage::from_pixel(160, 120, Luma([200]))),
        };
        let err = calibrate_loaded(&[blank("a.png"), blank("b.png")], &CalibrateConfig::default())
            .unwrap_err();
        assert!(matches!(err, CalibrateError::NoPatternsDetected { attempted: 2 }));
    }

    #[test]
    fn missing_files_count_as_attempted() {
        let dir = tempfile::tempdir().unwrap();
        let paths = [dir.path().join("gone.png"), dir.path().join("also_gone.jpg")];
        let err = calibrate_images(&paths, &CalibrateConfig::default()).unwrap_err();
        assert!(matches!(err, CalibrateError::NoPatternsDetected { attempted: 2 }));
    }
}

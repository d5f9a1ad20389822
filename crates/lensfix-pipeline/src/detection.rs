//! Per-image board detection for calibration.

use crate::CalibrateConfig;
use anyhow::{ensure, Result};
use image::DynamicImage;
use lensfix_core::CorrespondenceView;
use lensfix_imaging::{
    refine_corners_subpix, segment_by_color, BoardDetection, ChessboardDetector,
};
use log::debug;

/// Corners a view needs for a homography.
const MIN_CORNERS: usize = 4;

fn usable(detection: &BoardDetection, config: &CalibrateConfig) -> bool {
    if config.require_full_grid {
        detection.is_complete(config.pattern_size)
    } else {
        detection.len() >= MIN_CORNERS
    }
}

/// Find the board in `img` and refine its corners to sub-pixel accuracy.
///
/// With a colour mask configured, detection first runs on the segmented
/// image and falls back to plain grayscale. Refinement always runs on the
/// grayscale original.
pub fn detect_board(img: &DynamicImage, config: &CalibrateConfig) -> Option<BoardDetection> {
    let detector = ChessboardDetector::new(config.pattern_size);
    let gray = img.to_luma8();

    let masked = config.color_mask.as_ref().and_then(|range| {
        let segmented = segment_by_color(img, range);
        detector.detect(&segmented).filter(|d| usable(d, config))
    });
    let mut detection = match masked {
        Some(d) => d,
        None => {
            if config.color_mask.is_some() {
                debug!("colour-masked detection failed, retrying on grayscale");
            }
            detector.detect(&gray).filter(|d| usable(d, config))?
        }
    };

    let mut positions = detection.positions();
    refine_corners_subpix(&gray, &mut positions, &config.subpix);
    detection.set_positions(&positions);
    Some(detection)
}

/// Board-plane correspondences of a detection, scaled by `square_size`.
pub fn detection_to_view(detection: &BoardDetection, square_size: f64) -> Result<CorrespondenceView> {
    ensure!(
        detection.len() >= MIN_CORNERS,
        "insufficient corners after grid filtering ({})",
        detection.len()
    );
    let (points_3d, points_2d) = detection.correspondences(square_size);
    CorrespondenceView::new(points_3d, points_2d)
}
